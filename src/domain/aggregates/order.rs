//! Order snapshot
//!
//! Orders are written by checkout; this crate only reads them and records the
//! invoice they were billed under.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    #[serde(alias = "completed")]
    Delivered,
    #[serde(alias = "canceled")]
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Stored spellings that count as a completed order.
    pub const COMPLETED_TAGS: [&'static str; 2] = ["delivered", "completed"];

    pub fn is_completed(self) -> bool { self == Self::Delivered }
    pub fn is_terminal(self) -> bool { matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded) }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub product_name: String,
    #[serde(default)]
    pub sku: String,
    pub quantity: i64,
    pub price: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub total: Decimal,
    pub hsn_code: Option<String>,
    pub variant_id: Option<String>,
    pub variant_color: Option<String>,
    pub variant_size: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAddress {
    pub line1: String,
    #[serde(default)]
    pub line2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String { "India".into() }

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPayment {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub status: String,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub currency: String,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub coupon_code: Option<String>,
    pub coupon_amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    #[serde(default)]
    pub order_number: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(alias = "guest_email", default)]
    pub customer_email: String,
    #[serde(alias = "guest_name", default)]
    pub customer_name: String,
    #[serde(alias = "guest_phone", default)]
    pub customer_phone: String,
    pub customer_gstin: Option<String>,
    pub customer_pan: Option<String>,
    pub items: Vec<OrderItem>,
    pub shipping_address: OrderAddress,
    pub billing_address: Option<OrderAddress>,
    #[serde(default)]
    pub payment: OrderPayment,
    #[serde(default)]
    pub totals: OrderTotals,
    #[serde(default)]
    pub status: OrderStatus,
    pub invoice_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn billing(&self) -> &OrderAddress { self.billing_address.as_ref().unwrap_or(&self.shipping_address) }

    pub fn buyer_gstin(&self) -> Option<&str> { self.customer_gstin.as_deref().filter(|g| !g.trim().is_empty()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_fields_deserialize() {
        let order: Order = serde_json::from_value(json!({
            "id": "o1",
            "guest_name": "Kavya Rao",
            "guest_email": "kavya@example.com",
            "items": [{"product_id": "p1", "product_name": "Brass Diya", "quantity": 2, "price": 500.0}],
            "shipping_address": {"line1": "12 MG Road", "city": "Pune", "state": "Maharashtra", "postal_code": "411001"},
            "status": "completed",
            "created_at": "2026-01-05T10:00:00Z",
            "updated_at": "2026-01-05T10:00:00Z"
        })).unwrap();
        assert_eq!(order.customer_name, "Kavya Rao");
        assert!(order.status.is_completed());
        assert_eq!(order.billing().city, "Pune");
        assert_eq!(order.shipping_address.country, "India");
        assert_eq!(order.items[0].price, Decimal::new(500, 0));
        assert!(order.buyer_gstin().is_none());
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Refunded.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
        assert!(!OrderStatus::Cancelled.is_completed());
    }
}
