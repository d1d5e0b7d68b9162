//! Invoice aggregate
//!
//! GST allocation: intra-state lines carry CGST and SGST at half the rate
//! each; inter-state lines carry IGST at the full rate.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::order::{Order, OrderAddress};
use crate::domain::value_objects::{percent_of, round_half_up, state_code};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    #[default]
    Sent,
    Paid,
    Overdue,
    #[serde(alias = "canceled")]
    Cancelled,
}

impl InvoiceStatus {
    pub fn can_transition_to(self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        match (self, next) {
            (Draft, Sent) | (Sent, Draft) | (Sent, Paid) | (Sent, Overdue) => true,
            (Cancelled, Cancelled) => false,
            (_, Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_outstanding(self) -> bool { matches!(self, Self::Sent | Self::Overdue) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType { #[default] Regular, CreditNote, DebitNote }

impl InvoiceType {
    pub fn as_str(self) -> &'static str {
        match self { Self::Regular => "regular", Self::CreditNote => "credit_note", Self::DebitNote => "debit_note" }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvoiceError {
    #[error("order has no items")]
    NoItems,
    #[error("item {product_id} has a non-positive quantity")]
    NonPositiveQuantity { product_id: String },
    #[error("item {product_id} has a negative taxable value")]
    NegativeTaxableValue { product_id: String },
    #[error("GST rate {0} is out of range")]
    InvalidRate(Decimal),
    #[error("cannot move invoice from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceAddress {
    pub line1: String,
    #[serde(default)]
    pub line2: String,
    pub city: String,
    pub state: String,
    pub state_code: String,
    pub postal_code: String,
    pub country: String,
}

impl From<&OrderAddress> for InvoiceAddress {
    fn from(addr: &OrderAddress) -> Self {
        Self {
            line1: addr.line1.clone(),
            line2: addr.line2.clone(),
            city: addr.city.clone(),
            state: addr.state.clone(),
            state_code: state_code(&addr.state).to_string(),
            postal_code: addr.postal_code.clone(),
            country: addr.country.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerDetails {
    pub name: String,
    pub gstin: String,
    pub pan: String,
    pub email: String,
    pub phone: String,
    pub address: InvoiceAddress,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerDetails {
    pub name: String,
    pub gstin: Option<String>,
    pub pan: Option<String>,
    pub email: String,
    pub phone: String,
    pub billing_address: InvoiceAddress,
    pub shipping_address: InvoiceAddress,
    pub is_b2b: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankDetails {
    pub account_name: String,
    pub account_number: String,
    pub bank_name: String,
    pub ifsc_code: String,
    pub branch: String,
    pub upi_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoicePayment {
    pub method: String,
    pub status: String,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    pub sku: String,
    pub hsn_code: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub taxable_value: Decimal,
    pub cgst_rate: Decimal,
    pub cgst_amount: Decimal,
    pub sgst_rate: Decimal,
    pub sgst_amount: Decimal,
    pub igst_rate: Decimal,
    pub igst_amount: Decimal,
    pub total_amount: Decimal,
}

impl InvoiceLineItem {
    pub fn tax(&self) -> Decimal { self.cgst_amount + self.sgst_amount + self.igst_amount }

    /// Splits `rate` over the taxable value and fills the line total.
    pub fn apply_gst(&mut self, rate: Decimal, inter_state: bool) {
        if inter_state {
            self.igst_rate = rate;
            self.igst_amount = percent_of(self.taxable_value, rate);
            self.cgst_rate = Decimal::ZERO;
            self.cgst_amount = Decimal::ZERO;
            self.sgst_rate = Decimal::ZERO;
            self.sgst_amount = Decimal::ZERO;
        } else {
            let half = rate / Decimal::TWO;
            self.cgst_rate = half;
            self.sgst_rate = half;
            self.cgst_amount = percent_of(self.taxable_value, half);
            self.sgst_amount = percent_of(self.taxable_value, half);
            self.igst_rate = Decimal::ZERO;
            self.igst_amount = Decimal::ZERO;
        }
        self.total_amount = self.taxable_value + self.tax();
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxSummary {
    pub taxable_value: Decimal,
    pub cgst_amount: Decimal,
    pub sgst_amount: Decimal,
    pub igst_amount: Decimal,
    pub total_tax: Decimal,
    pub grand_total: Decimal,
    pub rounding_amount: Decimal,
    pub final_amount: Decimal,
}

impl TaxSummary {
    pub fn from_lines(lines: &[InvoiceLineItem]) -> Self {
        let mut s = Self::default();
        for line in lines {
            s.taxable_value += line.taxable_value;
            s.cgst_amount += line.cgst_amount;
            s.sgst_amount += line.sgst_amount;
            s.igst_amount += line.igst_amount;
        }
        s.total_tax = s.cgst_amount + s.sgst_amount + s.igst_amount;
        s.grand_total = s.taxable_value + s.total_tax;
        s.final_amount = round_half_up(s.grand_total);
        s.rounding_amount = s.final_amount - s.grand_total;
        s
    }
}

/// Tax and billing terms resolved from store settings.
#[derive(Clone, Debug, PartialEq)]
pub struct InvoiceTerms {
    pub seller: SellerDetails,
    pub gst_rate: Decimal,
    pub hsn_rates: BTreeMap<String, Decimal>,
    pub default_hsn_code: String,
    pub prices_include_tax: bool,
    pub due_days: i64,
    pub bank: Option<BankDetails>,
    pub currency: String,
}

impl InvoiceTerms {
    pub fn rate_for(&self, hsn_code: &str) -> Decimal { self.hsn_rates.get(hsn_code).copied().unwrap_or(self.gst_rate) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub order_id: String,
    #[serde(default)]
    pub order_number: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub invoice_type: InvoiceType,
    pub status: InvoiceStatus,
    pub seller: SellerDetails,
    pub buyer: BuyerDetails,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub place_of_supply: String,
    pub place_of_delivery: String,
    pub line_items: Vec<InvoiceLineItem>,
    pub tax_summary: TaxSummary,
    pub bank_details: Option<BankDetails>,
    pub payment: Option<InvoicePayment>,
    pub currency: String,
    pub linked_invoice_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
}

impl Invoice {
    pub fn is_inter_state(&self) -> bool { self.seller.address.state_code != self.buyer.shipping_address.state_code }
}

/// Everything about an invoice except its identity.
#[derive(Clone, Debug, PartialEq)]
pub struct InvoiceDraft {
    order_id: String,
    order_number: String,
    user_id: String,
    seller: SellerDetails,
    buyer: BuyerDetails,
    place_of_supply: String,
    line_items: Vec<InvoiceLineItem>,
    tax_summary: TaxSummary,
    bank_details: Option<BankDetails>,
    payment: Option<InvoicePayment>,
    currency: String,
    issue_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
}

impl InvoiceDraft {
    pub fn from_order(order: &Order, terms: &InvoiceTerms, issued_at: DateTime<Utc>) -> Result<Self, InvoiceError> {
        if order.items.is_empty() { return Err(InvoiceError::NoItems); }

        let shipping = InvoiceAddress::from(&order.shipping_address);
        let inter_state = terms.seller.address.state_code != shipping.state_code;
        let gstin = order.buyer_gstin().map(str::to_string);

        let mut line_items = Vec::with_capacity(order.items.len());
        for (i, item) in order.items.iter().enumerate() {
            if item.quantity <= 0 {
                return Err(InvoiceError::NonPositiveQuantity { product_id: item.product_id.clone() });
            }
            let hsn_code = item.hsn_code.clone().filter(|h| !h.is_empty()).unwrap_or_else(|| terms.default_hsn_code.clone());
            let rate = terms.rate_for(&hsn_code);
            if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
                return Err(InvoiceError::InvalidRate(rate));
            }
            let quantity = Decimal::from(item.quantity);
            let mut taxable = item.price * quantity - item.discount;
            if terms.prices_include_tax {
                taxable /= Decimal::ONE + rate / Decimal::ONE_HUNDRED;
            }
            if taxable < Decimal::ZERO {
                return Err(InvoiceError::NegativeTaxableValue { product_id: item.product_id.clone() });
            }
            let mut line = InvoiceLineItem {
                id: (i + 1).to_string(),
                product_id: item.product_id.clone(),
                product_name: item.product_name.clone(),
                sku: item.sku.clone(),
                hsn_code,
                quantity,
                unit_price: item.price,
                discount: item.discount,
                taxable_value: taxable,
                ..Default::default()
            };
            line.apply_gst(rate, inter_state);
            line_items.push(line);
        }

        let payment = (!order.payment.method.is_empty()).then(|| InvoicePayment {
            method: order.payment.method.clone(),
            status: order.payment.status.clone(),
            transaction_id: order.payment.razorpay_payment_id.clone(),
            paid_at: order.payment.paid_at,
        });

        Ok(Self {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            user_id: order.user_id.clone(),
            seller: terms.seller.clone(),
            buyer: BuyerDetails {
                name: if order.customer_name.trim().is_empty() { "Customer".into() } else { order.customer_name.clone() },
                is_b2b: gstin.is_some(),
                gstin,
                pan: order.customer_pan.clone().filter(|p| !p.trim().is_empty()),
                email: order.customer_email.clone(),
                phone: order.customer_phone.clone(),
                billing_address: InvoiceAddress::from(order.billing()),
                shipping_address: shipping.clone(),
            },
            place_of_supply: shipping.state.clone(),
            tax_summary: TaxSummary::from_lines(&line_items),
            line_items,
            bank_details: terms.bank.clone(),
            payment,
            currency: terms.currency.clone(),
            issue_date: issued_at,
            due_date: issued_at + Duration::days(terms.due_days),
        })
    }

    pub fn tax_summary(&self) -> &TaxSummary { &self.tax_summary }
    pub fn line_items(&self) -> &[InvoiceLineItem] { &self.line_items }

    pub fn issue(self, id: String, invoice_number: String, created_by: String) -> Invoice {
        Invoice {
            id,
            invoice_number,
            order_id: self.order_id,
            order_number: self.order_number,
            user_id: self.user_id,
            invoice_type: InvoiceType::Regular,
            status: InvoiceStatus::Sent,
            seller: self.seller,
            place_of_delivery: self.place_of_supply.clone(),
            place_of_supply: self.place_of_supply,
            buyer: self.buyer,
            issue_date: self.issue_date,
            due_date: self.due_date,
            line_items: self.line_items,
            tax_summary: self.tax_summary,
            bank_details: self.bank_details,
            payment: self.payment,
            currency: self.currency,
            linked_invoice_id: None,
            created_at: self.issue_date,
            updated_at: self.issue_date,
            created_by,
        }
    }
}
