//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::aggregates::InvoiceStatus;
use crate::rbac::Role;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", rename_all = "snake_case")]
pub enum DomainEvent {
    Admin(AdminEvent),
    Customer(CustomerEvent),
    Invoice(InvoiceEvent),
    Promotion(PromotionEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdminEvent {
    Created { user_id: String, role: Role, created_by: String },
    Updated { user_id: String, updated_by: String },
    Deactivated { user_id: String, deactivated_by: String },
    LockedOut { user_id: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CustomerEvent {
    Registered { user_id: String, email: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InvoiceEvent {
    Issued { invoice_id: String, invoice_number: String, order_id: String, final_amount: Decimal },
    StatusChanged { invoice_id: String, from: InvoiceStatus, to: InvoiceStatus },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PromotionEvent {
    Created { promotion_id: String, code: String },
    Redeemed { promotion_id: String, order_id: String, user_id: String, discount: Decimal },
}

impl DomainEvent {
    pub fn subject(&self) -> String {
        let (aggregate, event) = match self {
            Self::Admin(e) => ("admin", match e {
                AdminEvent::Created { .. } => "created",
                AdminEvent::Updated { .. } => "updated",
                AdminEvent::Deactivated { .. } => "deactivated",
                AdminEvent::LockedOut { .. } => "locked_out",
            }),
            Self::Customer(CustomerEvent::Registered { .. }) => ("customer", "registered"),
            Self::Invoice(e) => ("invoice", match e {
                InvoiceEvent::Issued { .. } => "issued",
                InvoiceEvent::StatusChanged { .. } => "status_changed",
            }),
            Self::Promotion(e) => ("promotion", match e {
                PromotionEvent::Created { .. } => "created",
                PromotionEvent::Redeemed { .. } => "redeemed",
            }),
        };
        format!("tripund.{aggregate}.{event}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_and_payloads() {
        let e = DomainEvent::Invoice(InvoiceEvent::StatusChanged { invoice_id: "i1".into(), from: InvoiceStatus::Sent, to: InvoiceStatus::Paid });
        assert_eq!(e.subject(), "tripund.invoice.status_changed");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["aggregate"], "invoice");
        assert_eq!(json["event"], "status_changed");
        assert_eq!(json["to"], "paid");
    }
}
