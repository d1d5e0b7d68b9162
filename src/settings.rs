//! Typed view of the `settings/main` document

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::domain::aggregates::{BankDetails, InvoiceTerms, SellerDetails};
use crate::domain::aggregates::invoice::InvoiceAddress;
use crate::domain::value_objects::state_code;
use crate::error::{ApiError, Result};
use crate::store::{collections, DocumentStore};

pub const SETTINGS_DOC: &str = "main";
pub const DEFAULT_DUE_DAYS: i64 = 30;
pub const DEFAULT_HSN_CODE: &str = "9403";

/// Seller block as stored. Empty strings fall back to the defaults.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct InvoiceSettings {
    pub registered_name: String,
    pub gstin: String,
    pub pan: String,
    pub email: String,
    pub phone: String,
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub home_state: String,
    pub home_state_code: String,
    pub postal_code: String,
    pub due_days: Option<i64>,
    pub prices_include_tax: bool,
    pub default_hsn_code: String,
    pub hsn_rates: BTreeMap<String, Decimal>,
    pub bank_details: Option<BankDetails>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PaymentSettings {
    pub tax_rate: Option<Decimal>,
    pub currency: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub invoice: Option<InvoiceSettings>,
    pub payment: PaymentSettings,
}

fn or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() { default } else { value }
}

impl StoreSettings {
    pub async fn load(store: &dyn DocumentStore) -> Result<Self> {
        let doc = store
            .get(collections::SETTINGS, SETTINGS_DOC)
            .await?
            .ok_or_else(|| ApiError::Misconfigured("Store settings not configured".into()))?;
        Ok(doc.decode(collections::SETTINGS)?)
    }

    /// Invoice terms; `due_days` from the request wins over the stored value.
    pub fn invoice_terms(&self, due_days: Option<i64>) -> Result<InvoiceTerms> {
        let inv = self
            .invoice
            .as_ref()
            .ok_or_else(|| ApiError::Misconfigured("Invoice settings not configured".into()))?;

        let state = or(&inv.home_state, "Maharashtra").to_string();
        let code = match inv.home_state_code.trim() {
            "" => state_code(&state).to_string(),
            explicit => explicit.to_string(),
        };
        let seller = SellerDetails {
            name: or(&inv.registered_name, "TRIPUND LIFESTYLE PRIVATE LIMITED").to_string(),
            gstin: inv.gstin.clone(),
            pan: inv.pan.clone(),
            email: or(&inv.email, "orders@tripundlifestyle.com").to_string(),
            phone: or(&inv.phone, "+91 9876543210").to_string(),
            address: InvoiceAddress {
                line1: or(&inv.address_line1, "TRIPUND LIFESTYLE PRIVATE LIMITED").to_string(),
                line2: inv.address_line2.clone(),
                city: or(&inv.city, "Mumbai").to_string(),
                state,
                state_code: code,
                postal_code: or(&inv.postal_code, "400001").to_string(),
                country: "India".into(),
            },
        };

        let due_days = due_days.or(inv.due_days).filter(|d| *d > 0).unwrap_or(DEFAULT_DUE_DAYS);
        Ok(InvoiceTerms {
            seller,
            gst_rate: self.payment.tax_rate.unwrap_or(Decimal::from(18)),
            hsn_rates: inv.hsn_rates.clone(),
            default_hsn_code: or(&inv.default_hsn_code, DEFAULT_HSN_CODE).to_string(),
            prices_include_tax: inv.prices_include_tax,
            due_days,
            bank: inv.bank_details.clone(),
            currency: or(&self.payment.currency, "INR").to_string(),
        })
    }
}
