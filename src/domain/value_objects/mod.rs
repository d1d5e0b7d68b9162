//! Value objects

mod state_code;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use state_code::{state_code, state_name, UNKNOWN_STATE_CODE};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must be at least {0} characters")]
    PasswordTooShort(usize),
    #[error("password must contain upper and lower case letters, a digit and a punctuation character")]
    WeakPassword,
}

/// Email address, trimmed and lower-cased so lookups are case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(value: impl Into<String>) -> Result<Self, ValueError> {
        let value = value.into().trim().to_lowercase();
        if !validator::validate_email(value.as_str()) { return Err(ValueError::InvalidEmail); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Email {
    type Error = ValueError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(value) }
}

impl From<Email> for String {
    fn from(email: Email) -> Self { email.0 }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

pub const MIN_ADMIN_PASSWORD_LEN: usize = 8;
pub const MIN_CUSTOMER_PASSWORD_LEN: usize = 6;

/// Admin password rule: length plus one each of upper, lower, digit and ASCII
/// punctuation.
pub fn check_password_strength(password: &str) -> Result<(), ValueError> {
    if password.chars().count() < MIN_ADMIN_PASSWORD_LEN {
        return Err(ValueError::PasswordTooShort(MIN_ADMIN_PASSWORD_LEN));
    }
    let upper = password.chars().any(|c| c.is_ascii_uppercase());
    let lower = password.chars().any(|c| c.is_ascii_lowercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let special = password.chars().any(|c| c.is_ascii_punctuation());
    if upper && lower && digit && special { Ok(()) } else { Err(ValueError::WeakPassword) }
}

pub fn round_half_up(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

pub fn percent_of(amount: Decimal, rate: Decimal) -> Decimal { amount * rate / Decimal::ONE_HUNDRED }

/// Invoice number `BRAND-YYYYMM-NNNN`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    pub fn month_prefix(brand: &str, at: DateTime<Utc>) -> String { format!("{}-{}-", brand, at.format("%Y%m")) }

    /// Number that follows `previous` within the month, or the first one.
    pub fn following(prefix: &str, previous: Option<&str>) -> Self {
        let last = previous.and_then(|p| Self::sequence_of(prefix, p)).unwrap_or(0);
        Self(format!("{}{:04}", prefix, last + 1))
    }

    pub fn sequence_of(prefix: &str, number: &str) -> Option<u32> {
        number.strip_prefix(prefix)?.parse().ok()
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_string(self) -> String { self.0 }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}
