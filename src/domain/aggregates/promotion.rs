//! Promotion aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::value_objects::percent_of;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionType { #[default] Percentage, Fixed }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus { #[default] Active, Inactive, Expired }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub promotion_type: PromotionType,
    pub discount: Decimal,
    pub status: PromotionStatus,
    #[serde(default)]
    pub max_uses: u32,
    #[serde(default)]
    pub used_count: u32,
    #[serde(default)]
    pub max_uses_per_user: u32,
    #[serde(default)]
    pub min_order_value: Decimal,
    #[serde(default)]
    pub max_discount: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub new_customers_only: bool,
    #[serde(default)]
    pub allowed_user_ids: Vec<String>,
    #[serde(default)]
    pub show_in_banner: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
}

/// Facts about the caller that the rules need beyond the promotion itself.
#[derive(Clone, Debug, Default)]
pub struct RedemptionContext<'a> {
    pub now: DateTime<Utc>,
    pub order_total: Option<Decimal>,
    pub user_id: Option<&'a str>,
    pub user_usage_count: u32,
    pub has_completed_orders: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleViolation {
    NotActive,
    NotStarted,
    Expired,
    BelowMinimum(Decimal),
    UsageLimitReached,
    PerUserLimitReached,
    NewCustomersOnly,
    NotAllowedForUser,
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotActive => f.write_str("This promo code is not active"),
            Self::NotStarted => f.write_str("This promo code is not yet active"),
            Self::Expired => f.write_str("This promo code has expired"),
            Self::BelowMinimum(min) => write!(f, "Minimum order value required: ₹{}", min.round_dp(0)),
            Self::UsageLimitReached => f.write_str("This promo code has reached its usage limit"),
            Self::PerUserLimitReached => f.write_str("You have already used this promo code"),
            Self::NewCustomersOnly => f.write_str("This promo code is only for new customers"),
            Self::NotAllowedForUser => f.write_str("This promo code is not available for your account"),
        }
    }
}

impl std::error::Error for RuleViolation {}

impl Promotion {
    pub fn normalize_code(code: &str) -> String { code.trim().to_string() }

    /// Whether per-user usage must be looked up to evaluate the rules.
    pub fn needs_user_usage(&self, user_id: Option<&str>) -> bool { user_id.is_some() && self.max_uses_per_user > 0 }

    pub fn needs_order_history(&self, user_id: Option<&str>) -> bool { user_id.is_some() && self.new_customers_only }

    /// Runs the rules in order and stops at the first failure. The minimum
    /// order check is skipped when no order total is known.
    pub fn check(&self, ctx: &RedemptionContext<'_>) -> Result<(), RuleViolation> {
        if self.status != PromotionStatus::Active { return Err(RuleViolation::NotActive); }
        if ctx.now < self.start_date { return Err(RuleViolation::NotStarted); }
        if ctx.now > self.end_date { return Err(RuleViolation::Expired); }
        if let Some(total) = ctx.order_total {
            if total < self.min_order_value { return Err(RuleViolation::BelowMinimum(self.min_order_value)); }
        }
        if self.max_uses > 0 && self.used_count >= self.max_uses { return Err(RuleViolation::UsageLimitReached); }
        if ctx.user_id.is_some() && self.max_uses_per_user > 0 && ctx.user_usage_count >= self.max_uses_per_user {
            return Err(RuleViolation::PerUserLimitReached);
        }
        if self.new_customers_only && ctx.user_id.is_some() && ctx.has_completed_orders {
            return Err(RuleViolation::NewCustomersOnly);
        }
        if !self.allowed_user_ids.is_empty() && !ctx.user_id.is_some_and(|u| self.allowed_user_ids.iter().any(|a| a == u)) {
            return Err(RuleViolation::NotAllowedForUser);
        }
        Ok(())
    }

    pub fn discount_for(&self, order_total: Decimal) -> Decimal {
        let d = match self.promotion_type {
            PromotionType::Percentage => {
                let d = percent_of(order_total, self.discount);
                if self.max_discount > Decimal::ZERO { d.min(self.max_discount) } else { d }
            }
            PromotionType::Fixed => self.discount,
        };
        d.min(order_total).max(Decimal::ZERO)
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == PromotionStatus::Active && self.start_date <= now && now <= self.end_date
    }
}

/// Public subset shown on storefront banners.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PromotionBanner {
    pub code: String,
    pub description: String,
    #[serde(rename = "type")]
    pub promotion_type: PromotionType,
    pub discount: Decimal,
    pub min_order_value: Decimal,
    pub max_discount: Decimal,
    pub end_date: DateTime<Utc>,
}

impl From<&Promotion> for PromotionBanner {
    fn from(p: &Promotion) -> Self {
        Self {
            code: p.code.clone(),
            description: p.description.clone(),
            promotion_type: p.promotion_type,
            discount: p.discount,
            min_order_value: p.min_order_value,
            max_discount: p.max_discount,
            end_date: p.end_date,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromotionUsage {
    pub id: String,
    pub promotion_id: String,
    pub user_id: String,
    pub order_id: String,
    pub discount_applied: Decimal,
    pub used_at: DateTime<Utc>,
}

impl PromotionUsage {
    /// One usage record per (promotion, order).
    pub fn key(promotion_id: &str, order_id: &str) -> String { format!("{promotion_id}_{order_id}") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn d(s: &str) -> Decimal { s.parse().unwrap() }

    fn promo(kind: PromotionType, discount: &str) -> Promotion {
        let now = Utc::now();
        Promotion {
            id: "p1".into(),
            code: "WELCOME10".into(),
            description: String::new(),
            promotion_type: kind,
            discount: d(discount),
            status: PromotionStatus::Active,
            max_uses: 0,
            used_count: 0,
            max_uses_per_user: 0,
            min_order_value: Decimal::ZERO,
            max_discount: Decimal::ZERO,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(1),
            new_customers_only: false,
            allowed_user_ids: vec![],
            show_in_banner: false,
            created_at: now,
            updated_at: now,
            created_by: "system".into(),
        }
    }

    fn ctx(total: &str, user: Option<&'static str>) -> RedemptionContext<'static> {
        RedemptionContext { now: Utc::now(), order_total: Some(d(total)), user_id: user, ..Default::default() }
    }

    #[test]
    fn percentage_discount_is_capped() {
        let mut p = promo(PromotionType::Percentage, "15");
        assert_eq!(p.discount_for(d("1000")), d("150"));
        p.max_discount = d("100");
        assert_eq!(p.discount_for(d("1000")), d("100"));
    }

    #[test]
    fn discount_never_exceeds_order() {
        let p = promo(PromotionType::Fixed, "500");
        assert_eq!(p.discount_for(d("320")), d("320"));
        let p = promo(PromotionType::Percentage, "150");
        assert_eq!(p.discount_for(d("80")), d("80"));
    }

    #[test]
    fn rules_short_circuit_in_order() {
        let mut p = promo(PromotionType::Fixed, "100");
        p.status = PromotionStatus::Inactive;
        p.min_order_value = d("1000");
        assert_eq!(p.check(&ctx("10", None)), Err(RuleViolation::NotActive));

        p.status = PromotionStatus::Active;
        assert_eq!(p.check(&ctx("10", None)), Err(RuleViolation::BelowMinimum(d("1000"))));

        p.end_date = Utc::now() - Duration::hours(1);
        assert_eq!(p.check(&ctx("10", None)), Err(RuleViolation::Expired));

        p.end_date = Utc::now() + Duration::days(3);
        p.start_date = Utc::now() + Duration::days(1);
        assert_eq!(p.check(&ctx("5000", None)), Err(RuleViolation::NotStarted));
    }

    #[test]
    fn usage_limits() {
        let mut p = promo(PromotionType::Fixed, "100");
        p.max_uses = 3;
        p.used_count = 3;
        assert_eq!(p.check(&ctx("500", None)), Err(RuleViolation::UsageLimitReached));

        p.used_count = 1;
        p.max_uses_per_user = 1;
        let mut c = ctx("500", Some("c1"));
        c.user_usage_count = 1;
        assert_eq!(p.check(&c), Err(RuleViolation::PerUserLimitReached));
        c.user_id = None;
        assert_eq!(p.check(&c), Ok(()));
    }

    #[test]
    fn customer_targeting() {
        let mut p = promo(PromotionType::Fixed, "100");
        p.new_customers_only = true;
        let mut c = ctx("500", Some("c1"));
        c.has_completed_orders = true;
        assert_eq!(p.check(&c), Err(RuleViolation::NewCustomersOnly));

        p.new_customers_only = false;
        p.allowed_user_ids = vec!["c2".into()];
        assert_eq!(p.check(&c), Err(RuleViolation::NotAllowedForUser));
        assert_eq!(p.check(&ctx("500", None)), Err(RuleViolation::NotAllowedForUser));
        assert_eq!(p.check(&ctx("500", Some("c2"))), Ok(()));
    }

    #[test]
    fn messages() {
        assert_eq!(RuleViolation::BelowMinimum(d("1000")).to_string(), "Minimum order value required: ₹1000");
        assert_eq!(RuleViolation::NewCustomersOnly.to_string(), "This promo code is only for new customers");
    }

    #[test]
    fn usage_key_is_deterministic() {
        assert_eq!(PromotionUsage::key("p1", "o9"), "p1_o9");
    }
}
