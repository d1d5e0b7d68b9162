//! Promo code validation, redemption and administration

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::audit::{actions, AuditLog, ClientMeta};
use crate::clock::Clock;
use crate::domain::aggregates::{
    OrderStatus, Promotion, PromotionBanner, PromotionStatus, PromotionType, PromotionUsage, RedemptionContext,
};
use crate::domain::events::{DomainEvent, PromotionEvent};
use crate::error::{ApiError, Result};
use crate::events::EventPublisher;
use crate::rbac::{permissions, Principal};
use crate::store::{collections, encode, Direction, DocumentStore, FieldUpdate, Query, StoreError, WriteBatch};

pub const INVALID_CODE: &str = "Invalid promo code";
pub const VALID_CODE: &str = "Promo code is valid";

#[derive(Debug, Deserialize, Validate)]
pub struct ValidatePromoRequest {
    #[validate(length(min = 1))]
    pub code: String,
    pub order_total: Decimal,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PromoValidation {
    pub valid: bool,
    pub discount: Decimal,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub promotion_type: Option<PromotionType>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PromotionBanner>,
}

impl PromoValidation {
    fn rejected(message: impl Into<String>) -> Self {
        Self { valid: false, discount: Decimal::ZERO, promotion_type: None, message: message.into(), promotion: None }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RedeemRequest {
    #[validate(length(min = 1))]
    pub code: String,
    #[validate(length(min = 1))]
    pub order_id: String,
    pub user_id: Option<String>,
    pub discount_applied: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePromotionRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub promotion_type: PromotionType,
    pub discount: Decimal,
    #[serde(default)]
    pub status: PromotionStatus,
    #[serde(default)]
    pub max_uses: u32,
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
}

/// The mutable subset of a promotion.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdatePromotionRequest {
    pub description: Option<String>,
    pub status: Option<PromotionStatus>,
    pub show_in_banner: Option<bool>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_uses: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListPromotionsParams {
    pub status: Option<PromotionStatus>,
}

pub struct PromotionService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    audit: AuditLog,
    events: EventPublisher,
}

fn promotion_not_found() -> ApiError { ApiError::NotFound("Promotion not found".into()) }

fn code_taken() -> ApiError { ApiError::Conflict("Promo code already exists".into()) }

impl PromotionService {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, audit: AuditLog, events: EventPublisher) -> Self {
        Self { store, clock, audit, events }
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Promotion>> {
        let code = Promotion::normalize_code(code);
        let doc = self.store.find_one(collections::PROMOTIONS, Query::new().eq("code", json!(code))).await?;
        Ok(doc.map(|d| d.decode_with_id(collections::PROMOTIONS)).transpose()?)
    }

    async fn usage_count(&self, promotion_id: &str, user_id: &str) -> Result<u32> {
        let docs = self
            .store
            .query(
                collections::PROMOTION_USAGE,
                &Query::new().eq("promotion_id", json!(promotion_id)).eq("user_id", json!(user_id)),
            )
            .await?;
        Ok(docs.len() as u32)
    }

    async fn has_completed_orders(&self, user_id: &str) -> Result<bool> {
        let statuses = OrderStatus::COMPLETED_TAGS.iter().map(|s| json!(s)).collect();
        let doc = self
            .store
            .find_one(collections::ORDERS, Query::new().eq("user_id", json!(user_id)).any_of("status", statuses))
            .await?;
        Ok(doc.is_some())
    }

    /// Builds the evaluation context, reading usage and order history only
    /// when the promotion's rules need them.
    async fn context<'a>(&self, promo: &Promotion, order_total: Option<Decimal>, user_id: Option<&'a str>) -> Result<RedemptionContext<'a>> {
        let user_usage_count = match user_id {
            Some(user) if promo.needs_user_usage(user_id) => self.usage_count(&promo.id, user).await?,
            _ => 0,
        };
        let has_completed_orders = match user_id {
            Some(user) if promo.needs_order_history(user_id) => self.has_completed_orders(user).await?,
            _ => false,
        };
        Ok(RedemptionContext { now: self.clock.now(), order_total, user_id, user_usage_count, has_completed_orders })
    }

    /// Evaluates a code against an order without changing anything.
    pub async fn validate(&self, req: ValidatePromoRequest) -> Result<PromoValidation> {
        req.validate()?;
        let Some(promo) = self.find_by_code(&req.code).await? else {
            return Ok(PromoValidation::rejected(INVALID_CODE));
        };
        let user_id = req.user_id.as_deref().filter(|u| !u.is_empty());
        let ctx = self.context(&promo, Some(req.order_total), user_id).await?;

        if let Err(violation) = promo.check(&ctx) {
            debug!(code = %promo.code, %violation, "promo code rejected");
            return Ok(PromoValidation::rejected(violation.to_string()));
        }
        Ok(PromoValidation {
            valid: true,
            discount: promo.discount_for(req.order_total),
            promotion_type: Some(promo.promotion_type),
            message: VALID_CODE.into(),
            promotion: Some(PromotionBanner::from(&promo)),
        })
    }

    /// Records a redemption once per (promotion, order). Repeats return the
    /// first record unchanged.
    pub async fn redeem(&self, principal: &Principal, req: RedeemRequest, meta: &ClientMeta) -> Result<PromotionUsage> {
        req.validate()?;
        let user_id = req.user_id.clone().filter(|u| !u.is_empty()).unwrap_or_else(|| principal.id.clone());
        if user_id != principal.id && !principal.has_permission(permissions::ORDERS_EDIT) {
            return Err(ApiError::forbidden());
        }
        if req.discount_applied < Decimal::ZERO {
            return Err(ApiError::Validation("discount_applied cannot be negative".into()));
        }

        let promo = self.find_by_code(&req.code).await?.ok_or_else(|| ApiError::NotFound(INVALID_CODE.into()))?;
        let key = PromotionUsage::key(&promo.id, &req.order_id);
        if let Some(existing) = self.existing_usage(&key).await? {
            return Ok(existing);
        }

        let ctx = self.context(&promo, None, Some(&user_id)).await?;
        promo.check(&ctx).map_err(|v| ApiError::Validation(v.to_string()))?;

        let now = self.clock.now();
        let usage = PromotionUsage {
            id: key.clone(),
            promotion_id: promo.id.clone(),
            user_id: user_id.clone(),
            order_id: req.order_id.clone(),
            discount_applied: req.discount_applied,
            used_at: now,
        };
        let mut batch = WriteBatch::new();
        batch.create(collections::PROMOTION_USAGE, &key, encode(&usage)?);
        batch.update(collections::PROMOTIONS, &promo.id, vec![
            FieldUpdate::increment("used_count", 1),
            FieldUpdate::set("updated_at", encode(&now)?),
        ]);
        match self.store.commit(batch).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists { .. }) => {
                debug!(%key, "redemption already recorded");
                return self.existing_usage(&key).await?.ok_or_else(|| ApiError::Internal("redemption record vanished".into()));
            }
            Err(e) => return Err(e.into()),
        }

        info!(code = %promo.code, order_id = %usage.order_id, user_id = %usage.user_id, "promo code redeemed");
        self.audit.record(
            self.audit
                .entry(actions::PROMOTION_REDEEM, "promotions")
                .by(principal)
                .target(&promo.id)
                .detail("order_id", usage.order_id.clone())
                .detail("user_id", usage.user_id.clone())
                .from_client(meta),
        );
        self.events.emit(DomainEvent::Promotion(PromotionEvent::Redeemed {
            promotion_id: promo.id.clone(),
            order_id: usage.order_id.clone(),
            user_id: usage.user_id.clone(),
            discount: usage.discount_applied,
        }));
        Ok(usage)
    }

    async fn existing_usage(&self, key: &str) -> Result<Option<PromotionUsage>> {
        let doc = self.store.get(collections::PROMOTION_USAGE, key).await?;
        Ok(doc.map(|d| d.decode(collections::PROMOTION_USAGE)).transpose()?)
    }

    pub async fn list(&self, params: ListPromotionsParams) -> Result<Vec<Promotion>> {
        let mut query = Query::new().order_by("created_at", Direction::Desc);
        if let Some(status) = params.status {
            query = query.eq("status", encode(&status)?);
        }
        let docs = self.store.query(collections::PROMOTIONS, &query).await?;
        Ok(docs.iter().map(|d| d.decode_with_id(collections::PROMOTIONS)).collect::<std::result::Result<_, _>>()?)
    }

    pub async fn get(&self, id: &str) -> Result<Promotion> {
        let doc = self.store.get(collections::PROMOTIONS, id).await?.ok_or_else(promotion_not_found)?;
        Ok(doc.decode_with_id(collections::PROMOTIONS)?)
    }

    /// Live banner promotions with public fields only.
    pub async fn active_public(&self) -> Result<Vec<PromotionBanner>> {
        let query = Query::new()
            .eq("status", encode(&PromotionStatus::Active)?)
            .eq("show_in_banner", json!(true))
            .order_by("created_at", Direction::Desc);
        let now = self.clock.now();
        let mut banners = Vec::new();
        for doc in self.store.query(collections::PROMOTIONS, &query).await? {
            match doc.decode_with_id::<Promotion>(collections::PROMOTIONS) {
                Ok(promo) if promo.is_live(now) => banners.push(PromotionBanner::from(&promo)),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "skipping unreadable promotion"),
            }
        }
        Ok(banners)
    }

    pub async fn create(&self, actor: &Principal, req: CreatePromotionRequest, meta: &ClientMeta) -> Result<Promotion> {
        req.validate()?;
        if req.discount <= Decimal::ZERO {
            return Err(ApiError::Validation("discount must be positive".into()));
        }
        if req.promotion_type == PromotionType::Percentage && req.discount > Decimal::ONE_HUNDRED {
            return Err(ApiError::Validation("percentage discount cannot exceed 100".into()));
        }
        if req.end_date <= req.start_date {
            return Err(ApiError::Validation("end_date must be after start_date".into()));
        }
        if req.min_order_value < Decimal::ZERO || req.max_discount < Decimal::ZERO {
            return Err(ApiError::Validation("amounts cannot be negative".into()));
        }
        let code = Promotion::normalize_code(&req.code);
        if self.find_by_code(&code).await?.is_some() {
            return Err(code_taken());
        }

        let now = self.clock.now();
        let promo = Promotion {
            id: Uuid::now_v7().to_string(),
            code,
            description: req.description,
            promotion_type: req.promotion_type,
            discount: req.discount,
            status: req.status,
            max_uses: req.max_uses,
            used_count: 0,
            max_uses_per_user: req.max_uses_per_user,
            min_order_value: req.min_order_value,
            max_discount: req.max_discount,
            start_date: req.start_date,
            end_date: req.end_date,
            new_customers_only: req.new_customers_only,
            allowed_user_ids: req.allowed_user_ids,
            show_in_banner: req.show_in_banner,
            created_at: now,
            updated_at: now,
            created_by: actor.id.clone(),
        };
        let mut batch = WriteBatch::new();
        batch.create(collections::PROMOTION_CODES, &promo.code, json!({ "promotion_id": promo.id, "claimed_at": encode(&now)? }));
        batch.create(collections::PROMOTIONS, &promo.id, encode(&promo)?);
        match self.store.commit(batch).await {
            Err(StoreError::AlreadyExists { .. }) => return Err(code_taken()),
            committed => committed?,
        }

        info!(code = %promo.code, promotion_id = %promo.id, "promotion created");
        self.audit.record(
            self.audit.entry(actions::PROMOTION_CREATE, "promotions").by(actor).target(&promo.id).detail("code", promo.code.clone()).from_client(meta),
        );
        self.events.emit(DomainEvent::Promotion(PromotionEvent::Created { promotion_id: promo.id.clone(), code: promo.code.clone() }));
        Ok(promo)
    }

    /// Applies every supplied field in one atomic update.
    pub async fn update(&self, actor: &Principal, id: &str, req: UpdatePromotionRequest, meta: &ClientMeta) -> Result<Promotion> {
        let current = self.get(id).await?;
        let mut fields = vec![FieldUpdate::set("updated_at", encode(&self.clock.now())?)];
        let mut changed = Vec::new();
        if let Some(description) = req.description {
            fields.push(FieldUpdate::set("description", json!(description)));
            changed.push("description");
        }
        if let Some(status) = req.status {
            fields.push(FieldUpdate::set("status", encode(&status)?));
            changed.push("status");
        }
        if let Some(show) = req.show_in_banner {
            fields.push(FieldUpdate::set("show_in_banner", json!(show)));
            changed.push("show_in_banner");
        }
        if let Some(end_date) = req.end_date {
            if end_date <= current.start_date {
                return Err(ApiError::Validation("end_date must be after start_date".into()));
            }
            fields.push(FieldUpdate::set("end_date", encode(&end_date)?));
            changed.push("end_date");
        }
        if let Some(max_uses) = req.max_uses {
            fields.push(FieldUpdate::set("max_uses", json!(max_uses)));
            changed.push("max_uses");
        }

        let doc = self.store.update(collections::PROMOTIONS, id, &fields).await?;
        self.audit.record(
            self.audit
                .entry(actions::PROMOTION_UPDATE, "promotions")
                .by(actor)
                .target(id)
                .detail("fields", json!(changed))
                .from_client(meta),
        );
        Ok(doc.decode_with_id(collections::PROMOTIONS)?)
    }

    /// Removes the promotion and frees its code.
    pub async fn delete(&self, actor: &Principal, id: &str, meta: &ClientMeta) -> Result<()> {
        let promo = self.get(id).await?;
        let mut batch = WriteBatch::new();
        batch.delete(collections::PROMOTIONS, id);
        let claim = self.store.get(collections::PROMOTION_CODES, &promo.code).await?;
        if claim.is_some_and(|doc| doc.data.get("promotion_id").and_then(|v| v.as_str()) == Some(id)) {
            batch.delete(collections::PROMOTION_CODES, &promo.code);
        }
        self.store.commit(batch).await?;
        info!(promotion_id = %id, "promotion deleted");
        self.audit.record(self.audit.entry(actions::PROMOTION_DELETE, "promotions").by(actor).target(id).from_client(meta));
        Ok(())
    }

    /// Creates the storefront's standard codes that are not present yet and
    /// returns the codes created.
    pub async fn initialize_defaults(&self, actor: &Principal, meta: &ClientMeta) -> Result<Vec<String>> {
        let now = self.clock.now();
        let months = |n: u32| now.checked_add_months(Months::new(n)).unwrap_or(now);
        let defaults = [
            ("TRIPUND10", "10% off on all orders", 10, 10_000, 3, 999, 500, false, months(12)),
            ("FESTIVE15", "15% off on festive items", 15, 5_000, 2, 1_500, 750, false, months(3)),
            ("FIRST20", "20% off on first order", 20, 1_000, 1, 2_000, 1_000, true, months(6)),
        ];

        let mut created = Vec::new();
        for (code, description, discount, max_uses, per_user, min_order, cap, new_only, end_date) in defaults {
            let req = CreatePromotionRequest {
                code: code.into(),
                description: description.into(),
                promotion_type: PromotionType::Percentage,
                discount: Decimal::from(discount),
                status: PromotionStatus::Active,
                max_uses,
                max_uses_per_user: per_user,
                min_order_value: Decimal::from(min_order),
                max_discount: Decimal::from(cap),
                start_date: now,
                end_date,
                new_customers_only: new_only,
                allowed_user_ids: vec![],
                show_in_banner: true,
            };
            match self.create(actor, req, meta).await {
                Ok(promo) => created.push(promo.code),
                Err(ApiError::Conflict(_)) => debug!(code, "default promotion already present"),
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rbac::Role;
    use crate::store::testing::YieldingStore;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn d(s: &str) -> Decimal { s.parse().unwrap() }

    fn admin() -> Principal {
        Principal {
            id: "a1".into(),
            email: "a1@tripund.com".into(),
            role: Role::Admin,
            permissions: Role::Admin.baseline_permissions().into_iter().map(String::from).collect(),
        }
    }

    fn shopper(id: &str) -> Principal {
        Principal { id: id.into(), email: format!("{id}@example.com"), role: Role::Customer, permissions: Default::default() }
    }

    fn harness() -> (Arc<PromotionService>, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let audit = AuditLog::new(store.clone(), clock.clone());
        let svc = PromotionService::new(store.clone(), clock.clone(), audit, EventPublisher::disabled());
        (Arc::new(svc), store, clock)
    }

    fn welcome(now: DateTime<Utc>) -> CreatePromotionRequest {
        CreatePromotionRequest {
            code: "WELCOME10".into(),
            description: "Welcome offer".into(),
            promotion_type: PromotionType::Fixed,
            discount: d("100"),
            status: PromotionStatus::Active,
            max_uses: 0,
            max_uses_per_user: 1,
            min_order_value: d("1000"),
            max_discount: Decimal::ZERO,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(30),
            new_customers_only: true,
            allowed_user_ids: vec![],
            show_in_banner: false,
        }
    }

    fn check(code: &str, total: &str, user: Option<&str>) -> ValidatePromoRequest {
        ValidatePromoRequest { code: code.into(), order_total: d(total), user_id: user.map(String::from) }
    }

    fn redeem(order: &str) -> RedeemRequest {
        RedeemRequest { code: "WELCOME10".into(), order_id: order.into(), user_id: None, discount_applied: d("100") }
    }

    #[tokio::test]
    async fn unknown_codes_are_invalid_not_errors() {
        let (svc, _, _) = harness();
        let result = svc.validate(check("NOPE", "500", None)).await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.message, INVALID_CODE);
    }

    #[tokio::test]
    async fn welcome_offer_rules() {
        let (svc, store, clock) = harness();
        svc.create(&admin(), welcome(clock.now()), &ClientMeta::default()).await.unwrap();
        store
            .set(collections::ORDERS, "old", json!({ "user_id": "returning", "status": "delivered" }))
            .await
            .unwrap();

        let r = svc.validate(check("WELCOME10", "1500.00", Some("returning"))).await.unwrap();
        assert!(!r.valid);
        assert!(r.message.contains("new customers"));

        let r = svc.validate(check("WELCOME10", "999.00", Some("fresh"))).await.unwrap();
        assert!(!r.valid);
        assert_eq!(r.message, "Minimum order value required: ₹1000");

        let r = svc.validate(check("WELCOME10", "1500.00", Some("fresh"))).await.unwrap();
        assert!(r.valid);
        assert_eq!(r.discount, d("100"));
        assert_eq!(r.promotion_type, Some(PromotionType::Fixed));

        svc.redeem(&shopper("fresh"), redeem("ord-1"), &ClientMeta::default()).await.unwrap();
        let r = svc.validate(check("WELCOME10", "1500.00", Some("fresh"))).await.unwrap();
        assert!(!r.valid);
        assert_eq!(r.message, "You have already used this promo code");
    }

    #[tokio::test]
    async fn concurrent_redemptions_of_one_order_count_once() {
        let (svc, store, clock) = harness();
        let promo = svc
            .create(&admin(), CreatePromotionRequest { max_uses_per_user: 0, new_customers_only: false, ..welcome(clock.now()) }, &ClientMeta::default())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move { svc.redeem(&shopper("c1"), redeem("ord-7"), &ClientMeta::default()).await }));
        }
        for handle in handles {
            let usage = handle.await.unwrap().unwrap();
            assert_eq!(usage.id, PromotionUsage::key(&promo.id, "ord-7"));
        }

        let usages = store.query(collections::PROMOTION_USAGE, &Query::new()).await.unwrap();
        assert_eq!(usages.len(), 1);
        assert_eq!(svc.get(&promo.id).await.unwrap().used_count, 1);
    }

    #[tokio::test]
    async fn redeeming_for_someone_else_needs_orders_edit() {
        let (svc, _, clock) = harness();
        svc.create(&admin(), welcome(clock.now()), &ClientMeta::default()).await.unwrap();
        let on_behalf = RedeemRequest { user_id: Some("c2".into()), ..redeem("ord-9") };
        assert!(matches!(svc.redeem(&shopper("c1"), on_behalf, &ClientMeta::default()).await, Err(ApiError::Forbidden(_))));

        let on_behalf = RedeemRequest { user_id: Some("c2".into()), ..redeem("ord-9") };
        let usage = svc.redeem(&admin(), on_behalf, &ClientMeta::default()).await.unwrap();
        assert_eq!(usage.user_id, "c2");
    }

    #[tokio::test]
    async fn redemption_rechecks_limits() {
        let (svc, _, clock) = harness();
        let req = CreatePromotionRequest { max_uses: 1, max_uses_per_user: 0, new_customers_only: false, ..welcome(clock.now()) };
        svc.create(&admin(), req, &ClientMeta::default()).await.unwrap();
        svc.redeem(&shopper("c1"), redeem("ord-1"), &ClientMeta::default()).await.unwrap();
        let err = svc.redeem(&shopper("c2"), redeem("ord-2"), &ClientMeta::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(m) if m.contains("usage limit")));
    }

    #[tokio::test]
    async fn admin_lifecycle() {
        let (svc, _, clock) = harness();
        let promo = svc.create(&admin(), welcome(clock.now()), &ClientMeta::default()).await.unwrap();
        assert!(matches!(svc.create(&admin(), welcome(clock.now()), &ClientMeta::default()).await, Err(ApiError::Conflict(_))));

        let bad = CreatePromotionRequest { code: "HALF".into(), promotion_type: PromotionType::Percentage, discount: d("150"), ..welcome(clock.now()) };
        assert!(matches!(svc.create(&admin(), bad, &ClientMeta::default()).await, Err(ApiError::Validation(_))));

        let update = UpdatePromotionRequest { status: Some(PromotionStatus::Inactive), show_in_banner: Some(true), max_uses: Some(50), ..Default::default() };
        let updated = svc.update(&admin(), &promo.id, update, &ClientMeta::default()).await.unwrap();
        assert_eq!(updated.status, PromotionStatus::Inactive);
        assert_eq!(updated.max_uses, 50);
        assert_eq!(updated.code, "WELCOME10");

        let inactive = svc.list(ListPromotionsParams { status: Some(PromotionStatus::Inactive) }).await.unwrap();
        assert_eq!(inactive.len(), 1);

        svc.delete(&admin(), &promo.id, &ClientMeta::default()).await.unwrap();
        assert!(matches!(svc.get(&promo.id).await, Err(ApiError::NotFound(_))));
        assert!(matches!(svc.delete(&admin(), &promo.id, &ClientMeta::default()).await, Err(ApiError::NotFound(_))));

        // Deleting frees the code.
        let again = svc.create(&admin(), welcome(clock.now()), &ClientMeta::default()).await.unwrap();
        assert_ne!(again.id, promo.id);
    }

    #[tokio::test]
    async fn concurrent_creates_of_one_code_keep_a_single_promotion() {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn DocumentStore> = Arc::new(YieldingStore(memory.clone()));
        let clock = Arc::new(ManualClock::default());
        let audit = AuditLog::new(store.clone(), clock.clone());
        let svc = Arc::new(PromotionService::new(store, clock.clone(), audit, EventPublisher::disabled()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let (svc, req) = (svc.clone(), welcome(clock.now()));
            handles.push(tokio::spawn(async move { svc.create(&admin(), req, &ClientMeta::default()).await }));
        }
        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(matches!(e, ApiError::Conflict(_)), "unexpected error: {e}"),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(memory.query(collections::PROMOTIONS, &Query::new()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn defaults_are_created_once_and_shown_while_live() {
        let (svc, _, clock) = harness();
        let created = svc.initialize_defaults(&admin(), &ClientMeta::default()).await.unwrap();
        assert_eq!(created, vec!["TRIPUND10", "FESTIVE15", "FIRST20"]);
        assert!(svc.initialize_defaults(&admin(), &ClientMeta::default()).await.unwrap().is_empty());

        assert_eq!(svc.active_public().await.unwrap().len(), 3);
        clock.advance(Duration::days(200));
        let live: Vec<String> = svc.active_public().await.unwrap().into_iter().map(|b| b.code).collect();
        assert_eq!(live, vec!["TRIPUND10"]);

        let r = svc.validate(check("TRIPUND10", "10000", None)).await.unwrap();
        assert_eq!(r.discount, d("500"));
    }
}
