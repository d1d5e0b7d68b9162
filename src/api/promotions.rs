use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};

use super::{ApiJson, AppState};
use crate::audit::ClientMeta;
use crate::domain::aggregates::{Promotion, PromotionUsage};
use crate::rbac::Principal;
use crate::services::{
    CreatePromotionRequest, ListPromotionsParams, PromoValidation, RedeemRequest, UpdatePromotionRequest, ValidatePromoRequest,
};
use crate::Result;

pub async fn validate(State(s): State<AppState>, ApiJson(req): ApiJson<ValidatePromoRequest>) -> Result<Json<PromoValidation>> {
    Ok(Json(s.promotions.validate(req).await?))
}

pub async fn active(State(s): State<AppState>) -> Result<Json<Value>> {
    let promotions = s.promotions.active_public().await?;
    Ok(Json(json!({ "promotions": promotions })))
}

pub async fn redeem(
    State(s): State<AppState>,
    Extension(principal): Extension<Principal>,
    meta: ClientMeta,
    ApiJson(req): ApiJson<RedeemRequest>,
) -> Result<Json<PromotionUsage>> {
    Ok(Json(s.promotions.redeem(&principal, req, &meta).await?))
}

pub async fn list(State(s): State<AppState>, Query(params): Query<ListPromotionsParams>) -> Result<Json<Value>> {
    let promotions = s.promotions.list(params).await?;
    Ok(Json(json!({ "count": promotions.len(), "promotions": promotions })))
}

pub async fn get(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Promotion>> {
    Ok(Json(s.promotions.get(&id).await?))
}

pub async fn create(
    State(s): State<AppState>,
    Extension(actor): Extension<Principal>,
    meta: ClientMeta,
    ApiJson(req): ApiJson<CreatePromotionRequest>,
) -> Result<(StatusCode, Json<Promotion>)> {
    Ok((StatusCode::CREATED, Json(s.promotions.create(&actor, req, &meta).await?)))
}

pub async fn update(
    State(s): State<AppState>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
    meta: ClientMeta,
    ApiJson(req): ApiJson<UpdatePromotionRequest>,
) -> Result<Json<Promotion>> {
    Ok(Json(s.promotions.update(&actor, &id, req, &meta).await?))
}

pub async fn remove(
    State(s): State<AppState>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
    meta: ClientMeta,
) -> Result<Json<Value>> {
    s.promotions.delete(&actor, &id, &meta).await?;
    Ok(Json(json!({ "message": "Promotion deleted successfully" })))
}

pub async fn initialize(
    State(s): State<AppState>,
    Extension(actor): Extension<Principal>,
    meta: ClientMeta,
) -> Result<Json<Value>> {
    let created = s.promotions.initialize_defaults(&actor, &meta).await?;
    Ok(Json(json!({ "message": "Default promotions initialized", "created": created })))
}
