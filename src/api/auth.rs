use axum::{extract::State, http::StatusCode, Extension, Json};

use super::{ApiJson, AppState};
use crate::audit::ClientMeta;
use crate::auth::{AdminSession, CustomerSession, LoginRequest, Profile, RegisterRequest, UpdateProfileRequest};
use crate::rbac::Principal;
use crate::Result;

pub async fn register(
    State(s): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<CustomerSession>)> {
    Ok((StatusCode::CREATED, Json(s.auth.register_customer(req).await?)))
}

pub async fn login(State(s): State<AppState>, ApiJson(req): ApiJson<LoginRequest>) -> Result<Json<CustomerSession>> {
    Ok(Json(s.auth.login_customer(req).await?))
}

pub async fn admin_login(
    State(s): State<AppState>,
    meta: ClientMeta,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<AdminSession>> {
    Ok(Json(s.auth.admin_login(req, &meta).await?))
}

pub async fn profile(State(s): State<AppState>, Extension(principal): Extension<Principal>) -> Result<Json<Profile>> {
    Ok(Json(s.auth.profile(&principal).await?))
}

pub async fn update_profile(
    State(s): State<AppState>,
    Extension(principal): Extension<Principal>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Json<Profile>> {
    Ok(Json(s.auth.update_profile(&principal, req).await?))
}
