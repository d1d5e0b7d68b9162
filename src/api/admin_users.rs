use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiJson, AppState};
use crate::audit::ClientMeta;
use crate::auth::{ChangePasswordRequest, CreateAdminRequest, ListAdminsParams, UpdateAdminRequest};
use crate::domain::aggregates::AdminUser;
use crate::rbac::{role_catalog, Principal, PERMISSIONS};
use crate::{PaginatedResponse, Result};

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 500;

pub async fn list(State(s): State<AppState>, Query(params): Query<ListAdminsParams>) -> Result<Json<PaginatedResponse<AdminUser>>> {
    Ok(Json(s.auth.list_admins(params).await?))
}

pub async fn create(
    State(s): State<AppState>,
    Extension(actor): Extension<Principal>,
    meta: ClientMeta,
    ApiJson(req): ApiJson<CreateAdminRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let user = s.auth.create_admin(&actor, req, &meta).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "Admin user created successfully", "user": user }))))
}

pub async fn get(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<AdminUser>> {
    Ok(Json(s.auth.get_admin(&id).await?))
}

pub async fn update(
    State(s): State<AppState>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
    meta: ClientMeta,
    ApiJson(req): ApiJson<UpdateAdminRequest>,
) -> Result<Json<Value>> {
    let user = s.auth.update_admin(&actor, &id, req, &meta).await?;
    Ok(Json(json!({ "message": "Admin user updated successfully", "user": user })))
}

pub async fn remove(
    State(s): State<AppState>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
    meta: ClientMeta,
) -> Result<Json<Value>> {
    s.auth.delete_admin(&actor, &id, &meta).await?;
    Ok(Json(json!({ "message": "Admin user deleted successfully" })))
}

pub async fn change_password(
    State(s): State<AppState>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
    meta: ClientMeta,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<Json<Value>> {
    s.auth.change_password(&actor, &id, req, &meta).await?;
    Ok(Json(json!({ "message": "Password changed successfully" })))
}

pub async fn roles() -> Json<Value> {
    let roles = role_catalog();
    Json(json!({ "total": roles.len(), "roles": roles }))
}

pub async fn permissions() -> Json<Value> {
    Json(json!({ "total": PERMISSIONS.len(), "permissions": PERMISSIONS }))
}

#[derive(Debug, Deserialize)]
pub struct AuditLogParams {
    pub limit: Option<usize>,
}

pub async fn audit_logs(State(s): State<AppState>, Query(params): Query<AuditLogParams>) -> Result<Json<Value>> {
    let limit = params.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).clamp(1, MAX_AUDIT_LIMIT);
    let logs = s.audit.recent(limit).await?;
    Ok(Json(json!({ "total": logs.len(), "logs": logs })))
}
