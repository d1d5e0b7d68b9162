use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};

use super::{ApiJson, AppState};
use crate::audit::ClientMeta;
use crate::domain::aggregates::Invoice;
use crate::rbac::Principal;
use crate::services::{BulkGenerateResult, GenerateInvoiceRequest, InvoiceStats, ListInvoicesParams, UpdateStatusRequest};
use crate::{PaginatedResponse, Result};

/// 201 for a new invoice, 200 when the order was already invoiced.
pub async fn generate(
    State(s): State<AppState>,
    Extension(actor): Extension<Principal>,
    meta: ClientMeta,
    ApiJson(req): ApiJson<GenerateInvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>)> {
    let (invoice, created) = s.invoices.generate(&actor, req, &meta).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(invoice)))
}

pub async fn get(
    State(s): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<Invoice>> {
    Ok(Json(s.invoices.get(&principal, &id).await?))
}

pub async fn list(
    State(s): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<ListInvoicesParams>,
) -> Result<Json<PaginatedResponse<Invoice>>> {
    Ok(Json(s.invoices.list(&principal, params).await?))
}

pub async fn update_status(
    State(s): State<AppState>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
    meta: ClientMeta,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> Result<Json<Value>> {
    let invoice = s.invoices.update_status(&actor, &id, req.status, &meta).await?;
    Ok(Json(json!({ "message": "Invoice status updated successfully", "invoice": invoice })))
}

pub async fn bulk_generate(
    State(s): State<AppState>,
    Extension(actor): Extension<Principal>,
    meta: ClientMeta,
) -> Result<Json<BulkGenerateResult>> {
    Ok(Json(s.invoices.bulk_generate(&actor, &meta).await?))
}

pub async fn stats(State(s): State<AppState>) -> Result<Json<InvoiceStats>> {
    Ok(Json(s.invoices.stats().await?))
}
