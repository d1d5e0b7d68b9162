//! Route guard: token verification and permission predicates

use axum::{
    extract::{RawPathParams, Request, State},
    http::{header, HeaderMap},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::AppState;
use crate::audit::{actions, AuditLog, ClientMeta};
use crate::auth::{bearer_token, TokenError, TokenIssuer};
use crate::error::ApiError;
use crate::rbac::{Principal, Requirement};

#[derive(Clone)]
pub(super) struct Guard {
    tokens: Arc<TokenIssuer>,
    audit: AuditLog,
    requirement: Arc<Requirement>,
}

/// Wraps `route` so that it only runs for callers satisfying `requirement`.
/// The verified [`Principal`] is left in the request extensions.
pub(super) fn gated(state: &AppState, requirement: Requirement, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    let guard = Guard { tokens: state.tokens.clone(), audit: state.audit.clone(), requirement: Arc::new(requirement) };
    route.route_layer(middleware::from_fn_with_state(guard, enforce))
}

/// Principal carried by a valid bearer token.
pub fn authenticate(tokens: &TokenIssuer, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthenticated("Authorization header required".into()))?;
    let token = header
        .to_str()
        .ok()
        .and_then(bearer_token)
        .ok_or_else(|| ApiError::Unauthenticated("Invalid authorization format".into()))?;
    let claims = tokens.verify(token).map_err(|e| {
        debug!(error = %e, "rejected bearer token");
        match e {
            TokenError::Expired => ApiError::Unauthenticated("Token has expired".into()),
            _ => ApiError::Unauthenticated("Invalid or expired token".into()),
        }
    })?;
    claims.principal().map_err(|_| ApiError::Unauthenticated("Invalid token claims".into()))
}

async fn enforce(
    State(guard): State<Guard>,
    params: Option<RawPathParams>,
    meta: ClientMeta,
    mut req: Request,
    next: Next,
) -> Response {
    let principal = match authenticate(&guard.tokens, req.headers()) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let param = |name: &str| params.as_ref().and_then(|p| p.iter().find(|(key, _)| *key == name).map(|(_, value)| value));
    if !principal.allows(&guard.requirement, param) {
        let required = guard.requirement.describe();
        warn!(user_id = %principal.id, role = %principal.role, %required, path = %req.uri().path(), "access denied");
        guard.audit.record(
            guard
                .audit
                .entry(actions::ACCESS_DENIED, "routes")
                .by(&principal)
                .detail("required", required)
                .detail("method", req.method().as_str())
                .detail("path", req.uri().path())
                .from_client(&meta)
                .failed(),
        );
        return ApiError::forbidden().into_response();
    }

    req.extensions_mut().insert(principal);
    next.run(req).await
}
