//! HTTP surface: router, extractors and shared state

mod admin_users;
mod auth;
mod categories;
mod guard;
mod invoices;
mod promotions;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, ConnectInfo, FromRequest, FromRequestParts, Request},
    http::{header, request::Parts, HeaderValue, Method},
    routing::{delete, get, post, put, MethodRouter},
    Json, Router,
};
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::audit::{AuditLog, ClientMeta};
use crate::auth::{AuthService, CredentialHasher, TokenIssuer};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::ApiError;
use crate::events::EventPublisher;
use crate::rbac::{permissions::*, Requirement};
use crate::services::{CatalogService, InvoiceService, PromotionService};
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: Arc<TokenIssuer>,
    pub auth: Arc<AuthService>,
    pub invoices: Arc<InvoiceService>,
    pub promotions: Arc<PromotionService>,
    pub catalog: Arc<CatalogService>,
    pub audit: AuditLog,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        hasher: CredentialHasher,
        events: EventPublisher,
    ) -> Self {
        let tokens = Arc::new(TokenIssuer::new(&config.token_secret, clock.clone()));
        let audit = AuditLog::new(store.clone(), clock.clone());
        let auth = AuthService::new(store.clone(), clock.clone(), hasher, tokens.clone(), audit.clone(), events.clone());
        let invoices = InvoiceService::new(
            store.clone(),
            clock.clone(),
            audit.clone(),
            events.clone(),
            config.invoice_prefix.clone(),
            config.store_batch_limit,
        );
        let promotions = PromotionService::new(store.clone(), clock.clone(), audit.clone(), events);
        let catalog = CatalogService::new(store, clock);
        Self {
            config: Arc::new(config),
            tokens,
            auth: Arc::new(auth),
            invoices: Arc::new(invoices),
            promotions: Arc::new(promotions),
            catalog: Arc::new(catalog),
            audit,
        }
    }
}

/// JSON body whose rejections are reported through [`ApiError`].
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| ApiError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());
        let ip = forwarded
            .or_else(|| parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| addr.ip().to_string()))
            .unwrap_or_default();
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(ClientMeta { ip, user_agent })
    }
}

fn cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn router(state: AppState) -> Router {
    let gate = |requirement: Requirement, route: MethodRouter<AppState>| guard::gated(&state, requirement, route);
    let owner_or = |permission: &'static str| Requirement::OwnershipOrPermission { permission, param: "id" };
    let perm = Requirement::Permission;

    let routes = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({ "status": "healthy", "service": "tripund-api" })) }))
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/admin/auth/login", post(auth::admin_login))
        .route("/api/v1/promotions/validate", post(promotions::validate))
        .route("/api/v1/promotions/active", get(promotions::active))
        .route(
            "/api/v1/profile",
            gate(Requirement::Authenticated, get(auth::profile).put(auth::update_profile)),
        )
        .route("/api/v1/promotions/redeem", gate(Requirement::Authenticated, post(promotions::redeem)))
        .route("/api/v1/invoices", gate(Requirement::Authenticated, get(invoices::list)))
        .route("/api/v1/invoices/:id", gate(Requirement::Authenticated, get(invoices::get)))
        .route(
            "/api/v1/admin/users",
            gate(perm(USERS_VIEW), get(admin_users::list)).merge(gate(perm(USERS_CREATE), post(admin_users::create))),
        )
        .route(
            "/api/v1/admin/users/:id",
            gate(owner_or(USERS_VIEW), get(admin_users::get))
                .merge(gate(owner_or(USERS_EDIT), put(admin_users::update)))
                .merge(gate(perm(USERS_DELETE), delete(admin_users::remove))),
        )
        .route("/api/v1/admin/users/:id/password", gate(owner_or(USERS_EDIT), post(admin_users::change_password)))
        .route("/api/v1/admin/roles", gate(perm(USERS_VIEW), get(admin_users::roles)))
        .route("/api/v1/admin/permissions", gate(perm(USERS_VIEW), get(admin_users::permissions)))
        .route("/api/v1/admin/audit-logs", gate(perm(SYSTEM_LOGS), get(admin_users::audit_logs)))
        .route("/api/v1/admin/categories", gate(perm(CATEGORIES_VIEW), get(categories::list)))
        .route(
            "/api/v1/admin/invoices",
            gate(Requirement::AllOf(vec![ORDERS_VIEW, INVOICES_CREATE]), post(invoices::generate)),
        )
        .route(
            "/api/v1/admin/invoices/stats",
            gate(Requirement::AnyOf(vec![ORDERS_VIEW, REPORTS_VIEW]), get(invoices::stats)),
        )
        .route("/api/v1/admin/invoices/bulk", gate(perm(ORDERS_EDIT), post(invoices::bulk_generate)))
        .route("/api/v1/admin/invoices/:id/status", gate(perm(ORDERS_EDIT), put(invoices::update_status)))
        .route(
            "/api/v1/admin/promotions",
            gate(perm(PROMOTIONS_VIEW), get(promotions::list)).merge(gate(perm(PROMOTIONS_CREATE), post(promotions::create))),
        )
        .route("/api/v1/admin/promotions/initialize", gate(perm(PROMOTIONS_CREATE), post(promotions::initialize)))
        .route(
            "/api/v1/admin/promotions/:id",
            gate(perm(PROMOTIONS_VIEW), get(promotions::get))
                .merge(gate(perm(PROMOTIONS_EDIT), put(promotions::update)))
                .merge(gate(perm(PROMOTIONS_DELETE), delete(promotions::remove))),
        );

    let timeout = state.config.request_timeout;
    let cors_layer = cors(&state.config.cors_origins);
    routes
        .layer(TimeoutLayer::new(timeout))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
