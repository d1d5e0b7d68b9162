//! Admin audit trail
//!
//! Writes are advisory: they run off the request path and failures are only
//! logged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::aggregates::AdminUser;
use crate::rbac::Principal;
use crate::store::{collections, encode, Direction, DocumentStore, Query, StoreResult};

pub mod actions {
    pub const USER_CREATE: &str = "user.create";
    pub const USER_UPDATE: &str = "user.update";
    pub const USER_DELETE: &str = "user.delete";
    pub const USER_PASSWORD_CHANGE: &str = "user.password_change";
    pub const USER_LOGIN: &str = "user.login";
    pub const USER_LOGIN_FAILED: &str = "user.login_failed";
    pub const ACCESS_DENIED: &str = "access.denied";
    pub const INVOICE_CREATE: &str = "invoice.create";
    pub const INVOICE_STATUS_CHANGE: &str = "invoice.status_change";
    pub const INVOICE_BULK_GENERATE: &str = "invoice.bulk_generate";
    pub const PROMOTION_CREATE: &str = "promotion.create";
    pub const PROMOTION_UPDATE: &str = "promotion.update";
    pub const PROMOTION_DELETE: &str = "promotion.delete";
    pub const PROMOTION_REDEEM: &str = "promotion.redeem";
}

/// Caller address and agent, captured per request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip: String,
    pub user_agent: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub user_id: String,
    pub user_email: String,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub ip_address: String,
    pub user_agent: String,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn by(mut self, actor: &Principal) -> Self {
        self.user_id = actor.id.clone();
        self.user_email = actor.email.clone();
        self
    }

    pub fn by_user(mut self, id: &str, email: &str) -> Self {
        self.user_id = id.to_string();
        self.user_email = email.to_string();
        self
    }

    pub fn target(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn from_client(mut self, meta: &ClientMeta) -> Self {
        self.ip_address = meta.ip.clone();
        self.user_agent = meta.user_agent.clone();
        self
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdminSessionRecord {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub ip_address: String,
    pub user_agent: String,
    pub login_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self { Self { store, clock } }

    pub fn entry(&self, action: &str, resource: &str) -> AuditEntry {
        AuditEntry {
            id: Uuid::now_v7().to_string(),
            user_id: String::new(),
            user_email: String::new(),
            action: action.to_string(),
            resource: resource.to_string(),
            resource_id: None,
            details: Map::new(),
            ip_address: String::new(),
            user_agent: String::new(),
            success: true,
            created_at: self.clock.now(),
        }
    }

    /// Writes in the background.
    pub fn record(&self, entry: AuditEntry) {
        let log = self.clone();
        tokio::spawn(async move { log.write(entry).await });
    }

    pub async fn write(&self, entry: AuditEntry) {
        let result = match encode(&entry) {
            Ok(doc) => self.store.set(collections::ADMIN_AUDIT_LOGS, &entry.id, doc).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(action = %entry.action, error = %e, "failed to write audit log");
        }
    }

    pub fn record_session(&self, user: &AdminUser, meta: &ClientMeta) {
        let session = AdminSessionRecord {
            id: Uuid::now_v7().to_string(),
            user_id: user.id.clone(),
            email: user.email.clone(),
            ip_address: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            login_at: self.clock.now(),
            is_active: true,
        };
        let store = self.store.clone();
        tokio::spawn(async move {
            let result = match encode(&session) {
                Ok(doc) => store.set(collections::ADMIN_SESSIONS, &session.id, doc).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(user_id = %session.user_id, error = %e, "failed to write admin session");
            }
        });
    }

    pub async fn recent(&self, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        let docs = self
            .store
            .query(collections::ADMIN_AUDIT_LOGS, &Query::new().order_by("created_at", Direction::Desc).limit(limit))
            .await?;
        docs.iter().map(|d| d.decode(collections::ADMIN_AUDIT_LOGS)).collect()
    }
}
