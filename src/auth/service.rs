//! Registration, login, profiles and admin account management

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::{admin_token_ttl, customer_token_ttl, CredentialHasher, TokenIssuer};
use crate::audit::{actions, AuditLog, ClientMeta};
use crate::clock::Clock;
use crate::domain::aggregates::admin_user::{lockout_window, MAX_FAILED_LOGINS};
use crate::domain::aggregates::{AdminRecord, AdminStatus, AdminUser, Customer, CustomerProfile, CustomerRecord, PasswordPolicy};
use crate::domain::events::{AdminEvent, CustomerEvent, DomainEvent};
use crate::domain::value_objects::{check_password_strength, Email};
use crate::error::{ApiError, Result};
use crate::events::EventPublisher;
use crate::rbac::{is_known_permission, permissions, Principal, Role};
use crate::store::{collections, encode, Direction, DocumentStore, FieldUpdate, Query, StoreError, WriteBatch};
use crate::{PageParams, PaginatedResponse};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
    #[validate(length(min = 1))]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAdminRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
    pub role: Role,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub department: Option<String>,
    pub avatar: Option<String>,
}

/// Merge update: absent fields are left untouched.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAdminRequest {
    #[validate(length(min = 1))]
    pub first_name: Option<String>,
    #[validate(length(min = 1))]
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub avatar: Option<String>,
    pub role: Option<Role>,
    pub status: Option<AdminStatus>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1))]
    pub first_name: Option<String>,
    #[validate(length(min = 1))]
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListAdminsParams {
    pub status: Option<AdminStatus>,
    pub role: Option<Role>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CustomerSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Customer,
}

#[derive(Debug, Serialize)]
pub struct AdminSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AdminUser,
    pub require_password_change: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Profile {
    Customer(Customer),
    Admin(AdminUser),
}

pub struct AuthService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    hasher: CredentialHasher,
    tokens: Arc<TokenIssuer>,
    audit: AuditLog,
    events: EventPublisher,
}

fn check_permissions(extras: &[String]) -> Result<()> {
    match extras.iter().find(|p| !is_known_permission(p)) {
        Some(unknown) => Err(ApiError::Validation(format!("unknown permission: {unknown}"))),
        None => Ok(()),
    }
}

fn admin_not_found() -> ApiError { ApiError::NotFound("User not found".into()) }

fn email_in_use() -> ApiError { ApiError::Conflict("Email already in use".into()) }

/// Claim on an address, keyed by the lower-cased email.
fn email_claim(user_id: &str, at: DateTime<Utc>) -> Result<Value> {
    Ok(json!({ "user_id": user_id, "claimed_at": encode(&at)? }))
}

impl AuthService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        hasher: CredentialHasher,
        tokens: Arc<TokenIssuer>,
        audit: AuditLog,
        events: EventPublisher,
    ) -> Self {
        Self { store, clock, hasher, tokens, audit, events }
    }

    // -------------------------------------------------------------------------
    // Customers
    // -------------------------------------------------------------------------

    pub async fn register_customer(&self, req: RegisterRequest) -> Result<CustomerSession> {
        req.validate()?;
        let email = Email::parse(req.email)?;
        let taken = self.store.find_one(collections::USERS, Query::new().eq("email", json!(email.as_str()))).await?;
        if taken.is_some() {
            return Err(ApiError::Conflict("Email already registered".into()));
        }

        let now = self.clock.now();
        let customer = Customer {
            id: Uuid::now_v7().to_string(),
            email: email.into(),
            profile: CustomerProfile {
                first_name: req.first_name.trim().to_string(),
                last_name: req.last_name.trim().to_string(),
                phone: req.phone.trim().to_string(),
                avatar: None,
            },
            role: Role::Customer,
            created_at: now,
            updated_at: now,
            last_login_at: Some(now),
        };
        let record = CustomerRecord { customer, password_hash: self.hasher.hash_async(req.password).await? };
        let mut batch = WriteBatch::new();
        batch.create(collections::USER_EMAILS, &record.customer.email, email_claim(&record.customer.id, now)?);
        batch.create(collections::USERS, &record.customer.id, encode(&record)?);
        match self.store.commit(batch).await {
            Err(StoreError::AlreadyExists { .. }) => return Err(ApiError::Conflict("Email already registered".into())),
            committed => committed?,
        }
        info!(user_id = %record.customer.id, "customer registered");

        self.events.emit(DomainEvent::Customer(CustomerEvent::Registered {
            user_id: record.customer.id.clone(),
            email: record.customer.email.clone(),
        }));
        self.customer_session(record.customer)
    }

    pub async fn login_customer(&self, req: LoginRequest) -> Result<CustomerSession> {
        req.validate()?;
        let email = Email::parse(req.email).map_err(|_| ApiError::invalid_credentials())?;
        let doc = self
            .store
            .find_one(collections::USERS, Query::new().eq("email", json!(email.as_str())))
            .await?
            .ok_or_else(ApiError::invalid_credentials)?;
        let record: CustomerRecord = doc.decode(collections::USERS)?;
        if !self.hasher.verify_async(req.password, record.password_hash).await {
            return Err(ApiError::invalid_credentials());
        }

        let now = self.clock.now();
        let doc = self
            .store
            .update(collections::USERS, &record.customer.id, &[FieldUpdate::set("last_login_at", encode(&now)?)])
            .await?;
        let record: CustomerRecord = doc.decode(collections::USERS)?;
        self.customer_session(record.customer)
    }

    fn customer_session(&self, user: Customer) -> Result<CustomerSession> {
        let names = (user.profile.first_name.as_str(), user.profile.last_name.as_str());
        let issued = self
            .tokens
            .issue(&user.principal(), Some(names), customer_token_ttl())
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(CustomerSession { token: issued.token, expires_at: issued.expires_at, user })
    }

    // -------------------------------------------------------------------------
    // Admin login
    // -------------------------------------------------------------------------

    /// Locked accounts are refused before the password hash is consulted.
    pub async fn admin_login(&self, req: LoginRequest, meta: &ClientMeta) -> Result<AdminSession> {
        req.validate()?;
        let email = Email::parse(req.email).map_err(|_| ApiError::invalid_credentials())?;
        let now = self.clock.now();

        let Some(record) = self.find_admin_by_email(email.as_str()).await? else {
            self.audit.record(
                self.audit
                    .entry(actions::USER_LOGIN_FAILED, "admin_auth")
                    .by_user("", email.as_str())
                    .detail("reason", "user_not_found")
                    .from_client(meta)
                    .failed(),
            );
            return Err(ApiError::invalid_credentials());
        };
        let user = &record.user;

        if user.password_policy.is_locked(now) {
            self.audit.record(
                self.audit
                    .entry(actions::USER_LOGIN_FAILED, "admin_auth")
                    .by_user(&user.id, &user.email)
                    .detail("reason", "account_locked")
                    .from_client(meta)
                    .failed(),
            );
            return Err(ApiError::Locked("Account is temporarily locked. Try again later".into()));
        }
        if !user.is_active() {
            return Err(ApiError::Forbidden("Account is not active".into()));
        }

        if !self.hasher.verify_async(req.password, record.password_hash.clone()).await {
            self.record_failed_login(user, now).await?;
            self.audit.record(
                self.audit
                    .entry(actions::USER_LOGIN_FAILED, "admin_auth")
                    .by_user(&user.id, &user.email)
                    .detail("reason", "invalid_password")
                    .from_client(meta)
                    .failed(),
            );
            return Err(ApiError::invalid_credentials());
        }

        let doc = self
            .store
            .update(
                collections::ADMIN_USERS,
                &user.id,
                &[
                    FieldUpdate::set("password_policy.failed_login_attempts", json!(0)),
                    FieldUpdate::set("password_policy.locked_until", Value::Null),
                    FieldUpdate::set("last_login_at", encode(&now)?),
                ],
            )
            .await?;
        let user = doc.decode::<AdminRecord>(collections::ADMIN_USERS)?.user;

        self.audit.record_session(&user, meta);
        self.audit.record(self.audit.entry(actions::USER_LOGIN, "admin_auth").by_user(&user.id, &user.email).from_client(meta));
        info!(user_id = %user.id, role = %user.role, "admin logged in");

        let issued = self
            .tokens
            .issue(&user.principal(), Some((user.first_name.as_str(), user.last_name.as_str())), admin_token_ttl())
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(AdminSession {
            token: issued.token,
            expires_at: issued.expires_at,
            require_password_change: user.password_policy.require_change,
            user,
        })
    }

    async fn record_failed_login(&self, user: &AdminUser, now: DateTime<Utc>) -> Result<()> {
        // A lapsed lock starts a fresh count.
        let fields = if user.password_policy.lock_lapsed(now) {
            vec![
                FieldUpdate::set("password_policy.failed_login_attempts", json!(1)),
                FieldUpdate::set("password_policy.locked_until", Value::Null),
            ]
        } else {
            vec![FieldUpdate::increment("password_policy.failed_login_attempts", 1)]
        };
        let doc = self.store.update(collections::ADMIN_USERS, &user.id, &fields).await?;
        let attempts = doc.decode::<AdminRecord>(collections::ADMIN_USERS)?.user.password_policy.failed_login_attempts;

        if attempts >= MAX_FAILED_LOGINS {
            let until = now + lockout_window();
            self.store
                .update(collections::ADMIN_USERS, &user.id, &[FieldUpdate::set("password_policy.locked_until", encode(&until)?)])
                .await?;
            warn!(user_id = %user.id, attempts, %until, "admin account locked");
            self.events.emit(DomainEvent::Admin(AdminEvent::LockedOut { user_id: user.id.clone() }));
        }
        Ok(())
    }

    /// Prefers the active record when inactive ones share the address.
    async fn find_admin_by_email(&self, email: &str) -> Result<Option<AdminRecord>> {
        let docs = self.store.query(collections::ADMIN_USERS, &Query::new().eq("email", json!(email))).await?;
        let mut records = docs
            .iter()
            .map(|d| d.decode::<AdminRecord>(collections::ADMIN_USERS))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        records.sort_by_key(|r| !r.user.is_active());
        Ok(records.into_iter().next())
    }

    /// Stages removal of the address claim when `user` holds it, so a
    /// deactivated account frees its email.
    async fn release_email(&self, batch: &mut WriteBatch, user: &AdminUser) -> Result<()> {
        if let Some(doc) = self.store.get(collections::ADMIN_EMAILS, &user.email).await? {
            if doc.data.get("user_id").and_then(Value::as_str) == Some(user.id.as_str()) {
                batch.delete(collections::ADMIN_EMAILS, &user.email);
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Profile
    // -------------------------------------------------------------------------

    pub async fn profile(&self, principal: &Principal) -> Result<Profile> {
        if principal.role == Role::Customer {
            let doc = self
                .store
                .get(collections::USERS, &principal.id)
                .await?
                .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
            Ok(Profile::Customer(doc.decode::<CustomerRecord>(collections::USERS)?.customer))
        } else {
            Ok(Profile::Admin(self.load_admin(&principal.id).await?.user))
        }
    }

    pub async fn update_profile(&self, principal: &Principal, req: UpdateProfileRequest) -> Result<Profile> {
        req.validate()?;
        if principal.role != Role::Customer {
            let update = UpdateAdminRequest {
                first_name: req.first_name,
                last_name: req.last_name,
                department: req.department,
                avatar: req.avatar,
                ..Default::default()
            };
            return self.update_admin(principal, &principal.id, update, &ClientMeta::default()).await.map(Profile::Admin);
        }

        let mut fields = vec![FieldUpdate::set("updated_at", encode(&self.clock.now())?)];
        for (path, value) in [
            ("profile.first_name", req.first_name),
            ("profile.last_name", req.last_name),
            ("profile.phone", req.phone),
            ("profile.avatar", req.avatar),
        ] {
            if let Some(v) = value {
                fields.push(FieldUpdate::set(path, json!(v.trim())));
            }
        }
        if self.store.get(collections::USERS, &principal.id).await?.is_none() {
            return Err(ApiError::NotFound("User not found".into()));
        }
        let doc = self.store.update(collections::USERS, &principal.id, &fields).await?;
        Ok(Profile::Customer(doc.decode::<CustomerRecord>(collections::USERS)?.customer))
    }

    // -------------------------------------------------------------------------
    // Admin accounts
    // -------------------------------------------------------------------------

    async fn load_admin(&self, id: &str) -> Result<AdminRecord> {
        let doc = self.store.get(collections::ADMIN_USERS, id).await?.ok_or_else(admin_not_found)?;
        Ok(doc.decode(collections::ADMIN_USERS)?)
    }

    pub async fn get_admin(&self, id: &str) -> Result<AdminUser> { Ok(self.load_admin(id).await?.user) }

    pub async fn list_admins(&self, params: ListAdminsParams) -> Result<PaginatedResponse<AdminUser>> {
        let mut query = Query::new().order_by("created_at", Direction::Desc);
        if let Some(status) = params.status {
            query = query.eq("status", encode(&status)?);
        }
        if let Some(role) = params.role {
            query = query.eq("role", json!(role.as_str()));
        }
        let users = self
            .store
            .query(collections::ADMIN_USERS, &query)
            .await?
            .iter()
            .map(|d| d.decode::<AdminRecord>(collections::ADMIN_USERS).map(|r| r.user))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(PaginatedResponse::from_all(users, PageParams { page: params.page, per_page: params.per_page }))
    }

    pub async fn create_admin(&self, actor: &Principal, req: CreateAdminRequest, meta: &ClientMeta) -> Result<AdminUser> {
        req.validate()?;
        if !req.role.is_admin() {
            return Err(ApiError::Validation("role must be an admin role".into()));
        }
        if req.role.level() > actor.role.level() {
            return Err(ApiError::Forbidden("Cannot create a user with a higher role than your own".into()));
        }
        check_permissions(&req.permissions)?;
        check_password_strength(&req.password)?;
        let email = Email::parse(req.email)?;

        let existing = self.store.query(collections::ADMIN_USERS, &Query::new().eq("email", json!(email.as_str()))).await?;
        for doc in &existing {
            if doc.decode::<AdminRecord>(collections::ADMIN_USERS)?.user.status != AdminStatus::Inactive {
                return Err(email_in_use());
            }
        }

        let now = self.clock.now();
        let user = AdminUser {
            id: Uuid::now_v7().to_string(),
            email: email.into(),
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            role: req.role,
            permissions: req.role.effective_permissions(&req.permissions),
            status: AdminStatus::Active,
            avatar: req.avatar,
            department: req.department,
            last_login_at: None,
            created_at: now,
            updated_at: now,
            created_by: actor.id.clone(),
            password_policy: PasswordPolicy { last_changed: Some(now), ..Default::default() },
        };
        let record = AdminRecord { user, password_hash: self.hasher.hash_async(req.password).await? };
        let mut batch = WriteBatch::new();
        batch.create(collections::ADMIN_EMAILS, &record.user.email, email_claim(&record.user.id, now)?);
        batch.create(collections::ADMIN_USERS, &record.user.id, encode(&record)?);
        match self.store.commit(batch).await {
            Err(StoreError::AlreadyExists { .. }) => return Err(email_in_use()),
            committed => committed?,
        }
        let user = record.user;

        info!(user_id = %user.id, role = %user.role, created_by = %actor.id, "admin user created");
        self.audit.record(
            self.audit
                .entry(actions::USER_CREATE, "admin_users")
                .by(actor)
                .target(&user.id)
                .detail("email", user.email.clone())
                .detail("role", user.role.as_str())
                .from_client(meta),
        );
        self.events.emit(DomainEvent::Admin(AdminEvent::Created {
            user_id: user.id.clone(),
            role: user.role,
            created_by: actor.id.clone(),
        }));
        Ok(user)
    }

    pub async fn update_admin(&self, actor: &Principal, id: &str, req: UpdateAdminRequest, meta: &ClientMeta) -> Result<AdminUser> {
        req.validate()?;
        let current = self.load_admin(id).await?.user;
        let is_self = actor.id == current.id;
        let privileged = req.role.is_some() || req.status.is_some() || req.permissions.is_some();

        if is_self && privileged {
            return Err(ApiError::Forbidden("You may only change your own name, department and avatar".into()));
        }
        if !is_self && !actor.has_permission(permissions::USERS_EDIT) {
            return Err(ApiError::forbidden());
        }
        let target_role = req.role.unwrap_or(current.role);
        if !target_role.is_admin() {
            return Err(ApiError::Validation("role must be an admin role".into()));
        }
        if !current.is_manageable_by(actor, target_role) {
            return Err(ApiError::Forbidden("Cannot modify a user with a higher role than your own".into()));
        }

        let mut fields = vec![FieldUpdate::set("updated_at", encode(&self.clock.now())?)];
        let mut changed = Vec::new();
        for (path, value) in [("first_name", req.first_name), ("last_name", req.last_name)] {
            if let Some(v) = value {
                fields.push(FieldUpdate::set(path, json!(v.trim())));
                changed.push(path);
            }
        }
        for (path, value) in [("department", req.department), ("avatar", req.avatar)] {
            if let Some(v) = value {
                fields.push(FieldUpdate::set(path, json!(v)));
                changed.push(path);
            }
        }
        let mut batch = WriteBatch::new();
        if let Some(status) = req.status {
            if !current.status.can_become(status) {
                return Err(ApiError::Validation(format!("cannot move account from {:?} to {:?}", current.status, status)));
            }
            match (current.status, status) {
                (AdminStatus::Inactive, AdminStatus::Inactive) => {}
                (AdminStatus::Inactive, _) => {
                    batch.create(collections::ADMIN_EMAILS, &current.email, email_claim(&current.id, self.clock.now())?);
                }
                (_, AdminStatus::Inactive) => self.release_email(&mut batch, &current).await?,
                _ => {}
            }
            fields.push(FieldUpdate::set("status", encode(&status)?));
            changed.push("status");
        }
        if req.role.is_some() || req.permissions.is_some() {
            let extras = match req.permissions {
                Some(extras) => {
                    check_permissions(&extras)?;
                    extras
                }
                None => {
                    let baseline = current.role.baseline_permissions();
                    current.permissions.iter().filter(|p| !baseline.contains(&p.as_str())).cloned().collect()
                }
            };
            fields.push(FieldUpdate::set("role", json!(target_role.as_str())));
            fields.push(FieldUpdate::set("permissions", json!(target_role.effective_permissions(&extras))));
            changed.push("role");
            changed.push("permissions");
        }

        batch.update(collections::ADMIN_USERS, id, fields);
        match self.store.commit(batch).await {
            Err(StoreError::AlreadyExists { .. }) => return Err(email_in_use()),
            committed => committed?,
        }
        let user = self.load_admin(id).await?.user;

        self.audit.record(
            self.audit
                .entry(actions::USER_UPDATE, "admin_users")
                .by(actor)
                .target(id)
                .detail("fields", json!(changed))
                .from_client(meta),
        );
        self.events.emit(DomainEvent::Admin(AdminEvent::Updated { user_id: user.id.clone(), updated_by: actor.id.clone() }));
        Ok(user)
    }

    /// Self changes need the current password. A reset by a `users.edit`
    /// holder skips it and forces a change at next login.
    pub async fn change_password(&self, actor: &Principal, id: &str, req: ChangePasswordRequest, meta: &ClientMeta) -> Result<()> {
        let record = self.load_admin(id).await?;
        let is_self = actor.id == record.user.id;

        if is_self {
            let current = req
                .current_password
                .ok_or_else(|| ApiError::Validation("current_password is required".into()))?;
            if !self.hasher.verify_async(current, record.password_hash.clone()).await {
                self.audit.record(
                    self.audit
                        .entry(actions::USER_PASSWORD_CHANGE, "admin_users")
                        .by(actor)
                        .target(id)
                        .detail("reason", "invalid_current_password")
                        .from_client(meta)
                        .failed(),
                );
                return Err(ApiError::Unauthenticated("Current password is incorrect".into()));
            }
        } else if !actor.has_permission(permissions::USERS_EDIT) || !record.user.is_manageable_by(actor, record.user.role) {
            return Err(ApiError::forbidden());
        }
        check_password_strength(&req.new_password)?;

        let now = self.clock.now();
        let hash = self.hasher.hash_async(req.new_password).await?;
        self.store
            .update(
                collections::ADMIN_USERS,
                id,
                &[
                    FieldUpdate::set("password_hash", json!(hash)),
                    FieldUpdate::set("password_policy.require_change", json!(!is_self)),
                    FieldUpdate::set("password_policy.last_changed", encode(&now)?),
                    FieldUpdate::set("password_policy.failed_login_attempts", json!(0)),
                    FieldUpdate::set("password_policy.locked_until", Value::Null),
                    FieldUpdate::set("updated_at", encode(&now)?),
                ],
            )
            .await?;

        self.audit.record(
            self.audit
                .entry(actions::USER_PASSWORD_CHANGE, "admin_users")
                .by(actor)
                .target(id)
                .detail("reset", !is_self)
                .from_client(meta),
        );
        Ok(())
    }

    /// Soft delete: the account is marked inactive.
    pub async fn delete_admin(&self, actor: &Principal, id: &str, meta: &ClientMeta) -> Result<()> {
        if actor.id == id {
            return Err(ApiError::Forbidden("Cannot delete your own account".into()));
        }
        let user = self.load_admin(id).await?.user;
        if user.role == Role::SuperAdmin {
            return Err(ApiError::Forbidden("Super admin accounts cannot be deleted".into()));
        }
        if !user.is_manageable_by(actor, user.role) {
            return Err(ApiError::Forbidden("Cannot delete a user with a higher role than your own".into()));
        }

        let mut batch = WriteBatch::new();
        batch.update(collections::ADMIN_USERS, id, vec![
            FieldUpdate::set("status", encode(&AdminStatus::Inactive)?),
            FieldUpdate::set("updated_at", encode(&self.clock.now())?),
        ]);
        if user.status != AdminStatus::Inactive {
            self.release_email(&mut batch, &user).await?;
        }
        self.store.commit(batch).await?;

        info!(user_id = %id, deleted_by = %actor.id, "admin user deactivated");
        self.audit.record(
            self.audit
                .entry(actions::USER_DELETE, "admin_users")
                .by(actor)
                .target(id)
                .detail("email", user.email.clone())
                .from_client(meta),
        );
        self.events.emit(DomainEvent::Admin(AdminEvent::Deactivated { user_id: id.to_string(), deactivated_by: actor.id.clone() }));
        Ok(())
    }

    /// Creates the configured super admin unless an account already uses the
    /// address. Returns whether one was created.
    pub async fn bootstrap_super_admin(&self, email: &str, password: &str) -> Result<bool> {
        let email = Email::parse(email)?;
        if self.find_admin_by_email(email.as_str()).await?.is_some() {
            return Ok(false);
        }
        check_password_strength(password)?;

        let now = self.clock.now();
        let user = AdminUser {
            id: Uuid::now_v7().to_string(),
            email: email.into(),
            first_name: "Super".into(),
            last_name: "Admin".into(),
            role: Role::SuperAdmin,
            permissions: Role::SuperAdmin.effective_permissions::<&str>(&[]),
            status: AdminStatus::Active,
            avatar: None,
            department: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
            created_by: "system".into(),
            password_policy: PasswordPolicy { require_change: true, last_changed: Some(now), ..Default::default() },
        };
        let record = AdminRecord { user, password_hash: self.hasher.hash_async(password.to_string()).await? };
        let mut batch = WriteBatch::new();
        batch.create(collections::ADMIN_EMAILS, &record.user.email, email_claim(&record.user.id, now)?);
        batch.create(collections::ADMIN_USERS, &record.user.id, encode(&record)?);
        match self.store.commit(batch).await {
            Err(StoreError::AlreadyExists { .. }) => return Ok(false),
            committed => committed?,
        }
        info!(user_id = %record.user.id, email = %record.user.email, "bootstrapped super admin");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PasswordHashConfig;
    use crate::store::testing::YieldingStore;
    use crate::store::MemoryStore;
    use chrono::Duration;

    struct Harness {
        auth: AuthService,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn service_on(store: Arc<dyn DocumentStore>, clock: Arc<ManualClock>) -> AuthService {
        let hasher = CredentialHasher::new(&PasswordHashConfig { memory_kib: 64, iterations: 1, parallelism: 1 }).unwrap();
        let tokens = Arc::new(TokenIssuer::new("test-secret", clock.clone()));
        let audit = AuditLog::new(store.clone(), clock.clone());
        AuthService::new(store, clock, hasher, tokens, audit, EventPublisher::disabled())
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::new());
        let auth = service_on(store.clone(), clock.clone());
        Harness { auth, store, clock }
    }

    /// Service over a store that yields between every read and write.
    fn interleaved() -> (Arc<AuthService>, Arc<MemoryStore>) {
        let memory = Arc::new(MemoryStore::new());
        let auth = service_on(Arc::new(YieldingStore(memory.clone())), Arc::new(ManualClock::default()));
        (Arc::new(auth), memory)
    }

    fn root() -> Principal {
        Principal { id: "root".into(), email: "root@tripund.com".into(), role: Role::SuperAdmin, permissions: Default::default() }
    }

    fn new_admin(email: &str, role: Role) -> CreateAdminRequest {
        CreateAdminRequest {
            email: email.into(),
            password: "Tr1pund!Pass".into(),
            first_name: "Kavya".into(),
            last_name: "Rao".into(),
            role,
            permissions: vec![],
            department: Some("Operations".into()),
            avatar: None,
        }
    }

    fn login(email: &str, password: &str) -> LoginRequest { LoginRequest { email: email.into(), password: password.into() } }

    #[tokio::test]
    async fn customers_register_once_and_log_in() {
        let h = harness();
        let req = RegisterRequest {
            email: "Asha@Example.com".into(),
            password: "secret1".into(),
            first_name: "Asha".into(),
            last_name: "Verma".into(),
            phone: "+91 98200 00000".into(),
        };
        let session = h.auth.register_customer(req).await.unwrap();
        assert_eq!(session.user.email, "asha@example.com");
        assert_eq!(session.expires_at, h.clock.now() + customer_token_ttl());

        let dup = RegisterRequest {
            email: "asha@example.com".into(),
            password: "secret2".into(),
            first_name: "A".into(),
            last_name: String::new(),
            phone: String::new(),
        };
        assert!(matches!(h.auth.register_customer(dup).await, Err(ApiError::Conflict(_))));

        assert!(h.auth.login_customer(login("asha@example.com", "secret1")).await.is_ok());
        assert!(matches!(h.auth.login_customer(login("asha@example.com", "nope!!")).await, Err(ApiError::Unauthenticated(_))));
        assert!(matches!(h.auth.login_customer(login("ghost@example.com", "secret1")).await, Err(ApiError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn lockout_refuses_before_hash_check_and_expires() {
        let h = harness();
        let meta = ClientMeta::default();
        let user = h.auth.create_admin(&root(), new_admin("ops@tripund.com", Role::Manager), &meta).await.unwrap();

        for _ in 0..MAX_FAILED_LOGINS {
            let err = h.auth.admin_login(login("ops@tripund.com", "Wrong!Pass1"), &meta).await.unwrap_err();
            assert!(matches!(err, ApiError::Unauthenticated(_)));
        }
        // An unreadable hash would fail verification; a locked account never gets that far.
        h.store
            .update(collections::ADMIN_USERS, &user.id, &[FieldUpdate::set("password_hash", json!("garbage"))])
            .await
            .unwrap();
        let err = h.auth.admin_login(login("ops@tripund.com", "Tr1pund!Pass"), &meta).await.unwrap_err();
        assert!(matches!(err, ApiError::Locked(_)));
    }

    #[tokio::test]
    async fn lock_expires_and_success_resets_the_counter() {
        let h = harness();
        let meta = ClientMeta::default();
        h.auth.create_admin(&root(), new_admin("ops@tripund.com", Role::Manager), &meta).await.unwrap();
        for _ in 0..MAX_FAILED_LOGINS {
            let _ = h.auth.admin_login(login("ops@tripund.com", "Wrong!Pass1"), &meta).await;
        }
        h.clock.advance(lockout_window() + Duration::seconds(1));

        let session = h.auth.admin_login(login("ops@tripund.com", "Tr1pund!Pass"), &meta).await.unwrap();
        assert_eq!(session.user.password_policy.failed_login_attempts, 0);
        assert_eq!(session.user.password_policy.locked_until, None);
        assert!(session.user.permissions.iter().any(|p| p == permissions::PRODUCTS_VIEW));
    }

    #[tokio::test]
    async fn failure_after_a_lapsed_lock_restarts_at_one() {
        let h = harness();
        let meta = ClientMeta::default();
        let user = h.auth.create_admin(&root(), new_admin("ops@tripund.com", Role::Viewer), &meta).await.unwrap();
        for _ in 0..MAX_FAILED_LOGINS {
            let _ = h.auth.admin_login(login("ops@tripund.com", "Wrong!Pass1"), &meta).await;
        }
        h.clock.advance(lockout_window() + Duration::minutes(1));
        let _ = h.auth.admin_login(login("ops@tripund.com", "Wrong!Pass1"), &meta).await;

        let policy = h.auth.get_admin(&user.id).await.unwrap().password_policy;
        assert_eq!(policy.failed_login_attempts, 1);
        assert_eq!(policy.locked_until, None);
    }

    #[tokio::test]
    async fn creation_enforces_strength_permissions_and_hierarchy() {
        let h = harness();
        let meta = ClientMeta::default();
        let admin = h.auth.create_admin(&root(), new_admin("admin@tripund.com", Role::Admin), &meta).await.unwrap();
        let actor = admin.principal();

        let weak = CreateAdminRequest { password: "password".into(), ..new_admin("weak@tripund.com", Role::Viewer) };
        assert!(matches!(h.auth.create_admin(&actor, weak, &meta).await, Err(ApiError::Validation(_))));

        let unknown = CreateAdminRequest { permissions: vec!["rockets.launch".into()], ..new_admin("x@tripund.com", Role::Viewer) };
        assert!(matches!(h.auth.create_admin(&actor, unknown, &meta).await, Err(ApiError::Validation(_))));

        let above = new_admin("boss@tripund.com", Role::SuperAdmin);
        assert!(matches!(h.auth.create_admin(&actor, above, &meta).await, Err(ApiError::Forbidden(_))));

        let dup = new_admin("ADMIN@tripund.com", Role::Viewer);
        assert!(matches!(h.auth.create_admin(&actor, dup, &meta).await, Err(ApiError::Conflict(_))));

        let extra = CreateAdminRequest { permissions: vec![permissions::REPORTS_EXPORT.into()], ..new_admin("v@tripund.com", Role::Viewer) };
        let viewer = h.auth.create_admin(&actor, extra, &meta).await.unwrap();
        for p in Role::Viewer.baseline_permissions() {
            assert!(viewer.permissions.iter().any(|have| have == p));
        }
        assert!(viewer.permissions.iter().any(|p| p == permissions::REPORTS_EXPORT));
    }

    #[tokio::test]
    async fn self_updates_are_limited_to_personal_fields() {
        let h = harness();
        let meta = ClientMeta::default();
        let editor = h.auth.create_admin(&root(), new_admin("ed@tripund.com", Role::Editor), &meta).await.unwrap();
        let me = editor.principal();

        let promote = UpdateAdminRequest { role: Some(Role::Admin), ..Default::default() };
        assert!(matches!(h.auth.update_admin(&me, &editor.id, promote, &meta).await, Err(ApiError::Forbidden(_))));

        let rename = UpdateAdminRequest { first_name: Some("Kavi".into()), department: Some("Catalog".into()), ..Default::default() };
        let updated = h.auth.update_admin(&me, &editor.id, rename, &meta).await.unwrap();
        assert_eq!(updated.first_name, "Kavi");
        assert_eq!(updated.last_name, "Rao");
        assert_eq!(updated.department.as_deref(), Some("Catalog"));
    }

    #[tokio::test]
    async fn demotion_replaces_the_baseline_and_keeps_extras() {
        let h = harness();
        let meta = ClientMeta::default();
        let req = CreateAdminRequest { permissions: vec![permissions::REPORTS_EXPORT.into()], ..new_admin("m@tripund.com", Role::Manager) };
        let manager = h.auth.create_admin(&root(), req, &meta).await.unwrap();

        let demote = UpdateAdminRequest { role: Some(Role::Viewer), ..Default::default() };
        let viewer = h.auth.update_admin(&root(), &manager.id, demote, &meta).await.unwrap();
        assert_eq!(viewer.role, Role::Viewer);
        assert!(!viewer.permissions.iter().any(|p| p == permissions::ORDERS_EDIT));
        assert!(viewer.permissions.iter().any(|p| p == permissions::REPORTS_EXPORT));
    }

    #[tokio::test]
    async fn password_changes_and_resets() {
        let h = harness();
        let meta = ClientMeta::default();
        let user = h.auth.create_admin(&root(), new_admin("pw@tripund.com", Role::Editor), &meta).await.unwrap();
        let me = user.principal();

        let missing = ChangePasswordRequest { current_password: None, new_password: "N3w!Password".into() };
        assert!(matches!(h.auth.change_password(&me, &user.id, missing, &meta).await, Err(ApiError::Validation(_))));

        let wrong = ChangePasswordRequest { current_password: Some("Wrong!Pass1".into()), new_password: "N3w!Password".into() };
        assert!(matches!(h.auth.change_password(&me, &user.id, wrong, &meta).await, Err(ApiError::Unauthenticated(_))));

        let ok = ChangePasswordRequest { current_password: Some("Tr1pund!Pass".into()), new_password: "N3w!Password".into() };
        h.auth.change_password(&me, &user.id, ok, &meta).await.unwrap();
        let session = h.auth.admin_login(login("pw@tripund.com", "N3w!Password"), &meta).await.unwrap();
        assert!(!session.require_password_change);

        let reset = ChangePasswordRequest { current_password: None, new_password: "Reset!Pass9".into() };
        h.auth.change_password(&root(), &user.id, reset, &meta).await.unwrap();
        let session = h.auth.admin_login(login("pw@tripund.com", "Reset!Pass9"), &meta).await.unwrap();
        assert!(session.require_password_change);
    }

    #[tokio::test]
    async fn soft_delete_rules() {
        let h = harness();
        let meta = ClientMeta::default();
        assert!(h.auth.bootstrap_super_admin("root@tripund.com", "R00t!Secret").await.unwrap());
        assert!(!h.auth.bootstrap_super_admin("root@tripund.com", "R00t!Secret").await.unwrap());
        let boss = h.auth.admin_login(login("root@tripund.com", "R00t!Secret"), &meta).await.unwrap().user;
        let admin = h.auth.create_admin(&boss.principal(), new_admin("a@tripund.com", Role::Admin), &meta).await.unwrap();
        let viewer = h.auth.create_admin(&boss.principal(), new_admin("v@tripund.com", Role::Viewer), &meta).await.unwrap();

        assert!(matches!(h.auth.delete_admin(&boss.principal(), &boss.id, &meta).await, Err(ApiError::Forbidden(_))));
        assert!(matches!(h.auth.delete_admin(&admin.principal(), &boss.id, &meta).await, Err(ApiError::Forbidden(_))));

        h.auth.delete_admin(&admin.principal(), &viewer.id, &meta).await.unwrap();
        assert_eq!(h.auth.get_admin(&viewer.id).await.unwrap().status, AdminStatus::Inactive);
        let err = h.auth.admin_login(login("v@tripund.com", "Tr1pund!Pass"), &meta).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        // The address is free again once the old account is inactive.
        assert!(h.auth.create_admin(&admin.principal(), new_admin("v@tripund.com", Role::Viewer), &meta).await.is_ok());
    }

    #[tokio::test]
    async fn listing_filters_by_role() {
        let h = harness();
        let meta = ClientMeta::default();
        h.auth.create_admin(&root(), new_admin("e1@tripund.com", Role::Editor), &meta).await.unwrap();
        h.auth.create_admin(&root(), new_admin("v1@tripund.com", Role::Viewer), &meta).await.unwrap();
        let page = h.auth.list_admins(ListAdminsParams { role: Some(Role::Editor), ..Default::default() }).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].email, "e1@tripund.com");
    }

    #[tokio::test]
    async fn concurrent_registrations_claim_the_address_once() {
        let (auth, memory) = interleaved();
        let mut handles = Vec::new();
        for i in 0..8 {
            let auth = auth.clone();
            handles.push(tokio::spawn(async move {
                let req = RegisterRequest {
                    email: if i % 2 == 0 { "meera@example.com".into() } else { "MEERA@example.com".into() },
                    password: "secret1".into(),
                    first_name: "Meera".into(),
                    last_name: "Nair".into(),
                    phone: String::new(),
                };
                auth.register_customer(req).await
            }));
        }
        let mut registered = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => registered += 1,
                Err(e) => assert!(matches!(e, ApiError::Conflict(_)), "unexpected error: {e}"),
            }
        }
        assert_eq!(registered, 1);
        assert_eq!(memory.query(collections::USERS, &Query::new()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_admin_creation_claims_the_address_once() {
        let (auth, memory) = interleaved();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let auth = auth.clone();
            handles.push(tokio::spawn(async move {
                auth.create_admin(&root(), new_admin("ops@tripund.com", Role::Manager), &ClientMeta::default()).await
            }));
        }
        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(matches!(e, ApiError::Conflict(_)), "unexpected error: {e}"),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(memory.query(collections::ADMIN_USERS, &Query::new()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reactivation_needs_the_address_to_be_free() {
        let h = harness();
        let meta = ClientMeta::default();
        let old = h.auth.create_admin(&root(), new_admin("desk@tripund.com", Role::Editor), &meta).await.unwrap();
        h.auth.delete_admin(&root(), &old.id, &meta).await.unwrap();
        assert!(h.store.get(collections::ADMIN_EMAILS, "desk@tripund.com").await.unwrap().is_none());

        let new = h.auth.create_admin(&root(), new_admin("desk@tripund.com", Role::Editor), &meta).await.unwrap();
        let restore = UpdateAdminRequest { status: Some(AdminStatus::Active), ..Default::default() };
        assert!(matches!(h.auth.update_admin(&root(), &old.id, restore, &meta).await, Err(ApiError::Conflict(_))));
        assert_eq!(h.auth.get_admin(&old.id).await.unwrap().status, AdminStatus::Inactive);

        h.auth.delete_admin(&root(), &new.id, &meta).await.unwrap();
        let restore = UpdateAdminRequest { status: Some(AdminStatus::Active), ..Default::default() };
        assert_eq!(h.auth.update_admin(&root(), &old.id, restore, &meta).await.unwrap().status, AdminStatus::Active);
        let claim = h.store.get(collections::ADMIN_EMAILS, "desk@tripund.com").await.unwrap().unwrap();
        assert_eq!(claim.data["user_id"], json!(old.id));
    }
}
