//! Admin user aggregate

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::rbac::{Principal, Role};

pub const MAX_FAILED_LOGINS: u32 = 5;

pub fn lockout_window() -> Duration { Duration::minutes(30) }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminStatus { #[default] Active, Inactive, Suspended }

impl AdminStatus {
    pub fn can_become(self, next: AdminStatus) -> bool {
        use AdminStatus::*;
        self == next || matches!((self, next), (Active, Suspended) | (Suspended, Active) | (Active, Inactive) | (Suspended, Inactive) | (Inactive, Active))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    #[serde(default)]
    pub require_change: bool,
    pub last_changed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl PasswordPolicy {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool { self.locked_until.is_some_and(|until| until > now) }

    /// A lock that has already run out.
    pub fn lock_lapsed(&self, now: DateTime<Utc>) -> bool { self.locked_until.is_some_and(|until| until <= now) }
}

/// Admin account as exposed by the API. The password hash lives only on
/// [`AdminRecord`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub permissions: Vec<String>,
    pub status: AdminStatus,
    pub avatar: Option<String>,
    pub department: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub password_policy: PasswordPolicy,
}

impl AdminUser {
    pub fn is_active(&self) -> bool { self.status == AdminStatus::Active }

    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id.clone(),
            email: self.email.clone(),
            role: self.role,
            permissions: self.permissions.iter().cloned().collect(),
        }
    }

    /// Whether `actor` may modify this account at all, given the role it
    /// would hold afterwards.
    pub fn is_manageable_by(&self, actor: &Principal, target_role: Role) -> bool {
        if actor.id == self.id { return true; }
        if self.role == Role::SuperAdmin { return false; }
        self.role.level() <= actor.role.level() && target_role.level() <= actor.role.level()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminRecord {
    #[serde(flatten)]
    pub user: AdminUser,
    pub password_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin(id: &str, role: Role) -> AdminUser {
        let now = Utc::now();
        AdminUser {
            id: id.into(),
            email: format!("{id}@tripund.com"),
            first_name: "Meera".into(),
            last_name: "Iyer".into(),
            role,
            permissions: role.effective_permissions::<&str>(&[]),
            status: AdminStatus::Active,
            avatar: None,
            department: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
            created_by: "system".into(),
            password_policy: PasswordPolicy::default(),
        }
    }

    #[test]
    fn lock_is_time_boxed() {
        let now = Utc::now();
        let policy = PasswordPolicy { locked_until: Some(now + lockout_window()), ..Default::default() };
        assert!(policy.is_locked(now));
        assert!(!policy.is_locked(now + lockout_window() + Duration::seconds(1)));
        assert!(policy.lock_lapsed(now + lockout_window()));
    }

    #[test]
    fn status_transitions() {
        assert!(AdminStatus::Active.can_become(AdminStatus::Suspended));
        assert!(AdminStatus::Inactive.can_become(AdminStatus::Active));
        assert!(!AdminStatus::Inactive.can_become(AdminStatus::Suspended));
    }

    #[test]
    fn hierarchy_protects_super_admin_and_higher_roles() {
        let boss = admin("boss", Role::SuperAdmin);
        let manager = admin("m", Role::Manager);
        let admin_actor = admin("a", Role::Admin).principal();

        assert!(!boss.is_manageable_by(&admin_actor, Role::SuperAdmin));
        assert!(boss.is_manageable_by(&boss.principal(), Role::SuperAdmin));
        assert!(manager.is_manageable_by(&admin_actor, Role::Editor));
        assert!(!manager.is_manageable_by(&admin_actor, Role::SuperAdmin));
        assert!(!admin("a2", Role::Admin).is_manageable_by(&manager.principal(), Role::Admin));
    }

    #[test]
    fn record_keeps_hash_out_of_public_view() {
        let record = AdminRecord { user: admin("x", Role::Editor), password_hash: "$argon2id$...".into() };
        let stored = serde_json::to_value(&record).unwrap();
        assert_eq!(stored["password_hash"], "$argon2id$...");
        assert_eq!(stored["role"], "editor");
        let public = serde_json::to_value(&record.user).unwrap();
        assert!(public.get("password_hash").is_none());
        let back: AdminRecord = serde_json::from_value(stored).unwrap();
        assert_eq!(back.user, record.user);
    }
}
