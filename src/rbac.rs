//! Roles, permissions and the authorization predicate

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod permissions {
    pub const USERS_VIEW: &str = "users.view";
    pub const USERS_CREATE: &str = "users.create";
    pub const USERS_EDIT: &str = "users.edit";
    pub const USERS_DELETE: &str = "users.delete";
    pub const PRODUCTS_VIEW: &str = "products.view";
    pub const PRODUCTS_CREATE: &str = "products.create";
    pub const PRODUCTS_EDIT: &str = "products.edit";
    pub const PRODUCTS_DELETE: &str = "products.delete";
    pub const ORDERS_VIEW: &str = "orders.view";
    pub const ORDERS_EDIT: &str = "orders.edit";
    pub const ORDERS_DELETE: &str = "orders.delete";
    pub const ORDERS_REFUND: &str = "orders.refund";
    pub const CATEGORIES_VIEW: &str = "categories.view";
    pub const CATEGORIES_CREATE: &str = "categories.create";
    pub const CATEGORIES_EDIT: &str = "categories.edit";
    pub const CATEGORIES_DELETE: &str = "categories.delete";
    pub const PROMOTIONS_VIEW: &str = "promotions.view";
    pub const PROMOTIONS_CREATE: &str = "promotions.create";
    pub const PROMOTIONS_EDIT: &str = "promotions.edit";
    pub const PROMOTIONS_DELETE: &str = "promotions.delete";
    pub const INVOICES_CREATE: &str = "invoices.create";
    pub const ANALYTICS_VIEW: &str = "analytics.view";
    pub const REPORTS_VIEW: &str = "reports.view";
    pub const REPORTS_EXPORT: &str = "reports.export";
    pub const SETTINGS_VIEW: &str = "settings.view";
    pub const SETTINGS_EDIT: &str = "settings.edit";
    pub const SYSTEM_LOGS: &str = "system.logs";
    pub const SYSTEM_BACKUP: &str = "system.backup";
    pub const SYSTEM_MAINTENANCE: &str = "system.maintenance";
}

use permissions::*;

#[derive(Clone, Copy, Debug, Serialize)]
pub struct PermissionInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
}

const fn perm(id: &'static str, display_name: &'static str, description: &'static str, category: &'static str) -> PermissionInfo {
    PermissionInfo { id, name: id, display_name, description, category }
}

pub const PERMISSIONS: &[PermissionInfo] = &[
    perm(USERS_VIEW, "View Users", "View admin users", "users"),
    perm(USERS_CREATE, "Create Users", "Create new admin users", "users"),
    perm(USERS_EDIT, "Edit Users", "Edit admin users", "users"),
    perm(USERS_DELETE, "Delete Users", "Deactivate admin users", "users"),
    perm(PRODUCTS_VIEW, "View Products", "View product catalog", "products"),
    perm(PRODUCTS_CREATE, "Create Products", "Add new products", "products"),
    perm(PRODUCTS_EDIT, "Edit Products", "Edit existing products", "products"),
    perm(PRODUCTS_DELETE, "Delete Products", "Remove products", "products"),
    perm(ORDERS_VIEW, "View Orders", "View orders and invoices", "orders"),
    perm(ORDERS_EDIT, "Edit Orders", "Update orders and invoice status", "orders"),
    perm(ORDERS_DELETE, "Delete Orders", "Delete orders", "orders"),
    perm(ORDERS_REFUND, "Refund Orders", "Issue refunds", "orders"),
    perm(CATEGORIES_VIEW, "View Categories", "View categories", "categories"),
    perm(CATEGORIES_CREATE, "Create Categories", "Add new categories", "categories"),
    perm(CATEGORIES_EDIT, "Edit Categories", "Edit categories", "categories"),
    perm(CATEGORIES_DELETE, "Delete Categories", "Remove categories", "categories"),
    perm(PROMOTIONS_VIEW, "View Promotions", "View promo codes", "promotions"),
    perm(PROMOTIONS_CREATE, "Create Promotions", "Create promo codes", "promotions"),
    perm(PROMOTIONS_EDIT, "Edit Promotions", "Edit promo codes", "promotions"),
    perm(PROMOTIONS_DELETE, "Delete Promotions", "Remove promo codes", "promotions"),
    perm(INVOICES_CREATE, "Create Invoices", "Generate GST invoices from orders", "orders"),
    perm(ANALYTICS_VIEW, "View Analytics", "View analytics dashboard", "analytics"),
    perm(REPORTS_VIEW, "View Reports", "View reports", "reports"),
    perm(REPORTS_EXPORT, "Export Reports", "Export reports", "reports"),
    perm(SETTINGS_VIEW, "View Settings", "View store settings", "settings"),
    perm(SETTINGS_EDIT, "Edit Settings", "Change store settings", "settings"),
    perm(SYSTEM_LOGS, "View Logs", "View audit and system logs", "system"),
    perm(SYSTEM_BACKUP, "Backups", "Create and restore backups", "system"),
    perm(SYSTEM_MAINTENANCE, "Maintenance", "Run maintenance tasks", "system"),
];

pub fn is_known_permission(permission: &str) -> bool { PERMISSIONS.iter().any(|p| p.id == permission) }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role { SuperAdmin, Admin, Manager, Editor, Viewer, Customer }

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ADMIN_ROLES: [Role; 5] = [Role::SuperAdmin, Role::Admin, Role::Manager, Role::Editor, Role::Viewer];

    pub const fn level(self) -> u8 {
        match self {
            Self::SuperAdmin => 100,
            Self::Admin => 80,
            Self::Manager => 60,
            Self::Editor => 40,
            Self::Viewer => 20,
            Self::Customer => 0,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
            Self::Customer => "customer",
        }
    }

    pub fn is_admin(self) -> bool { self != Self::Customer }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::SuperAdmin => "Super Administrator",
            Self::Admin => "Administrator",
            Self::Manager => "Manager",
            Self::Editor => "Editor",
            Self::Viewer => "Viewer",
            Self::Customer => "Customer",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::SuperAdmin => "Full system access including user management and system settings",
            Self::Admin => "Administrative access to everything except system operations",
            Self::Manager => "Manage products, orders and categories",
            Self::Editor => "Edit products and categories",
            Self::Viewer => "Read-only access",
            Self::Customer => "Storefront customer",
        }
    }

    pub fn baseline_permissions(self) -> Vec<&'static str> {
        match self {
            Self::SuperAdmin => PERMISSIONS.iter().map(|p| p.id).collect(),
            Self::Admin => PERMISSIONS
                .iter()
                .map(|p| p.id)
                .filter(|id| !id.starts_with("system.") && *id != USERS_DELETE)
                .collect(),
            Self::Manager => vec![
                PRODUCTS_VIEW, PRODUCTS_CREATE, PRODUCTS_EDIT,
                ORDERS_VIEW, ORDERS_EDIT,
                CATEGORIES_VIEW, CATEGORIES_EDIT,
                PROMOTIONS_VIEW,
                ANALYTICS_VIEW, REPORTS_VIEW,
            ],
            Self::Editor => vec![PRODUCTS_VIEW, PRODUCTS_CREATE, PRODUCTS_EDIT, CATEGORIES_VIEW, CATEGORIES_EDIT],
            Self::Viewer => vec![PRODUCTS_VIEW, ORDERS_VIEW, CATEGORIES_VIEW, ANALYTICS_VIEW],
            Self::Customer => vec![],
        }
    }

    /// Baseline for the role plus any extras, sorted and deduplicated.
    pub fn effective_permissions<S: AsRef<str>>(self, extras: &[S]) -> Vec<String> {
        let mut set: BTreeSet<String> = self.baseline_permissions().into_iter().map(str::to_string).collect();
        set.extend(extras.iter().map(|p| p.as_ref().to_string()));
        set.into_iter().collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Self::SuperAdmin),
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            "customer" => Ok(Self::Customer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RoleInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub permissions: Vec<&'static str>,
    pub level: u8,
    pub is_system: bool,
}

pub fn role_catalog() -> Vec<RoleInfo> {
    Role::ADMIN_ROLES
        .iter()
        .map(|&role| RoleInfo {
            id: role.as_str(),
            name: role.as_str(),
            display_name: role.display_name(),
            description: role.description(),
            permissions: role.baseline_permissions(),
            level: role.level(),
            is_system: true,
        })
        .collect()
}

/// Authenticated caller, built from verified token claims.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub permissions: BTreeSet<String>,
}

impl Principal {
    pub fn is_super_admin(&self) -> bool { self.role == Role::SuperAdmin }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_super_admin() || self.permissions.contains(permission)
    }

    pub fn has_any(&self, permissions: &[&str]) -> bool {
        self.is_super_admin() || permissions.iter().any(|p| self.permissions.contains(*p))
    }

    pub fn has_all(&self, permissions: &[&str]) -> bool {
        self.is_super_admin() || permissions.iter().all(|p| self.permissions.contains(*p))
    }

    pub fn at_least(&self, role: Role) -> bool { self.role.level() >= role.level() }

    /// Evaluates a route requirement. `path_param` resolves named path
    /// segments for ownership checks.
    pub fn allows<'a>(&self, requirement: &Requirement, path_param: impl Fn(&str) -> Option<&'a str>) -> bool {
        match requirement {
            Requirement::Authenticated => true,
            Requirement::Permission(p) => self.has_permission(p),
            Requirement::AnyOf(ps) => self.has_any(ps),
            Requirement::AllOf(ps) => self.has_all(ps),
            Requirement::OwnershipOrPermission { permission, param } => {
                path_param(param).is_some_and(|v| v == self.id) || self.has_permission(permission)
            }
            Requirement::Role(role) => self.at_least(*role),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Permission(&'static str),
    AnyOf(Vec<&'static str>),
    AllOf(Vec<&'static str>),
    OwnershipOrPermission { permission: &'static str, param: &'static str },
    Role(Role),
}

impl Requirement {
    pub fn admin_only() -> Self { Self::Role(Role::Editor) }

    pub fn describe(&self) -> String {
        match self {
            Self::Authenticated => "authenticated".into(),
            Self::Permission(p) => (*p).into(),
            Self::AnyOf(ps) => format!("any of {}", ps.join(", ")),
            Self::AllOf(ps) => format!("all of {}", ps.join(", ")),
            Self::OwnershipOrPermission { permission, param } => format!("owner of :{param} or {permission}"),
            Self::Role(r) => format!("role {r} or higher"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role, perms: &[&str]) -> Principal {
        Principal {
            id: "u1".into(),
            email: "u1@tripund.com".into(),
            role,
            permissions: perms.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn no_params(_: &str) -> Option<&'static str> { None }

    #[test]
    fn super_admin_is_allowed_everything() {
        let p = principal(Role::SuperAdmin, &[]);
        for info in PERMISSIONS {
            assert!(p.allows(&Requirement::Permission(info.id), no_params));
        }
        assert!(p.allows(&Requirement::AllOf(vec![SYSTEM_BACKUP, USERS_DELETE]), no_params));
        assert!(p.allows(&Requirement::Permission("anything.at_all"), no_params));
    }

    #[test]
    fn any_and_all_of() {
        let p = principal(Role::Manager, &[ORDERS_VIEW]);
        assert!(p.allows(&Requirement::AnyOf(vec![ORDERS_VIEW, INVOICES_CREATE]), no_params));
        assert!(!p.allows(&Requirement::AllOf(vec![ORDERS_VIEW, INVOICES_CREATE]), no_params));
    }

    #[test]
    fn ownership_or_permission() {
        let p = principal(Role::Viewer, &[]);
        let req = Requirement::OwnershipOrPermission { permission: USERS_EDIT, param: "id" };
        assert!(p.allows(&req, |name| (name == "id").then_some("u1")));
        assert!(!p.allows(&req, |name| (name == "id").then_some("u2")));
        let editor = principal(Role::Admin, &[USERS_EDIT]);
        assert!(editor.allows(&req, |_| Some("u2")));
    }

    #[test]
    fn role_hierarchy() {
        assert!(principal(Role::Manager, &[]).allows(&Requirement::admin_only(), no_params));
        assert!(!principal(Role::Viewer, &[]).allows(&Requirement::admin_only(), no_params));
        assert!(!principal(Role::Customer, &[]).allows(&Requirement::Role(Role::Viewer), no_params));
    }

    #[test]
    fn baselines() {
        let admin = Role::Admin.baseline_permissions();
        assert!(admin.contains(&USERS_EDIT));
        assert!(!admin.contains(&USERS_DELETE));
        assert!(!admin.iter().any(|p| p.starts_with("system.")));
        assert!(Role::Manager.baseline_permissions().contains(&PRODUCTS_VIEW));
        assert!(!Role::Manager.baseline_permissions().contains(&USERS_VIEW));
        assert_eq!(Role::Viewer.baseline_permissions().len(), 4);
        for role in Role::ADMIN_ROLES {
            assert!(role.baseline_permissions().iter().all(|p| is_known_permission(p)));
        }
    }

    #[test]
    fn effective_permissions_are_a_superset_of_baseline() {
        let perms = Role::Editor.effective_permissions(&[ORDERS_VIEW, PRODUCTS_VIEW]);
        for p in Role::Editor.baseline_permissions() {
            assert!(perms.iter().any(|x| x == p));
        }
        assert!(perms.iter().any(|x| x == ORDERS_VIEW));
        assert_eq!(perms.iter().filter(|x| *x == PRODUCTS_VIEW).count(), 1);
    }

    #[test]
    fn roles_parse() {
        assert_eq!("manager".parse::<Role>(), Ok(Role::Manager));
        assert!("root".parse::<Role>().is_err());
        assert_eq!(role_catalog().len(), 5);
        assert_eq!(role_catalog()[0].level, 100);
    }
}
