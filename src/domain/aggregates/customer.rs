//! Storefront customer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rbac::{Principal, Role};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    pub avatar: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: String,
    pub profile: CustomerProfile,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl Customer {
    pub fn principal(&self) -> Principal {
        Principal { id: self.id.clone(), email: self.email.clone(), role: Role::Customer, permissions: Default::default() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomerRecord {
    #[serde(flatten)]
    pub customer: Customer,
    pub password_hash: String,
}
