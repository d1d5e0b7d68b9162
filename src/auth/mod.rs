//! Session tokens, password hashing and the account service

mod password;
mod service;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::clock::Clock;
use crate::rbac::Principal;

pub use password::CredentialHasher;
pub use service::{
    AdminSession, AuthService, ChangePasswordRequest, CreateAdminRequest, CustomerSession, ListAdminsParams, LoginRequest,
    Profile, RegisterRequest, UpdateAdminRequest, UpdateProfileRequest,
};

/// Issuer claim on every token.
pub const ISSUER: &str = "tripund-backend";

pub fn customer_token_ttl() -> Duration { Duration::hours(24) }
pub fn admin_token_ttl() -> Duration { Duration::days(30) }

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// JWT claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal id)
    pub sub: String,
    pub user_id: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl Claims {
    pub fn principal(&self) -> Result<Principal, TokenError> {
        let role = self.role.parse().map_err(|e: crate::rbac::UnknownRole| TokenError::Invalid(e.to_string()))?;
        Ok(Principal {
            id: self.sub.clone(),
            email: self.email.clone(),
            role,
            permissions: self.permissions.iter().cloned().collect(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
}

/// Signs and verifies HS256 session tokens. Expiry is judged against the
/// injected clock.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(secret: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            clock,
        }
    }

    pub fn issue(&self, principal: &Principal, names: Option<(&str, &str)>, ttl: Duration) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let expires_at = now + ttl;
        let claims = Claims {
            sub: principal.id.clone(),
            user_id: principal.id.clone(),
            email: principal.email.clone(),
            role: principal.role.as_str().to_string(),
            permissions: principal.permissions.iter().cloned().collect(),
            first_name: names.map(|(f, _)| f.to_string()),
            last_name: names.map(|(_, l)| l.to_string()),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: ISSUER.to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        debug!(user_id = %principal.id, role = %principal.role, "issued session token");
        Ok(IssuedToken { token, expires_at, expires_in: ttl.num_seconds() })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.validate_exp = false;
        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?
            .claims;
        if claims.exp <= self.clock.now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

/// Token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rbac::Role;

    fn manager() -> Principal {
        Principal {
            id: "m1".into(),
            email: "m1@tripund.com".into(),
            role: Role::Manager,
            permissions: Role::Manager.baseline_permissions().into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn issued_tokens_round_trip_into_principals() {
        let clock = Arc::new(ManualClock::default());
        let issuer = TokenIssuer::new("test-secret", clock);
        let issued = issuer.issue(&manager(), Some(("Ravi", "Menon")), admin_token_ttl()).unwrap();
        assert_eq!(issued.expires_in, 30 * 24 * 3600);
        let claims = issuer.verify(&issued.token).unwrap();
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.role, "manager");
        assert_eq!(claims.first_name.as_deref(), Some("Ravi"));
        assert_eq!(claims.principal().unwrap(), manager());
    }

    #[test]
    fn expiry_follows_the_clock() {
        let clock = Arc::new(ManualClock::default());
        let issuer = TokenIssuer::new("test-secret", clock.clone());
        let issued = issuer.issue(&manager(), None, customer_token_ttl()).unwrap();
        clock.advance(Duration::hours(23));
        assert!(issuer.verify(&issued.token).is_ok());
        clock.advance(Duration::hours(2));
        assert_eq!(issuer.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn foreign_signatures_are_rejected() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let issued = TokenIssuer::new("one", clock.clone()).issue(&manager(), None, customer_token_ttl()).unwrap();
        assert!(matches!(TokenIssuer::new("two", clock).verify(&issued.token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer"), None);
    }
}
