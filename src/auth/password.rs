use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier as _, Version,
};

use crate::config::PasswordHashConfig;
use crate::error::ApiError;

/// Argon2id hashing with a per-hash random salt. Verification reads the cost
/// parameters back out of the stored PHC string.
#[derive(Clone)]
pub struct CredentialHasher { params: Params }

impl CredentialHasher {
    pub fn new(config: &PasswordHashConfig) -> Result<Self, ApiError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| ApiError::Misconfigured(format!("invalid password hash parameters: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> { Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone()) }

    pub fn hash(&self, password: &str) -> Result<String, ApiError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
    }

    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self.argon2().verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash is unreadable");
                false
            }
        }
    }

    pub async fn hash_async(&self, password: String) -> Result<String, ApiError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ApiError::Internal(format!("password hashing task failed: {e}")))?
    }

    pub async fn verify_async(&self, password: String, hash: String) -> bool {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash)).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> CredentialHasher {
        CredentialHasher::new(&PasswordHashConfig { memory_kib: 64, iterations: 1, parallelism: 1 }).unwrap()
    }

    #[test]
    fn hashes_verify_and_are_salted() {
        let hasher = cheap();
        let a = hasher.hash("Diya#2024").unwrap();
        let b = hasher.hash("Diya#2024").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(hasher.verify("Diya#2024", &a));
        assert!(!hasher.verify("diya#2024", &a));
    }

    #[test]
    fn garbage_hashes_never_verify() {
        assert!(!cheap().verify("anything", "not-a-phc-string"));
    }

    #[test]
    fn rejects_impossible_parameters() {
        assert!(CredentialHasher::new(&PasswordHashConfig { memory_kib: 1, iterations: 0, parallelism: 1 }).is_err());
    }

    #[tokio::test]
    async fn async_wrappers() {
        let hasher = cheap();
        let hash = hasher.hash_async("Rangoli!9".into()).await.unwrap();
        assert!(hasher.verify_async("Rangoli!9".into(), hash).await);
    }
}
