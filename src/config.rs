//! Environment configuration

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TOKEN_SECRET: &str = "your-secret-key";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}")]
    Invalid { key: &'static str, value: String },
    #[error("the default token secret cannot be used in release mode")]
    DefaultSecretInRelease,
    #[error("cannot read credentials file {path}: {source}")]
    Credentials { path: PathBuf, #[source] source: std::io::Error },
    #[error("credentials file {path} is malformed: {source}")]
    MalformedCredentials { path: PathBuf, #[source] source: serde_json::Error },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordHashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashConfig {
    fn default() -> Self { Self { memory_kib: 19_456, iterations: 2, parallelism: 1 } }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub release_mode: bool,
    pub store_project_id: String,
    pub store_credentials_path: PathBuf,
    pub use_default_credentials: bool,
    pub database_url: Option<String>,
    pub token_secret: String,
    pub cors_origins: Vec<String>,
    pub storage_bucket: String,
    pub nats_url: Option<String>,
    pub password_hash: PasswordHashConfig,
    pub invoice_prefix: String,
    pub store_batch_limit: usize,
    pub request_timeout: Duration,
    pub bootstrap_admin: Option<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            release_mode: false,
            store_project_id: String::new(),
            store_credentials_path: PathBuf::from("./serviceAccount.json"),
            use_default_credentials: false,
            database_url: None,
            token_secret: DEFAULT_TOKEN_SECRET.into(),
            cors_origins: vec!["http://localhost:5173".into()],
            storage_bucket: String::new(),
            nats_url: None,
            password_hash: PasswordHashConfig::default(),
            invoice_prefix: "TRIPUND".into(),
            store_batch_limit: 400,
            request_timeout: Duration::from_secs(30),
            bootstrap_admin: None,
        }
    }
}

#[derive(Deserialize)]
struct CredentialsFile { database_url: String }

fn var(key: &str) -> Option<String> { env::var(key).ok().filter(|v| !v.trim().is_empty()) }

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match var(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let release_mode = match var("APP_ENV").as_deref() {
            None | Some("debug") | Some("test") => false,
            Some("release") => true,
            Some(other) => return Err(ConfigError::Invalid { key: "APP_ENV", value: other.into() }),
        };
        let token_secret = var("JWT_SECRET").unwrap_or(d.token_secret);
        if release_mode && token_secret == DEFAULT_TOKEN_SECRET {
            return Err(ConfigError::DefaultSecretInRelease);
        }

        Ok(Self {
            port: parsed("PORT", d.port)?,
            release_mode,
            store_project_id: var("STORE_PROJECT_ID").unwrap_or(d.store_project_id),
            store_credentials_path: var("STORE_CREDENTIALS_PATH").map(PathBuf::from).unwrap_or(d.store_credentials_path),
            use_default_credentials: parsed("USE_DEFAULT_CREDENTIALS", false)?,
            database_url: var("DATABASE_URL"),
            token_secret,
            cors_origins: var("CORS_ORIGIN")
                .map(|v| v.split(',').map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect())
                .unwrap_or(d.cors_origins),
            storage_bucket: var("STORAGE_BUCKET").unwrap_or(d.storage_bucket),
            nats_url: var("NATS_URL"),
            password_hash: PasswordHashConfig {
                memory_kib: parsed("PASSWORD_HASH_MEMORY_KIB", d.password_hash.memory_kib)?,
                iterations: parsed("PASSWORD_HASH_ITERATIONS", d.password_hash.iterations)?,
                parallelism: parsed("PASSWORD_HASH_PARALLELISM", d.password_hash.parallelism)?,
            },
            invoice_prefix: var("INVOICE_PREFIX").unwrap_or(d.invoice_prefix),
            store_batch_limit: parsed("STORE_BATCH_LIMIT", d.store_batch_limit)?.max(2),
            request_timeout: Duration::from_secs(parsed("REQUEST_TIMEOUT_SECS", d.request_timeout.as_secs())?),
            bootstrap_admin: var("SUPER_ADMIN_EMAIL").zip(var("SUPER_ADMIN_PASSWORD")),
        })
    }

    /// Connection URL for the document database, if one is configured.
    pub fn resolve_database_url(&self) -> Result<Option<String>, ConfigError> {
        if let Some(url) = &self.database_url { return Ok(Some(url.clone())); }
        if self.use_default_credentials || !self.store_credentials_path.exists() { return Ok(None); }

        let path = self.store_credentials_path.clone();
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Credentials { path: path.clone(), source })?;
        let creds: CredentialsFile = serde_json::from_str(&raw).map_err(|source| ConfigError::MalformedCredentials { path, source })?;
        Ok(Some(creds.database_url))
    }

    pub fn uses_default_secret(&self) -> bool { self.token_secret == DEFAULT_TOKEN_SECRET }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_storefront_deployment() {
        let c = Config::default();
        assert_eq!(c.port, 8080);
        assert_eq!(c.cors_origins, vec!["http://localhost:5173".to_string()]);
        assert_eq!(c.store_credentials_path, PathBuf::from("./serviceAccount.json"));
        assert_eq!(c.store_batch_limit, 400);
        assert!(c.uses_default_secret());
    }

    #[test]
    fn explicit_url_wins_over_credentials_file() {
        let c = Config { database_url: Some("postgres://localhost/tripund".into()), ..Config::default() };
        assert_eq!(c.resolve_database_url().unwrap().as_deref(), Some("postgres://localhost/tripund"));
        let c = Config { store_credentials_path: PathBuf::from("/nonexistent/creds.json"), ..Config::default() };
        assert_eq!(c.resolve_database_url().unwrap(), None);
    }
}
