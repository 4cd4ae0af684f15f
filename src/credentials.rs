//! Credential acquisition for the delivery side of the pipeline.
//!
//! The engine core never needs secrets; the IBF API push, GloFAS download
//! and datalake sync around it do. Where the secrets come from is hidden
//! behind `CredentialProvider`: environment (after `.env`), a local TOML
//! secrets file, or a chain of those tried in order.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

pub const ADMIN_LOGIN: &str = "ADMIN_LOGIN";
pub const GLOFAS_USER: &str = "GLOFAS_USER";
pub const GLOFAS_PW: &str = "GLOFAS_PW";
pub const IBF_URL: &str = "IBF_URL";
pub const IBF_PASSWORD: &str = "IBF_PASSWORD";
pub const DATALAKE_STORAGE_ACCOUNT_NAME: &str = "DATALAKE_STORAGE_ACCOUNT_NAME";
pub const DATALAKE_STORAGE_ACCOUNT_KEY: &str = "DATALAKE_STORAGE_ACCOUNT_KEY";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("credentials unavailable from {provider}: {reason}")]
    CredentialsUnavailable { provider: String, reason: String },
}

/// The resolved secret set.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Credentials {
    pub admin_login: String,
    pub glofas_user: String,
    pub glofas_pw: String,
    pub ibf_url: String,
    pub ibf_password: String,
    pub datalake_storage_account_name: String,
    pub datalake_storage_account_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("admin_login", &self.admin_login)
            .field("glofas_user", &self.glofas_user)
            .field("glofas_pw", &"***")
            .field("ibf_url", &self.ibf_url)
            .field("ibf_password", &"***")
            .field("datalake_storage_account_name", &self.datalake_storage_account_name)
            .field("datalake_storage_account_key", &"***")
            .finish()
    }
}

pub trait CredentialProvider: Send + Sync {
    /// Short label used in logs and errors.
    fn name(&self) -> &str;
    fn resolve(&self) -> Result<Credentials, CredentialError>;
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads every key from the environment. All keys must be present.
pub struct EnvCredentialProvider {
    lookup: Lookup,
}

impl EnvCredentialProvider {
    /// Process environment, with `.env` loaded first.
    pub fn from_process_env() -> Self {
        dotenv::dotenv().ok();
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
        }
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn name(&self) -> &str {
        "env"
    }

    fn resolve(&self) -> Result<Credentials, CredentialError> {
        let get = |key: &str| {
            (self.lookup)(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| CredentialError::CredentialsUnavailable {
                    provider: self.name().to_string(),
                    reason: format!("{} is not set", key),
                })
        };
        Ok(Credentials {
            admin_login: get(ADMIN_LOGIN)?,
            glofas_user: get(GLOFAS_USER)?,
            glofas_pw: get(GLOFAS_PW)?,
            ibf_url: get(IBF_URL)?,
            ibf_password: get(IBF_PASSWORD)?,
            datalake_storage_account_name: get(DATALAKE_STORAGE_ACCOUNT_NAME)?,
            datalake_storage_account_key: get(DATALAKE_STORAGE_ACCOUNT_KEY)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Secrets file
// ---------------------------------------------------------------------------

/// Local TOML file with the same upper-case keys as the environment.
pub struct FileCredentialProvider {
    path: PathBuf,
}

impl FileCredentialProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialProvider for FileCredentialProvider {
    fn name(&self) -> &str {
        "secrets-file"
    }

    fn resolve(&self) -> Result<Credentials, CredentialError> {
        let unavailable = |reason: String| CredentialError::CredentialsUnavailable {
            provider: format!("{} ({})", self.name(), self.path.display()),
            reason,
        };
        let text = std::fs::read_to_string(&self.path).map_err(|e| unavailable(e.to_string()))?;
        toml::from_str(&text).map_err(|e| unavailable(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Tries each provider in order; the first success wins.
pub struct ChainedCredentialProvider {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl ChainedCredentialProvider {
    pub fn new(providers: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }
}

impl CredentialProvider for ChainedCredentialProvider {
    fn name(&self) -> &str {
        "chain"
    }

    fn resolve(&self) -> Result<Credentials, CredentialError> {
        let mut reasons = Vec::new();
        for provider in &self.providers {
            match provider.resolve() {
                Ok(credentials) => {
                    tracing::debug!(provider = provider.name(), "credentials resolved");
                    return Ok(credentials);
                }
                Err(err) => {
                    tracing::debug!(provider = provider.name(), "credential provider failed: {}", err);
                    reasons.push(err.to_string());
                }
            }
        }
        Err(CredentialError::CredentialsUnavailable {
            provider: self.name().to_string(),
            reason: if reasons.is_empty() {
                "no providers configured".to_string()
            } else {
                reasons.join("; ")
            },
        })
    }
}

/// Secret values keyed as in the environment; handy for tests and for
/// building an `EnvCredentialProvider` from a fixed map.
pub fn lookup_from_map(map: HashMap<String, String>) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
    move |key| map.get(key).cloned()
}
