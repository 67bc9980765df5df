//! Mining configuration, read from the environment or deserialized with serde.

use phenomine_core::ParentPolicy;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

pub const ENDPOINT_VAR: &str = "PHENOMINE_ENDPOINT";
pub const VOCABULARY_VAR: &str = "PHENOMINE_VOCABULARY";
pub const TIMEOUT_VAR: &str = "PHENOMINE_TIMEOUT_SECS";

pub const DEFAULT_VOCABULARY: &str = "HP";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Where query text is POSTed.
    pub endpoint: Url,
    /// Only hits whose id carries this prefix are kept.
    #[serde(default = "default_vocabulary")]
    pub vocabulary_prefix: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Parent tie-break used when jumping to a term in the tree.
    #[serde(default)]
    pub parent_policy: ParentPolicy,
}

fn default_vocabulary() -> String {
    DEFAULT_VOCABULARY.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl MiningConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            vocabulary_prefix: default_vocabulary(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: None,
            parent_policy: ParentPolicy::default(),
        }
    }

    /// Load from `PHENOMINE_ENDPOINT` (required), `PHENOMINE_VOCABULARY` and
    /// `PHENOMINE_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let endpoint = lookup(ENDPOINT_VAR).ok_or(ConfigError::Missing(ENDPOINT_VAR))?;
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| ConfigError::Invalid(format!("{ENDPOINT_VAR}={endpoint:?}: {e}")))?;

        let mut config = Self::new(endpoint);
        if let Some(prefix) = lookup(VOCABULARY_VAR) {
            config.vocabulary_prefix = prefix;
        }
        if let Some(timeout) = lookup(TIMEOUT_VAR) {
            config.timeout_secs = timeout
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("{TIMEOUT_VAR}={timeout:?}: {e}")))?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_vocabulary(mut self, prefix: impl Into<String>) -> Self {
        self.vocabulary_prefix = prefix.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_parent_policy(mut self, policy: ParentPolicy) -> Self {
        self.parent_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "endpoint must be http(s), got {}",
                self.endpoint
            )));
        }
        if self.vocabulary_prefix.is_empty() || self.vocabulary_prefix.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "vocabulary prefix must be non-empty and without ':', got {:?}",
                self.vocabulary_prefix
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout must be positive".to_string()));
        }
        Ok(())
    }
}
