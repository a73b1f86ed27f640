//! Configuration loading and validation.
//!
//! Malformed configuration is a [`ConfabError::Config`] raised at load time,
//! before any session exists.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfabError;
use crate::resilience::RetryPolicy;
use crate::secrets::{CredentialFileSource, EnvSource, SecretResolver, SecretSource};
use crate::session::context::ContextWindow;
use crate::transcript::{JsonlTranscriptStore, TranscriptStore};
use crate::types::ParamMap;

fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

fn default_true() -> bool {
    true
}

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfabConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    pub model: ModelConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub context: Option<ContextConfig>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Key into the `[providers.*]` tables.
    pub provider: String,
    /// Model name passed to the adapter.
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub stream: bool,
    pub timeout_secs: u64,
    pub keep_partial_replies: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stream: false,
            timeout_secs: 30,
            keep_partial_replies: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            multiplier: policy.multiplier,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub transcripts_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::None,
            transcripts_dir: PathBuf::from("sessions"),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Resolution order; the first source that yields a value wins.
    pub sources: Vec<SecretSourceKind>,
    /// Override for the credential file location.
    pub credential_file: Option<PathBuf>,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            sources: vec![SecretSourceKind::Env],
            credential_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SecretSourceKind {
    Env,
    CredentialFile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    pub max_input_tokens: usize,
    #[serde(default = "ContextConfig::default_reserve")]
    pub response_reserve_tokens: usize,
    #[serde(default = "ContextConfig::default_keep_last_n")]
    pub keep_last_n: usize,
}

impl ContextConfig {
    fn default_reserve() -> usize {
        1024
    }

    fn default_keep_last_n() -> usize {
        6
    }
}

/// Adapter-construction descriptor for one provider entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    /// Model override; defaults to the global `model.name`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Logical secret name for the API key; defaults to the entry name.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Requested call parameters, reconciled per call against the adapter's
    /// declared support.
    #[serde(default)]
    pub params: ParamMap,
    #[serde(default = "default_true")]
    pub supports_stream: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Echo,
}

impl ConfabConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfabError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConfabError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfabError> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| ConfabError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfabError> {
        if self.model.provider.trim().is_empty() {
            return Err(ConfabError::Config("model.provider must not be empty".into()));
        }
        if self.model.name.trim().is_empty() {
            return Err(ConfabError::Config("model.name must not be empty".into()));
        }
        if !self.providers.contains_key(&self.model.provider) {
            return Err(ConfabError::Config(format!(
                "model.provider '{}' has no [providers.{}] entry",
                self.model.provider, self.model.provider
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfabError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfabError::Config("retry.multiplier must be at least 1.0".into()));
        }
        if self.runtime.timeout_secs == 0 {
            return Err(ConfabError::Config("runtime.timeout_secs must be positive".into()));
        }
        if self.storage.backend == StorageBackend::File
            && self.storage.transcripts_dir.as_os_str().is_empty()
        {
            return Err(ConfabError::Config(
                "storage.transcripts_dir required for the file backend".into(),
            ));
        }
        if self.secrets.sources.is_empty() {
            return Err(ConfabError::Config(
                "secrets.sources must list at least one source".into(),
            ));
        }
        Ok(())
    }

    /// Descriptor for the configured model's provider.
    pub fn active_provider(&self) -> (&str, &ProviderDescriptor) {
        // validate() guarantees the entry exists.
        let name = self.model.provider.as_str();
        (name, &self.providers[name])
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            multiplier: self.retry.multiplier,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime.timeout_secs)
    }

    pub fn context_window(&self) -> Option<ContextWindow> {
        self.context.as_ref().map(|c| ContextWindow {
            max_input_tokens: c.max_input_tokens,
            response_reserve_tokens: c.response_reserve_tokens,
            keep_last_n: c.keep_last_n,
        })
    }

    /// Build the secret chain in the configured order.
    pub fn secret_resolver(&self) -> SecretResolver {
        let sources: Vec<Box<dyn SecretSource>> = self
            .secrets
            .sources
            .iter()
            .map(|kind| match kind {
                SecretSourceKind::Env => Box::new(EnvSource::new()) as Box<dyn SecretSource>,
                SecretSourceKind::CredentialFile => {
                    let path = self
                        .secrets
                        .credential_file
                        .clone()
                        .unwrap_or_else(CredentialFileSource::default_path);
                    Box::new(CredentialFileSource::new(path))
                }
            })
            .collect();
        SecretResolver::new(sources)
    }

    pub fn transcript_store(&self) -> Option<Arc<dyn TranscriptStore>> {
        match self.storage.backend {
            StorageBackend::File => Some(Arc::new(JsonlTranscriptStore::new(
                self.storage.transcripts_dir.clone(),
            ))),
            StorageBackend::None => None,
        }
    }
}
