//! Immutable name-to-provider registry built once from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::echo::EchoProvider;
use super::openai::OpenAiProvider;
use super::Provider;
use crate::config::{ConfabConfig, ProviderDescriptor, ProviderKind};
use crate::error::ConfabError;
use crate::resilience::ResilientProvider;
use crate::secrets::SecretResolver;

/// Read-only after construction; lookups need no locking.
///
/// Every entry is already wrapped in [`ResilientProvider`], so callers get
/// retry and streaming-failure handling transparently.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn from_config(
        config: &ConfabConfig,
        secrets: &SecretResolver,
    ) -> Result<Self, ConfabError> {
        let policy = config.retry_policy();
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        for (name, descriptor) in &config.providers {
            let adapter = build_adapter(name, descriptor, &config.model.name, secrets)?;
            debug!(provider = name.as_str(), "registered provider");
            providers.insert(
                name.clone(),
                Arc::new(ResilientProvider::new(adapter, policy.clone())),
            );
        }
        Ok(Self { providers })
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, ConfabError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ConfabError::Config(format!("unknown provider '{name}'")))
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(|k| k.as_str()).collect()
    }
}

fn build_adapter(
    name: &str,
    descriptor: &ProviderDescriptor,
    default_model: &str,
    secrets: &SecretResolver,
) -> Result<Arc<dyn Provider>, ConfabError> {
    match descriptor.kind {
        ProviderKind::Echo => Ok(Arc::new(EchoProvider::new())),
        ProviderKind::OpenAi => {
            let logical = descriptor.api_key.as_deref().unwrap_or(name);
            let api_key = secrets.resolve(logical).ok_or_else(|| {
                ConfabError::Auth(format!(
                    "no credentials for provider '{name}' (looked up '{logical}' in sources: {})",
                    secrets.source_names().join(", ")
                ))
            })?;
            let model = descriptor.model.as_deref().unwrap_or(default_model);
            let mut adapter = OpenAiProvider::new(model, api_key, descriptor.base_url.clone());
            if !descriptor.supports_stream {
                adapter = adapter.without_streaming();
            }
            Ok(Arc::new(adapter))
        }
    }
}
