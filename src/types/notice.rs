//! Non-fatal observability records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Informational record of parameter drops/clamps or retry activity.
///
/// Never fatal: notices ride alongside a successful reply so callers can
/// surface what the resilience layer did on their behalf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notice {
    /// Name of the provider the notice concerns.
    pub provider: String,
    /// Human-readable description.
    pub message: String,
    /// Parameters removed or altered before the backend call, keyed by
    /// name, holding the original requested value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dropped: BTreeMap<String, serde_json::Value>,
}

impl Notice {
    /// A notice with no dropped parameters (e.g. a retry summary).
    pub fn info(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
            dropped: BTreeMap::new(),
        }
    }
}
