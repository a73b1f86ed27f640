//! Parameter reconciliation against a provider's declared support.

use std::collections::BTreeMap;

use crate::types::{Notice, ParamMap};

/// Inclusive valid range for a numeric parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
}

impl ParamRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// The parameter set a provider adapter declares it accepts.
#[derive(Debug, Clone, Default)]
pub struct ParamSpec {
    entries: BTreeMap<String, Option<ParamRange>>,
}

impl ParamSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a parameter without range checking.
    pub fn allow(mut self, name: &str) -> Self {
        self.entries.insert(name.to_string(), None);
        self
    }

    /// Accept a numeric parameter valid within `[min, max]`.
    pub fn numeric(mut self, name: &str, min: f64, max: f64) -> Self {
        self.entries
            .insert(name.to_string(), Some(ParamRange { min, max }));
        self
    }

    pub fn supports(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn range(&self, name: &str) -> Option<ParamRange> {
        self.entries.get(name).copied().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reconcile requested parameters against a declared support set.
///
/// Pure and deterministic. Unsupported names are dropped; numeric values
/// outside their declared range are clamped to the nearest bound. Both are
/// recorded in the returned [`Notice`] with the original value, so the
/// caller can observe what changed. Returns `None` for the notice when
/// nothing was dropped or clamped.
///
/// Idempotent: reconciling the effective output again yields it unchanged.
pub fn reconcile(
    requested: &ParamMap,
    spec: &ParamSpec,
    provider: &str,
) -> (ParamMap, Option<Notice>) {
    let mut effective = ParamMap::new();
    let mut dropped = BTreeMap::new();
    let mut removed = Vec::new();
    let mut clamped = Vec::new();

    for (name, value) in requested {
        if !spec.supports(name) {
            dropped.insert(name.clone(), value.clone());
            removed.push(name.clone());
            continue;
        }
        match (spec.range(name), value.as_f64()) {
            (Some(range), Some(v)) if !range.contains(v) => {
                let bounded = range.clamp(v);
                // Keep integer params integral after clamping.
                let bounded_value = if value.is_i64() || value.is_u64() {
                    serde_json::json!(bounded as i64)
                } else {
                    serde_json::json!(bounded)
                };
                dropped.insert(name.clone(), value.clone());
                clamped.push(format!("{name}={v} -> {bounded}"));
                effective.insert(name.clone(), bounded_value);
            }
            _ => {
                effective.insert(name.clone(), value.clone());
            }
        }
    }

    if dropped.is_empty() {
        return (effective, None);
    }

    let mut parts = Vec::new();
    if !removed.is_empty() {
        parts.push(format!("dropped unsupported params: {}", removed.join(", ")));
    }
    if !clamped.is_empty() {
        parts.push(format!("clamped out-of-range params: {}", clamped.join(", ")));
    }
    let notice = Notice {
        provider: provider.to_string(),
        message: parts.join("; "),
        dropped,
    };
    (effective, Some(notice))
}
