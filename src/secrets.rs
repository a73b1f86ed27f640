//! Secret resolution: an ordered chain of sources, first hit wins.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfabError;

/// One strategy for looking up a secret by logical name.
pub trait SecretSource: Send + Sync {
    fn name(&self) -> &str;
    fn get(&self, logical: &str) -> Option<String>;
}

static DOTENV: OnceLock<()> = OnceLock::new();

/// Reads from the process environment: the exact logical name, then
/// `<UPPER>_API_KEY`, then the upper-cased name. Loads `.env` once.
pub struct EnvSource;

impl EnvSource {
    pub fn new() -> Self {
        DOTENV.get_or_init(|| {
            let _ = dotenvy::dotenv();
        });
        Self
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretSource for EnvSource {
    fn name(&self) -> &str {
        "env"
    }

    fn get(&self, logical: &str) -> Option<String> {
        let upper = logical.to_uppercase().replace('-', "_");
        for candidate in [logical.to_string(), format!("{upper}_API_KEY"), upper] {
            if let Ok(value) = std::env::var(&candidate) {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
        None
    }
}

const CREDENTIAL_FILE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CredentialFile {
    version: u32,
    secrets: BTreeMap<String, String>,
}

/// Versioned JSON credential file (0600 on unix).
pub struct CredentialFileSource {
    path: PathBuf,
}

impl CredentialFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default path under the user config dir.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "confab")
            .map(|dirs| dirs.config_dir().join("credentials.json"))
            .unwrap_or_else(|| PathBuf::from(".confab-credentials.json"))
    }

    /// Write a credential file, restricting permissions on unix.
    pub fn save(path: &Path, secrets: &BTreeMap<String, String>) -> Result<(), ConfabError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = CredentialFile {
            version: CREDENTIAL_FILE_VERSION,
            secrets: secrets.clone(),
        };
        let data = serde_json::to_string_pretty(&file)?;
        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;
            let mut f = fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .mode(0o600)
                .open(path)?;
            f.write_all(data.as_bytes())?;
        }
        #[cfg(not(unix))]
        fs::write(path, data)?;
        Ok(())
    }
}

impl SecretSource for CredentialFileSource {
    fn name(&self) -> &str {
        "credential-file"
    }

    fn get(&self, logical: &str) -> Option<String> {
        let data = fs::read_to_string(&self.path).ok()?;
        let file: CredentialFile = serde_json::from_str(&data).ok()?;
        if file.version != CREDENTIAL_FILE_VERSION {
            return None;
        }
        file.secrets.get(logical).cloned()
    }
}

/// Tries sources in a fixed, caller-defined order; the first success wins.
///
/// Absence across the whole chain is reported as `None`, never treated as
/// an empty secret; adapter construction turns it into an auth error.
pub struct SecretResolver {
    sources: Vec<Box<dyn SecretSource>>,
}

impl SecretResolver {
    pub fn new(sources: Vec<Box<dyn SecretSource>>) -> Self {
        Self { sources }
    }

    pub fn resolve(&self, logical: &str) -> Option<String> {
        for source in &self.sources {
            if let Some(value) = source.get(logical) {
                debug!(source = source.name(), logical, "secret resolved");
                return Some(value);
            }
        }
        None
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}
