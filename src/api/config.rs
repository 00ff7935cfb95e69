//! Purpose: Persist the endpoint registry between CLI invocations.
//! Exports: `RegistryConfig`, `default_config_path`.
//! Invariants: Default location is `~/.portal-remote/endpoints.json`.
//! Invariants: A missing file loads as an empty configuration.
use std::collections::BTreeMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl RegistryConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(Error::new(ErrorKind::Io)
                    .with_message(format!("failed to read {}", path.display()))
                    .with_source(err));
            }
        };
        serde_json::from_str(&text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid endpoint configuration in {}", path.display()))
                .with_hint("The file must be a JSON object with an `endpoints` map.")
                .with_source(err)
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message(format!("failed to create {}", parent.display()))
                    .with_source(err)
            })?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode endpoint configuration")
                .with_source(err)
        })?;
        std::fs::write(path, text + "\n").map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to write {}", path.display()))
                .with_source(err)
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home)
        .join(".portal-remote")
        .join("endpoints.json")
}
