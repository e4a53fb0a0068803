use crate::errors::StubError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StubConfig {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// `memory` or `sqlite`.
    pub backend: StorageBackendKind,
    /// Database path for the sqlite backend; ignored by the memory backend.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    Memory,
    Sqlite,
}

impl StorageBackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Bodies above this size are stored as a fingerprint marker instead.
    pub max_body_bytes: usize,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackendKind::Sqlite,
                path: Some(PathBuf::from(".cache/httpstub/state.sqlite")),
            },
            logging: LoggingConfig { path: None },
            capture: CaptureConfig {
                max_body_bytes: crate::request::default_body_threshold(),
            },
        }
    }
}

pub fn load_config(path: &Path) -> Result<StubConfig, StubError> {
    let raw = std::fs::read_to_string(path).map_err(|e| StubError::Io(e.to_string()))?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<StubConfig, StubError> {
    let cfg: StubConfig =
        toml::from_str(raw).map_err(|e| StubError::ConfigParse(e.to_string()))?;
    validate_config(&cfg)?;
    Ok(cfg)
}

fn validate_config(cfg: &StubConfig) -> Result<(), StubError> {
    if cfg.storage.backend == StorageBackendKind::Sqlite && cfg.storage.path.is_none() {
        return Err(StubError::InvalidConfig(
            "storage.path is required for the sqlite backend".to_string(),
        ));
    }
    if cfg.capture.max_body_bytes == 0 {
        return Err(StubError::InvalidConfig(
            "capture.max_body_bytes must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
