// src/config.rs

//! Configuration for delta application and permission checks
//!
//! Everything the core needs is passed in explicitly through [`Config`];
//! nothing is read from process-wide state. The file format is TOML and
//! every section is optional.
//!
//! # Example config.toml
//!
//! ```toml
//! [state]
//! dir = "/var/lib/deltastage"
//!
//! [install]
//! root = "/"
//!
//! [hash]
//! algorithm = "sha256"
//! metadata = "permissions-and-xattrs"
//!
//! [permissions]
//! dangerous_bits = ["setuid", "setgid", "sticky"]
//!
//! [sweep]
//! jobs = 1
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::filesystem::{FileIdentifier, MetadataPolicy, StateLayout};
use crate::hash::HashAlgorithm;
use crate::permissions::{DangerousBit, DangerousBits};

/// Default state directory (holds `delta/` and `staged/`)
pub const DEFAULT_STATE_DIR: &str = "/var/lib/deltastage";

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/deltastage/config.toml";

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub state: StateSection,

    #[serde(default)]
    pub install: InstallSection,

    #[serde(default)]
    pub hash: HashSection,

    #[serde(default)]
    pub permissions: PermissionsSection,

    #[serde(default)]
    pub sweep: SweepSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSection {
    /// Root of the update state (pending deltas and staged content)
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
}

impl Default for StateSection {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallSection {
    /// Live install root that manifest paths are relative to
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for InstallSection {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("/")
}

/// Content identifier settings; must match how manifests were produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashSection {
    #[serde(default)]
    pub algorithm: HashAlgorithm,

    #[serde(default)]
    pub metadata: MetadataPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsSection {
    /// Mode bits that require confirmation when introduced
    #[serde(default = "default_dangerous_bits")]
    pub dangerous_bits: Vec<DangerousBit>,
}

impl Default for PermissionsSection {
    fn default() -> Self {
        Self {
            dangerous_bits: default_dangerous_bits(),
        }
    }
}

fn default_dangerous_bits() -> Vec<DangerousBit> {
    vec![DangerousBit::Setuid, DangerousBit::Setgid, DangerousBit::Sticky]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSection {
    /// Worker count for the delta sweep; 1 keeps it sequential
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self { jobs: default_jobs() }
    }
}

fn default_jobs() -> usize {
    1
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Load configuration if the file exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep.jobs == 0 {
            return Err(ConfigError::Invalid("sweep.jobs must be at least 1".to_string()));
        }
        if self.state.dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("state.dir must not be empty".to_string()));
        }
        Ok(())
    }

    /// Directory layout described by this configuration
    pub fn layout(&self) -> StateLayout {
        StateLayout::new(&self.state.dir, &self.install.root)
    }

    /// Content identifier described by this configuration
    pub fn identifier(&self) -> FileIdentifier {
        FileIdentifier::new(self.hash.algorithm, self.hash.metadata)
    }

    /// Dangerous-bit predicate described by this configuration
    pub fn dangerous_bits(&self) -> DangerousBits {
        DangerousBits::from_bits(&self.permissions.dangerous_bits)
    }
}
