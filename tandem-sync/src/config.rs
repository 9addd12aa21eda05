//! Synchronization configuration
//!
//! Loaded from the shared `config.toml`; everything defaults sensibly so
//! an absent file means a working setup.

use std::path::Path;

use serde::{Deserialize, Serialize};

use tandem_protocol::{props, PROTOCOL_VERSION, PROTOCOL_VERSION_IDENTITY};
use tandem_utils::{config_file, Result, TandemError};

/// Property names this instance publishes under. Overridable so an
/// embedder can coexist with another instance on the same server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropNames {
    pub session: String,
    pub command: String,
    pub cc_request: String,
}

impl Default for PropNames {
    fn default() -> Self {
        Self {
            session: props::SESSION.into(),
            command: props::COMMAND.into(),
            cc_request: props::CC_REQUEST.into(),
        }
    }
}

/// Root configuration for the sync subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub props: PropNames,
    /// Show a user-visible warning when a sibling's edit line is deleted
    /// under it (the forced flush happens regardless)
    pub warn_on_conflict: bool,
    /// Records at or above this protocol version are matched with the
    /// current file-identity rule; older ones with the legacy rule
    pub identity_version_floor: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            props: PropNames::default(),
            warn_on_conflict: true,
            identity_version_floor: PROTOCOL_VERSION_IDENTITY,
        }
    }
}

impl SyncConfig {
    /// Load configuration from the default location; an absent file
    /// yields the defaults
    pub fn load() -> Result<Self> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TandemError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| TandemError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.props.session.is_empty()
            || self.props.command.is_empty()
            || self.props.cc_request.is_empty()
        {
            return Err(TandemError::config("property names must not be empty"));
        }

        if self.identity_version_floor > PROTOCOL_VERSION {
            return Err(TandemError::config(format!(
                "identity_version_floor {} is above the supported protocol version {}",
                self.identity_version_floor, PROTOCOL_VERSION
            )));
        }

        Ok(())
    }

    /// Load and validate
    pub fn load_and_validate() -> Result<Self> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }
}
