//! Configuration surface for stackctl.
//!
//! The core only reads configuration through `ConfigSource`. `StackConfig` is
//! the JSON-backed implementation used by the binary:
//!
//! ```json
//! {
//!   "default": { "distro": "ubuntu", "root": "/opt/stack" },
//!   "db": { "type": "mysql", "sql_user": "admin" },
//!   "passwords": { "sql": "secret" }
//! }
//! ```
//!
//! Secrets may also come from the environment: `get_secret("passwords", "sql")`
//! consults `STACK_PASSWORDS_SQL` before the file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StackError};
use crate::template::ParamMap;
use crate::types::Param;

pub const DEFAULT_ROOT: &str = "/opt/stack";
pub const DEFAULT_BIND_CONFIG: &str = "/etc/mysql/my.cnf";
/// Service type reported in errors when `db.type` itself cannot be read
pub const UNKNOWN_TYPE: &str = "unknown";

/// Read-only configuration lookups
pub trait ConfigSource {
    fn get(&self, section: &str, key: &str) -> Result<String>;

    fn get_secret(&self, section: &str, key: &str) -> Result<String>;

    /// Lookup that falls back to `default` when the key is absent
    fn get_or(&self, section: &str, key: &str, default: &str) -> String {
        self.get(section, key)
            .unwrap_or_else(|_| default.to_string())
    }
}

/// Sectioned key/value configuration loaded from JSON
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackConfig {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl StackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, section: &str, key: &str, value: impl Into<String>) -> Self {
        self.set(section, key, value);
        self
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            StackError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            StackError::config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StackError::config(format!("failed to serialize configuration: {e}")))?;
        fs::write(path, json).map_err(|e| {
            StackError::config(format!("failed to write {}: {e}", path.display()))
        })
    }

    /// Check the keys every lifecycle operation depends on
    pub fn validate(&self) -> Result<()> {
        let db_type = self.get("db", "type")?;
        if db_type.trim().is_empty() {
            return Err(StackError::config("db.type must not be empty"));
        }
        let user = self.get("db", "sql_user")?;
        if user.trim().is_empty() {
            return Err(StackError::config("db.sql_user must not be empty"));
        }
        if user.contains(char::is_whitespace) {
            return Err(StackError::config("db.sql_user cannot contain whitespace"));
        }
        self.get_secret("passwords", "sql")?;
        Ok(())
    }

    fn lookup(&self, section: &str, key: &str) -> Option<&String> {
        self.sections.get(section).and_then(|s| s.get(key))
    }
}

impl ConfigSource for StackConfig {
    fn get(&self, section: &str, key: &str) -> Result<String> {
        self.lookup(section, key)
            .cloned()
            .ok_or_else(|| StackError::config(format!("missing {section}.{key}")))
    }

    fn get_secret(&self, section: &str, key: &str) -> Result<String> {
        if let Ok(value) = std::env::var(secret_env_name(section, key)) {
            return Ok(value);
        }
        self.get(section, key)
    }
}

fn secret_env_name(section: &str, key: &str) -> String {
    format!("STACK_{}_{}", section, key).to_uppercase()
}

/// Configured database service type, lower-cased for table lookup
pub fn db_type(cfg: &dyn ConfigSource) -> Result<String> {
    Ok(cfg.get("db", "type")?.trim().to_lowercase())
}

/// Configured service type, or `UNKNOWN_TYPE` for error reporting
pub fn db_type_label(cfg: &dyn ConfigSource) -> String {
    db_type(cfg).unwrap_or_else(|_| UNKNOWN_TYPE.to_string())
}

/// Component root directory (`default.root`)
pub fn component_root(cfg: &dyn ConfigSource) -> PathBuf {
    PathBuf::from(cfg.get_or("default", "root", DEFAULT_ROOT))
}

/// Service configuration file whose bind address is rewritten after install
pub fn bind_config_path(cfg: &dyn ConfigSource) -> PathBuf {
    PathBuf::from(cfg.get_or("db", "bind_config", DEFAULT_BIND_CONFIG))
}

/// Parameters for install-time commands: password, boot-on-start flag, db user.
pub fn install_params(cfg: &dyn ConfigSource) -> Result<ParamMap> {
    Ok([
        (Param::Password, cfg.get_secret("passwords", "sql")?),
        (Param::BootStart, true.to_string()),
        (Param::User, cfg.get("db", "sql_user")?),
    ]
    .into_iter()
    .collect())
}

/// Parameters for the grant-privileges command: password and db user.
pub fn grant_params(cfg: &dyn ConfigSource) -> Result<ParamMap> {
    Ok([
        (Param::Password, cfg.get_secret("passwords", "sql")?),
        (Param::User, cfg.get("db", "sql_user")?),
    ]
    .into_iter()
    .collect())
}

/// Parameters for ad-hoc database admin commands
pub fn admin_params(cfg: &dyn ConfigSource, db_name: &str) -> Result<ParamMap> {
    Ok([
        (Param::Password, cfg.get_secret("passwords", "sql")?),
        (Param::User, cfg.get("db", "sql_user")?),
        (Param::Db, db_name.to_string()),
    ]
    .into_iter()
    .collect())
}
