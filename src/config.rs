//! Session and attachment configuration.

use crate::error::Result;
use crate::types::TransactionPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Session configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Policy used by `Session::create_default_transaction`.
    pub default_policy: TransactionPolicy,
}

impl SessionConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

/// Connection parameters for one database, handed to the transport verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseParams {
    /// Server host name. Empty for a local or embedded connection.
    pub server: String,
    /// Database path or alias on the server.
    pub database: String,
    pub user: String,
    pub password: String,
    pub role: String,
    /// Connection character set.
    pub charset: String,
    /// Extra parameters used only when creating the database.
    pub create_params: String,
}

impl DatabaseParams {
    /// Parameters for a named database with no credentials.
    pub fn new(server: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// `server:database`, or just the database for local connections.
    pub fn connection_string(&self) -> String {
        if self.server.is_empty() {
            self.database.clone()
        } else {
            format!("{}:{}", self.server, self.database)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::types::{AccessMode, IsolationLevel, LockResolution};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SessionConfig::from_json(
            r#"{"default_policy": {"isolation": "read_committed", "lock_resolution": "no_wait"}}"#,
        )
        .unwrap();

        assert_eq!(config.default_policy.access, AccessMode::Write);
        assert_eq!(config.default_policy.isolation, IsolationLevel::ReadCommitted);
        assert_eq!(config.default_policy.lock_resolution, LockResolution::NoWait);
    }

    #[test]
    fn test_invalid_json() {
        let result = SessionConfig::from_json("{ not json");
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"default_policy": {{"access": "read"}}}}"#).unwrap();

        let config = SessionConfig::load(file.path()).unwrap();
        assert_eq!(config.default_policy.access, AccessMode::Read);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = SessionConfig::load(dir.path().join("missing.json"));
        assert!(matches!(result, Err(SessionError::Io(_))));
    }

    #[test]
    fn test_connection_string() {
        assert_eq!(
            DatabaseParams::new("db1", "/data/employee.fdb").connection_string(),
            "db1:/data/employee.fdb"
        );
        assert_eq!(DatabaseParams::new("", "local.fdb").connection_string(), "local.fdb");
    }
}
