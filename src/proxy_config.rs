//! Access to the proxy binary's `config.yaml`.
//!
//! Content is read and written verbatim. YAML syntax is not validated on
//! write; a malformed file only surfaces when the proxy is next started.
//! A few keys (port, auth directory, API keys) are read best-effort so the
//! management server can talk to the proxy.

use crate::error::ManagerError;
use crate::persist::write_atomic;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Keys the management server consumes from the proxy configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ProxySettings {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub auth_dir: Option<String>,
    #[serde(default)]
    pub api_keys: Vec<String>,
}

impl ProxySettings {
    /// Auth directory with a leading `~` expanded.
    pub fn auth_dir_path(&self) -> Option<PathBuf> {
        let raw = self.auth_dir.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
            Some(rest) => dirs::home_dir().map(|h| h.join(rest)),
            None if raw == "~" => dirs::home_dir(),
            None => Some(PathBuf::from(raw)),
        }
    }
}

/// The proxy's on-disk YAML configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfigFile {
    path: PathBuf,
}

impl ProxyConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Path of the backup written before each overwrite.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".bak");
        self.path.with_file_name(name)
    }

    /// Read the configuration verbatim.
    pub fn read(&self) -> Result<String, ManagerError> {
        std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ManagerError::NotFound(format!("config file {}", self.path.display()))
            } else {
                e.into()
            }
        })
    }

    /// Back up the current file (if any), then replace it with `content`.
    /// Returns the backup path when a backup was made.
    pub fn write(&self, content: &str) -> Result<Option<PathBuf>, ManagerError> {
        let backup = if self.exists() {
            let backup = self.backup_path();
            std::fs::copy(&self.path, &backup)?;
            Some(backup)
        } else {
            None
        };

        write_atomic(&self.path, content.as_bytes())?;
        tracing::info!(path = %self.path.display(), bytes = content.len(), "proxy config written");
        Ok(backup)
    }

    /// Parse the keys the manager needs. Unreadable or malformed files yield defaults.
    pub fn settings(&self) -> ProxySettings {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return ProxySettings::default();
        };
        parse_settings(&content)
    }
}

/// Parse manager-relevant keys out of YAML text.
pub fn parse_settings(content: &str) -> ProxySettings {
    match serde_yaml::from_str::<Option<ProxySettings>>(content) {
        Ok(settings) => settings.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "proxy config is not valid YAML, using defaults");
            ProxySettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn read_missing_config_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let file = ProxyConfigFile::new(dir.path().join("config.yaml"));

        let err = file.read().unwrap_err();
        assert!(matches!(err, ManagerError::NotFound(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn write_then_read_round_trips_and_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let file = ProxyConfigFile::new(dir.path().join("config.yaml"));
        fs::write(file.path(), "port: 8317\n").unwrap();

        let content = "port: 9000\n# trailing comment without newline";
        let backup = file.write(content).unwrap();

        assert_eq!(file.read().unwrap(), content);
        assert_eq!(backup, Some(file.backup_path()));
        assert_eq!(fs::read_to_string(file.backup_path()).unwrap(), "port: 8317\n");
    }

    #[test]
    fn first_write_makes_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let file = ProxyConfigFile::new(dir.path().join("config.yaml"));

        assert_eq!(file.write("port: 1\n").unwrap(), None);
        assert!(!file.backup_path().exists());
    }

    #[test]
    fn malformed_yaml_is_accepted_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let file = ProxyConfigFile::new(dir.path().join("config.yaml"));

        file.write("port: [unclosed").unwrap();
        assert_eq!(file.read().unwrap(), "port: [unclosed");
        assert_eq!(file.settings(), ProxySettings::default());
    }

    #[test]
    fn parses_port_auth_dir_and_keys() {
        let settings = parse_settings(
            r#"
port: 8400
auth-dir: "/var/lib/proxy/auth"
api-keys:
  - "sk-first"
  - "sk-second"
request-retry: 3
"#,
        );

        assert_eq!(settings.port, Some(8400));
        assert_eq!(settings.auth_dir_path(), Some(PathBuf::from("/var/lib/proxy/auth")));
        assert_eq!(settings.api_keys, vec!["sk-first", "sk-second"]);
    }

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(parse_settings(""), ProxySettings::default());
    }

    #[test]
    fn expands_home_in_auth_dir() {
        let settings = ProxySettings {
            auth_dir: Some("~/.cli-proxy-api".to_string()),
            ..Default::default()
        };
        let expected = dirs::home_dir().map(|h| h.join(".cli-proxy-api"));
        assert_eq!(settings.auth_dir_path(), expected);
    }
}
