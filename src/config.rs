//! Configuration management for proxyctl.
//!
//! Loads settings from `~/.config/proxyctl/config.toml` with environment overrides.
//! This is the management server's own configuration; the proxy's `config.yaml`
//! is handled by [`crate::proxy_config`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_SERVER_PORT: u16 = 8318;
pub const DEFAULT_PROXY_PORT: u16 = 8317;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub factory: FactoryConfig,
    #[serde(default)]
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyConfig {
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_proxy_config")]
    pub config: PathBuf,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
    #[serde(default = "default_process_names")]
    pub process_names: Vec<String>,
    #[serde(default = "default_startup_grace_ms")]
    pub startup_grace_ms: u64,
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
    /// Token directory; falls back to `auth-dir` in config.yaml, then `dir`.
    #[serde(default)]
    pub auth_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateConfig {
    #[serde(default = "default_repo")]
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_archive_base")]
    pub archive_base: String,
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,
    #[serde(default = "default_subtrees")]
    pub subtrees: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactoryConfig {
    #[serde(default = "default_factory_config")]
    pub config: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub log_verbosity: LogVerbosity,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogVerbosity {
    Minimal,
    #[default]
    Compact,
    Verbose,
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

// Default value functions
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_server_port() -> u16 { DEFAULT_SERVER_PORT }
fn default_proxy_port() -> u16 { DEFAULT_PROXY_PORT }
fn default_binary() -> PathBuf {
    let name = if cfg!(windows) { "cli-proxy-api.exe" } else { "cli-proxy-api" };
    home().join("bin").join(name)
}
fn default_data_dir() -> PathBuf { home().join(".cli-proxy-api") }
fn default_proxy_config() -> PathBuf { default_data_dir().join("config.yaml") }
fn default_log_file() -> PathBuf { default_data_dir().join("logs").join("proxy.log") }
fn default_pid_file() -> PathBuf { default_data_dir().join("proxy.pid") }
fn default_process_names() -> Vec<String> {
    ["cli-proxy-api", "cli-proxy-api-plus", "CLIProxyAPI"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_startup_grace_ms() -> u64 { 2000 }
fn default_stop_grace_ms() -> u64 { 1500 }
fn default_repo() -> String { "router-for-me/CLIProxyAPI-installer".to_string() }
fn default_branch() -> String { "main".to_string() }
fn default_api_base() -> String { "https://api.github.com".to_string() }
fn default_archive_base() -> String { "https://github.com".to_string() }
fn default_install_dir() -> PathBuf { default_data_dir().join("toolkit") }
fn default_subtrees() -> Vec<String> { vec!["scripts".to_string(), "gui".to_string()] }
fn default_factory_config() -> PathBuf { home().join(".factory").join("config.json") }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_server_port(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            config: default_proxy_config(),
            port: default_proxy_port(),
            log_file: default_log_file(),
            pid_file: default_pid_file(),
            process_names: default_process_names(),
            startup_grace_ms: default_startup_grace_ms(),
            stop_grace_ms: default_stop_grace_ms(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            auth_dir: None,
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            repo: default_repo(),
            branch: default_branch(),
            api_base: default_api_base(),
            archive_base: default_archive_base(),
            install_dir: default_install_dir(),
            subtrees: default_subtrees(),
        }
    }
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            config: default_factory_config(),
        }
    }
}

impl DataConfig {
    pub fn providers_path(&self) -> PathBuf {
        self.dir.join("providers.json")
    }

    pub fn stats_path(&self) -> PathBuf {
        self.dir.join("stats.json")
    }

    pub fn version_path(&self) -> PathBuf {
        self.dir.join("version.json")
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("proxyctl")
            .join("config.toml")
    }

    /// Load config from file, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from a specific path.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Config rooted at a single directory. Used by tests and portable installs.
    pub fn rooted_at(dir: &std::path::Path) -> Self {
        let mut config = Self::default();
        config.proxy.binary = dir.join("bin").join("cli-proxy-api");
        config.proxy.config = dir.join("config.yaml");
        config.proxy.log_file = dir.join("logs").join("proxy.log");
        config.proxy.pid_file = dir.join("proxy.pid");
        config.data.dir = dir.to_path_buf();
        config.update.install_dir = dir.join("toolkit");
        config.factory.config = dir.join("factory").join("config.json");
        config
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("PROXYCTL_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(path) = std::env::var("PROXYCTL_PROXY_BINARY") {
            self.proxy.binary = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("PROXYCTL_PROXY_CONFIG") {
            self.proxy.config = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("PROXYCTL_DATA_DIR") {
            self.data.dir = PathBuf::from(path);
        }
        if let Ok(repo) = std::env::var("PROXYCTL_UPDATE_REPO") {
            self.update.repo = repo;
        }
        self
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_config_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, r#"
[server]
port = 9090

[proxy]
binary = "/opt/proxy/cli-proxy-api"
startup_grace_ms = 500
"#).unwrap();

        let config = Config::load_from(config_path).unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.proxy.binary, PathBuf::from("/opt/proxy/cli-proxy-api"));
        assert_eq!(config.proxy.startup_grace_ms, 500);
        assert_eq!(config.proxy.port, DEFAULT_PROXY_PORT);
    }

    #[test]
    fn returns_defaults_when_file_missing() {
        let config = Config::load_from(PathBuf::from("/nonexistent/path/config.toml")).unwrap();

        assert_eq!(config.server.port, 8318);
        assert_eq!(config.proxy.port, 8317);
        assert_eq!(config.update.branch, "main");
        assert_eq!(config.update.subtrees, vec!["scripts", "gui"]);
        assert!(config.proxy.process_names.contains(&"cli-proxy-api".to_string()));
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "[server\nport = ").unwrap();

        assert!(matches!(Config::load_from(config_path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn env_overrides_take_precedence_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, r#"
[update]
repo = "someone/else"
"#).unwrap();

        let from_file = Config::load_from(config_path.clone()).unwrap();
        assert_eq!(from_file.update.repo, "someone/else");

        std::env::set_var("PROXYCTL_UPDATE_REPO", "override/repo");
        let config = Config::load_from(config_path).unwrap().with_env_overrides();
        std::env::remove_var("PROXYCTL_UPDATE_REPO");

        assert_eq!(config.update.repo, "override/repo");
    }

    #[test]
    fn dumped_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let config = Config {
            server: ServerConfig { host: "0.0.0.0".to_string(), port: 3000 },
            ..Config::default()
        };

        fs::write(&config_path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::load_from(config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn rooted_config_keeps_everything_under_one_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());

        assert!(config.proxy.binary.starts_with(dir.path()));
        assert!(config.data.stats_path().starts_with(dir.path()));
        assert_eq!(config.data.providers_path(), dir.path().join("providers.json"));
    }

    #[test]
    fn parses_all_log_verbosity_levels() {
        let dir = tempfile::tempdir().unwrap();

        for (value, expected) in [
            ("minimal", LogVerbosity::Minimal),
            ("compact", LogVerbosity::Compact),
            ("verbose", LogVerbosity::Verbose),
        ] {
            let config_path = dir.path().join(format!("config_{}.toml", value));
            fs::write(&config_path, format!(r#"
[app]
log_verbosity = "{}"
"#, value)).unwrap();

            let config = Config::load_from(config_path).unwrap();
            assert_eq!(config.app.log_verbosity, expected);
        }
    }
}
