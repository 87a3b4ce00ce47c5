//! Orchestrator configuration (`logstack.toml`).
//!
//! Every section is optional. Relative playbook and inventory paths are
//! resolved against the directory holding the config file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "logstack.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub playbooks: PlaybookConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub search_api: SearchApiConfig,
    #[serde(default)]
    pub defaults: ServiceDefaultsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaybookConfig {
    #[serde(default = "default_inventory")]
    pub inventory: PathBuf,
    #[serde(default = "default_bootstrap")]
    pub bootstrap: PathBuf,
    #[serde(default = "default_search_service")]
    pub search_service: PathBuf,
    #[serde(default = "default_dashboard_service")]
    pub dashboard_service: PathBuf,
    #[serde(default = "default_remote_user")]
    pub remote_user: String,
}

impl Default for PlaybookConfig {
    fn default() -> Self {
        Self {
            inventory: default_inventory(),
            bootstrap: default_bootstrap(),
            search_service: default_search_service(),
            dashboard_service: default_dashboard_service(),
            remote_user: default_remote_user(),
        }
    }
}

fn default_inventory() -> PathBuf {
    PathBuf::from("ansible/inventory/production.ini")
}

fn default_bootstrap() -> PathBuf {
    PathBuf::from("ansible/playbooks/bootstrap.yml")
}

fn default_search_service() -> PathBuf {
    PathBuf::from("ansible/playbooks/quickwit.yml")
}

fn default_dashboard_service() -> PathBuf {
    PathBuf::from("ansible/playbooks/grafana.yml")
}

fn default_remote_user() -> String {
    "root".to_owned()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorBackend {
    #[default]
    Ansible,
    Mock,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub backend: ExecutorBackend,
    /// Passed to `ansible-playbook --timeout`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultBackend {
    #[default]
    File,
    Env,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    #[serde(default)]
    pub backend: VaultBackend,
}

/// Identity provider the dashboards authenticate against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    #[serde(default = "default_identity_url")]
    pub identity_url: String,
    #[serde(default = "default_authorize_path")]
    pub authorize_path: String,
    #[serde(default = "default_token_path")]
    pub token_path: String,
    #[serde(default = "default_userinfo_path")]
    pub userinfo_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_proxy_port: Option<u16>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            identity_url: default_identity_url(),
            authorize_path: default_authorize_path(),
            token_path: default_token_path(),
            userinfo_path: default_userinfo_path(),
            search_proxy_port: None,
        }
    }
}

impl SiteConfig {
    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.identity_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn authorize_url(&self) -> String {
        self.endpoint(&self.authorize_path)
    }

    pub fn token_url(&self) -> String {
        self.endpoint(&self.token_path)
    }

    pub fn userinfo_url(&self) -> String {
        self.endpoint(&self.userinfo_path)
    }
}

fn default_identity_url() -> String {
    "http://localhost:8000".to_owned()
}

fn default_authorize_path() -> String {
    "/api/method/frappe.integrations.oauth2.authorize".to_owned()
}

fn default_token_path() -> String {
    "/api/method/frappe.integrations.oauth2.get_token".to_owned()
}

fn default_userinfo_path() -> String {
    "/api/method/frappe.integrations.oauth2.openid_profile".to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchApiConfig {
    #[serde(default = "default_search_port")]
    pub port: u16,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchApiConfig {
    fn default() -> Self {
        Self {
            port: default_search_port(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_search_port() -> u16 {
    7280
}

fn default_timeout_secs() -> u64 {
    30
}

/// Container image, port and host paths of one deployed service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDefaults {
    pub image: String,
    pub port: u16,
    pub data_dir: String,
    pub config_dir: String,
    pub quadlet_dir: String,
    pub service_name: String,
}

impl ServiceDefaults {
    pub fn search() -> Self {
        Self {
            image: "ghcr.io/20vikash/frappe-logger:latest".to_owned(),
            port: 7280,
            data_dir: "/var/lib/quickwit".to_owned(),
            config_dir: "/etc/quickwit".to_owned(),
            quadlet_dir: "/etc/containers/systemd".to_owned(),
            service_name: "quickwit".to_owned(),
        }
    }

    pub fn dashboard() -> Self {
        Self {
            image: "docker.io/grafana/grafana-enterprise:latest".to_owned(),
            port: 3000,
            data_dir: "/var/lib/grafana".to_owned(),
            config_dir: "/etc/grafana".to_owned(),
            quadlet_dir: "/etc/containers/systemd".to_owned(),
            service_name: "grafana".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDefaultsConfig {
    #[serde(default = "ServiceDefaults::search")]
    pub search: ServiceDefaults,
    #[serde(default = "ServiceDefaults::dashboard")]
    pub dashboard: ServiceDefaults,
}

impl Default for ServiceDefaultsConfig {
    fn default() -> Self {
        Self {
            search: ServiceDefaults::search(),
            dashboard: ServiceDefaults::dashboard(),
        }
    }
}

impl OrchestratorConfig {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, resolving relative playbook paths against its directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let p = &mut self.playbooks;
        for path in [
            &mut p.inventory,
            &mut p.bootstrap,
            &mut p.search_service,
            &mut p.dashboard_service,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.search_api.port == 0 {
            return Err(ConfigError::Invalid("search_api.port must not be 0".into()));
        }
        if self.search_api.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "search_api.timeout_secs must not be 0".into(),
            ));
        }
        if self.site.search_proxy_port == Some(0) {
            return Err(ConfigError::Invalid(
                "site.search_proxy_port must not be 0".into(),
            ));
        }
        if self.playbooks.remote_user.is_empty() {
            return Err(ConfigError::Invalid(
                "playbooks.remote_user must not be empty".into(),
            ));
        }
        for (name, d) in [
            ("defaults.search", &self.defaults.search),
            ("defaults.dashboard", &self.defaults.dashboard),
        ] {
            if d.port == 0 {
                return Err(ConfigError::Invalid(format!("{name}.port must not be 0")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = OrchestratorConfig::parse("").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.search_api.port, 7280);
        assert_eq!(config.executor.backend, ExecutorBackend::Ansible);
        assert_eq!(config.vault.backend, VaultBackend::File);
        assert_eq!(config.defaults.dashboard.port, 3000);
        assert_eq!(config.defaults.search.service_name, "quickwit");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = OrchestratorConfig::parse(
            r#"
[executor]
backend = "mock"

[site]
identity_url = "http://idp.example.com:8000/"
search_proxy_port = 8080
"#,
        )
        .unwrap();
        assert_eq!(config.executor.backend, ExecutorBackend::Mock);
        assert_eq!(config.site.search_proxy_port, Some(8080));
        assert_eq!(
            config.site.token_url(),
            "http://idp.example.com:8000/api/method/frappe.integrations.oauth2.get_token"
        );
        assert_eq!(config.playbooks.remote_user, "root");
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "[playbooks]\nbootstrap = \"pb/boot.yml\"\ninventory = \"/abs/hosts.ini\"\n",
        )
        .unwrap();
        let config = OrchestratorConfig::load(&path).unwrap();
        assert_eq!(config.playbooks.bootstrap, dir.path().join("pb/boot.yml"));
        assert_eq!(config.playbooks.inventory, PathBuf::from("/abs/hosts.ini"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = OrchestratorConfig::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(OrchestratorConfig::parse("[search_api]\nport = 0\n").is_err());
        assert!(OrchestratorConfig::parse("[executor]\nbackend = \"ssh\"\n").is_err());
        assert!(OrchestratorConfig::parse("[unknown]\n").is_err());
    }
}
