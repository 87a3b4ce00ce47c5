use crate::index_schema::IndexSchema;
use crate::types::{ResourceId, SecretRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    VirtualMachine,
    SearchServer,
    SearchIndex,
    DashboardServer,
    #[serde(rename = "oauth_client")]
    OAuthClient,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::VirtualMachine,
        ResourceKind::SearchServer,
        ResourceKind::SearchIndex,
        ResourceKind::DashboardServer,
        ResourceKind::OAuthClient,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::VirtualMachine => "virtual_machine",
            ResourceKind::SearchServer => "search_server",
            ResourceKind::SearchIndex => "search_index",
            ResourceKind::DashboardServer => "dashboard_server",
            ResourceKind::OAuthClient => "oauth_client",
        }
    }

    /// Only index-like resources can be retired and deleted.
    pub fn supports_teardown(self) -> bool {
        matches!(self, ResourceKind::SearchIndex)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Declared,
    Provisioning,
    Active,
    Failed,
    Retiring,
    Deleted,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceStatus::Declared => "declared",
            ResourceStatus::Provisioning => "provisioning",
            ResourceStatus::Active => "active",
            ResourceStatus::Failed => "failed",
            ResourceStatus::Retiring => "retiring",
            ResourceStatus::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VirtualMachineSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSettings {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_token: SecretRef,
    pub secret_key: SecretRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiCredentials {
    pub token: SecretRef,
    pub secret: SecretRef,
}

/// Per-resource replacements for the configured service defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quadlet_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

impl ServiceOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchServerSpec {
    pub host: ResourceId,
    pub storage: StorageSettings,
    pub api: ApiCredentials,
    #[serde(default, skip_serializing_if = "ServiceOverrides::is_empty")]
    pub overrides: ServiceOverrides,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchIndexSpec {
    pub server: ResourceId,
    pub schema: IndexSchema,
}

impl SearchIndexSpec {
    pub fn index_id(&self) -> &str {
        self.schema.index_id()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DashboardServerSpec {
    pub host: ResourceId,
    pub index: ResourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_client: Option<ResourceId>,
    pub admin_user: String,
    pub admin_password: SecretRef,
    #[serde(default, skip_serializing_if = "ServiceOverrides::is_empty")]
    pub overrides: ServiceOverrides,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuthClientSpec {
    pub app_name: String,
    pub client_id: String,
    pub client_secret: SecretRef,
    pub redirect_uris: Vec<String>,
    pub default_redirect_uri: String,
    pub scopes: String,
}

/// Typed payload of a resource, one variant per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    VirtualMachine(VirtualMachineSpec),
    SearchServer(SearchServerSpec),
    SearchIndex(SearchIndexSpec),
    DashboardServer(DashboardServerSpec),
    #[serde(rename = "oauth_client")]
    OAuthClient(OAuthClientSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::VirtualMachine(_) => ResourceKind::VirtualMachine,
            ResourceSpec::SearchServer(_) => ResourceKind::SearchServer,
            ResourceSpec::SearchIndex(_) => ResourceKind::SearchIndex,
            ResourceSpec::DashboardServer(_) => ResourceKind::DashboardServer,
            ResourceSpec::OAuthClient(_) => ResourceKind::OAuthClient,
        }
    }

    /// Identifiers this resource points at, in field order.
    pub fn references(&self) -> Vec<&ResourceId> {
        match self {
            ResourceSpec::VirtualMachine(_) | ResourceSpec::OAuthClient(_) => Vec::new(),
            ResourceSpec::SearchServer(s) => vec![&s.host],
            ResourceSpec::SearchIndex(s) => vec![&s.server],
            ResourceSpec::DashboardServer(d) => {
                let mut refs = vec![&d.host, &d.index];
                refs.extend(d.oauth_client.as_ref());
                refs
            }
        }
    }

    /// Vault references the bundle builder will look up.
    pub fn secret_refs(&self) -> Vec<&SecretRef> {
        match self {
            ResourceSpec::SearchServer(s) => vec![
                &s.storage.access_token,
                &s.storage.secret_key,
                &s.api.token,
                &s.api.secret,
            ],
            ResourceSpec::DashboardServer(d) => vec![&d.admin_password],
            ResourceSpec::OAuthClient(o) => vec![&o.client_secret],
            ResourceSpec::VirtualMachine(_) | ResourceSpec::SearchIndex(_) => Vec::new(),
        }
    }
}
