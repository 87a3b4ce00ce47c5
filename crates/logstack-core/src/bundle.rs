//! Variable bundles handed to playbooks.
//!
//! Every resource kind with a service stage has a fixed, versioned key set
//! ([`VarSchema`]). Secrets are pulled from the vault at build time and
//! only ever live inside the returned [`VariableBundle`].

use crate::resolver::{DependencyRole, Resolution};
use crate::CoreError;
use logstack_runner::VariableBundle;
use logstack_schema::{
    ResourceKind, ResourceSpec, Secret, SecretRef, ServiceDefaults, ServiceDefaultsConfig,
    ServiceOverrides, SiteConfig,
};
use logstack_store::{ResourceRecord, SecretVault, VaultError};
use tracing::debug;

/// Versioned key set of one bundle type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarSchema {
    pub name: &'static str,
    pub version: u32,
    pub keys: &'static [&'static str],
}

impl VarSchema {
    pub const BOOTSTRAP: VarSchema = VarSchema {
        name: "bootstrap",
        version: 1,
        keys: &[],
    };

    pub const SEARCH_SERVER: VarSchema = VarSchema {
        name: "search_server",
        version: 1,
        keys: &[
            "S3_REGION",
            "S3_ENDPOINT",
            "ACCESS_TOKEN",
            "SECRET_KEY",
            "S3_BUCKET",
            "quickwit_config_dir",
            "quickwit_service_name",
            "quickwit_image",
            "quickwit_port",
            "quickwit_data_dir",
            "quickwit_quadlet_dir",
            "api_token",
            "api_secret",
        ],
    };

    pub const DASHBOARD_SERVER: VarSchema = VarSchema {
        name: "dashboard_server",
        version: 1,
        keys: &[
            "grafana_oauth_client_id",
            "grafana_oauth_client_secret",
            "grafana_admin_user",
            "grafana_admin_password",
            "grafana_oauth_auth_url",
            "grafana_oauth_token_url",
            "grafana_oauth_api_url",
            "grafana_domain",
            "grafana_root_url",
            "quickwit_url",
            "quickwit_index",
            "grafana_image",
            "grafana_port",
            "grafana_service_name",
            "grafana_data_dir",
            "grafana_config_dir",
            "grafana_quadlet_dir",
        ],
    };

    /// Service-stage schema for `kind`, if it has one.
    pub fn for_kind(kind: ResourceKind) -> Option<VarSchema> {
        match kind {
            ResourceKind::SearchServer => Some(Self::SEARCH_SERVER),
            ResourceKind::DashboardServer => Some(Self::DASHBOARD_SERVER),
            ResourceKind::VirtualMachine => Some(Self::BOOTSTRAP),
            ResourceKind::SearchIndex | ResourceKind::OAuthClient => None,
        }
    }

    /// Whether `bundle` carries exactly this schema's keys.
    pub fn matches(&self, bundle: &VariableBundle) -> bool {
        bundle.schema_version() == self.version
            && bundle.len() == self.keys.len()
            && self.keys.iter().all(|k| bundle.get(k).is_some())
    }
}

/// Variables plus the host they are meant for.
#[derive(Debug, Clone)]
pub struct ProvisioningBundle {
    /// Public address of the VM the playbook targets, used for `--limit`.
    pub target_host: String,
    pub vars: VariableBundle,
}

/// Public address of a VM record, if it has a non-empty one.
pub fn vm_address(record: &ResourceRecord) -> Option<&str> {
    match &record.spec {
        ResourceSpec::VirtualMachine(vm) => vm
            .public_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty()),
        _ => None,
    }
}

struct Service {
    image: String,
    port: u16,
    data_dir: String,
    config_dir: String,
    quadlet_dir: String,
    service_name: String,
}

impl Service {
    fn merge(defaults: &ServiceDefaults, overrides: &ServiceOverrides) -> Self {
        let pick = |o: &Option<String>, d: &String| o.clone().unwrap_or_else(|| d.clone());
        Self {
            image: pick(&overrides.image, &defaults.image),
            port: overrides.port.unwrap_or(defaults.port),
            data_dir: pick(&overrides.data_dir, &defaults.data_dir),
            config_dir: pick(&overrides.config_dir, &defaults.config_dir),
            quadlet_dir: pick(&overrides.quadlet_dir, &defaults.quadlet_dir),
            service_name: pick(&overrides.service_name, &defaults.service_name),
        }
    }
}

pub struct BundleBuilder<'a> {
    vault: &'a dyn SecretVault,
    site: &'a SiteConfig,
    defaults: &'a ServiceDefaultsConfig,
}

impl<'a> BundleBuilder<'a> {
    pub fn new(
        vault: &'a dyn SecretVault,
        site: &'a SiteConfig,
        defaults: &'a ServiceDefaultsConfig,
    ) -> Self {
        Self {
            vault,
            site,
            defaults,
        }
    }

    /// Bundle for the bootstrap stage, targeted at the resource's VM.
    ///
    /// A bare VM bootstraps with no variables; services get their full
    /// service bundle.
    pub fn bootstrap(
        &self,
        record: &ResourceRecord,
        resolution: &Resolution,
    ) -> Result<ProvisioningBundle, CoreError> {
        match record.kind() {
            ResourceKind::SearchServer | ResourceKind::DashboardServer => {
                self.build(record, resolution)
            }
            _ => Ok(ProvisioningBundle {
                target_host: self.target_host(record, resolution)?,
                vars: VariableBundle::new(VarSchema::BOOTSTRAP.version),
            }),
        }
    }

    /// Service-stage bundle for `record`.
    pub fn build(
        &self,
        record: &ResourceRecord,
        resolution: &Resolution,
    ) -> Result<ProvisioningBundle, CoreError> {
        let target_host = self.target_host(record, resolution)?;
        let vars = match &record.spec {
            ResourceSpec::VirtualMachine(_) => VariableBundle::new(VarSchema::BOOTSTRAP.version),
            ResourceSpec::SearchServer(_) => self.search_server(record)?,
            ResourceSpec::DashboardServer(_) => self.dashboard_server(record, resolution)?,
            ResourceSpec::SearchIndex(_) | ResourceSpec::OAuthClient(_) => {
                return Err(CoreError::Validation(format!(
                    "{} '{}' has no playbook variables",
                    record.kind(),
                    record.id
                )));
            }
        };
        debug!("bundle for {}: {:?}", record.id, vars);
        Ok(ProvisioningBundle { target_host, vars })
    }

    fn target_host(
        &self,
        record: &ResourceRecord,
        resolution: &Resolution,
    ) -> Result<String, CoreError> {
        let (vm, field) = match record.kind() {
            ResourceKind::VirtualMachine => (Some(record), "public_address"),
            _ => (resolution.host(), "host.public_address"),
        };
        vm.and_then(vm_address)
            .map(str::to_owned)
            .ok_or_else(|| missing(record, field))
    }

    fn secret(
        &self,
        record: &ResourceRecord,
        field: &str,
        key: &SecretRef,
    ) -> Result<Secret, CoreError> {
        match self.vault.get_secret(key) {
            Ok(secret) if secret.is_empty() => Err(missing(record, field)),
            Ok(secret) => Ok(secret),
            Err(VaultError::NotFound(_)) => Err(CoreError::MissingRequiredField {
                resource: record.id.to_string(),
                field: format!("{field} (secret '{key}' not in {} vault)", self.vault.name()),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn search_server(&self, record: &ResourceRecord) -> Result<VariableBundle, CoreError> {
        let ResourceSpec::SearchServer(spec) = &record.spec else {
            return Err(CoreError::Validation(format!("{} is not a search server", record.id)));
        };
        let storage = &spec.storage;
        for (field, value) in [
            ("storage.endpoint", &storage.endpoint),
            ("storage.region", &storage.region),
            ("storage.bucket", &storage.bucket),
        ] {
            if value.trim().is_empty() {
                return Err(missing(record, field));
            }
        }
        let svc = Service::merge(&self.defaults.search, &spec.overrides);

        let mut vars = VariableBundle::new(VarSchema::SEARCH_SERVER.version);
        vars.insert_text("S3_REGION", &storage.region);
        vars.insert_text("S3_ENDPOINT", &storage.endpoint);
        vars.insert_secret(
            "ACCESS_TOKEN",
            self.secret(record, "storage.access_token", &storage.access_token)?,
        );
        vars.insert_secret(
            "SECRET_KEY",
            self.secret(record, "storage.secret_key", &storage.secret_key)?,
        );
        vars.insert_text("S3_BUCKET", &storage.bucket);
        vars.insert_text("quickwit_config_dir", svc.config_dir);
        vars.insert_text("quickwit_service_name", svc.service_name);
        vars.insert_text("quickwit_image", svc.image);
        vars.insert_number("quickwit_port", u64::from(svc.port));
        vars.insert_text("quickwit_data_dir", svc.data_dir);
        vars.insert_text("quickwit_quadlet_dir", svc.quadlet_dir);
        vars.insert_secret("api_token", self.secret(record, "api.token", &spec.api.token)?);
        vars.insert_secret(
            "api_secret",
            self.secret(record, "api.secret", &spec.api.secret)?,
        );
        Ok(vars)
    }

    fn dashboard_server(
        &self,
        record: &ResourceRecord,
        resolution: &Resolution,
    ) -> Result<VariableBundle, CoreError> {
        let ResourceSpec::DashboardServer(spec) = &record.spec else {
            return Err(CoreError::Validation(format!("{} is not a dashboard server", record.id)));
        };
        if spec.admin_user.trim().is_empty() {
            return Err(missing(record, "admin_user"));
        }

        let host = resolution
            .host()
            .and_then(vm_address)
            .ok_or_else(|| missing(record, "host.public_address"))?;
        let search_host = resolution
            .search_host()
            .and_then(vm_address)
            .ok_or_else(|| missing(record, "search_host.public_address"))?;

        let server = resolution
            .get(DependencyRole::SearchServer)
            .ok_or_else(|| missing(record, "search_server"))?;
        let search_port = match &server.spec {
            ResourceSpec::SearchServer(s) => {
                Service::merge(&self.defaults.search, &s.overrides).port
            }
            _ => self.defaults.search.port,
        };
        let quickwit_port = self.site.search_proxy_port.unwrap_or(search_port);

        let index_id = match resolution.get(DependencyRole::SearchIndex).map(|r| &r.spec) {
            Some(ResourceSpec::SearchIndex(index)) => index.index_id().to_owned(),
            _ => return Err(missing(record, "index")),
        };

        let oauth = match resolution.get(DependencyRole::OAuthClient) {
            Some(ResourceRecord {
                spec: ResourceSpec::OAuthClient(client),
                ..
            }) => client,
            _ => return Err(missing(record, "oauth_client")),
        };
        if oauth.client_id.is_empty() {
            return Err(missing(record, "oauth_client.client_id"));
        }

        let svc = Service::merge(&self.defaults.dashboard, &spec.overrides);
        let domain = format!("{host}:{}", svc.port);

        let mut vars = VariableBundle::new(VarSchema::DASHBOARD_SERVER.version);
        vars.insert_text("grafana_oauth_client_id", &oauth.client_id);
        vars.insert_secret(
            "grafana_oauth_client_secret",
            self.secret(record, "oauth_client.client_secret", &oauth.client_secret)?,
        );
        vars.insert_text("grafana_admin_user", &spec.admin_user);
        vars.insert_secret(
            "grafana_admin_password",
            self.secret(record, "admin_password", &spec.admin_password)?,
        );
        vars.insert_text("grafana_oauth_auth_url", self.site.authorize_url());
        vars.insert_text("grafana_oauth_token_url", self.site.token_url());
        vars.insert_text("grafana_oauth_api_url", self.site.userinfo_url());
        vars.insert_text("grafana_root_url", format!("http://{domain}"));
        vars.insert_text("grafana_domain", domain);
        vars.insert_text(
            "quickwit_url",
            format!("http://{search_host}:{quickwit_port}/api/v1"),
        );
        vars.insert_text("quickwit_index", index_id);
        vars.insert_text("grafana_image", svc.image);
        vars.insert_number("grafana_port", u64::from(svc.port));
        vars.insert_text("grafana_service_name", svc.service_name);
        vars.insert_text("grafana_data_dir", svc.data_dir);
        vars.insert_text("grafana_config_dir", svc.config_dir);
        vars.insert_text("grafana_quadlet_dir", svc.quadlet_dir);
        Ok(vars)
    }
}

fn missing(record: &ResourceRecord, field: &str) -> CoreError {
    CoreError::MissingRequiredField {
        resource: record.id.to_string(),
        field: field.to_owned(),
    }
}
