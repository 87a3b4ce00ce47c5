//! Prerequisite resolution against live store state.

use crate::CoreError;
use logstack_schema::{ResourceId, ResourceKind, ResourceSpec, ResourceStatus};
use logstack_store::{ResourceRecord, ResourceStore, StoreError};

/// What a prerequisite is to the resource being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyRole {
    /// VM the resource itself is deployed on.
    Host,
    /// VM of the search server, when it differs from `Host`.
    SearchHost,
    SearchServer,
    SearchIndex,
    OAuthClient,
}

#[derive(Debug, Clone)]
pub struct ResolvedDependency {
    pub role: DependencyRole,
    pub record: ResourceRecord,
}

/// Prerequisites of one resource, in provisioning order.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub deps: Vec<ResolvedDependency>,
}

impl Resolution {
    pub fn get(&self, role: DependencyRole) -> Option<&ResourceRecord> {
        self.deps.iter().find(|d| d.role == role).map(|d| &d.record)
    }

    pub fn host(&self) -> Option<&ResourceRecord> {
        self.get(DependencyRole::Host)
    }

    /// VM running the search server, which may be the resource's own host.
    pub fn search_host(&self) -> Option<&ResourceRecord> {
        self.get(DependencyRole::SearchHost).or_else(|| self.host())
    }

    pub fn ids(&self) -> Vec<&str> {
        self.deps.iter().map(|d| d.record.id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }
}

fn lookup(
    store: &ResourceStore,
    resource: &ResourceId,
    dependency: &ResourceId,
    expected: ResourceKind,
) -> Result<ResourceRecord, CoreError> {
    let record = match store.get(dependency) {
        Ok(r) => r,
        Err(StoreError::NotFound(_) | StoreError::InvalidId(_)) => {
            return Err(CoreError::UnresolvedDependency {
                resource: resource.to_string(),
                dependency: dependency.to_string(),
                reason: "not declared".to_owned(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    if record.kind() != expected {
        return Err(CoreError::UnresolvedDependency {
            resource: resource.to_string(),
            dependency: dependency.to_string(),
            reason: format!("expected {expected}, found {}", record.kind()),
        });
    }
    Ok(record)
}

fn server_host(server: &ResourceRecord) -> Option<&ResourceId> {
    match &server.spec {
        ResourceSpec::SearchServer(s) => Some(&s.host),
        _ => None,
    }
}

fn index_server(index: &ResourceRecord) -> Option<&ResourceId> {
    match &index.spec {
        ResourceSpec::SearchIndex(s) => Some(&s.server),
        _ => None,
    }
}

/// Resolve the prerequisites of `record` in provisioning order. Pure read.
pub fn resolve(store: &ResourceStore, record: &ResourceRecord) -> Result<Resolution, CoreError> {
    let id = &record.id;
    let mut deps = Vec::new();
    let mut push = |role, record| deps.push(ResolvedDependency { role, record });

    match &record.spec {
        ResourceSpec::VirtualMachine(_) | ResourceSpec::OAuthClient(_) => {}
        ResourceSpec::SearchServer(s) => {
            push(
                DependencyRole::Host,
                lookup(store, id, &s.host, ResourceKind::VirtualMachine)?,
            );
        }
        ResourceSpec::SearchIndex(s) => {
            let server = lookup(store, id, &s.server, ResourceKind::SearchServer)?;
            if let Some(host) = server_host(&server) {
                push(
                    DependencyRole::Host,
                    lookup(store, id, host, ResourceKind::VirtualMachine)?,
                );
            }
            push(DependencyRole::SearchServer, server);
        }
        ResourceSpec::DashboardServer(d) => {
            let host = lookup(store, id, &d.host, ResourceKind::VirtualMachine)?;
            let index = lookup(store, id, &d.index, ResourceKind::SearchIndex)?;
            let server_id = index_server(&index).ok_or_else(|| CoreError::UnresolvedDependency {
                resource: id.to_string(),
                dependency: index.id.to_string(),
                reason: "index has no search server".to_owned(),
            })?;
            let server = lookup(store, id, server_id, ResourceKind::SearchServer)?;
            let search_host = match server_host(&server) {
                Some(vm) if *vm != host.id => {
                    Some(lookup(store, id, vm, ResourceKind::VirtualMachine)?)
                }
                _ => None,
            };
            let oauth = match &d.oauth_client {
                Some(client) => lookup(store, id, client, ResourceKind::OAuthClient)?,
                None => {
                    return Err(CoreError::UnresolvedDependency {
                        resource: id.to_string(),
                        dependency: "oauth_client".to_owned(),
                        reason: "no OAuth client linked yet".to_owned(),
                    });
                }
            };

            push(DependencyRole::Host, host);
            if let Some(vm) = search_host {
                push(DependencyRole::SearchHost, vm);
            }
            push(DependencyRole::SearchServer, server);
            push(DependencyRole::SearchIndex, index);
            push(DependencyRole::OAuthClient, oauth);
        }
    }

    Ok(Resolution { deps })
}

/// Fail on the first prerequisite that is not `Active`.
pub fn require_active(resource: &str, resolution: &Resolution) -> Result<(), CoreError> {
    match resolution
        .deps
        .iter()
        .find(|d| d.record.status != ResourceStatus::Active)
    {
        Some(dep) => Err(CoreError::UnresolvedDependency {
            resource: resource.to_owned(),
            dependency: dep.record.id.to_string(),
            reason: format!("{} is {}", dep.record.kind(), dep.record.status),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logstack_schema::{
        ApiCredentials, DashboardServerSpec, IndexSchema, OAuthClientSpec, SearchIndexSpec,
        SearchServerSpec, SecretRef, ServiceOverrides, StorageSettings, VirtualMachineSpec,
    };
    use logstack_store::StoreLayout;

    fn store() -> (tempfile::TempDir, ResourceStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        (dir, ResourceStore::new(layout))
    }

    fn put(store: &ResourceStore, id: &str, spec: ResourceSpec, status: ResourceStatus) {
        let mut r = ResourceRecord::new(ResourceId::new(id), spec);
        r.status = status;
        store.put(&r).unwrap();
    }

    fn vm(addr: &str) -> ResourceSpec {
        ResourceSpec::VirtualMachine(VirtualMachineSpec {
            public_address: Some(addr.into()),
        })
    }

    fn server(host: &str) -> ResourceSpec {
        ResourceSpec::SearchServer(SearchServerSpec {
            host: ResourceId::new(host),
            storage: StorageSettings {
                endpoint: "https://s3".into(),
                region: "eu".into(),
                bucket: "b".into(),
                access_token: SecretRef::new("at"),
                secret_key: SecretRef::new("sk"),
            },
            api: ApiCredentials {
                token: SecretRef::new("t"),
                secret: SecretRef::new("s"),
            },
            overrides: ServiceOverrides::default(),
        })
    }

    fn index(server: &str) -> ResourceSpec {
        ResourceSpec::SearchIndex(SearchIndexSpec {
            server: ResourceId::new(server),
            schema: IndexSchema::parse_json(r#"{"index_id":"logs"}"#).unwrap(),
        })
    }

    fn dashboard(host: &str, oauth: Option<&str>) -> ResourceSpec {
        ResourceSpec::DashboardServer(DashboardServerSpec {
            host: ResourceId::new(host),
            index: ResourceId::new("logs"),
            oauth_client: oauth.map(ResourceId::new),
            admin_user: "admin".into(),
            admin_password: SecretRef::new("pw"),
            overrides: ServiceOverrides::default(),
        })
    }

    fn oauth() -> ResourceSpec {
        ResourceSpec::OAuthClient(OAuthClientSpec {
            app_name: "Grafana".into(),
            client_id: "cid".into(),
            client_secret: SecretRef::new("cs"),
            redirect_uris: vec![],
            default_redirect_uri: String::new(),
            scopes: "openid profile user:email".into(),
        })
    }

    fn stack(store: &ResourceStore) {
        use ResourceStatus::Active;
        put(store, "vm-a", vm("10.0.0.2"), Active);
        put(store, "vm-b", vm("10.0.0.3"), Active);
        put(store, "qw", server("vm-a"), Active);
        put(store, "logs", index("qw"), Active);
        put(store, "oauth-1", oauth(), Active);
    }

    #[test]
    fn index_resolves_vm_then_server() {
        let (_dir, store) = store();
        stack(&store);
        let record = store.get("logs").unwrap();
        let res = resolve(&store, &record).unwrap();
        assert_eq!(res.ids(), vec!["vm-a", "qw"]);
    }

    #[test]
    fn dashboard_on_separate_vm_lists_both_hosts() {
        let (_dir, store) = store();
        stack(&store);
        put(
            &store,
            "grafana",
            dashboard("vm-b", Some("oauth-1")),
            ResourceStatus::Declared,
        );
        let record = store.get("grafana").unwrap();
        let res = resolve(&store, &record).unwrap();
        assert_eq!(res.ids(), vec!["vm-b", "vm-a", "qw", "logs", "oauth-1"]);
        assert_eq!(res.search_host().unwrap().id, "vm-a");
        assert_eq!(res.host().unwrap().id, "vm-b");
    }

    #[test]
    fn dashboard_sharing_the_search_vm_lists_it_once() {
        let (_dir, store) = store();
        stack(&store);
        put(
            &store,
            "grafana",
            dashboard("vm-a", Some("oauth-1")),
            ResourceStatus::Declared,
        );
        let record = store.get("grafana").unwrap();
        let res = resolve(&store, &record).unwrap();
        assert_eq!(res.ids(), vec!["vm-a", "qw", "logs", "oauth-1"]);
        assert_eq!(res.search_host().unwrap().id, "vm-a");
    }

    #[test]
    fn missing_reference_is_unresolved() {
        let (_dir, store) = store();
        put(&store, "qw", server("vm-x"), ResourceStatus::Declared);
        let record = store.get("qw").unwrap();
        let err = resolve(&store, &record).unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnresolvedDependency { ref dependency, .. } if dependency == "vm-x"
        ));
    }

    #[test]
    fn wrong_kind_is_unresolved() {
        let (_dir, store) = store();
        stack(&store);
        put(&store, "qw2", server("logs"), ResourceStatus::Declared);
        let record = store.get("qw2").unwrap();
        let err = resolve(&store, &record).unwrap_err();
        match err {
            CoreError::UnresolvedDependency { reason, .. } => {
                assert!(reason.contains("expected virtual_machine"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn unlinked_oauth_client_is_unresolved() {
        let (_dir, store) = store();
        stack(&store);
        put(&store, "grafana", dashboard("vm-a", None), ResourceStatus::Declared);
        let record = store.get("grafana").unwrap();
        assert!(matches!(
            resolve(&store, &record),
            Err(CoreError::UnresolvedDependency { .. })
        ));
    }

    #[test]
    fn require_active_names_first_inactive() {
        let (_dir, store) = store();
        put(&store, "vm-a", vm("10.0.0.2"), ResourceStatus::Active);
        put(&store, "qw", server("vm-a"), ResourceStatus::Failed);
        put(&store, "logs", index("qw"), ResourceStatus::Declared);
        let record = store.get("logs").unwrap();
        let res = resolve(&store, &record).unwrap();
        let err = require_active("logs", &res).unwrap_err();
        match err {
            CoreError::UnresolvedDependency {
                dependency, reason, ..
            } => {
                assert_eq!(dependency, "qw");
                assert!(reason.contains("failed"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn vm_has_no_prerequisites() {
        let (_dir, store) = store();
        put(&store, "vm-a", vm("10.0.0.2"), ResourceStatus::Declared);
        let record = store.get("vm-a").unwrap();
        let res = resolve(&store, &record).unwrap();
        assert!(res.is_empty());
        assert!(require_active("vm-a", &res).is_ok());
    }
}
