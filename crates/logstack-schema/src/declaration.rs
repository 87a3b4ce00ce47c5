use crate::index_schema::IndexSchemaError;
use crate::resource::{ResourceKind, ResourceSpec, ServiceOverrides};
use crate::types::{is_valid_identifier, ResourceId, SecretRef};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read declaration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse declaration: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error(transparent)]
    IndexSchema(#[from] IndexSchemaError),
    #[error("declaration file contains no [[resource]] entries")]
    NoResources,
    #[error("invalid identifier '{0}': use 1-128 of [A-Za-z0-9_.-], not starting with '.'")]
    InvalidIdentifier(String),
    #[error("{kind} field '{field}' must not be empty")]
    EmptyField { kind: ResourceKind, field: &'static str },
    #[error("{kind} field '{field}' must not be 0")]
    ZeroPort { kind: ResourceKind, field: &'static str },
    #[error("declared id '{declared}' does not match schema index_id '{schema}'")]
    IndexIdMismatch { declared: String, schema: String },
    #[error("{0} resources are created by the orchestrator and cannot be declared")]
    NotDeclarable(ResourceKind),
    #[error("resource '{0}' is declared more than once")]
    DuplicateId(String),
}

/// One resource entry of a declaration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    #[serde(flatten)]
    pub spec: ResourceSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclarationFile {
    #[serde(default)]
    pub resource: Vec<Declaration>,
}

impl Declaration {
    pub fn new(id: Option<ResourceId>, spec: ResourceSpec) -> Self {
        Self { id, spec }
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    /// The identifier the resource will be stored under, when one is known
    /// before the orchestrator assigns a fresh one. Indexes always derive it
    /// from the schema document.
    pub fn resolved_id(&self) -> Option<ResourceId> {
        match &self.spec {
            ResourceSpec::SearchIndex(index) => Some(ResourceId::new(index.index_id())),
            _ => self.id.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        let kind = self.kind();
        if let Some(id) = &self.id {
            check_identifier(id)?;
        }
        match &self.spec {
            ResourceSpec::VirtualMachine(vm) => {
                if let Some(addr) = &vm.public_address {
                    non_empty(kind, "public_address", addr)?;
                }
            }
            ResourceSpec::SearchServer(s) => {
                check_identifier(&s.host)?;
                non_empty(kind, "storage.endpoint", &s.storage.endpoint)?;
                non_empty(kind, "storage.region", &s.storage.region)?;
                non_empty(kind, "storage.bucket", &s.storage.bucket)?;
                secret_ref(kind, "storage.access_token", &s.storage.access_token)?;
                secret_ref(kind, "storage.secret_key", &s.storage.secret_key)?;
                secret_ref(kind, "api.token", &s.api.token)?;
                secret_ref(kind, "api.secret", &s.api.secret)?;
                check_overrides(kind, &s.overrides)?;
            }
            ResourceSpec::SearchIndex(index) => {
                check_identifier(&index.server)?;
                let schema_id = index.index_id();
                if let Some(declared) = &self.id {
                    if declared.as_str() != schema_id {
                        return Err(SchemaError::IndexIdMismatch {
                            declared: declared.to_string(),
                            schema: schema_id.to_owned(),
                        });
                    }
                }
            }
            ResourceSpec::DashboardServer(d) => {
                check_identifier(&d.host)?;
                check_identifier(&d.index)?;
                if let Some(client) = &d.oauth_client {
                    check_identifier(client)?;
                }
                non_empty(kind, "admin_user", &d.admin_user)?;
                secret_ref(kind, "admin_password", &d.admin_password)?;
                check_overrides(kind, &d.overrides)?;
            }
            ResourceSpec::OAuthClient(_) => return Err(SchemaError::NotDeclarable(kind)),
        }
        Ok(())
    }
}

fn check_identifier(id: &ResourceId) -> Result<(), SchemaError> {
    if is_valid_identifier(id) {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(id.to_string()))
    }
}

fn non_empty(kind: ResourceKind, field: &'static str, value: &str) -> Result<(), SchemaError> {
    if value.trim().is_empty() {
        Err(SchemaError::EmptyField { kind, field })
    } else {
        Ok(())
    }
}

fn secret_ref(kind: ResourceKind, field: &'static str, r: &SecretRef) -> Result<(), SchemaError> {
    non_empty(kind, field, r)
}

fn check_overrides(kind: ResourceKind, o: &ServiceOverrides) -> Result<(), SchemaError> {
    if o.port == Some(0) {
        return Err(SchemaError::ZeroPort {
            kind,
            field: "overrides.port",
        });
    }
    let paths = [
        ("overrides.image", &o.image),
        ("overrides.data_dir", &o.data_dir),
        ("overrides.config_dir", &o.config_dir),
        ("overrides.quadlet_dir", &o.quadlet_dir),
        ("overrides.service_name", &o.service_name),
    ];
    for (field, value) in paths {
        if let Some(v) = value {
            non_empty(kind, field, v)?;
        }
    }
    Ok(())
}

/// Parse and validate every entry of a declaration document.
pub fn parse_declarations_str(input: &str) -> Result<Vec<Declaration>, SchemaError> {
    let file: DeclarationFile = toml::from_str(input)?;
    if file.resource.is_empty() {
        return Err(SchemaError::NoResources);
    }
    let mut seen = std::collections::BTreeSet::new();
    for decl in &file.resource {
        decl.validate()?;
        if let Some(id) = decl.resolved_id() {
            if !seen.insert(id.clone()) {
                return Err(SchemaError::DuplicateId(id.into_inner()));
            }
        }
    }
    Ok(file.resource)
}

pub fn parse_declarations_file(path: impl AsRef<Path>) -> Result<Vec<Declaration>, SchemaError> {
    let content = fs::read_to_string(path)?;
    parse_declarations_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACK: &str = r#"
[[resource]]
id = "vm-a"
kind = "virtual_machine"
public_address = "10.0.0.2"

[[resource]]
id = "qw"
kind = "search_server"
host = "vm-a"
storage = { endpoint = "https://s3.example.com", region = "eu-1", bucket = "logs", access_token = "s3-token", secret_key = "s3-secret" }
api = { token = "qw-api-token", secret = "qw-api-secret" }

[[resource]]
kind = "search_index"
server = "qw"
schema = '{"index_id":"logs","version":"0.9"}'

[[resource]]
id = "grafana"
kind = "dashboard_server"
host = "vm-a"
index = "logs"
admin_user = "admin"
admin_password = "grafana-admin"
overrides = { port = 3001 }
"#;

    #[test]
    fn parses_full_stack() {
        let decls = parse_declarations_str(STACK).unwrap();
        assert_eq!(decls.len(), 4);
        assert_eq!(decls[0].kind(), ResourceKind::VirtualMachine);
        assert_eq!(decls[2].resolved_id().unwrap(), "logs");
        match &decls[3].spec {
            ResourceSpec::DashboardServer(d) => {
                assert_eq!(d.overrides.port, Some(3001));
                assert!(d.oauth_client.is_none());
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn index_id_comes_from_schema() {
        let decls = parse_declarations_str(
            r#"
[[resource]]
kind = "search_index"
server = "qw"
schema = { index_id = "logs" }
"#,
        )
        .unwrap();
        assert_eq!(decls[0].resolved_id().unwrap(), "logs");
    }

    #[test]
    fn mismatched_index_id_rejected() {
        let err = parse_declarations_str(
            r#"
[[resource]]
id = "other"
kind = "search_index"
server = "qw"
schema = '{"index_id":"logs"}'
"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::IndexIdMismatch { .. }));
    }

    #[test]
    fn oauth_client_cannot_be_declared() {
        let err = parse_declarations_str(
            r#"
[[resource]]
kind = "oauth_client"
app_name = "Grafana"
client_id = "x"
client_secret = "y"
redirect_uris = []
default_redirect_uri = "z"
scopes = "openid"
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::NotDeclarable(ResourceKind::OAuthClient)
        ));
    }

    #[test]
    fn empty_fields_rejected() {
        let err = parse_declarations_str(
            r#"
[[resource]]
kind = "dashboard_server"
host = "vm-a"
index = "logs"
admin_user = ""
admin_password = "pw"
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::EmptyField {
                field: "admin_user",
                ..
            }
        ));
    }

    #[test]
    fn zero_port_rejected() {
        let err = parse_declarations_str(
            r#"
[[resource]]
kind = "dashboard_server"
host = "vm-a"
index = "logs"
admin_user = "admin"
admin_password = "pw"
overrides = { port = 0 }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::ZeroPort { .. }));
    }

    #[test]
    fn unknown_fields_and_kinds_rejected() {
        assert!(parse_declarations_str(
            r#"
[[resource]]
kind = "virtual_machine"
cpu = 4
"#
        )
        .is_err());
        assert!(parse_declarations_str(
            r#"
[[resource]]
kind = "container"
"#
        )
        .is_err());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let err = parse_declarations_str(
            r#"
[[resource]]
id = "vm-a"
kind = "virtual_machine"

[[resource]]
id = "vm-a"
kind = "virtual_machine"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateId(id) if id == "vm-a"));
    }

    #[test]
    fn empty_document_rejected() {
        assert!(matches!(
            parse_declarations_str(""),
            Err(SchemaError::NoResources)
        ));
    }

    #[test]
    fn invalid_reference_rejected() {
        let err = parse_declarations_str(
            r#"
[[resource]]
kind = "search_index"
server = "../etc"
schema = '{"index_id":"logs"}'
"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidIdentifier(_)));
    }
}
