//! Declarations, identifiers, and wire formats for the logstack orchestrator.
//!
//! This crate defines the schema layer: typed resource declarations parsed
//! from TOML (`Declaration`, `ResourceSpec`), search index schema documents
//! (`IndexSchema`), the NDJSON log ingestion format (`LogRecord`), the
//! redacting `Secret` wrapper, and the orchestrator configuration file
//! (`OrchestratorConfig`).

pub mod config;
pub mod declaration;
pub mod index_schema;
pub mod ingest;
pub mod job;
pub mod resource;
pub mod secret;
pub mod types;

pub use config::{
    ConfigError, ExecutorBackend, ExecutorConfig, OrchestratorConfig, PlaybookConfig,
    SearchApiConfig, ServiceDefaults, ServiceDefaultsConfig, SiteConfig, VaultBackend,
    VaultConfig, CONFIG_FILE_NAME,
};
pub use declaration::{
    parse_declarations_file, parse_declarations_str, Declaration, DeclarationFile, SchemaError,
};
pub use index_schema::{validate_index_id, IndexSchema, IndexSchemaError};
pub use ingest::{parse_ndjson, to_ndjson, IngestError, LogRecord};
pub use job::{ExecutionMode, JobHandle};
pub use resource::{
    ApiCredentials, DashboardServerSpec, OAuthClientSpec, ResourceKind, ResourceSpec,
    ResourceStatus, SearchIndexSpec, SearchServerSpec, ServiceOverrides, StorageSettings,
    VirtualMachineSpec,
};
pub use secret::{Secret, REDACTED};
pub use types::{is_valid_identifier, JobId, ResourceId, SecretRef};
