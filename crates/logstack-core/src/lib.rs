//! Provisioning orchestration core for logstack.
//!
//! This crate ties together declarations, the record store, the automation
//! executor and the search admin API into the `Orchestrator`, the central
//! API for declaring, provisioning, reconciling, cancelling and deleting
//! resources. It also provides the lifecycle transition rules, per-resource
//! locking, the dependency resolver, the variable bundle builder and the
//! remote index manager.

pub mod bundle;
pub mod concurrency;
pub mod index;
pub mod lifecycle;
pub mod orchestrator;
pub mod resolver;

pub use bundle::{BundleBuilder, ProvisioningBundle, VarSchema};
pub use concurrency::{install_signal_handler, shutdown_requested, ResourceLock, StoreLock};
pub use index::{search_endpoint, IndexManager};
pub use lifecycle::{is_allowed, validate_transition};
pub use orchestrator::{stage_plan, Orchestrator, ProvisionOutcome, Stage};
pub use resolver::{require_active, resolve, DependencyRole, Resolution, ResolvedDependency};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid declaration: {0}")]
    Schema(#[from] logstack_schema::SchemaError),
    #[error("config error: {0}")]
    Config(#[from] logstack_schema::ConfigError),
    #[error("store error: {0}")]
    Store(#[from] logstack_store::StoreError),
    #[error("vault error: {0}")]
    Vault(#[from] logstack_store::VaultError),
    #[error("runner error: {0}")]
    Runner(#[from] logstack_runner::RunnerError),
    #[error("remote error: {0}")]
    Remote(#[from] logstack_remote::RemoteError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("resource '{0}' is already declared")]
    AlreadyDeclared(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("resource '{resource}' is missing required field '{field}'")]
    MissingRequiredField { resource: String, field: String },
    #[error("resource '{resource}' has an unresolved dependency on '{dependency}': {reason}")]
    UnresolvedDependency {
        resource: String,
        dependency: String,
        reason: String,
    },
    #[error("resource '{resource}' failed at stage '{stage}': {detail}")]
    ExecutionFailure {
        resource: String,
        stage: String,
        detail: String,
    },
    #[error("search server rejected request for '{resource}' with HTTP {status}: {body}")]
    RemoteRejected {
        resource: String,
        status: u16,
        body: String,
    },
    #[error("index '{0}' is already created on its search server")]
    AlreadyCreated(String),
    #[error("index '{0}' is not created on its search server")]
    NotCreated(String),
    #[error("resource '{resource}' is not ready: {reason}")]
    NotReady { resource: String, reason: String },
    #[error("invalid state transition for '{resource}': {from} -> {to}")]
    InvalidTransition {
        resource: String,
        from: String,
        to: String,
    },
    #[error("resource '{resource}' interrupted before stage '{stage}'")]
    Interrupted { resource: String, stage: String },
}

impl CoreError {
    /// Errors caused by the declaration or request itself; retrying without
    /// changing the input cannot succeed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CoreError::Schema(_)
                | CoreError::Validation(_)
                | CoreError::AlreadyDeclared(_)
                | CoreError::MissingRequiredField { .. }
        )
    }
}
