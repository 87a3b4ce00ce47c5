use crate::bundle::{vm_address, BundleBuilder, ProvisioningBundle};
use crate::concurrency::{shutdown_requested, ResourceLock, StoreLock};
use crate::index::{search_endpoint, IndexManager, CREATE_STAGE};
use crate::lifecycle::validate_transition;
use crate::resolver::{require_active, resolve, DependencyRole, Resolution};
use crate::CoreError;
use logstack_remote::{HttpSearchAdmin, SearchAdminApi, SearchEndpoint};
use logstack_runner::{select_executor, AutomationExecutor, JobStatus, PlaybookInvocation};
use logstack_schema::{
    is_valid_identifier, Declaration, ExecutionMode, JobHandle, OAuthClientSpec,
    OrchestratorConfig, PlaybookConfig, ResourceId, ResourceKind, ResourceSpec, ResourceStatus,
    Secret, SecretRef, VaultBackend,
};
use logstack_store::{
    EnvVault, FileVault, ResourceRecord, ResourceStore, SecretVault, StoreError, StoreLayout,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const OUTPUT_TAIL_LINES: usize = 20;
const OAUTH_APP_NAME: &str = "Grafana";
const OAUTH_SCOPES: &str = "openid profile user:email";

/// One automation step of a resource's provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Bootstrap,
    SearchService,
    DashboardService,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Bootstrap => "bootstrap",
            Stage::SearchService => "search-service",
            Stage::DashboardService => "dashboard-service",
        }
    }

    /// Bootstrap blocks; service deployments are dispatched.
    pub fn mode(self) -> ExecutionMode {
        match self {
            Stage::Bootstrap => ExecutionMode::Foreground,
            Stage::SearchService | Stage::DashboardService => ExecutionMode::Background,
        }
    }

    pub fn playbook(self, playbooks: &PlaybookConfig) -> &Path {
        match self {
            Stage::Bootstrap => &playbooks.bootstrap,
            Stage::SearchService => &playbooks.search_service,
            Stage::DashboardService => &playbooks.dashboard_service,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Executor stages for `kind`, in run order. A background stage is always
/// the last one.
pub fn stage_plan(kind: ResourceKind) -> &'static [Stage] {
    match kind {
        ResourceKind::VirtualMachine => &[Stage::Bootstrap],
        ResourceKind::SearchServer => &[Stage::Bootstrap, Stage::SearchService],
        ResourceKind::DashboardServer => &[Stage::Bootstrap, Stage::DashboardService],
        ResourceKind::SearchIndex | ResourceKind::OAuthClient => &[],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Every stage finished; the resource is `Active`.
    Active,
    /// A background stage is running; `reconcile` or `wait` finalizes it.
    Dispatched(JobHandle),
}

/// Central API for declaring and driving resources through their lifecycle.
///
/// Every mutating operation takes the resource's [`ResourceLock`], re-reads
/// the record and validates the transition before writing anything.
pub struct Orchestrator {
    layout: StoreLayout,
    store: ResourceStore,
    config: OrchestratorConfig,
    vault: Arc<dyn SecretVault>,
    executor: Arc<dyn AutomationExecutor>,
    search_api: Arc<dyn SearchAdminApi>,
}

impl Orchestrator {
    /// Open (initializing if needed) the store at `root` with explicit
    /// collaborators.
    ///
    /// Resources left in `Provisioning` by a crashed run are moved to
    /// `Failed` so they can be retried.
    pub fn new(
        root: impl Into<PathBuf>,
        config: OrchestratorConfig,
        vault: Arc<dyn SecretVault>,
        executor: Arc<dyn AutomationExecutor>,
        search_api: Arc<dyn SearchAdminApi>,
    ) -> Result<Self, CoreError> {
        let layout = StoreLayout::new(root);
        if layout.is_initialized() {
            layout.verify_version()?;
        } else {
            layout.initialize()?;
        }
        let store = ResourceStore::new(layout.clone());
        let orchestrator = Self {
            layout,
            store,
            config,
            vault,
            executor,
            search_api,
        };

        // Recovery mutates records; skip it while another process holds the store.
        match StoreLock::try_acquire(&orchestrator.layout) {
            Ok(Some(_lock)) => {
                if let Err(e) = orchestrator.recover_interrupted() {
                    warn!("recovery of interrupted runs failed: {e}");
                }
            }
            Ok(None) => debug!("store lock held; skipping recovery"),
            Err(e) => warn!("store lock check failed; skipping recovery: {e}"),
        }
        Ok(orchestrator)
    }

    /// Build the collaborators named by `config`.
    pub fn from_config(
        root: impl Into<PathBuf>,
        config: OrchestratorConfig,
    ) -> Result<Self, CoreError> {
        let root = root.into();
        let layout = StoreLayout::new(&root);
        let vault: Arc<dyn SecretVault> = match config.vault.backend {
            VaultBackend::File => Arc::new(FileVault::new(&layout)),
            VaultBackend::Env => Arc::new(EnvVault),
        };
        let executor: Arc<dyn AutomationExecutor> =
            Arc::from(select_executor(&config.executor, &layout.jobs_dir())?);
        let search_api: Arc<dyn SearchAdminApi> =
            Arc::new(HttpSearchAdmin::from_config(&config.search_api));
        Self::new(root, config, vault, executor, search_api)
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn executor(&self) -> &dyn AutomationExecutor {
        self.executor.as_ref()
    }

    pub fn vault(&self) -> &dyn SecretVault {
        self.vault.as_ref()
    }

    fn recover_interrupted(&self) -> Result<(), CoreError> {
        for record in self.store.list()? {
            if record.status != ResourceStatus::Provisioning || record.pending_job.is_some() {
                continue;
            }
            let Some(_lock) = ResourceLock::try_acquire(&self.layout, &record.id)? else {
                debug!("{} is locked by a live run; leaving it alone", record.id);
                continue;
            };
            let mut record = self.store.get(&record.id)?;
            if record.status != ResourceStatus::Provisioning || record.pending_job.is_some() {
                continue;
            }
            let stage = next_stage_name(&record);
            warn!(
                "{} was interrupted during stage '{stage}'; marking it failed",
                record.id
            );
            self.fail(&mut record, &stage, "interrupted")?;
        }
        Ok(())
    }

    fn get_record(&self, id: &str) -> Result<ResourceRecord, CoreError> {
        self.store.get(id).map_err(|e| match e {
            StoreError::NotFound(id) => CoreError::NotFound(id),
            other => CoreError::Store(other),
        })
    }

    pub fn inspect(&self, id: &str) -> Result<ResourceRecord, CoreError> {
        self.get_record(id)
    }

    pub fn list(&self) -> Result<Vec<ResourceRecord>, CoreError> {
        Ok(self.store.list()?)
    }

    pub fn put_secret(&self, key: &SecretRef, value: &Secret) -> Result<(), CoreError> {
        self.vault.put_secret(key, value)?;
        Ok(())
    }

    /// Validate and persist a declaration as a new `Declared` resource.
    ///
    /// A dashboard declared without an OAuth client gets one registered
    /// immediately when its host is known; otherwise registration is retried
    /// before provisioning.
    pub fn declare(&self, declaration: Declaration) -> Result<ResourceRecord, CoreError> {
        declaration.validate()?;
        let kind = declaration.kind();
        let id = declaration
            .resolved_id()
            .unwrap_or_else(|| generate_id(kind));
        if !is_valid_identifier(&id) {
            return Err(CoreError::Validation(format!(
                "'{id}' cannot be used as a resource id"
            )));
        }
        info!("declaring {kind} {id}");

        {
            let _lock = ResourceLock::acquire(&self.layout, &id)?;
            let record = ResourceRecord::new(id.clone(), declaration.spec);
            self.store.insert_new(&record).map_err(|e| match e {
                StoreError::Duplicate(id) => CoreError::AlreadyDeclared(id),
                other => CoreError::Store(other),
            })?;
        }

        if kind == ResourceKind::DashboardServer {
            match self.ensure_oauth_client(&id) {
                Ok(_) => {}
                Err(
                    e @ (CoreError::MissingRequiredField { .. }
                    | CoreError::UnresolvedDependency { .. }
                    | CoreError::Vault(_)),
                ) => warn!("OAuth client for {id} deferred until provisioning: {e}"),
                Err(e) => return Err(e),
            }
        }
        self.get_record(&id)
    }

    /// Make sure the dashboard `dashboard_id` is linked to an OAuth client,
    /// registering one with freshly minted credentials if needed.
    pub fn ensure_oauth_client(&self, dashboard_id: &str) -> Result<ResourceId, CoreError> {
        let _lock = ResourceLock::acquire(&self.layout, dashboard_id)?;
        let mut dashboard = self.get_record(dashboard_id)?;
        let (host_id, port) = match &dashboard.spec {
            ResourceSpec::DashboardServer(spec) => {
                if let Some(existing) = &spec.oauth_client {
                    return Ok(existing.clone());
                }
                (
                    spec.host.clone(),
                    spec.overrides
                        .port
                        .unwrap_or(self.config.defaults.dashboard.port),
                )
            }
            _ => {
                return Err(CoreError::Validation(format!(
                    "{} '{dashboard_id}' does not take an OAuth client",
                    dashboard.kind()
                )));
            }
        };

        let host = match self.store.get(&host_id) {
            Ok(record) if record.kind() == ResourceKind::VirtualMachine => record,
            Ok(record) => {
                return Err(CoreError::UnresolvedDependency {
                    resource: dashboard_id.to_owned(),
                    dependency: host_id.to_string(),
                    reason: format!("expected virtual_machine, found {}", record.kind()),
                });
            }
            Err(StoreError::NotFound(_)) => {
                return Err(CoreError::UnresolvedDependency {
                    resource: dashboard_id.to_owned(),
                    dependency: host_id.to_string(),
                    reason: "not declared".to_owned(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let address = vm_address(&host).ok_or_else(|| CoreError::MissingRequiredField {
            resource: dashboard_id.to_owned(),
            field: "host.public_address".to_owned(),
        })?;
        let redirect = format!("http://{address}:{port}/login/generic_oauth");

        let mut preferred = ResourceId::new(format!("{dashboard_id}-oauth"));
        if !is_valid_identifier(&preferred) {
            preferred = generate_id(ResourceKind::OAuthClient);
        }

        let preferred_usable = {
            let _client_lock = ResourceLock::acquire(&self.layout, &preferred)?;
            match self.store.get(&preferred) {
                Ok(existing) if registered_for(&existing, &redirect) => {
                    debug!("reusing OAuth client {preferred} for {dashboard_id}");
                    true
                }
                Ok(existing) => {
                    warn!(
                        "{preferred} is a {} not registered for {dashboard_id}; minting a new OAuth client",
                        existing.kind()
                    );
                    false
                }
                Err(StoreError::NotFound(_)) => {
                    self.register_oauth_client(&preferred, &redirect, dashboard_id)?;
                    true
                }
                Err(e) => return Err(e.into()),
            }
        };
        let client_id = if preferred_usable {
            preferred
        } else {
            let generated = generate_id(ResourceKind::OAuthClient);
            let _client_lock = ResourceLock::acquire(&self.layout, &generated)?;
            self.register_oauth_client(&generated, &redirect, dashboard_id)?;
            generated
        };

        if let ResourceSpec::DashboardServer(spec) = &mut dashboard.spec {
            spec.oauth_client = Some(client_id.clone());
        }
        dashboard.touch();
        self.store.put(&dashboard)?;
        Ok(client_id)
    }

    /// Mint credentials for `client_id` and store it as an active client.
    /// The caller holds the client's lock.
    fn register_oauth_client(
        &self,
        client_id: &ResourceId,
        redirect: &str,
        dashboard_id: &str,
    ) -> Result<(), CoreError> {
        let secret_ref = SecretRef::new(format!("oauth/{client_id}/client_secret"));
        let secret = Secret::new(format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        ));
        self.vault.put_secret(&secret_ref, &secret)?;

        let spec = OAuthClientSpec {
            app_name: OAUTH_APP_NAME.to_owned(),
            client_id: Uuid::new_v4().simple().to_string(),
            client_secret: secret_ref,
            redirect_uris: vec![redirect.to_owned()],
            default_redirect_uri: redirect.to_owned(),
            scopes: OAUTH_SCOPES.to_owned(),
        };
        let mut client = ResourceRecord::new(client_id.clone(), ResourceSpec::OAuthClient(spec));
        let kind = client.kind();
        validate_transition(client_id, kind, client.status, ResourceStatus::Provisioning)?;
        validate_transition(
            client_id,
            kind,
            ResourceStatus::Provisioning,
            ResourceStatus::Active,
        )?;
        client.status = ResourceStatus::Active;
        self.store.insert_new(&client)?;
        info!("registered OAuth client {client_id} for {dashboard_id}");
        Ok(())
    }

    /// Drive `id` from `Declared`, `Failed` or (indexes) `Deleted` towards
    /// `Active`.
    ///
    /// Prerequisites and variable bundles are checked before the resource
    /// leaves its current state. Completed stages of a failed run are not
    /// repeated.
    pub fn provision(&self, id: &str) -> Result<ProvisionOutcome, CoreError> {
        info!("provisioning {id}");
        let kind = self.get_record(id)?.kind();
        match kind {
            ResourceKind::SearchIndex => {
                self.create_index(id)?;
                return Ok(ProvisionOutcome::Active);
            }
            ResourceKind::DashboardServer => {
                self.ensure_oauth_client(id)?;
            }
            _ => {}
        }

        let _lock = ResourceLock::acquire(&self.layout, id)?;
        let mut record = self.get_record(id)?;
        let from = record.status;
        validate_transition(id, kind, from, ResourceStatus::Provisioning)?;

        let resolution = resolve(&self.store, &record)?;
        require_active(id, &resolution)?;
        self.check_credentials(&record)?;
        let bundles = self.build_bundles(&record, &resolution)?;

        if matches!(from, ResourceStatus::Declared | ResourceStatus::Deleted) {
            record.completed_stages.clear();
        }
        record.status = ResourceStatus::Provisioning;
        record.last_failure = None;
        record.pending_job = None;
        record.touch();
        self.store.put(&record)?;

        self.run_stages(&mut record, bundles)
    }

    fn bundle_builder(&self) -> BundleBuilder<'_> {
        BundleBuilder::new(
            self.vault.as_ref(),
            &self.config.site,
            &self.config.defaults,
        )
    }

    fn build_bundles(
        &self,
        record: &ResourceRecord,
        resolution: &Resolution,
    ) -> Result<Vec<(Stage, ProvisioningBundle)>, CoreError> {
        let builder = self.bundle_builder();
        stage_plan(record.kind())
            .iter()
            .map(|&stage| {
                let bundle = match stage {
                    Stage::Bootstrap => builder.bootstrap(record, resolution)?,
                    Stage::SearchService | Stage::DashboardService => {
                        builder.build(record, resolution)?
                    }
                };
                Ok((stage, bundle))
            })
            .collect()
    }

    /// OAuth clients have no stages; their minted secret must be present.
    fn check_credentials(&self, record: &ResourceRecord) -> Result<(), CoreError> {
        if let ResourceSpec::OAuthClient(client) = &record.spec {
            if self.vault.get_secret(&client.client_secret).is_err() {
                return Err(CoreError::MissingRequiredField {
                    resource: record.id.to_string(),
                    field: format!("client_secret (secret '{}')", client.client_secret),
                });
            }
        }
        Ok(())
    }

    fn run_stages(
        &self,
        record: &mut ResourceRecord,
        bundles: Vec<(Stage, ProvisioningBundle)>,
    ) -> Result<ProvisionOutcome, CoreError> {
        let playbooks = &self.config.playbooks;
        for (stage, bundle) in bundles {
            if record.stage_completed(stage.name()) {
                debug!("{}: stage {stage} already completed, skipping", record.id);
                continue;
            }
            if shutdown_requested() {
                self.fail(record, stage.name(), "interrupted")?;
                return Err(CoreError::Interrupted {
                    resource: record.id.to_string(),
                    stage: stage.name().to_owned(),
                });
            }

            let invocation = PlaybookInvocation {
                stage: stage.name().to_owned(),
                playbook: stage.playbook(playbooks).to_path_buf(),
                inventory: playbooks.inventory.clone(),
                target_host: bundle.target_host,
                remote_user: playbooks.remote_user.clone(),
                vars: bundle.vars,
                mode: stage.mode(),
            };
            info!(
                "{}: running stage {stage} on {} ({})",
                record.id,
                invocation.target_host,
                stage.mode()
            );

            match self.executor.run(&invocation) {
                Ok(job) if stage.mode() == ExecutionMode::Background => {
                    info!("{}: stage {stage} dispatched as job {}", record.id, job.job_id);
                    record.pending_job = Some(job.clone());
                    record.touch();
                    self.store.put(record)?;
                    return Ok(ProvisionOutcome::Dispatched(job));
                }
                Ok(_) => {
                    record.completed_stages.push(stage.name().to_owned());
                    record.touch();
                    self.store.put(record)?;
                }
                Err(e) => {
                    let detail = e.to_string();
                    self.fail(record, stage.name(), &detail)?;
                    return Err(CoreError::ExecutionFailure {
                        resource: record.id.to_string(),
                        stage: stage.name().to_owned(),
                        detail,
                    });
                }
            }
        }

        self.activate(record)?;
        Ok(ProvisionOutcome::Active)
    }

    fn activate(&self, record: &mut ResourceRecord) -> Result<(), CoreError> {
        validate_transition(
            &record.id,
            record.kind(),
            record.status,
            ResourceStatus::Active,
        )?;
        record.status = ResourceStatus::Active;
        record.pending_job = None;
        record.last_failure = None;
        record.touch();
        self.store.put(record)?;
        info!("{} is active", record.id);
        Ok(())
    }

    fn fail(&self, record: &mut ResourceRecord, stage: &str, message: &str) -> Result<(), CoreError> {
        validate_transition(
            &record.id,
            record.kind(),
            record.status,
            ResourceStatus::Failed,
        )?;
        record.status = ResourceStatus::Failed;
        record.pending_job = None;
        record.record_failure(stage, message);
        record.touch();
        self.store.put(record)?;
        warn!("{} failed at stage '{stage}': {message}", record.id);
        Ok(())
    }

    fn index_endpoint(
        &self,
        record: &ResourceRecord,
        resolution: &Resolution,
    ) -> Result<SearchEndpoint, CoreError> {
        let server = resolution.get(DependencyRole::SearchServer);
        let host = resolution.host();
        match (server, host) {
            (Some(server), Some(host)) => {
                search_endpoint(server, host, self.config.search_api.port).ok_or_else(|| {
                    CoreError::NotReady {
                        resource: record.id.to_string(),
                        reason: format!(
                            "search server '{}' has no reachable host ({} has no public address)",
                            server.id, host.id
                        ),
                    }
                })
            }
            _ => Err(CoreError::NotReady {
                resource: record.id.to_string(),
                reason: "no search server resolved".to_owned(),
            }),
        }
    }

    /// Create a search index on its owning server.
    pub fn create_index(&self, id: &str) -> Result<(), CoreError> {
        info!("creating index {id}");
        let _lock = ResourceLock::acquire(&self.layout, id)?;
        let mut record = self.get_record(id)?;
        if record.kind() != ResourceKind::SearchIndex {
            return Err(CoreError::Validation(format!(
                "{} '{id}' is not a search index",
                record.kind()
            )));
        }
        if record.created {
            return Err(CoreError::AlreadyCreated(id.to_owned()));
        }
        validate_transition(id, record.kind(), record.status, ResourceStatus::Provisioning)?;

        let resolution = resolve(&self.store, &record)?;
        let endpoint = self.index_endpoint(&record, &resolution)?;
        require_active(id, &resolution)?;

        record.status = ResourceStatus::Provisioning;
        record.last_failure = None;
        record.touch();
        self.store.put(&record)?;

        let manager = IndexManager::new(self.search_api.as_ref());
        match manager.create(&mut record, &endpoint) {
            Ok(()) => {
                record.completed_stages = vec![CREATE_STAGE.to_owned()];
                self.activate(&mut record)
            }
            Err(e) => {
                self.fail(&mut record, CREATE_STAGE, &e.to_string())?;
                Err(e)
            }
        }
    }

    /// Delete a `Retiring` index from its server.
    pub fn delete_index(&self, id: &str) -> Result<ResourceRecord, CoreError> {
        info!("deleting index {id}");
        let _lock = ResourceLock::acquire(&self.layout, id)?;
        let mut record = self.get_record(id)?;
        if record.kind() != ResourceKind::SearchIndex {
            return Err(CoreError::Validation(format!(
                "{} '{id}' is not a search index",
                record.kind()
            )));
        }
        if !record.created {
            return Err(CoreError::NotCreated(id.to_owned()));
        }
        validate_transition(id, record.kind(), record.status, ResourceStatus::Deleted)?;

        let resolution = resolve(&self.store, &record)?;
        let endpoint = self.index_endpoint(&record, &resolution)?;
        IndexManager::new(self.search_api.as_ref()).delete(&mut record, &endpoint)?;
        self.store.put(&record)?;
        info!("index {id} deleted");
        Ok(record)
    }

    /// Move an active index to `Retiring`, or abandon a dispatched
    /// background stage.
    pub fn cancel(&self, id: &str) -> Result<ResourceRecord, CoreError> {
        info!("cancelling {id}");
        let _lock = ResourceLock::acquire(&self.layout, id)?;
        let mut record = self.get_record(id)?;
        let kind = record.kind();

        match record.status {
            ResourceStatus::Active if kind.supports_teardown() => {
                validate_transition(id, kind, record.status, ResourceStatus::Retiring)?;
                record.status = ResourceStatus::Retiring;
                record.touch();
                self.store.put(&record)?;
                info!("{id} is retiring");
            }
            ResourceStatus::Provisioning if record.pending_job.is_some() => {
                let stage = record
                    .pending_job
                    .as_ref()
                    .map(|job| job.stage.clone())
                    .unwrap_or_default();
                self.fail(&mut record, &stage, "cancelled")?;
            }
            from => {
                let to = if kind.supports_teardown() {
                    ResourceStatus::Retiring
                } else {
                    ResourceStatus::Failed
                };
                return Err(CoreError::InvalidTransition {
                    resource: id.to_owned(),
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }
        Ok(record)
    }

    /// Poll the pending background job of `id` once and finalize the
    /// resource if the job has finished.
    pub fn reconcile(&self, id: &str) -> Result<ResourceRecord, CoreError> {
        let _lock = ResourceLock::acquire(&self.layout, id)?;
        let mut record = self.get_record(id)?;
        let Some(job) = record.pending_job.clone() else {
            debug!("{id} has no pending job");
            if record.kind() == ResourceKind::SearchIndex {
                self.check_index_drift(&record);
            }
            return Ok(record);
        };

        let status = self.executor.status(&job)?;
        debug!("{id}: job {} is {status}", job.job_id);
        match status {
            JobStatus::Running => {}
            JobStatus::Successful => {
                if !record.stage_completed(&job.stage) {
                    record.completed_stages.push(job.stage.clone());
                }
                self.activate(&mut record)?;
            }
            JobStatus::Failed { rc } => {
                let tail = self.executor.output_tail(&job, OUTPUT_TAIL_LINES);
                let message = if tail.trim().is_empty() {
                    format!("exit code {rc}")
                } else {
                    format!("exit code {rc}: {}", tail.trim_end())
                };
                self.fail(&mut record, &job.stage, &message)?;
            }
        }
        Ok(record)
    }

    /// Ask the owning search server whether index `id` exists there.
    pub fn index_present(&self, id: &str) -> Result<bool, CoreError> {
        let record = self.get_record(id)?;
        if record.kind() != ResourceKind::SearchIndex {
            return Err(CoreError::Validation(format!(
                "{} '{id}' is not a search index",
                record.kind()
            )));
        }
        self.query_index(&record)
    }

    fn query_index(&self, record: &ResourceRecord) -> Result<bool, CoreError> {
        let resolution = resolve(&self.store, record)?;
        let endpoint = self.index_endpoint(record, &resolution)?;
        IndexManager::new(self.search_api.as_ref()).present(record, &endpoint)
    }

    /// Warn when the server disagrees with the record's `created` flag.
    fn check_index_drift(&self, record: &ResourceRecord) {
        match self.query_index(record) {
            Ok(present) if present == record.created => {}
            Ok(present) => warn!(
                "index {} is {} on its search server but recorded as {}",
                record.id,
                if present { "present" } else { "missing" },
                if record.created { "created" } else { "not created" },
            ),
            Err(e) => debug!("cannot check index {} on its server: {e}", record.id),
        }
    }

    /// Block until the pending job of `id` finishes, then reconcile.
    pub fn wait(&self, id: &str) -> Result<ResourceRecord, CoreError> {
        let record = self.get_record(id)?;
        if let Some(job) = &record.pending_job {
            info!("waiting for job {} of {id}", job.job_id);
            self.executor.wait(job)?;
        }
        self.reconcile(id)
    }
}

/// Whether `record` is an OAuth client registered for `redirect`.
fn registered_for(record: &ResourceRecord, redirect: &str) -> bool {
    matches!(&record.spec, ResourceSpec::OAuthClient(spec) if spec.default_redirect_uri == redirect)
}

fn generate_id(kind: ResourceKind) -> ResourceId {
    let suffix = Uuid::new_v4().simple().to_string();
    ResourceId::new(format!(
        "{}-{}",
        kind.as_str().replace('_', "-"),
        &suffix[..8]
    ))
}

/// First stage of the record's plan that has not completed.
fn next_stage_name(record: &ResourceRecord) -> String {
    if record.kind() == ResourceKind::SearchIndex {
        return CREATE_STAGE.to_owned();
    }
    stage_plan(record.kind())
        .iter()
        .find(|s| !record.stage_completed(s.name()))
        .map_or_else(|| "provision".to_owned(), |s| s.name().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_put_bootstrap_first() {
        for kind in [
            ResourceKind::VirtualMachine,
            ResourceKind::SearchServer,
            ResourceKind::DashboardServer,
        ] {
            let plan = stage_plan(kind);
            assert_eq!(plan[0], Stage::Bootstrap);
            assert_eq!(plan[0].mode(), ExecutionMode::Foreground);
        }
        assert!(stage_plan(ResourceKind::SearchIndex).is_empty());
        assert!(stage_plan(ResourceKind::OAuthClient).is_empty());
    }

    #[test]
    fn service_stages_run_in_background() {
        assert_eq!(
            stage_plan(ResourceKind::SearchServer),
            &[Stage::Bootstrap, Stage::SearchService]
        );
        assert_eq!(Stage::SearchService.mode(), ExecutionMode::Background);
        assert_eq!(Stage::DashboardService.to_string(), "dashboard-service");
    }

    #[test]
    fn stage_playbooks_come_from_config() {
        let playbooks = PlaybookConfig::default();
        assert_eq!(
            Stage::SearchService.playbook(&playbooks),
            Path::new("ansible/playbooks/quickwit.yml")
        );
        assert_eq!(
            Stage::DashboardService.playbook(&playbooks),
            Path::new("ansible/playbooks/grafana.yml")
        );
    }

    #[test]
    fn generated_ids_are_valid() {
        let id = generate_id(ResourceKind::VirtualMachine);
        assert!(id.starts_with("virtual-machine-"));
        assert_eq!(id.len(), "virtual-machine-".len() + 8);
        assert!(is_valid_identifier(&id));
    }
}
