use crate::bundle::vm_address;
use crate::lifecycle::validate_transition;
use crate::CoreError;
use logstack_remote::{SearchAdminApi, SearchEndpoint};
use logstack_schema::{ResourceSpec, ResourceStatus};
use logstack_store::ResourceRecord;
use serde_json::Value;
use tracing::{debug, info};

pub const CREATE_STAGE: &str = "create-index";
pub const DELETE_STAGE: &str = "delete-index";
const LIST_STAGE: &str = "list-indexes";

/// Admin API endpoint of `server`, reached through the public address of
/// `host_vm`. The port is the server's override, else `default_port`.
pub fn search_endpoint(
    server: &ResourceRecord,
    host_vm: &ResourceRecord,
    default_port: u16,
) -> Option<SearchEndpoint> {
    let ResourceSpec::SearchServer(spec) = &server.spec else {
        return None;
    };
    let address = vm_address(host_vm)?;
    Some(SearchEndpoint::new(
        address,
        spec.overrides.port.unwrap_or(default_port),
    ))
}

/// Creates and deletes index records on their owning search server.
///
/// Only the `created` flag and, for deletion, the terminal status are
/// touched here; persisting the record is the caller's job.
pub struct IndexManager<'a> {
    api: &'a dyn SearchAdminApi,
}

impl<'a> IndexManager<'a> {
    pub fn new(api: &'a dyn SearchAdminApi) -> Self {
        Self { api }
    }

    pub fn create(
        &self,
        record: &mut ResourceRecord,
        endpoint: &SearchEndpoint,
    ) -> Result<(), CoreError> {
        let ResourceSpec::SearchIndex(spec) = &record.spec else {
            return Err(CoreError::Validation(format!(
                "{} '{}' is not a search index",
                record.kind(),
                record.id
            )));
        };
        if record.created {
            return Err(CoreError::AlreadyCreated(record.id.to_string()));
        }

        info!("creating index {} on {endpoint}", spec.index_id());
        let resp = self
            .api
            .create_index(endpoint, spec.schema.document())
            .map_err(|e| CoreError::ExecutionFailure {
                resource: record.id.to_string(),
                stage: CREATE_STAGE.to_owned(),
                detail: e.to_string(),
            })?;

        if !resp.is_success() {
            return Err(CoreError::RemoteRejected {
                resource: record.id.to_string(),
                status: resp.status,
                body: resp.body,
            });
        }
        debug!("index {} created: {}", record.id, resp.body);
        record.created = true;
        Ok(())
    }

    /// Whether the server currently lists the index described by `record`.
    pub fn present(
        &self,
        record: &ResourceRecord,
        endpoint: &SearchEndpoint,
    ) -> Result<bool, CoreError> {
        let ResourceSpec::SearchIndex(spec) = &record.spec else {
            return Err(CoreError::Validation(format!(
                "{} '{}' is not a search index",
                record.kind(),
                record.id
            )));
        };
        let resp = self
            .api
            .list_indexes(endpoint)
            .map_err(|e| CoreError::ExecutionFailure {
                resource: record.id.to_string(),
                stage: LIST_STAGE.to_owned(),
                detail: e.to_string(),
            })?;
        if !resp.is_success() {
            return Err(CoreError::RemoteRejected {
                resource: record.id.to_string(),
                status: resp.status,
                body: resp.body,
            });
        }
        let listed: Value =
            serde_json::from_str(&resp.body).map_err(|e| CoreError::ExecutionFailure {
                resource: record.id.to_string(),
                stage: LIST_STAGE.to_owned(),
                detail: format!("unreadable index list: {e}"),
            })?;
        let wanted = spec.index_id();
        Ok(listed.as_array().is_some_and(|entries| {
            entries.iter().any(|entry| {
                entry["index_id"].as_str() == Some(wanted)
                    || entry["index_config"]["index_id"].as_str() == Some(wanted)
            })
        }))
    }

    /// Delete a `Retiring` index. On success the record is `Deleted` with
    /// `created` cleared; otherwise it is left untouched.
    pub fn delete(
        &self,
        record: &mut ResourceRecord,
        endpoint: &SearchEndpoint,
    ) -> Result<(), CoreError> {
        let ResourceSpec::SearchIndex(spec) = &record.spec else {
            return Err(CoreError::Validation(format!(
                "{} '{}' is not a search index",
                record.kind(),
                record.id
            )));
        };
        if !record.created {
            return Err(CoreError::NotCreated(record.id.to_string()));
        }
        validate_transition(
            &record.id,
            record.kind(),
            record.status,
            ResourceStatus::Deleted,
        )?;

        info!("deleting index {} on {endpoint}", spec.index_id());
        let resp = self
            .api
            .delete_index(endpoint, spec.index_id())
            .map_err(|e| CoreError::ExecutionFailure {
                resource: record.id.to_string(),
                stage: DELETE_STAGE.to_owned(),
                detail: e.to_string(),
            })?;

        if !resp.is_success() {
            return Err(CoreError::RemoteRejected {
                resource: record.id.to_string(),
                status: resp.status,
                body: resp.body,
            });
        }
        record.created = false;
        record.status = ResourceStatus::Deleted;
        record.touch();
        Ok(())
    }
}
