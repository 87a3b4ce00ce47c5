use crate::layout::StoreLayout;
use crate::{write_atomic, StoreError};
use logstack_schema::{
    is_valid_identifier, JobHandle, ResourceId, ResourceKind, ResourceSpec, ResourceStatus,
};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureRecord {
    pub stage: String,
    pub message: String,
    pub at: String,
}

/// Durable state of one declared resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub status: ResourceStatus,
    pub spec: ResourceSpec,
    pub created_at: String,
    pub updated_at: String,
    /// Stages finished in the current provisioning cycle, in run order.
    #[serde(default)]
    pub completed_stages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<FailureRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_job: Option<JobHandle>,
    /// Remote existence as last observed. Only indexes ever set it.
    #[serde(default)]
    pub created: bool,
    /// blake3 checksum over the record with this field unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl ResourceRecord {
    pub fn new(id: ResourceId, spec: ResourceSpec) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            status: ResourceStatus::Declared,
            spec,
            created_at: now.clone(),
            updated_at: now,
            completed_stages: Vec::new(),
            last_failure: None,
            pending_job: None,
            created: false,
            checksum: None,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    pub fn stage_completed(&self, stage: &str) -> bool {
        self.completed_stages.iter().any(|s| s == stage)
    }

    pub fn record_failure(&mut self, stage: &str, message: impl Into<String>) {
        self.last_failure = Some(FailureRecord {
            stage: stage.to_owned(),
            message: message.into(),
            at: chrono::Utc::now().to_rfc3339(),
        });
    }

    /// Compute the checksum over the record content (excluding the checksum field itself).
    fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let json = serde_json::to_string_pretty(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

pub struct ResourceStore {
    layout: StoreLayout,
}

impl ResourceStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    fn check_id(id: &str) -> Result<(), StoreError> {
        if is_valid_identifier(id) {
            Ok(())
        } else {
            Err(StoreError::InvalidId(id.to_owned()))
        }
    }

    pub fn put(&self, record: &ResourceRecord) -> Result<(), StoreError> {
        Self::check_id(&record.id)?;
        let dest = self.layout.resource_path(&record.id);

        let mut with_checksum = record.clone();
        with_checksum.checksum = Some(with_checksum.compute_checksum()?);
        let content = serde_json::to_string_pretty(&with_checksum)?;

        write_atomic(&self.layout.resources_dir(), &dest, content.as_bytes())
    }

    /// Persist a record that must not exist yet.
    pub fn insert_new(&self, record: &ResourceRecord) -> Result<(), StoreError> {
        if self.exists(&record.id) {
            return Err(StoreError::Duplicate(record.id.to_string()));
        }
        self.put(record)
    }

    pub fn get(&self, id: &str) -> Result<ResourceRecord, StoreError> {
        Self::check_id(id)?;
        let path = self.layout.resource_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        let content = fs::read_to_string(&path)?;
        let record: ResourceRecord = serde_json::from_str(&content)?;

        if let Some(ref expected) = record.checksum {
            let actual = record.compute_checksum()?;
            if actual != *expected {
                return Err(StoreError::IntegrityFailure {
                    id: id.to_owned(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(record)
    }

    pub fn exists(&self, id: &str) -> bool {
        is_valid_identifier(id) && self.layout.resource_path(id).exists()
    }

    pub fn update_status(&self, id: &str, status: ResourceStatus) -> Result<(), StoreError> {
        let mut record = self.get(id)?;
        record.status = status;
        record.touch();
        self.put(&record)
    }

    fn record_ids(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.layout.resources_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name_str = name.to_str().unwrap_or("");
            if let Some(id) = name_str.strip_suffix(".json") {
                if !id.starts_with('.') {
                    ids.push(id.to_owned());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// All readable records sorted by id. Corrupted entries are skipped.
    pub fn list(&self) -> Result<Vec<ResourceRecord>, StoreError> {
        let mut results = Vec::new();
        for id in self.record_ids()? {
            match self.get(&id) {
                Ok(record) => results.push(record),
                Err(e) => {
                    tracing::warn!("skipping corrupted resource record '{id}': {e}");
                }
            }
        }
        Ok(results)
    }

    /// Like `list()`, but returns per-entry `Result`s so `doctor` can report
    /// each broken record.
    #[allow(clippy::type_complexity)]
    pub fn list_with_errors(
        &self,
    ) -> Result<Vec<Result<ResourceRecord, (String, StoreError)>>, StoreError> {
        Ok(self
            .record_ids()?
            .into_iter()
            .map(|id| self.get(&id).map_err(|e| (id, e)))
            .collect())
    }
}
