//! Wire format of log documents pushed into a search index.
//!
//! Bodies are newline-delimited JSON, one container log line per record.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("line {line}: {source}")]
    InvalidRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: field '{field}' must not be empty")]
    EmptyField { line: usize, field: &'static str },
    #[error("ingest body contains no records")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogRecord {
    pub time: DateTime<FixedOffset>,
    pub tenant_id: String,
    pub container_id: String,
    pub container_name: String,
    pub stream: String,
    pub log: String,
}

impl LogRecord {
    fn check(&self, line: usize) -> Result<(), IngestError> {
        for (field, value) in [
            ("tenant_id", &self.tenant_id),
            ("container_id", &self.container_id),
        ] {
            if value.is_empty() {
                return Err(IngestError::EmptyField { line, field });
            }
        }
        Ok(())
    }
}

/// Parse an NDJSON body. Blank lines are skipped; line numbers are 1-based.
pub fn parse_ndjson(body: &str) -> Result<Vec<LogRecord>, IngestError> {
    let mut records = Vec::new();
    for (idx, raw) in body.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let record: LogRecord = serde_json::from_str(raw)
            .map_err(|source| IngestError::InvalidRecord { line, source })?;
        record.check(line)?;
        records.push(record);
    }
    if records.is_empty() {
        return Err(IngestError::Empty);
    }
    Ok(records)
}

pub fn to_ndjson(records: &[LogRecord]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for r in records {
        out.push_str(&serde_json::to_string(r)?);
        out.push('\n');
    }
    Ok(out)
}
