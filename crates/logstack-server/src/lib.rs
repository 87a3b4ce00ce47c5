//! Stand-in for the search engine's administrative API.
//!
//! Implements the subset of routes the orchestrator and the log shippers
//! talk to, so the full provisioning flow can be exercised locally:
//!
//! - `POST   /api/v1/indexes`            create an index from a schema document
//! - `GET    /api/v1/indexes`            list index metadata
//! - `DELETE /api/v1/indexes/{id}/`      delete an index and its documents
//! - `POST   /api/v1/{id}/ingest`        append NDJSON log records
//! - `GET    /health`
//!
//! Index configs live at `{data_dir}/indexes/{id}.json`, ingested documents
//! at `{data_dir}/docs/{id}.ndjson`.
//!
//! The [`TestServer`] helper starts a server on a random port for integration testing.

use logstack_schema::{parse_ndjson, to_ndjson, IndexSchema};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, error, info, warn};

pub type ServerError = Box<dyn std::error::Error + Send + Sync + 'static>;

struct IndexEntry {
    config: Value,
    num_docs: u64,
}

/// File-backed index catalog.
pub struct IndexStore {
    data_dir: PathBuf,
    /// Every mutation goes through this lock so create/delete/ingest on one
    /// index id are serialized.
    indexes: RwLock<BTreeMap<String, IndexEntry>>,
}

impl IndexStore {
    /// Open the catalog under `data_dir`, loading indexes a previous run left.
    pub fn open(data_dir: PathBuf) -> std::io::Result<Self> {
        let store = Self {
            data_dir,
            indexes: RwLock::new(BTreeMap::new()),
        };
        fs::create_dir_all(store.indexes_dir())?;
        fs::create_dir_all(store.docs_dir())?;

        let mut loaded = BTreeMap::new();
        for entry in fs::read_dir(store.indexes_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .ok()
                .and_then(|s| IndexSchema::parse_json(&s).ok());
            let Some(schema) = parsed else {
                warn!("skipping unreadable index config {}", path.display());
                continue;
            };
            let id = schema.index_id().to_owned();
            let num_docs = store.count_docs(&id);
            loaded.insert(
                id,
                IndexEntry {
                    config: schema.document().clone(),
                    num_docs,
                },
            );
        }
        if let Ok(mut indexes) = store.indexes.write() {
            *indexes = loaded;
        }
        Ok(store)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn indexes_dir(&self) -> PathBuf {
        self.data_dir.join("indexes")
    }

    fn docs_dir(&self) -> PathBuf {
        self.data_dir.join("docs")
    }

    fn config_path(&self, id: &str) -> PathBuf {
        self.indexes_dir().join(format!("{id}.json"))
    }

    fn docs_path(&self, id: &str) -> PathBuf {
        self.docs_dir().join(format!("{id}.ndjson"))
    }

    fn count_docs(&self, id: &str) -> u64 {
        fs::read_to_string(self.docs_path(id))
            .map(|s| s.lines().filter(|l| !l.trim().is_empty()).count() as u64)
            .unwrap_or(0)
    }

    pub fn create(&self, schema: &IndexSchema) -> Result<Value, ApiError> {
        let id = schema.index_id().to_owned();
        let mut indexes = self.indexes.write().map_err(|_| ApiError::poisoned())?;
        if indexes.contains_key(&id) {
            return Err(ApiError::new(400, format!("index `{id}` already exists")));
        }
        fs::write(self.config_path(&id), schema.to_json_pretty())
            .map_err(|e| ApiError::new(500, format!("write error: {e}")))?;
        let config = schema.document().clone();
        indexes.insert(
            id,
            IndexEntry {
                config: config.clone(),
                num_docs: 0,
            },
        );
        Ok(json!({ "index_config": config }))
    }

    pub fn list(&self) -> Result<Value, ApiError> {
        let indexes = self.indexes.read().map_err(|_| ApiError::poisoned())?;
        Ok(Value::Array(
            indexes
                .iter()
                .map(|(id, entry)| index_metadata(id, entry))
                .collect(),
        ))
    }

    pub fn delete(&self, id: &str) -> Result<Value, ApiError> {
        let mut indexes = self.indexes.write().map_err(|_| ApiError::poisoned())?;
        if indexes.remove(id).is_none() {
            return Err(ApiError::new(404, format!("index `{id}` not found")));
        }
        let mut removed = Vec::new();
        for path in [self.config_path(id), self.docs_path(id)] {
            match fs::remove_file(&path) {
                Ok(()) => removed.push(path.display().to_string()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("failed to remove {}: {e}", path.display()),
            }
        }
        Ok(json!(removed))
    }

    pub fn ingest(&self, id: &str, body: &str) -> Result<Value, ApiError> {
        let mut indexes = self.indexes.write().map_err(|_| ApiError::poisoned())?;
        let Some(entry) = indexes.get_mut(id) else {
            return Err(ApiError::new(404, format!("index `{id}` not found")));
        };
        let records = parse_ndjson(body).map_err(|e| ApiError::new(400, e.to_string()))?;
        let lines = to_ndjson(&records).map_err(|e| ApiError::new(500, e.to_string()))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.docs_path(id))
            .and_then(|mut f| f.write_all(lines.as_bytes()))
            .map_err(|e| ApiError::new(500, format!("write error: {e}")))?;
        entry.num_docs += records.len() as u64;
        Ok(json!({ "num_docs_for_processing": records.len() }))
    }

    pub fn num_docs(&self, id: &str) -> Option<u64> {
        self.indexes.read().ok()?.get(id).map(|e| e.num_docs)
    }
}

fn index_metadata(id: &str, entry: &IndexEntry) -> Value {
    json!({
        "index_id": id,
        "index_config": entry.config,
        "num_docs": entry.num_docs,
    })
}

/// Error answered to the client as `{"message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn poisoned() -> Self {
        Self::new(500, "index catalog lock poisoned")
    }
}

/// Routes this server knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    Indexes,
    Index(&'a str),
    Ingest(&'a str),
    Health,
}

/// Parse a request path (query string already stripped) into a [`Route`].
pub fn parse_route(path: &str) -> Option<Route<'_>> {
    if path == "/health" {
        return Some(Route::Health);
    }
    let rest = path.strip_prefix("/api/v1/")?;
    if rest == "indexes" || rest == "indexes/" {
        return Some(Route::Indexes);
    }
    if let Some(id) = rest.strip_prefix("indexes/") {
        let id = id.strip_suffix('/').unwrap_or(id);
        return (!id.is_empty() && !id.contains('/')).then_some(Route::Index(id));
    }
    let id = rest.strip_suffix("/ingest")?;
    (!id.is_empty() && !id.contains('/')).then_some(Route::Ingest(id))
}

fn json_header() -> Option<Header> {
    Header::from_bytes("Content-Type", "application/json").ok()
}

fn respond_json(req: tiny_http::Request, code: u16, body: &Value) {
    let mut response =
        Response::from_string(body.to_string()).with_status_code(StatusCode(code));
    if let Some(header) = json_header() {
        response = response.with_header(header);
    }
    let _ = req.respond(response);
}

fn respond_err(req: tiny_http::Request, err: &ApiError) {
    respond_json(req, err.status, &json!({ "message": err.message }));
}

fn respond_result(req: tiny_http::Request, result: Result<Value, ApiError>) {
    match result {
        Ok(body) => respond_json(req, 200, &body),
        Err(e) => respond_err(req, &e),
    }
}

fn read_body(req: &mut tiny_http::Request) -> Option<String> {
    let mut body = String::new();
    if req.as_reader().read_to_string(&mut body).is_ok() {
        Some(body)
    } else {
        None
    }
}

fn create_index(store: &IndexStore, body: &str) -> Result<Value, ApiError> {
    let schema = IndexSchema::parse_json(body)
        .map_err(|e| ApiError::new(400, format!("invalid index config: {e}")))?;
    let id = schema.index_id().to_owned();
    let result = store.create(&schema);
    match &result {
        Ok(_) => info!("created index {id}"),
        Err(e) => warn!("create index {id}: {}", e.message),
    }
    result
}

/// Handle a single HTTP request, dispatching to the appropriate route handler.
pub fn handle_request(store: &IndexStore, mut req: tiny_http::Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    let path = url.split('?').next().unwrap_or_default();
    debug!("{method} {url}");

    let Some(route) = parse_route(path) else {
        respond_err(req, &ApiError::new(404, format!("no route for {path}")));
        return;
    };

    match (route, &method) {
        (Route::Health, Method::Get) => respond_json(req, 200, &json!({ "status": "ok" })),
        (Route::Indexes, Method::Get) => respond_result(req, store.list()),
        (Route::Indexes, Method::Post) => {
            let Some(body) = read_body(&mut req) else {
                respond_err(req, &ApiError::new(400, "unreadable request body"));
                return;
            };
            respond_result(req, create_index(store, &body));
        }
        (Route::Index(id), Method::Delete) => {
            let result = store.delete(id);
            if result.is_ok() {
                info!("deleted index {id}");
            }
            respond_result(req, result);
        }
        (Route::Ingest(id), Method::Post) => {
            let Some(body) = read_body(&mut req) else {
                respond_err(req, &ApiError::new(400, "unreadable request body"));
                return;
            };
            let result = store.ingest(id, &body);
            if let Err(e) = &result {
                warn!("ingest into {id} rejected: {}", e.message);
            }
            respond_result(req, result);
        }
        _ => respond_err(req, &ApiError::new(405, "method not allowed")),
    }
}

/// Start the server loop, blocking the current thread.
pub fn run_server(store: &Arc<IndexStore>, addr: &str) -> Result<(), ServerError> {
    let server = Server::http(addr)?;
    for request in server.incoming_requests() {
        handle_request(store, request);
    }
    error!("server on {addr} stopped accepting requests");
    Ok(())
}

/// A test helper that starts a logstack-server on a random port in a background thread.
///
/// The server listens on `127.0.0.1:{port}` and stores data in the provided `data_dir`.
/// Drop the `TestServer` to stop the server (via `Server::unblock`).
pub struct TestServer {
    pub url: String,
    pub port: u16,
    pub data_dir: PathBuf,
    server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl TestServer {
    /// Binds to `127.0.0.1:0` (random port).
    pub fn start(data_dir: PathBuf) -> Result<Self, ServerError> {
        let store = Arc::new(IndexStore::open(data_dir.clone())?);
        let server = Arc::new(Server::http("127.0.0.1:0")?);
        let port = server
            .server_addr()
            .to_ip()
            .ok_or("test server is not bound to an IP address")?
            .port();
        let url = format!("http://127.0.0.1:{port}");

        let srv = Arc::clone(&server);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&store, request);
            }
        });

        Ok(Self {
            url,
            port,
            data_dir,
            server,
            _handle: handle,
        })
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}
