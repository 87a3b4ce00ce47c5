use crate::{ApiResponse, RemoteError, SearchAdminApi, SearchEndpoint};
use logstack_schema::SearchApiConfig;
use serde_json::Value;
use std::io::Read;
use std::time::Duration;

/// `ureq` client for the search engine's administrative API.
///
/// Expects:
/// - `POST   /api/v1/indexes`             create an index from a schema document
/// - `GET    /api/v1/indexes`             list index metadata
/// - `DELETE /api/v1/indexes/<index_id>/` delete an index
pub struct HttpSearchAdmin {
    agent: ureq::Agent,
}

impl HttpSearchAdmin {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
        }
    }

    pub fn from_config(config: &SearchApiConfig) -> Self {
        Self::new(Duration::from_secs(config.timeout_secs))
    }

    fn read_response(
        url: &str,
        resp: ureq::http::Response<ureq::Body>,
    ) -> Result<ApiResponse, RemoteError> {
        let status = resp.status().as_u16();
        let mut reader = resp.into_body().into_reader();
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| RemoteError::Http(format!("reading response from {url}: {e}")))?;
        let body = String::from_utf8_lossy(&body).into_owned();
        tracing::debug!("{url} -> HTTP {status} ({} bytes)", body.len());
        Ok(ApiResponse { status, body })
    }
}

impl SearchAdminApi for HttpSearchAdmin {
    fn create_index(
        &self,
        endpoint: &SearchEndpoint,
        schema: &Value,
    ) -> Result<ApiResponse, RemoteError> {
        let url = endpoint.indexes_url();
        let body =
            serde_json::to_vec(schema).map_err(|e| RemoteError::Serialization(e.to_string()))?;
        tracing::debug!("POST {url} ({} bytes)", body.len());
        let resp = self
            .agent
            .post(&url)
            .header("Content-Type", "application/json")
            .send(&body[..])
            .map_err(|e| RemoteError::Http(format!("POST {url}: {e}")))?;
        Self::read_response(&url, resp)
    }

    fn delete_index(
        &self,
        endpoint: &SearchEndpoint,
        index_id: &str,
    ) -> Result<ApiResponse, RemoteError> {
        let url = endpoint.index_url(index_id);
        tracing::debug!("DELETE {url}");
        let resp = self
            .agent
            .delete(&url)
            .call()
            .map_err(|e| RemoteError::Http(format!("DELETE {url}: {e}")))?;
        Self::read_response(&url, resp)
    }

    fn list_indexes(&self, endpoint: &SearchEndpoint) -> Result<ApiResponse, RemoteError> {
        let url = endpoint.indexes_url();
        tracing::debug!("GET {url}");
        let resp = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| RemoteError::Http(format!("GET {url}: {e}")))?;
        Self::read_response(&url, resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        method: String,
        path: String,
        content_type: Option<String>,
        body: Vec<u8>,
    }

    /// Answers every request with a fixed status and body.
    struct MockServer {
        port: u16,
        _handle: std::thread::JoinHandle<()>,
        requests: Arc<Mutex<Vec<CapturedRequest>>>,
    }

    impl MockServer {
        fn start(status: u16, reply: &str) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();
            let requests: Arc<Mutex<Vec<CapturedRequest>>> = Arc::new(Mutex::new(Vec::new()));
            let reply = reply.to_owned();

            let requests_clone = Arc::clone(&requests);
            let handle = std::thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(mut stream) = stream else { break };
                    let reqs = Arc::clone(&requests_clone);
                    let reply = reply.clone();

                    std::thread::spawn(move || {
                        let mut reader = BufReader::new(stream.try_clone().unwrap());
                        let mut request_line = String::new();
                        if reader.read_line(&mut request_line).is_err() {
                            return;
                        }
                        let parts: Vec<&str> = request_line.trim().splitn(3, ' ').collect();
                        if parts.len() < 2 {
                            return;
                        }

                        let mut content_length: usize = 0;
                        let mut content_type = None;
                        loop {
                            let mut line = String::new();
                            if reader.read_line(&mut line).is_err() || line.trim().is_empty() {
                                break;
                            }
                            if let Some((k, v)) = line.trim().split_once(": ") {
                                match k.to_lowercase().as_str() {
                                    "content-length" => {
                                        content_length = v.trim().parse().unwrap_or(0);
                                    }
                                    "content-type" => content_type = Some(v.to_owned()),
                                    _ => {}
                                }
                            }
                        }

                        let mut body = vec![0u8; content_length];
                        if content_length > 0 {
                            let _ = reader.read_exact(&mut body);
                        }
                        reqs.lock().unwrap().push(CapturedRequest {
                            method: parts[0].to_owned(),
                            path: parts[1].to_owned(),
                            content_type,
                            body,
                        });

                        let response = format!(
                            "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
                            reply.len()
                        );
                        let _ = stream.write_all(response.as_bytes());
                        let _ = stream.flush();
                    });
                }
            });

            MockServer {
                port,
                _handle: handle,
                requests,
            }
        }

        fn endpoint(&self) -> SearchEndpoint {
            SearchEndpoint::new("127.0.0.1", self.port)
        }

        fn captured_requests(&self) -> Vec<CapturedRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn client() -> HttpSearchAdmin {
        HttpSearchAdmin::new(Duration::from_secs(5))
    }

    #[test]
    fn create_posts_schema_as_json() {
        let server = MockServer::start(200, "{}");
        let schema = json!({"index_id": "logs", "version": "0.9"});
        let resp = client().create_index(&server.endpoint(), &schema).unwrap();
        assert!(resp.is_success());

        let reqs = server.captured_requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].method, "POST");
        assert_eq!(reqs[0].path, "/api/v1/indexes");
        assert_eq!(reqs[0].content_type.as_deref(), Some("application/json"));
        let sent: Value = serde_json::from_slice(&reqs[0].body).unwrap();
        assert_eq!(sent, schema);
    }

    #[test]
    fn rejection_returns_status_and_body() {
        let server = MockServer::start(500, "index `logs` already exists");
        let resp = client()
            .create_index(&server.endpoint(), &json!({"index_id": "logs"}))
            .unwrap();
        assert_eq!(resp.status, 500);
        assert_eq!(resp.body, "index `logs` already exists");
        assert!(!resp.is_success());
    }

    #[test]
    fn delete_targets_index_path() {
        let server = MockServer::start(200, "[]");
        let resp = client().delete_index(&server.endpoint(), "logs").unwrap();
        assert!(resp.is_success());
        let reqs = server.captured_requests();
        assert_eq!(reqs[0].method, "DELETE");
        assert_eq!(reqs[0].path, "/api/v1/indexes/logs/");
    }

    #[test]
    fn list_uses_get() {
        let server = MockServer::start(200, "[]");
        let resp = client().list_indexes(&server.endpoint()).unwrap();
        assert_eq!(resp.body, "[]");
        assert_eq!(server.captured_requests()[0].method, "GET");
    }

    #[test]
    fn connection_refused_is_an_error() {
        let result = client().create_index(
            &SearchEndpoint::new("127.0.0.1", 1),
            &json!({"index_id": "logs"}),
        );
        assert!(matches!(result, Err(RemoteError::Http(_))));
    }
}
