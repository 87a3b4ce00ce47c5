use std::fmt;

/// Base address of one search server's administrative API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEndpoint {
    pub host: String,
    pub port: u16,
}

impl SearchEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn indexes_url(&self) -> String {
        format!("{}/api/v1/indexes", self.base_url())
    }

    pub fn index_url(&self, index_id: &str) -> String {
        format!("{}/{index_id}/", self.indexes_url())
    }
}

impl fmt::Display for SearchEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
