//! Offline-first client for the record endpoints.
//!
//! A store keeps the last-known-good records of one module in a local
//! bucket, applies writes optimistically and reports what happened to each
//! write as a typed [`WriteOutcome`].

mod proving;
mod store;

pub use proving::ProvingStore;
pub use store::{RecordStore, SyncReport};

use std::time::Duration;

use serde_json::Value;

use crate::endpoint::WriteResponse;
use crate::error::{Result, TaqueroError};

/// Status and JSON body of an HTTP exchange
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Value,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Wire access to an endpoint. Non-2xx statuses are replies, not errors;
/// `Err` means the request never produced a readable reply.
pub trait Transport {
    fn get(&self, url: &str) -> Result<HttpReply>;
    fn post(&self, url: &str, body: &Value) -> Result<HttpReply>;
}

/// What happened to a write that did not fail outright
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The endpoint accepted the write
    Saved { message: Option<String> },
    /// The endpoint could not be reached; the write waits in the outbox
    Queued { seq: i64 },
}

/// Blocking HTTP transport
pub struct HttpTransport {
    agent: ureq::Agent,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(timeout: Duration, api_key: Option<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();

        Self {
            agent: ureq::Agent::new_with_config(config),
            api_key,
        }
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<HttpReply> {
        let mut request = self.agent.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .call()
            .map_err(|e| TaqueroError::Transport(format!("GET {} failed: {}", url, e)))?;
        let status = response.status().as_u16();
        let body = response
            .into_body()
            .read_json::<Value>()
            .map_err(|e| TaqueroError::Transport(format!("unreadable reply from {}: {}", url, e)))?;

        Ok(HttpReply { status, body })
    }

    fn post(&self, url: &str, body: &Value) -> Result<HttpReply> {
        let mut request = self.agent.post(url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send_json(body)
            .map_err(|e| TaqueroError::Transport(format!("POST {} failed: {}", url, e)))?;
        let status = response.status().as_u16();
        let body = response
            .into_body()
            .read_json::<Value>()
            .map_err(|e| TaqueroError::Transport(format!("unreadable reply from {}: {}", url, e)))?;

        Ok(HttpReply { status, body })
    }
}

/// How a write attempt ended, as seen from the client
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Delivery {
    Accepted(Option<String>),
    /// Worth retrying later: unreachable endpoint or server-side failure
    Retry(String),
    /// The endpoint refused the write; retrying the same body will not help
    Rejected(String),
}

pub(crate) fn classify(result: Result<HttpReply>) -> Delivery {
    let reply = match result {
        Ok(reply) => reply,
        Err(e) => return Delivery::Retry(e.to_string()),
    };

    let parsed: Option<WriteResponse> = serde_json::from_value(reply.body.clone()).ok();

    if reply.status >= 500 {
        let reason = parsed
            .and_then(|r| r.error)
            .unwrap_or_else(|| format!("HTTP {}", reply.status));
        return Delivery::Retry(reason);
    }

    match parsed {
        Some(response) if reply.is_success() && response.success => {
            Delivery::Accepted(response.message)
        }
        Some(response) => Delivery::Rejected(
            response
                .error
                .unwrap_or_else(|| format!("HTTP {}", reply.status)),
        ),
        None => Delivery::Rejected(format!("HTTP {} with unexpected body", reply.status)),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_accepted() {
        let reply = HttpReply {
            status: 200,
            body: json!({"success": true, "message": "Created a1"}),
        };
        assert_eq!(
            classify(Ok(reply)),
            Delivery::Accepted(Some("Created a1".to_string()))
        );
    }

    #[test]
    fn test_classify_validation_failure_is_rejected() {
        let reply = HttpReply {
            status: 400,
            body: json!({"success": false, "error": "Missing required fields: unit"}),
        };
        assert_eq!(
            classify(Ok(reply)),
            Delivery::Rejected("Missing required fields: unit".to_string())
        );
    }

    #[test]
    fn test_classify_server_failure_and_network_retry() {
        let reply = HttpReply {
            status: 503,
            body: json!({"success": false, "error": "busy"}),
        };
        assert_eq!(classify(Ok(reply)), Delivery::Retry("busy".to_string()));

        let err = Err(TaqueroError::Transport("connection refused".to_string()));
        assert!(matches!(classify(err), Delivery::Retry(_)));
    }
}
