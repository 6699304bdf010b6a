//! Transport Module
//!
//! The seam between the executor and the remote API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error, instrument};

use crate::client::Method;
use crate::config::TransportConfig;
use crate::error::TransportError;

// == Transport ==
/// Performs a single call against the remote API.
///
/// Implementations report non-success statuses and unparsable bodies as
/// errors carrying the status and raw response text; they never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError>;
}

// == HTTP Transport ==
/// JSON-over-HTTP transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "Creating HTTP transport");
        Self {
            client: Client::new(),
            base_url,
            api_token,
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.base_url.clone(), config.api_token.clone())
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

/// Flattens a JSON object into query pairs; strings are sent unquoted.
fn query_pairs(body: &Value) -> Vec<(String, String)> {
    match body {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Parses a successful body; an empty body is `null`.
fn parse_body(
    method: Method,
    endpoint: &str,
    status: u16,
    text: &str,
) -> Result<Value, TransportError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| {
        error!(endpoint, error = %e, "Unparsable response body");
        let message = format!("invalid JSON ({}): {}", e, text);
        TransportError::status(method, endpoint, status, message)
    })
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, body))]
    async fn call(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let url = self.url(endpoint);
        let mut request = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        };

        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = if method.is_read() {
                request.query(&query_pairs(body))
            } else {
                request.json(body)
            };
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Request failed to send");
            TransportError::network(method, endpoint, e.to_string())
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::status(method, endpoint, status.as_u16(), e.to_string()))?;

        if !status.is_success() {
            error!(status = %status, body = %text, "API returned error");
            return Err(TransportError::status(method, endpoint, status.as_u16(), text));
        }

        parse_body(method, endpoint, status.as_u16(), &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_joining() {
        let transport = HttpTransport::new("https://api.example.com/v1/", None);
        assert_eq!(
            transport.url("/projects/7"),
            "https://api.example.com/v1/projects/7"
        );
        assert_eq!(transport.url("issues"), "https://api.example.com/v1/issues");
    }

    #[test]
    fn test_query_pairs_from_object() {
        let pairs = query_pairs(&json!({"state": "open", "limit": 20}));
        assert_eq!(
            pairs,
            vec![
                ("limit".to_string(), "20".to_string()),
                ("state".to_string(), "open".to_string()),
            ]
        );
        assert!(query_pairs(&json!([1, 2])).is_empty());
    }

    #[test]
    fn test_parse_body_variants() {
        assert_eq!(parse_body(Method::Get, "/x", 204, "").unwrap(), Value::Null);
        assert_eq!(
            parse_body(Method::Get, "/x", 200, r#"{"id":1}"#).unwrap(),
            json!({"id": 1})
        );

        let err = parse_body(Method::Get, "/x", 200, "<html>oops").unwrap_err();
        assert_eq!(err.status, Some(200));
        assert!(err.message.contains("<html>oops"));
    }
}
