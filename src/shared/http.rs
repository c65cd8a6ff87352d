//! HTTP request gateway.
//!
//! Every request resolves to exactly one of two outcomes: the parsed JSON
//! response on success, or a [`Rejection`] capturing the full request context
//! on failure. No retries happen here; retry policy, if any, belongs to the
//! caller. Transport-level failures (connect refused, unreadable body) fold
//! into the same rejection shape with no status, keeping the contract
//! uniform.

use std::time::Instant;

use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::error::{Rejection, Result};

/// Flat request payload: field name to JSON value. Sent form-encoded on POST
/// and as query parameters on GET; the server reads both the same way.
pub type Payload = serde_json::Map<String, Value>;

/// Gateway for requests against the experiment server.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    base: Url,
    client: reqwest::Client,
}

impl HttpGateway {
    /// Create a gateway for the given server base URL.
    pub fn new(base: Url) -> Self {
        Self {
            base,
            client: reqwest::Client::new(),
        }
    }

    /// The server base URL.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Perform a GET. `data`, when present, is sent as query parameters.
    pub async fn get(&self, route: &str, data: Option<&Payload>) -> Result<Value> {
        self.request(Method::GET, route, data).await
    }

    /// Perform a POST. `data`, when present, is sent form-encoded.
    pub async fn post(&self, route: &str, data: Option<&Payload>) -> Result<Value> {
        self.request(Method::POST, route, data).await
    }

    async fn request(&self, method: Method, route: &str, data: Option<&Payload>) -> Result<Value> {
        let url = self.base.join(route)?;
        let method_name = method.as_str().to_string();
        let started = Instant::now();

        let mut request = self.client.request(method.clone(), url);
        if let Some(payload) = data {
            let pairs = form_pairs(payload);
            request = if method == Method::GET {
                request.query(&pairs)
            } else {
                request.form(&pairs)
            };
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(method = %method_name, route, error = %err, "request failed in transport");
                return Err(
                    Rejection::from_transport(route, &method_name, data, err.to_string()).into(),
                );
            },
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !status.is_success() {
            tracing::warn!(method = %method_name, route, %status, elapsed_ms, "request rejected");
            return Err(Rejection::from_response(route, &method_name, data, status, body).into());
        }

        match serde_json::from_str(&body) {
            Ok(value) => {
                tracing::debug!(method = %method_name, route, %status, elapsed_ms, "request ok");
                Ok(value)
            },
            Err(err) => {
                // A success status with an unreadable body is still a failed
                // call from the caller's perspective.
                tracing::warn!(method = %method_name, route, %status, error = %err, "response body was not JSON");
                Err(Rejection::from_response(route, &method_name, data, status, body).into())
            },
        }
    }

    /// Submit a form-encoded POST, ignoring the response body. Used for the
    /// error report, whose route answers with a rendered page rather than
    /// JSON.
    pub async fn post_form(&self, route: &str, fields: &[(String, String)]) -> Result<()> {
        let url = self.base.join(route)?;

        let response = self
            .client
            .post(url)
            .form(fields)
            .send()
            .await
            .map_err(|err| Rejection::from_transport(route, "POST", None, err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(route, %status, "form submission rejected");
            return Err(Rejection::from_response(route, "POST", None, status, body).into());
        }

        tracing::debug!(route, %status, "form submitted");
        Ok(())
    }
}

/// Flatten a payload into form pairs. Non-string scalars are stringified the
/// way they would appear in a form field.
fn form_pairs(payload: &Payload) -> Vec<(String, String)> {
    payload
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}
