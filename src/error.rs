//! Error types for the experiment client.
//!
//! All failed requests funnel into a single shape: a [`Rejection`] capturing
//! the route, method, payload, status, and server-supplied error page, carried
//! inside [`Error::Rejected`]. The remaining variants cover client-side
//! failure domains (identity, capabilities, lifecycle).

use http::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A request completed with a failure. The full request context is
    /// captured so the failure can be rendered or reported server-side.
    #[error("{0}")]
    Rejected(Box<Rejection>),

    /// The browser fingerprinting capability is unavailable, typically due to
    /// an ad blocker. Terminal: the user must act outside the page and reload.
    #[error("fingerprinting capability unavailable (ad blocker interference)")]
    FingerprintUnavailable,

    /// An identity field required by the operation was never resolved.
    #[error("missing identity field `{0}`")]
    MissingIdentity(&'static str),

    /// The participant bootstrap was started while already running or after
    /// it resolved.
    #[error("participant bootstrap already started")]
    BootstrapBusy,

    /// A trial submission was issued while a previous one is still in flight.
    #[error("a trial submission is already in flight")]
    SubmissionInFlight,

    /// A response-dependent operation ran before any interaction node exists.
    #[error("no active node for this session")]
    NoActiveNode,

    /// The quorum channel closed before quorum was reached.
    #[error("quorum channel closed before quorum was reached")]
    QuorumChannelClosed,

    /// WebSocket-level failure on the push channel.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// The server replied with a body the protocol does not allow here.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid or unconstructible URL.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// The captured rejection, when this error is a failed request.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }

    /// True when this error is a rejection with the given HTTP status.
    pub fn is_status(&self, code: u16) -> bool {
        self.rejection()
            .and_then(|r| r.status)
            .is_some_and(|s| s.as_u16() == code)
    }
}

impl From<Rejection> for Error {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(Box::new(rejection))
    }
}

/// Context captured for a failed request.
///
/// Constructed exactly once per failure and never mutated afterwards. Holds
/// enough state to either render the server-supplied error page or resubmit
/// the failure as a report to the error-reporting route.
#[derive(Debug, Clone)]
pub struct Rejection {
    /// Route the request targeted, e.g. `/node/42`.
    pub route: String,
    /// HTTP method, uppercase.
    pub method: String,
    /// Payload the request carried. Empty object when there was none.
    pub data: serde_json::Map<String, Value>,
    /// HTTP status, when a response was received at all.
    pub status: Option<StatusCode>,
    /// Server-supplied error page HTML. Empty when the response body was not
    /// parseable as an error-page descriptor.
    pub html: String,
    /// Raw response body, for diagnostics.
    pub body: String,
}

impl Rejection {
    /// Capture a failure for which a response was received.
    pub fn from_response(
        route: impl Into<String>,
        method: impl Into<String>,
        data: Option<&serde_json::Map<String, Value>>,
        status: StatusCode,
        body: String,
    ) -> Self {
        let html = response_html(&body);
        Self {
            route: route.into(),
            method: method.into(),
            data: data.cloned().unwrap_or_default(),
            status: Some(status),
            html,
            body,
        }
    }

    /// Capture a failure before any response arrived (connect error, etc.).
    pub fn from_transport(
        route: impl Into<String>,
        method: impl Into<String>,
        data: Option<&serde_json::Map<String, Value>>,
        cause: String,
    ) -> Self {
        Self {
            route: route.into(),
            method: method.into(),
            data: data.cloned().unwrap_or_default(),
            status: None,
            html: String::new(),
            body: cause,
        }
    }

    /// Serialized form of the original request, suitable for the error
    /// report's `request_data` field.
    ///
    /// The payload is serialized to a JSON *string* inside the outer object;
    /// the error-reporting route expects this double-encoded shape.
    pub fn request_json(&self) -> String {
        let data = serde_json::to_string(&Value::Object(self.data.clone()))
            .unwrap_or_else(|_| "{}".to_string());
        serde_json::json!({
            "route": self.route,
            "data": data,
            "method": self.method,
        })
        .to_string()
    }

    /// Participant id carried by the failed request's payload, if any.
    pub fn participant_id(&self) -> Option<String> {
        match self.data.get("participant_id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// True when a response was received with the given status.
    pub fn is_status(&self, code: u16) -> bool {
        self.status.is_some_and(|s| s.as_u16() == code)
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "{} {} failed with status {}",
                self.method, self.route, status
            ),
            None => write!(
                f,
                "{} {} failed before a response was received: {}",
                self.method, self.route, self.body
            ),
        }
    }
}

/// Extract the `html` field from an error-page descriptor body.
///
/// Returns the empty string when the body is not JSON, or is JSON without a
/// string `html` field.
fn response_html(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(parsed) => parsed
            .get("html")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default(),
        Err(_) => {
            tracing::debug!("error response not parseable as an error-page descriptor");
            String::new()
        },
    }
}
