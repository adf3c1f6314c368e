//! Domain types for the fetch guard.
//!
//! Configuration, the output payload, and the structured error type with its
//! stable error-code registry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Guard configuration.
///
/// All fields are optional; accessors resolve them against the `DEFAULT_*`
/// constants. The handshake budget of the verified connector is fixed and
/// deliberately not configurable (see [`HANDSHAKE_TIMEOUT`](crate::HANDSHAKE_TIMEOUT)).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GuardConfig {
    /// User-Agent string for the final retrieval.
    pub user_agent: Option<String>,

    /// Overall timeout for the final retrieval, in seconds. Default: 20.
    pub fetch_timeout_seconds: Option<u32>,

    /// Maximum payload size in bytes. Default: 10 MiB.
    pub max_download_bytes: Option<u64>,

    /// Accept `http` URLs and exempt loopback peers from classification.
    ///
    /// Exists so integration tests can drive the full pipeline against mock
    /// servers bound to 127.0.0.1. Must stay off in production.
    #[serde(default)]
    pub allow_insecure_overrides: bool,
}

impl GuardConfig {
    /// Default fetch timeout in seconds.
    pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u32 = 20;

    /// Default max payload bytes (10 MiB).
    pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 10 * 1024 * 1024;

    /// Default User-Agent.
    pub const DEFAULT_USER_AGENT: &'static str = "fetchguard/1.0";

    #[must_use]
    pub fn fetch_timeout_seconds(&self) -> u32 {
        self.fetch_timeout_seconds
            .unwrap_or(Self::DEFAULT_FETCH_TIMEOUT_SECONDS)
    }

    #[must_use]
    pub fn max_download_bytes(&self) -> u64 {
        self.max_download_bytes
            .unwrap_or(Self::DEFAULT_MAX_DOWNLOAD_BYTES)
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        self.user_agent
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(Self::DEFAULT_USER_AGENT)
    }
}

/// Successful result of a guarded fetch.
#[derive(Debug, Clone, Serialize)]
pub struct Payload {
    /// Response body bytes.
    pub body: Vec<u8>,

    /// Declared `Content-Type`, if the server sent one.
    pub content_type: Option<String>,

    /// Final HTTP status code.
    pub status: u16,
}

/// Guard error with structured details.
///
/// Carries a stable [`ErrorCode`], a human-readable message, a `retryable`
/// hint for callers, and optional key/value context.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GuardError {
    /// Stable error code.
    pub code: ErrorCode,

    /// Human-readable description.
    pub message: String,

    /// Whether a fresh call may succeed.
    pub retryable: bool,

    /// Error-specific context.
    pub details: ErrorDetails,
}

impl GuardError {
    pub fn new(code: ErrorCode, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            retryable,
            details: ErrorDetails::default(),
        }
    }

    /// Add a detail field.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.0.push((key.into(), value.into()));
        self
    }

    /// Serialize to JSON for caller-facing output.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "error": true,
            "code": self.code,
            "message": self.message,
            "retryable": self.retryable,
        });

        if !self.details.0.is_empty() {
            let details: serde_json::Map<String, serde_json::Value> = self
                .details
                .0
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            obj["details"] = serde_json::Value::Object(details);
        }

        obj
    }
}

impl Serialize for GuardError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

/// Ordered key/value context attached to an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorDetails(pub Vec<(String, String)>);

/// Stable error codes.
///
/// One per failure kind; every phase failure maps to exactly one of these and
/// is terminal for the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Input is not a well-formed URL.
    InvalidUrl,
    /// Scheme is not the accepted secure transport.
    DisallowedScheme,
    /// DNS lookup failed or returned no addresses.
    ResolutionError,
    /// At least one resolved address is private/reserved.
    PrivateAddressFirstPass,
    /// Raw connect did not complete within the time budget.
    HandshakeTimeout,
    /// Transport-level connect failed for a reason other than timeout.
    HandshakeError,
    /// The address actually connected to is private/reserved.
    PrivateAddressPostHandshake,
    /// The content fetch failed after a verified-safe handshake.
    FetchError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_resolve() {
        let config = GuardConfig::default();
        assert_eq!(config.fetch_timeout_seconds(), 20);
        assert_eq!(config.max_download_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.user_agent(), "fetchguard/1.0");
        assert!(!config.allow_insecure_overrides);
    }

    #[test]
    fn blank_user_agent_falls_back() {
        let config = GuardConfig {
            user_agent: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.user_agent(), GuardConfig::DEFAULT_USER_AGENT);
    }

    #[test]
    fn error_json_includes_details() {
        let err = GuardError::new(ErrorCode::FetchError, "status 503", true)
            .with_detail("status", "503");
        let json = err.to_json();
        assert_eq!(json["code"], "fetch_error");
        assert_eq!(json["retryable"], true);
        assert_eq!(json["details"]["status"], "503");
    }

    #[test]
    fn error_json_omits_empty_details() {
        let err = GuardError::new(ErrorCode::InvalidUrl, "bad url", false);
        assert!(err.to_json().get("details").is_none());
    }
}
