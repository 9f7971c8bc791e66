//! One-shot forwarding of whitelisted HTTP requests to a device.
//!
//! The proxy router is stateless: validate the target host, check the
//! requested operation against a per-method whitelist, forward the request
//! verbatim, and relay the device's response (or a structured error) back.
//! Nothing is retried and nothing escapes this boundary as a transport
//! failure — callers always receive either a reply or a [`ProxyError`].
//!
//! # Whitelists
//!
//! | Method | Operations                      |
//! |--------|---------------------------------|
//! | GET    | `configuration`, `schema`       |
//! | POST   | `configuration`, `start`, `stop`|
//!
//! `schema` responses are opaque text; every other operation's response is
//! decoded and re-encoded as JSON.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use thiserror::Error;
use tracing::debug;

use devgate_core::host::is_valid_host;

use crate::domain::GatewayConfig;

/// Operations a browser may read from a device.
const GET_OPERATIONS: &[&str] = &["configuration", "schema"];

/// Operations a browser may invoke on a device.
const POST_OPERATIONS: &[&str] = &["configuration", "start", "stop"];

/// Operations whose responses are relayed as opaque text, not JSON.
const TEXT_OPERATIONS: &[&str] = &["schema"];

// ── Error type ────────────────────────────────────────────────────────────────

/// Failures the proxy router recovers locally and reports to the browser
/// as `{"error": "..."}` with the message embedding the offending value.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The target is not a literal `ipv4:port` pair.
    #[error("invalid device host: '{0}'")]
    InvalidHost(String),

    /// The operation is not in the whitelist for the request method.
    #[error("operation not permitted: '{0}'")]
    InvalidOperation(String),

    /// The path's version segment is not of the form `v{token}`.
    #[error("invalid api version segment: '{0}'")]
    InvalidApiVersion(String),

    /// The device did not answer (connect failure or timeout).
    #[error("device unreachable: {0}")]
    Unreachable(String),

    /// The device answered, but its body could not be relayed.
    #[error("invalid response body from {url}: {reason}")]
    UpstreamBody { url: String, reason: String },
}

// ── Reply type ────────────────────────────────────────────────────────────────

/// A successfully relayed device response.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyReply {
    /// Decoded-and-re-encoded JSON body.
    Json(serde_json::Value),
    /// Opaque text body (the `schema` operation).
    Text(String),
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Stateless forwarder for whitelisted device requests.
pub struct ProxyRouter {
    http: reqwest::Client,
    request_timeout: Duration,
}

impl ProxyRouter {
    /// Builds a router sharing one connection pool for all forwards.
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            request_timeout: config.request_timeout,
        }
    }

    /// Forwards one request to `http://{host}/v{api}/{operation}`.
    ///
    /// `version_segment` is the raw path segment (`"v1"`); the token after
    /// the `v` is treated as opaque.  `body` is forwarded verbatim with a
    /// JSON content type when present.
    ///
    /// # Errors
    ///
    /// Every failure mode maps to a [`ProxyError`]; validation errors are
    /// returned before any network call is made.
    pub async fn forward(
        &self,
        host: &str,
        version_segment: &str,
        operation: &str,
        method: Method,
        body: Option<String>,
    ) -> Result<ProxyReply, ProxyError> {
        if !is_valid_host(host) {
            return Err(ProxyError::InvalidHost(host.to_string()));
        }
        let api_version = parse_api_version(version_segment)?;
        check_operation(&method, operation)?;

        let url = format!("http://{host}/v{api_version}/{operation}");
        debug!("proxy {method} {url}");

        let mut request = self
            .http
            .request(method, &url)
            .timeout(self.request_timeout);
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|_| ProxyError::Unreachable(url.clone()))?;

        if TEXT_OPERATIONS.contains(&operation) {
            let text = response
                .text()
                .await
                .map_err(|e| ProxyError::UpstreamBody {
                    url,
                    reason: e.to_string(),
                })?;
            Ok(ProxyReply::Text(text))
        } else {
            let json = response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| ProxyError::UpstreamBody {
                    url,
                    reason: e.to_string(),
                })?;
            Ok(ProxyReply::Json(json))
        }
    }
}

/// Extracts the opaque API version token from a `v{token}` path segment.
pub fn parse_api_version(segment: &str) -> Result<&str, ProxyError> {
    match segment.strip_prefix('v') {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(ProxyError::InvalidApiVersion(segment.to_string())),
    }
}

/// Checks `operation` against the whitelist for `method`.
///
/// Runs before any network call: an unlisted operation must never reach a
/// device.
fn check_operation(method: &Method, operation: &str) -> Result<(), ProxyError> {
    let allowed: &[&str] = if *method == Method::GET {
        GET_OPERATIONS
    } else if *method == Method::POST {
        POST_OPERATIONS
    } else {
        &[]
    };
    if allowed.contains(&operation) {
        Ok(())
    } else {
        Err(ProxyError::InvalidOperation(operation.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Whitelist checks (no network involved) ────────────────────────────────

    #[test]
    fn test_get_whitelist_allows_configuration_and_schema() {
        assert!(check_operation(&Method::GET, "configuration").is_ok());
        assert!(check_operation(&Method::GET, "schema").is_ok());
    }

    #[test]
    fn test_post_whitelist_allows_lifecycle_operations() {
        assert!(check_operation(&Method::POST, "configuration").is_ok());
        assert!(check_operation(&Method::POST, "start").is_ok());
        assert!(check_operation(&Method::POST, "stop").is_ok());
    }

    #[test]
    fn test_get_whitelist_rejects_write_operations() {
        // start/stop are POST-only
        assert!(matches!(
            check_operation(&Method::GET, "start"),
            Err(ProxyError::InvalidOperation(op)) if op == "start"
        ));
    }

    #[test]
    fn test_unknown_operation_error_names_the_operation() {
        let err = check_operation(&Method::POST, "deleteEverything").unwrap_err();
        assert!(
            err.to_string().contains("deleteEverything"),
            "error must embed the offending operation: {err}"
        );
    }

    #[test]
    fn test_unlisted_methods_allow_nothing() {
        assert!(check_operation(&Method::DELETE, "configuration").is_err());
        assert!(check_operation(&Method::PUT, "configuration").is_err());
    }

    // ── Version segment parsing ───────────────────────────────────────────────

    #[test]
    fn test_version_segment_strips_leading_v() {
        assert_eq!(parse_api_version("v1").unwrap(), "1");
    }

    #[test]
    fn test_version_token_is_opaque() {
        // Anything after the v is passed through unparsed.
        assert_eq!(parse_api_version("v2.1-beta").unwrap(), "2.1-beta");
    }

    #[test]
    fn test_version_segment_without_v_is_rejected() {
        assert!(matches!(
            parse_api_version("1"),
            Err(ProxyError::InvalidApiVersion(s)) if s == "1"
        ));
    }

    #[test]
    fn test_bare_v_segment_is_rejected() {
        assert!(parse_api_version("v").is_err());
    }

    // ── forward() validation short-circuits ───────────────────────────────────

    #[tokio::test]
    async fn test_forward_rejects_invalid_host_before_any_network_call() {
        let router = ProxyRouter::new(&GatewayConfig::default());

        let err = router
            .forward("localhost:80", "v1", "configuration", Method::GET, None)
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::InvalidHost(_)));
        assert!(err.to_string().contains("localhost:80"));
    }

    #[tokio::test]
    async fn test_forward_rejects_unlisted_operation_for_valid_host() {
        let router = ProxyRouter::new(&GatewayConfig::default());

        // The host is shaped correctly, so rejection can only come from the
        // whitelist; no socket is opened for an unlisted operation.
        let err = router
            .forward(
                "127.0.0.1:6053",
                "v1",
                "deleteEverything",
                Method::POST,
                Some("{}".to_string()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::InvalidOperation(_)));
        assert!(err.to_string().contains("deleteEverything"));
    }

    #[tokio::test]
    async fn test_forward_rejects_malformed_version_segment() {
        let router = ProxyRouter::new(&GatewayConfig::default());

        let err = router
            .forward("127.0.0.1:6053", "1", "configuration", Method::GET, None)
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::InvalidApiVersion(_)));
    }
}
