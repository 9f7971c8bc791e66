//! Gateway configuration types.
//!
//! [`GatewayConfig`] is the single source of truth for all runtime settings.
//! It can be constructed from CLI arguments (preferred for production) or
//! from sensible defaults (useful for local development and tests).
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) keeps the gateway easy to embed in
//! tests; the binary entry point is responsible for populating the struct
//! from CLI args or environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// All runtime configuration for the gateway.
///
/// Build this struct once at startup and wrap it in an `Arc` so it can be
/// shared cheaply across request handlers and background tasks.
///
/// # Example
///
/// ```rust
/// use devgate_gateway::domain::GatewayConfig;
///
/// // Defaults are suitable for local development:
/// let cfg = GatewayConfig::default();
/// assert_eq!(cfg.http_bind_addr.port(), 6100);
/// ```
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// The address and port the HTTP front door binds to.
    ///
    /// `0.0.0.0` accepts connections from any interface; set `127.0.0.1`
    /// to accept only local browsers.
    pub http_bind_addr: SocketAddr,

    /// Whether the mDNS listener runs.
    ///
    /// Disabled in environments without multicast (containers, CI); the
    /// proxy and relay paths work without it as long as clients know
    /// device addresses.
    pub mdns_enabled: bool,

    /// Per-device budget for one liveness probe during a snapshot.
    pub probe_timeout: Duration,

    /// Overall budget for one discovery snapshot across all devices.
    pub snapshot_timeout: Duration,

    /// Budget for establishing one upstream stream connection.
    pub connect_timeout: Duration,

    /// Budget for one forwarded proxy request, connect included.
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    /// Returns a `GatewayConfig` suitable for local development without any
    /// external configuration.
    ///
    /// | Field            | Default        |
    /// |------------------|----------------|
    /// | http_bind_addr   | `0.0.0.0:6100` |
    /// | mdns_enabled     | `true`         |
    /// | probe_timeout    | 500 ms         |
    /// | snapshot_timeout | 2 seconds      |
    /// | connect_timeout  | 5 seconds      |
    /// | request_timeout  | 10 seconds     |
    fn default() -> Self {
        Self {
            // Safe: a compile-time-known valid socket address string.
            http_bind_addr: "0.0.0.0:6100".parse().unwrap(),
            mdns_enabled: true,
            probe_timeout: Duration::from_millis(500),
            snapshot_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
