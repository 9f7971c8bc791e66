//! Devgate LAN device gateway — entry point.
//!
//! This binary gives browser-based clients access to LAN devices they
//! cannot reach themselves: it discovers devices via mDNS, forwards
//! whitelisted HTTP requests to a chosen device, and relays each device's
//! control/log stream to every interested browser session over a single
//! shared upstream connection.
//!
//! # Usage
//!
//! ```text
//! devgate-gateway [OPTIONS]
//!
//! Options:
//!   --http-port <PORT>           HTTP listener port [default: 6100]
//!   --http-bind <ADDR>           HTTP bind address [default: 0.0.0.0]
//!   --disable-mdns               Run without the mDNS listener
//!   --probe-timeout-ms <MS>      Per-device liveness probe budget [default: 500]
//!   --snapshot-timeout-ms <MS>   Whole-snapshot budget [default: 2000]
//!   --connect-timeout-secs <S>   Upstream stream connect budget [default: 5]
//!   --request-timeout-secs <S>   Forwarded request budget [default: 10]
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence when both are present.
//!
//! | Variable                       | Default   |
//! |--------------------------------|-----------|
//! | `DEVGATE_HTTP_PORT`            | `6100`    |
//! | `DEVGATE_HTTP_BIND`            | `0.0.0.0` |
//! | `DEVGATE_DISABLE_MDNS`         | unset     |
//! | `DEVGATE_PROBE_TIMEOUT_MS`     | `500`     |
//! | `DEVGATE_SNAPSHOT_TIMEOUT_MS`  | `2000`    |
//! | `DEVGATE_CONNECT_TIMEOUT_SECS` | `5`       |
//! | `DEVGATE_REQUEST_TIMEOUT_SECS` | `10`      |
//!
//! # Architecture overview
//!
//! ```text
//! Web Browser  (HTTP + WebSocket)
//!       ↕
//! devgate-gateway  ← this process
//!   domain/          GatewayConfig
//!   application/     proxy router, discovery registry
//!   infrastructure/
//!     http/          front door (axum)
//!     relay/         one shared upstream connection per device
//!     discovery/     mDNS browse (mdns-sd)
//!       ↕
//! LAN devices  (HTTP API + stream endpoint, mDNS announcements)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use devgate_gateway::application::{DeviceRegistry, ProxyRouter};
use devgate_gateway::domain::GatewayConfig;
use devgate_gateway::infrastructure::{discovery, router, AppState, RelayManager};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Devgate LAN device gateway.
///
/// Discovers LAN devices over mDNS and exposes them to browsers through a
/// single HTTP + WebSocket endpoint.
#[derive(Debug, Parser)]
#[command(
    name = "devgate-gateway",
    about = "LAN device gateway for browser clients: discovery, proxying, and log-stream relaying",
    version
)]
struct Cli {
    /// TCP port for the HTTP front door.
    #[arg(long, default_value_t = 6100, env = "DEVGATE_HTTP_PORT")]
    http_port: u16,

    /// IP address to bind the HTTP front door to.
    ///
    /// Use `0.0.0.0` to accept connections from any interface, or
    /// `127.0.0.1` to accept only local browsers.
    #[arg(long, default_value = "0.0.0.0", env = "DEVGATE_HTTP_BIND")]
    http_bind: String,

    /// Run without the mDNS listener.
    ///
    /// Useful in environments without multicast; proxying and stream
    /// relaying keep working for clients that know device addresses.
    #[arg(long, env = "DEVGATE_DISABLE_MDNS")]
    disable_mdns: bool,

    /// Per-device liveness probe budget in milliseconds.
    #[arg(long, default_value_t = 500, env = "DEVGATE_PROBE_TIMEOUT_MS")]
    probe_timeout_ms: u64,

    /// Overall budget for one discovery snapshot in milliseconds.
    #[arg(long, default_value_t = 2000, env = "DEVGATE_SNAPSHOT_TIMEOUT_MS")]
    snapshot_timeout_ms: u64,

    /// Budget for establishing one upstream stream connection, in seconds.
    #[arg(long, default_value_t = 5, env = "DEVGATE_CONNECT_TIMEOUT_SECS")]
    connect_timeout_secs: u64,

    /// Budget for one forwarded proxy request, in seconds.
    #[arg(long, default_value_t = 10, env = "DEVGATE_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: u64,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`GatewayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--http-bind` is not a valid IP address.
    fn into_gateway_config(self) -> anyhow::Result<GatewayConfig> {
        let http_bind_addr: SocketAddr = format!("{}:{}", self.http_bind, self.http_port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid HTTP bind address: '{}:{}'",
                    self.http_bind, self.http_port
                )
            })?;

        Ok(GatewayConfig {
            http_bind_addr,
            mdns_enabled: !self.disable_mdns,
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            snapshot_timeout: Duration::from_millis(self.snapshot_timeout_ms),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `EnvFilter::try_from_default_env()` reads the `RUST_LOG` environment
    // variable; absent or invalid, fall back to `info` level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.into_gateway_config()?;

    info!(
        "devgate gateway starting — http={}, mdns={}",
        config.http_bind_addr, config.mdns_enabled
    );

    let registry = Arc::new(DeviceRegistry::new(&config));
    let relay = Arc::new(RelayManager::new(&config));
    let proxy = Arc::new(ProxyRouter::new(&config));
    let state = AppState {
        registry: Arc::clone(&registry),
        relay,
        proxy,
    };

    // The mDNS listener runs for the whole process lifetime and is told to
    // stop through the same token that ends the HTTP server.
    let shutdown = CancellationToken::new();
    if config.mdns_enabled {
        let registry = Arc::clone(&registry);
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = discovery::run_listener(registry, cancel).await {
                // Discovery failing (no multicast interface, daemon error)
                // degrades the gateway, it does not stop it.
                error!("mDNS listener failed: {e:#}");
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(config.http_bind_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", config.http_bind_addr))?;

    info!("gateway listening on {}", config.http_bind_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("HTTP server error")?;

    info!("devgate gateway stopped");
    Ok(())
}

/// Resolves on Ctrl+C, cancelling `shutdown` so background tasks exit too.
async fn shutdown_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C — initiating graceful shutdown"),
        Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
    }
    shutdown.cancel();
}

// ── Tests ─────────────────────────────────────────────────────────────────────
