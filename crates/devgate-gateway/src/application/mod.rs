//! Application layer: request-scoped services.
//!
//! Everything here is invoked once per inbound request and holds no
//! per-connection state: the proxy router forwards a single HTTP request,
//! and the registry answers a single snapshot query (its record table is
//! shared state, but every operation on it completes within one call).

pub mod proxy;
pub mod registry;

pub use proxy::{ProxyError, ProxyReply, ProxyRouter};
pub use registry::DeviceRegistry;
