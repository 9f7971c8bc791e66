//! devgate-gateway library crate.
//!
//! This crate provides the gateway process that lets browser clients
//! discover LAN devices and interact with them without direct network
//! access to each device.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser (HTTP + WebSocket)
//!         ↕
//! [devgate-gateway]
//!   ├── domain/           Pure types: GatewayConfig
//!   ├── application/      Request-scoped services: proxy router, discovery registry
//!   └── infrastructure/
//!         ├── http/       Front door: routes, upgrade handling (axum)
//!         ├── relay/      Relay manager: one shared upstream per device
//!         ├── upstream/   Upstream WebSocket connection lifecycle
//!         └── discovery/  mDNS listener feeding the registry (mdns-sd)
//!         ↕
//! LAN devices (HTTP + WebSocket endpoints, mDNS announcements)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies (no I/O, no async, no frameworks).
//! - `application` depends on `domain`, `devgate-core`, and the outbound
//!   HTTP client; every call is scoped to a single request.
//! - `infrastructure` owns the long-lived endpoints: the listening HTTP
//!   server, the per-device upstream connections, and the mDNS browse.

/// Domain layer: pure configuration types (no I/O).
pub mod domain;

/// Application layer: proxy forwarding and the discovery registry.
pub mod application;

/// Infrastructure layer: HTTP front door, relay manager, upstream
/// connections, and mDNS listening.
pub mod infrastructure;
