//! # devgate-core
//!
//! Shared library for the devgate LAN device gateway containing host
//! validation, discovery record assembly, and the browser-facing stream
//! message model.
//!
//! This crate is used by the gateway binary and by its integration tests.
//! It has zero dependencies on OS APIs, network sockets, or async runtimes.
//!
//! # Architecture overview
//!
//! Devgate is a single gateway process that sits between browsers and LAN
//! devices: browsers cannot join multicast groups or open raw sockets, so
//! the gateway discovers devices on their behalf, forwards whitelisted HTTP
//! requests to them, and multiplexes each device's control/log stream to
//! every interested browser session.
//!
//! This crate (`devgate-core`) is the shared foundation.  It defines:
//!
//! - **`host`** – The `ipv4:port` validator that gates every network call
//!   derived from client-supplied input.
//!
//! - **`record`** – Device records and the announcement fragments they are
//!   assembled from.  Discovery traffic arrives as unordered partial
//!   fragments; assembly is pure field-presence merging.
//!
//! - **`stream`** – The JSON message model devices push over their byte
//!   stream (status changes and log lines), plus the transport-neutral
//!   frame type the relay fans out.

// Declare the top-level modules.  Rust will look for each in a file with
// the same name (e.g., src/host.rs).
pub mod host;
pub mod record;
pub mod stream;

// Re-export the most-used items at the crate root so callers can write
// `devgate_core::is_valid_host` instead of `devgate_core::host::is_valid_host`.
pub use host::is_valid_host;
pub use record::{DeviceRecord, Fragment};
pub use stream::{Frame, StreamMessage};
