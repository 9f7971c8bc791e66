//! The relay manager: one shared upstream stream connection per device.
//!
//! Browsers cannot talk to devices directly, and a device's control/log
//! channel must not be opened once per browser tab.  The manager keeps, for
//! each distinct device (`host:port`), exactly one upstream WebSocket
//! connection and one group of interested browser sessions.  Inbound device
//! frames fan out to every open member of the group; the connection is torn
//! down only when the last member leaves.
//!
//! # State machine per relay key
//!
//! ```text
//! ABSENT ──open──▶ CONNECTING ──connected──▶ OPEN
//!    ▲                  │                      │
//!    │             dial failed            disconnect
//!    │                  ▼                      ▼
//!    └──────── entry cleared (group kept) ◀────┘
//!
//! close of last client in any state ──▶ CLOSING ──▶ ABSENT
//! ```
//!
//! `open` in `ABSENT` dials; in every other state it joins the existing
//! connection regardless of readiness — one upstream per host is shared by
//! all clients, frames are fanned out only while it is open, and nothing is
//! queued for clients while it reconnects.  A cleared connection entry (the
//! group outliving its connection) makes the next `open` re-dial.
//!
//! # Locking discipline
//!
//! All bookkeeping lives behind one `std::sync::Mutex`.  Every multi-step
//! update completes under a single lock acquisition with no `await` while
//! the guard is held, so an interleaved `open` and `close` for the same key
//! can never observe a half-applied transition.  Fan-out snapshots the
//! group under the lock and sends after releasing it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use devgate_core::stream::Frame;

use crate::domain::GatewayConfig;
use crate::infrastructure::upstream;

/// Identifies one browser-side stream session.
pub type ClientId = Uuid;

/// Channel on which a browser session receives fanned-out device frames.
///
/// A sender whose receiver has been dropped marks a session that is no
/// longer open; fan-out skips it without removing it.
pub type FanoutSender = mpsc::UnboundedSender<Frame>;

// ── Upstream handle ───────────────────────────────────────────────────────────

/// Shared handle to one upstream device connection.
///
/// The manager owns the connection; sessions holding a handle may only
/// send outbound frames through it and observe its readiness.  The handle
/// stays valid across the connection's whole lifecycle — sends while the
/// connection is not open are dropped by the pump task, not queued.
#[derive(Clone)]
pub struct UpstreamHandle {
    id: Uuid,
    outbound: mpsc::UnboundedSender<Frame>,
    ready: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl UpstreamHandle {
    /// Creates a handle and the receiving end of its outbound channel.
    fn channel() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id: Uuid::new_v4(),
            outbound,
            ready: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        };
        (handle, rx)
    }

    /// Identity of this connection attempt; a re-established connection
    /// gets a fresh identity.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// `true` while the WebSocket to the device is established.
    pub fn is_open(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Queues one browser→device frame.
    ///
    /// Returns `false` if the connection's pump task has already exited;
    /// the frame is dropped, which callers must tolerate.
    pub fn send(&self, frame: Frame) -> bool {
        self.outbound.send(frame).is_ok()
    }

    pub(crate) fn mark_open(&self) {
        self.ready.store(true, Ordering::Relaxed);
    }

    pub(crate) fn mark_closed(&self) {
        self.ready.store(false, Ordering::Relaxed);
    }

    /// Resolves when the manager has requested teardown.
    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

// ── Manager ───────────────────────────────────────────────────────────────────

/// Per-key bookkeeping: the (possibly absent) connection and its client
/// group.  The entry itself exists only while the group is non-empty.
#[derive(Default)]
struct RelayEntry {
    upstream: Option<UpstreamHandle>,
    clients: HashMap<ClientId, FanoutSender>,
}

/// Owner of all upstream connections and client groups, keyed by the
/// device's `host:port` string.
pub struct RelayManager {
    table: Mutex<HashMap<String, RelayEntry>>,
    connect_timeout: Duration,
}

impl RelayManager {
    /// Creates a manager with no connections.
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            connect_timeout: config.connect_timeout,
        }
    }

    /// Registers `client` for `host` and returns the shared upstream
    /// handle, dialing `ws://{host}/v{api_version}/ws` on first use.
    ///
    /// The returned handle may belong to a connection that is still
    /// connecting or already failing; it is reused rather than replaced,
    /// and the caller must tolerate dropped sends (see [`UpstreamHandle`]).
    ///
    /// Re-opening an already-registered client replaces its fan-out
    /// channel; a client is never in a group twice.
    pub fn open(
        self: &Arc<Self>,
        client: ClientId,
        sender: FanoutSender,
        host: &str,
        api_version: &str,
    ) -> UpstreamHandle {
        let (handle, spawn_args) = {
            let mut table = self.table_guard();
            let entry = table.entry(host.to_string()).or_default();
            entry.clients.insert(client, sender);

            match entry.upstream.clone() {
                Some(handle) => (handle, None),
                None => {
                    // Record the handle before anything yields so no second
                    // dial can start for this key.
                    let (handle, outbound_rx) = UpstreamHandle::channel();
                    entry.upstream = Some(handle.clone());
                    (handle, Some(outbound_rx))
                }
            }
        };

        if let Some(outbound_rx) = spawn_args {
            debug!(
                "relay {host}: client {client} triggers connection {}",
                handle.id()
            );
            tokio::spawn(upstream::run(
                Arc::clone(self),
                host.to_string(),
                api_version.to_string(),
                handle.clone(),
                outbound_rx,
                self.connect_timeout,
            ));
        } else {
            debug!("relay {host}: client {client} joins connection {}", handle.id());
        }

        handle
    }

    /// Removes `client` from the group for `host`; when the group becomes
    /// empty the upstream connection is cancelled and the key removed.
    ///
    /// Idempotent: an unknown host or an already-removed client is a
    /// no-op.  Always returns synchronously, even while the upstream is
    /// mid-teardown.
    pub fn close(&self, client: ClientId, host: &str) {
        let mut table = self.table_guard();
        let Some(entry) = table.get_mut(host) else {
            return;
        };
        entry.clients.remove(&client);
        if entry.clients.is_empty() {
            if let Some(entry) = table.remove(host) {
                debug!("relay {host}: last client {client} left; tearing down");
                if let Some(handle) = entry.upstream {
                    handle.cancel.cancel();
                }
            }
        }
    }

    /// Delivers one inbound device frame to every currently-open member of
    /// the group for `key`.
    ///
    /// Members whose receiver is gone are skipped, not removed — their
    /// sessions are responsible for closing themselves.
    pub(crate) fn fan_out(&self, key: &str, frame: Frame) {
        let members: Vec<FanoutSender> = {
            let table = self.table_guard();
            match table.get(key) {
                Some(entry) => entry.clients.values().cloned().collect(),
                None => return,
            }
        };
        for member in members {
            // A closed session's channel rejects the send; skip it.
            let _ = member.send(frame.clone());
        }
    }

    /// Clears the connection entry for `key` after its pump task exits,
    /// keeping the client group so the next `open` re-establishes.
    ///
    /// Guarded by connection identity: a newer connection recorded for the
    /// same key is left untouched.
    pub(crate) fn clear_connection(&self, key: &str, connection: Uuid) {
        let mut table = self.table_guard();
        if let Some(entry) = table.get_mut(key) {
            if entry.upstream.as_ref().is_some_and(|h| h.id() == connection) {
                entry.upstream = None;
                if entry.clients.is_empty() {
                    table.remove(key);
                }
            }
        }
    }

    /// Identity of the current connection for `host`, if any.
    pub fn connection_id(&self, host: &str) -> Option<Uuid> {
        self.table_guard()
            .get(host)
            .and_then(|entry| entry.upstream.as_ref().map(UpstreamHandle::id))
    }

    /// Number of clients registered for `host`.
    pub fn client_count(&self, host: &str) -> usize {
        self.table_guard()
            .get(host)
            .map_or(0, |entry| entry.clients.len())
    }

    /// Locks the relay table, recovering from a poisoned lock.
    ///
    /// Every critical section in this type leaves the table consistent, so
    /// a panic elsewhere while holding the lock is survivable.
    fn table_guard(&self) -> MutexGuard<'_, HashMap<String, RelayEntry>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
//
// These tests run on the current-thread runtime, so spawned dial tasks
// cannot run between consecutive synchronous manager calls; bookkeeping
// assertions made before the first `await` are deterministic.  Full network
// behavior is covered by tests/relay_integration.rs.
