//! The discovery registry: assembled device records plus liveness-filtered
//! snapshots.
//!
//! The registry owns one table mapping advertised name → [`DeviceRecord`].
//! [`DeviceRegistry::observe`] merges announcement fragments into the table
//! (the mDNS listener calls it; tests call it directly).  Records are never
//! evicted: a device that stops responding fails its liveness probe and is
//! simply omitted from snapshots while remaining assemble-able.
//!
//! Snapshot probing fans out concurrently with a per-probe timeout so a
//! single hung device cannot delay or fail the rest, and an overall cycle
//! timeout bounds the whole snapshot.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::timeout;
use tracing::{debug, warn};

use devgate_core::record::{DeviceRecord, Fragment};

use crate::domain::GatewayConfig;

/// Device-side path probed to confirm a record is currently reachable.
const PROBE_PATH: &str = "ping";

/// Name-keyed table of device records with liveness-filtered reads.
pub struct DeviceRegistry {
    records: Mutex<HashMap<String, DeviceRecord>>,
    http: reqwest::Client,
    probe_timeout: Duration,
    snapshot_timeout: Duration,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
            probe_timeout: config.probe_timeout,
            snapshot_timeout: config.snapshot_timeout,
        }
    }

    /// Merges one announcement fragment, creating the record for its name
    /// on first sight.
    ///
    /// Fragment kinds the assembly does not model never reach this call;
    /// the mDNS listener drops them at the event boundary.
    pub fn observe(&self, fragment: Fragment) {
        let mut records = self.records_guard();
        let record = records
            .entry(fragment.name().to_string())
            .or_insert_with(|| DeviceRecord::new(fragment.name()));
        record.absorb(&fragment);
    }

    /// Returns a copy of the record for `name`, complete or not.
    pub fn record(&self, name: &str) -> Option<DeviceRecord> {
        self.records_guard().get(name).cloned()
    }

    /// Number of records in the table, including incomplete ones.
    pub fn len(&self) -> usize {
        self.records_guard().len()
    }

    /// `true` if no fragment has ever been observed.
    pub fn is_empty(&self) -> bool {
        self.records_guard().is_empty()
    }

    /// Returns every complete record that currently answers its liveness
    /// probe.
    ///
    /// Probes run concurrently; each gets `probe_timeout`, the whole cycle
    /// gets `snapshot_timeout`.  The call returns once every probe has
    /// settled (success, failure, or timeout).
    pub async fn snapshot(&self) -> Vec<DeviceRecord> {
        // Copy complete candidates out so no lock is held across probing.
        let candidates: Vec<DeviceRecord> = {
            let records = self.records_guard();
            records
                .values()
                .filter(|r| r.is_complete())
                .cloned()
                .collect()
        };

        let probes = candidates.into_iter().map(|record| async move {
            let alive = self.probe(&record).await;
            alive.then_some(record)
        });

        match timeout(self.snapshot_timeout, join_all(probes)).await {
            Ok(results) => results.into_iter().flatten().collect(),
            Err(_) => {
                warn!(
                    "discovery snapshot exceeded {:?}; reporting no devices",
                    self.snapshot_timeout
                );
                Vec::new()
            }
        }
    }

    /// One bounded liveness probe: any HTTP response within the timeout
    /// counts as alive (reachability, not health semantics).
    async fn probe(&self, record: &DeviceRecord) -> bool {
        // Callers only pass complete records; a partial one is never alive.
        let (Some(address), Some(port), Some(api_version)) =
            (record.address, record.port, record.api_version())
        else {
            return false;
        };

        let url = format!("http://{address}:{port}/v{api_version}/{PROBE_PATH}");
        match timeout(self.probe_timeout, self.http.get(&url).send()).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("liveness probe failed for '{}': {e}", record.name);
                false
            }
            Err(_) => {
                debug!(
                    "liveness probe for '{}' timed out after {:?}",
                    record.name, self.probe_timeout
                );
                false
            }
        }
    }

    /// Locks the record table, recovering from a poisoned lock.
    ///
    /// No critical section in this type can leave the table inconsistent,
    /// so a panic elsewhere while holding the lock is survivable.
    fn records_guard(&self) -> MutexGuard<'_, HashMap<String, DeviceRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
