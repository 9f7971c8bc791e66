//! mDNS listening: turns service announcements into registry fragments.
//!
//! The gateway browses one fixed DNS-SD service type on all usable
//! interfaces.  `mdns-sd` delivers browse results as events; this module
//! decomposes them into the [`Fragment`] kinds the registry assembles, so
//! the assembly path is identical whether a device announces itself in one
//! resolved burst or in trickled partial records.
//!
//! Refresh is continuous: devices re-announce on their own schedule and the
//! service daemon re-queries the browse per the DNS-SD timetable, so every
//! re-announcement re-merges through [`DeviceRegistry::observe`].  Nothing
//! is ever evicted here — `ServiceRemoved` is noted and ignored, because
//! staleness is handled by liveness probing at read time.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use anyhow::Context;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use devgate_core::record::Fragment;

use crate::application::DeviceRegistry;

/// The service type devgate-capable devices advertise.
pub const SERVICE_TYPE: &str = "_devgate._tcp.local.";

/// Browses [`SERVICE_TYPE`] until cancelled, feeding every announcement
/// into `registry`.
///
/// # Errors
///
/// Returns an error if the mDNS daemon cannot start or the browse cannot
/// be registered (e.g. no multicast-capable interface).  Event-channel
/// failures after startup end the listener without failing the process.
pub async fn run_listener(
    registry: Arc<DeviceRegistry>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let daemon = ServiceDaemon::new().context("failed to start mDNS service daemon")?;
    let events = daemon
        .browse(SERVICE_TYPE)
        .with_context(|| format!("failed to browse {SERVICE_TYPE}"))?;

    info!("mDNS listener browsing {SERVICE_TYPE}");

    loop {
        tokio::select! {
            event = events.recv_async() => match event {
                Ok(event) => handle_event(&registry, event),
                Err(e) => {
                    warn!("mDNS event channel closed: {e}");
                    break;
                }
            },
            _ = cancel.cancelled() => {
                info!("mDNS listener shutting down");
                break;
            }
        }
    }

    let _ = daemon.shutdown();
    Ok(())
}

/// Maps one browse event onto registry fragments.
fn handle_event(registry: &DeviceRegistry, event: ServiceEvent) {
    match event {
        ServiceEvent::ServiceFound(_service_type, fullname) => {
            debug!("mDNS found '{fullname}'");
            registry.observe(Fragment::Announcement { name: fullname });
        }
        ServiceEvent::ServiceResolved(info) => {
            debug!("mDNS resolved '{}'", info.get_fullname());
            let addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
            let pairs: Vec<(String, String)> = info
                .get_properties()
                .iter()
                .map(|property| (property.key().to_string(), property.val_str().to_string()))
                .collect();
            for fragment in resolved_fragments(
                info.get_fullname(),
                info.get_hostname(),
                &addresses,
                info.get_port(),
                pairs,
            ) {
                registry.observe(fragment);
            }
        }
        ServiceEvent::ServiceRemoved(_service_type, fullname) => {
            // Record retained: the device just stops passing liveness.
            debug!("mDNS removed '{fullname}' (record retained)");
        }
        // Search lifecycle notifications and any future event kinds.
        other => {
            debug!("ignoring mDNS event: {other:?}");
        }
    }
}

/// Decomposes one resolved service into assembly fragments: address
/// resolution, service location, and the attribute set.
///
/// A service resolving without an IPv4 address yields no address fragment;
/// the record stays incomplete until one arrives.
fn resolved_fragments(
    name: &str,
    host: &str,
    addresses: &[IpAddr],
    port: u16,
    pairs: Vec<(String, String)>,
) -> Vec<Fragment> {
    let mut fragments = Vec::with_capacity(3);
    match first_ipv4(addresses) {
        Some(address) => fragments.push(Fragment::AddressResolution {
            name: name.to_string(),
            host: host.to_string(),
            address,
        }),
        None => debug!("resolved service '{name}' carries no IPv4 address"),
    }
    fragments.push(Fragment::ServiceLocation {
        name: name.to_string(),
        port,
    });
    fragments.push(Fragment::Attributes {
        name: name.to_string(),
        entries: attribute_entries(pairs),
    });
    fragments
}

/// Re-encodes key/value pairs as the `key=value` token form the assembly
/// parses; an empty value becomes a bare boolean-flag token.
fn attribute_entries(pairs: Vec<(String, String)>) -> Vec<String> {
    pairs
        .into_iter()
        .map(|(key, value)| {
            if value.is_empty() {
                key
            } else {
                format!("{key}={value}")
            }
        })
        .collect()
}

/// First IPv4 address in an announcement's address set.
fn first_ipv4(addresses: &[IpAddr]) -> Option<Ipv4Addr> {
    addresses.iter().find_map(|address| match address {
        IpAddr::V4(v4) => Some(*v4),
        IpAddr::V6(_) => None,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
