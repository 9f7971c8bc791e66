//! Device records and the announcement fragments they are assembled from.
//!
//! Discovery traffic on the local network is fragmentary: a device's name,
//! resolved address, service port, and attribute set arrive as separate
//! announcements, in any order, possibly repeated.  Rather than a "done"
//! flag, completeness is derived from field presence: a record is usable
//! once its address, port, and advertised API version are all known.
//!
//! Records are keyed by advertised name and are never deleted; a device
//! that falls off the network simply stops passing the gateway's liveness
//! probe and is omitted from snapshots.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Attribute key that must be present before a record is exposed to clients.
pub const API_VERSION_PROPERTY: &str = "api_version";

// ── Announcement fragments ────────────────────────────────────────────────────

/// One partial announcement observed on the local network.
///
/// Fragments for the same device are correlated by advertised `name`.
/// Kinds map to the DNS-SD record types a browse produces: a pointer to an
/// instance name, the hostname-to-address resolution, the service location
/// (port), and the free-form attribute set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// A previously-unseen (or re-announced) instance name.
    Announcement {
        /// Advertised instance name.
        name: String,
    },

    /// The advertised target hostname and its resolved IPv4 address.
    AddressResolution {
        name: String,
        /// Advertised target hostname (e.g. `lamp.local.`).
        host: String,
        /// Resolved IPv4 address.
        address: Ipv4Addr,
    },

    /// The service port the device listens on.
    ServiceLocation {
        name: String,
        port: u16,
    },

    /// Free-form `key=value` attribute tokens.
    ///
    /// A token without `=` is a boolean-true flag.
    Attributes {
        name: String,
        entries: Vec<String>,
    },
}

impl Fragment {
    /// The advertised name this fragment belongs to.
    pub fn name(&self) -> &str {
        match self {
            Fragment::Announcement { name }
            | Fragment::AddressResolution { name, .. }
            | Fragment::ServiceLocation { name, .. }
            | Fragment::Attributes { name, .. } => name,
        }
    }
}

/// Splits one attribute token into a key/value pair.
///
/// `"version=1.2"` becomes `("version", "1.2")`; a bare `"ota"` token is a
/// boolean-true flag and becomes `("ota", "true")`.
pub fn parse_attribute(token: &str) -> (String, String) {
    match token.split_once('=') {
        Some((key, value)) => (key.to_string(), value.to_string()),
        None => (token.to_string(), "true".to_string()),
    }
}

// ── Device records ────────────────────────────────────────────────────────────

/// Assembled discovery metadata for one device.
///
/// Built incrementally by [`DeviceRecord::absorb`]; fields stay `None` (or
/// empty) until the corresponding fragment kind has been observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Advertised instance name (the assembly key).
    pub name: String,
    /// Advertised target hostname, empty until address resolution arrives.
    pub host: String,
    /// Resolved IPv4 address.
    pub address: Option<Ipv4Addr>,
    /// Service port.
    pub port: Option<u16>,
    /// Attribute set (`version`, `api_version`, and any device-specific keys).
    pub properties: HashMap<String, String>,
}

impl DeviceRecord {
    /// Creates an empty record for a newly-announced name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: String::new(),
            address: None,
            port: None,
            properties: HashMap::new(),
        }
    }

    /// Merges one fragment into this record.
    ///
    /// Later fragments of the same kind overwrite earlier ones, which is how
    /// periodic re-announcements keep a record current.  Fragments carrying
    /// a different advertised name are ignored.
    pub fn absorb(&mut self, fragment: &Fragment) {
        if fragment.name() != self.name {
            return;
        }
        match fragment {
            Fragment::Announcement { .. } => {}
            Fragment::AddressResolution { host, address, .. } => {
                self.host = host.clone();
                self.address = Some(*address);
            }
            Fragment::ServiceLocation { port, .. } => {
                self.port = Some(*port);
            }
            Fragment::Attributes { entries, .. } => {
                for token in entries {
                    let (key, value) = parse_attribute(token);
                    self.properties.insert(key, value);
                }
            }
        }
    }

    /// `true` once address, port, and the advertised API version are known.
    pub fn is_complete(&self) -> bool {
        self.address.is_some() && self.port.is_some() && self.api_version().is_some()
    }

    /// The advertised API version, if the attribute set carried one.
    pub fn api_version(&self) -> Option<&str> {
        self.properties.get(API_VERSION_PROPERTY).map(String::as_str)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
