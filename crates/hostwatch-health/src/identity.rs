//! Host identity: the cache key a host's verdict lives under.
//!
//! The key is derived from the hardware address of the first readable
//! interface among an ordered candidate list. The check loop and the HTTP
//! reader must share one [`IdentityResolver`] (same candidates, same order),
//! otherwise they end up on different keys.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

/// Prefix of every host key.
pub const KEY_PREFIX: &str = "system_health_status:";

/// Key used when no candidate interface yields an address.
pub const UNKNOWN_KEY: &str = "system_health_status:unknown";

/// Hardware address of one interface, `None` when absent or unreadable.
type AddressLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Resolves the host key from interface hardware addresses.
#[derive(Clone)]
pub struct IdentityResolver {
    lookup: Arc<AddressLookup>,
    interfaces: Vec<String>,
}

impl fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("interfaces", &self.interfaces)
            .finish_non_exhaustive()
    }
}

impl IdentityResolver {
    /// Resolver asking the operating system for each interface's address.
    pub fn new(interfaces: Vec<String>) -> Self {
        Self::with_lookup(system_address, interfaces)
    }

    /// Resolver backed by another address source (fixed tables in tests).
    pub fn with_lookup<F>(lookup: F, interfaces: Vec<String>) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Arc::new(lookup),
            interfaces,
        }
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Resolve the key. Never fails: unreadable interfaces are skipped.
    pub fn resolve(&self) -> String {
        resolve_host_key(self.lookup.as_ref(), &self.interfaces)
    }
}

/// Lowercase colon-separated address, matching the kernel's own notation.
fn system_address(iface: &str) -> Option<String> {
    match mac_address::mac_address_by_name(iface) {
        Ok(Some(mac)) => Some(mac.to_string().to_lowercase()),
        Ok(None) => {
            debug!(%iface, "no hardware address for interface");
            None
        }
        Err(e) => {
            debug!(%iface, error = %e, "interface not readable");
            None
        }
    }
}

/// First non-empty address wins; otherwise [`UNKNOWN_KEY`].
pub fn resolve_host_key(lookup: &AddressLookup, candidates: &[String]) -> String {
    for iface in candidates {
        let Some(raw) = lookup(iface) else {
            continue;
        };
        let mac = raw.trim();
        if !mac.is_empty() {
            return format!("{KEY_PREFIX}{mac}");
        }
        debug!(%iface, "interface has empty hardware address");
    }
    UNKNOWN_KEY.to_string()
}
