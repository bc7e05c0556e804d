//! Accept-time lookup from local address to per-address configuration.

use std::net::IpAddr;

use crate::module::ConfigContext;

/// Configuration a connection is dispatched under once its local address
/// is known.
#[derive(Clone)]
pub struct AddressConfig {
    pub ctx: ConfigContext,
    /// Accept TLS from the first byte.
    pub tls: bool,
    /// Rendered address for logs ("server: ..." in the diagnostic chain).
    pub addr_text: String,
}

pub struct TableEntry {
    pub ip: IpAddr,
    pub conf: AddressConfig,
}

/// Ordered per-listener address table.
///
/// Invariants: with a single entry the listener is not shared and that
/// entry applies unconditionally; with several, the last entry is the
/// wildcard fallback and all earlier entries are matched exactly.
pub struct AddressTable {
    entries: Vec<TableEntry>,
}

impl AddressTable {
    pub fn new(entries: Vec<TableEntry>) -> Self {
        debug_assert!(!entries.is_empty());
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Several addresses share this socket, so accept needs a local
    /// address lookup.
    pub fn is_shared(&self) -> bool {
        self.entries.len() > 1
    }

    /// The unconditional config of an unshared listener.
    pub fn first(&self) -> &AddressConfig {
        &self.entries[0].conf
    }

    /// Resolve a shared listener's config by exact local-address match
    /// over all entries but the last; no match falls through to the last
    /// (wildcard) entry.
    pub fn resolve(&self, local: IpAddr) -> &AddressConfig {
        let last = self.entries.len() - 1;
        let mut i = 0;
        while i < last {
            if self.entries[i].ip == local {
                break;
            }
            i += 1;
        }
        &self.entries[i].conf
    }
}
