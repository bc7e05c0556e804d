//! Listener consolidation: minimal physical sockets for a set of
//! configured endpoints.
//!
//! # Responsibilities
//! - Group endpoints by (port, family); grouping ignores which server
//!   configured them
//! - Order each group: wildcard last, explicit binds first
//! - Decide which endpoints need their own socket and which collapse into
//!   a shared wildcard socket
//! - Build the per-socket address table used at accept time

use std::cmp::Ordering;
use std::net::SocketAddr;

use crate::listen::endpoint::{AddressFamily, ListenEndpoint};
use crate::listen::table::{AddressConfig, AddressTable, TableEntry};

/// All endpoints sharing (port, family). Built, sorted and consumed during
/// consolidation; not retained afterward.
struct PortGroup {
    port: u16,
    family: AddressFamily,
    addrs: Vec<ListenEndpoint>,
}

/// Blueprint for one physical listening socket.
pub struct ListenerSpec {
    pub addr: SocketAddr,
    pub ipv6_only: bool,
    pub table: AddressTable,
}

/// Consolidate configured endpoints into the minimal listener set.
pub fn consolidate(endpoints: Vec<ListenEndpoint>) -> Vec<ListenerSpec> {
    let mut specs = Vec::new();

    for mut group in group_by_port(endpoints) {
        group.addrs.sort_by(cmp_addrs);

        let mut len = group.addrs.len();
        let mut start = 0;

        // A wildcard in the group always gets its own socket and covers
        // every address without an explicit bind, so it is forced to bind
        // even when the configuration did not ask for it.
        let bind_wildcard = if group.addrs[len - 1].wildcard {
            group.addrs[len - 1].bind = true;
            true
        } else {
            false
        };

        let mut i = 0;

        while i < len {
            if bind_wildcard && !group.addrs[start + i].bind {
                i += 1;
                continue;
            }

            let naddrs = if i == len - 1 {
                // The wildcard (or sole remaining address) absorbs every
                // entry left in the window, including the ones skipped
                // above.
                len
            } else {
                i = 0;
                1
            };

            // The absorbing listener binds the last entry of the window
            // (the wildcard); a dedicated listener binds the front entry.
            let bound = if naddrs == len {
                &group.addrs[start + len - 1]
            } else {
                &group.addrs[start]
            };
            let socket_addr = bound.addr;

            let table = AddressTable::new(
                group.addrs[start..start + naddrs]
                    .iter()
                    .map(|e| TableEntry {
                        ip: e.addr.ip(),
                        conf: AddressConfig {
                            ctx: e.ctx.clone(),
                            tls: e.tls,
                            addr_text: e.addr.to_string(),
                        },
                    })
                    .collect(),
            );

            tracing::debug!(
                port = group.port,
                family = ?group.family,
                address = %socket_addr,
                addresses = table.len(),
                "physical listener planned"
            );

            specs.push(ListenerSpec {
                addr: socket_addr,
                ipv6_only: bound.ipv6_only,
                table,
            });

            start += 1;
            len -= 1;
        }
    }

    specs
}

/// Partition endpoints into port groups: every endpoint lands in exactly
/// one group, keyed by (port, family) regardless of configured server.
fn group_by_port(endpoints: Vec<ListenEndpoint>) -> Vec<PortGroup> {
    let mut groups: Vec<PortGroup> = Vec::new();

    for endpoint in endpoints {
        let port = endpoint.addr.port();
        let family = endpoint.family();

        match groups
            .iter_mut()
            .find(|g| g.port == port && g.family == family)
        {
            Some(group) => group.addrs.push(endpoint),
            None => groups.push(PortGroup {
                port,
                family,
                addrs: vec![endpoint],
            }),
        }
    }

    groups
}

/// Ordering within a port group: the wildcard is the last resort and is
/// shifted to the end; explicit bind()ed addresses are shifted to the
/// start; everything else keeps input order (stable sort, ties Equal).
fn cmp_addrs(a: &ListenEndpoint, b: &ListenEndpoint) -> Ordering {
    match (a.wildcard, b.wildcard) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }

    match (a.bind, b.bind) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
