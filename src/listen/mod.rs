//! Listener consolidation subsystem.
//!
//! # Data Flow
//! ```text
//! ListenEndpoints (one per configured listen directive)
//!     → consolidate.rs (group by (port, family), sort, absorb wildcard)
//!     → ListenerSpec per physical socket + its address table
//!     → bind_all() (real sockets; failure is fatal to startup)
//!     → session::serve per physical listener
//! ```
//!
//! # Design Decisions
//! - Minimal socket count: one socket per explicit non-wildcard bind plus
//!   exactly one wildcard socket absorbing everything else when a
//!   wildcard exists in the group
//! - Address tables are family-agnostic: `IpAddr` carries the raw 4/16
//!   address bytes for both families through one code path
//! - Tables are immutable after consolidation and shared read-only by
//!   every accept task

pub mod consolidate;
pub mod endpoint;
pub mod table;

pub use consolidate::{consolidate, ListenerSpec};
pub use endpoint::ListenEndpoint;
pub use table::{AddressConfig, AddressTable};

use std::net::SocketAddr;
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;

use crate::error::StartupError;

/// One real listening socket with its accept-time address table.
pub struct PhysicalListener {
    pub inner: TcpListener,
    pub table: Arc<AddressTable>,
    pub local_addr: SocketAddr,
}

/// Bind a real socket for every listener spec. Any bind failure aborts
/// startup; a partially bound set is never served.
pub async fn bind_all(specs: Vec<ListenerSpec>) -> Result<Vec<PhysicalListener>, StartupError> {
    if specs.is_empty() {
        return Err(StartupError::NoListeners);
    }

    let mut listeners = Vec::with_capacity(specs.len());

    for spec in specs {
        let inner = open_socket(&spec)
            .and_then(TcpListener::from_std)
            .map_err(|source| StartupError::Bind {
                addr: spec.addr,
                source,
            })?;
        let local_addr = inner.local_addr().map_err(|source| StartupError::Bind {
            addr: spec.addr,
            source,
        })?;

        tracing::info!(
            address = %local_addr,
            addresses = spec.table.len(),
            ipv6_only = spec.ipv6_only,
            "listener bound"
        );

        listeners.push(PhysicalListener {
            inner,
            table: Arc::new(spec.table),
            local_addr,
        });
    }

    Ok(listeners)
}

/// Open, configure and bind the socket for one listener spec. Socket
/// options (IPV6_V6ONLY in particular) must be set before bind, so the
/// socket is built by hand rather than through `TcpListener::bind`.
fn open_socket(spec: &ListenerSpec) -> std::io::Result<std::net::TcpListener> {
    let domain = match spec.addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    if spec.ipv6_only && spec.addr.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;

    socket.bind(&spec.addr.into())?;
    socket.listen(511)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listen::table::{AddressConfig, AddressTable, TableEntry};
    use crate::module::context;

    fn spec(addr: &str, ipv6_only: bool) -> ListenerSpec {
        let addr: SocketAddr = addr.parse().unwrap();
        ListenerSpec {
            addr,
            ipv6_only,
            table: AddressTable::new(vec![TableEntry {
                ip: addr.ip(),
                conf: AddressConfig {
                    ctx: context::empty(),
                    tls: false,
                    addr_text: addr.to_string(),
                },
            }]),
        }
    }

    #[tokio::test]
    async fn v6_only_restricts_the_bound_socket() {
        let listeners = bind_all(vec![spec("[::1]:0", true)]).await.unwrap();
        let sock = socket2::SockRef::from(&listeners[0].inner);
        assert!(sock.only_v6().unwrap());
    }

    #[tokio::test]
    async fn no_specs_is_fatal() {
        assert!(matches!(
            bind_all(Vec::new()).await,
            Err(StartupError::NoListeners)
        ));
    }
}
