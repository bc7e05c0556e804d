//! One configured listen directive, resolved to a socket address and tied
//! to its server's config context.

use std::net::SocketAddr;

use crate::config::schema::ListenDirective;
use crate::error::ComposeError;
use crate::module::ConfigContext;

/// Address family of a listen endpoint; grouping key alongside the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

/// One configured listen endpoint. Read-only after composition.
#[derive(Clone)]
pub struct ListenEndpoint {
    pub addr: SocketAddr,
    pub ctx: ConfigContext,
    /// A dedicated bind() was requested for this address.
    pub bind: bool,
    /// The address matches any local address for its family.
    pub wildcard: bool,
    /// Accept TLS from the first byte on this address.
    pub tls: bool,
    pub ipv6_only: bool,
}

impl ListenEndpoint {
    pub fn from_directive(
        directive: &ListenDirective,
        ctx: ConfigContext,
    ) -> Result<Self, ComposeError> {
        let addr: SocketAddr =
            directive
                .address
                .parse()
                .map_err(|e: std::net::AddrParseError| ComposeError::ListenAddress {
                    address: directive.address.clone(),
                    reason: e.to_string(),
                })?;

        Ok(Self {
            addr,
            ctx,
            bind: directive.bind,
            wildcard: addr.ip().is_unspecified(),
            tls: directive.tls,
            ipv6_only: directive.ipv6_only,
        })
    }

    pub fn family(&self) -> AddressFamily {
        if self.addr.is_ipv4() {
            AddressFamily::V4
        } else {
            AddressFamily::V6
        }
    }
}

impl std::fmt::Debug for ListenEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenEndpoint")
            .field("addr", &self.addr)
            .field("bind", &self.bind)
            .field("wildcard", &self.wildcard)
            .field("tls", &self.tls)
            .finish()
    }
}
