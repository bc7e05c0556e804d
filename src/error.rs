//! Error taxonomy for the front end.
//!
//! Two blast radii, nothing in between: startup errors abort the process
//! before any socket serves traffic, connection errors close exactly one
//! connection and surface only as log lines.

use std::net::SocketAddr;

/// Failure during module config composition. Fatal to startup: no partial
/// configuration is ever retained.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("module {module}: {reason}")]
    Module {
        module: &'static str,
        reason: String,
    },

    #[error("module {module}: unknown protocol {name:?}")]
    UnknownProtocol { module: &'static str, name: String },

    #[error("module {module}: failed to load TLS material: {reason}")]
    TlsMaterial {
        module: &'static str,
        reason: String,
    },

    #[error("invalid listen address {address:?}: {reason}")]
    ListenAddress { address: String, reason: String },
}

/// Startup-fatal errors: configuration composition and listener
/// materialization. Either one prevents the process from serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration composition failed: {0}")]
    Compose(#[from] ComposeError),

    #[error("no listen endpoints configured")]
    NoListeners,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// Errors contained to a single connection. Every variant closes that one
/// connection; none is retried and none propagates past it.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to query local address: {0}")]
    LocalAddr(std::io::Error),

    #[error("no certificate defined in server listening on TLS port")]
    NoTlsMaterial,

    #[error("TLS handshake failed: {0}")]
    Handshake(std::io::Error),

    #[error("TLS handshake timed out")]
    HandshakeTimeout,

    #[error("TLS shutdown failed: {0}")]
    TlsShutdown(std::io::Error),

    #[error("session init failed: {0}")]
    SessionInit(String),

    #[error("server configuration incomplete for this connection")]
    IncompleteConf,
}
