//! Configuration schema definitions.
//!
//! This module defines the on-disk configuration structure for the front
//! end. All types derive Serde traits for deserialization from config
//! files. These structs are parse-time only: composition (`module::compose`)
//! turns them into the per-scope config contexts the runtime reads.

use serde::{Deserialize, Serialize};

/// Root configuration: a list of server blocks.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FileConfig {
    /// Server definitions, each with its own listen endpoints.
    #[serde(rename = "server")]
    pub servers: Vec<ServerBlock>,
}

/// One `[[server]]` block: a protocol scope with its listen endpoints.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerBlock {
    /// Protocol handler bound to this server (e.g. "echo").
    /// Unset fields inherit from the default server during merge.
    pub protocol: Option<String>,

    /// Session timeout in seconds; also bounds the TLS handshake.
    pub timeout_secs: Option<u64>,

    /// Listen endpoints for this server.
    pub listen: Vec<ListenDirective>,

    /// TLS settings for this server scope.
    pub tls: Option<TlsBlock>,
}

/// One configured listen endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenDirective {
    /// Socket address (e.g. "0.0.0.0:9025").
    pub address: String,

    /// Request a dedicated bind() for this address even when a wildcard
    /// on the same port would otherwise cover it.
    pub bind: bool,

    /// Accept TLS from the first byte on this address.
    pub tls: bool,

    /// Restrict a v6 wildcard socket to IPv6 only.
    pub ipv6_only: bool,
}

impl Default for ListenDirective {
    fn default() -> Self {
        Self {
            address: String::new(),
            bind: false,
            tls: false,
            ipv6_only: false,
        }
    }
}

/// TLS settings for a server scope.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TlsBlock {
    /// Handshake on every connection to this server, regardless of which
    /// listen address accepted it.
    pub enabled: bool,

    /// STARTTLS availability for protocols that support mid-session upgrade.
    pub starttls: StarttlsMode,

    /// Path to certificate chain file (PEM).
    pub cert_path: Option<String>,

    /// Path to private key file (PEM).
    pub key_path: Option<String>,
}

/// STARTTLS policy for a server scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StarttlsMode {
    /// Upgrade is not offered.
    #[default]
    Off,
    /// Upgrade is offered but plaintext commands are allowed.
    On,
    /// Plaintext commands are refused until the session upgrades.
    Only,
}
