//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check listen addresses parse and are not duplicated
//! - Check referenced protocol handlers exist
//! - Validate value ranges (timeouts > 0) and TLS material pairing
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FileConfig → Result<(), Vec<ValidationError>>
//! - Runs before composition, so composition only sees well-formed input

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::FileConfig;
use crate::proto;

/// A single semantic validation failure.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("no server blocks configured")]
    NoServers,

    #[error("server {server}: no listen directives")]
    NoListen { server: usize },

    #[error("server {server}: invalid listen address {address:?}")]
    BadAddress { server: usize, address: String },

    #[error("listen address {address} configured more than once")]
    DuplicateAddress { address: SocketAddr },

    #[error("server {server}: unknown protocol {name:?}")]
    UnknownProtocol { server: usize, name: String },

    #[error("server {server}: timeout_secs must be greater than zero")]
    ZeroTimeout { server: usize },

    #[error("server {server}: TLS requires both cert_path and key_path")]
    PartialTlsMaterial { server: usize },
}

/// Validate a parsed configuration, collecting every error found.
pub fn validate_config(config: &FileConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.servers.is_empty() {
        errors.push(ValidationError::NoServers);
    }

    let mut seen = HashSet::new();

    for (i, server) in config.servers.iter().enumerate() {
        if server.listen.is_empty() {
            errors.push(ValidationError::NoListen { server: i });
        }

        for directive in &server.listen {
            match directive.address.parse::<SocketAddr>() {
                Ok(addr) => {
                    if !seen.insert(addr) {
                        errors.push(ValidationError::DuplicateAddress { address: addr });
                    }
                }
                Err(_) => errors.push(ValidationError::BadAddress {
                    server: i,
                    address: directive.address.clone(),
                }),
            }
        }

        if let Some(name) = &server.protocol {
            if proto::lookup(name).is_none() {
                errors.push(ValidationError::UnknownProtocol {
                    server: i,
                    name: name.clone(),
                });
            }
        }

        if server.timeout_secs == Some(0) {
            errors.push(ValidationError::ZeroTimeout { server: i });
        }

        if let Some(tls) = &server.tls {
            if tls.cert_path.is_some() != tls.key_path.is_some() {
                errors.push(ValidationError::PartialTlsMaterial { server: i });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
