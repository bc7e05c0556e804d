//! TLS module: per-server handshake policy and certificate material.
//!
//! The merge step loads PEM material into a ready `TlsAcceptor`. A listen
//! address marked for TLS whose server has no acceptor is deliberately not
//! a startup error; it is reported per connection at dispatch time.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;

use crate::config::schema::{ServerBlock, StarttlsMode};
use crate::error::ComposeError;
use crate::module::registry::{ConfSlot, Module};

pub const NAME: &str = "tls";

pub struct TlsModule;

/// Server-scope TLS config.
#[derive(Clone)]
pub struct TlsSrvConf {
    /// Handshake on every connection to this server.
    pub enabled: bool,
    /// STARTTLS availability for the bound protocol.
    pub starttls: StarttlsMode,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    /// Built from cert/key during merge; absent when no material is
    /// configured.
    pub acceptor: Option<TlsAcceptor>,
}

impl Module for TlsModule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn create_server_conf(&self, block: &ServerBlock) -> Option<ConfSlot> {
        let tls = block.tls.clone().unwrap_or_default();
        Some(Box::new(TlsSrvConf {
            enabled: tls.enabled,
            starttls: tls.starttls,
            cert_path: tls.cert_path.map(PathBuf::from),
            key_path: tls.key_path.map(PathBuf::from),
            acceptor: None,
        }))
    }

    fn merge_server_conf(
        &self,
        default: &dyn Any,
        conf: &mut dyn Any,
    ) -> Result<(), ComposeError> {
        let default = default
            .downcast_ref::<TlsSrvConf>()
            .ok_or_else(|| slot_mismatch())?;
        let conf = conf
            .downcast_mut::<TlsSrvConf>()
            .ok_or_else(|| slot_mismatch())?;

        if conf.cert_path.is_none() {
            conf.cert_path = default.cert_path.clone();
        }
        if conf.key_path.is_none() {
            conf.key_path = default.key_path.clone();
        }

        if let (Some(cert), Some(key)) = (&conf.cert_path, &conf.key_path) {
            conf.acceptor = Some(build_acceptor(cert, key)?);
        }

        Ok(())
    }
}

/// Load PEM cert chain and private key into a rustls acceptor.
fn build_acceptor(cert_path: &PathBuf, key_path: &PathBuf) -> Result<TlsAcceptor, ComposeError> {
    let cert_pem = std::fs::read(cert_path).map_err(|e| material_error(cert_path, e))?;
    let key_pem = std::fs::read(key_path).map_err(|e| material_error(key_path, e))?;

    let certs: Vec<_> = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| material_error(cert_path, e))?;
    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| material_error(key_path, e))?
        .ok_or_else(|| ComposeError::TlsMaterial {
            module: NAME,
            reason: format!("no private key found in {}", key_path.display()),
        })?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ComposeError::TlsMaterial {
            module: NAME,
            reason: e.to_string(),
        })?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn material_error(path: &PathBuf, err: impl std::fmt::Display) -> ComposeError {
    ComposeError::TlsMaterial {
        module: NAME,
        reason: format!("{}: {}", path.display(), err),
    }
}

fn slot_mismatch() -> ComposeError {
    ComposeError::Module {
        module: NAME,
        reason: "config slot holds an unexpected type".to_string(),
    }
}
