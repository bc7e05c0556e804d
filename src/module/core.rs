//! Core module: protocol binding and session timeout per server scope.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::{FileConfig, ServerBlock};
use crate::error::ComposeError;
use crate::module::registry::{ConfSlot, Module};
use crate::proto::{self, Protocol};

pub const NAME: &str = "core";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_PROTOCOL: &str = "echo";

pub struct CoreModule;

/// Global-scope config for the core module.
#[derive(Debug)]
pub struct CoreMainConf {
    /// Number of server blocks in the configuration run.
    pub servers: usize,
}

/// Server-scope config for the core module. `None` fields mean "unset";
/// merge resolves them all, so post-composition readers see `Some`.
pub struct CoreSrvConf {
    pub protocol_name: Option<String>,
    pub protocol: Option<Arc<dyn Protocol>>,
    pub timeout: Option<Duration>,
}

impl Module for CoreModule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn create_global_conf(&self, _config: &FileConfig) -> Option<ConfSlot> {
        Some(Box::new(CoreMainConf { servers: 0 }))
    }

    fn create_server_conf(&self, block: &ServerBlock) -> Option<ConfSlot> {
        Some(Box::new(CoreSrvConf {
            protocol_name: block.protocol.clone(),
            protocol: None,
            timeout: block.timeout_secs.map(Duration::from_secs),
        }))
    }

    fn init_global_conf(
        &self,
        config: &FileConfig,
        conf: &mut dyn Any,
    ) -> Result<(), ComposeError> {
        let conf = conf
            .downcast_mut::<CoreMainConf>()
            .ok_or_else(|| slot_mismatch())?;
        conf.servers = config.servers.len();
        Ok(())
    }

    fn merge_server_conf(
        &self,
        default: &dyn Any,
        conf: &mut dyn Any,
    ) -> Result<(), ComposeError> {
        let default = default
            .downcast_ref::<CoreSrvConf>()
            .ok_or_else(|| slot_mismatch())?;
        let conf = conf
            .downcast_mut::<CoreSrvConf>()
            .ok_or_else(|| slot_mismatch())?;

        if conf.protocol_name.is_none() {
            conf.protocol_name = default
                .protocol_name
                .clone()
                .or_else(|| Some(DEFAULT_PROTOCOL.to_string()));
        }
        if conf.timeout.is_none() {
            conf.timeout = default.timeout.or(Some(DEFAULT_TIMEOUT));
        }

        // Validation rejects unknown names; this guards a registry drift.
        let name = conf.protocol_name.as_deref().unwrap_or(DEFAULT_PROTOCOL);
        conf.protocol = Some(proto::lookup(name).ok_or_else(|| {
            ComposeError::UnknownProtocol {
                module: NAME,
                name: name.to_string(),
            }
        })?);

        Ok(())
    }
}

fn slot_mismatch() -> ComposeError {
    ComposeError::Module {
        module: NAME,
        reason: "config slot holds an unexpected type".to_string(),
    }
}
