//! Module registry and config composition.
//!
//! # Data Flow
//! ```text
//! FileConfig (parsed, validated)
//!     → registry.rs (index assignment, Module trait)
//!     → compose() (constructors → initializers → merges)
//!     → context.rs (frozen per-scope config arrays)
//!     → listen endpoints collected per server block
//! ```
//!
//! # Design Decisions
//! - Every module gets a dense zero-based index assigned by registration
//!   order; config arrays are indexed by it, never looked up by name
//! - Composition runs once, sequentially, before any socket is opened;
//!   any failure aborts startup with no partial state retained
//! - Config contexts are frozen into Arc slices after composition and
//!   are read-only from then on

pub mod context;
pub mod core;
pub mod registry;
pub mod tls;

pub use context::{ConfigContext, SharedConf};
pub use registry::{ConfSlot, Module, ModuleIndex, ModuleRegistry};

use std::sync::Arc;

use crate::config::schema::{FileConfig, ServerBlock};
use crate::error::ComposeError;
use crate::listen::endpoint::ListenEndpoint;

/// Module indices resolved once at composition time and carried wherever
/// indexed config lookups happen.
#[derive(Debug, Clone, Copy)]
pub struct Indices {
    pub core: ModuleIndex,
    pub tls: ModuleIndex,
}

/// Everything composition produces: frozen config contexts plus the listen
/// endpoints consumed by listener consolidation.
pub struct ComposedConfig {
    pub registry: ModuleRegistry,
    pub indices: Indices,
    pub global: Arc<[Option<SharedConf>]>,
    pub servers: Vec<ConfigContext>,
    pub endpoints: Vec<ListenEndpoint>,
}

impl ComposedConfig {
    /// Fetch a module's global-scope config, downcast to its concrete type.
    pub fn global_conf<T: std::any::Any>(&self, index: ModuleIndex) -> Option<&T> {
        self.global.get(index.get())?.as_ref()?.downcast_ref()
    }
}

/// Compose module configuration for the whole configuration run.
///
/// Invokes, in order: global and default-server constructors for every
/// module, per-server constructors for every server block, global
/// initializers, and per-server merges against the default-server conf.
/// The merge step resolves every unset field to an explicit default, so
/// runtime code never sees an unset value it did not choose a fallback
/// for. Any failure is fatal to startup.
pub fn compose(
    registry: ModuleRegistry,
    config: &FileConfig,
) -> Result<ComposedConfig, ComposeError> {
    let default_block = ServerBlock::default();

    let mut global: Vec<Option<ConfSlot>> = Vec::with_capacity(registry.len());
    let mut default_srv: Vec<Option<ConfSlot>> = Vec::with_capacity(registry.len());

    for (_, module) in registry.iter() {
        global.push(module.create_global_conf(config));
        default_srv.push(module.create_server_conf(&default_block));
    }

    let mut server_slots: Vec<Vec<Option<ConfSlot>>> = config
        .servers
        .iter()
        .map(|block| {
            registry
                .iter()
                .map(|(_, module)| module.create_server_conf(block))
                .collect()
        })
        .collect();

    for (index, module) in registry.iter() {
        if let Some(slot) = global[index.get()].as_mut() {
            module.init_global_conf(config, slot.as_mut())?;
        }
    }

    for slots in &mut server_slots {
        for (index, module) in registry.iter() {
            if let (Some(default), Some(slot)) =
                (default_srv[index.get()].as_ref(), slots[index.get()].as_mut())
            {
                module.merge_server_conf(default.as_ref(), slot.as_mut())?;
            }
        }
    }

    // Freeze: composition is over, contexts are read-only from here on.
    let global: Arc<[Option<SharedConf>]> = global
        .into_iter()
        .map(|slot| slot.map(SharedConf::from))
        .collect();

    let servers: Vec<ConfigContext> = server_slots
        .into_iter()
        .map(|slots| {
            let frozen: Arc<[Option<SharedConf>]> = slots
                .into_iter()
                .map(|slot| slot.map(SharedConf::from))
                .collect();
            ConfigContext::new(Arc::clone(&global), frozen)
        })
        .collect();

    let mut endpoints = Vec::new();
    for (block, ctx) in config.servers.iter().zip(&servers) {
        for directive in &block.listen {
            endpoints.push(ListenEndpoint::from_directive(directive, ctx.clone())?);
        }
    }

    let indices = Indices {
        core: registry
            .index_of(core::NAME)
            .ok_or(ComposeError::Module {
                module: core::NAME,
                reason: "core module not registered".to_string(),
            })?,
        tls: registry.index_of(tls::NAME).ok_or(ComposeError::Module {
            module: tls::NAME,
            reason: "tls module not registered".to_string(),
        })?,
    };

    Ok(ComposedConfig {
        registry,
        indices,
        global,
        servers,
        endpoints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ListenDirective, TlsBlock};
    use crate::module::core::CoreSrvConf;
    use crate::module::tls::TlsSrvConf;
    use std::time::Duration;

    fn two_server_config() -> FileConfig {
        FileConfig {
            servers: vec![
                ServerBlock {
                    protocol: Some("echo".to_string()),
                    timeout_secs: Some(5),
                    listen: vec![ListenDirective {
                        address: "127.0.0.1:9025".to_string(),
                        ..Default::default()
                    }],
                    tls: None,
                },
                ServerBlock {
                    protocol: None,
                    timeout_secs: None,
                    listen: vec![ListenDirective {
                        address: "0.0.0.0:9026".to_string(),
                        ..Default::default()
                    }],
                    tls: Some(TlsBlock {
                        starttls: crate::config::StarttlsMode::On,
                        ..Default::default()
                    }),
                },
            ],
        }
    }

    #[test]
    fn context_arrays_sized_to_module_count() {
        let composed = compose(ModuleRegistry::builtin(), &two_server_config()).unwrap();
        let count = composed.registry.len();
        assert_eq!(composed.global.len(), count);
        for ctx in &composed.servers {
            assert_eq!(ctx.module_count(), count);
        }
    }

    #[test]
    fn composition_is_deterministic() {
        let config = two_server_config();
        let a = compose(ModuleRegistry::builtin(), &config).unwrap();
        let b = compose(ModuleRegistry::builtin(), &config).unwrap();

        assert_eq!(a.registry.len(), b.registry.len());
        assert_eq!(a.global.len(), b.global.len());
        assert_eq!(a.servers.len(), b.servers.len());
        assert_eq!(a.indices.core.get(), b.indices.core.get());
        assert_eq!(a.indices.tls.get(), b.indices.tls.get());
        for (name_a, name_b) in a
            .registry
            .iter()
            .map(|(_, m)| m.name())
            .zip(b.registry.iter().map(|(_, m)| m.name()))
        {
            assert_eq!(name_a, name_b);
        }
    }

    #[test]
    fn merge_resolves_unset_fields_to_defaults() {
        let composed = compose(ModuleRegistry::builtin(), &two_server_config()).unwrap();

        // Second server set neither protocol nor timeout.
        let srv: &CoreSrvConf = composed.servers[1]
            .server_conf(composed.indices.core)
            .unwrap();
        assert_eq!(srv.timeout, Some(Duration::from_secs(60)));
        assert_eq!(
            srv.protocol.as_ref().map(|p| p.name()),
            Some("echo")
        );

        let explicit: &CoreSrvConf = composed.servers[0]
            .server_conf(composed.indices.core)
            .unwrap();
        assert_eq!(explicit.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn tls_conf_without_material_has_no_acceptor() {
        let composed = compose(ModuleRegistry::builtin(), &two_server_config()).unwrap();
        let tls: &TlsSrvConf = composed.servers[1]
            .server_conf(composed.indices.tls)
            .unwrap();
        assert!(tls.acceptor.is_none());
        assert_eq!(tls.starttls, crate::config::StarttlsMode::On);
    }

    #[test]
    fn global_initializer_sees_server_count() {
        let composed = compose(ModuleRegistry::builtin(), &two_server_config()).unwrap();
        let main: &crate::module::core::CoreMainConf =
            composed.global_conf(composed.indices.core).unwrap();
        assert_eq!(main.servers, 2);
    }

    #[test]
    fn endpoints_collected_per_server() {
        let composed = compose(ModuleRegistry::builtin(), &two_server_config()).unwrap();
        assert_eq!(composed.endpoints.len(), 2);
        assert!(composed.endpoints[1].wildcard);
        assert!(!composed.endpoints[0].wildcard);
    }
}
