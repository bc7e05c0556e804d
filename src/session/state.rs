//! Per-connection session state.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use crate::listen::table::AddressConfig;
use crate::module::core::CoreSrvConf;
use crate::module::tls::TlsSrvConf;
use crate::module::{ConfigContext, Indices, ModuleIndex};
use crate::proto::Protocol;

/// Fallback when the core conf is somehow unresolved; merge normally
/// guarantees an explicit timeout.
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// One active connection's session.
///
/// Exclusively owned by the connection that created it; holds read-only
/// handles into the config tree plus the per-module runtime slot array
/// allocated when the session initializes.
pub struct Session {
    ctx: ConfigContext,
    indices: Indices,
    /// Textual server-side address, for the diagnostic chain.
    pub addr_text: String,
    /// The session entered TLS via a mid-session upgrade.
    pub starttls: bool,
    /// Name of an attached upstream link, used only to enrich logs.
    pub upstream: Option<String>,
    /// Per-module runtime state, parallel to the server config array.
    module_ctx: Vec<Option<Box<dyn Any + Send>>>,
    /// The bound protocol's runtime state. Protocols are not registry
    /// modules, so their state lives beside the module slots, never in
    /// them.
    protocol_ctx: Option<Box<dyn Any + Send>>,
}

impl Session {
    pub fn new(addr_conf: &AddressConfig, indices: Indices) -> Self {
        Self {
            ctx: addr_conf.ctx.clone(),
            indices,
            addr_text: addr_conf.addr_text.clone(),
            starttls: false,
            upstream: None,
            module_ctx: Vec::new(),
            protocol_ctx: None,
        }
    }

    pub fn ctx(&self) -> &ConfigContext {
        &self.ctx
    }

    pub fn indices(&self) -> Indices {
        self.indices
    }

    pub fn core_conf(&self) -> Option<&CoreSrvConf> {
        self.ctx.server_conf(self.indices.core)
    }

    pub fn tls_conf(&self) -> Option<&TlsSrvConf> {
        self.ctx.server_conf(self.indices.tls)
    }

    /// The protocol bound to this session's server scope.
    pub fn protocol(&self) -> Option<Arc<dyn Protocol>> {
        self.core_conf()?.protocol.clone()
    }

    /// Session timeout; also bounds TLS handshakes on this connection.
    pub fn timeout(&self) -> Duration {
        self.core_conf()
            .and_then(|c| c.timeout)
            .unwrap_or(FALLBACK_TIMEOUT)
    }

    /// Allocate the per-module runtime slots. Called once when the session
    /// initializes; a STARTTLS upgrade preserves the existing slots.
    pub fn alloc_module_ctx(&mut self) {
        if self.module_ctx.is_empty() {
            self.module_ctx
                .resize_with(self.ctx.module_count(), || None);
        }
    }

    pub fn set_module_ctx(&mut self, index: ModuleIndex, value: Box<dyn Any + Send>) {
        if let Some(slot) = self.module_ctx.get_mut(index.get()) {
            *slot = Some(value);
        }
    }

    pub fn module_ctx<T: Any>(&self, index: ModuleIndex) -> Option<&T> {
        self.module_ctx.get(index.get())?.as_ref()?.downcast_ref()
    }

    pub fn module_ctx_mut<T: Any>(&mut self, index: ModuleIndex) -> Option<&mut T> {
        self.module_ctx
            .get_mut(index.get())?
            .as_mut()?
            .downcast_mut()
    }

    pub fn module_ctx_len(&self) -> usize {
        self.module_ctx.len()
    }

    /// Attach the bound protocol's runtime state. Like the module slots,
    /// it survives a STARTTLS upgrade.
    pub fn set_protocol_ctx(&mut self, value: Box<dyn Any + Send>) {
        self.protocol_ctx = Some(value);
    }

    pub fn protocol_ctx<T: Any>(&self) -> Option<&T> {
        self.protocol_ctx.as_ref()?.downcast_ref()
    }

    pub fn protocol_ctx_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.protocol_ctx.as_mut()?.downcast_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listen::table::AddressConfig;
    use crate::module::context::SharedConf;
    use crate::module::{ConfigContext, ModuleRegistry};
    use std::sync::Arc;

    struct MarkerA(u32);
    struct MarkerB(&'static str);

    fn session() -> Session {
        let registry = ModuleRegistry::builtin();
        let indices = Indices {
            core: registry.index_of("core").unwrap(),
            tls: registry.index_of("tls").unwrap(),
        };
        let slots: Arc<[Option<SharedConf>]> = vec![None, None].into();
        let ctx = ConfigContext::new(Arc::clone(&slots), slots);
        Session::new(
            &AddressConfig {
                ctx,
                tls: false,
                addr_text: "10.0.0.1:25".to_string(),
            },
            indices,
        )
    }

    #[test]
    fn module_slots_sized_once_and_preserved() {
        let mut s = session();
        s.alloc_module_ctx();
        assert_eq!(s.module_ctx_len(), 2);

        let core = s.indices().core;
        s.set_module_ctx(core, Box::new(MarkerA(7)));

        // Re-allocation (the STARTTLS path) must not wipe the slots.
        s.alloc_module_ctx();
        assert_eq!(s.module_ctx::<MarkerA>(core).unwrap().0, 7);
    }

    #[test]
    fn protocol_state_never_occupies_a_module_slot() {
        let mut s = session();
        s.alloc_module_ctx();
        s.set_protocol_ctx(Box::new(MarkerB("proto")));

        assert_eq!(s.protocol_ctx::<MarkerB>().unwrap().0, "proto");
        let core = s.indices().core;
        let tls = s.indices().tls;
        assert!(s.module_ctx::<MarkerB>(core).is_none());
        assert!(s.module_ctx::<MarkerB>(tls).is_none());

        // A module using its own slot does not collide with the protocol.
        s.set_module_ctx(core, Box::new(MarkerB("module")));
        assert_eq!(s.module_ctx::<MarkerB>(core).unwrap().0, "module");
        assert_eq!(s.protocol_ctx::<MarkerB>().unwrap().0, "proto");
    }
}
