//! Module identity and index assignment.
//!
//! # Responsibilities
//! - Define the `Module` capability set (config constructors, initializer,
//!   merge hook)
//! - Assign each registered module a dense zero-based index by
//!   registration order
//!
//! # Design Decisions
//! - Indices are positions in the registration vector: contiguous, stable
//!   for the configuration run, and assigned exactly once
//! - Config objects are opaque (`dyn Any`); only the owning module
//!   downcasts them

use std::any::Any;
use std::sync::Arc;

use crate::config::schema::{FileConfig, ServerBlock};
use crate::error::ComposeError;

/// An opaque module-owned configuration object, boxed during composition.
pub type ConfSlot = Box<dyn Any + Send + Sync>;

/// Index of a module within the registry, usable to address any per-scope
/// config array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleIndex(usize);

impl ModuleIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

/// Capability set of a feature module.
///
/// A module may contribute a global-scope config object, a server-scope
/// config object, a post-parse global initializer, and a server-scope
/// merge that resolves unset fields against an inherited default.
pub trait Module: Send + Sync {
    fn name(&self) -> &'static str;

    fn create_global_conf(&self, _config: &FileConfig) -> Option<ConfSlot> {
        None
    }

    fn create_server_conf(&self, _block: &ServerBlock) -> Option<ConfSlot> {
        None
    }

    /// Invoked once after parsing; may inspect and mutate the module's
    /// global config object.
    fn init_global_conf(
        &self,
        _config: &FileConfig,
        _conf: &mut dyn Any,
    ) -> Result<(), ComposeError> {
        Ok(())
    }

    /// Combine a server-scope config with the inherited default. After this
    /// returns, every "unset" field must hold an explicit value.
    fn merge_server_conf(
        &self,
        _default: &dyn Any,
        _conf: &mut dyn Any,
    ) -> Result<(), ComposeError> {
        Ok(())
    }
}

/// The set of registered modules for one configuration run.
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new(modules: Vec<Arc<dyn Module>>) -> Self {
        Self { modules }
    }

    /// The built-in module set: core (protocol, timeout) and tls.
    pub fn builtin() -> Self {
        Self::new(vec![
            Arc::new(super::core::CoreModule),
            Arc::new(super::tls::TlsModule),
        ])
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Iterate modules with their assigned indices.
    pub fn iter(&self) -> impl Iterator<Item = (ModuleIndex, &Arc<dyn Module>)> {
        self.modules
            .iter()
            .enumerate()
            .map(|(i, m)| (ModuleIndex(i), m))
    }

    pub fn index_of(&self, name: &str) -> Option<ModuleIndex> {
        self.modules
            .iter()
            .position(|m| m.name() == name)
            .map(ModuleIndex)
    }
}
