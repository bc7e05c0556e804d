//! Per-scope config context: module-count-sized arrays of opaque config
//! objects, indexed by module index.

use std::any::Any;
use std::sync::Arc;

use crate::module::registry::ModuleIndex;

/// A frozen, shareable module config object.
pub type SharedConf = Arc<dyn Any + Send + Sync>;

/// Config lookup handle for one server scope.
///
/// Holds the server-scope config array plus a handle to the shared
/// global-scope array. Both arrays have exactly one slot per registered
/// module and are immutable once composition completes, so contexts can be
/// cloned into every session and read concurrently without locks.
#[derive(Clone)]
pub struct ConfigContext {
    global: Arc<[Option<SharedConf>]>,
    server: Arc<[Option<SharedConf>]>,
}

impl ConfigContext {
    pub(crate) fn new(
        global: Arc<[Option<SharedConf>]>,
        server: Arc<[Option<SharedConf>]>,
    ) -> Self {
        Self { global, server }
    }

    pub fn module_count(&self) -> usize {
        self.server.len()
    }

    /// Fetch a module's global-scope config, downcast to its concrete type.
    pub fn global_conf<T: Any>(&self, index: ModuleIndex) -> Option<&T> {
        self.global.get(index.get())?.as_ref()?.downcast_ref()
    }

    /// Fetch a module's server-scope config, downcast to its concrete type.
    pub fn server_conf<T: Any>(&self, index: ModuleIndex) -> Option<&T> {
        self.server.get(index.get())?.as_ref()?.downcast_ref()
    }
}

impl std::fmt::Debug for ConfigContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigContext")
            .field("modules", &self.server.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn empty() -> ConfigContext {
    let none: Arc<[Option<SharedConf>]> = Vec::new().into();
    ConfigContext::new(Arc::clone(&none), none)
}
