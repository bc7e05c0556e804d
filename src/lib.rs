//! TCP front end: listener consolidation and connection dispatch.

pub mod config;
pub mod error;
pub mod listen;
pub mod module;
pub mod proto;
pub mod session;

pub use config::FileConfig;
pub use error::{ConnectionError, StartupError};
pub use module::{compose, ComposedConfig, ModuleRegistry};
pub use session::Runtime;
