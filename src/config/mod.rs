//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → FileConfig (validated, immutable)
//!     → module::compose() turns it into per-scope config contexts
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The raw schema is only an input to composition; runtime code reads
//!   module config contexts, never these structs

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::FileConfig;
pub use schema::ListenDirective;
pub use schema::ServerBlock;
pub use schema::StarttlsMode;
