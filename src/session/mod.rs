//! Connection session subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TCP connection
//!     → dispatch.rs (address table lookup → per-address config)
//!     → optional TLS handshake (conn.rs), bounded by the session timeout
//!     → state.rs (Session construction, per-module runtime slots)
//!     → protocol plugin init_session / process_session
//!     → teardown.rs (idempotent close, TLS shutdown, counters)
//!
//! Connection states:
//!     Accepted → AddressResolved → (TlsHandshaking) →
//!     SessionInitializing → Processing → Closing → Closed
//! ```
//!
//! # Design Decisions
//! - Transitions within one connection are strictly sequential; across
//!   connections there is no ordering and no shared mutable state
//! - A handshake pending past the server timeout is a failure, never a
//!   silent fallback to plaintext
//! - STARTTLS re-enters the handshake on the live connection and resumes
//!   at the protocol's post-upgrade entry point; the session survives

pub mod conn;
pub mod dispatch;
pub mod log_ctx;
pub mod state;
pub mod teardown;
pub mod tracker;

pub use conn::Conn;
pub use dispatch::{serve, starttls, starttls_only, Runtime};
pub use log_ctx::LogContext;
pub use state::Session;
pub use teardown::close_connection;
pub use tracker::{ConnectionId, ConnectionTracker};
