//! Protocol plugins.
//!
//! Each application protocol implements the same lifecycle capability
//! set; exactly one protocol is bound per server scope, selected at
//! configuration time by name. The front end drives `init_session` and
//! `process_session` and never re-enters the data path afterwards.

pub mod echo;

use std::sync::Arc;

use crate::error::ConnectionError;
use crate::session::conn::Conn;
use crate::session::state::Session;

/// Lifecycle contract every protocol plugin satisfies.
#[async_trait::async_trait]
pub trait Protocol: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prepare protocol state on the session. Failure closes the
    /// connection before any data is exchanged.
    async fn init_session(&self, session: &mut Session) -> Result<(), ConnectionError>;

    /// Own the data path until the session is over. The front end closes
    /// the connection when this returns.
    async fn process_session(&self, conn: &mut Conn, session: &mut Session);

    /// Read entry point after a successful STARTTLS upgrade. The session
    /// and its module state are the ones from before the upgrade.
    async fn post_starttls(&self, conn: &mut Conn, session: &mut Session);

    /// Emit a protocol-appropriate error response before the connection
    /// is closed on an internal error. Optional.
    async fn internal_server_error(&self, _conn: &mut Conn, _session: &mut Session) {}

    /// Release protocol state at teardown. Optional.
    async fn close_session(&self, _session: &mut Session) {}
}

/// Resolve a configured protocol name to its implementation.
pub fn lookup(name: &str) -> Option<Arc<dyn Protocol>> {
    match name {
        "echo" => Some(Arc::new(echo::EchoProtocol)),
        _ => None,
    }
}
