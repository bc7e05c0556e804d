//! Layered diagnostic context for connection log lines.
//!
//! Renders ` while <action>, client: <addr>` and, when a session is
//! attached, the STARTTLS flag and server address, then the upstream name
//! when a link is attached. Each layer is appended only if the previous
//! layer's data is present; absence truncates the chain without error.

use crate::session::state::Session;

/// Diagnostic context carried alongside a connection, independent of the
/// session's lifetime.
pub struct LogContext {
    action: &'static str,
    client: String,
}

impl LogContext {
    pub fn new(client: String) -> Self {
        Self {
            action: "initializing connection",
            client,
        }
    }

    /// Describe the stage the connection is currently in; rendered as
    /// "while <action>" on every subsequent log line.
    pub fn set_action(&mut self, action: &'static str) {
        self.action = action;
    }

    pub fn action(&self) -> &'static str {
        self.action
    }

    /// Render the diagnostic suffix, lazily, at the moment a log line is
    /// emitted.
    pub fn suffix(&self, session: Option<&Session>) -> String {
        let mut out = format!(" while {}, client: {}", self.action, self.client);

        let Some(session) = session else {
            return out;
        };

        out.push_str(&format!(
            "{}, server: {}",
            if session.starttls { " using starttls" } else { "" },
            session.addr_text
        ));

        let Some(upstream) = &session.upstream else {
            return out;
        };

        out.push_str(&format!(", upstream: {}", upstream));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listen::table::AddressConfig;
    use crate::module::{context, Indices, ModuleRegistry};

    fn session() -> Session {
        let registry = ModuleRegistry::builtin();
        let indices = Indices {
            core: registry.index_of("core").unwrap(),
            tls: registry.index_of("tls").unwrap(),
        };
        Session::new(
            &AddressConfig {
                ctx: context::empty(),
                tls: false,
                addr_text: "10.0.0.1:25".to_string(),
            },
            indices,
        )
    }

    #[test]
    fn no_session_truncates_after_client() {
        let mut ctx = LogContext::new("192.0.2.7:5000".to_string());
        ctx.set_action("resolving listen address");
        assert_eq!(
            ctx.suffix(None),
            " while resolving listen address, client: 192.0.2.7:5000"
        );
    }

    #[test]
    fn session_appends_server_layer() {
        let ctx = LogContext::new("192.0.2.7:5000".to_string());
        let s = session();
        assert_eq!(
            ctx.suffix(Some(&s)),
            " while initializing connection, client: 192.0.2.7:5000, server: 10.0.0.1:25"
        );
    }

    #[test]
    fn starttls_flag_rendered_before_server() {
        let ctx = LogContext::new("c".to_string());
        let mut s = session();
        s.starttls = true;
        assert_eq!(
            ctx.suffix(Some(&s)),
            " while initializing connection, client: c using starttls, server: 10.0.0.1:25"
        );
    }

    #[test]
    fn upstream_layer_appended_last() {
        let ctx = LogContext::new("c".to_string());
        let mut s = session();
        s.upstream = Some("backend-1".to_string());
        assert_eq!(
            ctx.suffix(Some(&s)),
            " while initializing connection, client: c, server: 10.0.0.1:25, upstream: backend-1"
        );
    }
}
