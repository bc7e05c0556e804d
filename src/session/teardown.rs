//! Uniform close path, safe to invoke from any state.

use crate::session::conn::Conn;
use crate::session::state::Session;

/// Close a connection, idempotently.
///
/// Drives the orderly TLS shutdown first when a TLS stream is attached,
/// then invokes the bound protocol's `close_session` if a session is
/// attached, adjusts counters, marks the connection destroyed, and
/// releases everything scoped to it as a unit. A second call performs no
/// side effects.
pub async fn close_connection(conn: &mut Conn, session: Option<&mut Session>) {
    if conn.is_destroyed() {
        return;
    }

    tracing::debug!(connection = %conn.id(), "close tcp connection");

    if conn.is_tls() {
        if let Err(e) = conn.shutdown_tls().await {
            tracing::debug!(connection = %conn.id(), error = %e, "TLS shutdown incomplete");
        }
    }

    if let Some(session) = session {
        if let Some(proto) = session.protocol() {
            proto.close_session(session).await;
        }
    }

    metrics::counter!("connections_closed_total").increment(1);

    // Dropping the guard releases the connection's slot in the tracker.
    drop(conn.mark_destroyed());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionError;
    use crate::listen::table::AddressConfig;
    use crate::module::context::SharedConf;
    use crate::module::core::CoreSrvConf;
    use crate::module::{ConfigContext, Indices, ModuleRegistry};
    use crate::proto::Protocol;
    use crate::session::state::Session;
    use crate::session::tracker::ConnectionTracker;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingProtocol {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Protocol for CountingProtocol {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn init_session(&self, _session: &mut Session) -> Result<(), ConnectionError> {
            Ok(())
        }

        async fn process_session(&self, _conn: &mut Conn, _session: &mut Session) {}

        async fn post_starttls(&self, _conn: &mut Conn, _session: &mut Session) {}

        async fn close_session(&self, _session: &mut Session) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn session_with(proto: Arc<dyn Protocol>) -> Session {
        let registry = ModuleRegistry::builtin();
        let indices = Indices {
            core: registry.index_of("core").unwrap(),
            tls: registry.index_of("tls").unwrap(),
        };

        let core = CoreSrvConf {
            protocol_name: Some(proto.name().to_string()),
            protocol: Some(proto),
            timeout: Some(Duration::from_secs(5)),
        };
        let slots: Arc<[Option<SharedConf>]> =
            vec![Some(Arc::new(core) as SharedConf), None].into();
        let globals: Arc<[Option<SharedConf>]> = vec![None, None].into();
        let ctx = ConfigContext::new(globals, slots);

        let conf = AddressConfig {
            ctx,
            tls: false,
            addr_text: "127.0.0.1:9025".to_string(),
        };
        Session::new(&conf, indices)
    }

    async fn loopback_conn(tracker: &ConnectionTracker) -> Conn {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::net::TcpStream::connect(addr);
        let server = listener.accept();
        let (_client, server) = tokio::join!(client, server);
        let (stream, peer) = server.unwrap();
        Conn::new(stream, peer, tracker.track())
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let closed = Arc::new(AtomicUsize::new(0));
        let proto = Arc::new(CountingProtocol {
            closed: Arc::clone(&closed),
        });
        let mut session = session_with(proto);

        let tracker = ConnectionTracker::new();
        let mut conn = loopback_conn(&tracker).await;
        assert_eq!(tracker.active_count(), 1);

        close_connection(&mut conn, Some(&mut session)).await;
        assert!(conn.is_destroyed());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.active_count(), 0);

        // Second close: no additional side effects.
        close_connection(&mut conn, Some(&mut session)).await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn close_without_session_is_safe() {
        let tracker = ConnectionTracker::new();
        let mut conn = loopback_conn(&tracker).await;

        close_connection(&mut conn, None).await;
        assert!(conn.is_destroyed());
        assert_eq!(tracker.active_count(), 0);
    }
}
