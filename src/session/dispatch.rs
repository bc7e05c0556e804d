//! Accept-time dispatch: per-address config resolution, the optional TLS
//! handshake, and handoff to the protocol plugin.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;

use crate::config::StarttlsMode;
use crate::error::ConnectionError;
use crate::listen::table::{AddressConfig, AddressTable};
use crate::listen::PhysicalListener;
use crate::module::Indices;
use crate::proto::Protocol;
use crate::session::conn::Conn;
use crate::session::log_ctx::LogContext;
use crate::session::state::Session;
use crate::session::teardown::close_connection;
use crate::session::tracker::ConnectionTracker;

/// Shared state for every accept loop: resolved module indices and the
/// active-connection tracker. Read-only after startup.
pub struct Runtime {
    pub indices: Indices,
    pub tracker: ConnectionTracker,
}

/// Accept connections on one physical listener forever, dispatching each
/// to its own task. Accept errors affect no existing connection.
pub async fn serve(listener: PhysicalListener, rt: Arc<Runtime>) {
    loop {
        match listener.inner.accept().await {
            Ok((stream, peer)) => {
                metrics::counter!("connections_accepted_total").increment(1);
                let table = Arc::clone(&listener.table);
                let rt = Arc::clone(&rt);
                tokio::spawn(handle_connection(stream, peer, table, rt));
            }
            Err(e) => {
                tracing::warn!(address = %listener.local_addr, error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Drive one connection through the session state machine:
/// Accepted → AddressResolved → (TlsHandshaking) → SessionInitializing →
/// Processing → Closing → Closed.
pub async fn handle_connection(
    stream: TcpStream,
    peer: std::net::SocketAddr,
    table: Arc<AddressTable>,
    rt: Arc<Runtime>,
) {
    let mut conn = Conn::new(stream, peer, rt.tracker.track());
    let mut log = LogContext::new(peer.to_string());
    log.set_action("resolving listen address");

    let addr_conf = match resolve_address(&conn, &table) {
        Ok(conf) => conf,
        Err(e) => {
            tracing::error!(connection = %conn.id(), "{}{}", e, log.suffix(None));
            close_connection(&mut conn, None).await;
            return;
        }
    };

    let mut session = Session::new(&addr_conf, rt.indices);

    tracing::info!(
        connection = %conn.id(),
        client = %conn.peer(),
        server = %session.addr_text,
        "client connected"
    );

    log.set_action("initializing connection");

    let (tls_enabled, acceptor) = match session.tls_conf() {
        Some(tls) => (tls.enabled, tls.acceptor.clone()),
        None => (false, None),
    };

    if tls_enabled || addr_conf.tls {
        log.set_action("TLS handshaking");

        let Some(acceptor) = acceptor else {
            let e = ConnectionError::NoTlsMaterial;
            tracing::error!(connection = %conn.id(), "{}{}", e, log.suffix(Some(&session)));
            close_connection(&mut conn, Some(&mut session)).await;
            return;
        };

        if let Err(e) = handshake(&mut conn, &acceptor, session.timeout()).await {
            tracing::error!(connection = %conn.id(), "{}{}", e, log.suffix(Some(&session)));
            close_connection(&mut conn, Some(&mut session)).await;
            return;
        }
    }

    init_session(&mut conn, &mut session, &mut log).await;

    log.set_action("closing session");
    close_connection(&mut conn, Some(&mut session)).await;
}

/// Accepted → AddressResolved. A shared listener needs the connection's
/// local address; an unshared one dispatches unconditionally, no syscall.
fn resolve_address(
    conn: &Conn,
    table: &AddressTable,
) -> Result<AddressConfig, ConnectionError> {
    if table.is_shared() {
        let local = conn.local_addr().map_err(ConnectionError::LocalAddr)?;
        Ok(table.resolve(local.ip()).clone())
    } else {
        Ok(table.first().clone())
    }
}

/// Run the TLS handshake under the session timeout. A handshake pending
/// past the limit is a failure; the connection never continues plaintext.
pub(crate) async fn handshake(
    conn: &mut Conn,
    acceptor: &TlsAcceptor,
    limit: Duration,
) -> Result<(), ConnectionError> {
    match timeout(limit, conn.accept_tls(acceptor)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Handshake(e)),
        Err(_) => Err(ConnectionError::HandshakeTimeout),
    }
}

/// TlsHandshaking → SessionInitializing → Processing. The caller closes
/// the connection when this returns, whatever the path out.
async fn init_session(conn: &mut Conn, session: &mut Session, log: &mut LogContext) {
    log.set_action("initializing session");

    session.alloc_module_ctx();

    let Some(proto) = session.protocol() else {
        let e = ConnectionError::IncompleteConf;
        tracing::error!(connection = %conn.id(), "{}{}", e, log.suffix(Some(session)));
        return;
    };

    if let Err(e) = proto.init_session(session).await {
        tracing::error!(connection = %conn.id(), "{}{}", e, log.suffix(Some(session)));
        return;
    }

    log.set_action("processing session");
    proto.process_session(conn, session).await;
}

/// Protocol-triggered STARTTLS upgrade on the live connection. On success,
/// control resumes at the protocol's post-upgrade read entry point; the
/// session object and its module slots are preserved, not recreated.
pub async fn starttls(
    proto: &dyn Protocol,
    conn: &mut Conn,
    session: &mut Session,
) -> Result<(), ConnectionError> {
    session.starttls = true;

    let acceptor = session
        .tls_conf()
        .and_then(|t| t.acceptor.clone())
        .ok_or(ConnectionError::NoTlsMaterial)?;

    handshake(conn, &acceptor, session.timeout()).await?;

    proto.post_starttls(conn, session).await;
    Ok(())
}

/// True when the session is still plaintext and the server's STARTTLS
/// policy refuses commands before the upgrade.
pub fn starttls_only(session: &Session, conn: &Conn) -> bool {
    !conn.is_tls()
        && session
            .tls_conf()
            .map(|t| t.starttls == StarttlsMode::Only)
            .unwrap_or(false)
}

/// Give the protocol a chance to emit a protocol-appropriate error
/// response, then close.
pub async fn internal_server_error(
    proto: &dyn Protocol,
    conn: &mut Conn,
    session: &mut Session,
) {
    proto.internal_server_error(conn, session).await;
    close_connection(conn, Some(session)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listen::table::AddressConfig;
    use crate::module::context;
    use crate::module::ModuleRegistry;
    use crate::proto;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio_rustls::rustls;

    fn throwaway_acceptor() -> TlsAcceptor {
        let ck = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let key = rustls::pki_types::PrivateKeyDer::Pkcs8(ck.key_pair.serialize_der().into());
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![ck.cert.der().clone()], key)
            .unwrap();
        TlsAcceptor::from(Arc::new(config))
    }

    #[tokio::test]
    async fn silent_client_times_out_the_handshake() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::net::TcpStream::connect(addr);
        let server = listener.accept();
        let (client, server) = tokio::join!(client, server);
        let _client = client.unwrap();
        let (stream, peer) = server.unwrap();

        let tracker = ConnectionTracker::new();
        let mut conn = Conn::new(stream, peer, tracker.track());

        // The client is connected but never sends a ClientHello; the
        // handshake must fail at the limit, never fall back to plaintext.
        let err = handshake(&mut conn, &throwaway_acceptor(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::HandshakeTimeout));
        assert!(!conn.is_tls());
    }

    fn indices() -> Indices {
        let registry = ModuleRegistry::builtin();
        Indices {
            core: registry.index_of("core").unwrap(),
            tls: registry.index_of("tls").unwrap(),
        }
    }

    #[tokio::test]
    async fn internal_error_reports_then_closes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::net::TcpStream::connect(addr);
        let server = listener.accept();
        let (client, server) = tokio::join!(client, server);
        let (stream, peer) = server.unwrap();

        let tracker = ConnectionTracker::new();
        let mut conn = Conn::new(stream, peer, tracker.track());
        let mut session = Session::new(
            &AddressConfig {
                ctx: context::empty(),
                tls: false,
                addr_text: "127.0.0.1:9025".to_string(),
            },
            indices(),
        );

        let proto = proto::lookup("echo").unwrap();
        internal_server_error(proto.as_ref(), &mut conn, &mut session).await;
        assert!(conn.is_destroyed());

        let mut reader = BufReader::new(client.unwrap());
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "ERR internal server error\r\n");
    }
}

