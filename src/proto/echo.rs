//! Line-based echo protocol.
//!
//! Small but complete: it exercises every lifecycle hook, the STARTTLS
//! upgrade path, and the starttls-only command gate.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::config::StarttlsMode;
use crate::error::ConnectionError;
use crate::session::conn::Conn;
use crate::session::dispatch;
use crate::session::state::Session;

/// Lines longer than this close the session.
const MAX_LINE: usize = 8 * 1024;

pub struct EchoProtocol;

/// Per-session protocol state, stored in the session's protocol slot.
#[derive(Default)]
struct EchoState {
    lines_echoed: u64,
}

#[async_trait::async_trait]
impl super::Protocol for EchoProtocol {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn init_session(&self, session: &mut Session) -> Result<(), ConnectionError> {
        session.set_protocol_ctx(Box::new(EchoState::default()));
        Ok(())
    }

    async fn process_session(&self, conn: &mut Conn, session: &mut Session) {
        self.command_loop(conn, session).await;
    }

    async fn post_starttls(&self, conn: &mut Conn, session: &mut Session) {
        self.command_loop(conn, session).await;
    }

    async fn internal_server_error(&self, conn: &mut Conn, _session: &mut Session) {
        let _ = conn.write_all(b"ERR internal server error\r\n").await;
    }

    async fn close_session(&self, session: &mut Session) {
        if let Some(state) = session.protocol_ctx::<EchoState>() {
            tracing::debug!(lines = state.lines_echoed, "echo session closed");
        }
    }
}

impl EchoProtocol {
    async fn command_loop(&self, conn: &mut Conn, session: &mut Session) {
        let mut buf = Vec::with_capacity(1024);

        loop {
            let Some(line) = read_line(conn, &mut buf).await else {
                return;
            };
            let text = String::from_utf8_lossy(&line);
            let command = text.trim();

            if command.eq_ignore_ascii_case("QUIT") {
                let _ = conn.write_all(b"bye\r\n").await;
                return;
            }

            if command.eq_ignore_ascii_case("STARTTLS") {
                if conn.is_tls() {
                    if conn.write_all(b"ERR already using TLS\r\n").await.is_err() {
                        return;
                    }
                    continue;
                }

                let offered = session
                    .tls_conf()
                    .map(|t| t.starttls != StarttlsMode::Off && t.acceptor.is_some())
                    .unwrap_or(false);
                if !offered {
                    if conn.write_all(b"ERR STARTTLS not offered\r\n").await.is_err() {
                        return;
                    }
                    continue;
                }

                if conn.write_all(b"OK begin TLS\r\n").await.is_err() {
                    return;
                }
                if let Err(e) = dispatch::starttls(self, conn, session).await {
                    tracing::error!(connection = %conn.id(), error = %e, "starttls failed");
                }
                // post_starttls ran the rest of the session.
                return;
            }

            if dispatch::starttls_only(session, conn) {
                if conn
                    .write_all(b"ERR must issue STARTTLS first\r\n")
                    .await
                    .is_err()
                {
                    return;
                }
                continue;
            }

            let mut response = command.as_bytes().to_vec();
            response.push(b'\n');
            if conn.write_all(&response).await.is_err() {
                return;
            }

            if let Some(state) = session.protocol_ctx_mut::<EchoState>() {
                state.lines_echoed += 1;
            }
        }
    }
}

/// Pull one line (without its terminator) out of the stream, buffering
/// across reads. Returns None on EOF, read error, or an oversized line.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> Option<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Some(line);
        }

        if buf.len() > MAX_LINE {
            return None;
        }

        let mut chunk = [0u8; 1024];
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}
