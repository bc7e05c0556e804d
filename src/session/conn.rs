//! The accepted connection: plaintext or TLS over the same handle.
//!
//! Protocol plugins read and write through `Conn` without knowing whether
//! a handshake happened; the STARTTLS upgrade swaps the inner stream in
//! place on the live connection.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use crate::session::tracker::{ConnectionGuard, ConnectionId};

enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    /// Transient: a handshake owns the inner stream. A failed handshake
    /// leaves the connection here; teardown treats it as already gone.
    Upgrading,
}

pub struct Conn {
    stream: Stream,
    peer: SocketAddr,
    id: ConnectionId,
    destroyed: bool,
    guard: Option<ConnectionGuard>,
}

impl Conn {
    pub fn new(stream: TcpStream, peer: SocketAddr, guard: ConnectionGuard) -> Self {
        Self {
            stream: Stream::Plain(stream),
            peer,
            id: guard.id(),
            destroyed: false,
            guard: Some(guard),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Local address of the accepting socket, queried only when the
    /// physical listener is shared by several configured addresses.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.stream {
            Stream::Plain(s) => s.local_addr(),
            Stream::Tls(s) => s.get_ref().0.local_addr(),
            Stream::Upgrading => Err(not_connected()),
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.stream, Stream::Tls(_))
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn mark_destroyed(&mut self) -> Option<ConnectionGuard> {
        self.destroyed = true;
        self.guard.take()
    }

    /// Run the server-side handshake, replacing the plaintext stream with
    /// a TLS one. Never called twice: the caller checks `is_tls` first.
    pub(crate) async fn accept_tls(&mut self, acceptor: &TlsAcceptor) -> io::Result<()> {
        match std::mem::replace(&mut self.stream, Stream::Upgrading) {
            Stream::Plain(tcp) => {
                let tls = acceptor.accept(tcp).await?;
                self.stream = Stream::Tls(Box::new(tls));
                Ok(())
            }
            other => {
                self.stream = other;
                Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "handshake on a non-plaintext connection",
                ))
            }
        }
    }

    /// Drive the orderly TLS shutdown (close_notify). No-op on a
    /// plaintext connection.
    pub(crate) async fn shutdown_tls(&mut self) -> io::Result<()> {
        match &mut self.stream {
            Stream::Tls(s) => s.shutdown().await,
            _ => Ok(()),
        }
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is mid-upgrade")
}

impl AsyncRead for Conn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().stream {
            Stream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            Stream::Upgrading => Poll::Ready(Err(not_connected())),
        }
    }
}

impl AsyncWrite for Conn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().stream {
            Stream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            Stream::Upgrading => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().stream {
            Stream::Plain(s) => Pin::new(s).poll_flush(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            Stream::Upgrading => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().stream {
            Stream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            Stream::Upgrading => Poll::Ready(Ok(())),
        }
    }
}
