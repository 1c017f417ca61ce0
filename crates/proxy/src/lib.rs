//! A forward HTTP/HTTPS proxy.
//!
//! Plain requests are relayed to the origin named by their Host header over
//! a fresh connection, one exchange per client connection; CONNECT requests
//! get an opaque bidirectional tunnel. The proxy never rewrites what it
//! forwards and never speaks for either side, apart from the tunnel's
//! `200 Connection established` reply.

pub mod error;
pub mod http;
pub mod relay;
pub mod tunnel;

use std::net::SocketAddr;

use bytes::BytesMut;
use log::{debug, warn};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};

pub use crate::error::ProxyError;
pub use crate::http::message::{HttpMessage, Target};
use crate::relay::Relay;
use crate::tunnel::Tunnel;

/// Read granularity for client requests and origin responses.
pub(crate) const READ_BUF_SIZE: usize = 8192;

pub struct ProxyServer {
    listener: TcpListener,
}

impl ProxyServer {
    /// Binds the listening socket. Must run inside a tokio runtime.
    pub fn bind<A: Into<SocketAddr>>(addr: A) -> Result<Self, ProxyError> {
        let addr = addr.into();
        let sock = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };

        sock.set_reuseaddr(true)?;
        sock.bind(addr)?;

        Ok(Self {
            listener: sock.listen(1024)?,
        })
    }

    /// The address actually bound, e.g. after asking for port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ProxyError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever, one task per connection. Connection
    /// failures die inside their task; only accept failures surface here.
    pub async fn serve(&self) -> Result<(), ProxyError> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            tokio::spawn(handle_connection(stream, peer));
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr) {
    debug!("accepted connection from {peer}");
    if let Err(err) = dispatch(stream, peer).await {
        warn!("connection from {peer}: {err}");
    }
}

/// Reads one request off the client and hands the stream to the matching
/// engine: CONNECT gets a tunnel, everything else a relay.
async fn dispatch(mut stream: TcpStream, peer: SocketAddr) -> Result<(), ProxyError> {
    let mut buf = BytesMut::with_capacity(READ_BUF_SIZE);
    if stream.read_buf(&mut buf).await? == 0 {
        debug!("{peer} closed before sending a request");
        return Ok(());
    }

    let request = HttpMessage::parse(buf.freeze())?;
    debug!("{peer}: `{}`", request.start_line());

    if request.is_connect() {
        Tunnel::new(stream, request).run().await
    } else {
        Relay::new(stream, request).run().await
    }
}

/// Opens the per-request origin connection.
pub(crate) async fn connect_origin(target: &Target) -> Result<TcpStream, ProxyError> {
    TcpStream::connect((target.host.as_str(), target.port))
        .await
        .map_err(|source| ProxyError::OriginConnect {
            target: target.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddrV4};

    use super::*;

    #[tokio::test]
    async fn bind_reports_ephemeral_port() {
        let server =
            ProxyServer::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }
}
