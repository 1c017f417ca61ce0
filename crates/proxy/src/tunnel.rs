use log::{debug, trace};
use tokio::io::{self, AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::connect_origin;
use crate::error::ProxyError;
use crate::http::message::HttpMessage;

/// Reply sent to the client once the origin leg of a tunnel is up. Nothing
/// else the proxy ever says is its own; this line is the one exception.
pub const ESTABLISHED_REPLY: &[u8] = concat!(
    "HTTP/1.1 200 Connection established\r\n",
    "Proxy-Agent: ",
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION"),
    "\r\n\r\n"
)
.as_bytes();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TunnelState {
    AwaitConnect,
    OriginConnected,
    Relaying,
    Closed,
}

/// An opaque byte pipe for CONNECT requests.
///
/// After the established reply, the proxy stops interpreting anything: bytes
/// move both directions unmodified (typically a TLS handshake and onwards).
/// Either peer closing its end tears the whole tunnel down; there is no
/// half-close.
pub struct Tunnel<C> {
    client: C,
    request: HttpMessage,
    state: TunnelState,
}

impl<C> Tunnel<C>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(client: C, request: HttpMessage) -> Self {
        Self {
            client,
            request,
            state: TunnelState::AwaitConnect,
        }
    }

    fn advance(&mut self, next: TunnelState) {
        trace!("tunnel: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Drives the tunnel to its end. Both streams are dropped on every path
    /// out; a client whose origin was unreachable sees only the close,
    /// never a reply.
    pub async fn run(mut self) -> Result<(), ProxyError> {
        let result = self.pump().await;
        self.advance(TunnelState::Closed);
        result
    }

    async fn pump(&mut self) -> Result<(), ProxyError> {
        let target = self
            .request
            .target()
            .ok_or(ProxyError::MissingHostHeader)?
            .clone();
        let mut origin = connect_origin(&target).await?;
        self.advance(TunnelState::OriginConnected);
        debug!("tunnel: connected to {target}");

        self.client.write_all(ESTABLISHED_REPLY).await?;
        self.advance(TunnelState::Relaying);

        let (mut client_rd, mut client_wr) = io::split(&mut self.client);
        let (mut origin_rd, mut origin_wr) = origin.split();

        // Whichever direction ends first, EOF or error, wins the select and
        // the other one is dropped mid-flight.
        tokio::select! {
            upstream = io::copy(&mut client_rd, &mut origin_wr) => match upstream {
                Ok(n) => debug!("tunnel: client closed after {n} bytes to {target}"),
                Err(err) => debug!("tunnel: client-to-origin ended: {err}"),
            },
            downstream = io::copy(&mut origin_rd, &mut client_wr) => match downstream {
                Ok(n) => debug!("tunnel: origin closed after {n} bytes to the client"),
                Err(err) => debug!("tunnel: origin-to-client ended: {err}"),
            },
        }

        let _ = origin_wr.shutdown().await;
        let _ = client_wr.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, duplex};

    use super::*;

    #[test]
    fn established_reply_literal() {
        assert!(
            ESTABLISHED_REPLY
                .starts_with(b"HTTP/1.1 200 Connection established\r\nProxy-Agent: ")
        );
        assert!(ESTABLISHED_REPLY.ends_with(b"\r\n\r\n"));
    }

    #[tokio::test]
    async fn missing_host_closes_without_reply() {
        let request = HttpMessage::parse(Bytes::from_static(
            b"CONNECT example.com:443 HTTP/1.1\r\n\r\n",
        ))
        .unwrap();

        let (client, mut peer) = duplex(1024);
        let err = Tunnel::new(client, request).run().await.unwrap_err();
        assert!(matches!(err, ProxyError::MissingHostHeader));

        let mut out = Vec::new();
        peer.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }
}
