use bytes::{Bytes, BytesMut};
use log::{debug, trace};
use memchr::memmem;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProxyError;
use crate::http::framing::Framing;
use crate::http::message::{HEAD_END, HttpMessage};
use crate::{READ_BUF_SIZE, connect_origin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayState {
    AwaitRequest,
    RequestReceived,
    OriginConnected,
    ForwardingResponse,
    Closed,
}

/// One plain-HTTP exchange: a parsed request in, a fresh origin connection,
/// the buffered response out, then both ends are done.
///
/// The request goes to the origin byte-for-byte as received; the response is
/// accumulated in full before the client sees any of it, so the client gets
/// exactly one write no matter how the origin dribbled it out.
pub struct Relay<C> {
    client: C,
    request: HttpMessage,
    state: RelayState,
}

impl<C> Relay<C>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    /// The caller has already read and parsed the request off `client`.
    pub fn new(client: C, request: HttpMessage) -> Self {
        trace!(
            "relay: {:?} -> {:?}",
            RelayState::AwaitRequest,
            RelayState::RequestReceived
        );
        Self {
            client,
            request,
            state: RelayState::RequestReceived,
        }
    }

    fn advance(&mut self, next: RelayState) {
        trace!("relay: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Drives the exchange to its end. The client stream is shut down on
    /// every path out, success or not, and the origin connection never
    /// outlives this call.
    pub async fn run(mut self) -> Result<(), ProxyError> {
        let result = self.exchange().await;
        let _ = self.client.shutdown().await;
        self.advance(RelayState::Closed);
        result
    }

    async fn exchange(&mut self) -> Result<(), ProxyError> {
        let target = self
            .request
            .target()
            .ok_or(ProxyError::MissingHostHeader)?
            .clone();
        let mut origin = connect_origin(&target).await?;
        self.advance(RelayState::OriginConnected);
        debug!("relay: connected to {target}");

        origin.write_all(self.request.original_bytes()).await?;

        let response = read_response(&mut origin).await?;
        self.advance(RelayState::ForwardingResponse);
        self.client.write_all(&response).await?;
        debug!(
            "relay: forwarded {} response bytes for `{}`",
            response.len(),
            self.request.start_line()
        );
        Ok(())
    }
}

/// Accumulates one full response from the origin.
///
/// Reads until the head separator shows up, picks the framing policy from
/// the parsed head, then keeps reading until the body is complete. The
/// origin closing counts as end-of-message and whatever has arrived is
/// returned; if it closes before anything head-shaped arrived, the parse
/// failure surfaces instead.
async fn read_response<R>(origin: &mut R) -> Result<Bytes, ProxyError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_BUF_SIZE);

    let head_len = loop {
        if let Some(at) = memmem::find(&buf, HEAD_END) {
            break at + HEAD_END.len();
        }
        buf.reserve(READ_BUF_SIZE);
        if origin.read_buf(&mut buf).await? == 0 {
            break buf.len();
        }
    };

    // Framing wants the parsed head; the snapshot also catches heads the
    // origin never finished.
    let head = HttpMessage::parse(Bytes::copy_from_slice(&buf))?;
    debug!("relay: origin answered `{}`", head.start_line());
    let framing = Framing::from_headers(head.headers())?;

    while !framing.is_complete(&buf[head_len..]) {
        buf.reserve(READ_BUF_SIZE);
        if origin.read_buf(&mut buf).await? == 0 {
            debug!("relay: origin closed early, treating the body as complete");
            break;
        }
    }

    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::duplex;
    use tokio::net::TcpListener;
    use tokio::time::sleep;

    use super::*;

    fn request(raw: &str) -> HttpMessage {
        HttpMessage::parse(Bytes::from(raw.to_string())).unwrap()
    }

    #[tokio::test]
    async fn missing_host_fails_before_dialing() {
        let (client, mut peer) = duplex(1024);
        let err = Relay::new(client, request("GET / HTTP/1.1\r\n\r\n"))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::MissingHostHeader));

        // The client side only ever sees the connection close.
        let mut out = Vec::new();
        peer.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn forwards_request_bytes_verbatim() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let origin = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                .await
                .unwrap();
            buf.truncate(n);
            buf
        });

        let raw = format!(
            "GET /path?q=1 HTTP/1.1\r\nHost: 127.0.0.1:{}\r\nUser-Agent: relay-test\r\n\r\n",
            addr.port()
        );
        let (client, mut peer) = duplex(4096);
        Relay::new(client, request(&raw)).run().await.unwrap();

        let received = origin.await.unwrap();
        assert_eq!(received, raw.as_bytes());

        let mut out = Vec::new();
        peer.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
    }

    #[tokio::test]
    async fn response_assembled_across_partial_writes() {
        let (mut wr, mut rd) = duplex(4096);
        tokio::spawn(async move {
            wr.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nab")
                .await
                .unwrap();
            sleep(Duration::from_millis(10)).await;
            wr.write_all(b"c").await.unwrap();
        });

        let bytes = read_response(&mut rd).await.unwrap();
        assert_eq!(&bytes[..], b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc");
    }

    #[tokio::test]
    async fn chunked_response_completes_on_terminator() {
        // The writer stays open: completion has to come from the terminator.
        let (mut wr, mut rd) = duplex(4096);
        wr.write_all(b"HTTP/1.1 200 OK\r\n\r\n4\r\nwiki\r\n0\r\n\r\n")
            .await
            .unwrap();

        let bytes = read_response(&mut rd).await.unwrap();
        assert_eq!(&bytes[..], b"HTTP/1.1 200 OK\r\n\r\n4\r\nwiki\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn zero_content_length_needs_no_body() {
        let (mut wr, mut rd) = duplex(1024);
        wr.write_all(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();

        let bytes = read_response(&mut rd).await.unwrap();
        assert_eq!(&bytes[..], b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n");
    }

    #[tokio::test]
    async fn origin_close_ends_an_underfilled_body() {
        let (mut wr, mut rd) = duplex(1024);
        wr.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort")
            .await
            .unwrap();
        drop(wr);

        let bytes = read_response(&mut rd).await.unwrap();
        assert_eq!(&bytes[..], b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort");
    }

    #[tokio::test]
    async fn unparseable_content_length_is_rejected() {
        let (mut wr, mut rd) = duplex(1024);
        wr.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: banana\r\n\r\n")
            .await
            .unwrap();

        let err = read_response(&mut rd).await.unwrap_err();
        assert!(matches!(err, ProxyError::IndeterminateFraming(_)));
    }

    #[tokio::test]
    async fn origin_close_before_any_head_is_malformed() {
        let (mut wr, mut rd) = duplex(1024);
        wr.write_all(b"HTTP").await.unwrap();
        drop(wr);

        let err = read_response(&mut rd).await.unwrap_err();
        assert!(matches!(err, ProxyError::Malformed(_)));
    }
}
