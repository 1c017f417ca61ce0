//! Shared origin-server stand-ins for the proxy's integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// A scripted origin for relay tests.
///
/// Accepts exactly one connection, captures what the proxy forwarded up to
/// the end of the request head, then replies with the scripted segments,
/// pausing between them so responses arrive in deliberately partial reads,
/// and closes.
pub struct FakeOrigin {
    addr: SocketAddr,
    handle: JoinHandle<Vec<u8>>,
}

impl FakeOrigin {
    pub async fn serve(segments: Vec<Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let request = read_head(&mut sock).await;
            for (ix, segment) in segments.iter().enumerate() {
                if ix > 0 {
                    sleep(Duration::from_millis(20)).await;
                }
                sock.write_all(segment).await.unwrap();
                sock.flush().await.unwrap();
            }
            request
        });
        Self { addr, handle }
    }

    /// Convenience for the common single-write response.
    pub async fn serve_response(response: &[u8]) -> Self {
        Self::serve(vec![response.to_vec()]).await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Waits for the scripted exchange to finish and returns the request
    /// bytes the proxy forwarded.
    pub async fn received(self) -> Vec<u8> {
        self.handle.await.unwrap()
    }
}

/// An origin that echoes tunneled bytes back until its peer closes.
pub struct EchoOrigin {
    addr: SocketAddr,
    handle: JoinHandle<u64>,
}

impl EchoOrigin {
    pub async fn serve() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let (mut rd, mut wr) = sock.split();
            tokio::io::copy(&mut rd, &mut wr).await.unwrap()
        });
        Self { addr, handle }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bytes echoed before the tunnel went down.
    pub async fn echoed(self) -> u64 {
        self.handle.await.unwrap()
    }
}

async fn read_head(sock: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        if buf.windows(4).any(|window| window == b"\r\n\r\n") {
            return buf;
        }
        let n = sock.read(&mut chunk).await.unwrap();
        if n == 0 {
            return buf;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}
