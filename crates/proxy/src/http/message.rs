use std::fmt;

use bytes::{Bytes, BytesMut};
use memchr::memmem;

use super::header::HeaderMap;

/// Blank line separating the head from the body.
/// SPEC: RFC 9112 - 2.1. Message Format
pub(crate) const HEAD_END: &[u8] = b"\r\n\r\n";

/// Port assumed when the Host header carries none.
const DEFAULT_PORT: u16 = 80;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("message contains no CRLF separator structure")]
    MissingSeparator,
    #[error("message start line is empty")]
    MissingStartLine,
    #[error("header line {line} has no `: ` separator")]
    MalformedHeader { line: usize },
    #[error("message head is not valid UTF-8")]
    NotText,
    #[error("port {value:?} in the Host header is not a valid port number")]
    InvalidPort { value: String },
}

/// Where a request wants to go, taken from its Host header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    /// Splits a Host value on its optional `:port` suffix.
    /// SPEC: RFC 9110 - 7.2. Host and :authority
    fn parse(value: &str) -> Result<Self, ParseError> {
        match value.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| ParseError::InvalidPort {
                    value: port.to_owned(),
                })?;
                Ok(Self {
                    host: host.to_owned(),
                    port,
                })
            }
            None => Ok(Self {
                host: value.to_owned(),
                port: DEFAULT_PORT,
            }),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One parsed HTTP message, request or response.
///
/// A message is created from a single buffer snapshot and is immutable from
/// then on. The buffer it came from is retained so a request can be relayed
/// byte-for-byte, without any re-serialization drift. The body holds only
/// whatever body bytes the snapshot already contained; deciding whether more
/// are outstanding is the framing policy's job, not the parser's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMessage {
    start_line: String,
    headers: HeaderMap,
    body: Bytes,
    original: Bytes,
    target: Option<Target>,
}

impl HttpMessage {
    /// Parses one message out of `buffer`.
    ///
    /// The head is everything before the first blank line (or the whole
    /// buffer when there is none), split into CRLF-terminated lines: the
    /// first is the start line, each remaining one splits on its first
    /// `": "` into a header field. The head must decode as UTF-8; the body
    /// stays raw bytes.
    pub fn parse(buffer: Bytes) -> Result<Self, ParseError> {
        if memmem::find(&buffer, b"\r\n").is_none() {
            return Err(ParseError::MissingSeparator);
        }

        let (head, body) = match memmem::find(&buffer, HEAD_END) {
            Some(at) => (buffer.slice(..at), buffer.slice(at + HEAD_END.len()..)),
            None => (buffer.clone(), Bytes::new()),
        };

        let head = std::str::from_utf8(&head).map_err(|_| ParseError::NotText)?;
        let mut lines = head.split("\r\n");

        let start_line = lines.next().unwrap_or_default();
        if start_line.is_empty() {
            return Err(ParseError::MissingStartLine);
        }

        let mut headers = HeaderMap::new();
        for (ix, line) in lines.enumerate() {
            if line.is_empty() {
                // Trailing artifact of a head without a blank-line terminator
                continue;
            }
            let (name, value) = line
                .split_once(": ")
                .ok_or(ParseError::MalformedHeader { line: ix + 2 })?;
            headers.insert(name, value);
        }

        let target = match headers.get("Host") {
            Some(host) => Some(Target::parse(host)?),
            None => None,
        };

        Ok(Self {
            start_line: start_line.to_owned(),
            headers,
            body,
            original: buffer,
            target,
        })
    }

    /// Rebuilds the wire form: start line, headers in map order, blank line,
    /// body. Lossless against `parse` for messages without duplicate header
    /// names.
    pub fn serialize(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.original.len());
        out.extend_from_slice(self.start_line.as_bytes());
        out.extend_from_slice(b"\r\n");
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out.freeze()
    }

    pub fn start_line(&self) -> &str {
        &self.start_line
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Body bytes present in the parsed snapshot; possibly a prefix of the
    /// full body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The exact bytes this message was parsed from.
    pub fn original_bytes(&self) -> &[u8] {
        &self.original
    }

    /// `None` when the message carries no Host header.
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// First whitespace-delimited token of the start line. For a response
    /// this is the protocol version; callers only ever dispatch on request
    /// methods.
    pub fn method(&self) -> &str {
        self.start_line.split_whitespace().next().unwrap_or_default()
    }

    pub fn is_connect(&self) -> bool {
        self.method() == "CONNECT"
    }
}
