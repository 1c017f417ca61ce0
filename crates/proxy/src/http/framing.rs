use super::header::HeaderMap;

/// Last-chunk marker a chunked body ends with.
/// SPEC: RFC 9112 - 7.1. Chunked Transfer Coding
pub const CHUNK_TERMINATOR: &[u8] = b"0\r\n\r\n";

/// A Content-Length header whose value cannot be read as a byte count. The
/// one declared framing signal is unusable, and its presence rules out the
/// chunked fallback, so body completion cannot be decided at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Content-Length {value:?} is not a non-negative integer")]
pub struct IndeterminateFraming {
    pub value: String,
}

/// How the end of a message body is recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// The body ends after exactly this many bytes.
    ContentLength(u64),
    /// No declared length: the body ends with [`CHUNK_TERMINATOR`].
    Chunked,
}

impl Framing {
    /// Picks the framing policy from the message head.
    ///
    /// A parseable Content-Length selects byte counting; an absent one
    /// selects the chunked assumption. Present but unparseable is the one
    /// case with no usable policy.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, IndeterminateFraming> {
        match headers.get("Content-Length") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(length) => Ok(Self::ContentLength(length)),
                Err(_) => Err(IndeterminateFraming {
                    value: value.to_owned(),
                }),
            },
            None => Ok(Self::Chunked),
        }
    }

    /// Whether `body` already holds a complete message body under this
    /// policy. Counting never shrinks: once complete, more bytes keep it
    /// complete.
    pub fn is_complete(&self, body: &[u8]) -> bool {
        match self {
            Self::ContentLength(length) => body.len() as u64 >= *length,
            Self::Chunked => body.ends_with(CHUNK_TERMINATOR),
        }
    }
}

/// One-shot convenience over [`Framing::from_headers`] and
/// [`Framing::is_complete`].
pub fn body_complete(headers: &HeaderMap, body: &[u8]) -> Result<bool, IndeterminateFraming> {
    Ok(Framing::from_headers(headers)?.is_complete(body))
}
