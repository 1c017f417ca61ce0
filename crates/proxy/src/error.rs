use std::io;

use crate::http::framing::IndeterminateFraming;
use crate::http::message::{ParseError, Target};

/// Errors that end a single proxied connection.
///
/// Every variant stays local to the connection that produced it: the serving
/// loop logs it, the sockets involved get dropped, and nothing is written
/// back to the client — the proxy never synthesizes an error response.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("malformed message: {0}")]
    Malformed(#[from] ParseError),
    #[error("request carries no Host header to resolve the origin from")]
    MissingHostHeader,
    #[error(transparent)]
    IndeterminateFraming(#[from] IndeterminateFraming),
    #[error("connecting to origin {target} failed: {source}")]
    OriginConnect {
        target: Target,
        source: io::Error,
    },
    #[error(transparent)]
    Transport(#[from] io::Error),
}
