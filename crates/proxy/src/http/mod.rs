pub mod framing;
pub mod header;
pub mod message;

pub use framing::{Framing, IndeterminateFraming, body_complete};
pub use header::HeaderMap;
pub use message::{HttpMessage, ParseError, Target};
