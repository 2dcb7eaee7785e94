#![forbid(unsafe_code)]
#![doc = "Common error types for the tls13hs handshake engine."]

pub mod error;

pub use error::*;
