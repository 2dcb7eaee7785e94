#![forbid(unsafe_code)]
#![doc = "TLS 1.3 (draft 14) handshake engine and record protection."]

pub mod alert;
pub mod config;
pub mod connection;
pub mod crypt;
pub mod extensions;
pub mod handshake;
pub mod record;
pub mod session;

pub use connection::Connection;

/// Draft revision of TLS 1.3 spoken on the wire.
pub const TLS13_DRAFT_VERSION: u16 = 14;

/// Record-layer version field for stream transport.
pub const RECORD_VERSION: u16 = 0x0301;

/// Record-layer version field for datagram transport (DTLS 1.0 encoding).
pub const DTLS_RECORD_VERSION: u16 = 0xfeff;

/// Legacy version carried in the ClientHello body.
pub const LEGACY_VERSION: u16 = 0x0303;

/// TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

impl TlsVersion {
    /// Encode the version the way it appears in hello messages.
    pub fn to_wire(self) -> u16 {
        match self {
            TlsVersion::Tls12 => 0x0303,
            TlsVersion::Tls13 => 0x7f00 | TLS13_DRAFT_VERSION,
        }
    }

    /// Decode a hello-message version; unknown drafts and versions give `None`.
    pub fn from_wire(value: u16) -> Option<Self> {
        match value {
            0x0303 => Some(TlsVersion::Tls12),
            v if v == 0x7f00 | TLS13_DRAFT_VERSION => Some(TlsVersion::Tls13),
            _ => None,
        }
    }
}

/// TLS cipher suite identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CipherSuite(pub u16);

impl CipherSuite {
    pub const TLS_AES_128_GCM_SHA256: Self = Self(0x1301);
    pub const TLS_AES_256_GCM_SHA384: Self = Self(0x1302);
    pub const TLS_CHACHA20_POLY1305_SHA256: Self = Self(0x1303);
}

/// The role of a TLS endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsRole {
    Client,
    Server,
}

/// Transport the records travel over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Stream,
    Datagram,
}
