/// Cryptographic provider errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid argument")]
    InvalidArg,
    #[error("invalid key")]
    InvalidKey,
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("invalid iv length")]
    InvalidIvLength,
    #[error("aead: tag verification failed")]
    AeadTagVerifyFail,
    #[error("aead: encryption failed")]
    AeadEncryptFail,
    #[error("kdf: derived key length overflow")]
    KdfDkLenOverflow,
    #[error("ecc: invalid public key")]
    EccInvalidPublicKey,
    #[error("signature verification failed")]
    SignatureVerifyFail,
    #[error("random generation failed")]
    RandomFail,
}

/// TLS protocol errors.
///
/// Every protocol-level variant maps onto one alert description; see
/// `tls13hs::alert::AlertDescription::from_error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TlsError {
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),
    #[error("decode error: {0}")]
    DecodeError(String),
    #[error("illegal parameter: {0}")]
    IllegalParameter(String),
    #[error("handshake failure: {0}")]
    HandshakeFailure(String),
    #[error("missing extension: {0}")]
    MissingExtension(String),
    #[error("unsupported extension: {0}")]
    UnsupportedExtension(String),
    #[error("unsupported protocol version")]
    ProtocolVersion,
    #[error("no shared cipher suite")]
    NoSharedCipherSuite,
    #[error("bad record mac")]
    BadRecordMac,
    #[error("bad block padding")]
    BadPadding,
    #[error("decrypt error: {0}")]
    DecryptError(String),
    #[error("bad certificate: {0}")]
    BadCertificate(String),
    #[error("record sequence number space exhausted")]
    TooManyRecords,
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("operation would block")]
    WouldBlock,
    #[error("alert received: {0}")]
    AlertReceived(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

impl TlsError {
    /// True for errors that leave the connection usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TlsError::WouldBlock)
    }
}
