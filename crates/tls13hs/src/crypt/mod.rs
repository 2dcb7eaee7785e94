//! Hashes, key derivation, record ciphers and the per-suite constants that
//! tie them together.

pub mod aead;
pub mod hkdf;
pub mod key_schedule;
pub mod keylog;
pub mod traffic_keys;
pub mod transcript;

use crate::CipherSuite;
use sha2::Digest;
use tls13hs_types::{CryptoError, TlsError};

/// Largest sequence number representable in a datagram record (48 bits).
pub const RECORD_SEQ_MAX: u64 = (1 << 48) - 1;

/// Fill a fixed-size array from the operating system RNG.
pub(crate) fn random_array<const N: usize>() -> Result<[u8; N], TlsError> {
    let mut out = [0u8; N];
    getrandom::getrandom(&mut out).map_err(|_| CryptoError::RandomFail)?;
    Ok(out)
}

/// PRF hash used by a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
}

impl HashAlgorithm {
    pub fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
        }
    }

    /// One-shot digest of `data`.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
        }
    }
}

/// Sizes and limits that follow from the negotiated suite.
#[derive(Debug, Clone)]
pub struct CipherSuiteParams {
    pub suite: CipherSuite,
    pub hash: HashAlgorithm,
    pub hash_len: usize,
    pub key_len: usize,
    pub iv_len: usize,
    pub tag_len: usize,
    /// Number of records that may be protected under one key.
    pub max_records: u64,
}

impl CipherSuiteParams {
    pub fn from_suite(suite: CipherSuite) -> Result<Self, TlsError> {
        match suite {
            CipherSuite::TLS_AES_128_GCM_SHA256 => Ok(Self {
                suite,
                hash: HashAlgorithm::Sha256,
                hash_len: 32,
                key_len: 16,
                iv_len: 12,
                tag_len: 16,
                max_records: 1 << 24,
            }),
            CipherSuite::TLS_AES_256_GCM_SHA384 => Ok(Self {
                suite,
                hash: HashAlgorithm::Sha384,
                hash_len: 48,
                key_len: 32,
                iv_len: 12,
                tag_len: 16,
                max_records: 1 << 24,
            }),
            CipherSuite::TLS_CHACHA20_POLY1305_SHA256 => Ok(Self {
                suite,
                hash: HashAlgorithm::Sha256,
                hash_len: 32,
                key_len: 32,
                iv_len: 12,
                tag_len: 16,
                max_records: RECORD_SEQ_MAX,
            }),
            _ => Err(TlsError::NoSharedCipherSuite),
        }
    }

    pub fn is_supported(suite: CipherSuite) -> bool {
        Self::from_suite(suite).is_ok()
    }
}

/// Key exchange group codepoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamedGroup(pub u16);

impl NamedGroup {
    pub const SECP256R1: Self = Self(0x0017);
    pub const SECP384R1: Self = Self(0x0018);
    pub const X25519: Self = Self(0x001D);
    pub const FFDHE2048: Self = Self(0x0100);
}

/// Signature algorithm codepoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureScheme(pub u16);

impl SignatureScheme {
    pub const RSA_PSS_RSAE_SHA256: Self = Self(0x0804);
    pub const ECDSA_SECP256R1_SHA256: Self = Self(0x0403);
    pub const ED25519: Self = Self(0x0807);
}
