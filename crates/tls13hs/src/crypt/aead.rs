//! Record protection ciphers for the three supported suites.

use crate::CipherSuite;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;
use tls13hs_types::{CryptoError, TlsError};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// The AEAD seam used by [`CipherSpec`](crate::record::cipher_spec::CipherSpec).
///
/// Sealed output is `ciphertext || tag`; `decrypt` expects the same layout.
pub trait TlsAead: Send + Sync {
    fn encrypt(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, TlsError>;

    fn decrypt(&self, nonce: &[u8], aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, TlsError>;

    fn tag_size(&self) -> usize;
}

/// One keyed cipher instance. Boxed because the key schedules differ in size.
pub enum SuiteAead {
    Aes128Gcm(Box<Aes128Gcm>),
    Aes256Gcm(Box<Aes256Gcm>),
    ChaCha20Poly1305(Box<ChaCha20Poly1305>),
}

fn keyed<C: KeyInit>(key: &[u8], expected: usize) -> Result<Box<C>, TlsError> {
    if key.len() != expected {
        return Err(CryptoError::InvalidKeyLength {
            expected,
            got: key.len(),
        }
        .into());
    }
    C::new_from_slice(key)
        .map(Box::new)
        .map_err(|_| CryptoError::InvalidKey.into())
}

impl SuiteAead {
    pub fn new(suite: CipherSuite, key: &[u8]) -> Result<Self, TlsError> {
        Ok(match suite {
            CipherSuite::TLS_AES_128_GCM_SHA256 => Self::Aes128Gcm(keyed(key, 16)?),
            CipherSuite::TLS_AES_256_GCM_SHA384 => Self::Aes256Gcm(keyed(key, 32)?),
            CipherSuite::TLS_CHACHA20_POLY1305_SHA256 => Self::ChaCha20Poly1305(keyed(key, 32)?),
            _ => return Err(TlsError::NoSharedCipherSuite),
        })
    }
}

impl TlsAead for SuiteAead {
    fn encrypt(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, TlsError> {
        if nonce.len() != NONCE_LEN {
            return Err(CryptoError::InvalidIvLength.into());
        }
        let payload = Payload { msg: plaintext, aad };
        let sealed = match self {
            Self::Aes128Gcm(c) => c.encrypt(nonce.into(), payload),
            Self::Aes256Gcm(c) => c.encrypt(nonce.into(), payload),
            Self::ChaCha20Poly1305(c) => c.encrypt(nonce.into(), payload),
        };
        sealed.map_err(|_| CryptoError::AeadEncryptFail.into())
    }

    fn decrypt(&self, nonce: &[u8], aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, TlsError> {
        if nonce.len() != NONCE_LEN {
            return Err(CryptoError::InvalidIvLength.into());
        }
        let payload = Payload { msg: sealed, aad };
        let opened = match self {
            Self::Aes128Gcm(c) => c.decrypt(nonce.into(), payload),
            Self::Aes256Gcm(c) => c.decrypt(nonce.into(), payload),
            Self::ChaCha20Poly1305(c) => c.decrypt(nonce.into(), payload),
        };
        opened.map_err(|_| CryptoError::AeadTagVerifyFail.into())
    }

    fn tag_size(&self) -> usize {
        TAG_LEN
    }
}

pub fn create_aead(suite: CipherSuite, key: &[u8]) -> Result<Box<dyn TlsAead>, TlsError> {
    Ok(Box::new(SuiteAead::new(suite, key)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_each_suite() {
        for (suite, key_len) in [
            (CipherSuite::TLS_AES_128_GCM_SHA256, 16),
            (CipherSuite::TLS_AES_256_GCM_SHA384, 32),
            (CipherSuite::TLS_CHACHA20_POLY1305_SHA256, 32),
        ] {
            let aead = create_aead(suite, &vec![0x42; key_len]).unwrap();
            let nonce = [7u8; 12];
            let sealed = aead.encrypt(&nonce, b"hdr", b"hello draft 14").unwrap();
            assert_eq!(sealed.len(), 14 + aead.tag_size());
            assert_eq!(aead.decrypt(&nonce, b"hdr", &sealed).unwrap(), b"hello draft 14");
            // aad is authenticated
            assert!(aead.decrypt(&nonce, b"HDR", &sealed).is_err());
        }
    }

    #[test]
    fn test_tamper_detected() {
        let aead = create_aead(CipherSuite::TLS_CHACHA20_POLY1305_SHA256, &[0x42; 32]).unwrap();
        let mut sealed = aead.encrypt(&[1; 12], b"", b"payload").unwrap();
        sealed[0] ^= 1;
        assert_eq!(
            aead.decrypt(&[1; 12], b"", &sealed).unwrap_err(),
            TlsError::CryptoError(CryptoError::AeadTagVerifyFail)
        );
    }

    #[test]
    fn test_key_and_nonce_lengths_checked() {
        assert!(create_aead(CipherSuite::TLS_AES_256_GCM_SHA384, &[0u8; 16]).is_err());
        assert!(create_aead(CipherSuite::TLS_AES_128_GCM_SHA256, &[0u8; 32]).is_err());
        assert!(create_aead(CipherSuite(0x1304), &[0u8; 16]).is_err());
        let aead = create_aead(CipherSuite::TLS_AES_256_GCM_SHA384, &[0u8; 32]).unwrap();
        assert!(aead.encrypt(&[0u8; 8], b"", b"x").is_err());
    }
}
