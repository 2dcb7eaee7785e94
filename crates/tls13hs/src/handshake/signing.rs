//! CertificateVerify signing and certificate selection.

use std::fmt;

use crate::crypt::SignatureScheme;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use tls13hs_types::{CryptoError, TlsError};
use zeroize::Zeroize;

/// A signing key held by an endpoint.
#[derive(Clone)]
pub enum PrivateKey {
    /// 32-byte Ed25519 seed.
    Ed25519([u8; 32]),
    /// 32-byte P-256 private scalar.
    EcdsaP256([u8; 32]),
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        match self {
            PrivateKey::Ed25519(k) | PrivateKey::EcdsaP256(k) => k.zeroize(),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivateKey::Ed25519(_) => f.write_str("PrivateKey::Ed25519(<redacted>)"),
            PrivateKey::EcdsaP256(_) => f.write_str("PrivateKey::EcdsaP256(<redacted>)"),
        }
    }
}

impl PrivateKey {
    /// The only signature scheme this key can produce.
    pub fn scheme(&self) -> SignatureScheme {
        match self {
            PrivateKey::Ed25519(_) => SignatureScheme::ED25519,
            PrivateKey::EcdsaP256(_) => SignatureScheme::ECDSA_SECP256R1_SHA256,
        }
    }

    /// Public key in the form [`RawPublicKeyVerifier`](super::verify::RawPublicKeyVerifier)
    /// expects as a leaf certificate: 32 raw bytes for Ed25519, an
    /// uncompressed SEC1 point for P-256.
    pub fn public_key_bytes(&self) -> Result<Vec<u8>, TlsError> {
        match self {
            PrivateKey::Ed25519(seed) => {
                let sk = ed25519_dalek::SigningKey::from_bytes(seed);
                Ok(sk.verifying_key().to_bytes().to_vec())
            }
            PrivateKey::EcdsaP256(scalar) => {
                let sk = p256::SecretKey::from_slice(scalar)
                    .map_err(|_| TlsError::from(CryptoError::InvalidKey))?;
                Ok(sk.public_key().to_encoded_point(false).as_bytes().to_vec())
            }
        }
    }

    /// Sign `message` (the CertificateVerify content).
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, TlsError> {
        match self {
            PrivateKey::Ed25519(seed) => {
                use ed25519_dalek::Signer;
                let sk = ed25519_dalek::SigningKey::from_bytes(seed);
                Ok(sk.sign(message).to_bytes().to_vec())
            }
            PrivateKey::EcdsaP256(scalar) => {
                use p256::ecdsa::signature::Signer;
                let sk = p256::ecdsa::SigningKey::from_slice(scalar)
                    .map_err(|_| TlsError::from(CryptoError::InvalidKey))?;
                let sig: p256::ecdsa::DerSignature = sk.sign(message);
                Ok(sig.as_bytes().to_vec())
            }
        }
    }
}

/// A certificate chain together with the key for its leaf.
#[derive(Clone)]
pub struct CertifiedKey {
    /// Leaf first.
    pub chain: Vec<Vec<u8>>,
    pub key: PrivateKey,
}

impl fmt::Debug for CertifiedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertifiedKey")
            .field("chain_len", &self.chain.len())
            .field("scheme", &self.key.scheme())
            .finish_non_exhaustive()
    }
}

impl CertifiedKey {
    /// A chain holding just the raw public key of `key`.
    pub fn from_raw_key(key: PrivateKey) -> Result<Self, TlsError> {
        let leaf = key.public_key_bytes()?;
        Ok(Self {
            chain: vec![leaf],
            key,
        })
    }
}

/// Pick the first configured certificate whose scheme the peer accepts.
pub fn select_certificate<'a>(
    certificates: &'a [CertifiedKey],
    peer_schemes: &[SignatureScheme],
) -> Result<(&'a CertifiedKey, SignatureScheme), TlsError> {
    certificates
        .iter()
        .find(|c| peer_schemes.contains(&c.key.scheme()))
        .map(|c| (c, c.key.scheme()))
        .ok_or_else(|| TlsError::HandshakeFailure("no certificate matches signature_algorithms".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ed_key() -> CertifiedKey {
        CertifiedKey::from_raw_key(PrivateKey::Ed25519([7u8; 32])).unwrap()
    }

    fn p256_key() -> CertifiedKey {
        let mut scalar = [0u8; 32];
        scalar[31] = 9;
        CertifiedKey::from_raw_key(PrivateKey::EcdsaP256(scalar)).unwrap()
    }

    #[test]
    fn test_public_key_shapes() {
        assert_eq!(ed_key().chain[0].len(), 32);
        let p = p256_key();
        assert_eq!(p.chain[0].len(), 65);
        assert_eq!(p.chain[0][0], 0x04);
    }

    #[test]
    fn test_select_certificate() {
        let certs = vec![p256_key(), ed_key()];
        let (c, scheme) = select_certificate(&certs, &[SignatureScheme::ED25519]).unwrap();
        assert_eq!(scheme, SignatureScheme::ED25519);
        assert_eq!(c.chain[0].len(), 32);

        let (_, scheme) = select_certificate(
            &certs,
            &[SignatureScheme::ED25519, SignatureScheme::ECDSA_SECP256R1_SHA256],
        )
        .unwrap();
        assert_eq!(scheme, SignatureScheme::ECDSA_SECP256R1_SHA256);

        assert!(matches!(
            select_certificate(&certs, &[SignatureScheme::RSA_PSS_RSAE_SHA256]),
            Err(TlsError::HandshakeFailure(_))
        ));
    }

    #[test]
    fn test_invalid_p256_scalar() {
        let zero = PrivateKey::EcdsaP256([0u8; 32]);
        assert!(zero.sign(b"msg").is_err());
        assert!(zero.public_key_bytes().is_err());
    }

    #[test]
    fn test_debug_redacts() {
        let k = PrivateKey::Ed25519([0x42; 32]);
        let s = format!("{k:?}");
        assert!(s.contains("redacted"));
        assert!(!s.contains("42"));
    }
}
