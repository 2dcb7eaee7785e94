//! CertificateVerify content and peer authentication.
//!
//! Chain validation is delegated to a [`CertificateVerifier`]; the engine only
//! asks it whether to trust a chain and to check signatures made by the leaf.

use crate::crypt::{HashAlgorithm, SignatureScheme};
use tls13hs_types::TlsError;

const SERVER_CONTEXT: &[u8] = b"TLS 1.3, server CertificateVerify";
const CLIENT_CONTEXT: &[u8] = b"TLS 1.3, client CertificateVerify";

/// Build the value signed in CertificateVerify:
///
/// ```text
/// Hash(0x20 * 64 || context || 0x00 || combined_hashes)
/// ```
///
/// `combined_hashes` is the transcript hash joined with the resumption
/// context hash.
pub fn build_verify_content(
    hash: HashAlgorithm,
    combined_hashes: &[u8],
    is_server: bool,
) -> Vec<u8> {
    let context = if is_server {
        SERVER_CONTEXT
    } else {
        CLIENT_CONTEXT
    };
    let mut content = Vec::with_capacity(64 + context.len() + 1 + combined_hashes.len());
    content.extend_from_slice(&[0x20u8; 64]);
    content.extend_from_slice(context);
    content.push(0x00);
    content.extend_from_slice(combined_hashes);
    hash.digest(&content)
}

/// Outcome of asking the verifier about a peer's certificate chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Accepted,
    /// The decision is made asynchronously; the application resumes the
    /// handshake with `Connection::resume_after_cert_auth`.
    Pending,
    Rejected(String),
}

/// Verifies peer certificates and CertificateVerify signatures.
pub trait CertificateVerifier: Send + Sync {
    /// Decide whether to trust `chain` (leaf first).
    fn authenticate(&self, chain: &[Vec<u8>], server_name: Option<&str>) -> AuthDecision;

    /// Check a CertificateVerify signature made by the leaf certificate.
    fn verify_signature(
        &self,
        leaf: &[u8],
        scheme: SignatureScheme,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), TlsError> {
        verify_raw_public_key(leaf, scheme, message, signature)
    }
}

/// Treats each leaf "certificate" as a raw public key.
///
/// **With no pinned keys every chain is accepted**, so [`RawPublicKeyVerifier::new`]
/// authenticates nobody. This is the config default; pin keys with
/// [`RawPublicKeyVerifier::with_trusted`] for any real deployment.
#[derive(Debug, Clone, Default)]
pub struct RawPublicKeyVerifier {
    trusted: Vec<Vec<u8>>,
}

impl RawPublicKeyVerifier {
    /// Accepts any peer key. See the type docs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept leaves in `keys`.
    pub fn with_trusted(keys: Vec<Vec<u8>>) -> Self {
        Self { trusted: keys }
    }
}

impl CertificateVerifier for RawPublicKeyVerifier {
    fn authenticate(&self, chain: &[Vec<u8>], _server_name: Option<&str>) -> AuthDecision {
        let Some(leaf) = chain.first() else {
            return AuthDecision::Rejected("empty certificate chain".into());
        };
        if self.trusted.is_empty() || self.trusted.contains(leaf) {
            AuthDecision::Accepted
        } else {
            AuthDecision::Rejected("untrusted public key".into())
        }
    }
}

/// Verify `signature` over `message` with a raw Ed25519 or P-256 key.
pub fn verify_raw_public_key(
    public_key: &[u8],
    scheme: SignatureScheme,
    message: &[u8],
    signature: &[u8],
) -> Result<(), TlsError> {
    let bad = || TlsError::DecryptError("CertificateVerify: bad signature".into());
    match scheme {
        SignatureScheme::ED25519 => {
            use ed25519_dalek::Verifier;
            let pk: [u8; 32] = public_key
                .try_into()
                .map_err(|_| TlsError::BadCertificate("not an Ed25519 key".into()))?;
            let vk = ed25519_dalek::VerifyingKey::from_bytes(&pk)
                .map_err(|_| TlsError::BadCertificate("invalid Ed25519 key".into()))?;
            let sig = ed25519_dalek::Signature::from_slice(signature).map_err(|_| bad())?;
            vk.verify(message, &sig).map_err(|_| bad())
        }
        SignatureScheme::ECDSA_SECP256R1_SHA256 => {
            use p256::ecdsa::signature::Verifier;
            let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                .map_err(|_| TlsError::BadCertificate("invalid P-256 key".into()))?;
            let sig = p256::ecdsa::DerSignature::try_from(signature).map_err(|_| bad())?;
            vk.verify(message, &sig).map_err(|_| bad())
        }
        other => Err(TlsError::IllegalParameter(format!(
            "unsupported signature scheme {:#06x}",
            other.0
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::signing::PrivateKey;

    #[test]
    fn test_build_verify_content() {
        let combined = [0xabu8; 64];
        let server = build_verify_content(HashAlgorithm::Sha256, &combined, true);
        let client = build_verify_content(HashAlgorithm::Sha256, &combined, false);
        assert_eq!(server.len(), 32);
        assert_ne!(server, client);

        let mut raw = vec![0x20u8; 64];
        raw.extend_from_slice(b"TLS 1.3, server CertificateVerify");
        raw.push(0);
        raw.extend_from_slice(&combined);
        assert_eq!(server, HashAlgorithm::Sha256.digest(&raw));
    }

    #[test]
    fn test_sign_verify_ed25519() {
        let key = PrivateKey::Ed25519([3u8; 32]);
        let pk = key.public_key_bytes().unwrap();
        let msg = build_verify_content(HashAlgorithm::Sha256, &[1u8; 64], true);
        let sig = key.sign(&msg).unwrap();
        verify_raw_public_key(&pk, SignatureScheme::ED25519, &msg, &sig).unwrap();

        let mut bad = sig.clone();
        bad[0] ^= 1;
        assert!(matches!(
            verify_raw_public_key(&pk, SignatureScheme::ED25519, &msg, &bad),
            Err(TlsError::DecryptError(_))
        ));
    }

    #[test]
    fn test_sign_verify_p256() {
        let mut scalar = [0u8; 32];
        scalar[30] = 1;
        let key = PrivateKey::EcdsaP256(scalar);
        let pk = key.public_key_bytes().unwrap();
        let msg = build_verify_content(HashAlgorithm::Sha384, &[2u8; 96], false);
        let sig = key.sign(&msg).unwrap();
        verify_raw_public_key(&pk, SignatureScheme::ECDSA_SECP256R1_SHA256, &msg, &sig).unwrap();
        assert!(verify_raw_public_key(
            &pk,
            SignatureScheme::ECDSA_SECP256R1_SHA256,
            b"other message",
            &sig
        )
        .is_err());
    }

    #[test]
    fn test_raw_key_verifier() {
        let open = RawPublicKeyVerifier::new();
        assert_eq!(open.authenticate(&[vec![1; 32]], None), AuthDecision::Accepted);
        assert!(matches!(
            open.authenticate(&[], None),
            AuthDecision::Rejected(_)
        ));

        let pinned = RawPublicKeyVerifier::with_trusted(vec![vec![1; 32]]);
        assert_eq!(
            pinned.authenticate(&[vec![1; 32]], Some("example.com")),
            AuthDecision::Accepted
        );
        assert!(matches!(
            pinned.authenticate(&[vec![2; 32]], None),
            AuthDecision::Rejected(_)
        ));
    }
}
