//! Ephemeral (EC)DHE key exchange (X25519, secp256r1).

use crate::crypt::{random_array, NamedGroup};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use tls13hs_types::TlsError;
use zeroize::Zeroize;

/// Groups this engine can generate shares for.
pub const SUPPORTED_GROUPS: &[NamedGroup] = &[NamedGroup::X25519, NamedGroup::SECP256R1];

/// Inner key exchange state (variant per named group).
enum KeyExchangeInner {
    X25519(x25519_dalek::StaticSecret),
    EcdhP256(p256::SecretKey),
}

/// Ephemeral key exchange state for one handshake.
pub struct KeyExchange {
    group: NamedGroup,
    inner: KeyExchangeInner,
    public_key_bytes: Vec<u8>,
}

impl KeyExchange {
    /// Generate a fresh ephemeral keypair for `group`.
    pub fn generate(group: NamedGroup) -> Result<Self, TlsError> {
        match group {
            NamedGroup::X25519 => {
                let mut seed: [u8; 32] = random_array()?;
                let secret = x25519_dalek::StaticSecret::from(seed);
                seed.zeroize();
                let public = x25519_dalek::PublicKey::from(&secret);
                Ok(Self {
                    group,
                    public_key_bytes: public.as_bytes().to_vec(),
                    inner: KeyExchangeInner::X25519(secret),
                })
            }
            NamedGroup::SECP256R1 => {
                // Rejection-sample until the bytes form a valid scalar.
                let secret = loop {
                    let mut bytes: [u8; 32] = random_array()?;
                    let candidate = p256::SecretKey::from_slice(&bytes);
                    bytes.zeroize();
                    if let Ok(secret) = candidate {
                        break secret;
                    }
                };
                let public_key_bytes = secret
                    .public_key()
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec();
                Ok(Self {
                    group,
                    public_key_bytes,
                    inner: KeyExchangeInner::EcdhP256(secret),
                })
            }
            _ => Err(TlsError::HandshakeFailure(format!(
                "unsupported named group: {:#06x}",
                group.0
            ))),
        }
    }

    pub fn is_supported(group: NamedGroup) -> bool {
        SUPPORTED_GROUPS.contains(&group)
    }

    /// The named group for this key exchange.
    pub fn group(&self) -> NamedGroup {
        self.group
    }

    /// The public key bytes to include in the key_share extension.
    pub fn public_key_bytes(&self) -> &[u8] {
        &self.public_key_bytes
    }

    /// Compute the shared secret from the peer's public key.
    ///
    /// A malformed or low-order peer key is `illegal_parameter`.
    pub fn compute_shared_secret(&self, peer_public: &[u8]) -> Result<Vec<u8>, TlsError> {
        let bad_share = || TlsError::IllegalParameter("key_share: invalid public key".into());
        match &self.inner {
            KeyExchangeInner::X25519(secret) => {
                let peer: [u8; 32] = peer_public.try_into().map_err(|_| bad_share())?;
                let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(peer));
                if !shared.was_contributory() {
                    return Err(bad_share());
                }
                Ok(shared.as_bytes().to_vec())
            }
            KeyExchangeInner::EcdhP256(secret) => {
                let peer =
                    p256::PublicKey::from_sec1_bytes(peer_public).map_err(|_| bad_share())?;
                let shared =
                    p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
                Ok(shared.raw_secret_bytes().to_vec())
            }
        }
    }
}
