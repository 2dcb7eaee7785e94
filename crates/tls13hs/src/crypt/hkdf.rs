//! HKDF primitives with the draft-14 label encoding.
//!
//! Extract/Expand come from the `hkdf` crate; the only TLS-specific part is
//! the `HkdfLabel` structure, whose label prefix is `"TLS 1.3, "`.

use super::HashAlgorithm;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384};
use tls13hs_types::{CryptoError, TlsError};

const LABEL_PREFIX: &[u8] = b"TLS 1.3, ";

/// One-shot HMAC: `HMAC(key, data)`.
pub fn hmac_hash(hash: HashAlgorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>, TlsError> {
    match hash {
        HashAlgorithm::Sha256 => {
            let mut mac =
                Hmac::<Sha256>::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        HashAlgorithm::Sha384 => {
            let mut mac =
                Hmac::<Sha384>::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
    }
}

/// HKDF-Extract(salt, IKM) -> PRK.
///
/// An empty salt behaves as `hash_len` zero bytes.
pub fn hkdf_extract(hash: HashAlgorithm, salt: &[u8], ikm: &[u8]) -> Vec<u8> {
    match hash {
        HashAlgorithm::Sha256 => Hkdf::<Sha256>::extract(Some(salt), ikm).0.to_vec(),
        HashAlgorithm::Sha384 => Hkdf::<Sha384>::extract(Some(salt), ikm).0.to_vec(),
    }
}

/// HKDF-Expand(PRK, info, length) -> OKM.
pub fn hkdf_expand(
    hash: HashAlgorithm,
    prk: &[u8],
    info: &[u8],
    length: usize,
) -> Result<Vec<u8>, TlsError> {
    let mut okm = vec![0u8; length];
    match hash {
        HashAlgorithm::Sha256 => Hkdf::<Sha256>::from_prk(prk)
            .map_err(|_| CryptoError::InvalidKey)?
            .expand(info, &mut okm)
            .map_err(|_| CryptoError::KdfDkLenOverflow)?,
        HashAlgorithm::Sha384 => Hkdf::<Sha384>::from_prk(prk)
            .map_err(|_| CryptoError::InvalidKey)?
            .expand(info, &mut okm)
            .map_err(|_| CryptoError::KdfDkLenOverflow)?,
    }
    Ok(okm)
}

/// Encode the draft-14 HkdfLabel:
///
/// ```text
/// struct {
///     uint16 length;
///     opaque label<9..255>;      // "TLS 1.3, " + label
///     opaque hash_value<0..255>;
/// } HkdfLabel;
/// ```
fn encode_hkdf_label(length: u16, label: &[u8], context: &[u8]) -> Result<Vec<u8>, TlsError> {
    let full_label_len = LABEL_PREFIX.len() + label.len();
    if full_label_len > 255 || context.len() > 255 {
        return Err(CryptoError::InvalidArg.into());
    }
    let mut buf = Vec::with_capacity(2 + 1 + full_label_len + 1 + context.len());
    buf.extend_from_slice(&length.to_be_bytes());
    buf.push(full_label_len as u8);
    buf.extend_from_slice(LABEL_PREFIX);
    buf.extend_from_slice(label);
    buf.push(context.len() as u8);
    buf.extend_from_slice(context);
    Ok(buf)
}

/// HKDF-Expand-Label(Secret, Label, HashValue, Length).
pub fn hkdf_expand_label(
    hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    length: usize,
) -> Result<Vec<u8>, TlsError> {
    let length16 = u16::try_from(length).map_err(|_| CryptoError::KdfDkLenOverflow)?;
    let hkdf_label = encode_hkdf_label(length16, label, context)?;
    hkdf_expand(hash, secret, &hkdf_label, length)
}

/// Derive-Secret(Secret, Label, Messages).
///
/// `context` is the combined handshake hash (transcript hash followed by the
/// resumption context hash); the output is always one hash length.
pub fn derive_secret(
    hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
) -> Result<Vec<u8>, TlsError> {
    hkdf_expand_label(hash, secret, label, context, hash.output_len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn to_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    // RFC 5869 Test Case 1 (SHA-256)
    #[test]
    fn test_hkdf_extract_sha256() {
        let ikm = hex("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b");
        let salt = hex("000102030405060708090a0b0c");
        let prk = hkdf_extract(HashAlgorithm::Sha256, &salt, &ikm);
        assert_eq!(
            to_hex(&prk),
            "077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5"
        );
    }

    #[test]
    fn test_hkdf_expand_sha256() {
        let prk = hex("077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5");
        let info = hex("f0f1f2f3f4f5f6f7f8f9");
        let okm = hkdf_expand(HashAlgorithm::Sha256, &prk, &info, 42).unwrap();
        assert_eq!(
            to_hex(&okm),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
        );
    }

    // RFC 5869 Test Case 3 (zero-length salt/info)
    #[test]
    fn test_hkdf_extract_empty_salt() {
        let ikm = hex("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b");
        let prk = hkdf_extract(HashAlgorithm::Sha256, &[], &ikm);
        assert_eq!(
            to_hex(&prk),
            "19ef24a32c717b167f33a91d6f648bdf96596776afdb6377ac434c1c293ccb04"
        );
        // An all-zero salt of hash length is the same key to HMAC.
        let prk_zero = hkdf_extract(HashAlgorithm::Sha256, &[0u8; 32], &ikm);
        assert_eq!(prk, prk_zero);
    }

    // RFC 4231 Test Case 1
    #[test]
    fn test_hmac_sha256() {
        let key = hex("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b");
        let mac = hmac_hash(HashAlgorithm::Sha256, &key, b"Hi There").unwrap();
        assert_eq!(
            to_hex(&mac),
            "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7"
        );
    }

    #[test]
    fn test_encode_hkdf_label() {
        let label = encode_hkdf_label(16, b"key", b"").unwrap();
        assert_eq!(&label[..2], &[0x00, 0x10]);
        assert_eq!(label[2], 12);
        assert_eq!(&label[3..15], b"TLS 1.3, key");
        assert_eq!(label[15], 0);
        assert_eq!(label.len(), 16);
    }

    #[test]
    fn test_encode_hkdf_label_rejects_long_context() {
        assert!(encode_hkdf_label(32, b"finished", &[0u8; 256]).is_err());
    }

    #[test]
    fn test_hkdf_expand_too_large() {
        let prk = vec![0x42; 32];
        assert!(hkdf_expand(HashAlgorithm::Sha256, &prk, b"", 255 * 32 + 1).is_err());
    }

    #[test]
    fn test_derive_secret_uses_hash_len() {
        let secret = vec![0xBB; 48];
        let combined = vec![0xCC; 96];
        let derived = derive_secret(
            HashAlgorithm::Sha384,
            &secret,
            b"client handshake traffic secret",
            &combined,
        )
        .unwrap();
        assert_eq!(derived.len(), 48);

        let other = derive_secret(
            HashAlgorithm::Sha384,
            &secret,
            b"server handshake traffic secret",
            &combined,
        )
        .unwrap();
        assert_ne!(derived, other);
    }
}
