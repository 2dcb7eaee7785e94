//! Traffic key derivation.
//!
//! Derives concrete AEAD key + IV from a traffic secret for one of the four
//! key generations of a handshake.

use super::hkdf::hkdf_expand_label;
use super::CipherSuiteParams;
use tls13hs_types::TlsError;
use zeroize::Zeroize;

/// Which traffic-key generation a cipher spec belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficPhase {
    EarlyHandshake,
    EarlyApplicationData,
    Handshake,
    ApplicationData,
}

impl TrafficPhase {
    /// Label stem used in the key and IV expansions.
    pub fn label(self) -> &'static str {
        match self {
            TrafficPhase::EarlyHandshake => "early handshake key expansion",
            TrafficPhase::EarlyApplicationData => "early application data key expansion",
            TrafficPhase::Handshake => "handshake key expansion",
            TrafficPhase::ApplicationData => "application data key expansion",
        }
    }

    /// Early phases are always keyed from the client early traffic secret.
    pub fn is_early(self) -> bool {
        matches!(
            self,
            TrafficPhase::EarlyHandshake | TrafficPhase::EarlyApplicationData
        )
    }
}

/// Concrete traffic keys (AEAD key + IV) derived from a traffic secret.
pub struct TrafficKeys {
    /// AEAD encryption key.
    pub key: Vec<u8>,
    /// AEAD nonce/IV.
    pub iv: Vec<u8>,
}

impl Drop for TrafficKeys {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

impl TrafficKeys {
    /// ```text
    /// key = HKDF-Expand-Label(secret, phase + ", key", "", key_length)
    /// iv  = HKDF-Expand-Label(secret, phase + ", iv", "", iv_length)
    /// ```
    pub fn derive(
        params: &CipherSuiteParams,
        phase: TrafficPhase,
        traffic_secret: &[u8],
    ) -> Result<Self, TlsError> {
        let key_label = format!("{}, key", phase.label());
        let iv_label = format!("{}, iv", phase.label());
        let key = hkdf_expand_label(
            params.hash,
            traffic_secret,
            key_label.as_bytes(),
            b"",
            params.key_len,
        )?;
        let iv = hkdf_expand_label(
            params.hash,
            traffic_secret,
            iv_label.as_bytes(),
            b"",
            params.iv_len,
        )?;
        Ok(TrafficKeys { key, iv })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CipherSuite;

    #[test]
    fn test_traffic_key_lengths() {
        let params = CipherSuiteParams::from_suite(CipherSuite::TLS_AES_256_GCM_SHA384).unwrap();
        let tk = TrafficKeys::derive(&params, TrafficPhase::Handshake, &[0x42u8; 48]).unwrap();
        assert_eq!(tk.key.len(), 32);
        assert_eq!(tk.iv.len(), 12);
    }

    #[test]
    fn test_phases_give_distinct_keys() {
        let params = CipherSuiteParams::from_suite(CipherSuite::TLS_AES_128_GCM_SHA256).unwrap();
        let secret = [0x17u8; 32];
        let hs = TrafficKeys::derive(&params, TrafficPhase::Handshake, &secret).unwrap();
        let app = TrafficKeys::derive(&params, TrafficPhase::ApplicationData, &secret).unwrap();
        let early = TrafficKeys::derive(&params, TrafficPhase::EarlyHandshake, &secret).unwrap();
        assert_ne!(hs.key, app.key);
        assert_ne!(hs.iv, app.iv);
        assert_ne!(hs.key, early.key);

        let again = TrafficKeys::derive(&params, TrafficPhase::Handshake, &secret).unwrap();
        assert_eq!(hs.key, again.key);
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(TrafficPhase::Handshake.label(), "handshake key expansion");
        assert!(TrafficPhase::EarlyApplicationData.is_early());
        assert!(!TrafficPhase::ApplicationData.is_early());
    }
}
