//! Draft-14 key schedule.
//!
//! ```text
//!            0
//!            |
//!  PSK ->  HKDF-Extract = early secret --> client early traffic secret
//!            |
//! (EC)DHE -> HKDF-Extract = handshake secret --> {client,server} handshake traffic secret
//!            |
//!  0 ->    HKDF-Extract = master secret --> {client,server} application traffic secret
//!                                       --> resumption/exporter master secret
//! ```
//!
//! Every Derive-Secret call binds the combined hash: the transcript hash
//! followed by the hash of the resumption context.

use super::hkdf::{derive_secret, hkdf_expand_label, hkdf_extract, hmac_hash};
use super::HashAlgorithm;
use subtle::ConstantTimeEq;
use std::fmt;
use tls13hs_types::TlsError;
use zeroize::Zeroize;

/// A point in the key schedule. Zeroized on drop and never cloned.
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Secret(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({} bytes)", self.0.len())
    }
}

/// Which side a traffic secret belongs to; also the label prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSide {
    Client,
    Server,
}

impl SecretSide {
    fn label(self) -> &'static str {
        match self {
            SecretSide::Client => "client",
            SecretSide::Server => "server",
        }
    }
}

/// Current stage of the key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScheduleStage {
    Initial,
    EarlySecret,
    MasterSecret,
    Finished,
}

/// Key schedule state for one handshake.
///
/// Each derivation checks the stage it requires, so the schedule can only be
/// advanced in order.
pub struct KeySchedule {
    hash: HashAlgorithm,
    stage: KeyScheduleStage,
    current_secret: Option<Secret>,
    resumption_psk: Option<Secret>,
    resumption_context: Option<Vec<u8>>,
    resumption_context_hash: Vec<u8>,
}

impl Drop for KeySchedule {
    fn drop(&mut self) {
        if let Some(ctx) = self.resumption_context.as_mut() {
            ctx.zeroize();
        }
    }
}

impl KeySchedule {
    pub fn new(hash: HashAlgorithm) -> Self {
        Self {
            hash,
            stage: KeyScheduleStage::Initial,
            current_secret: None,
            resumption_psk: None,
            resumption_context: None,
            resumption_context_hash: Vec::new(),
        }
    }

    pub fn stage(&self) -> KeyScheduleStage {
        self.stage
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    pub fn hash_len(&self) -> usize {
        self.hash.output_len()
    }

    pub fn has_resumption_psk(&self) -> bool {
        self.resumption_psk.is_some()
    }

    fn require(&self, stage: KeyScheduleStage, op: &str) -> Result<&Secret, TlsError> {
        if self.stage != stage {
            return Err(TlsError::InternalError(format!("{op}: wrong stage")));
        }
        self.current_secret
            .as_ref()
            .ok_or_else(|| TlsError::InternalError(format!("{op}: no current secret")))
    }

    /// Install the PSK and resumption context recovered from a cached session.
    pub fn set_resumption(&mut self, psk: Secret, context: Vec<u8>) -> Result<(), TlsError> {
        if self.stage != KeyScheduleStage::Initial {
            return Err(TlsError::InternalError("set_resumption: wrong stage".into()));
        }
        self.resumption_psk = Some(psk);
        self.resumption_context = Some(context);
        Ok(())
    }

    /// Forget any resumption material and return to the initial stage.
    ///
    /// Used by a client that set up 0-RTT but whose server declined to resume.
    pub fn reset_without_resumption(&mut self) {
        self.current_secret = None;
        self.resumption_psk = None;
        if let Some(mut ctx) = self.resumption_context.take() {
            ctx.zeroize();
        }
        self.resumption_context_hash.clear();
        self.stage = KeyScheduleStage::Initial;
    }

    /// `transcript_hash || Hash(resumption_context)`.
    pub fn combined_hash(&self, transcript_hash: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(transcript_hash.len() + self.resumption_context_hash.len());
        out.extend_from_slice(transcript_hash);
        out.extend_from_slice(&self.resumption_context_hash);
        out
    }

    fn derive(
        &self,
        secret: &Secret,
        side: Option<SecretSide>,
        suffix: &str,
        transcript_hash: &[u8],
    ) -> Result<Secret, TlsError> {
        let label = match side {
            Some(side) => format!("{} {}", side.label(), suffix),
            None => suffix.to_string(),
        };
        let context = self.combined_hash(transcript_hash);
        derive_secret(self.hash, secret.as_bytes(), label.as_bytes(), &context).map(Secret)
    }

    /// Early secret from the PSK (or a zero string of hash length).
    ///
    /// With `client_hello_hash`, also returns the client early traffic secret.
    /// Transitions: Initial -> EarlySecret.
    pub fn compute_early_secrets(
        &mut self,
        client_hello_hash: Option<&[u8]>,
    ) -> Result<Option<Secret>, TlsError> {
        if self.stage != KeyScheduleStage::Initial {
            return Err(TlsError::InternalError(
                "compute_early_secrets: wrong stage".into(),
            ));
        }
        let zeros = vec![0u8; self.hash_len()];
        let psk = self.resumption_psk.take();
        let ikm = psk.as_ref().map(Secret::as_bytes).unwrap_or(&zeros);
        self.current_secret = Some(Secret(hkdf_extract(self.hash, &zeros, ikm)));
        drop(psk);

        let ctx = self.resumption_context.as_deref().unwrap_or(&zeros);
        self.resumption_context_hash = self.hash.digest(ctx);
        self.stage = KeyScheduleStage::EarlySecret;

        match client_hello_hash {
            Some(ch_hash) => {
                let early = self.require(KeyScheduleStage::EarlySecret, "early")?;
                self.derive(early, Some(SecretSide::Client), "early traffic secret", ch_hash)
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    /// Mix in the (EC)DHE secret and derive both handshake traffic secrets,
    /// then advance to the master secret.
    ///
    /// Returns `(client_hs_traffic_secret, server_hs_traffic_secret)`.
    /// Transitions: EarlySecret -> MasterSecret.
    pub fn compute_handshake_secrets(
        &mut self,
        dhe_secret: &[u8],
        server_hello_hash: &[u8],
    ) -> Result<(Secret, Secret), TlsError> {
        let early = self.require(KeyScheduleStage::EarlySecret, "compute_handshake_secrets")?;
        let handshake = Secret(hkdf_extract(self.hash, early.as_bytes(), dhe_secret));
        let client = self.derive(
            &handshake,
            Some(SecretSide::Client),
            "handshake traffic secret",
            server_hello_hash,
        )?;
        let server = self.derive(
            &handshake,
            Some(SecretSide::Server),
            "handshake traffic secret",
            server_hello_hash,
        )?;
        let zeros = vec![0u8; self.hash_len()];
        let master = Secret(hkdf_extract(self.hash, handshake.as_bytes(), &zeros));
        self.current_secret = Some(master);
        self.stage = KeyScheduleStage::MasterSecret;
        Ok((client, server))
    }

    /// Returns `(client_app_traffic_secret, server_app_traffic_secret)`.
    pub fn compute_application_secrets(
        &self,
        server_finished_hash: &[u8],
    ) -> Result<(Secret, Secret), TlsError> {
        let master = self.require(KeyScheduleStage::MasterSecret, "compute_application_secrets")?;
        let client = self.derive(
            master,
            Some(SecretSide::Client),
            "application traffic secret",
            server_finished_hash,
        )?;
        let server = self.derive(
            master,
            Some(SecretSide::Server),
            "application traffic secret",
            server_finished_hash,
        )?;
        Ok((client, server))
    }

    /// Returns `(resumption_master_secret, exporter_master_secret)` and drops
    /// the master secret. Transitions: MasterSecret -> Finished.
    pub fn compute_final_secrets(
        &mut self,
        client_finished_hash: &[u8],
    ) -> Result<(Secret, Secret), TlsError> {
        let master = self.require(KeyScheduleStage::MasterSecret, "compute_final_secrets")?;
        let rms = self.derive(master, None, "resumption master secret", client_finished_hash)?;
        let exporter = self.derive(master, None, "exporter master secret", client_finished_hash)?;
        self.current_secret = None;
        self.stage = KeyScheduleStage::Finished;
        Ok((rms, exporter))
    }
}

/// Derive `(resumption_psk, resumption_context)` from a cached resumption
/// master secret.
pub fn recover_wrapped_shared_secret(
    hash: HashAlgorithm,
    resumption_master_secret: &[u8],
) -> Result<(Secret, Vec<u8>), TlsError> {
    let len = hash.output_len();
    let psk = hkdf_expand_label(hash, resumption_master_secret, b"resumption psk", b"", len)?;
    let context =
        hkdf_expand_label(hash, resumption_master_secret, b"resumption context", b"", len)?;
    Ok((Secret(psk), context))
}

/// `HMAC(HKDF-Expand-Label(base_key, "finished", "", L), combined_hash)`
pub fn compute_finished(
    hash: HashAlgorithm,
    base_key: &[u8],
    combined_hash: &[u8],
) -> Result<Vec<u8>, TlsError> {
    let mut finished_key =
        hkdf_expand_label(hash, base_key, b"finished", b"", hash.output_len())?;
    let out = hmac_hash(hash, &finished_key, combined_hash);
    finished_key.zeroize();
    out
}

/// Check a received Finished body in constant time.
pub fn verify_finished(
    hash: HashAlgorithm,
    base_key: &[u8],
    combined_hash: &[u8],
    received: &[u8],
) -> Result<(), TlsError> {
    let expected = compute_finished(hash, base_key, combined_hash)?;
    if received.len() != expected.len() {
        return Err(TlsError::DecodeError("Finished: bad length".into()));
    }
    if !bool::from(expected.ct_eq(received)) {
        return Err(TlsError::DecryptError("Finished: MAC mismatch".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    fn run_schedule(hash: HashAlgorithm, dhe: &[u8]) -> (Secret, Secret, Secret, Secret) {
        let mut ks = KeySchedule::new(hash);
        ks.compute_early_secrets(None).unwrap();
        let sh_hash = hash.digest(b"ClientHello ServerHello");
        let (c_hs, s_hs) = ks.compute_handshake_secrets(dhe, &sh_hash).unwrap();
        let fin_hash = hash.digest(b"ClientHello ... server Finished");
        let (c_ap, s_ap) = ks.compute_application_secrets(&fin_hash).unwrap();
        (c_hs, s_hs, c_ap, s_ap)
    }

    #[test]
    fn test_schedule_symmetry() {
        let dhe = [0x5au8; 32];
        let client_side = run_schedule(HashAlgorithm::Sha256, &dhe);
        let server_side = run_schedule(HashAlgorithm::Sha256, &dhe);
        assert_eq!(client_side.0.as_bytes(), server_side.0.as_bytes());
        assert_eq!(client_side.1.as_bytes(), server_side.1.as_bytes());
        assert_eq!(client_side.2.as_bytes(), server_side.2.as_bytes());
        assert_eq!(client_side.3.as_bytes(), server_side.3.as_bytes());
        assert_ne!(client_side.2.as_bytes(), client_side.3.as_bytes());
        assert_ne!(client_side.0.as_bytes(), client_side.2.as_bytes());

        let other = run_schedule(HashAlgorithm::Sha256, &[0x5bu8; 32]);
        assert_ne!(other.2.as_bytes(), client_side.2.as_bytes());
    }

    #[test]
    fn test_early_secret_uses_zero_ikm() {
        let mut ks = KeySchedule::new(HashAlgorithm::Sha256);
        ks.compute_early_secrets(None).unwrap();
        let expected = hkdf_extract(HashAlgorithm::Sha256, &[0u8; 32], &[0u8; 32]);
        assert_eq!(ks.current_secret.as_ref().unwrap().as_bytes(), &expected[..]);
        // Well-known value of HKDF-Extract(0, 0) with SHA-256.
        assert_eq!(
            to_hex(&expected),
            "33ad0a1c607ec03b09e6cd9893680ce210adf300aa1f2660e1b22e10f170f92a"
        );
        assert_eq!(
            ks.resumption_context_hash,
            HashAlgorithm::Sha256.digest(&[0u8; 32])
        );
    }

    #[test]
    fn test_stage_enforcement() {
        let mut ks = KeySchedule::new(HashAlgorithm::Sha256);
        assert!(ks.compute_application_secrets(&[0u8; 32]).is_err());
        assert!(ks.compute_handshake_secrets(&[1u8; 32], &[0u8; 32]).is_err());
        ks.compute_early_secrets(None).unwrap();
        assert!(ks.compute_early_secrets(None).is_err());
        assert!(ks.compute_application_secrets(&[0u8; 32]).is_err());
        assert!(ks.compute_final_secrets(&[0u8; 32]).is_err());
        ks.compute_handshake_secrets(&[1u8; 32], &[0u8; 32]).unwrap();
        assert_eq!(ks.stage(), KeyScheduleStage::MasterSecret);
        ks.compute_final_secrets(&[0u8; 32]).unwrap();
        assert_eq!(ks.stage(), KeyScheduleStage::Finished);
        assert!(ks.compute_application_secrets(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_psk_changes_early_traffic_secret() {
        let ch_hash = HashAlgorithm::Sha256.digest(b"ClientHello");

        let mut plain = KeySchedule::new(HashAlgorithm::Sha256);
        let no_psk = plain.compute_early_secrets(Some(&ch_hash)).unwrap().unwrap();

        let (psk, ctx) = recover_wrapped_shared_secret(HashAlgorithm::Sha256, &[7u8; 32]).unwrap();
        assert_eq!(psk.len(), 32);
        assert_eq!(ctx.len(), 32);
        assert_ne!(psk.as_bytes(), &ctx[..]);
        let mut resumed = KeySchedule::new(HashAlgorithm::Sha256);
        resumed.set_resumption(psk, ctx).unwrap();
        assert!(resumed.has_resumption_psk());
        let with_psk = resumed.compute_early_secrets(Some(&ch_hash)).unwrap().unwrap();
        assert!(!resumed.has_resumption_psk());
        assert_ne!(no_psk.as_bytes(), with_psk.as_bytes());
        assert_eq!(with_psk.len(), 32);
    }

    #[test]
    fn test_reset_without_resumption() {
        let (psk, ctx) = recover_wrapped_shared_secret(HashAlgorithm::Sha256, &[7u8; 32]).unwrap();
        let mut ks = KeySchedule::new(HashAlgorithm::Sha256);
        ks.set_resumption(psk, ctx).unwrap();
        ks.compute_early_secrets(None).unwrap();
        ks.reset_without_resumption();
        assert_eq!(ks.stage(), KeyScheduleStage::Initial);
        ks.compute_early_secrets(None).unwrap();

        let mut fresh = KeySchedule::new(HashAlgorithm::Sha256);
        fresh.compute_early_secrets(None).unwrap();
        assert_eq!(
            ks.current_secret.as_ref().unwrap().as_bytes(),
            fresh.current_secret.as_ref().unwrap().as_bytes()
        );
        assert_eq!(ks.combined_hash(b"x"), fresh.combined_hash(b"x"));
    }

    #[test]
    fn test_combined_hash_layout() {
        let mut ks = KeySchedule::new(HashAlgorithm::Sha384);
        ks.compute_early_secrets(None).unwrap();
        let th = HashAlgorithm::Sha384.digest(b"messages");
        let combined = ks.combined_hash(&th);
        assert_eq!(combined.len(), 96);
        assert_eq!(&combined[..48], &th[..]);
    }

    #[test]
    fn test_finished_verify() {
        let base = [0x11u8; 32];
        let combined = [0x22u8; 64];
        let mac = compute_finished(HashAlgorithm::Sha256, &base, &combined).unwrap();
        assert_eq!(mac.len(), 32);
        verify_finished(HashAlgorithm::Sha256, &base, &combined, &mac).unwrap();

        let mut bad = mac.clone();
        bad[5] ^= 0x80;
        assert!(matches!(
            verify_finished(HashAlgorithm::Sha256, &base, &combined, &bad),
            Err(TlsError::DecryptError(_))
        ));
        assert!(matches!(
            verify_finished(HashAlgorithm::Sha256, &base, &combined, &mac[..31]),
            Err(TlsError::DecodeError(_))
        ));
    }

    #[test]
    fn test_final_secrets_distinct() {
        let mut ks = KeySchedule::new(HashAlgorithm::Sha256);
        ks.compute_early_secrets(None).unwrap();
        ks.compute_handshake_secrets(&[3u8; 32], &[0u8; 32]).unwrap();
        let (rms, exporter) = ks.compute_final_secrets(&[9u8; 32]).unwrap();
        assert_ne!(rms.as_bytes(), exporter.as_bytes());
        assert!(ks.current_secret.is_none());
    }
}
