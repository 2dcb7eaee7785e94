//! State and helpers shared by the client and server handshakes.
//!
//! Both roles own a [`HandshakeCore`]: the transcript, the key schedule, the
//! traffic secrets that are still alive and the record layer whose cipher
//! specs the handshake swaps as it moves through the key phases.

use std::sync::Arc;

use log::{debug, trace};

use crate::alert::Alert;
use crate::config::TlsConfig;
use crate::crypt::key_schedule::{KeySchedule, Secret};
use crate::crypt::keylog;
use crate::crypt::traffic_keys::{TrafficKeys, TrafficPhase};
use crate::crypt::transcript::TranscriptHash;
use crate::crypt::{CipherSuiteParams, HashAlgorithm};
use crate::record::cipher_spec::CipherSpec;
use crate::record::{ContentType, Direction, RecordLayer};
use crate::TlsRole;
use tls13hs_types::TlsError;

use super::{HandshakeState, HandshakeType, NegotiatedParams, ZeroRttIgnore, ZeroRttState};

/// Traffic secrets kept until the cipher specs that need them are installed.
#[derive(Default)]
pub(crate) struct TrafficSecrets {
    pub(crate) client_early: Option<Secret>,
    pub(crate) client_handshake: Option<Secret>,
    pub(crate) server_handshake: Option<Secret>,
    pub(crate) client_application: Option<Secret>,
    pub(crate) server_application: Option<Secret>,
    pub(crate) resumption_master: Option<Secret>,
    pub(crate) exporter: Option<Secret>,
}

/// Which traffic secret keys a given phase and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SecretSlot {
    ClientEarly,
    ClientHandshake,
    ServerHandshake,
    ClientApplication,
    ServerApplication,
}

pub(crate) struct HandshakeCore {
    pub(crate) config: Arc<TlsConfig>,
    pub(crate) role: TlsRole,
    pub(crate) state: HandshakeState,
    pub(crate) transcript: TranscriptHash,
    pub(crate) key_schedule: Option<KeySchedule>,
    pub(crate) params: Option<CipherSuiteParams>,
    pub(crate) record: RecordLayer,
    pub(crate) secrets: TrafficSecrets,
    pub(crate) client_random: [u8; 32],
    pub(crate) negotiated: Option<NegotiatedParams>,
    pub(crate) zero_rtt: ZeroRttState,
    pub(crate) zero_rtt_ignore: ZeroRttIgnore,
    pub(crate) hello_retry: bool,
    /// Records ready to be handed to the transport.
    pub(crate) outbound: Vec<u8>,
}

impl HandshakeCore {
    pub(crate) fn new(config: Arc<TlsConfig>, role: TlsRole) -> Self {
        let record = RecordLayer::new(config.transport);
        let state = match role {
            TlsRole::Client => HandshakeState::Initial,
            TlsRole::Server => HandshakeState::WaitClientHello,
        };
        Self {
            config,
            role,
            state,
            // Replaced once the cipher suite (and so the PRF hash) is known.
            transcript: TranscriptHash::new(HashAlgorithm::Sha256),
            key_schedule: None,
            params: None,
            record,
            secrets: TrafficSecrets::default(),
            client_random: [0u8; 32],
            negotiated: None,
            zero_rtt: ZeroRttState::None,
            zero_rtt_ignore: ZeroRttIgnore::None,
            hello_retry: false,
            outbound: Vec::new(),
        }
    }

    pub(crate) fn is_server(&self) -> bool {
        self.role == TlsRole::Server
    }

    pub(crate) fn set_state(&mut self, next: HandshakeState) {
        debug!(
            "{:?} handshake: {} -> {}",
            self.role,
            self.state.name(),
            next.name()
        );
        self.state = next;
    }

    pub(crate) fn params(&self) -> Result<&CipherSuiteParams, TlsError> {
        self.params
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("cipher suite not negotiated".into()))
    }

    pub(crate) fn hash(&self) -> Result<HashAlgorithm, TlsError> {
        self.params().map(|p| p.hash)
    }

    pub(crate) fn key_schedule(&self) -> Result<&KeySchedule, TlsError> {
        self.key_schedule
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("no key schedule".into()))
    }

    pub(crate) fn key_schedule_mut(&mut self) -> Result<&mut KeySchedule, TlsError> {
        self.key_schedule
            .as_mut()
            .ok_or_else(|| TlsError::InternalError("no key schedule".into()))
    }

    pub(crate) fn negotiated_mut(&mut self) -> Result<&mut NegotiatedParams, TlsError> {
        self.negotiated
            .as_mut()
            .ok_or_else(|| TlsError::InternalError("no negotiated parameters".into()))
    }

    /// Select the PRF of `params` for the transcript and the cipher specs.
    pub(crate) fn set_cipher_suite(&mut self, params: CipherSuiteParams) {
        self.transcript.set_hash(params.hash);
        self.params = Some(params);
    }

    /// Transcript hash joined with the resumption context hash.
    pub(crate) fn combined_hash(&self, transcript_hash: &[u8]) -> Result<Vec<u8>, TlsError> {
        Ok(self.key_schedule()?.combined_hash(transcript_hash))
    }

    /// Append a handshake message to the transcript and queue it under the
    /// current write spec.
    pub(crate) fn send_handshake(&mut self, msg: &[u8]) -> Result<(), TlsError> {
        self.transcript.update(msg);
        self.send_untracked(msg)
    }

    /// Queue a handshake message that is not part of the transcript.
    pub(crate) fn send_untracked(&mut self, msg: &[u8]) -> Result<(), TlsError> {
        if let Some(ty) = msg.first().copied().and_then(HandshakeType::from_u8) {
            trace!("{:?} sends {:?} ({} bytes)", self.role, ty, msg.len());
        }
        let wire = self.record.seal(ContentType::Handshake, msg)?;
        self.outbound.extend_from_slice(&wire);
        Ok(())
    }

    pub(crate) fn send_alert(&mut self, alert: Alert) -> Result<(), TlsError> {
        let wire = self.record.seal(ContentType::Alert, &alert.encode())?;
        self.outbound.extend_from_slice(&wire);
        Ok(())
    }

    /// Emit a key-log line for `secret` when a callback is configured.
    pub(crate) fn log_secret(&self, label: &str, secret: &Secret) {
        keylog::log_key(&self.config, label, &self.client_random, secret.as_bytes());
    }

    /// Derive keys for `phase` and make them the current spec for `direction`.
    ///
    /// Early phases use the client early traffic secret. Otherwise the
    /// client's secret is used exactly when `is_server XOR writing`. The new
    /// spec takes the next epoch. With `delete_secret` the traffic secret is
    /// dropped once the keys exist.
    pub(crate) fn set_cipher_spec(
        &mut self,
        direction: Direction,
        phase: TrafficPhase,
        delete_secret: bool,
    ) -> Result<(), TlsError> {
        let use_client = self.is_server() ^ (direction == Direction::Write);
        let slot = match phase {
            TrafficPhase::EarlyHandshake | TrafficPhase::EarlyApplicationData => {
                SecretSlot::ClientEarly
            }
            TrafficPhase::Handshake if use_client => SecretSlot::ClientHandshake,
            TrafficPhase::Handshake => SecretSlot::ServerHandshake,
            TrafficPhase::ApplicationData if use_client => SecretSlot::ClientApplication,
            TrafficPhase::ApplicationData => SecretSlot::ServerApplication,
        };
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("cipher suite not negotiated".into()))?;
        let secret = match slot {
            SecretSlot::ClientEarly => &mut self.secrets.client_early,
            SecretSlot::ClientHandshake => &mut self.secrets.client_handshake,
            SecretSlot::ServerHandshake => &mut self.secrets.server_handshake,
            SecretSlot::ClientApplication => &mut self.secrets.client_application,
            SecretSlot::ServerApplication => &mut self.secrets.server_application,
        };
        let keys = {
            let s = secret
                .as_ref()
                .ok_or_else(|| TlsError::InternalError(format!("{slot:?} secret missing")))?;
            TrafficKeys::derive(params, phase, s.as_bytes())?
        };
        let epoch = self
            .record
            .spec(direction)
            .epoch()
            .checked_add(1)
            .ok_or_else(|| TlsError::InternalError("epoch space exhausted".into()))?;
        let max_records = self.config.record_limit.unwrap_or(params.max_records);
        let spec = CipherSpec::new(
            params,
            phase,
            epoch,
            &keys,
            self.record.transport(),
            max_records,
        )?;
        if delete_secret {
            *secret = None;
        }
        debug!(
            "{:?} installs {:?} {:?} spec, epoch {}",
            self.role, direction, phase, epoch
        );
        self.record.install(direction, Arc::new(spec));
        Ok(())
    }

    /// Fall back to the plaintext spec; used on datagram transport so both
    /// sides agree on epoch numbers after 0-RTT.
    pub(crate) fn reset_to_null(&mut self, direction: Direction) {
        debug!("{:?} resets {:?} spec to null", self.role, direction);
        self.record.reset_to_null(direction);
    }

    /// Mark the handshake complete and run the completion callback.
    pub(crate) fn complete(&mut self) -> Result<(), TlsError> {
        let zero_rtt = self.zero_rtt;
        let negotiated = self.negotiated_mut()?;
        negotiated.zero_rtt = zero_rtt;
        self.set_state(HandshakeState::IdleHandshake);
        if let (Some(cb), Some(negotiated)) =
            (&self.config.on_handshake_complete, &self.negotiated)
        {
            cb(negotiated);
        }
        Ok(())
    }

    /// Report the server's 0-RTT decision to the application.
    pub(crate) fn notify_early_data(&self, accepted: bool) {
        debug!("{:?}: 0-RTT accepted = {accepted}", self.role);
        if let Some(cb) = &self.config.on_early_data {
            cb(accepted);
        }
    }

    /// `HKDF-Expand-Label(exporter_secret, label, Hash(context), length)`.
    pub(crate) fn export_keying_material(
        &self,
        label: &[u8],
        context: &[u8],
        length: usize,
    ) -> Result<Vec<u8>, TlsError> {
        let hash = self.hash()?;
        let exporter = self
            .secrets
            .exporter
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("exporter secret not available".into()))?;
        crate::crypt::hkdf::hkdf_expand_label(
            hash,
            exporter.as_bytes(),
            label,
            &hash.digest(context),
            length,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CipherSuite;

    fn core(role: TlsRole) -> HandshakeCore {
        let config = TlsConfig::builder().role(role).build();
        let mut core = HandshakeCore::new(Arc::new(config), role);
        let params = CipherSuiteParams::from_suite(CipherSuite::TLS_AES_128_GCM_SHA256).unwrap();
        core.set_cipher_suite(params);
        core
    }

    #[test]
    fn test_initial_states() {
        let c = core(TlsRole::Client);
        assert_eq!(c.state, HandshakeState::Initial);
        let s = core(TlsRole::Server);
        assert_eq!(s.state, HandshakeState::WaitClientHello);
        assert!(s.record.spec(Direction::Read).is_null());
    }

    #[test]
    fn test_set_cipher_spec_epochs_and_delete() {
        let mut c = core(TlsRole::Client);
        c.secrets.client_handshake = Some(Secret::new(vec![1; 32]));
        c.secrets.server_handshake = Some(Secret::new(vec![2; 32]));

        c.set_cipher_spec(Direction::Write, TrafficPhase::Handshake, false)
            .unwrap();
        c.set_cipher_spec(Direction::Read, TrafficPhase::Handshake, true)
            .unwrap();
        assert_eq!(c.record.spec(Direction::Write).epoch(), 1);
        assert_eq!(c.record.spec(Direction::Read).epoch(), 1);
        assert!(c.secrets.client_handshake.is_some());
        assert!(c.secrets.server_handshake.is_none());

        // deleted secret cannot key another spec
        assert!(c
            .set_cipher_spec(Direction::Read, TrafficPhase::Handshake, false)
            .is_err());
    }

    #[test]
    fn test_client_write_matches_server_read() {
        let mut c = core(TlsRole::Client);
        let mut s = core(TlsRole::Server);
        for side in [&mut c, &mut s] {
            side.secrets.client_handshake = Some(Secret::new(vec![5; 32]));
            side.secrets.server_handshake = Some(Secret::new(vec![6; 32]));
        }
        c.set_cipher_spec(Direction::Write, TrafficPhase::Handshake, false)
            .unwrap();
        s.set_cipher_spec(Direction::Read, TrafficPhase::Handshake, false)
            .unwrap();

        let wire = c
            .record
            .seal(ContentType::Handshake, b"\x14\x00\x00\x00")
            .unwrap();
        let (opened, used) = s.record.open(&wire).unwrap();
        assert_eq!(used, wire.len());
        let (ct, body) = opened.unwrap();
        assert_eq!(ct, ContentType::Handshake);
        assert_eq!(body, b"\x14\x00\x00\x00");
    }

    #[test]
    fn test_record_limit_override() {
        let config = TlsConfig::builder().record_limit(3).build();
        let mut c = HandshakeCore::new(Arc::new(config), TlsRole::Client);
        c.set_cipher_suite(
            CipherSuiteParams::from_suite(CipherSuite::TLS_AES_128_GCM_SHA256).unwrap(),
        );
        c.secrets.client_early = Some(Secret::new(vec![7; 32]));
        c.set_cipher_spec(Direction::Write, TrafficPhase::EarlyHandshake, false)
            .unwrap();
        assert_eq!(c.record.spec(Direction::Write).max_records(), 3);
    }

    #[test]
    fn test_send_handshake_updates_transcript() {
        let mut c = core(TlsRole::Client);
        let before = c.transcript.len();
        c.send_handshake(&[20, 0, 0, 1, 0xaa]).unwrap();
        assert_eq!(c.transcript.len(), before + 5);
        // plaintext record: 5-byte header + message
        assert_eq!(c.outbound.len(), 10);
        c.send_untracked(&[4, 0, 0, 0]).unwrap();
        assert_eq!(c.transcript.len(), before + 5);
    }
}
