//! TLS 1.3 client handshake state machine.
//!
//! ClientHello [+ early Finished + 0-RTT data] -> (HelloRetryRequest ->
//! ClientHello) -> ServerHello -> {EncryptedExtensions} ->
//! [{CertificateRequest}] {Certificate} {CertificateVerify} -> {Finished},
//! after which the client sends its second flight:
//! [end_of_early_data] [{Certificate} {CertificateVerify}] {Finished}.

use std::sync::Arc;

use log::debug;
use zeroize::Zeroize;

use crate::alert::Alert;
use crate::config::TlsConfig;
use crate::crypt::key_schedule::{
    compute_finished, recover_wrapped_shared_secret, verify_finished, KeySchedule,
    KeyScheduleStage,
};
use crate::crypt::keylog;
use crate::crypt::traffic_keys::TrafficPhase;
use crate::crypt::{random_array, CipherSuiteParams, NamedGroup};
use crate::extensions::{check_extensions, find_extension, ExtensionType};
use crate::record::Direction;
use crate::session::{now_secs, TlsSession};
use crate::{CipherSuite, TlsRole, TlsVersion, Transport};
use tls13hs_types::TlsError;

use super::codec::{
    decode_certificate, decode_certificate_request, decode_certificate_verify,
    decode_encrypted_extensions, decode_finished, decode_hello_retry_request,
    decode_new_session_ticket, decode_server_hello, encode_certificate,
    encode_certificate_verify, encode_client_hello, encode_finished, CertificateMsg,
    CertificateRequestMsg, CertificateVerifyMsg, ClientHello,
};
use super::common::HandshakeCore;
use super::extensions_codec::{
    build_alpn, build_early_data, build_key_share_ch, build_pre_shared_key_ch,
    build_server_name, build_signature_algorithms, build_supported_groups,
    build_supported_versions_ch, parse_alpn_selected, parse_early_data, parse_key_share_sh,
    parse_pre_shared_key_sh, parse_ticket_early_data_info, KeyShareEntry,
};
use super::key_exchange::KeyExchange;
use super::verify::{build_verify_content, AuthDecision};
use super::{
    check_state, AuthMode, HandshakeState, HandshakeType, NegotiatedParams, ZeroRttState,
    PSK_AUTH, PSK_DHE_KE,
};

/// Client handshake state machine.
pub(crate) struct ClientHandshake {
    pub(crate) core: HandshakeCore,
    key_exchange: Option<KeyExchange>,
    offered_suites: Vec<CipherSuite>,
    /// Session offered through pre_shared_key.
    offered_session: Option<TlsSession>,
    /// ALPN of the session whose 0-RTT data was sent.
    early_alpn: Option<Vec<u8>>,
    cert_request: Option<CertificateRequestMsg>,
    pub(crate) server_certs: Vec<Vec<u8>>,
    pub(crate) cert_auth_pending: bool,
    /// The server Finished was verified while authentication was pending.
    second_round_deferred: bool,
    server_finished_hash: Vec<u8>,
    /// Most recent ticket received from the server.
    pub(crate) received_session: Option<TlsSession>,
}

impl ClientHandshake {
    pub(crate) fn new(config: Arc<TlsConfig>) -> Self {
        Self {
            core: HandshakeCore::new(config, TlsRole::Client),
            key_exchange: None,
            offered_suites: Vec::new(),
            offered_session: None,
            early_alpn: None,
            cert_request: None,
            server_certs: Vec::new(),
            cert_auth_pending: false,
            second_round_deferred: false,
            server_finished_hash: Vec::new(),
            received_session: None,
        }
    }

    /// Send the first ClientHello and, when resuming with 0-RTT, the early
    /// Finished. Leaves the early application data spec installed.
    pub(crate) fn start(&mut self) -> Result<(), TlsError> {
        if self.core.state != HandshakeState::Initial {
            return Err(TlsError::InternalError("handshake already started".into()));
        }
        let config = self.core.config.clone();
        self.offered_suites = config
            .cipher_suites
            .iter()
            .copied()
            .filter(|s| CipherSuiteParams::is_supported(*s))
            .collect();
        if self.offered_suites.is_empty() {
            return Err(TlsError::NoSharedCipherSuite);
        }
        let group = config
            .supported_groups
            .first()
            .copied()
            .ok_or_else(|| TlsError::HandshakeFailure("no groups configured".into()))?;

        self.core.client_random = random_array()?;
        self.offered_session = self.find_session()?;
        let early = self.may_send_early_data();
        self.send_client_hello(group, early)?;
        if early {
            self.send_early_finished()?;
        }
        self.core.set_state(HandshakeState::WaitServerHello);
        Ok(())
    }

    /// A session from the config, or else from the cache by server name.
    fn find_session(&self) -> Result<Option<TlsSession>, TlsError> {
        let config = &self.core.config;
        let candidate = match (&config.resumption_session, &config.session_cache, &config.server_name) {
            (Some(session), _, _) => Some(session.clone()),
            (None, Some(cache), Some(name)) => cache
                .lock()
                .map_err(|_| TlsError::InternalError("session cache lock poisoned".into()))?
                .get(name.as_bytes())
                .cloned(),
            _ => None,
        };
        Ok(candidate.filter(|s| {
            let usable = s.version == TlsVersion::Tls13
                && self.offered_suites.contains(&s.cipher_suite)
                && !s.is_expired(now_secs());
            if !usable {
                debug!("cached session is not resumable");
            }
            usable
        }))
    }

    fn may_send_early_data(&self) -> bool {
        let config = &self.core.config;
        match &self.offered_session {
            Some(session) if config.enable_0rtt && session.allow_early_data => {
                match &session.alpn_protocol {
                    Some(p) => config.alpn_protocols.contains(p),
                    None => true,
                }
            }
            _ => false,
        }
    }

    fn send_client_hello(&mut self, group: NamedGroup, early: bool) -> Result<(), TlsError> {
        let config = self.core.config.clone();
        let kx = KeyExchange::generate(group)?;
        let mut extensions = vec![
            build_supported_versions_ch(&[TlsVersion::Tls13]),
            build_supported_groups(&config.supported_groups),
            build_signature_algorithms(&config.signature_algorithms),
            build_key_share_ch(&[KeyShareEntry {
                group,
                key_exchange: kx.public_key_bytes().to_vec(),
            }]),
        ];
        if let Some(name) = &config.server_name {
            extensions.push(build_server_name(name));
        }
        if !config.alpn_protocols.is_empty() {
            extensions.push(build_alpn(&config.alpn_protocols));
        }
        if early {
            extensions.push(build_early_data());
        }
        // pre_shared_key goes last
        if let Some(session) = &self.offered_session {
            extensions.push(build_pre_shared_key_ch(&[session.ticket.clone()]));
        }
        let ch = ClientHello {
            random: self.core.client_random,
            legacy_session_id: Vec::new(),
            cipher_suites: self.offered_suites.clone(),
            extensions,
        };
        self.core.send_handshake(&encode_client_hello(&ch))?;
        self.key_exchange = Some(kx);
        Ok(())
    }

    /// Key the early flight from the offered session and send the early
    /// Finished, which is not part of the main transcript.
    fn send_early_finished(&mut self) -> Result<(), TlsError> {
        let session = self
            .offered_session
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("0-RTT without a session".into()))?;
        let params = CipherSuiteParams::from_suite(session.cipher_suite)?;
        let hash = params.hash;
        self.core.set_cipher_suite(params);

        let mut ks = KeySchedule::new(hash);
        let (psk, context) = recover_wrapped_shared_secret(hash, &session.resumption_master_secret)?;
        ks.set_resumption(psk, context)?;
        let ch_hash = self.core.transcript.current_hash();
        let early = ks
            .compute_early_secrets(Some(&ch_hash))?
            .ok_or_else(|| TlsError::InternalError("no early traffic secret".into()))?;
        let verify_data = compute_finished(hash, early.as_bytes(), &ks.combined_hash(&ch_hash))?;
        self.core.log_secret(keylog::CLIENT_EARLY_TRAFFIC_SECRET, &early);
        self.core.secrets.client_early = Some(early);
        self.core.key_schedule = Some(ks);
        self.early_alpn = session.alpn_protocol.clone();

        self.core
            .set_cipher_spec(Direction::Write, TrafficPhase::EarlyHandshake, false)?;
        let mark = self.core.transcript.len();
        self.core.send_handshake(&encode_finished(&verify_data))?;
        self.core.transcript.truncate(mark);
        self.core
            .set_cipher_spec(Direction::Write, TrafficPhase::EarlyApplicationData, true)?;
        self.core.zero_rtt = ZeroRttState::Sent;
        debug!("client sent early Finished, 0-RTT data may follow");
        Ok(())
    }

    /// Dispatch one handshake message. `mark` is the transcript length
    /// before this message was added.
    pub(crate) fn process_message(
        &mut self,
        msg_type: HandshakeType,
        body: &[u8],
        mark: usize,
    ) -> Result<(), TlsError> {
        use HandshakeState as S;
        let state = self.core.state;
        match msg_type {
            HandshakeType::HelloRetryRequest => {
                check_state(state, &[S::WaitServerHello], msg_type)?;
                self.process_hello_retry_request(body)
            }
            HandshakeType::ServerHello => {
                check_state(state, &[S::WaitServerHello], msg_type)?;
                self.process_server_hello(body)
            }
            HandshakeType::EncryptedExtensions => {
                check_state(state, &[S::WaitEncryptedExtensions], msg_type)?;
                self.process_encrypted_extensions(body)
            }
            HandshakeType::CertificateRequest => {
                check_state(state, &[S::WaitCertRequest], msg_type)?;
                self.process_certificate_request(body)
            }
            HandshakeType::Certificate => {
                check_state(state, &[S::WaitCertRequest, S::WaitServerCert], msg_type)?;
                self.process_certificate(body)
            }
            HandshakeType::CertificateVerify => {
                check_state(state, &[S::WaitCertVerify], msg_type)?;
                self.process_certificate_verify(body, mark)
            }
            HandshakeType::Finished => {
                check_state(state, &[S::WaitFinished], msg_type)?;
                self.process_finished(body, mark)
            }
            HandshakeType::NewSessionTicket => {
                check_state(state, &[S::IdleHandshake], msg_type)?;
                self.process_new_session_ticket(body)
            }
            HandshakeType::ClientHello => Err(TlsError::UnexpectedMessage(
                "client received a ClientHello".into(),
            )),
        }
    }

    fn process_hello_retry_request(&mut self, body: &[u8]) -> Result<(), TlsError> {
        if self.core.hello_retry {
            return Err(TlsError::UnexpectedMessage(
                "second HelloRetryRequest".into(),
            ));
        }
        let hrr = decode_hello_retry_request(body)?;
        if TlsVersion::from_wire(hrr.version) != Some(TlsVersion::Tls13) {
            return Err(TlsError::ProtocolVersion);
        }
        check_extensions(&hrr.extensions, HandshakeType::HelloRetryRequest)?;
        let group = hrr.selected_group()?.ok_or_else(|| {
            TlsError::MissingExtension("HelloRetryRequest without key_share".into())
        })?;
        let current = self.key_exchange.as_ref().map(KeyExchange::group);
        if !self.core.config.supported_groups.contains(&group) || current == Some(group) {
            return Err(TlsError::IllegalParameter(format!(
                "HelloRetryRequest names group {:#06x}",
                group.0
            )));
        }
        debug!("HelloRetryRequest for group {:#06x}", group.0);
        self.core.hello_retry = true;

        if self.core.zero_rtt == ZeroRttState::Sent {
            // the second ClientHello goes out in the clear
            self.core.reset_to_null(Direction::Write);
            self.core.zero_rtt = ZeroRttState::Ignored;
            self.core.notify_early_data(false);
        }
        self.core.key_schedule = None;
        self.core.secrets.client_early = None;

        self.send_client_hello(group, false)?;
        self.core.set_state(HandshakeState::WaitServerHello);
        Ok(())
    }

    fn process_server_hello(&mut self, body: &[u8]) -> Result<(), TlsError> {
        let sh = decode_server_hello(body)?;
        if TlsVersion::from_wire(sh.version) != Some(TlsVersion::Tls13) {
            return Err(TlsError::ProtocolVersion);
        }
        check_extensions(&sh.extensions, HandshakeType::ServerHello)?;

        let suite = sh.cipher_suite;
        if !self.offered_suites.contains(&suite) {
            return Err(TlsError::IllegalParameter(format!(
                "server selected cipher suite {:#06x} that was not offered",
                suite.0
            )));
        }
        let params = CipherSuiteParams::from_suite(suite)?;
        let hash = params.hash;

        let share_ext = find_extension(&sh.extensions, ExtensionType::KEY_SHARE)
            .ok_or_else(|| TlsError::MissingExtension("ServerHello without key_share".into()))?;
        let share = parse_key_share_sh(&share_ext.data)?;
        let kx = self
            .key_exchange
            .take()
            .ok_or_else(|| TlsError::InternalError("no key exchange state".into()))?;
        if share.group != kx.group() {
            return Err(TlsError::IllegalParameter(
                "server key_share group mismatch".into(),
            ));
        }

        let resumed = match find_extension(&sh.extensions, ExtensionType::PRE_SHARED_KEY) {
            Some(ext) => {
                let selected = parse_pre_shared_key_sh(&ext.data)?;
                let session = self.offered_session.as_ref().ok_or_else(|| {
                    TlsError::IllegalParameter("unsolicited pre_shared_key".into())
                })?;
                if selected != 0 {
                    return Err(TlsError::IllegalParameter(format!(
                        "pre_shared_key index {selected} out of range"
                    )));
                }
                if session.cipher_suite != suite {
                    return Err(TlsError::IllegalParameter(
                        "cipher suite differs from the resumed session".into(),
                    ));
                }
                true
            }
            None => false,
        };

        let sig_marker =
            find_extension(&sh.extensions, ExtensionType::SIGNATURE_ALGORITHMS).is_some();
        if resumed && sig_marker {
            return Err(TlsError::UnexpectedMessage(
                "signature_algorithms in a PSK ServerHello".into(),
            ));
        }
        if !resumed && !sig_marker {
            return Err(TlsError::MissingExtension(
                "ServerHello without signature_algorithms".into(),
            ));
        }

        let mut ks = match self.core.key_schedule.take() {
            // 0-RTT already derived the early secret from this PSK
            Some(ks) if resumed && ks.hash() == hash => ks,
            Some(mut ks) if ks.hash() == hash => {
                ks.reset_without_resumption();
                ks
            }
            _ => KeySchedule::new(hash),
        };
        if ks.stage() == KeyScheduleStage::Initial {
            if resumed {
                let session = self
                    .offered_session
                    .as_ref()
                    .ok_or_else(|| TlsError::InternalError("resumed without a session".into()))?;
                let (psk, context) =
                    recover_wrapped_shared_secret(hash, &session.resumption_master_secret)?;
                ks.set_resumption(psk, context)?;
            }
            ks.compute_early_secrets(None)?;
        }
        self.core.set_cipher_suite(params);

        let mut shared = kx.compute_shared_secret(&share.key_exchange)?;
        let sh_hash = self.core.transcript.current_hash();
        let derived = ks.compute_handshake_secrets(&shared, &sh_hash);
        shared.zeroize();
        let (client_hs, server_hs) = derived?;
        self.core.key_schedule = Some(ks);
        self.core
            .log_secret(keylog::CLIENT_HANDSHAKE_TRAFFIC_SECRET, &client_hs);
        self.core
            .log_secret(keylog::SERVER_HANDSHAKE_TRAFFIC_SECRET, &server_hs);
        self.core.secrets.client_handshake = Some(client_hs);
        self.core.secrets.server_handshake = Some(server_hs);
        self.core
            .set_cipher_spec(Direction::Read, TrafficPhase::Handshake, false)?;

        let mut negotiated = NegotiatedParams::new(suite);
        negotiated.group = Some(share.group);
        negotiated.resumed = resumed;
        negotiated.auth_mode = if resumed {
            AuthMode::Psk
        } else {
            AuthMode::Certificate
        };
        self.core.negotiated = Some(negotiated);
        self.core
            .set_state(HandshakeState::WaitEncryptedExtensions);
        Ok(())
    }

    fn process_encrypted_extensions(&mut self, body: &[u8]) -> Result<(), TlsError> {
        let ee = decode_encrypted_extensions(body)?;
        check_extensions(&ee.extensions, HandshakeType::EncryptedExtensions)?;

        let alpn = match find_extension(&ee.extensions, ExtensionType::APPLICATION_LAYER_PROTOCOL_NEGOTIATION) {
            Some(ext) => {
                let protocol = parse_alpn_selected(&ext.data)?;
                if !self.core.config.alpn_protocols.contains(&protocol) {
                    return Err(TlsError::IllegalParameter(
                        "server selected an ALPN protocol that was not offered".into(),
                    ));
                }
                Some(protocol)
            }
            None => None,
        };

        let resumed = self.core.negotiated_mut()?.resumed;
        let early_accepted = match find_extension(&ee.extensions, ExtensionType::EARLY_DATA) {
            Some(ext) => {
                parse_early_data(&ext.data)?;
                if self.core.zero_rtt != ZeroRttState::Sent || !resumed {
                    return Err(TlsError::IllegalParameter(
                        "early_data accepted but not offered".into(),
                    ));
                }
                if alpn != self.early_alpn {
                    return Err(TlsError::IllegalParameter(
                        "ALPN changed for accepted 0-RTT".into(),
                    ));
                }
                true
            }
            None => false,
        };
        if early_accepted {
            self.core.zero_rtt = ZeroRttState::Accepted;
            self.core.notify_early_data(true);
        } else if self.core.zero_rtt == ZeroRttState::Sent {
            self.core.zero_rtt = ZeroRttState::Ignored;
            self.core.notify_early_data(false);
        }

        let negotiated = self.core.negotiated_mut()?;
        negotiated.alpn_protocol = alpn;
        negotiated.early_data_accepted = early_accepted;
        let next = if resumed {
            HandshakeState::WaitFinished
        } else {
            HandshakeState::WaitCertRequest
        };
        self.core.set_state(next);
        Ok(())
    }

    fn process_certificate_request(&mut self, body: &[u8]) -> Result<(), TlsError> {
        let cr = decode_certificate_request(body)?;
        if !cr.certificate_request_context.is_empty() {
            return Err(TlsError::IllegalParameter(
                "non-empty certificate_request_context".into(),
            ));
        }
        self.cert_request = Some(cr);
        self.core.set_state(HandshakeState::WaitServerCert);
        Ok(())
    }

    fn process_certificate(&mut self, body: &[u8]) -> Result<(), TlsError> {
        let cert = decode_certificate(body)?;
        if !cert.certificate_request_context.is_empty() {
            return Err(TlsError::IllegalParameter(
                "non-empty certificate_request_context".into(),
            ));
        }
        if cert.certificate_list.is_empty() {
            return Err(TlsError::BadCertificate("server sent no certificate".into()));
        }
        let config = &self.core.config;
        match config
            .verifier
            .authenticate(&cert.certificate_list, config.server_name.as_deref())
        {
            AuthDecision::Accepted => {}
            AuthDecision::Pending => {
                debug!("server certificate authentication pending");
                self.cert_auth_pending = true;
            }
            AuthDecision::Rejected(reason) => return Err(TlsError::BadCertificate(reason)),
        }
        self.server_certs = cert.certificate_list;
        self.core.set_state(HandshakeState::WaitCertVerify);
        Ok(())
    }

    fn process_certificate_verify(&mut self, body: &[u8], mark: usize) -> Result<(), TlsError> {
        let cv = decode_certificate_verify(body)?;
        if !self
            .core
            .config
            .signature_algorithms
            .contains(&cv.algorithm)
        {
            return Err(TlsError::IllegalParameter(format!(
                "server signed with unoffered scheme {:#06x}",
                cv.algorithm.0
            )));
        }
        let hash = self.core.hash()?;
        let combined = self
            .core
            .combined_hash(&self.core.transcript.hash_prefix(mark))?;
        let content = build_verify_content(hash, &combined, true);
        let leaf = self
            .server_certs
            .first()
            .ok_or_else(|| TlsError::InternalError("no server certificate".into()))?;
        self.core
            .config
            .verifier
            .verify_signature(leaf, cv.algorithm, &content, &cv.signature)?;
        self.core.negotiated_mut()?.signature_scheme = Some(cv.algorithm);
        self.core.set_state(HandshakeState::WaitFinished);
        Ok(())
    }

    /// Verify the server Finished, then send the second flight unless
    /// certificate authentication is still pending (reported as
    /// `WouldBlock`).
    fn process_finished(&mut self, body: &[u8], mark: usize) -> Result<(), TlsError> {
        let fin = decode_finished(body);
        let hash = self.core.hash()?;
        let combined = self
            .core
            .combined_hash(&self.core.transcript.hash_prefix(mark))?;
        let server_hs = self
            .core
            .secrets
            .server_handshake
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("server handshake secret missing".into()))?;
        verify_finished(hash, server_hs.as_bytes(), &combined, &fin.verify_data)?;
        self.server_finished_hash = self.core.transcript.current_hash();

        if self.cert_auth_pending {
            debug!("server Finished verified, waiting for certificate authentication");
            self.second_round_deferred = true;
            return Err(TlsError::WouldBlock);
        }
        self.send_second_round()
    }

    /// Finish a suspended handshake once the application has decided on
    /// the server certificate.
    pub(crate) fn resume_after_cert_auth(&mut self, accepted: bool) -> Result<(), TlsError> {
        if !self.cert_auth_pending {
            return Err(TlsError::InternalError(
                "no certificate authentication pending".into(),
            ));
        }
        self.cert_auth_pending = false;
        if !accepted {
            return Err(TlsError::BadCertificate(
                "server certificate rejected".into(),
            ));
        }
        if self.second_round_deferred {
            self.second_round_deferred = false;
            return self.send_second_round();
        }
        Ok(())
    }

    fn send_second_round(&mut self) -> Result<(), TlsError> {
        if self.core.zero_rtt == ZeroRttState::Accepted {
            self.core.send_alert(Alert::end_of_early_data())?;
            self.core.zero_rtt = ZeroRttState::Done;
        }
        if self.core.record.transport() == Transport::Datagram
            && self.core.zero_rtt != ZeroRttState::None
            && !self.core.hello_retry
        {
            self.core.reset_to_null(Direction::Write);
        }
        self.core
            .set_cipher_spec(Direction::Write, TrafficPhase::Handshake, false)?;

        let (client_app, server_app) = self
            .core
            .key_schedule()?
            .compute_application_secrets(&self.server_finished_hash)?;
        self.core
            .log_secret(keylog::CLIENT_TRAFFIC_SECRET_0, &client_app);
        self.core
            .log_secret(keylog::SERVER_TRAFFIC_SECRET_0, &server_app);
        self.core.secrets.client_application = Some(client_app);
        self.core.secrets.server_application = Some(server_app);
        self.core
            .set_cipher_spec(Direction::Read, TrafficPhase::ApplicationData, true)?;

        if let Some(cr) = self.cert_request.take() {
            self.send_client_certificate(&cr)?;
        }

        let hash = self.core.hash()?;
        let combined = self
            .core
            .combined_hash(&self.core.transcript.current_hash())?;
        let client_hs = self
            .core
            .secrets
            .client_handshake
            .take()
            .ok_or_else(|| TlsError::InternalError("client handshake secret missing".into()))?;
        let verify_data = compute_finished(hash, client_hs.as_bytes(), &combined)?;
        self.core.send_handshake(&encode_finished(&verify_data))?;
        self.core
            .set_cipher_spec(Direction::Write, TrafficPhase::ApplicationData, true)?;

        let cf_hash = self.core.transcript.current_hash();
        let (rms, exporter) = self.core.key_schedule_mut()?.compute_final_secrets(&cf_hash)?;
        self.core.log_secret(keylog::EXPORTER_SECRET, &exporter);
        self.core.secrets.resumption_master = Some(rms);
        self.core.secrets.exporter = Some(exporter);
        self.core.secrets.server_handshake = None;
        self.core.complete()
    }

    fn send_client_certificate(&mut self, cr: &CertificateRequestMsg) -> Result<(), TlsError> {
        let config = self.core.config.clone();
        let chosen = match &config.client_cert_callback {
            Some(cb) => cb(&cr.signature_algorithms),
            None => config.client_certificate.clone(),
        }
        .filter(|c| cr.signature_algorithms.contains(&c.key.scheme()));

        let certificate_list = chosen
            .as_ref()
            .map(|c| c.chain.clone())
            .unwrap_or_default();
        debug!(
            "client sends {} certificate(s)",
            certificate_list.len()
        );
        self.core.send_handshake(&encode_certificate(&CertificateMsg {
            certificate_request_context: Vec::new(),
            certificate_list,
        }))?;

        if let Some(cert) = chosen {
            let hash = self.core.hash()?;
            let combined = self
                .core
                .combined_hash(&self.core.transcript.current_hash())?;
            let content = build_verify_content(hash, &combined, false);
            let signature = cert.key.sign(&content)?;
            self.core
                .send_handshake(&encode_certificate_verify(&CertificateVerifyMsg {
                    algorithm: cert.key.scheme(),
                    signature,
                }))?;
            self.core.negotiated_mut()?.client_authenticated = true;
        }
        Ok(())
    }

    /// Cache a ticket for later resumption. Tickets that do not allow
    /// `psk_dhe_ke` with `psk_auth` are dropped.
    fn process_new_session_ticket(&mut self, body: &[u8]) -> Result<(), TlsError> {
        let nst = decode_new_session_ticket(body)?;
        check_extensions(&nst.extensions, HandshakeType::NewSessionTicket)?;
        let early_info = find_extension(&nst.extensions, ExtensionType::TICKET_EARLY_DATA_INFO)
            .map(|ext| parse_ticket_early_data_info(&ext.data))
            .transpose()?;
        if !nst.ke_modes.contains(&PSK_DHE_KE) || !nst.auth_modes.contains(&PSK_AUTH) {
            debug!("ignoring ticket without psk_dhe_ke/psk_auth");
            return Ok(());
        }

        let rms = self
            .core
            .secrets
            .resumption_master
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("no resumption master secret".into()))?;
        let negotiated = self
            .core
            .negotiated
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("no negotiated parameters".into()))?;
        let config = &self.core.config;
        let session = TlsSession {
            ticket: nst.ticket,
            version: negotiated.version,
            cipher_suite: negotiated.cipher_suite,
            resumption_master_secret: rms.as_bytes().to_vec(),
            alpn_protocol: negotiated.alpn_protocol.clone(),
            server_name: config.server_name.clone(),
            allow_early_data: early_info.is_some(),
            ticket_age_add: early_info.unwrap_or(0),
            ticket_lifetime: nst.ticket_lifetime,
            created_at: now_secs(),
        };
        if let (Some(cache), Some(name)) = (&config.session_cache, &config.server_name) {
            cache
                .lock()
                .map_err(|_| TlsError::InternalError("session cache lock poisoned".into()))?
                .put(name.as_bytes(), session.clone());
        }
        debug!(
            "stored session ticket ({} bytes, early data {})",
            session.ticket.len(),
            session.allow_early_data
        );
        self.received_session = Some(session);
        Ok(())
    }

    /// Whether 0-RTT application data may be written now.
    pub(crate) fn can_write_early_data(&self) -> bool {
        matches!(
            self.core.zero_rtt,
            ZeroRttState::Sent | ZeroRttState::Accepted
        ) && self
            .core
            .record
            .spec(Direction::Write)
            .phase()
            == Some(TrafficPhase::EarlyApplicationData)
    }
}
