//! TLS 1.3 server handshake state machine.
//!
//! ClientHello -> [HelloRetryRequest -> ClientHello] -> ServerHello
//! {EncryptedExtensions} [{CertificateRequest}] [{Certificate}
//! {CertificateVerify}] {Finished}, then the client's second flight. When
//! 0-RTT is accepted the flight waits for the client's early Finished.

use std::sync::Arc;

use log::{debug, trace};

use crate::config::TlsConfig;
use crate::crypt::key_schedule::{
    compute_finished, recover_wrapped_shared_secret, verify_finished, KeySchedule, Secret,
};
use crate::crypt::keylog;
use crate::crypt::traffic_keys::TrafficPhase;
use crate::crypt::{random_array, CipherSuiteParams, NamedGroup, SignatureScheme};
use crate::extensions::{check_extensions, find_extension, ExtensionType};
use crate::record::Direction;
use crate::session::{now_secs, TlsSession};
use crate::{CipherSuite, TlsRole, TlsVersion, Transport};
use tls13hs_types::TlsError;

use super::codec::{
    decode_certificate, decode_certificate_verify, decode_client_hello, decode_finished,
    encode_certificate, encode_certificate_request, encode_certificate_verify,
    encode_encrypted_extensions, encode_finished, encode_hello_retry_request,
    encode_new_session_ticket, encode_server_hello, CertificateMsg, CertificateRequestMsg,
    CertificateVerifyMsg, NewSessionTicketMsg, ServerHello,
};
use super::common::HandshakeCore;
use super::extensions_codec::{
    build_alpn, build_early_data, build_key_share_sh, build_pre_shared_key_sh,
    build_server_name_ack, build_signature_algorithms_sh, build_ticket_early_data_info,
    negotiate_version, parse_alpn, parse_early_data, parse_key_share_ch,
    parse_pre_shared_key_ch, parse_server_name, parse_signature_algorithms,
    parse_supported_groups, parse_supported_versions_ch, KeyShareEntry,
};
use super::key_exchange::KeyExchange;
use super::signing::{select_certificate, CertifiedKey};
use super::verify::{build_verify_content, AuthDecision};
use super::{
    check_state, AuthMode, HandshakeState, HandshakeType, NegotiatedParams, ZeroRttIgnore,
    ZeroRttState, PSK_AUTH, PSK_DHE_KE,
};

/// Server handshake state machine.
pub(crate) struct ServerHandshake {
    pub(crate) core: HandshakeCore,
    /// Suite chosen for the first ClientHello; a retry must not change it.
    first_suite: Option<CipherSuite>,
    requested_group: Option<NamedGroup>,
    server_share: Option<KeyShareEntry>,
    dhe_secret: Option<Secret>,
    certificate: Option<(CertifiedKey, SignatureScheme)>,
    /// Index and session of the accepted PSK identity.
    resumed: Option<(u16, TlsSession)>,
    client_server_name: Option<String>,
    client_cert_requested: bool,
    pub(crate) client_certs: Vec<Vec<u8>>,
}

impl ServerHandshake {
    pub(crate) fn new(config: Arc<TlsConfig>) -> Self {
        Self {
            core: HandshakeCore::new(config, TlsRole::Server),
            first_suite: None,
            requested_group: None,
            server_share: None,
            dhe_secret: None,
            certificate: None,
            resumed: None,
            client_server_name: None,
            client_cert_requested: false,
            client_certs: Vec::new(),
        }
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
            HandshakeType::ClientHello => {
                check_state(state, &[S::WaitClientHello], msg_type)?;
                self.process_client_hello(body)
            }
            HandshakeType::Certificate => {
                check_state(state, &[S::WaitClientCert], msg_type)?;
                self.process_client_certificate(body)
            }
            HandshakeType::CertificateVerify => {
                check_state(state, &[S::WaitCertVerify], msg_type)?;
                self.process_client_certificate_verify(body, mark)
            }
            HandshakeType::Finished => {
                check_state(state, &[S::WaitFinished, S::Wait0RttFinished], msg_type)?;
                if state == S::Wait0RttFinished {
                    self.process_early_finished(body, mark)
                } else {
                    self.process_client_finished(body, mark)
                }
            }
            other => Err(TlsError::UnexpectedMessage(format!(
                "server received {other:?}"
            ))),
        }
    }

    fn process_client_hello(&mut self, body: &[u8]) -> Result<(), TlsError> {
        let ch = decode_client_hello(body)?;
        check_extensions(&ch.extensions, HandshakeType::ClientHello)?;
        if self.core.zero_rtt_ignore == ZeroRttIgnore::Hrr {
            self.core.zero_rtt_ignore = ZeroRttIgnore::None;
        }
        let config = self.core.config.clone();

        let versions = find_extension(&ch.extensions, ExtensionType::SUPPORTED_VERSIONS)
            .ok_or(TlsError::ProtocolVersion)?;
        let version = negotiate_version(
            &parse_supported_versions_ch(&versions.data)?,
            &[TlsVersion::Tls13],
        )?;

        let suite = config
            .cipher_suites
            .iter()
            .copied()
            .find(|s| ch.cipher_suites.contains(s) && CipherSuiteParams::is_supported(*s))
            .ok_or(TlsError::NoSharedCipherSuite)?;
        if let Some(first) = self.first_suite {
            if first != suite {
                return Err(TlsError::HandshakeFailure(
                    "cipher suite changed after HelloRetryRequest".into(),
                ));
            }
        }
        let params = CipherSuiteParams::from_suite(suite)?;
        let hash = params.hash;
        self.core.set_cipher_suite(params);
        if !self.core.hello_retry {
            self.core.client_random = ch.random;
        }

        let groups = find_extension(&ch.extensions, ExtensionType::SUPPORTED_GROUPS)
            .ok_or_else(|| TlsError::MissingExtension("supported_groups".into()))?;
        let groups = parse_supported_groups(&groups.data)?;
        let shares = find_extension(&ch.extensions, ExtensionType::KEY_SHARE)
            .ok_or_else(|| TlsError::MissingExtension("key_share".into()))?;
        let shares = parse_key_share_ch(&shares.data)?;
        let group = config
            .supported_groups
            .iter()
            .copied()
            .find(|g| groups.contains(g) && KeyExchange::is_supported(*g))
            .ok_or_else(|| TlsError::HandshakeFailure("no shared group".into()))?;

        let early_offered = match find_extension(&ch.extensions, ExtensionType::EARLY_DATA) {
            Some(ext) => {
                parse_early_data(&ext.data)?;
                true
            }
            None => false,
        };
        if self.core.hello_retry && early_offered {
            return Err(TlsError::IllegalParameter(
                "early_data in the second ClientHello".into(),
            ));
        }

        let Some(client_share) = shares.iter().find(|s| s.group == group) else {
            if self.core.hello_retry {
                return Err(TlsError::IllegalParameter(
                    "no key share for the requested group".into(),
                ));
            }
            return self.send_hello_retry_request(suite, group, early_offered);
        };
        if self.core.hello_retry && self.requested_group != Some(group) {
            return Err(TlsError::IllegalParameter(
                "second ClientHello changed groups".into(),
            ));
        }
        self.first_suite = Some(suite);

        let server_name = find_extension(&ch.extensions, ExtensionType::SERVER_NAME)
            .map(|ext| parse_server_name(&ext.data))
            .transpose()?
            .flatten();
        let alpn = match find_extension(
            &ch.extensions,
            ExtensionType::APPLICATION_LAYER_PROTOCOL_NEGOTIATION,
        ) {
            Some(ext) => {
                let offered = parse_alpn(&ext.data)?;
                config
                    .alpn_protocols
                    .iter()
                    .find(|p| offered.contains(p))
                    .cloned()
            }
            None => None,
        };
        let client_schemes = find_extension(&ch.extensions, ExtensionType::SIGNATURE_ALGORITHMS)
            .map(|ext| parse_signature_algorithms(&ext.data))
            .transpose()?;

        let resumed = match find_extension(&ch.extensions, ExtensionType::PRE_SHARED_KEY) {
            Some(ext) => self.lookup_session(
                &parse_pre_shared_key_ch(&ext.data)?,
                suite,
                server_name.as_deref(),
            )?,
            None => None,
        };

        if resumed.is_none() {
            let schemes = client_schemes.ok_or_else(|| {
                TlsError::MissingExtension("signature_algorithms".into())
            })?;
            let (cert, scheme) = select_certificate(&config.certificates, &schemes)?;
            self.certificate = Some((cert.clone(), scheme));
        }

        let mut ks = KeySchedule::new(hash);
        if let Some((_, session)) = &resumed {
            let (psk, context) =
                recover_wrapped_shared_secret(hash, &session.resumption_master_secret)?;
            ks.set_resumption(psk, context)?;
        }

        let mut accept_early = false;
        if early_offered {
            accept_early = config.enable_0rtt
                && matches!(&resumed, Some((0, s)) if s.allow_early_data && s.alpn_protocol == alpn);
            if accept_early {
                self.core.zero_rtt = ZeroRttState::Accepted;
            } else {
                self.core.zero_rtt = ZeroRttState::Ignored;
                self.core.zero_rtt_ignore = ZeroRttIgnore::Trial;
            }
            self.core.notify_early_data(accept_early);
        }

        let ch_hash = self.core.transcript.current_hash();
        let early = ks.compute_early_secrets(accept_early.then_some(ch_hash.as_slice()))?;
        if let Some(early) = early {
            self.core
                .log_secret(keylog::CLIENT_EARLY_TRAFFIC_SECRET, &early);
            self.core.secrets.client_early = Some(early);
        }
        self.core.key_schedule = Some(ks);

        let kx = KeyExchange::generate(group)?;
        let shared = kx.compute_shared_secret(&client_share.key_exchange)?;
        self.dhe_secret = Some(Secret::new(shared));
        self.server_share = Some(KeyShareEntry {
            group,
            key_exchange: kx.public_key_bytes().to_vec(),
        });

        let mut negotiated = NegotiatedParams::new(suite);
        negotiated.version = version;
        negotiated.group = Some(group);
        negotiated.signature_scheme = self.certificate.as_ref().map(|(_, s)| *s);
        negotiated.resumed = resumed.is_some();
        negotiated.auth_mode = if resumed.is_some() {
            AuthMode::Psk
        } else {
            AuthMode::Certificate
        };
        negotiated.alpn_protocol = alpn;
        negotiated.early_data_accepted = accept_early;
        self.core.negotiated = Some(negotiated);
        self.resumed = resumed;
        self.client_server_name = server_name;

        if accept_early {
            self.core
                .set_cipher_spec(Direction::Read, TrafficPhase::EarlyHandshake, false)?;
            self.core.set_state(HandshakeState::Wait0RttFinished);
            return Ok(());
        }
        self.send_server_flight()
    }

    fn send_hello_retry_request(
        &mut self,
        suite: CipherSuite,
        group: NamedGroup,
        early_offered: bool,
    ) -> Result<(), TlsError> {
        debug!("server requests a key share for group {:#06x}", group.0);
        self.first_suite = Some(suite);
        self.requested_group = Some(group);
        self.core.hello_retry = true;
        self.core.send_handshake(&encode_hello_retry_request(
            TlsVersion::Tls13.to_wire(),
            group,
        ))?;
        if early_offered {
            self.core.zero_rtt = ZeroRttState::Ignored;
            self.core.zero_rtt_ignore = ZeroRttIgnore::Hrr;
            self.core.notify_early_data(false);
        }
        self.core.set_state(HandshakeState::WaitClientHello);
        Ok(())
    }

    /// Find the first offered identity that names a resumable session.
    ///
    /// A session for a different server name fails the handshake.
    fn lookup_session(
        &self,
        identities: &[Vec<u8>],
        suite: CipherSuite,
        server_name: Option<&str>,
    ) -> Result<Option<(u16, TlsSession)>, TlsError> {
        let Some(cache) = &self.core.config.session_cache else {
            return Ok(None);
        };
        let cache = cache
            .lock()
            .map_err(|_| TlsError::InternalError("session cache lock poisoned".into()))?;
        let now = now_secs();
        for (index, identity) in identities.iter().enumerate() {
            let Some(session) = cache.get(identity) else {
                trace!("unknown PSK identity");
                continue;
            };
            if session.version != TlsVersion::Tls13
                || session.cipher_suite != suite
                || session.is_expired(now)
            {
                debug!("session for PSK identity {index} cannot be resumed");
                continue;
            }
            if session.server_name.as_deref() != server_name {
                return Err(TlsError::HandshakeFailure(
                    "server name differs from the resumed session".into(),
                ));
            }
            let index = u16::try_from(index)
                .map_err(|_| TlsError::IllegalParameter("too many PSK identities".into()))?;
            return Ok(Some((index, session.clone())));
        }
        Ok(None)
    }

    /// Verify the client's early Finished. It stays out of the transcript.
    fn process_early_finished(&mut self, body: &[u8], mark: usize) -> Result<(), TlsError> {
        let fin = decode_finished(body);
        let hash = self.core.hash()?;
        let combined = self
            .core
            .combined_hash(&self.core.transcript.hash_prefix(mark))?;
        let early = self
            .core
            .secrets
            .client_early
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("client early secret missing".into()))?;
        verify_finished(hash, early.as_bytes(), &combined, &fin.verify_data)?;
        self.core.transcript.truncate(mark);
        debug!("early Finished verified");
        self.send_server_flight()
    }

    fn send_server_flight(&mut self) -> Result<(), TlsError> {
        let config = self.core.config.clone();
        let hash = self.core.hash()?;
        let suite = self.core.params()?.suite;

        let share = self
            .server_share
            .take()
            .ok_or_else(|| TlsError::InternalError("no server key share".into()))?;
        let mut extensions = vec![build_key_share_sh(&share)];
        if let Some((index, _)) = &self.resumed {
            extensions.push(build_pre_shared_key_sh(*index));
        }
        if self.certificate.is_some() {
            extensions.push(build_signature_algorithms_sh());
        }
        self.core.send_handshake(&encode_server_hello(&ServerHello {
            version: TlsVersion::Tls13.to_wire(),
            random: random_array()?,
            cipher_suite: suite,
            extensions,
        }))?;

        let dhe = self
            .dhe_secret
            .take()
            .ok_or_else(|| TlsError::InternalError("no shared secret".into()))?;
        let sh_hash = self.core.transcript.current_hash();
        let (client_hs, server_hs) = self
            .core
            .key_schedule_mut()?
            .compute_handshake_secrets(dhe.as_bytes(), &sh_hash)?;
        drop(dhe);
        self.core
            .log_secret(keylog::CLIENT_HANDSHAKE_TRAFFIC_SECRET, &client_hs);
        self.core
            .log_secret(keylog::SERVER_HANDSHAKE_TRAFFIC_SECRET, &server_hs);
        self.core.secrets.client_handshake = Some(client_hs);
        self.core.secrets.server_handshake = Some(server_hs);
        self.core
            .set_cipher_spec(Direction::Write, TrafficPhase::Handshake, false)?;

        let mut ee = Vec::new();
        if self.client_server_name.is_some() {
            ee.push(build_server_name_ack());
        }
        if let Some(protocol) = self.core.negotiated_mut()?.alpn_protocol.clone() {
            ee.push(build_alpn(&[protocol]));
        }
        if self.core.zero_rtt == ZeroRttState::Accepted {
            ee.push(build_early_data());
        }
        self.core.send_handshake(&encode_encrypted_extensions(&ee))?;

        if let Some((cert, scheme)) = self.certificate.take() {
            if config.request_client_cert {
                self.core
                    .send_handshake(&encode_certificate_request(&CertificateRequestMsg {
                        certificate_request_context: Vec::new(),
                        signature_algorithms: config.signature_algorithms.clone(),
                        certificate_authorities: Vec::new(),
                        extensions: Vec::new(),
                    }))?;
                self.client_cert_requested = true;
            }
            self.core.send_handshake(&encode_certificate(&CertificateMsg {
                certificate_request_context: Vec::new(),
                certificate_list: cert.chain.clone(),
            }))?;
            let combined = self
                .core
                .combined_hash(&self.core.transcript.current_hash())?;
            let signature = cert
                .key
                .sign(&build_verify_content(hash, &combined, true))?;
            self.core
                .send_handshake(&encode_certificate_verify(&CertificateVerifyMsg {
                    algorithm: scheme,
                    signature,
                }))?;
        }

        let combined = self
            .core
            .combined_hash(&self.core.transcript.current_hash())?;
        let server_hs = self
            .core
            .secrets
            .server_handshake
            .take()
            .ok_or_else(|| TlsError::InternalError("server handshake secret missing".into()))?;
        let verify_data = compute_finished(hash, server_hs.as_bytes(), &combined)?;
        self.core.send_handshake(&encode_finished(&verify_data))?;

        let sf_hash = self.core.transcript.current_hash();
        let (client_app, server_app) = self
            .core
            .key_schedule()?
            .compute_application_secrets(&sf_hash)?;
        self.core
            .log_secret(keylog::CLIENT_TRAFFIC_SECRET_0, &client_app);
        self.core
            .log_secret(keylog::SERVER_TRAFFIC_SECRET_0, &server_app);
        self.core.secrets.client_application = Some(client_app);
        self.core.secrets.server_application = Some(server_app);
        self.core
            .set_cipher_spec(Direction::Write, TrafficPhase::ApplicationData, false)?;

        if self.core.zero_rtt == ZeroRttState::Accepted {
            self.core
                .set_cipher_spec(Direction::Read, TrafficPhase::EarlyApplicationData, true)?;
        } else {
            self.core
                .set_cipher_spec(Direction::Read, TrafficPhase::Handshake, false)?;
        }
        let next = if self.client_cert_requested {
            HandshakeState::WaitClientCert
        } else {
            HandshakeState::WaitFinished
        };
        self.core.set_state(next);
        Ok(())
    }

    /// Handle the client's end_of_early_data alert. It must arrive under the
    /// early application keys, after our flight went out.
    pub(crate) fn process_end_of_early_data(&mut self) -> Result<(), TlsError> {
        if self.core.zero_rtt != ZeroRttState::Accepted {
            return Err(TlsError::UnexpectedMessage(
                "end_of_early_data without accepted 0-RTT".into(),
            ));
        }
        if self.core.record.spec(Direction::Read).phase()
            != Some(TrafficPhase::EarlyApplicationData)
        {
            return Err(TlsError::UnexpectedMessage(
                "end_of_early_data outside the early data keys".into(),
            ));
        }
        if !matches!(
            self.core.state,
            HandshakeState::WaitClientCert | HandshakeState::WaitFinished
        ) {
            return Err(TlsError::UnexpectedMessage(format!(
                "end_of_early_data received in state {}",
                self.core.state.name()
            )));
        }
        self.core.zero_rtt = ZeroRttState::Done;
        if self.core.record.transport() == Transport::Datagram {
            self.core.reset_to_null(Direction::Read);
        }
        self.core
            .set_cipher_spec(Direction::Read, TrafficPhase::Handshake, false)
    }

    fn process_client_certificate(&mut self, body: &[u8]) -> Result<(), TlsError> {
        let cert = decode_certificate(body)?;
        if !cert.certificate_request_context.is_empty() {
            return Err(TlsError::IllegalParameter(
                "non-empty certificate_request_context".into(),
            ));
        }
        if cert.certificate_list.is_empty() {
            if self.core.config.require_client_cert {
                return Err(TlsError::HandshakeFailure(
                    "client certificate required".into(),
                ));
            }
            debug!("client declined to authenticate");
            self.core.set_state(HandshakeState::WaitFinished);
            return Ok(());
        }
        match self
            .core
            .config
            .verifier
            .authenticate(&cert.certificate_list, None)
        {
            AuthDecision::Accepted => {}
            AuthDecision::Pending => {
                return Err(TlsError::BadCertificate(
                    "client certificates must be authenticated synchronously".into(),
                ))
            }
            AuthDecision::Rejected(reason) => return Err(TlsError::BadCertificate(reason)),
        }
        self.client_certs = cert.certificate_list;
        self.core.set_state(HandshakeState::WaitCertVerify);
        Ok(())
    }

    fn process_client_certificate_verify(
        &mut self,
        body: &[u8],
        mark: usize,
    ) -> Result<(), TlsError> {
        let cv = decode_certificate_verify(body)?;
        if !self
            .core
            .config
            .signature_algorithms
            .contains(&cv.algorithm)
        {
            return Err(TlsError::IllegalParameter(format!(
                "client signed with unrequested scheme {:#06x}",
                cv.algorithm.0
            )));
        }
        let hash = self.core.hash()?;
        let combined = self
            .core
            .combined_hash(&self.core.transcript.hash_prefix(mark))?;
        let content = build_verify_content(hash, &combined, false);
        let leaf = self
            .client_certs
            .first()
            .ok_or_else(|| TlsError::InternalError("no client certificate".into()))?;
        self.core
            .config
            .verifier
            .verify_signature(leaf, cv.algorithm, &content, &cv.signature)?;
        self.core.negotiated_mut()?.client_authenticated = true;
        self.core.set_state(HandshakeState::WaitFinished);
        Ok(())
    }

    fn process_client_finished(&mut self, body: &[u8], mark: usize) -> Result<(), TlsError> {
        let fin = decode_finished(body);
        let hash = self.core.hash()?;
        let combined = self
            .core
            .combined_hash(&self.core.transcript.hash_prefix(mark))?;
        let client_hs = self
            .core
            .secrets
            .client_handshake
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("client handshake secret missing".into()))?;
        verify_finished(hash, client_hs.as_bytes(), &combined, &fin.verify_data)?;
        self.core.secrets.client_handshake = None;

        self.core
            .set_cipher_spec(Direction::Read, TrafficPhase::ApplicationData, true)?;
        let cf_hash = self.core.transcript.current_hash();
        let (rms, exporter) = self.core.key_schedule_mut()?.compute_final_secrets(&cf_hash)?;
        self.core.log_secret(keylog::EXPORTER_SECRET, &exporter);
        self.core.secrets.exporter = Some(exporter);
        self.core.secrets.resumption_master = Some(rms);
        self.core.complete()?;
        self.send_session_ticket()
    }

    /// Issue a stateful ticket after a certificate-authenticated handshake.
    fn send_session_ticket(&mut self) -> Result<(), TlsError> {
        let config = self.core.config.clone();
        let Some(cache) = &config.session_cache else {
            return Ok(());
        };
        let negotiated = self
            .core
            .negotiated
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("no negotiated parameters".into()))?;
        if !config.session_tickets || negotiated.auth_mode == AuthMode::Psk {
            return Ok(());
        }
        let rms = self
            .core
            .secrets
            .resumption_master
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("no resumption master secret".into()))?;

        let ticket: [u8; 32] = random_array()?;
        let ticket_age_add = u32::from_be_bytes(random_array()?);
        let session = TlsSession {
            ticket: ticket.to_vec(),
            version: negotiated.version,
            cipher_suite: negotiated.cipher_suite,
            resumption_master_secret: rms.as_bytes().to_vec(),
            alpn_protocol: negotiated.alpn_protocol.clone(),
            server_name: self.client_server_name.clone(),
            allow_early_data: config.enable_0rtt,
            ticket_age_add,
            ticket_lifetime: config.ticket_lifetime,
            created_at: now_secs(),
        };
        cache
            .lock()
            .map_err(|_| TlsError::InternalError("session cache lock poisoned".into()))?
            .put(&ticket, session);

        let mut extensions = Vec::new();
        if config.enable_0rtt {
            extensions.push(build_ticket_early_data_info(ticket_age_add));
        }
        let nst = NewSessionTicketMsg {
            ticket_lifetime: config.ticket_lifetime,
            ke_modes: vec![PSK_DHE_KE],
            auth_modes: vec![PSK_AUTH],
            extensions,
            ticket: ticket.to_vec(),
        };
        debug!("server issues a session ticket");
        self.core.send_untracked(&encode_new_session_ticket(&nst))
    }
}
