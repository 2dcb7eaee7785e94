//! Sans-IO TLS connection.
//!
//! The application moves bytes: records received from the peer go into
//! [`Connection::process_input`] and everything the engine wants to send is
//! collected with [`Connection::take_outbound`]. Handshake messages may span
//! records; records may carry several messages.

use std::sync::Arc;

use log::{debug, trace, warn};

use crate::alert::{Alert, AlertDescription, AlertLevel};
use crate::config::TlsConfig;
use crate::crypt::traffic_keys::TrafficPhase;
use crate::handshake::client::ClientHandshake;
use crate::handshake::codec::parse_handshake_header;
use crate::handshake::common::HandshakeCore;
use crate::handshake::server::ServerHandshake;
use crate::handshake::{HandshakeState, HandshakeType, NegotiatedParams, ZeroRttIgnore, ZeroRttState};
use crate::record::encryption::unprotect_record;
use crate::record::{ContentType, Direction};
use crate::session::TlsSession;
use crate::TlsRole;
use tls13hs_types::TlsError;

enum Endpoint {
    Client(ClientHandshake),
    Server(ServerHandshake),
}

impl Endpoint {
    fn core(&self) -> &HandshakeCore {
        match self {
            Endpoint::Client(c) => &c.core,
            Endpoint::Server(s) => &s.core,
        }
    }

    fn core_mut(&mut self) -> &mut HandshakeCore {
        match self {
            Endpoint::Client(c) => &mut c.core,
            Endpoint::Server(s) => &mut s.core,
        }
    }

    fn process_message(
        &mut self,
        msg_type: HandshakeType,
        body: &[u8],
        mark: usize,
    ) -> Result<(), TlsError> {
        match self {
            Endpoint::Client(c) => c.process_message(msg_type, body, mark),
            Endpoint::Server(s) => s.process_message(msg_type, body, mark),
        }
    }
}

/// One TLS endpoint.
pub struct Connection {
    endpoint: Endpoint,
    /// Handshake bytes not yet forming a complete message.
    handshake_buffer: Vec<u8>,
    app_data: Vec<u8>,
    early_data: Vec<u8>,
    /// First fatal error; every later call reports it again.
    failure: Option<TlsError>,
    /// Waiting for `resume_after_cert_auth`.
    suspended: bool,
    closed: bool,
}

impl Connection {
    /// Create an endpoint for `config.role`.
    pub fn new(config: TlsConfig) -> Self {
        let role = config.role;
        let config = Arc::new(config);
        let endpoint = match role {
            TlsRole::Client => Endpoint::Client(ClientHandshake::new(config)),
            TlsRole::Server => Endpoint::Server(ServerHandshake::new(config)),
        };
        Self {
            endpoint,
            handshake_buffer: Vec::new(),
            app_data: Vec::new(),
            early_data: Vec::new(),
            failure: None,
            suspended: false,
            closed: false,
        }
    }

    /// Client endpoint, whatever `config.role` says.
    pub fn client(mut config: TlsConfig) -> Self {
        config.role = TlsRole::Client;
        Self::new(config)
    }

    pub fn server(mut config: TlsConfig) -> Self {
        config.role = TlsRole::Server;
        Self::new(config)
    }

    pub fn role(&self) -> TlsRole {
        self.endpoint.core().role
    }

    /// Queue the ClientHello (and the 0-RTT preamble when resuming).
    ///
    /// Servers have nothing to start; they wait for a ClientHello.
    pub fn start(&mut self) -> Result<(), TlsError> {
        self.check_usable()?;
        let result = match &mut self.endpoint {
            Endpoint::Client(c) => c.start(),
            Endpoint::Server(_) => {
                return Err(TlsError::InternalError(
                    "a server waits for the ClientHello".into(),
                ))
            }
        };
        result.map_err(|e| self.fail(e))
    }

    /// Process one record from the front of `data`.
    ///
    /// Returns the number of bytes consumed. An incomplete record, or a
    /// handshake suspended on certificate authentication, is `WouldBlock`.
    pub fn process_record(&mut self, data: &[u8]) -> Result<usize, TlsError> {
        self.check_usable()?;
        if self.suspended {
            return Err(TlsError::WouldBlock);
        }
        match self.read_record(data) {
            Ok(consumed) => Ok(consumed),
            Err(TlsError::WouldBlock) => Err(TlsError::WouldBlock),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Process as many complete records of `data` as possible.
    ///
    /// Stops early when the handshake suspends; the unconsumed tail must be
    /// offered again after `resume_after_cert_auth`.
    pub fn process_input(&mut self, data: &[u8]) -> Result<usize, TlsError> {
        let mut offset = 0;
        while offset < data.len() && !self.suspended && !self.closed {
            match self.process_record(&data[offset..]) {
                Ok(n) => offset += n,
                Err(TlsError::WouldBlock) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(offset)
    }

    /// Bytes waiting to be sent to the peer.
    pub fn take_outbound(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.endpoint.core_mut().outbound)
    }

    pub fn has_outbound(&self) -> bool {
        !self.endpoint.core().outbound.is_empty()
    }

    /// Send 0-RTT data. Only a resuming client may do so, and only until
    /// its second flight.
    pub fn write_early_data(&mut self, data: &[u8]) -> Result<(), TlsError> {
        self.check_usable()?;
        let Endpoint::Client(c) = &mut self.endpoint else {
            return Err(TlsError::InternalError("servers do not send 0-RTT data".into()));
        };
        if !c.can_write_early_data() {
            return Err(TlsError::InternalError("0-RTT is not available".into()));
        }
        let sealed = c.core.record.seal(ContentType::ApplicationData, data);
        match sealed {
            Ok(wire) => {
                c.core.outbound.extend_from_slice(&wire);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Send application data once the application write keys are installed.
    ///
    /// A server may write as soon as its flight is out.
    pub fn write_application_data(&mut self, data: &[u8]) -> Result<(), TlsError> {
        self.check_usable()?;
        let core = self.endpoint.core_mut();
        if core.record.spec(Direction::Write).phase() != Some(TrafficPhase::ApplicationData) {
            return Err(TlsError::WouldBlock);
        }
        match core.record.seal(ContentType::ApplicationData, data) {
            Ok(wire) => {
                core.outbound.extend_from_slice(&wire);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Drain received application data.
    pub fn read_application_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.app_data)
    }

    /// Drain 0-RTT data received by a server.
    pub fn read_early_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.early_data)
    }

    /// Report the application's verdict on a pending server certificate.
    pub fn resume_after_cert_auth(&mut self, accepted: bool) -> Result<(), TlsError> {
        self.check_usable()?;
        let Endpoint::Client(c) = &mut self.endpoint else {
            return Err(TlsError::InternalError(
                "only clients authenticate asynchronously".into(),
            ));
        };
        if !c.cert_auth_pending {
            return Err(TlsError::InternalError(
                "no certificate authentication pending".into(),
            ));
        }
        let result = c.resume_after_cert_auth(accepted);
        self.suspended = false;
        match result.and_then(|()| self.drain_handshake()) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Queue a close_notify alert.
    pub fn send_close_notify(&mut self) -> Result<(), TlsError> {
        self.check_usable()?;
        let alert = Alert {
            level: AlertLevel::Warning,
            description: AlertDescription::CloseNotify,
        };
        self.endpoint.core_mut().send_alert(alert)
    }

    pub fn state(&self) -> HandshakeState {
        self.endpoint.core().state
    }

    pub fn zero_rtt_state(&self) -> ZeroRttState {
        self.endpoint.core().zero_rtt
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.state() == HandshakeState::IdleHandshake
    }

    pub fn is_cert_auth_pending(&self) -> bool {
        matches!(&self.endpoint, Endpoint::Client(c) if c.cert_auth_pending)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The fatal error that ended this connection, if any.
    pub fn error(&self) -> Option<&TlsError> {
        self.failure.as_ref()
    }

    /// Parameters negotiated so far; complete once the handshake is idle.
    pub fn negotiated(&self) -> Option<&NegotiatedParams> {
        self.endpoint.core().negotiated.as_ref()
    }

    /// Ticket most recently received by a client.
    pub fn session(&self) -> Option<&TlsSession> {
        match &self.endpoint {
            Endpoint::Client(c) => c.received_session.as_ref(),
            Endpoint::Server(_) => None,
        }
    }

    /// Certificate chain presented by the peer, leaf first.
    pub fn peer_certificates(&self) -> &[Vec<u8>] {
        match &self.endpoint {
            Endpoint::Client(c) => &c.server_certs,
            Endpoint::Server(s) => &s.client_certs,
        }
    }

    /// Derive keying material from the exporter secret.
    pub fn export_keying_material(
        &self,
        label: &[u8],
        context: &[u8],
        length: usize,
    ) -> Result<Vec<u8>, TlsError> {
        if !self.is_handshake_complete() {
            return Err(TlsError::InternalError("handshake not complete".into()));
        }
        self.endpoint
            .core()
            .export_keying_material(label, context, length)
    }

    fn check_usable(&self) -> Result<(), TlsError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if self.closed {
            return Err(TlsError::ConnectionClosed);
        }
        Ok(())
    }

    /// Latch `err`, send the matching fatal alert once and enter `Failed`.
    fn fail(&mut self, err: TlsError) -> TlsError {
        warn!("{:?} connection failed: {err}", self.role());
        let core = self.endpoint.core_mut();
        if !matches!(err, TlsError::AlertReceived(_)) {
            let alert = Alert::fatal(AlertDescription::from_error(&err));
            if let Err(e) = core.send_alert(alert) {
                debug!("could not send {:?} alert: {e}", alert.description);
            }
        }
        core.set_state(HandshakeState::Failed);
        self.failure = Some(err.clone());
        err
    }

    fn read_record(&mut self, data: &[u8]) -> Result<usize, TlsError> {
        let core = self.endpoint.core_mut();
        let (record, consumed) = core.record.parse_record(data)?;
        let read_spec = core.record.spec(Direction::Read).clone();

        // once a read key is installed every record must be protected,
        // alerts included
        if read_spec.is_null() {
            if core.zero_rtt_ignore == ZeroRttIgnore::Hrr
                && record.content_type == ContentType::ApplicationData
            {
                trace!("dropping protected record before the second ClientHello");
                return Ok(consumed);
            }
            self.process_plaintext(record.content_type, record.fragment)?;
            return Ok(consumed);
        }

        let transport = core.record.transport();
        let (content_type, body) = match unprotect_record(&read_spec, transport, &record) {
            Ok(Some(opened)) => opened,
            Ok(None) => {
                trace!("dropping stale or replayed datagram record");
                return Ok(consumed);
            }
            Err(TlsError::BadRecordMac) if core.zero_rtt_ignore == ZeroRttIgnore::Trial => {
                trace!("skipping 0-RTT record the server declined");
                return Ok(consumed);
            }
            Err(e) => return Err(e),
        };
        if core.zero_rtt_ignore == ZeroRttIgnore::Trial && content_type == ContentType::Handshake {
            core.zero_rtt_ignore = ZeroRttIgnore::None;
        }
        self.process_plaintext(content_type, body)?;
        Ok(consumed)
    }

    fn process_plaintext(&mut self, content_type: ContentType, body: Vec<u8>) -> Result<(), TlsError> {
        match content_type {
            ContentType::Handshake => {
                self.handshake_buffer.extend_from_slice(&body);
                self.drain_handshake()
            }
            ContentType::Alert => self.process_alert(&body),
            ContentType::ApplicationData => self.process_application_data(body),
            ContentType::ChangeCipherSpec => Err(TlsError::UnexpectedMessage(
                "change_cipher_spec is not used".into(),
            )),
        }
    }

    /// Hand every complete buffered handshake message to the state machine.
    fn drain_handshake(&mut self) -> Result<(), TlsError> {
        while !self.suspended && !self.handshake_buffer.is_empty() {
            let (msg_type, total) = match parse_handshake_header(&self.handshake_buffer) {
                Ok((msg_type, _, total)) => (msg_type, total),
                Err(TlsError::WouldBlock) => return Ok(()),
                Err(e) => return Err(e),
            };
            let msg: Vec<u8> = self.handshake_buffer.drain(..total).collect();
            let core = self.endpoint.core_mut();
            trace!("{:?} received {msg_type:?} ({total} bytes)", core.role);
            let mark = core.transcript.len();
            // post-handshake messages are not part of the transcript
            if core.state != HandshakeState::IdleHandshake {
                core.transcript.update(&msg);
            }
            let read_spec = core.record.spec(Direction::Read).clone();
            match self.endpoint.process_message(msg_type, &msg[4..], mark) {
                Ok(()) => {}
                Err(TlsError::WouldBlock) => {
                    debug!("handshake suspended on certificate authentication");
                    self.suspended = true;
                }
                Err(e) => return Err(e),
            }
            // a message may not straddle a read key change
            let rekeyed = !Arc::ptr_eq(&read_spec, self.endpoint.core().record.spec(Direction::Read));
            if rekeyed && !self.handshake_buffer.is_empty() {
                return Err(TlsError::UnexpectedMessage(format!(
                    "handshake data after {msg_type:?} crosses a key change"
                )));
            }
        }
        Ok(())
    }

    fn process_alert(&mut self, body: &[u8]) -> Result<(), TlsError> {
        let alert = Alert::decode(body)?;
        match (alert.level, alert.description) {
            (AlertLevel::Warning, AlertDescription::EndOfEarlyData) => match &mut self.endpoint {
                Endpoint::Server(s) => s.process_end_of_early_data(),
                Endpoint::Client(_) => Err(TlsError::UnexpectedMessage(
                    "end_of_early_data sent to a client".into(),
                )),
            },
            (_, AlertDescription::CloseNotify) => {
                debug!("peer sent close_notify");
                self.closed = true;
                Ok(())
            }
            (AlertLevel::Fatal, description) => {
                Err(TlsError::AlertReceived(format!("{description:?}")))
            }
            (AlertLevel::Warning, description) => {
                warn!("ignoring warning alert {description:?}");
                Ok(())
            }
        }
    }

    fn process_application_data(&mut self, body: Vec<u8>) -> Result<(), TlsError> {
        let phase = self.endpoint.core().record.spec(Direction::Read).phase();
        match phase {
            Some(TrafficPhase::EarlyApplicationData) => {
                trace!("received {} bytes of 0-RTT data", body.len());
                self.early_data.extend_from_slice(&body);
                Ok(())
            }
            Some(TrafficPhase::ApplicationData) => {
                self.app_data.extend_from_slice(&body);
                Ok(())
            }
            _ => Err(TlsError::UnexpectedMessage(
                "application data under handshake keys".into(),
            )),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.role())
            .field("state", &self.state())
            .field("zero_rtt", &self.zero_rtt_state())
            .field("failed", &self.failure.is_some())
            .finish_non_exhaustive()
    }
}
