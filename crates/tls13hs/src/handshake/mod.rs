//! Handshake protocol state machine.

pub mod client;
pub mod codec;
pub(crate) mod common;
pub mod extensions_codec;
pub mod key_exchange;
pub mod server;
pub mod signing;
pub mod verify;

use crate::crypt::{NamedGroup, SignatureScheme};
use crate::{CipherSuite, TlsVersion};
use tls13hs_types::TlsError;

/// Handshake message types (draft-14 numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    ClientHello = 1,
    ServerHello = 2,
    NewSessionTicket = 4,
    HelloRetryRequest = 6,
    EncryptedExtensions = 8,
    Certificate = 11,
    CertificateRequest = 13,
    CertificateVerify = 15,
    Finished = 20,
}

impl HandshakeType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(HandshakeType::ClientHello),
            2 => Some(HandshakeType::ServerHello),
            4 => Some(HandshakeType::NewSessionTicket),
            6 => Some(HandshakeType::HelloRetryRequest),
            8 => Some(HandshakeType::EncryptedExtensions),
            11 => Some(HandshakeType::Certificate),
            13 => Some(HandshakeType::CertificateRequest),
            15 => Some(HandshakeType::CertificateVerify),
            20 => Some(HandshakeType::Finished),
            _ => None,
        }
    }
}

/// Handshake state of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Client before the ClientHello went out.
    Initial,
    WaitClientHello,
    WaitServerHello,
    WaitEncryptedExtensions,
    /// Client: CertificateRequest or Certificate may follow.
    WaitCertRequest,
    WaitServerCert,
    WaitCertVerify,
    WaitFinished,
    /// Server: waiting for the client's early Finished after accepting 0-RTT.
    Wait0RttFinished,
    WaitClientCert,
    /// Handshake complete.
    IdleHandshake,
    /// Terminal state after a fatal error.
    Failed,
}

impl HandshakeState {
    /// Name used in log lines and error messages.
    pub fn name(self) -> &'static str {
        match self {
            HandshakeState::Initial => "initial",
            HandshakeState::WaitClientHello => "wait_client_hello",
            HandshakeState::WaitServerHello => "wait_server_hello",
            HandshakeState::WaitEncryptedExtensions => "wait_encrypted_extensions",
            HandshakeState::WaitCertRequest => "wait_cert_request",
            HandshakeState::WaitServerCert => "wait_server_cert",
            HandshakeState::WaitCertVerify => "wait_cert_verify",
            HandshakeState::WaitFinished => "wait_finished",
            HandshakeState::Wait0RttFinished => "wait_0rtt_finished",
            HandshakeState::WaitClientCert => "wait_client_cert",
            HandshakeState::IdleHandshake => "idle_handshake",
            HandshakeState::Failed => "failed",
        }
    }
}

/// Fail with `unexpected_message` unless `state` is one of `accepted`.
pub fn check_state(
    state: HandshakeState,
    accepted: &[HandshakeState],
    message: HandshakeType,
) -> Result<(), TlsError> {
    if accepted.contains(&state) {
        return Ok(());
    }
    Err(TlsError::UnexpectedMessage(format!(
        "{message:?} received in state {}",
        state.name()
    )))
}

/// Progress of 0-RTT for this handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroRttState {
    #[default]
    None,
    Sent,
    Accepted,
    Ignored,
    Done,
}

/// How a server that declined 0-RTT skips the client's early records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroRttIgnore {
    #[default]
    None,
    /// Drop records that fail to decrypt under the handshake key.
    Trial,
    /// Drop protected records until the second ClientHello arrives.
    Hrr,
}

/// How the server authenticated this handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Certificate,
    Psk,
}

/// PSK key-exchange modes in a NewSessionTicket.
pub const PSK_KE: u8 = 0;
pub const PSK_DHE_KE: u8 = 1;
/// PSK authentication modes in a NewSessionTicket.
pub const PSK_AUTH: u8 = 0;
pub const PSK_SIGN: u8 = 1;

/// Per-session negotiated parameters, reported when the handshake completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedParams {
    pub version: TlsVersion,
    pub cipher_suite: CipherSuite,
    pub group: Option<NamedGroup>,
    pub signature_scheme: Option<SignatureScheme>,
    pub auth_mode: AuthMode,
    pub resumed: bool,
    pub alpn_protocol: Option<Vec<u8>>,
    pub zero_rtt: ZeroRttState,
    /// Whether the server accepted the client's 0-RTT data.
    pub early_data_accepted: bool,
    pub client_authenticated: bool,
}

impl NegotiatedParams {
    pub(crate) fn new(cipher_suite: CipherSuite) -> Self {
        Self {
            version: TlsVersion::Tls13,
            cipher_suite,
            group: None,
            signature_scheme: None,
            auth_mode: AuthMode::Certificate,
            resumed: false,
            alpn_protocol: None,
            zero_rtt: ZeroRttState::None,
            early_data_accepted: false,
            client_authenticated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_type_values() {
        assert_eq!(HandshakeType::HelloRetryRequest as u8, 6);
        assert_eq!(HandshakeType::EncryptedExtensions as u8, 8);
        assert_eq!(HandshakeType::from_u8(6), Some(HandshakeType::HelloRetryRequest));
        assert_eq!(HandshakeType::from_u8(5), None);
    }

    #[test]
    fn test_check_state() {
        let ok = check_state(
            HandshakeState::WaitFinished,
            &[HandshakeState::WaitFinished, HandshakeState::Wait0RttFinished],
            HandshakeType::Finished,
        );
        assert!(ok.is_ok());
        let err = check_state(
            HandshakeState::WaitServerHello,
            &[HandshakeState::IdleHandshake],
            HandshakeType::NewSessionTicket,
        )
        .unwrap_err();
        match err {
            TlsError::UnexpectedMessage(msg) => assert!(msg.contains("wait_server_hello")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_state_names_unique() {
        let states = [
            HandshakeState::Initial,
            HandshakeState::WaitClientHello,
            HandshakeState::WaitServerHello,
            HandshakeState::WaitEncryptedExtensions,
            HandshakeState::WaitCertRequest,
            HandshakeState::WaitServerCert,
            HandshakeState::WaitCertVerify,
            HandshakeState::WaitFinished,
            HandshakeState::Wait0RttFinished,
            HandshakeState::WaitClientCert,
            HandshakeState::IdleHandshake,
            HandshakeState::Failed,
        ];
        let mut names: Vec<_> = states.iter().map(|s| s.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), states.len());
    }
}
