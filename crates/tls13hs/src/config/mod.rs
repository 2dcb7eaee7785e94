//! Per-endpoint handshake configuration, assembled with [`TlsConfigBuilder`].

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::crypt::{NamedGroup, SignatureScheme};
use crate::handshake::signing::CertifiedKey;
use crate::handshake::verify::{CertificateVerifier, RawPublicKeyVerifier};
use crate::handshake::NegotiatedParams;
use crate::session::{SessionCache, TlsSession};
use crate::{CipherSuite, TlsRole, Transport};

/// Receives NSS key-log lines (`<label> <client_random> <secret>`).
pub type KeyLogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Called once when the handshake reaches the idle state.
pub type HandshakeCallback = Arc<dyn Fn(&NegotiatedParams) + Send + Sync>;

/// Called with `true` when 0-RTT is accepted and `false` when it is not.
pub type EarlyDataCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Asked for a client certificate when the server requests one.
pub type ClientCertCallback = Arc<dyn Fn(&[SignatureScheme]) -> Option<CertifiedKey> + Send + Sync>;

/// Shared session cache handle.
pub type SharedSessionCache = Arc<Mutex<dyn SessionCache>>;

/// Everything a [`Connection`](crate::connection::Connection) needs to know before it starts.
#[derive(Clone)]
pub struct TlsConfig {
    pub role: TlsRole,
    /// Most preferred first.
    pub cipher_suites: Vec<CipherSuite>,
    /// Supported named groups, in preference order. A client sends a key
    /// share for the first one only.
    pub supported_groups: Vec<NamedGroup>,
    /// Schemes we accept from the peer, most preferred first.
    pub signature_algorithms: Vec<SignatureScheme>,
    /// Offered (client) or acceptable (server) ALPN names.
    pub alpn_protocols: Vec<Vec<u8>>,
    /// Sent as SNI; also the client session cache key.
    pub server_name: Option<String>,
    /// Client: offer 0-RTT when resuming. Server: accept it.
    pub enable_0rtt: bool,
    /// Server: issue a NewSessionTicket after a full handshake.
    pub session_tickets: bool,
    /// Lifetime hint in issued tickets, seconds.
    pub ticket_lifetime: u32,
    /// Server: send a CertificateRequest.
    pub request_client_cert: bool,
    /// Server: fail the handshake if the client sends no certificate.
    pub require_client_cert: bool,
    /// Server certificates to choose from.
    pub certificates: Vec<CertifiedKey>,
    /// Client certificate used when no callback is set.
    pub client_certificate: Option<CertifiedKey>,
    pub client_cert_callback: Option<ClientCertCallback>,
    /// Peer certificate verifier.
    pub verifier: Arc<dyn CertificateVerifier>,
    /// Tickets are stored here: by identity on the server, by server name on
    /// the client.
    pub session_cache: Option<SharedSessionCache>,
    /// Explicit ticket to offer, ahead of any cached one.
    pub resumption_session: Option<TlsSession>,
    pub transport: Transport,
    /// Overrides the per-suite record limit of each key.
    pub record_limit: Option<u64>,
    pub key_log_callback: Option<KeyLogCallback>,
    pub on_handshake_complete: Option<HandshakeCallback>,
    pub on_early_data: Option<EarlyDataCallback>,
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("role", &self.role)
            .field("cipher_suites", &self.cipher_suites)
            .field("supported_groups", &self.supported_groups)
            .field("transport", &self.transport)
            .field("enable_0rtt", &self.enable_0rtt)
            .field("certificates", &self.certificates.len())
            .field(
                "key_log_callback",
                &self.key_log_callback.as_ref().map(|_| "<callback>"),
            )
            .finish_non_exhaustive()
    }
}

impl TlsConfig {
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }
}

/// Starts from client defaults with all three suites enabled.
pub struct TlsConfigBuilder {
    config: TlsConfig,
}

impl Default for TlsConfigBuilder {
    fn default() -> Self {
        Self {
            config: TlsConfig {
                role: TlsRole::Client,
                cipher_suites: vec![
                    CipherSuite::TLS_AES_128_GCM_SHA256,
                    CipherSuite::TLS_AES_256_GCM_SHA384,
                    CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
                ],
                supported_groups: vec![NamedGroup::X25519, NamedGroup::SECP256R1],
                signature_algorithms: vec![
                    SignatureScheme::ED25519,
                    SignatureScheme::ECDSA_SECP256R1_SHA256,
                ],
                alpn_protocols: Vec::new(),
                server_name: None,
                enable_0rtt: false,
                session_tickets: true,
                ticket_lifetime: 7200,
                request_client_cert: false,
                require_client_cert: false,
                certificates: Vec::new(),
                client_certificate: None,
                client_cert_callback: None,
                verifier: Arc::new(RawPublicKeyVerifier::new()),
                session_cache: None,
                resumption_session: None,
                transport: Transport::Stream,
                record_limit: None,
                key_log_callback: None,
                on_handshake_complete: None,
                on_early_data: None,
            },
        }
    }
}

impl fmt::Debug for TlsConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfigBuilder")
            .field("role", &self.config.role)
            .field("cipher_suites", &self.config.cipher_suites)
            .finish_non_exhaustive()
    }
}

impl TlsConfigBuilder {
    pub fn role(mut self, role: TlsRole) -> Self {
        self.config.role = role;
        self
    }

    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.config.cipher_suites = suites.to_vec();
        self
    }

    pub fn supported_groups(mut self, groups: &[NamedGroup]) -> Self {
        self.config.supported_groups = groups.to_vec();
        self
    }

    pub fn signature_algorithms(mut self, schemes: &[SignatureScheme]) -> Self {
        self.config.signature_algorithms = schemes.to_vec();
        self
    }

    pub fn alpn(mut self, protocols: &[&[u8]]) -> Self {
        self.config.alpn_protocols = protocols.iter().map(|p| p.to_vec()).collect();
        self
    }

    pub fn server_name(mut self, name: &str) -> Self {
        self.config.server_name = Some(name.to_string());
        self
    }

    pub fn enable_0rtt(mut self, enable: bool) -> Self {
        self.config.enable_0rtt = enable;
        self
    }

    pub fn session_tickets(mut self, enable: bool) -> Self {
        self.config.session_tickets = enable;
        self
    }

    pub fn ticket_lifetime(mut self, secs: u32) -> Self {
        self.config.ticket_lifetime = secs;
        self
    }

    pub fn request_client_cert(mut self, request: bool) -> Self {
        self.config.request_client_cert = request;
        self
    }

    /// Implies `request_client_cert(true)`.
    pub fn require_client_cert(mut self, require: bool) -> Self {
        self.config.require_client_cert = require;
        if require {
            self.config.request_client_cert = true;
        }
        self
    }

    pub fn certificate(mut self, cert: CertifiedKey) -> Self {
        self.config.certificates.push(cert);
        self
    }

    pub fn client_certificate(mut self, cert: CertifiedKey) -> Self {
        self.config.client_certificate = Some(cert);
        self
    }

    pub fn client_cert_callback(mut self, cb: ClientCertCallback) -> Self {
        self.config.client_cert_callback = Some(cb);
        self
    }

    /// Peer authentication policy.
    ///
    /// **Warning:** the default is a [`RawPublicKeyVerifier`] with no pinned
    /// keys, which accepts any peer key. The peer only proves it holds the
    /// key it presented, so the handshake is unauthenticated until a
    /// verifier with trusted keys (for example
    /// [`RawPublicKeyVerifier::with_trusted`]) is set here.
    pub fn verifier(mut self, verifier: Arc<dyn CertificateVerifier>) -> Self {
        self.config.verifier = verifier;
        self
    }

    pub fn session_cache(mut self, cache: SharedSessionCache) -> Self {
        self.config.session_cache = Some(cache);
        self
    }

    pub fn resumption_session(mut self, session: TlsSession) -> Self {
        self.config.resumption_session = Some(session);
        self
    }

    pub fn transport(mut self, transport: Transport) -> Self {
        self.config.transport = transport;
        self
    }

    pub fn record_limit(mut self, limit: u64) -> Self {
        self.config.record_limit = Some(limit);
        self
    }

    pub fn key_log(mut self, cb: KeyLogCallback) -> Self {
        self.config.key_log_callback = Some(cb);
        self
    }

    pub fn on_handshake_complete(mut self, cb: HandshakeCallback) -> Self {
        self.config.on_handshake_complete = Some(cb);
        self
    }

    pub fn on_early_data(mut self, cb: EarlyDataCallback) -> Self {
        self.config.on_early_data = Some(cb);
        self
    }

    pub fn build(self) -> TlsConfig {
        self.config
    }
}
