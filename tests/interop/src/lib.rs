//! End-to-end handshake scenarios.
//! A client and a server `Connection` exchange records in memory.

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tls13hs::config::{SharedSessionCache, TlsConfig, TlsConfigBuilder};
    use tls13hs::crypt::{NamedGroup, SignatureScheme};
    use tls13hs::handshake::signing::{CertifiedKey, PrivateKey};
    use tls13hs::handshake::verify::RawPublicKeyVerifier;
    use tls13hs::handshake::{NegotiatedParams, ZeroRttState};
    use tls13hs::session::{InMemorySessionCache, TlsSession};
    use tls13hs::{CipherSuite, Connection, TlsRole, Transport};
    use tls13hs_types::TlsError;

    const SERVER_SEED: [u8; 32] = [0x42; 32];

    fn ed25519_identity(seed: [u8; 32]) -> CertifiedKey {
        CertifiedKey::from_raw_key(PrivateKey::Ed25519(seed)).unwrap()
    }

    fn p256_identity() -> CertifiedKey {
        let mut scalar = [0u8; 32];
        scalar[31] = 0x2a;
        CertifiedKey::from_raw_key(PrivateKey::EcdsaP256(scalar)).unwrap()
    }

    fn client() -> TlsConfigBuilder {
        TlsConfig::builder().role(TlsRole::Client)
    }

    fn server() -> TlsConfigBuilder {
        TlsConfig::builder()
            .role(TlsRole::Server)
            .certificate(ed25519_identity(SERVER_SEED))
    }

    fn cache() -> SharedSessionCache {
        Arc::new(Mutex::new(InMemorySessionCache::new(32)))
    }

    fn connect(client: TlsConfigBuilder, server: TlsConfigBuilder) -> (Connection, Connection) {
        let mut c = Connection::new(client.build());
        let s = Connection::new(server.build());
        c.start().unwrap();
        (c, s)
    }

    fn send(from: &mut Connection, to: &mut Connection) -> Result<usize, TlsError> {
        let wire = from.take_outbound();
        to.process_input(&wire)
    }

    fn run(c: &mut Connection, s: &mut Connection) {
        for _ in 0..8 {
            if !c.has_outbound() && !s.has_outbound() {
                return;
            }
            send(c, s).unwrap();
            send(s, c).unwrap();
        }
        panic!("endpoints kept talking");
    }

    fn echo(c: &mut Connection, s: &mut Connection, payload: &[u8]) {
        c.write_application_data(payload).unwrap();
        send(c, s).unwrap();
        let got = s.read_application_data();
        assert_eq!(got, payload);
        s.write_application_data(&got).unwrap();
        send(s, c).unwrap();
        assert_eq!(c.read_application_data(), payload);
    }

    /// Handshake once and return the ticket the client kept.
    fn ticket(client: TlsConfigBuilder, server: TlsConfigBuilder) -> TlsSession {
        let (mut c, mut s) = connect(client, server);
        run(&mut c, &mut s);
        c.session().cloned().unwrap()
    }

    // -------------------------------------------------------
    // 1. Full handshake with every cipher suite
    // -------------------------------------------------------
    #[test]
    fn test_full_handshake_all_suites() {
        for suite in [
            CipherSuite::TLS_AES_128_GCM_SHA256,
            CipherSuite::TLS_AES_256_GCM_SHA384,
            CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
        ] {
            let (mut c, mut s) = connect(client().cipher_suites(&[suite]), server());
            run(&mut c, &mut s);
            assert!(c.is_handshake_complete());
            assert!(s.is_handshake_complete());
            assert_eq!(c.negotiated().unwrap().cipher_suite, suite);
            assert_eq!(s.negotiated().unwrap().cipher_suite, suite);
            echo(&mut c, &mut s, b"hello over tls 1.3 draft 14");
        }
    }

    // -------------------------------------------------------
    // 2. Both sides log identical secrets
    // -------------------------------------------------------
    #[test]
    fn test_key_log_lines_match() {
        let client_lines = Arc::new(Mutex::new(Vec::new()));
        let server_lines = Arc::new(Mutex::new(Vec::new()));
        let cl = client_lines.clone();
        let sl = server_lines.clone();
        let (mut c, mut s) = connect(
            client().key_log(Arc::new(move |line: &str| cl.lock().unwrap().push(line.to_string()))),
            server().key_log(Arc::new(move |line: &str| sl.lock().unwrap().push(line.to_string()))),
        );
        run(&mut c, &mut s);

        let mut client_lines = client_lines.lock().unwrap().clone();
        let mut server_lines = server_lines.lock().unwrap().clone();
        assert_eq!(client_lines.len(), 5);
        client_lines.sort();
        server_lines.sort();
        assert_eq!(client_lines, server_lines);
        let labels: Vec<&str> = client_lines
            .iter()
            .map(|l| l.split(' ').next().unwrap())
            .collect();
        assert_eq!(
            labels,
            [
                "CLIENT_HANDSHAKE_TRAFFIC_SECRET",
                "CLIENT_TRAFFIC_SECRET_0",
                "EXPORTER_SECRET",
                "SERVER_HANDSHAKE_TRAFFIC_SECRET",
                "SERVER_TRAFFIC_SECRET_0",
            ]
        );
    }

    // -------------------------------------------------------
    // 3. Pinned server key, P-256 server certificate
    // -------------------------------------------------------
    #[test]
    fn test_pinned_server_keys() {
        let pinned = ed25519_dalek::SigningKey::from_bytes(&SERVER_SEED)
            .verifying_key()
            .to_bytes()
            .to_vec();
        let (mut c, mut s) = connect(
            client().verifier(Arc::new(RawPublicKeyVerifier::with_trusted(vec![pinned.clone()]))),
            server(),
        );
        run(&mut c, &mut s);
        assert!(c.is_handshake_complete());
        assert_eq!(c.peer_certificates(), [pinned].as_slice());

        let (mut c, mut s) = connect(
            client().verifier(Arc::new(RawPublicKeyVerifier::with_trusted(vec![vec![7u8; 32]]))),
            server(),
        );
        send(&mut c, &mut s).unwrap();
        assert!(matches!(send(&mut s, &mut c), Err(TlsError::BadCertificate(_))));

        let p256 = TlsConfig::builder()
            .role(TlsRole::Server)
            .certificate(p256_identity());
        let (mut c, mut s) = connect(client(), p256);
        run(&mut c, &mut s);
        let scheme = c.negotiated().unwrap().signature_scheme.unwrap();
        assert_eq!(scheme, p256_identity().key.scheme());
    }

    // -------------------------------------------------------
    // 4. HelloRetryRequest, then no shared group at all
    // -------------------------------------------------------
    #[test]
    fn test_hello_retry_request() {
        let (mut c, mut s) = connect(
            client().supported_groups(&[NamedGroup::X25519, NamedGroup::SECP256R1]),
            server().supported_groups(&[NamedGroup::SECP256R1, NamedGroup::X25519]),
        );
        run(&mut c, &mut s);
        assert!(c.is_handshake_complete());
        assert_eq!(c.negotiated().unwrap().group, Some(NamedGroup::SECP256R1));
        echo(&mut c, &mut s, b"after retry");

        let (mut c, mut s) = connect(
            client().supported_groups(&[NamedGroup::X25519]),
            server().supported_groups(&[NamedGroup::SECP256R1]),
        );
        send(&mut c, &mut s).unwrap_err();
        assert!(matches!(
            send(&mut s, &mut c),
            Err(TlsError::AlertReceived(_))
        ));
    }

    // -------------------------------------------------------
    // 5. Resumption through the session caches
    // -------------------------------------------------------
    #[test]
    fn test_resumption_via_caches() {
        let client_cache = cache();
        let server_cache = cache();
        let c_cfg = || {
            client()
                .server_name("resume.example")
                .session_cache(client_cache.clone())
        };
        let s_cfg = || server().session_cache(server_cache.clone());

        let (mut c, mut s) = connect(c_cfg(), s_cfg());
        run(&mut c, &mut s);
        assert!(!c.negotiated().unwrap().resumed);
        assert!(c.session().is_some());

        let (mut c, mut s) = connect(c_cfg(), s_cfg());
        run(&mut c, &mut s);
        assert!(c.negotiated().unwrap().resumed);
        assert!(s.negotiated().unwrap().resumed);
        assert!(c.negotiated().unwrap().signature_scheme.is_none());
        // no new ticket after a PSK handshake
        assert!(c.session().is_none());
        echo(&mut c, &mut s, b"resumed");

        // a ticket from another server name is refused
        let offered = ticket(client().server_name("resume.example"), s_cfg());
        let (mut c, mut s) = connect(
            client()
                .server_name("other.example")
                .resumption_session(offered),
            s_cfg(),
        );
        assert!(matches!(
            send(&mut c, &mut s),
            Err(TlsError::HandshakeFailure(_))
        ));
    }

    // -------------------------------------------------------
    // 6. 0-RTT accepted, with callbacks
    // -------------------------------------------------------
    #[test]
    fn test_zero_rtt_accepted() {
        let server_cache = cache();
        let first = ticket(
            client().alpn(&[b"h2"]),
            server()
                .alpn(&[b"h2"])
                .enable_0rtt(true)
                .session_cache(server_cache.clone()),
        );
        assert!(first.allow_early_data);
        assert_eq!(first.alpn_protocol.as_deref(), Some(&b"h2"[..]));

        let verdicts = Arc::new(Mutex::new(Vec::new()));
        let v = verdicts.clone();
        let completed = Arc::new(Mutex::new(None));
        let done = completed.clone();
        let (mut c, mut s) = connect(
            client()
                .alpn(&[b"h2"])
                .enable_0rtt(true)
                .resumption_session(first)
                .on_early_data(Arc::new(move |accepted: bool| v.lock().unwrap().push(accepted))),
            server()
                .alpn(&[b"h2"])
                .enable_0rtt(true)
                .session_cache(server_cache.clone())
                .on_handshake_complete(Arc::new(move |params: &NegotiatedParams| {
                    *done.lock().unwrap() = Some(params.clone());
                })),
        );
        c.write_early_data(b"GET / ").unwrap();
        c.write_early_data(b"HTTP/1.1").unwrap();
        run(&mut c, &mut s);

        assert_eq!(s.read_early_data(), b"GET / HTTP/1.1");
        assert_eq!(*verdicts.lock().unwrap(), vec![true]);
        let params = completed.lock().unwrap().clone().unwrap();
        assert!(params.resumed);
        assert!(params.early_data_accepted);
        assert_eq!(params.zero_rtt, ZeroRttState::Done);
        assert_eq!(params.alpn_protocol.as_deref(), Some(&b"h2"[..]));
        echo(&mut c, &mut s, b"1-rtt data");
    }

    // -------------------------------------------------------
    // 7. 0-RTT ignored when the server picks another ALPN
    // -------------------------------------------------------
    #[test]
    fn test_zero_rtt_ignored_on_alpn_change() {
        let server_cache = cache();
        let first = ticket(
            client().alpn(&[b"h2"]),
            server()
                .alpn(&[b"h2"])
                .enable_0rtt(true)
                .session_cache(server_cache.clone()),
        );

        let (mut c, mut s) = connect(
            client()
                .alpn(&[b"h2", b"http/1.1"])
                .enable_0rtt(true)
                .resumption_session(first),
            server()
                .alpn(&[b"http/1.1", b"h2"])
                .enable_0rtt(true)
                .session_cache(server_cache.clone()),
        );
        assert_eq!(c.zero_rtt_state(), ZeroRttState::Sent);
        c.write_early_data(b"lost").unwrap();
        run(&mut c, &mut s);

        assert!(s.is_handshake_complete());
        assert!(s.read_early_data().is_empty());
        assert_eq!(c.zero_rtt_state(), ZeroRttState::Ignored);
        assert_eq!(s.zero_rtt_state(), ZeroRttState::Ignored);
        let params = c.negotiated().unwrap();
        assert!(params.resumed);
        assert_eq!(params.alpn_protocol.as_deref(), Some(&b"http/1.1"[..]));
        echo(&mut c, &mut s, b"retransmitted");
    }

    // -------------------------------------------------------
    // 8. 0-RTT dropped by a HelloRetryRequest
    // -------------------------------------------------------
    #[test]
    fn test_zero_rtt_with_hello_retry() {
        let server_cache = cache();
        let first = ticket(
            client(),
            server().enable_0rtt(true).session_cache(server_cache.clone()),
        );

        let (mut c, mut s) = connect(
            client()
                .supported_groups(&[NamedGroup::X25519, NamedGroup::SECP256R1])
                .enable_0rtt(true)
                .resumption_session(first),
            server()
                .supported_groups(&[NamedGroup::SECP256R1])
                .enable_0rtt(true)
                .session_cache(server_cache.clone()),
        );
        c.write_early_data(b"before retry").unwrap();
        run(&mut c, &mut s);

        assert!(c.is_handshake_complete());
        assert!(s.is_handshake_complete());
        assert!(s.read_early_data().is_empty());
        assert_eq!(c.zero_rtt_state(), ZeroRttState::Ignored);
        assert!(s.negotiated().unwrap().resumed);
        echo(&mut c, &mut s, b"after retry");
    }

    // -------------------------------------------------------
    // 9. Client authentication
    // -------------------------------------------------------
    #[test]
    fn test_client_authentication() {
        let (mut c, mut s) = connect(
            client().client_certificate(p256_identity()),
            server().request_client_cert(true),
        );
        run(&mut c, &mut s);
        let params = s.negotiated().unwrap();
        assert!(params.client_authenticated);
        assert_eq!(s.peer_certificates(), p256_identity().chain.as_slice());

        // optional authentication, client declines
        let (mut c, mut s) = connect(client(), server().request_client_cert(true));
        run(&mut c, &mut s);
        assert!(s.is_handshake_complete());
        assert!(!s.negotiated().unwrap().client_authenticated);
        assert!(s.peer_certificates().is_empty());

        // the callback picks the certificate
        let (mut c, mut s) = connect(
            client().client_cert_callback(Arc::new(|_schemes: &[SignatureScheme]| {
                Some(ed25519_identity([0x17; 32]))
            })),
            server().request_client_cert(true).require_client_cert(true),
        );
        run(&mut c, &mut s);
        assert!(s.negotiated().unwrap().client_authenticated);
    }

    // -------------------------------------------------------
    // 10. Datagram transport, full and 0-RTT
    // -------------------------------------------------------
    #[test]
    fn test_datagram_handshakes() {
        let server_cache = cache();
        let dgram_server = || {
            server()
                .transport(Transport::Datagram)
                .enable_0rtt(true)
                .session_cache(server_cache.clone())
        };
        let dgram_client = || client().transport(Transport::Datagram).enable_0rtt(true);

        let (mut c, mut s) = connect(dgram_client(), dgram_server());
        run(&mut c, &mut s);
        assert!(c.is_handshake_complete());
        echo(&mut c, &mut s, b"datagram 1-rtt");
        let first = c.session().cloned().unwrap();

        let (mut c, mut s) = connect(dgram_client().resumption_session(first.clone()), dgram_server());
        c.write_early_data(b"datagram 0-rtt").unwrap();
        run(&mut c, &mut s);
        assert_eq!(s.read_early_data(), b"datagram 0-rtt");
        assert_eq!(c.zero_rtt_state(), ZeroRttState::Done);
        echo(&mut c, &mut s, b"datagram after 0-rtt");

        // declined 0-RTT still leaves both epochs in step
        let (mut c, mut s) = connect(
            dgram_client().resumption_session(first),
            server()
                .transport(Transport::Datagram)
                .session_cache(server_cache.clone()),
        );
        c.write_early_data(b"ignored").unwrap();
        run(&mut c, &mut s);
        assert!(s.is_handshake_complete());
        assert!(s.read_early_data().is_empty());
        echo(&mut c, &mut s, b"datagram after ignored 0-rtt");
    }

    // -------------------------------------------------------
    // 11. Record limit, exporter agreement, shutdown
    // -------------------------------------------------------
    #[test]
    fn test_record_limit_and_shutdown() {
        // the server's encrypted flight is four records, one per message
        let (mut c, mut s) = connect(client().record_limit(4), server());
        run(&mut c, &mut s);
        let label = b"EXPORTER-interop";
        assert_eq!(
            c.export_keying_material(label, b"", 48).unwrap(),
            s.export_keying_material(label, b"", 48).unwrap()
        );

        for chunk in [&b"one"[..], b"two", b"three", b"four"] {
            c.write_application_data(chunk).unwrap();
        }
        assert_eq!(c.write_application_data(b"five"), Err(TlsError::TooManyRecords));
        assert_eq!(c.error(), Some(&TlsError::TooManyRecords));

        send(&mut c, &mut s).unwrap();
        assert_eq!(s.read_application_data(), b"onetwothreefour");

        // the failed client ignores anything further
        s.send_close_notify().unwrap();
        assert_eq!(send(&mut s, &mut c), Err(TlsError::TooManyRecords));
    }

    #[test]
    fn test_record_limit_applies_to_received_records() {
        let (mut c, mut s) = connect(client().record_limit(4), server());
        run(&mut c, &mut s);
        for chunk in [&b"a"[..], b"b", b"c", b"d"] {
            s.write_application_data(chunk).unwrap();
        }
        send(&mut s, &mut c).unwrap();
        assert_eq!(c.read_application_data(), b"abcd");

        s.write_application_data(b"e").unwrap();
        assert_eq!(send(&mut s, &mut c), Err(TlsError::TooManyRecords));
        assert_eq!(c.error(), Some(&TlsError::TooManyRecords));
        assert!(c.read_application_data().is_empty());
    }
}
