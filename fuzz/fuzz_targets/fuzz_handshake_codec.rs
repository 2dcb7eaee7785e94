#![no_main]
use libfuzzer_sys::fuzz_target;
use tls13hs::config::TlsConfig;
use tls13hs::handshake::codec;
use tls13hs::handshake::signing::{CertifiedKey, PrivateKey};
use tls13hs::handshake::HandshakeType;
use tls13hs::{Connection, TlsRole};

fuzz_target!(|data: &[u8]| {
    if let Ok((msg_type, body, _)) = codec::parse_handshake_header(data) {
        let _ = match msg_type {
            HandshakeType::ClientHello => codec::decode_client_hello(body).map(drop),
            HandshakeType::ServerHello => codec::decode_server_hello(body).map(drop),
            HandshakeType::HelloRetryRequest => codec::decode_hello_retry_request(body).map(drop),
            HandshakeType::EncryptedExtensions => {
                codec::decode_encrypted_extensions(body).map(drop)
            }
            HandshakeType::CertificateRequest => codec::decode_certificate_request(body).map(drop),
            HandshakeType::Certificate => codec::decode_certificate(body).map(drop),
            HandshakeType::CertificateVerify => codec::decode_certificate_verify(body).map(drop),
            HandshakeType::NewSessionTicket => codec::decode_new_session_ticket(body).map(drop),
            HandshakeType::Finished => {
                let _ = codec::decode_finished(body);
                Ok(())
            }
        };
    }

    // The same bytes as a server's first flight of input.
    let Ok(cert) = CertifiedKey::from_raw_key(PrivateKey::Ed25519([1u8; 32])) else {
        return;
    };
    let config = TlsConfig::builder()
        .role(TlsRole::Server)
        .certificate(cert)
        .build();
    let mut server = Connection::new(config);
    let _ = server.process_input(data);
    let _ = server.take_outbound();
});
