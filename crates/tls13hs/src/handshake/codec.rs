//! TLS 1.3 (draft 14) handshake message encoding/decoding.
//!
//! Decoders take the message body (after the 4-byte header) and reject
//! truncated input and trailing bytes with `decode_error`.

use crate::crypt::{NamedGroup, SignatureScheme};
use crate::extensions::{find_extension, Extension, ExtensionType};
use crate::{CipherSuite, LEGACY_VERSION};
use tls13hs_types::TlsError;

use super::HandshakeType;

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// ClientHello message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub random: [u8; 32],
    pub legacy_session_id: Vec<u8>,
    pub cipher_suites: Vec<CipherSuite>,
    pub extensions: Vec<Extension>,
}

/// ServerHello message. `version` is the negotiated (draft) version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub version: u16,
    pub random: [u8; 32],
    pub cipher_suite: CipherSuite,
    pub extensions: Vec<Extension>,
}

/// HelloRetryRequest message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloRetryRequest {
    pub version: u16,
    pub extensions: Vec<Extension>,
}

/// EncryptedExtensions message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedExtensions {
    pub extensions: Vec<Extension>,
}

/// CertificateRequest message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequestMsg {
    pub certificate_request_context: Vec<u8>,
    pub signature_algorithms: Vec<SignatureScheme>,
    pub certificate_authorities: Vec<Vec<u8>>,
    pub extensions: Vec<Extension>,
}

/// Certificate message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateMsg {
    pub certificate_request_context: Vec<u8>,
    pub certificate_list: Vec<Vec<u8>>,
}

/// CertificateVerify message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerifyMsg {
    pub algorithm: SignatureScheme,
    pub signature: Vec<u8>,
}

/// Finished message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedMsg {
    pub verify_data: Vec<u8>,
}

/// NewSessionTicket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionTicketMsg {
    pub ticket_lifetime: u32,
    pub ke_modes: Vec<u8>,
    pub auth_modes: Vec<u8>,
    pub extensions: Vec<Extension>,
    pub ticket: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Bounds-checked big-endian cursor over a message body.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8], what: &'static str) -> Self {
        Self { data, pos: 0, what }
    }

    pub(crate) fn err(&self, msg: &str) -> TlsError {
        TlsError::DecodeError(format!("{}: {msg}", self.what))
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], TlsError> {
        if self.remaining() < n {
            return Err(self.err("truncated"));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, TlsError> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, TlsError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u24(&mut self) -> Result<usize, TlsError> {
        Ok(read_u24(self.bytes(3)?) as usize)
    }

    pub(crate) fn u32(&mut self) -> Result<u32, TlsError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// opaque field with a 1-byte length prefix.
    pub(crate) fn vec8(&mut self) -> Result<&'a [u8], TlsError> {
        let n = self.u8()? as usize;
        self.bytes(n)
    }

    /// opaque field with a 2-byte length prefix.
    pub(crate) fn vec16(&mut self) -> Result<&'a [u8], TlsError> {
        let n = self.u16()? as usize;
        self.bytes(n)
    }

    /// opaque field with a 3-byte length prefix.
    pub(crate) fn vec24(&mut self) -> Result<&'a [u8], TlsError> {
        let n = self.u24()?;
        self.bytes(n)
    }

    pub(crate) fn finish(&self) -> Result<(), TlsError> {
        if self.remaining() != 0 {
            return Err(self.err("trailing data"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Handshake header
// ---------------------------------------------------------------------------

/// Largest handshake body we are willing to buffer.
pub const MAX_HANDSHAKE_MESSAGE_LEN: usize = 0x1_ffff;

/// Parse a handshake header: msg_type(1) || length(3).
/// Returns (HandshakeType, body_slice, total_bytes_consumed).
///
/// A header or body that is not complete yet gives `WouldBlock`; an
/// advertised length above [`MAX_HANDSHAKE_MESSAGE_LEN`] is refused at once.
pub fn parse_handshake_header(data: &[u8]) -> Result<(HandshakeType, &[u8], usize), TlsError> {
    if data.len() < 4 {
        return Err(TlsError::WouldBlock);
    }
    let msg_type = HandshakeType::from_u8(data[0]).ok_or_else(|| {
        TlsError::UnexpectedMessage(format!("unknown handshake type: {}", data[0]))
    })?;
    let body_len = read_u24(&data[1..4]) as usize;
    if body_len > MAX_HANDSHAKE_MESSAGE_LEN {
        return Err(TlsError::DecodeError(format!(
            "{msg_type:?} of {body_len} bytes is too large"
        )));
    }
    let total = 4 + body_len;
    if data.len() < total {
        return Err(TlsError::WouldBlock);
    }
    Ok((msg_type, &data[4..total], total))
}

/// Wrap a handshake body with the 4-byte header.
pub fn wrap_handshake(msg_type: HandshakeType, body: &[u8]) -> Vec<u8> {
    let len = body.len();
    let mut out = Vec::with_capacity(4 + len);
    out.push(msg_type as u8);
    out.push((len >> 16) as u8);
    out.push((len >> 8) as u8);
    out.push(len as u8);
    out.extend_from_slice(body);
    out
}

// ---------------------------------------------------------------------------
// ClientHello
// ---------------------------------------------------------------------------

/// Encode a ClientHello as a complete handshake message (header + body).
pub fn encode_client_hello(ch: &ClientHello) -> Vec<u8> {
    let mut body = Vec::with_capacity(256);
    body.extend_from_slice(&LEGACY_VERSION.to_be_bytes());
    body.extend_from_slice(&ch.random);
    body.push(ch.legacy_session_id.len() as u8);
    body.extend_from_slice(&ch.legacy_session_id);

    body.extend_from_slice(&((ch.cipher_suites.len() * 2) as u16).to_be_bytes());
    for s in &ch.cipher_suites {
        body.extend_from_slice(&s.0.to_be_bytes());
    }

    // legacy_compression_methods = {null}
    body.push(1);
    body.push(0);

    put_extensions(&mut body, &ch.extensions);
    wrap_handshake(HandshakeType::ClientHello, &body)
}

/// Decode a ClientHello body.
pub fn decode_client_hello(data: &[u8]) -> Result<ClientHello, TlsError> {
    let mut r = Reader::new(data, "ClientHello");
    let _legacy_version = r.u16()?;
    let mut random = [0u8; 32];
    random.copy_from_slice(r.bytes(32)?);
    let legacy_session_id = r.vec8()?.to_vec();
    if legacy_session_id.len() > 32 {
        return Err(r.err("session id too long"));
    }

    let suites = r.vec16()?;
    if suites.is_empty() || suites.len() % 2 != 0 {
        return Err(r.err("bad cipher_suites length"));
    }
    let cipher_suites = suites
        .chunks_exact(2)
        .map(|c| CipherSuite(u16::from_be_bytes([c[0], c[1]])))
        .collect();

    let compression = r.vec8()?;
    if compression != [0] {
        return Err(TlsError::IllegalParameter(
            "ClientHello: compression must be null".into(),
        ));
    }

    let extensions = if r.remaining() == 0 {
        Vec::new()
    } else {
        parse_extension_list(r.vec16()?)?
    };
    r.finish()?;

    Ok(ClientHello {
        random,
        legacy_session_id,
        cipher_suites,
        extensions,
    })
}

// ---------------------------------------------------------------------------
// ServerHello
// ---------------------------------------------------------------------------

pub fn encode_server_hello(sh: &ServerHello) -> Vec<u8> {
    let mut body = Vec::with_capacity(128);
    body.extend_from_slice(&sh.version.to_be_bytes());
    body.extend_from_slice(&sh.random);
    body.extend_from_slice(&sh.cipher_suite.0.to_be_bytes());
    put_extensions(&mut body, &sh.extensions);
    wrap_handshake(HandshakeType::ServerHello, &body)
}

/// Decode a ServerHello from handshake body bytes (after header).
pub fn decode_server_hello(data: &[u8]) -> Result<ServerHello, TlsError> {
    let mut r = Reader::new(data, "ServerHello");
    let version = r.u16()?;
    let mut random = [0u8; 32];
    random.copy_from_slice(r.bytes(32)?);
    let cipher_suite = CipherSuite(r.u16()?);
    let extensions = if r.remaining() == 0 {
        Vec::new()
    } else {
        parse_extension_list(r.vec16()?)?
    };
    r.finish()?;
    Ok(ServerHello {
        version,
        random,
        cipher_suite,
        extensions,
    })
}

// ---------------------------------------------------------------------------
// HelloRetryRequest
// ---------------------------------------------------------------------------

/// Encode a HelloRetryRequest asking for a share in `group`.
pub fn encode_hello_retry_request(version: u16, group: NamedGroup) -> Vec<u8> {
    let hrr = HelloRetryRequest {
        version,
        extensions: vec![Extension {
            extension_type: ExtensionType::KEY_SHARE,
            data: group.0.to_be_bytes().to_vec(),
        }],
    };
    let mut body = Vec::with_capacity(10);
    body.extend_from_slice(&hrr.version.to_be_bytes());
    put_extensions(&mut body, &hrr.extensions);
    wrap_handshake(HandshakeType::HelloRetryRequest, &body)
}

/// Decode a HelloRetryRequest body.
///
/// The version is returned as-is; the caller checks it. The extension
/// block must be non-empty and fill the rest of the message.
pub fn decode_hello_retry_request(data: &[u8]) -> Result<HelloRetryRequest, TlsError> {
    let mut r = Reader::new(data, "HelloRetryRequest");
    let version = r.u16()?;
    let ext_len = r.u16()? as usize;
    if ext_len == 0 || ext_len != r.remaining() {
        return Err(r.err("bad extensions length"));
    }
    let extensions = parse_extension_list(r.bytes(ext_len)?)?;
    Ok(HelloRetryRequest {
        version,
        extensions,
    })
}

impl HelloRetryRequest {
    /// Group named by the key_share extension, if any.
    pub fn selected_group(&self) -> Result<Option<NamedGroup>, TlsError> {
        match find_extension(&self.extensions, ExtensionType::KEY_SHARE) {
            None => Ok(None),
            Some(ext) if ext.data.len() == 2 => Ok(Some(NamedGroup(u16::from_be_bytes([
                ext.data[0],
                ext.data[1],
            ])))),
            Some(_) => Err(TlsError::DecodeError(
                "HelloRetryRequest: bad key_share".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// EncryptedExtensions
// ---------------------------------------------------------------------------

pub fn encode_encrypted_extensions(extensions: &[Extension]) -> Vec<u8> {
    let mut body = Vec::new();
    put_extensions(&mut body, extensions);
    wrap_handshake(HandshakeType::EncryptedExtensions, &body)
}

/// Decode an EncryptedExtensions message from handshake body bytes.
pub fn decode_encrypted_extensions(data: &[u8]) -> Result<EncryptedExtensions, TlsError> {
    let mut r = Reader::new(data, "EncryptedExtensions");
    let extensions = parse_extension_list(r.vec16()?)?;
    r.finish()?;
    Ok(EncryptedExtensions { extensions })
}

// ---------------------------------------------------------------------------
// CertificateRequest
// ---------------------------------------------------------------------------

pub fn encode_certificate_request(cr: &CertificateRequestMsg) -> Vec<u8> {
    let mut body = Vec::new();
    body.push(cr.certificate_request_context.len() as u8);
    body.extend_from_slice(&cr.certificate_request_context);
    body.extend_from_slice(&((cr.signature_algorithms.len() * 2) as u16).to_be_bytes());
    for s in &cr.signature_algorithms {
        body.extend_from_slice(&s.0.to_be_bytes());
    }
    let ca_len: usize = cr.certificate_authorities.iter().map(|c| 2 + c.len()).sum();
    body.extend_from_slice(&(ca_len as u16).to_be_bytes());
    for ca in &cr.certificate_authorities {
        body.extend_from_slice(&(ca.len() as u16).to_be_bytes());
        body.extend_from_slice(ca);
    }
    put_extensions(&mut body, &cr.extensions);
    wrap_handshake(HandshakeType::CertificateRequest, &body)
}

pub fn decode_certificate_request(data: &[u8]) -> Result<CertificateRequestMsg, TlsError> {
    let mut r = Reader::new(data, "CertificateRequest");
    let certificate_request_context = r.vec8()?.to_vec();

    let algs = r.vec16()?;
    if algs.is_empty() || algs.len() % 2 != 0 {
        return Err(r.err("bad signature_algorithms"));
    }
    let signature_algorithms = algs
        .chunks_exact(2)
        .map(|c| SignatureScheme(u16::from_be_bytes([c[0], c[1]])))
        .collect();

    let mut cas = Reader::new(r.vec16()?, "CertificateRequest");
    let mut certificate_authorities = Vec::new();
    while cas.remaining() > 0 {
        certificate_authorities.push(cas.vec16()?.to_vec());
    }

    let extensions = parse_extension_list(r.vec16()?)?;
    r.finish()?;
    Ok(CertificateRequestMsg {
        certificate_request_context,
        signature_algorithms,
        certificate_authorities,
        extensions,
    })
}

// ---------------------------------------------------------------------------
// Certificate
// ---------------------------------------------------------------------------

pub fn encode_certificate(msg: &CertificateMsg) -> Vec<u8> {
    let list_len: usize = msg.certificate_list.iter().map(|c| 3 + c.len()).sum();
    let mut body = Vec::with_capacity(4 + list_len + msg.certificate_request_context.len());
    body.push(msg.certificate_request_context.len() as u8);
    body.extend_from_slice(&msg.certificate_request_context);
    put_u24(&mut body, list_len);
    for cert in &msg.certificate_list {
        put_u24(&mut body, cert.len());
        body.extend_from_slice(cert);
    }
    wrap_handshake(HandshakeType::Certificate, &body)
}

/// Decode a Certificate message from handshake body bytes.
pub fn decode_certificate(data: &[u8]) -> Result<CertificateMsg, TlsError> {
    let mut r = Reader::new(data, "Certificate");
    let certificate_request_context = r.vec8()?.to_vec();
    let mut list = Reader::new(r.vec24()?, "Certificate");
    r.finish()?;

    let mut certificate_list = Vec::new();
    while list.remaining() > 0 {
        let cert = list.vec24()?;
        if cert.is_empty() {
            return Err(list.err("empty certificate entry"));
        }
        certificate_list.push(cert.to_vec());
    }
    Ok(CertificateMsg {
        certificate_request_context,
        certificate_list,
    })
}

// ---------------------------------------------------------------------------
// CertificateVerify
// ---------------------------------------------------------------------------

pub fn encode_certificate_verify(cv: &CertificateVerifyMsg) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + cv.signature.len());
    body.extend_from_slice(&cv.algorithm.0.to_be_bytes());
    body.extend_from_slice(&(cv.signature.len() as u16).to_be_bytes());
    body.extend_from_slice(&cv.signature);
    wrap_handshake(HandshakeType::CertificateVerify, &body)
}

/// Decode a CertificateVerify message from handshake body bytes.
pub fn decode_certificate_verify(data: &[u8]) -> Result<CertificateVerifyMsg, TlsError> {
    let mut r = Reader::new(data, "CertificateVerify");
    let algorithm = SignatureScheme(r.u16()?);
    let signature = r.vec16()?.to_vec();
    r.finish()?;
    Ok(CertificateVerifyMsg {
        algorithm,
        signature,
    })
}

// ---------------------------------------------------------------------------
// Finished
// ---------------------------------------------------------------------------

/// Encode a Finished message as a complete handshake message.
pub fn encode_finished(verify_data: &[u8]) -> Vec<u8> {
    wrap_handshake(HandshakeType::Finished, verify_data)
}

/// The Finished body is the bare MAC; its length is checked on verification.
pub fn decode_finished(data: &[u8]) -> FinishedMsg {
    FinishedMsg {
        verify_data: data.to_vec(),
    }
}

// ---------------------------------------------------------------------------
// NewSessionTicket
// ---------------------------------------------------------------------------

pub fn encode_new_session_ticket(nst: &NewSessionTicketMsg) -> Vec<u8> {
    let mut body = Vec::with_capacity(16 + nst.ticket.len());
    body.extend_from_slice(&nst.ticket_lifetime.to_be_bytes());
    body.push(nst.ke_modes.len() as u8);
    body.extend_from_slice(&nst.ke_modes);
    body.push(nst.auth_modes.len() as u8);
    body.extend_from_slice(&nst.auth_modes);
    put_extensions(&mut body, &nst.extensions);
    body.extend_from_slice(&(nst.ticket.len() as u16).to_be_bytes());
    body.extend_from_slice(&nst.ticket);
    wrap_handshake(HandshakeType::NewSessionTicket, &body)
}

/// Decode a NewSessionTicket body. An empty ticket is a decode error.
pub fn decode_new_session_ticket(data: &[u8]) -> Result<NewSessionTicketMsg, TlsError> {
    let mut r = Reader::new(data, "NewSessionTicket");
    let ticket_lifetime = r.u32()?;
    let ke_modes = r.vec8()?.to_vec();
    let auth_modes = r.vec8()?.to_vec();
    let extensions = parse_extension_list(r.vec16()?)?;
    let ticket = r.vec16()?.to_vec();
    r.finish()?;
    if ticket.is_empty() {
        return Err(r.err("empty ticket"));
    }
    Ok(NewSessionTicketMsg {
        ticket_lifetime,
        ke_modes,
        auth_modes,
        extensions,
        ticket,
    })
}

// ---------------------------------------------------------------------------
// Extension encoding/parsing helpers
// ---------------------------------------------------------------------------

/// Append `extensions` with their 2-byte total length.
fn put_extensions(out: &mut Vec<u8>, extensions: &[Extension]) {
    let ext_data = encode_extensions(extensions);
    out.extend_from_slice(&(ext_data.len() as u16).to_be_bytes());
    out.extend_from_slice(&ext_data);
}

/// Encode a list of extensions to bytes (no outer length).
pub fn encode_extensions(exts: &[Extension]) -> Vec<u8> {
    let mut buf = Vec::new();
    for ext in exts {
        buf.extend_from_slice(&ext.extension_type.0.to_be_bytes());
        buf.extend_from_slice(&(ext.data.len() as u16).to_be_bytes());
        buf.extend_from_slice(&ext.data);
    }
    buf
}

/// Parse a raw extension list (no length prefix). Must be consumed exactly.
pub fn parse_extension_list(data: &[u8]) -> Result<Vec<Extension>, TlsError> {
    let mut r = Reader::new(data, "extensions");
    let mut exts = Vec::new();
    while r.remaining() > 0 {
        let extension_type = ExtensionType(r.u16()?);
        let data = r.vec16()?.to_vec();
        exts.push(Extension {
            extension_type,
            data,
        });
    }
    Ok(exts)
}

fn put_u24(out: &mut Vec<u8>, v: usize) {
    out.push((v >> 16) as u8);
    out.push((v >> 8) as u8);
    out.push(v as u8);
}

/// Read a 3-byte big-endian integer.
fn read_u24(data: &[u8]) -> u32 {
    ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | (data[2] as u32)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn body(msg: &[u8]) -> &[u8] {
        parse_handshake_header(msg).unwrap().1
    }

    #[test]
    fn test_encode_decode_client_hello() {
        let ch = ClientHello {
            random: [0xAA; 32],
            legacy_session_id: vec![],
            cipher_suites: vec![
                CipherSuite::TLS_AES_128_GCM_SHA256,
                CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
            ],
            extensions: vec![Extension {
                extension_type: ExtensionType::SUPPORTED_VERSIONS,
                data: vec![2, 0x7f, 0x0e],
            }],
        };
        let msg = encode_client_hello(&ch);
        assert_eq!(msg[0], HandshakeType::ClientHello as u8);
        assert_eq!(&msg[4..6], &[0x03, 0x03]);
        assert_eq!(decode_client_hello(body(&msg)).unwrap(), ch);
    }

    #[test]
    fn test_client_hello_rejects_compression() {
        let ch = ClientHello {
            random: [1; 32],
            legacy_session_id: vec![],
            cipher_suites: vec![CipherSuite::TLS_AES_128_GCM_SHA256],
            extensions: vec![],
        };
        let mut msg = encode_client_hello(&ch);
        // compression method byte sits after version, random, sid, suites, count
        let idx = 4 + 2 + 32 + 1 + 2 + 2 + 1;
        msg[idx] = 1;
        assert!(matches!(
            decode_client_hello(body(&msg)),
            Err(TlsError::IllegalParameter(_))
        ));
    }

    #[test]
    fn test_server_hello_layout() {
        let sh = ServerHello {
            version: 0x7f0e,
            random: [0x11; 32],
            cipher_suite: CipherSuite::TLS_AES_256_GCM_SHA384,
            extensions: vec![],
        };
        let msg = encode_server_hello(&sh);
        // header + version + random + suite + empty extension block
        assert_eq!(msg.len(), 4 + 2 + 32 + 2 + 2);
        assert_eq!(&msg[4..6], &[0x7f, 0x0e]);
        assert_eq!(decode_server_hello(body(&msg)).unwrap(), sh);
    }

    #[test]
    fn test_server_hello_trailing_data() {
        let sh = ServerHello {
            version: 0x7f0e,
            random: [0; 32],
            cipher_suite: CipherSuite::TLS_AES_128_GCM_SHA256,
            extensions: vec![],
        };
        let msg = encode_server_hello(&sh);
        let mut b = body(&msg).to_vec();
        b.push(0);
        assert!(matches!(
            decode_server_hello(&b),
            Err(TlsError::DecodeError(_))
        ));
    }

    #[test]
    fn test_hello_retry_request_wire() {
        let msg = encode_hello_retry_request(0x7f0e, NamedGroup::SECP256R1);
        assert_eq!(
            msg,
            vec![6, 0, 0, 10, 0x7f, 0x0e, 0, 6, 0, 40, 0, 2, 0x00, 0x17]
        );
        let hrr = decode_hello_retry_request(body(&msg)).unwrap();
        assert_eq!(hrr.version, 0x7f0e);
        assert_eq!(hrr.selected_group().unwrap(), Some(NamedGroup::SECP256R1));
    }

    #[test]
    fn test_hello_retry_request_bad_lengths() {
        // zero-length extension block
        assert!(matches!(
            decode_hello_retry_request(&[0x7f, 0x0e, 0, 0]),
            Err(TlsError::DecodeError(_))
        ));
        // length does not match the remainder
        assert!(matches!(
            decode_hello_retry_request(&[0x7f, 0x0e, 0, 7, 0, 40, 0, 2, 0, 0x17]),
            Err(TlsError::DecodeError(_))
        ));
    }

    #[test]
    fn test_certificate_and_verify() {
        let cert = CertificateMsg {
            certificate_request_context: vec![],
            certificate_list: vec![vec![1, 2, 3], vec![4; 40]],
        };
        let msg = encode_certificate(&cert);
        assert_eq!(decode_certificate(body(&msg)).unwrap(), cert);

        let empty = CertificateMsg {
            certificate_request_context: vec![],
            certificate_list: vec![],
        };
        let msg = encode_certificate(&empty);
        assert_eq!(body(&msg), &[0, 0, 0, 0]);
        assert!(decode_certificate(body(&msg))
            .unwrap()
            .certificate_list
            .is_empty());

        let cv = CertificateVerifyMsg {
            algorithm: SignatureScheme::ED25519,
            signature: vec![0x55; 64],
        };
        let msg = encode_certificate_verify(&cv);
        assert_eq!(decode_certificate_verify(body(&msg)).unwrap(), cv);
        assert!(decode_certificate_verify(&body(&msg)[..10]).is_err());
    }

    #[test]
    fn test_certificate_request() {
        let cr = CertificateRequestMsg {
            certificate_request_context: vec![],
            signature_algorithms: vec![
                SignatureScheme::ED25519,
                SignatureScheme::ECDSA_SECP256R1_SHA256,
            ],
            certificate_authorities: vec![],
            extensions: vec![],
        };
        let msg = encode_certificate_request(&cr);
        assert_eq!(body(&msg), &[0, 0, 4, 0x08, 0x07, 0x04, 0x03, 0, 0, 0, 0]);
        assert_eq!(decode_certificate_request(body(&msg)).unwrap(), cr);
    }

    #[test]
    fn test_new_session_ticket() {
        let nst = NewSessionTicketMsg {
            ticket_lifetime: 3600,
            ke_modes: vec![1],
            auth_modes: vec![0],
            extensions: vec![Extension {
                extension_type: ExtensionType::TICKET_EARLY_DATA_INFO,
                data: vec![0, 0, 0, 7],
            }],
            ticket: vec![0xab; 32],
        };
        let msg = encode_new_session_ticket(&nst);
        assert_eq!(decode_new_session_ticket(body(&msg)).unwrap(), nst);

        let mut trailing = body(&msg).to_vec();
        trailing.push(0);
        assert!(matches!(
            decode_new_session_ticket(&trailing),
            Err(TlsError::DecodeError(_))
        ));

        let empty = NewSessionTicketMsg {
            ticket: vec![],
            ..nst
        };
        let msg = encode_new_session_ticket(&empty);
        assert!(matches!(
            decode_new_session_ticket(body(&msg)),
            Err(TlsError::DecodeError(_))
        ));
    }

    #[test]
    fn test_parse_header_incomplete() {
        let msg = encode_finished(&[7u8; 32]);
        assert_eq!(
            parse_handshake_header(&msg[..3]).unwrap_err(),
            TlsError::WouldBlock
        );
        assert_eq!(
            parse_handshake_header(&msg[..20]).unwrap_err(),
            TlsError::WouldBlock
        );
        let (t, b, used) = parse_handshake_header(&msg).unwrap();
        assert_eq!(t, HandshakeType::Finished);
        assert_eq!(b.len(), 32);
        assert_eq!(used, msg.len());
        assert!(matches!(
            parse_handshake_header(&[3, 0, 0, 0]),
            Err(TlsError::UnexpectedMessage(_))
        ));
    }

    #[test]
    fn test_parse_header_oversized() {
        let mut header = vec![HandshakeType::Certificate as u8];
        header.extend_from_slice(&((MAX_HANDSHAKE_MESSAGE_LEN + 1) as u32).to_be_bytes()[1..]);
        assert!(matches!(
            parse_handshake_header(&header),
            Err(TlsError::DecodeError(_))
        ));
        // the largest allowed length just waits for more bytes
        header[1..4].copy_from_slice(&(MAX_HANDSHAKE_MESSAGE_LEN as u32).to_be_bytes()[1..]);
        assert_eq!(parse_handshake_header(&header).unwrap_err(), TlsError::WouldBlock);
    }

    #[test]
    fn test_extension_list_truncated() {
        assert!(parse_extension_list(&[0, 40, 0, 5, 1]).is_err());
        assert!(parse_extension_list(&[0, 40, 0]).is_err());
        assert!(parse_extension_list(&[]).unwrap().is_empty());
    }
}
