//! Record protection and unprotection.
//!
//! The sequence number feeds the nonce only; the AEAD additional data is
//! empty. The real content type travels as the last non-zero byte of the
//! plaintext and the outer type is always application data.

use super::cipher_spec::CipherSpec;
use super::dtls::DTLS_RECORD_HEADER_LEN;
use super::{ContentType, Record};
use crate::crypt::RECORD_SEQ_MAX;
use crate::{Transport, DTLS_RECORD_VERSION, RECORD_VERSION};
use tls13hs_types::TlsError;

/// Maximum TLS plaintext fragment size (2^14 bytes).
pub const MAX_PLAINTEXT_LENGTH: usize = 16384;

/// Maximum encrypted record overhead (content type + padding + tag).
pub const MAX_CIPHERTEXT_OVERHEAD: usize = 256;

/// Maximum ciphertext fragment size.
pub const MAX_CIPHERTEXT_LENGTH: usize = MAX_PLAINTEXT_LENGTH + MAX_CIPHERTEXT_OVERHEAD;

/// Stream record header size: content_type(1) + version(2) + length(2).
pub const RECORD_HEADER_LEN: usize = 5;

/// AEAD nonce size.
const NONCE_LEN: usize = 12;

/// `nonce = iv XOR pad_left(sequence_number, iv_length)`
pub(crate) fn build_nonce_from_iv_seq(iv: &[u8], seq: u64) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[4..12].copy_from_slice(&seq.to_be_bytes());
    for (n, i) in nonce.iter_mut().zip(iv.iter()) {
        *n ^= i;
    }
    nonce
}

/// Scan from the end for the first non-zero byte, which is the content type.
fn parse_inner_plaintext(mut inner: Vec<u8>) -> Result<(ContentType, Vec<u8>), TlsError> {
    while inner.last() == Some(&0) {
        inner.pop();
    }
    let type_byte = inner.pop().ok_or(TlsError::BadPadding)?;
    let ct = ContentType::from_u8(type_byte).ok_or_else(|| {
        TlsError::UnexpectedMessage(format!("unknown inner content type {type_byte}"))
    })?;
    Ok((ct, inner))
}

pub(crate) fn record_version(transport: Transport) -> u16 {
    match transport {
        Transport::Stream => RECORD_VERSION,
        Transport::Datagram => DTLS_RECORD_VERSION,
    }
}

fn write_header(
    out: &mut Vec<u8>,
    transport: Transport,
    content_type: ContentType,
    seq: u64,
    len: usize,
) {
    out.push(content_type as u8);
    out.extend_from_slice(&record_version(transport).to_be_bytes());
    if transport == Transport::Datagram {
        out.extend_from_slice(&seq.to_be_bytes());
    }
    out.extend_from_slice(&(len as u16).to_be_bytes());
}

/// Frame one record under `spec`, advancing its sequence number.
///
/// A null spec writes the plaintext with its real content type.
pub fn protect_record(
    spec: &CipherSpec,
    transport: Transport,
    content_type: ContentType,
    plaintext: &[u8],
) -> Result<Vec<u8>, TlsError> {
    if plaintext.len() > MAX_PLAINTEXT_LENGTH {
        return Err(TlsError::InternalError(
            "plaintext exceeds maximum length".into(),
        ));
    }
    let header_len = match transport {
        Transport::Stream => RECORD_HEADER_LEN,
        Transport::Datagram => DTLS_RECORD_HEADER_LEN,
    };
    spec.with_seq(|seq| {
        let Some(aead) = spec.aead() else {
            let mut out = Vec::with_capacity(header_len + plaintext.len());
            write_header(&mut out, transport, content_type, *seq, plaintext.len());
            out.extend_from_slice(plaintext);
            *seq += 1;
            return Ok(out);
        };
        if (*seq & RECORD_SEQ_MAX) >= spec.max_records() {
            return Err(TlsError::TooManyRecords);
        }
        let nonce = build_nonce_from_iv_seq(spec.iv(), *seq);
        let mut inner = Vec::with_capacity(plaintext.len() + 1);
        inner.extend_from_slice(plaintext);
        inner.push(content_type as u8);
        let ciphertext = aead.encrypt(&nonce, b"", &inner)?;

        let mut out = Vec::with_capacity(header_len + ciphertext.len());
        write_header(
            &mut out,
            transport,
            ContentType::ApplicationData,
            *seq,
            ciphertext.len(),
        );
        out.extend_from_slice(&ciphertext);
        *seq += 1;
        Ok(out)
    })
}

/// Open a protected record under `spec`.
///
/// Returns `Ok(None)` for datagram records that belong to an older epoch or
/// replay an already-seen sequence number; those are dropped silently. Every
/// cryptographic failure reports `BadRecordMac`.
pub fn unprotect_record(
    spec: &CipherSpec,
    transport: Transport,
    record: &Record,
) -> Result<Option<(ContentType, Vec<u8>)>, TlsError> {
    let aead = spec
        .aead()
        .ok_or_else(|| TlsError::InternalError("unprotect with null spec".into()))?;
    if record.fragment.len() < aead.tag_size() {
        return Err(TlsError::BadRecordMac);
    }
    if record.content_type != ContentType::ApplicationData {
        return Err(TlsError::BadRecordMac);
    }
    if record.version != record_version(transport) {
        return Err(TlsError::BadRecordMac);
    }

    spec.with_seq(|next_seq| {
        let seq = match (transport, record.sequence_number) {
            (Transport::Stream, _) => *next_seq,
            (Transport::Datagram, Some(seq)) => {
                if (seq >> 48) as u16 != spec.epoch() || seq < *next_seq {
                    return Ok(None);
                }
                seq
            }
            (Transport::Datagram, None) => {
                return Err(TlsError::InternalError("datagram record without sequence".into()))
            }
        };
        if (seq & RECORD_SEQ_MAX) >= spec.max_records() {
            return Err(TlsError::TooManyRecords);
        }
        let nonce = build_nonce_from_iv_seq(spec.iv(), seq);
        let inner = aead
            .decrypt(&nonce, b"", &record.fragment)
            .map_err(|_| TlsError::BadRecordMac)?;
        *next_seq = seq + 1;
        parse_inner_plaintext(inner).map(Some)
    })
}
