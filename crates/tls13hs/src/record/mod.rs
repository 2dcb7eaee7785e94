//! Record layer: framing plus the installed read/write cipher specs.

pub mod cipher_spec;
pub mod dtls;
pub mod encryption;

use std::sync::Arc;

use crate::Transport;
use cipher_spec::CipherSpec;
use dtls::{header_sequence_number, DTLS_RECORD_HEADER_LEN};
use encryption::{
    protect_record, unprotect_record, MAX_CIPHERTEXT_LENGTH, MAX_PLAINTEXT_LENGTH,
    RECORD_HEADER_LEN,
};
use tls13hs_types::TlsError;

/// TLS record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            20 => Some(ContentType::ChangeCipherSpec),
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }
}

/// A parsed record.
#[derive(Debug, Clone)]
pub struct Record {
    pub content_type: ContentType,
    pub version: u16,
    /// Present on datagram transport only.
    pub sequence_number: Option<u64>,
    pub fragment: Vec<u8>,
}

/// Direction a cipher spec is installed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Record layer state for one connection.
///
/// Each direction holds an `Arc<CipherSpec>`; installing a new spec is a
/// single assignment that drops this layer's reference to the old one.
pub struct RecordLayer {
    transport: Transport,
    null_read: Arc<CipherSpec>,
    null_write: Arc<CipherSpec>,
    read_spec: Arc<CipherSpec>,
    write_spec: Arc<CipherSpec>,
}

impl RecordLayer {
    pub fn new(transport: Transport) -> Self {
        let null_read = Arc::new(CipherSpec::null());
        let null_write = Arc::new(CipherSpec::null());
        Self {
            transport,
            read_spec: null_read.clone(),
            write_spec: null_write.clone(),
            null_read,
            null_write,
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn spec(&self, direction: Direction) -> &Arc<CipherSpec> {
        match direction {
            Direction::Read => &self.read_spec,
            Direction::Write => &self.write_spec,
        }
    }

    /// Swap in a new spec for `direction`.
    pub fn install(&mut self, direction: Direction, spec: Arc<CipherSpec>) {
        match direction {
            Direction::Read => self.read_spec = spec,
            Direction::Write => self.write_spec = spec,
        }
    }

    /// Fall back to the plaintext spec for `direction`.
    pub fn reset_to_null(&mut self, direction: Direction) {
        match direction {
            Direction::Read => self.read_spec = self.null_read.clone(),
            Direction::Write => self.write_spec = self.null_write.clone(),
        }
    }

    /// Protect `payload` under the current write spec, fragmenting as needed.
    pub fn seal(&self, content_type: ContentType, payload: &[u8]) -> Result<Vec<u8>, TlsError> {
        let mut out = Vec::new();
        if payload.is_empty() {
            out.extend(protect_record(
                &self.write_spec,
                self.transport,
                content_type,
                payload,
            )?);
            return Ok(out);
        }
        for chunk in payload.chunks(MAX_PLAINTEXT_LENGTH) {
            out.extend(protect_record(
                &self.write_spec,
                self.transport,
                content_type,
                chunk,
            )?);
        }
        Ok(out)
    }

    /// Parse and, if a keyed read spec is installed, unprotect one record.
    ///
    /// Returns the record's content (or `None` if a datagram record was
    /// dropped) and the number of bytes consumed. Under the null read spec
    /// the record is returned as it arrived.
    #[allow(clippy::type_complexity)]
    pub fn open(&self, data: &[u8]) -> Result<(Option<(ContentType, Vec<u8>)>, usize), TlsError> {
        let (record, consumed) = self.parse_record(data)?;
        if self.read_spec.is_null() {
            return Ok((Some((record.content_type, record.fragment)), consumed));
        }
        let opened = unprotect_record(&self.read_spec, self.transport, &record)?;
        Ok((opened, consumed))
    }

    /// Parse one record header and body. Incomplete input is `WouldBlock`.
    pub fn parse_record(&self, data: &[u8]) -> Result<(Record, usize), TlsError> {
        let header_len = match self.transport {
            Transport::Stream => RECORD_HEADER_LEN,
            Transport::Datagram => DTLS_RECORD_HEADER_LEN,
        };
        if data.len() < header_len {
            return Err(TlsError::WouldBlock);
        }
        let content_type = ContentType::from_u8(data[0])
            .ok_or_else(|| TlsError::UnexpectedMessage(format!("unknown content type {}", data[0])))?;
        let version = u16::from_be_bytes([data[1], data[2]]);
        let sequence_number = match self.transport {
            Transport::Stream => None,
            Transport::Datagram => header_sequence_number(data),
        };
        let length = u16::from_be_bytes([data[header_len - 2], data[header_len - 1]]) as usize;
        if length > MAX_CIPHERTEXT_LENGTH {
            return Err(TlsError::DecodeError("record too large".into()));
        }
        if data.len() < header_len + length {
            return Err(TlsError::WouldBlock);
        }
        Ok((
            Record {
                content_type,
                version,
                sequence_number,
                fragment: data[header_len..header_len + length].to_vec(),
            },
            header_len + length,
        ))
    }
}
