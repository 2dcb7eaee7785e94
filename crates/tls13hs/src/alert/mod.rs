//! TLS alert protocol.
//!
//! Besides the usual alerts, draft 14 signals the end of 0-RTT data with a
//! warning-level `end_of_early_data` alert (description 1).

use tls13hs_types::TlsError;

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

/// Alert description codes understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    EndOfEarlyData = 1,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    RecordOverflow = 22,
    HandshakeFailure = 40,
    BadCertificate = 42,
    UnsupportedCertificate = 43,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    DecodeError = 50,
    DecryptError = 51,
    ProtocolVersion = 70,
    InsufficientSecurity = 71,
    InternalError = 80,
    MissingExtension = 109,
    UnsupportedExtension = 110,
    UnrecognizedName = 112,
    NoApplicationProtocol = 120,
}

/// A TLS alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl AlertLevel {
    pub fn from_u8(v: u8) -> Result<Self, u8> {
        match v {
            1 => Ok(AlertLevel::Warning),
            2 => Ok(AlertLevel::Fatal),
            _ => Err(v),
        }
    }
}

impl AlertDescription {
    pub fn from_u8(v: u8) -> Result<Self, u8> {
        match v {
            0 => Ok(AlertDescription::CloseNotify),
            1 => Ok(AlertDescription::EndOfEarlyData),
            10 => Ok(AlertDescription::UnexpectedMessage),
            20 => Ok(AlertDescription::BadRecordMac),
            22 => Ok(AlertDescription::RecordOverflow),
            40 => Ok(AlertDescription::HandshakeFailure),
            42 => Ok(AlertDescription::BadCertificate),
            43 => Ok(AlertDescription::UnsupportedCertificate),
            46 => Ok(AlertDescription::CertificateUnknown),
            47 => Ok(AlertDescription::IllegalParameter),
            50 => Ok(AlertDescription::DecodeError),
            51 => Ok(AlertDescription::DecryptError),
            70 => Ok(AlertDescription::ProtocolVersion),
            71 => Ok(AlertDescription::InsufficientSecurity),
            80 => Ok(AlertDescription::InternalError),
            109 => Ok(AlertDescription::MissingExtension),
            110 => Ok(AlertDescription::UnsupportedExtension),
            112 => Ok(AlertDescription::UnrecognizedName),
            120 => Ok(AlertDescription::NoApplicationProtocol),
            _ => Err(v),
        }
    }

    /// Alert to send for a fatal error.
    ///
    /// Cryptographic failures on records all collapse to `bad_record_mac`.
    pub fn from_error(err: &TlsError) -> Self {
        match err {
            TlsError::UnexpectedMessage(_) => AlertDescription::UnexpectedMessage,
            TlsError::DecodeError(_) => AlertDescription::DecodeError,
            TlsError::IllegalParameter(_) => AlertDescription::IllegalParameter,
            TlsError::HandshakeFailure(_) | TlsError::NoSharedCipherSuite => {
                AlertDescription::HandshakeFailure
            }
            TlsError::MissingExtension(_) => AlertDescription::MissingExtension,
            TlsError::UnsupportedExtension(_) => AlertDescription::UnsupportedExtension,
            TlsError::ProtocolVersion => AlertDescription::ProtocolVersion,
            TlsError::BadRecordMac | TlsError::BadPadding => AlertDescription::BadRecordMac,
            TlsError::DecryptError(_) => AlertDescription::DecryptError,
            TlsError::BadCertificate(_) => AlertDescription::BadCertificate,
            TlsError::ConnectionClosed => AlertDescription::CloseNotify,
            TlsError::TooManyRecords
            | TlsError::InternalError(_)
            | TlsError::WouldBlock
            | TlsError::AlertReceived(_)
            | TlsError::CryptoError(_) => AlertDescription::InternalError,
        }
    }
}

impl Alert {
    pub fn fatal(description: AlertDescription) -> Self {
        Alert {
            level: AlertLevel::Fatal,
            description,
        }
    }

    pub fn end_of_early_data() -> Self {
        Alert {
            level: AlertLevel::Warning,
            description: AlertDescription::EndOfEarlyData,
        }
    }

    pub fn encode(&self) -> [u8; 2] {
        [self.level as u8, self.description as u8]
    }

    /// Parse a two-byte alert body.
    pub fn decode(data: &[u8]) -> Result<Self, TlsError> {
        if data.len() != 2 {
            return Err(TlsError::DecodeError("alert: bad length".into()));
        }
        let level = AlertLevel::from_u8(data[0])
            .map_err(|v| TlsError::IllegalParameter(format!("alert: bad level {v}")))?;
        let description = AlertDescription::from_u8(data[1])
            .map_err(|v| TlsError::IllegalParameter(format!("alert: unknown description {v}")))?;
        Ok(Alert { level, description })
    }
}
