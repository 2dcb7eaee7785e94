//! Extension code points and the per-message extension policy.

use crate::handshake::HandshakeType;
use tls13hs_types::TlsError;

/// TLS extension type codes (draft-14 numbering for the TLS 1.3 additions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtensionType(pub u16);

impl ExtensionType {
    pub const SERVER_NAME: Self = Self(0);
    pub const STATUS_REQUEST: Self = Self(5);
    pub const SUPPORTED_GROUPS: Self = Self(10);
    pub const EC_POINT_FORMATS: Self = Self(11);
    pub const SIGNATURE_ALGORITHMS: Self = Self(13);
    pub const USE_SRTP: Self = Self(14);
    pub const APPLICATION_LAYER_PROTOCOL_NEGOTIATION: Self = Self(16);
    pub const SIGNED_CERTIFICATE_TIMESTAMP: Self = Self(18);
    pub const PADDING: Self = Self(21);
    pub const EXTENDED_MASTER_SECRET: Self = Self(23);
    pub const SESSION_TICKET: Self = Self(35);
    pub const KEY_SHARE: Self = Self(40);
    pub const PRE_SHARED_KEY: Self = Self(41);
    pub const EARLY_DATA: Self = Self(42);
    pub const SUPPORTED_VERSIONS: Self = Self(43);
    pub const COOKIE: Self = Self(44);
    pub const TICKET_EARLY_DATA_INFO: Self = Self(46);
    pub const NEXT_PROTO_NEG: Self = Self(13172);
    pub const RENEGOTIATION_INFO: Self = Self(0xFF01);
}

/// A raw TLS extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub extension_type: ExtensionType,
    pub data: Vec<u8>,
}

/// Where a known extension may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionStatus {
    NotUsed,
    ClientOnly,
    SendClear,
    SendClearOrHrr,
    SendHrr,
    SendEncrypted,
    NewSessionTicket,
}

const KNOWN_EXTENSIONS: &[(ExtensionType, ExtensionStatus)] = &[
    (ExtensionType::SERVER_NAME, ExtensionStatus::SendEncrypted),
    (ExtensionType::SUPPORTED_GROUPS, ExtensionStatus::SendEncrypted),
    (ExtensionType::EC_POINT_FORMATS, ExtensionStatus::NotUsed),
    (ExtensionType::SIGNATURE_ALGORITHMS, ExtensionStatus::SendClear),
    (ExtensionType::USE_SRTP, ExtensionStatus::SendEncrypted),
    (
        ExtensionType::APPLICATION_LAYER_PROTOCOL_NEGOTIATION,
        ExtensionStatus::SendEncrypted,
    ),
    (ExtensionType::PADDING, ExtensionStatus::NotUsed),
    (ExtensionType::EXTENDED_MASTER_SECRET, ExtensionStatus::NotUsed),
    (ExtensionType::SESSION_TICKET, ExtensionStatus::ClientOnly),
    (ExtensionType::KEY_SHARE, ExtensionStatus::SendClearOrHrr),
    (ExtensionType::PRE_SHARED_KEY, ExtensionStatus::SendClear),
    (ExtensionType::EARLY_DATA, ExtensionStatus::SendEncrypted),
    (ExtensionType::NEXT_PROTO_NEG, ExtensionStatus::NotUsed),
    (ExtensionType::RENEGOTIATION_INFO, ExtensionStatus::NotUsed),
    (
        ExtensionType::SIGNED_CERTIFICATE_TIMESTAMP,
        ExtensionStatus::SendEncrypted,
    ),
    (ExtensionType::STATUS_REQUEST, ExtensionStatus::SendEncrypted),
    (
        ExtensionType::TICKET_EARLY_DATA_INFO,
        ExtensionStatus::NewSessionTicket,
    ),
    (ExtensionType::COOKIE, ExtensionStatus::SendHrr),
];

/// Look up the policy for a known extension.
pub fn known_extension_status(ext: ExtensionType) -> Option<ExtensionStatus> {
    KNOWN_EXTENSIONS
        .iter()
        .find(|(t, _)| *t == ext)
        .map(|(_, status)| *status)
}

/// Whether `ext` may appear in a message of type `message`.
pub fn extension_allowed(ext: ExtensionType, message: HandshakeType) -> bool {
    use HandshakeType as H;
    let Some(status) = known_extension_status(ext) else {
        return message == H::ClientHello;
    };
    match status {
        ExtensionStatus::NotUsed => false,
        ExtensionStatus::ClientOnly => message == H::ClientHello,
        ExtensionStatus::SendClear => matches!(message, H::ClientHello | H::ServerHello),
        ExtensionStatus::SendClearOrHrr => matches!(
            message,
            H::ClientHello | H::ServerHello | H::HelloRetryRequest
        ),
        ExtensionStatus::SendHrr => matches!(message, H::ClientHello | H::HelloRetryRequest),
        ExtensionStatus::SendEncrypted => {
            matches!(message, H::ClientHello | H::EncryptedExtensions)
        }
        ExtensionStatus::NewSessionTicket => message == H::NewSessionTicket,
    }
}

/// Reject duplicates and extensions not permitted in `message`.
pub fn check_extensions(extensions: &[Extension], message: HandshakeType) -> Result<(), TlsError> {
    for (i, ext) in extensions.iter().enumerate() {
        if !extension_allowed(ext.extension_type, message) {
            return Err(TlsError::UnsupportedExtension(format!(
                "extension {} not allowed in {:?}",
                ext.extension_type.0, message
            )));
        }
        if extensions[..i]
            .iter()
            .any(|e| e.extension_type == ext.extension_type)
        {
            return Err(TlsError::IllegalParameter(format!(
                "duplicate extension {}",
                ext.extension_type.0
            )));
        }
    }
    Ok(())
}

/// Find an extension by type.
pub fn find_extension(extensions: &[Extension], ext: ExtensionType) -> Option<&Extension> {
    extensions.iter().find(|e| e.extension_type == ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use HandshakeType as H;

    #[test]
    fn test_table_lookup() {
        assert_eq!(
            known_extension_status(ExtensionType::KEY_SHARE),
            Some(ExtensionStatus::SendClearOrHrr)
        );
        assert_eq!(
            known_extension_status(ExtensionType::COOKIE),
            Some(ExtensionStatus::SendHrr)
        );
        assert_eq!(known_extension_status(ExtensionType::SUPPORTED_VERSIONS), None);
    }

    #[test]
    fn test_allowed_per_message() {
        assert!(extension_allowed(ExtensionType::KEY_SHARE, H::HelloRetryRequest));
        assert!(extension_allowed(ExtensionType::KEY_SHARE, H::ServerHello));
        assert!(!extension_allowed(ExtensionType::KEY_SHARE, H::EncryptedExtensions));
        assert!(extension_allowed(
            ExtensionType::APPLICATION_LAYER_PROTOCOL_NEGOTIATION,
            H::EncryptedExtensions
        ));
        assert!(!extension_allowed(
            ExtensionType::APPLICATION_LAYER_PROTOCOL_NEGOTIATION,
            H::ServerHello
        ));
        assert!(extension_allowed(ExtensionType::SIGNATURE_ALGORITHMS, H::ServerHello));
        assert!(!extension_allowed(ExtensionType::SESSION_TICKET, H::ServerHello));
        assert!(!extension_allowed(ExtensionType::PADDING, H::ClientHello));
        assert!(extension_allowed(
            ExtensionType::TICKET_EARLY_DATA_INFO,
            H::NewSessionTicket
        ));
        assert!(!extension_allowed(
            ExtensionType::TICKET_EARLY_DATA_INFO,
            H::ClientHello
        ));
    }

    #[test]
    fn test_unknown_only_in_client_hello() {
        let unknown = ExtensionType(0x7a7a);
        assert!(extension_allowed(unknown, H::ClientHello));
        assert!(!extension_allowed(unknown, H::ServerHello));
        assert!(!extension_allowed(unknown, H::EncryptedExtensions));
    }

    #[test]
    fn test_check_extensions() {
        let ext = |t: ExtensionType| Extension {
            extension_type: t,
            data: Vec::new(),
        };
        assert!(check_extensions(&[ext(ExtensionType::KEY_SHARE)], H::ServerHello).is_ok());
        assert!(matches!(
            check_extensions(&[ext(ExtensionType::EARLY_DATA)], H::ServerHello),
            Err(TlsError::UnsupportedExtension(_))
        ));
        assert!(matches!(
            check_extensions(
                &[ext(ExtensionType::KEY_SHARE), ext(ExtensionType::KEY_SHARE)],
                H::ClientHello
            ),
            Err(TlsError::IllegalParameter(_))
        ));
    }
}
