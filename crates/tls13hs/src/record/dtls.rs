//! Datagram record header.
//!
//! `content_type(1) || version(2) || sequence_number(8) || length(2)`
//!
//! The top 16 bits of the sequence number carry the epoch.

/// Datagram record header length: 13 bytes.
pub const DTLS_RECORD_HEADER_LEN: usize = 13;

/// Epoch encoded in the high 16 bits of a datagram sequence number.
pub fn epoch_of(sequence_number: u64) -> u16 {
    (sequence_number >> 48) as u16
}

/// Read the 8-byte sequence number out of a datagram header.
pub fn header_sequence_number(header: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = header.get(3..11)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_of() {
        assert_eq!(epoch_of(3u64 << 48 | 7), 3);
        assert_eq!(epoch_of(0xffff), 0);
    }

    #[test]
    fn test_header_sequence_number() {
        let mut header = vec![23, 0xfe, 0xff];
        header.extend_from_slice(&(2u64 << 48 | 5).to_be_bytes());
        header.extend_from_slice(&[0, 0]);
        assert_eq!(header_sequence_number(&header), Some(2u64 << 48 | 5));
        assert_eq!(header_sequence_number(&header[..6]), None);
    }
}
