//! Extension bodies used by the handshake state machine.

use super::codec::Reader;
use crate::crypt::{NamedGroup, SignatureScheme};
use crate::extensions::{Extension, ExtensionType};
use crate::TlsVersion;
use tls13hs_types::TlsError;

/// One entry of a key_share extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShareEntry {
    pub group: NamedGroup,
    pub key_exchange: Vec<u8>,
}

fn ext(extension_type: ExtensionType, data: Vec<u8>) -> Extension {
    Extension {
        extension_type,
        data,
    }
}

fn u16_list(values: impl ExactSizeIterator<Item = u16>) -> Vec<u8> {
    let mut data = Vec::with_capacity(2 + values.len() * 2);
    data.extend_from_slice(&((values.len() * 2) as u16).to_be_bytes());
    for v in values {
        data.extend_from_slice(&v.to_be_bytes());
    }
    data
}

/// Parse `u16 list<2>`; the list must be non-empty and fill the extension.
fn parse_u16_list(data: &[u8], what: &'static str) -> Result<Vec<u16>, TlsError> {
    let mut r = Reader::new(data, what);
    let list = r.vec16()?;
    r.finish()?;
    if list.is_empty() || list.len() % 2 != 0 {
        return Err(r.err("bad list length"));
    }
    Ok(list
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect())
}

// ---------------------------------------------------------------------------
// supported_versions
// ---------------------------------------------------------------------------

pub fn build_supported_versions_ch(versions: &[TlsVersion]) -> Extension {
    let mut data = Vec::with_capacity(1 + versions.len() * 2);
    data.push((versions.len() * 2) as u8);
    for v in versions {
        data.extend_from_slice(&v.to_wire().to_be_bytes());
    }
    ext(ExtensionType::SUPPORTED_VERSIONS, data)
}

/// Raw version values offered by the client.
///
/// The list must be non-empty, of even length and exactly fill the
/// extension; anything else is `illegal_parameter`.
pub fn parse_supported_versions_ch(data: &[u8]) -> Result<Vec<u16>, TlsError> {
    let bad = || TlsError::IllegalParameter("supported_versions: malformed".into());
    let (&len, rest) = data.split_first().ok_or_else(bad)?;
    let len = len as usize;
    if len == 0 || len % 2 != 0 || len != rest.len() {
        return Err(bad());
    }
    Ok(rest
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect())
}

/// Pick the highest supported version the client offered.
pub fn negotiate_version(offered: &[u16], supported: &[TlsVersion]) -> Result<TlsVersion, TlsError> {
    offered
        .iter()
        .filter_map(|v| TlsVersion::from_wire(*v))
        .filter(|v| supported.contains(v))
        .max()
        .ok_or(TlsError::ProtocolVersion)
}

// ---------------------------------------------------------------------------
// supported_groups / signature_algorithms
// ---------------------------------------------------------------------------

pub fn build_supported_groups(groups: &[NamedGroup]) -> Extension {
    ext(
        ExtensionType::SUPPORTED_GROUPS,
        u16_list(groups.iter().map(|g| g.0)),
    )
}

pub fn parse_supported_groups(data: &[u8]) -> Result<Vec<NamedGroup>, TlsError> {
    Ok(parse_u16_list(data, "supported_groups")?
        .into_iter()
        .map(NamedGroup)
        .collect())
}

pub fn build_signature_algorithms(schemes: &[SignatureScheme]) -> Extension {
    ext(
        ExtensionType::SIGNATURE_ALGORITHMS,
        u16_list(schemes.iter().map(|s| s.0)),
    )
}

pub fn parse_signature_algorithms(data: &[u8]) -> Result<Vec<SignatureScheme>, TlsError> {
    Ok(parse_u16_list(data, "signature_algorithms")?
        .into_iter()
        .map(SignatureScheme)
        .collect())
}

/// Empty signature_algorithms marker a server puts in its ServerHello when it
/// authenticates with a certificate.
pub fn build_signature_algorithms_sh() -> Extension {
    ext(ExtensionType::SIGNATURE_ALGORITHMS, Vec::new())
}

// ---------------------------------------------------------------------------
// key_share
// ---------------------------------------------------------------------------

fn put_key_share_entry(out: &mut Vec<u8>, entry: &KeyShareEntry) {
    out.extend_from_slice(&entry.group.0.to_be_bytes());
    out.extend_from_slice(&(entry.key_exchange.len() as u16).to_be_bytes());
    out.extend_from_slice(&entry.key_exchange);
}

fn read_key_share_entry(r: &mut Reader<'_>) -> Result<KeyShareEntry, TlsError> {
    let group = NamedGroup(r.u16()?);
    let key_exchange = r.vec16()?;
    if key_exchange.is_empty() {
        return Err(r.err("empty key_exchange"));
    }
    Ok(KeyShareEntry {
        group,
        key_exchange: key_exchange.to_vec(),
    })
}

/// key_share for ClientHello: `KeyShareEntry client_shares<2>`.
pub fn build_key_share_ch(shares: &[KeyShareEntry]) -> Extension {
    let mut list = Vec::new();
    for s in shares {
        put_key_share_entry(&mut list, s);
    }
    let mut data = Vec::with_capacity(2 + list.len());
    data.extend_from_slice(&(list.len() as u16).to_be_bytes());
    data.extend_from_slice(&list);
    ext(ExtensionType::KEY_SHARE, data)
}

/// Client shares in order. Two shares for the same group are illegal.
pub fn parse_key_share_ch(data: &[u8]) -> Result<Vec<KeyShareEntry>, TlsError> {
    let mut outer = Reader::new(data, "key_share");
    let mut r = Reader::new(outer.vec16()?, "key_share");
    outer.finish()?;
    let mut shares: Vec<KeyShareEntry> = Vec::new();
    while r.remaining() > 0 {
        let entry = read_key_share_entry(&mut r)?;
        if shares.iter().any(|s| s.group == entry.group) {
            return Err(TlsError::IllegalParameter(
                "key_share: duplicate group".into(),
            ));
        }
        shares.push(entry);
    }
    Ok(shares)
}

/// key_share for ServerHello: a single `KeyShareEntry`.
pub fn build_key_share_sh(share: &KeyShareEntry) -> Extension {
    let mut data = Vec::new();
    put_key_share_entry(&mut data, share);
    ext(ExtensionType::KEY_SHARE, data)
}

pub fn parse_key_share_sh(data: &[u8]) -> Result<KeyShareEntry, TlsError> {
    let mut r = Reader::new(data, "key_share");
    let entry = read_key_share_entry(&mut r)?;
    r.finish()?;
    Ok(entry)
}

// ---------------------------------------------------------------------------
// pre_shared_key
// ---------------------------------------------------------------------------

/// pre_shared_key for ClientHello: `opaque identity<1..2^16-1> identities<2>`.
pub fn build_pre_shared_key_ch(identities: &[Vec<u8>]) -> Extension {
    let list_len: usize = identities.iter().map(|i| 2 + i.len()).sum();
    let mut data = Vec::with_capacity(2 + list_len);
    data.extend_from_slice(&(list_len as u16).to_be_bytes());
    for id in identities {
        data.extend_from_slice(&(id.len() as u16).to_be_bytes());
        data.extend_from_slice(id);
    }
    ext(ExtensionType::PRE_SHARED_KEY, data)
}

pub fn parse_pre_shared_key_ch(data: &[u8]) -> Result<Vec<Vec<u8>>, TlsError> {
    let mut outer = Reader::new(data, "pre_shared_key");
    let mut r = Reader::new(outer.vec16()?, "pre_shared_key");
    outer.finish()?;
    let mut identities = Vec::new();
    while r.remaining() > 0 {
        let id = r.vec16()?;
        if id.is_empty() {
            return Err(r.err("empty identity"));
        }
        identities.push(id.to_vec());
    }
    if identities.is_empty() {
        return Err(r.err("no identities"));
    }
    Ok(identities)
}

/// pre_shared_key for ServerHello: the selected identity index.
pub fn build_pre_shared_key_sh(selected: u16) -> Extension {
    ext(ExtensionType::PRE_SHARED_KEY, selected.to_be_bytes().to_vec())
}

pub fn parse_pre_shared_key_sh(data: &[u8]) -> Result<u16, TlsError> {
    let mut r = Reader::new(data, "pre_shared_key");
    let selected = r.u16()?;
    r.finish()?;
    Ok(selected)
}

// ---------------------------------------------------------------------------
// early_data / ticket_early_data_info
// ---------------------------------------------------------------------------

/// early_data is empty in both ClientHello and EncryptedExtensions.
pub fn build_early_data() -> Extension {
    ext(ExtensionType::EARLY_DATA, Vec::new())
}

pub fn parse_early_data(data: &[u8]) -> Result<(), TlsError> {
    if !data.is_empty() {
        return Err(TlsError::DecodeError("early_data: not empty".into()));
    }
    Ok(())
}

pub fn build_ticket_early_data_info(ticket_age_add: u32) -> Extension {
    ext(
        ExtensionType::TICKET_EARLY_DATA_INFO,
        ticket_age_add.to_be_bytes().to_vec(),
    )
}

pub fn parse_ticket_early_data_info(data: &[u8]) -> Result<u32, TlsError> {
    let mut r = Reader::new(data, "ticket_early_data_info");
    let age_add = r.u32()?;
    r.finish()?;
    Ok(age_add)
}

// ---------------------------------------------------------------------------
// ALPN
// ---------------------------------------------------------------------------

/// ALPN with a `ProtocolName protocol_name_list<2>` list.
pub fn build_alpn(protocols: &[Vec<u8>]) -> Extension {
    let list_len: usize = protocols.iter().map(|p| 1 + p.len()).sum();
    let mut data = Vec::with_capacity(2 + list_len);
    data.extend_from_slice(&(list_len as u16).to_be_bytes());
    for p in protocols {
        data.push(p.len() as u8);
        data.extend_from_slice(p);
    }
    ext(ExtensionType::APPLICATION_LAYER_PROTOCOL_NEGOTIATION, data)
}

pub fn parse_alpn(data: &[u8]) -> Result<Vec<Vec<u8>>, TlsError> {
    let mut outer = Reader::new(data, "alpn");
    let mut r = Reader::new(outer.vec16()?, "alpn");
    outer.finish()?;
    let mut protocols = Vec::new();
    while r.remaining() > 0 {
        let p = r.vec8()?;
        if p.is_empty() {
            return Err(r.err("empty protocol name"));
        }
        protocols.push(p.to_vec());
    }
    if protocols.is_empty() {
        return Err(r.err("empty list"));
    }
    Ok(protocols)
}

/// Server's ALPN answer: exactly one protocol.
pub fn parse_alpn_selected(data: &[u8]) -> Result<Vec<u8>, TlsError> {
    let mut protocols = parse_alpn(data)?;
    if protocols.len() != 1 {
        return Err(TlsError::DecodeError(
            "alpn: server must select one protocol".into(),
        ));
    }
    Ok(protocols.remove(0))
}

// ---------------------------------------------------------------------------
// server_name
// ---------------------------------------------------------------------------

pub fn build_server_name(hostname: &str) -> Extension {
    let name = hostname.as_bytes();
    let entry_len = 1 + 2 + name.len();
    let mut data = Vec::with_capacity(2 + entry_len);
    data.extend_from_slice(&(entry_len as u16).to_be_bytes());
    data.push(0); // host_name
    data.extend_from_slice(&(name.len() as u16).to_be_bytes());
    data.extend_from_slice(name);
    ext(ExtensionType::SERVER_NAME, data)
}

/// Server's acknowledgement of SNI in EncryptedExtensions.
pub fn build_server_name_ack() -> Extension {
    ext(ExtensionType::SERVER_NAME, Vec::new())
}

/// First host_name entry of a client's server_name extension.
pub fn parse_server_name(data: &[u8]) -> Result<Option<String>, TlsError> {
    let mut outer = Reader::new(data, "server_name");
    let mut r = Reader::new(outer.vec16()?, "server_name");
    outer.finish()?;
    let mut host = None;
    while r.remaining() > 0 {
        let name_type = r.u8()?;
        let name = r.vec16()?;
        if name_type == 0 && host.is_none() {
            let s = std::str::from_utf8(name)
                .map_err(|_| TlsError::DecodeError("server_name: not UTF-8".into()))?;
            host = Some(s.to_string());
        }
    }
    Ok(host)
}
