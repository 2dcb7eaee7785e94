//! Resumable sessions and the session cache.
//!
//! Tickets are stateful: the server hands out a random identity and keeps the
//! session in its cache under that identity. Clients cache the tickets they
//! receive under the server name they connected to.

use crate::{CipherSuite, TlsVersion};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroize;

/// Everything needed to offer or accept a PSK resumption.
#[derive(Clone)]
pub struct TlsSession {
    /// Opaque identity sent in `pre_shared_key`.
    pub ticket: Vec<u8>,
    pub version: TlsVersion,
    pub cipher_suite: CipherSuite,
    pub resumption_master_secret: Vec<u8>,
    pub alpn_protocol: Option<Vec<u8>>,
    pub server_name: Option<String>,
    pub allow_early_data: bool,
    pub ticket_age_add: u32,
    /// Seconds; 0 means the server gave no hint.
    pub ticket_lifetime: u32,
    /// Unix seconds at issue time.
    pub created_at: u64,
}

impl Drop for TlsSession {
    fn drop(&mut self) {
        self.resumption_master_secret.zeroize();
    }
}

impl std::fmt::Debug for TlsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSession")
            .field("ticket_len", &self.ticket.len())
            .field("version", &self.version)
            .field("cipher_suite", &self.cipher_suite)
            .field("alpn_protocol", &self.alpn_protocol)
            .field("server_name", &self.server_name)
            .field("allow_early_data", &self.allow_early_data)
            .field("ticket_lifetime", &self.ticket_lifetime)
            .finish_non_exhaustive()
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl TlsSession {
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }

    /// Past the ticket lifetime hint, if there is one.
    pub fn is_expired(&self, now: u64) -> bool {
        self.ticket_lifetime != 0 && self.age(now) >= u64::from(self.ticket_lifetime)
    }
}

/// Storage for sessions, keyed by ticket identity (server) or server name
/// (client). Connections share one as `Arc<Mutex<dyn SessionCache>>`.
pub trait SessionCache: Send + Sync {
    fn put(&mut self, key: &[u8], session: TlsSession);
    /// Expired entries read as absent.
    fn get(&self, key: &[u8]) -> Option<&TlsSession>;
    fn remove(&mut self, key: &[u8]);
}

/// Bounded in-memory [`SessionCache`]. When full, the oldest entry is evicted.
pub struct InMemorySessionCache {
    entries: HashMap<Vec<u8>, TlsSession>,
    capacity: usize,
    /// Cache-side cap on session age in seconds, on top of the ticket hint.
    max_age: u64,
}

impl InMemorySessionCache {
    pub const DEFAULT_MAX_AGE: u64 = 7200;

    pub fn new(capacity: usize) -> Self {
        Self::with_lifetime(capacity, Self::DEFAULT_MAX_AGE)
    }

    /// `max_age == 0` disables the cache-side cap.
    pub fn with_lifetime(capacity: usize, max_age: u64) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
            max_age,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cleanup(&mut self) {
        let now = now_secs();
        let max_age = self.max_age;
        self.entries
            .retain(|_, s| !Self::stale(max_age, s, now));
    }

    fn stale(max_age: u64, session: &TlsSession, now: u64) -> bool {
        session.is_expired(now) || (max_age != 0 && session.age(now) > max_age)
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, s)| s.created_at)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

impl SessionCache for InMemorySessionCache {
    fn put(&mut self, key: &[u8], session: TlsSession) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(key.to_vec(), session);
    }

    fn get(&self, key: &[u8]) -> Option<&TlsSession> {
        self.entries
            .get(key)
            .filter(|s| !Self::stale(self.max_age, s, now_secs()))
    }

    fn remove(&mut self, key: &[u8]) {
        self.entries.remove(key);
    }
}
