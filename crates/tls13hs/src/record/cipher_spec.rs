//! Installed record protection state for one direction.
//!
//! A `CipherSpec` is shared as `Arc<CipherSpec>` between the record layer and
//! whoever is about to replace it; replacement swaps the `Arc`, so records in
//! flight keep the spec they started with.

use std::fmt;
use std::sync::Mutex;

use crate::crypt::aead::{create_aead, TlsAead};
use crate::crypt::traffic_keys::{TrafficKeys, TrafficPhase};
use crate::crypt::CipherSuiteParams;
use crate::{CipherSuite, Transport};
use tls13hs_types::TlsError;
use zeroize::Zeroize;

/// Key material plus sequence bookkeeping for one traffic-key generation.
pub struct CipherSpec {
    phase: Option<TrafficPhase>,
    suite: Option<CipherSuite>,
    epoch: u16,
    aead: Option<Box<dyn TlsAead>>,
    iv: Vec<u8>,
    max_records: u64,
    seq: Mutex<u64>,
}

impl Drop for CipherSpec {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

impl fmt::Debug for CipherSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherSpec")
            .field("phase", &self.phase)
            .field("suite", &self.suite)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

impl CipherSpec {
    /// The plaintext spec in effect before any keys are installed.
    pub fn null() -> Self {
        Self {
            phase: None,
            suite: None,
            epoch: 0,
            aead: None,
            iv: Vec::new(),
            max_records: u64::MAX,
            seq: Mutex::new(0),
        }
    }

    /// Build a keyed spec. The sequence number starts at 0 on stream
    /// transport and at `epoch << 48` on datagram transport.
    pub fn new(
        params: &CipherSuiteParams,
        phase: TrafficPhase,
        epoch: u16,
        keys: &TrafficKeys,
        transport: Transport,
        max_records: u64,
    ) -> Result<Self, TlsError> {
        let aead = create_aead(params.suite, &keys.key)?;
        let seq = match transport {
            Transport::Stream => 0,
            Transport::Datagram => u64::from(epoch) << 48,
        };
        Ok(Self {
            phase: Some(phase),
            suite: Some(params.suite),
            epoch,
            aead: Some(aead),
            iv: keys.iv.clone(),
            max_records,
            seq: Mutex::new(seq),
        })
    }

    pub fn is_null(&self) -> bool {
        self.aead.is_none()
    }

    pub fn phase(&self) -> Option<TrafficPhase> {
        self.phase
    }

    pub fn suite(&self) -> Option<CipherSuite> {
        self.suite
    }

    pub fn epoch(&self) -> u16 {
        self.epoch
    }

    pub fn max_records(&self) -> u64 {
        self.max_records
    }

    pub(crate) fn aead(&self) -> Option<&dyn TlsAead> {
        self.aead.as_deref()
    }

    pub(crate) fn iv(&self) -> &[u8] {
        &self.iv
    }

    /// Next sequence number this spec will use.
    pub fn sequence_number(&self) -> Result<u64, TlsError> {
        self.seq
            .lock()
            .map(|s| *s)
            .map_err(|_| TlsError::InternalError("cipher spec lock poisoned".into()))
    }

    /// Run `f` with exclusive access to the sequence number.
    pub(crate) fn with_seq<T>(
        &self,
        f: impl FnOnce(&mut u64) -> Result<T, TlsError>,
    ) -> Result<T, TlsError> {
        let mut guard = self
            .seq
            .lock()
            .map_err(|_| TlsError::InternalError("cipher spec lock poisoned".into()))?;
        f(&mut guard)
    }

    #[cfg(test)]
    pub(crate) fn set_sequence_number(&self, seq: u64) {
        if let Ok(mut guard) = self.seq.lock() {
            *guard = seq;
        }
    }
}
