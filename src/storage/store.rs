// CoordStore - Persistent key-value storage using sled
//
// Provides typed access for storing:
// - In-flight transaction records (per account, per nonce)
// - Deployment step completion markers
// - Vote records (one slot per subject+voter)
// - Cached nonce hints

use crate::lifecycle::{InFlightTx, TxState};
use crate::votes::Vote;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Key prefixes for organizing data
mod keys {
    pub const INFLIGHT_PREFIX: &str = "inflight:";
    pub const DEPLOY_PREFIX: &str = "deploy:";
    pub const VOTE_PREFIX: &str = "vote:";
    pub const NONCE_HINT_PREFIX: &str = "nonce:";
}

/// Errors from storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    OpenFailed(String),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Flush failed: {0}")]
    FlushFailed(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

/// Statistics about the storage
#[derive(Clone, Debug)]
pub struct StorageStats {
    /// Number of keys in the database
    pub key_count: usize,
    /// Approximate disk size in bytes
    pub disk_size_bytes: u64,
}

/// Persistent store for coordination state
///
/// Uses sled for crash-safe, embedded storage. Writes are durable after
/// flush; the one-slot-per-key vote insert uses compare-and-swap so a
/// check-then-insert race cannot admit two votes for the same pair.
pub struct CoordStore {
    db: sled::Db,
}

impl CoordStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self { db })
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.db.is_empty())
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::FlushFailed(e.to_string()))?;
        Ok(())
    }

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats, StoreError> {
        Ok(StorageStats {
            key_count: self.db.len(),
            disk_size_bytes: self.db.size_on_disk().unwrap_or(0),
        })
    }

    // ========================================================================
    // RAW KEY-VALUE OPERATIONS
    // ========================================================================

    /// Put raw bytes
    pub fn put_raw(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db.insert(key, value)?;
        Ok(())
    }

    /// Get raw bytes
    pub fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    /// Delete a key
    pub fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.db.remove(key)?;
        Ok(())
    }

    /// Insert only if the key is vacant. Returns false when the key was
    /// already occupied; the stored value is left untouched.
    pub fn put_if_absent(&self, key: &[u8], value: &[u8]) -> Result<bool, StoreError> {
        let outcome = self
            .db
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))?;
        Ok(outcome.is_ok())
    }

    /// List all (key, value) pairs with a given prefix, in key order
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut entries = Vec::new();
        for result in self.db.scan_prefix(prefix) {
            let (key, value) = result?;
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        postcard::to_allocvec(value).map_err(|e| StoreError::SerializationFailed(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        postcard::from_bytes(bytes).map_err(|e| StoreError::DeserializationFailed(e.to_string()))
    }

    // ========================================================================
    // IN-FLIGHT TRANSACTION RECORDS
    // ========================================================================

    fn inflight_key(record: &InFlightTx) -> Vec<u8> {
        format!(
            "{}{}:{:020}:{}",
            keys::INFLIGHT_PREFIX,
            record.account(),
            record.nonce(),
            record.tx_id()
        )
        .into_bytes()
    }

    /// Save (or update) an in-flight record
    pub fn save_inflight(&self, record: &InFlightTx) -> Result<(), StoreError> {
        self.put_raw(&Self::inflight_key(record), &Self::encode(record)?)
    }

    /// Atomically persist a replacement: the superseded record (already
    /// marked Replaced) and the new Submitted record land in one batch.
    pub fn save_replacement(
        &self,
        superseded: &InFlightTx,
        replacement: &InFlightTx,
    ) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        batch.insert(Self::inflight_key(superseded), Self::encode(superseded)?);
        batch.insert(Self::inflight_key(replacement), Self::encode(replacement)?);
        self.db.apply_batch(batch)?;
        Ok(())
    }

    /// All records for an account, ordered by nonce then tx id
    pub fn inflight_for_account(&self, account: &str) -> Result<Vec<InFlightTx>, StoreError> {
        let prefix = format!("{}{}:", keys::INFLIGHT_PREFIX, account);
        let mut records = Vec::new();
        for (_, value) in self.scan_prefix(prefix.as_bytes())? {
            records.push(Self::decode(&value)?);
        }
        Ok(records)
    }

    /// The currently Submitted record at (account, nonce), if any.
    /// The lifecycle invariant keeps this to at most one.
    pub fn submitted_at_nonce(
        &self,
        account: &str,
        nonce: u64,
    ) -> Result<Option<InFlightTx>, StoreError> {
        let prefix = format!("{}{}:{:020}:", keys::INFLIGHT_PREFIX, account, nonce);
        for (_, value) in self.scan_prefix(prefix.as_bytes())? {
            let record: InFlightTx = Self::decode(&value)?;
            if record.state() == TxState::Submitted {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Delete terminal records for an account; returns how many were removed
    pub fn prune_terminal_inflight(&self, account: &str) -> Result<usize, StoreError> {
        let prefix = format!("{}{}:", keys::INFLIGHT_PREFIX, account);
        let mut pruned = 0;
        for (key, value) in self.scan_prefix(prefix.as_bytes())? {
            let record: InFlightTx = Self::decode(&value)?;
            if record.state().is_terminal() {
                self.db.remove(key)?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    // ========================================================================
    // DEPLOYMENT COMPLETION MARKERS
    // ========================================================================

    fn step_key(pipeline: &str, step: &str) -> Vec<u8> {
        format!("{}{}:{}", keys::DEPLOY_PREFIX, pipeline, step).into_bytes()
    }

    /// Record a step's produced value
    pub fn save_step_marker(
        &self,
        pipeline: &str,
        step: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        self.put_raw(&Self::step_key(pipeline, step), value.as_bytes())
    }

    /// Load a step's completion marker
    pub fn load_step_marker(
        &self,
        pipeline: &str,
        step: &str,
    ) -> Result<Option<String>, StoreError> {
        match self.get_raw(&Self::step_key(pipeline, step))? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes).map_err(|e| {
                StoreError::DeserializationFailed(e.to_string())
            })?)),
            None => Ok(None),
        }
    }

    /// Remove a step's completion marker (operator-forced re-execution)
    pub fn delete_step_marker(&self, pipeline: &str, step: &str) -> Result<(), StoreError> {
        self.delete(&Self::step_key(pipeline, step))
    }

    /// All completed (step, value) pairs for a pipeline
    pub fn step_markers(&self, pipeline: &str) -> Result<Vec<(String, String)>, StoreError> {
        let prefix = format!("{}{}:", keys::DEPLOY_PREFIX, pipeline);
        let mut markers = Vec::new();
        for (key, value) in self.scan_prefix(prefix.as_bytes())? {
            let step = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            let value = String::from_utf8(value)
                .map_err(|e| StoreError::DeserializationFailed(e.to_string()))?;
            markers.push((step, value));
        }
        Ok(markers)
    }

    // ========================================================================
    // VOTE RECORDS
    // ========================================================================

    fn vote_key(subject: &str, voter: &str) -> Vec<u8> {
        format!("{}{}:{}", keys::VOTE_PREFIX, subject, voter).into_bytes()
    }

    /// Insert a vote only if the (subject, voter) slot is vacant.
    /// Returns false when the slot was already taken.
    pub fn put_vote_if_absent(&self, vote: &Vote) -> Result<bool, StoreError> {
        let key = Self::vote_key(vote.subject(), vote.voter());
        self.put_if_absent(&key, &Self::encode(vote)?)
    }

    /// Load a single vote
    pub fn load_vote(&self, subject: &str, voter: &str) -> Result<Option<Vote>, StoreError> {
        match self.get_raw(&Self::vote_key(subject, voter))? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All votes cast on a subject, in voter order
    pub fn votes_for_subject(&self, subject: &str) -> Result<Vec<Vote>, StoreError> {
        let prefix = format!("{}{}:", keys::VOTE_PREFIX, subject);
        let mut votes = Vec::new();
        for (_, value) in self.scan_prefix(prefix.as_bytes())? {
            votes.push(Self::decode(&value)?);
        }
        Ok(votes)
    }

    // ========================================================================
    // NONCE HINTS
    // ========================================================================

    /// Cache the next expected nonce for an account (fast local read;
    /// never a substitute for the live pending view when planning)
    pub fn save_nonce_hint(&self, account: &str, nonce: u64) -> Result<(), StoreError> {
        let key = format!("{}{}", keys::NONCE_HINT_PREFIX, account);
        self.put_raw(key.as_bytes(), &nonce.to_be_bytes())
    }

    /// Load the cached next-nonce hint for an account
    pub fn load_nonce_hint(&self, account: &str) -> Result<Option<u64>, StoreError> {
        let key = format!("{}{}", keys::NONCE_HINT_PREFIX, account);
        match self.get_raw(key.as_bytes())? {
            Some(bytes) => {
                if bytes.len() != 8 {
                    return Err(StoreError::DeserializationFailed(
                        "Invalid nonce hint length".to_string(),
                    ));
                }
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&bytes);
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }
}
