//! Round persistence.
//!
//! The ledger only talks to [`RoundStore`]. [`MemoryRoundStore`] is the
//! default; [`RocksRoundStore`] (feature `rocksdb`) keeps JSON records in
//! RocksDB under `round:` keys with a per-seed index.

use crate::errors::{EngineError, EngineResult, StorageError};
use crate::ledger::Round;
use crate::seed_vault::SeedId;
use dashmap::{mapref::entry::Entry, DashMap};

/// Storage interface for round records
pub trait RoundStore: Send + Sync {
    /// Insert a new round; fails if the round number exists.
    fn insert(&self, round: Round) -> EngineResult<()>;

    fn get(&self, round_number: u64) -> EngineResult<Option<Round>>;

    /// Atomic read-modify-write of one round. Returns the stored result.
    fn update(
        &self,
        round_number: u64,
        apply: &mut dyn FnMut(&mut Round) -> EngineResult<()>,
    ) -> EngineResult<Round>;

    fn rounds_for_seed(&self, seed_id: SeedId) -> EngineResult<Vec<Round>>;

    /// Highest round number stored, if any
    fn last_round_number(&self) -> EngineResult<Option<u64>>;

    /// Highest seed id referenced by any stored round
    fn last_seed_id(&self) -> EngineResult<Option<SeedId>>;
}

/// In-memory round store
#[derive(Default)]
pub struct MemoryRoundStore {
    rounds: DashMap<u64, Round>,
}

impl MemoryRoundStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }
}

impl RoundStore for MemoryRoundStore {
    fn insert(&self, round: Round) -> EngineResult<()> {
        match self.rounds.entry(round.round_number) {
            Entry::Occupied(_) => Err(StorageError::DuplicateRound(round.round_number).into()),
            Entry::Vacant(slot) => {
                slot.insert(round);
                Ok(())
            }
        }
    }

    fn get(&self, round_number: u64) -> EngineResult<Option<Round>> {
        Ok(self.rounds.get(&round_number).map(|r| r.value().clone()))
    }

    fn update(
        &self,
        round_number: u64,
        apply: &mut dyn FnMut(&mut Round) -> EngineResult<()>,
    ) -> EngineResult<Round> {
        let mut entry = self
            .rounds
            .get_mut(&round_number)
            .ok_or(EngineError::RoundNotFound(round_number))?;
        let mut working = entry.value().clone();
        apply(&mut working)?;
        *entry.value_mut() = working.clone();
        Ok(working)
    }

    fn rounds_for_seed(&self, seed_id: SeedId) -> EngineResult<Vec<Round>> {
        let mut rounds: Vec<Round> = self
            .rounds
            .iter()
            .filter(|r| r.seed_id == seed_id)
            .map(|r| r.value().clone())
            .collect();
        rounds.sort_by_key(|r| r.round_number);
        Ok(rounds)
    }

    fn last_round_number(&self) -> EngineResult<Option<u64>> {
        Ok(self.rounds.iter().map(|r| *r.key()).max())
    }

    fn last_seed_id(&self) -> EngineResult<Option<SeedId>> {
        Ok(self.rounds.iter().map(|r| r.seed_id).max())
    }
}

#[cfg(feature = "rocksdb")]
pub use rocks::RocksRoundStore;

#[cfg(feature = "rocksdb")]
mod rocks {
    use super::*;
    use parking_lot::Mutex;
    use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
    use std::path::Path;

    const ROUND_PREFIX: &[u8] = b"round:num:";
    const SEED_INDEX_PREFIX: &[u8] = b"round:seed:";

    fn round_key(round_number: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(ROUND_PREFIX.len() + 8);
        key.extend_from_slice(ROUND_PREFIX);
        key.extend_from_slice(&round_number.to_be_bytes());
        key
    }

    // Key layout: prefix | seed_id(be) | round_number(be)
    fn seed_index_key(seed_id: SeedId, round_number: u64) -> Vec<u8> {
        let mut key = seed_index_prefix(seed_id);
        key.extend_from_slice(&round_number.to_be_bytes());
        key
    }

    fn seed_index_prefix(seed_id: SeedId) -> Vec<u8> {
        let mut key = Vec::with_capacity(SEED_INDEX_PREFIX.len() + 16);
        key.extend_from_slice(SEED_INDEX_PREFIX);
        key.extend_from_slice(&seed_id.to_be_bytes());
        key
    }

    fn decode(round_number: u64, bytes: &[u8]) -> EngineResult<Round> {
        serde_json::from_slice(bytes).map_err(|e| {
            StorageError::CorruptedData(format!("Failed to decode round {}: {}", round_number, e)).into()
        })
    }

    /// RocksDB-backed round store
    pub struct RocksRoundStore {
        db: DB,
        write_lock: Mutex<()>,
    }

    impl RocksRoundStore {
        pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
            let mut opts = Options::default();
            opts.create_if_missing(true);
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            let db = DB::open(&opts, path)
                .map_err(|e| StorageError::DatabaseOpenFailed(e.to_string()))?;
            Ok(Self {
                db,
                write_lock: Mutex::new(()),
            })
        }

        fn put(&self, round: &Round, with_index: bool) -> EngineResult<()> {
            let bytes = serde_json::to_vec(round).map_err(|e| {
                StorageError::WriteFailed(format!(
                    "Failed to encode round {}: {}",
                    round.round_number, e
                ))
            })?;
            let mut batch = WriteBatch::default();
            batch.put(round_key(round.round_number), bytes);
            if with_index {
                batch.put(seed_index_key(round.seed_id, round.round_number), []);
            }
            self.db
                .write(batch)
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            Ok(())
        }

        /// First big-endian u64 after `prefix` in the last key under `prefix`
        fn last_id_under(&self, prefix: &[u8], suffix_len: usize) -> EngineResult<Option<u64>> {
            let mut upper = prefix.to_vec();
            upper.extend(std::iter::repeat(0xff).take(suffix_len));
            let mut iter = self
                .db
                .iterator(IteratorMode::From(&upper, Direction::Reverse));
            let Some(item) = iter.next() else {
                return Ok(None);
            };
            let (key, _) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) || key.len() != prefix.len() + suffix_len {
                return Ok(None);
            }
            let id: [u8; 8] = key[prefix.len()..prefix.len() + 8]
                .try_into()
                .map_err(|_| StorageError::CorruptedData("malformed key".into()))?;
            Ok(Some(u64::from_be_bytes(id)))
        }

        fn read(&self, round_number: u64) -> EngineResult<Option<Round>> {
            let bytes = self
                .db
                .get(round_key(round_number))
                .map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            bytes.map(|b| decode(round_number, &b)).transpose()
        }
    }

    impl RoundStore for RocksRoundStore {
        fn insert(&self, round: Round) -> EngineResult<()> {
            let _guard = self.write_lock.lock();
            if self.read(round.round_number)?.is_some() {
                return Err(StorageError::DuplicateRound(round.round_number).into());
            }
            self.put(&round, true)
        }

        fn get(&self, round_number: u64) -> EngineResult<Option<Round>> {
            self.read(round_number)
        }

        fn update(
            &self,
            round_number: u64,
            apply: &mut dyn FnMut(&mut Round) -> EngineResult<()>,
        ) -> EngineResult<Round> {
            let _guard = self.write_lock.lock();
            let mut round = self
                .read(round_number)?
                .ok_or(EngineError::RoundNotFound(round_number))?;
            apply(&mut round)?;
            self.put(&round, false)?;
            Ok(round)
        }

        fn rounds_for_seed(&self, seed_id: SeedId) -> EngineResult<Vec<Round>> {
            let prefix = seed_index_prefix(seed_id);
            let mut rounds = Vec::new();
            for item in self
                .db
                .iterator(IteratorMode::From(&prefix, Direction::Forward))
            {
                let (key, _) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
                if !key.starts_with(&prefix) {
                    break;
                }
                let tail: [u8; 8] = key[prefix.len()..]
                    .try_into()
                    .map_err(|_| StorageError::CorruptedData("malformed seed index key".into()))?;
                if let Some(round) = self.read(u64::from_be_bytes(tail))? {
                    rounds.push(round);
                }
            }
            Ok(rounds)
        }

        fn last_round_number(&self) -> EngineResult<Option<u64>> {
            self.last_id_under(ROUND_PREFIX, 8)
        }

        fn last_seed_id(&self) -> EngineResult<Option<SeedId>> {
            self.last_id_under(SEED_INDEX_PREFIX, 16)
        }
    }

}
