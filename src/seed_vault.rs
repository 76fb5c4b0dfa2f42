//! Server-seed lifecycle: commit, bind, retire, reveal.
//!
//! The vault is the only place raw server seeds live. Outside callers see a
//! [`Seed`] view whose `server_seed` stays `None` until the seed is revealed.
//! Each seed sits behind its own mutex so operations on one seed serialize
//! while different seeds proceed in parallel.

use crate::byte_stream::ByteStream;
use crate::errors::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use subtle::ConstantTimeEq;

pub type SeedId = u64;

/// Server seed length in bytes
pub const SERVER_SEED_LEN: usize = 32;

/// Maximum client seed length in characters
pub const MAX_CLIENT_SEED_LEN: usize = 64;

/// 256-bit server seed
#[derive(Clone, PartialEq, Eq)]
pub struct ServerSeed([u8; SERVER_SEED_LEN]);

impl ServerSeed {
    pub fn from_bytes(bytes: [u8; SERVER_SEED_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(value: &str) -> EngineResult<Self> {
        let bytes = hex::decode(value)
            .map_err(|e| EngineError::invalid_parameters(format!("server seed hex: {}", e)))?;
        let bytes: [u8; SERVER_SEED_LEN] = bytes.try_into().map_err(|_| {
            EngineError::invalid_parameters(format!(
                "server seed must be {} bytes",
                SERVER_SEED_LEN
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SERVER_SEED_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Hex SHA-256 of the raw seed bytes; the published commitment
    pub fn commitment(&self) -> String {
        hex::encode(Sha256::digest(self.0))
    }

    /// Constant-time check of this seed against a published commitment
    pub fn matches_commitment(&self, commitment_hex: &str) -> bool {
        let Ok(expected) = hex::decode(commitment_hex) else {
            return false;
        };
        let actual = Sha256::digest(self.0);
        expected.len() == actual.len() && bool::from(actual.as_slice().ct_eq(&expected))
    }
}

impl fmt::Debug for ServerSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerSeed(<redacted>)")
    }
}

/// Seed lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SeedState {
    Committed,
    Revealed,
}

/// Public view of a seed. `server_seed` is only present once revealed.
#[derive(Debug, Clone)]
pub struct Seed {
    pub seed_id: SeedId,
    pub server_seed_hash: String,
    pub server_seed: Option<ServerSeed>,
    pub client_seed: Option<String>,
    pub state: SeedState,
    pub rounds_opened: u64,
    pub retired: bool,
    pub committed_at: DateTime<Utc>,
    pub revealed_at: Option<DateTime<Utc>>,
}

/// Seed facts copied onto a round when it is opened
#[derive(Debug, Clone)]
pub struct SeedBinding {
    pub seed_id: SeedId,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub rounds_opened: u64,
}

/// Source of seed randomness
pub trait EntropySource: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> Result<(), String>;
}

/// Operating-system CSPRNG
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<(), String> {
        OsRng.try_fill_bytes(dest).map_err(|e| e.to_string())
    }
}

struct SeedEntry {
    server_seed: ServerSeed,
    server_seed_hash: String,
    client_seed: Option<String>,
    state: SeedState,
    rounds_opened: u64,
    retired: bool,
    committed_at: DateTime<Utc>,
    revealed_at: Option<DateTime<Utc>>,
}

impl SeedEntry {
    fn view(&self, seed_id: SeedId) -> Seed {
        Seed {
            seed_id,
            server_seed_hash: self.server_seed_hash.clone(),
            server_seed: match self.state {
                SeedState::Revealed => Some(self.server_seed.clone()),
                SeedState::Committed => None,
            },
            client_seed: self.client_seed.clone(),
            state: self.state,
            rounds_opened: self.rounds_opened,
            retired: self.retired,
            committed_at: self.committed_at,
            revealed_at: self.revealed_at,
        }
    }
}

/// Owner of all server-seed material
pub struct SeedVault {
    seeds: DashMap<SeedId, Arc<Mutex<SeedEntry>>>,
    next_seed_id: AtomicU64,
    entropy: Box<dyn EntropySource>,
    halted: AtomicBool,
    default_client_seed: String,
    rounds_per_seed: Option<u64>,
}

impl SeedVault {
    pub fn new(default_client_seed: impl Into<String>, rounds_per_seed: Option<u64>) -> Self {
        Self::with_entropy(Box::new(OsEntropy), default_client_seed, rounds_per_seed)
    }

    pub fn with_entropy(
        entropy: Box<dyn EntropySource>,
        default_client_seed: impl Into<String>,
        rounds_per_seed: Option<u64>,
    ) -> Self {
        Self {
            seeds: DashMap::new(),
            next_seed_id: AtomicU64::new(1),
            entropy,
            halted: AtomicBool::new(false),
            default_client_seed: default_client_seed.into(),
            rounds_per_seed: rounds_per_seed.filter(|n| *n > 0),
        }
    }

    /// Continue seed numbering after ids already referenced by stored rounds.
    pub fn resume_after(&self, last_seed_id: SeedId) {
        self.next_seed_id.fetch_max(last_seed_id + 1, Ordering::SeqCst);
    }

    /// Generate, hash and store a fresh server seed. Returns the public view only.
    pub fn commit_seed(&self) -> EngineResult<Seed> {
        if self.halted.load(Ordering::SeqCst) {
            return Err(EngineError::EntropyFailure(
                "vault halted after an earlier entropy failure".to_string(),
            ));
        }

        let mut bytes = [0u8; SERVER_SEED_LEN];
        if let Err(e) = self.entropy.fill(&mut bytes) {
            self.halted.store(true, Ordering::SeqCst);
            tracing::error!(error = %e, "Entropy source failed; halting round acceptance");
            return Err(EngineError::EntropyFailure(e));
        }

        Ok(self.commit_seed_with(ServerSeed::from_bytes(bytes)))
    }

    /// Commit a known seed (fixtures and restores).
    pub fn commit_seed_with(&self, server_seed: ServerSeed) -> Seed {
        let seed_id = self.next_seed_id.fetch_add(1, Ordering::SeqCst);
        let entry = SeedEntry {
            server_seed_hash: server_seed.commitment(),
            server_seed,
            client_seed: None,
            state: SeedState::Committed,
            rounds_opened: 0,
            retired: false,
            committed_at: Utc::now(),
            revealed_at: None,
        };
        let view = entry.view(seed_id);
        self.seeds.insert(seed_id, Arc::new(Mutex::new(entry)));

        tracing::info!(seed_id, server_seed_hash = %view.server_seed_hash, "Committed server seed");
        view
    }

    fn entry(&self, seed_id: SeedId) -> EngineResult<Arc<Mutex<SeedEntry>>> {
        self.seeds
            .get(&seed_id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::SeedNotFound(seed_id))
    }

    /// Attach a client seed before first use. `None` binds the published default.
    pub fn bind_client_seed(&self, seed_id: SeedId, client_seed: Option<&str>) -> EngineResult<()> {
        let client_seed = match client_seed {
            Some(value) => validate_client_seed(value)?.to_string(),
            None => self.default_client_seed.clone(),
        };

        let entry = self.entry(seed_id)?;
        let mut entry = entry.lock();
        if entry.rounds_opened > 0 || entry.state == SeedState::Revealed {
            return Err(EngineError::SeedAlreadyInUse { seed_id });
        }
        tracing::debug!(seed_id, client_seed = %client_seed, "Bound client seed");
        entry.client_seed = Some(client_seed);
        Ok(())
    }

    /// Fail if an earlier entropy failure halted the vault
    pub fn ensure_accepting(&self) -> EngineResult<()> {
        if self.halted.load(Ordering::SeqCst) {
            return Err(EngineError::EntropyFailure(
                "round acceptance halted after entropy failure".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Mark the seed in use by one more round and return the facts the round records.
    ///
    /// A requested client seed must match the binding once the seed is in
    /// use (`SeedAlreadyInUse` otherwise); an unused seed takes it. With no
    /// request the existing binding, or the default, applies. Retires the
    /// seed automatically once it reaches the configured round limit.
    pub(crate) fn reserve_round(
        &self,
        seed_id: SeedId,
        client_seed: Option<&str>,
    ) -> EngineResult<SeedBinding> {
        let entry = self.entry(seed_id)?;
        let mut entry = entry.lock();
        if entry.retired || entry.state == SeedState::Revealed {
            return Err(EngineError::SeedRetired { seed_id });
        }

        let client_seed = match client_seed {
            Some(wanted) if entry.client_seed.as_deref() == Some(wanted) => wanted.to_string(),
            Some(_) if entry.rounds_opened > 0 => {
                return Err(EngineError::SeedAlreadyInUse { seed_id });
            }
            Some(wanted) => {
                let wanted = validate_client_seed(wanted)?.to_string();
                entry.client_seed = Some(wanted.clone());
                tracing::debug!(seed_id, client_seed = %wanted, "Bound client seed");
                wanted
            }
            None => entry
                .client_seed
                .get_or_insert_with(|| self.default_client_seed.clone())
                .clone(),
        };
        entry.rounds_opened += 1;

        if let Some(limit) = self.rounds_per_seed {
            if entry.rounds_opened >= limit {
                entry.retired = true;
                tracing::info!(seed_id, rounds = entry.rounds_opened, "Seed reached round limit; retired");
            }
        }

        Ok(SeedBinding {
            seed_id,
            server_seed_hash: entry.server_seed_hash.clone(),
            client_seed,
            rounds_opened: entry.rounds_opened,
        })
    }

    /// Undo a `reserve_round` whose round was never recorded.
    pub(crate) fn release_round(&self, seed_id: SeedId) -> EngineResult<()> {
        let entry = self.entry(seed_id)?;
        let mut entry = entry.lock();
        entry.rounds_opened = entry.rounds_opened.saturating_sub(1);
        tracing::warn!(seed_id, rounds = entry.rounds_opened, "Released unrecorded round reservation");
        Ok(())
    }

    /// Build the byte stream for a round without handing out the seed.
    pub(crate) fn open_stream(&self, seed_id: SeedId, nonce: u64) -> EngineResult<ByteStream> {
        let entry = self.entry(seed_id)?;
        let entry = entry.lock();
        let client_seed = entry
            .client_seed
            .as_deref()
            .unwrap_or(&self.default_client_seed);
        Ok(ByteStream::derive(&entry.server_seed, client_seed, nonce))
    }

    /// Stop any further rounds from referencing this seed.
    pub fn retire(&self, seed_id: SeedId) -> EngineResult<Seed> {
        let entry = self.entry(seed_id)?;
        let mut entry = entry.lock();
        if !entry.retired {
            entry.retired = true;
            tracing::info!(seed_id, rounds = entry.rounds_opened, "Retired server seed");
        }
        Ok(entry.view(seed_id))
    }

    /// Disclose a retired seed. Idempotent.
    pub fn reveal_seed(&self, seed_id: SeedId) -> EngineResult<ServerSeed> {
        let entry = self.entry(seed_id)?;
        let mut entry = entry.lock();
        if !entry.retired {
            return Err(EngineError::SeedStillActive { seed_id });
        }
        if entry.state == SeedState::Committed {
            entry.state = SeedState::Revealed;
            entry.revealed_at = Some(Utc::now());
            tracing::info!(seed_id, server_seed_hash = %entry.server_seed_hash, "Revealed server seed");
        }
        Ok(entry.server_seed.clone())
    }

    pub fn seed(&self, seed_id: SeedId) -> EngineResult<Seed> {
        let entry = self.entry(seed_id)?;
        let entry = entry.lock();
        Ok(entry.view(seed_id))
    }

    /// The raw seed, only if it has been revealed
    pub fn disclosed_seed(&self, seed_id: SeedId) -> EngineResult<Option<ServerSeed>> {
        Ok(self.seed(seed_id)?.server_seed)
    }

    pub fn default_client_seed(&self) -> &str {
        &self.default_client_seed
    }
}

/// Client seeds are 1-64 printable ASCII characters.
pub fn validate_client_seed(value: &str) -> EngineResult<&str> {
    if value.is_empty() || value.len() > MAX_CLIENT_SEED_LEN {
        return Err(EngineError::invalid_parameters(format!(
            "client seed must be 1-{} characters",
            MAX_CLIENT_SEED_LEN
        )));
    }
    if !value.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
        return Err(EngineError::invalid_parameters(
            "client seed must be printable ASCII",
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingEntropy;

    impl EntropySource for FailingEntropy {
        fn fill(&self, _dest: &mut [u8]) -> Result<(), String> {
            Err("device unavailable".to_string())
        }
    }

    fn vault() -> SeedVault {
        SeedVault::new("default-client-seed", None)
    }

    #[test]
    fn test_commit_hides_seed_until_reveal() {
        let vault = vault();
        let seed = vault.commit_seed().unwrap();
        assert_eq!(seed.state, SeedState::Committed);
        assert!(seed.server_seed.is_none());
        assert_eq!(seed.server_seed_hash.len(), 64);
        assert!(vault.disclosed_seed(seed.seed_id).unwrap().is_none());
    }

    #[test]
    fn test_reveal_requires_retirement_and_is_idempotent() {
        let vault = vault();
        let seed = vault.commit_seed().unwrap();

        assert!(matches!(
            vault.reveal_seed(seed.seed_id),
            Err(EngineError::SeedStillActive { .. })
        ));

        vault.retire(seed.seed_id).unwrap();
        let first = vault.reveal_seed(seed.seed_id).unwrap();
        let second = vault.reveal_seed(seed.seed_id).unwrap();
        assert_eq!(first, second);
        assert!(first.matches_commitment(&seed.server_seed_hash));
        assert_eq!(vault.seed(seed.seed_id).unwrap().state, SeedState::Revealed);
    }

    #[test]
    fn test_rebind_after_use_is_rejected() {
        let vault = vault();
        let seed = vault.commit_seed().unwrap();
        vault.bind_client_seed(seed.seed_id, Some("player-one")).unwrap();
        vault.bind_client_seed(seed.seed_id, Some("player-two")).unwrap();

        let binding = vault.reserve_round(seed.seed_id, None).unwrap();
        assert_eq!(binding.client_seed, "player-two");

        let err = vault.bind_client_seed(seed.seed_id, Some("player-three"));
        assert!(matches!(err, Err(EngineError::SeedAlreadyInUse { .. })));
        assert_eq!(
            vault.seed(seed.seed_id).unwrap().client_seed.as_deref(),
            Some("player-two")
        );
    }

    #[test]
    fn test_default_client_seed_bound_when_absent() {
        let vault = vault();
        let seed = vault.commit_seed().unwrap();
        let binding = vault.reserve_round(seed.seed_id, None).unwrap();
        assert_eq!(binding.client_seed, "default-client-seed");

        let other = vault.commit_seed().unwrap();
        vault.bind_client_seed(other.seed_id, None).unwrap();
        assert_eq!(
            vault.seed(other.seed_id).unwrap().client_seed.as_deref(),
            Some("default-client-seed")
        );
    }

    #[test]
    fn test_round_limit_retires_seed() {
        let vault = SeedVault::new("d", Some(2));
        let seed = vault.commit_seed().unwrap();
        vault.reserve_round(seed.seed_id, None).unwrap();
        vault.reserve_round(seed.seed_id, None).unwrap();
        assert!(vault.seed(seed.seed_id).unwrap().retired);
        assert!(matches!(
            vault.reserve_round(seed.seed_id, None),
            Err(EngineError::SeedRetired { .. })
        ));
    }

    #[test]
    fn test_reserve_binds_requested_client_seed_until_used() {
        let vault = vault();
        let seed = vault.commit_seed().unwrap();
        vault.bind_client_seed(seed.seed_id, Some("alpha")).unwrap();

        let binding = vault.reserve_round(seed.seed_id, Some("beta")).unwrap();
        assert_eq!(binding.client_seed, "beta");
        assert_eq!(vault.reserve_round(seed.seed_id, Some("beta")).unwrap().client_seed, "beta");
        assert_eq!(vault.reserve_round(seed.seed_id, None).unwrap().client_seed, "beta");

        assert!(matches!(
            vault.reserve_round(seed.seed_id, Some("gamma")),
            Err(EngineError::SeedAlreadyInUse { .. })
        ));
        let view = vault.seed(seed.seed_id).unwrap();
        assert_eq!(view.client_seed.as_deref(), Some("beta"));
        assert_eq!(view.rounds_opened, 3);
    }

    #[test]
    fn test_release_round_undoes_reservation() {
        let vault = vault();
        let seed = vault.commit_seed().unwrap();
        vault.reserve_round(seed.seed_id, None).unwrap();
        vault.reserve_round(seed.seed_id, None).unwrap();
        vault.release_round(seed.seed_id).unwrap();
        assert_eq!(vault.seed(seed.seed_id).unwrap().rounds_opened, 1);
        assert!(vault.release_round(999).is_err());
    }

    #[test]
    fn test_entropy_failure_halts_vault() {
        let vault = SeedVault::with_entropy(Box::new(FailingEntropy), "d", None);
        assert!(matches!(vault.commit_seed(), Err(EngineError::EntropyFailure(_))));
        assert!(vault.is_halted());
        assert!(vault.ensure_accepting().is_err());
    }

    #[test]
    fn test_resume_skips_used_ids() {
        let vault = vault();
        vault.resume_after(41);
        assert_eq!(vault.commit_seed().unwrap().seed_id, 42);
        vault.resume_after(3);
        assert_eq!(vault.commit_seed().unwrap().seed_id, 43);
    }

    #[test]
    fn test_client_seed_validation() {
        assert!(validate_client_seed("abc").is_ok());
        assert!(validate_client_seed("").is_err());
        assert!(validate_client_seed(&"x".repeat(65)).is_err());
        assert!(validate_client_seed("tab\there").is_err());
    }

    #[test]
    fn test_server_seed_debug_is_redacted() {
        let seed = ServerSeed::from_bytes([7u8; 32]);
        assert!(!format!("{:?}", seed).contains("07"));
        assert_eq!(ServerSeed::from_hex(&seed.to_hex()).unwrap(), seed);
        assert!(ServerSeed::from_hex("abcd").is_err());
    }
}
