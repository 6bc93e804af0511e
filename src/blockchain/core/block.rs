use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write;

pub type Sha256Hash = [u8; 32];

/// `previous_hash` carried by the genesis block and by freshly built candidates.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// A SHA-256 digest has 64 hex characters, so no larger prefix can ever match.
pub const MAX_DIFFICULTY: u32 = 64;

/// Serialize a payload into the canonical JSON form fed to the hasher.
///
/// Payloads are normalized through `serde_json::Value`, whose objects keep
/// their keys sorted, so two equal payloads always serialize identically.
pub fn canonical_json(data: &Value) -> Result<String> {
    serde_json::to_string(data).map_err(|e| {
        ChainError::SerializationError(format!("Failed to serialize block data: {}", e))
    })
}

fn to_canonical_value<T: Serialize + ?Sized>(data: &T) -> Result<Value> {
    serde_json::to_value(data).map_err(|e| {
        ChainError::SerializationError(format!("Block data is not serializable: {}", e))
    })
}

/// Compute a block digest as lowercase hex.
///
/// The preimage is the textual concatenation of the index, the previous hash,
/// the timestamp, the canonical payload and, for proof-of-work blocks, the nonce.
pub fn calculate_hash(
    index: u64,
    previous_hash: &str,
    timestamp: &str,
    data_json: &str,
    nonce: Option<u64>,
) -> String {
    let mut hasher = HashPreimage::new(index, previous_hash, timestamp, data_json).hasher;
    if let Some(nonce) = nonce {
        hasher.update(nonce.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Check that the first `difficulty` hex characters of a raw digest are zero.
pub fn meets_difficulty(hash: &Sha256Hash, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    if difficulty > 2 * hash.len() {
        return false;
    }
    let full_bytes = difficulty / 2;
    if hash[..full_bytes].iter().any(|b| *b != 0) {
        return false;
    }
    difficulty % 2 == 0 || hash[full_bytes] >> 4 == 0
}

/// Same check as [`meets_difficulty`], on a hex-encoded hash.
pub fn hex_meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

pub fn check_difficulty(difficulty: u32) -> Result<()> {
    if difficulty > MAX_DIFFICULTY {
        return Err(ChainError::InvalidDifficulty {
            difficulty,
            max: MAX_DIFFICULTY,
        });
    }
    Ok(())
}

/// Hasher state with every field except the nonce already absorbed.
///
/// Mining clones this state once per attempt instead of rehashing the prefix.
#[derive(Clone)]
pub(crate) struct HashPreimage {
    hasher: Sha256,
}

impl HashPreimage {
    pub(crate) fn new(index: u64, previous_hash: &str, timestamp: &str, data_json: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(index.to_string().as_bytes());
        hasher.update(previous_hash.as_bytes());
        hasher.update(timestamp.as_bytes());
        hasher.update(data_json.as_bytes());
        Self { hasher }
    }

    /// Digest for one nonce. `buf` is scratch space reused across calls.
    pub(crate) fn digest_with_nonce(&self, nonce: u64, buf: &mut String) -> Sha256Hash {
        buf.clear();
        // Writing into a String cannot fail.
        let _ = write!(buf, "{}", nonce);
        let mut hasher = self.hasher.clone();
        hasher.update(buf.as_bytes());
        hasher.finalize().into()
    }
}

/// A candidate block that has not been admitted to a chain yet.
///
/// Its hash is provisional: appending overwrites `previous_hash` and reseals.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsealedBlock {
    index: u64,
    timestamp: String,
    data: Value,
    data_json: String,
    previous_hash: String,
    hash: String,
}

impl UnsealedBlock {
    pub fn new<T: Serialize + ?Sized>(
        index: u64,
        timestamp: impl Into<String>,
        data: &T,
    ) -> Result<Self> {
        Self::with_previous_hash(index, timestamp, data, GENESIS_PREVIOUS_HASH)
    }

    pub fn with_previous_hash<T: Serialize + ?Sized>(
        index: u64,
        timestamp: impl Into<String>,
        data: &T,
        previous_hash: impl Into<String>,
    ) -> Result<Self> {
        let data = to_canonical_value(data)?;
        let data_json = canonical_json(&data)?;
        let mut block = UnsealedBlock {
            index,
            timestamp: timestamp.into(),
            data,
            data_json,
            previous_hash: previous_hash.into(),
            hash: String::new(),
        };
        block.hash = block.hash_with_nonce(Some(0));
        Ok(block)
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    /// Hash computed at construction with nonce 0.
    pub fn provisional_hash(&self) -> &str {
        &self.hash
    }

    /// Seal without proof of work; the digest carries no nonce.
    pub fn seal(self) -> Result<Block> {
        let hash = self.hash_with_nonce(None);
        Ok(self.into_sealed(hash, None))
    }

    /// Seal by searching nonces until the hash has `difficulty` leading zeros.
    ///
    /// Unbounded: only an out-of-range difficulty makes this fail.
    pub fn mine(self, difficulty: u32) -> Result<Block> {
        crate::miner::Miner::new().mine(self, difficulty)
    }

    pub(crate) fn link_to(&mut self, previous_hash: &str) {
        previous_hash.clone_into(&mut self.previous_hash);
        self.hash = self.hash_with_nonce(Some(0));
    }

    pub(crate) fn preimage(&self) -> HashPreimage {
        HashPreimage::new(self.index, &self.previous_hash, &self.timestamp, &self.data_json)
    }

    pub(crate) fn into_sealed(self, hash: String, nonce: Option<u64>) -> Block {
        Block {
            index: self.index,
            timestamp: self.timestamp,
            data: self.data,
            previous_hash: self.previous_hash,
            hash,
            nonce,
        }
    }

    fn hash_with_nonce(&self, nonce: Option<u64>) -> String {
        calculate_hash(self.index, &self.previous_hash, &self.timestamp, &self.data_json, nonce)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Recorded hash matches the current content.
    Sealed,
    /// Content changed after sealing without a matching rehash.
    Tampered,
}

/// A block whose hash has been finalized.
///
/// Fields are read-only; the `overwrite_*` and [`Block::rehash`] methods are the
/// only way to change a sealed block, and exist to model tampering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    timestamp: String,
    data: Value,
    previous_hash: String,
    hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nonce: Option<u64>,
}

impl Block {
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// `None` for blocks sealed without proof of work.
    pub fn nonce(&self) -> Option<u64> {
        self.nonce
    }

    /// Recompute the digest from the block's current fields.
    pub fn calculate_hash(&self) -> Result<String> {
        let data_json = canonical_json(&self.data)?;
        Ok(calculate_hash(
            self.index,
            &self.previous_hash,
            &self.timestamp,
            &data_json,
            self.nonce,
        ))
    }

    pub fn state(&self) -> BlockState {
        match self.calculate_hash() {
            Ok(hash) if hash == self.hash => BlockState::Sealed,
            _ => BlockState::Tampered,
        }
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        hex_meets_difficulty(&self.hash, difficulty)
    }

    /// Replace the payload, keeping the recorded hash.
    pub fn overwrite_data<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<()> {
        self.data = to_canonical_value(data)?;
        Ok(())
    }

    /// Replace the timestamp, keeping the recorded hash.
    pub fn overwrite_timestamp(&mut self, timestamp: impl Into<String>) {
        self.timestamp = timestamp.into();
    }

    /// Replace the predecessor link, keeping the recorded hash.
    pub fn overwrite_previous_hash(&mut self, previous_hash: impl Into<String>) {
        self.previous_hash = previous_hash.into();
    }

    /// Recompute the recorded hash from current content with the current nonce.
    ///
    /// No mining happens, so a proof-of-work block usually loses its zero prefix.
    pub fn rehash(&mut self) -> Result<()> {
        self.hash = self.calculate_hash()?;
        Ok(())
    }
}
