use super::block::{check_difficulty, Block, UnsealedBlock, GENESIS_PREVIOUS_HASH};
use super::validation::{underworked_positions, validate_blocks, IntegrityViolation};
use crate::config::Config;
use crate::error::{ChainError, Result};
use crate::miner::Miner;
use serde::{Deserialize, Serialize};
use tracing::{info, trace, warn};

pub const DEFAULT_DIFFICULTY: u32 = 2;
pub const GENESIS_TIMESTAMP: &str = "01/01/2018";
pub const GENESIS_DATA: &str = "Genesis block";

/// How a chain seals appended blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Sealing {
    /// Hash once, no nonce in the digest.
    Direct,
    /// Mine until the hash has `difficulty` leading zero hex characters.
    ProofOfWork { difficulty: u32 },
}

impl Sealing {
    pub fn difficulty(&self) -> Option<u32> {
        match self {
            Sealing::Direct => None,
            Sealing::ProofOfWork { difficulty } => Some(*difficulty),
        }
    }

    fn check(&self) -> Result<()> {
        match self {
            Sealing::Direct => Ok(()),
            Sealing::ProofOfWork { difficulty } => check_difficulty(*difficulty),
        }
    }
}

/// Ordered, append-only sequence of blocks starting at a fixed genesis block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blockchain {
    sealing: Sealing,
    blocks: Vec<Block>,
    #[serde(skip)]
    miner: Miner,
}

impl Blockchain {
    /// Create a proof-of-work chain.
    pub fn new(difficulty: u32) -> Result<Self> {
        Self::with_sealing(Sealing::ProofOfWork { difficulty })
    }

    pub fn without_proof_of_work() -> Result<Self> {
        Self::with_sealing(Sealing::Direct)
    }

    pub fn with_sealing(sealing: Sealing) -> Result<Self> {
        sealing.check()?;
        let genesis_block = Self::create_genesis_block(sealing)?;
        Ok(Blockchain {
            sealing,
            blocks: vec![genesis_block],
            miner: Miner::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::with_sealing(config.chain.sealing())?.with_miner(Miner::from_config(&config.miner)))
    }

    /// Replace the miner used by [`Blockchain::append`] in proof-of-work mode.
    pub fn with_miner(mut self, miner: Miner) -> Self {
        self.miner = miner;
        self
    }

    fn create_genesis_block(sealing: Sealing) -> Result<Block> {
        let genesis = UnsealedBlock::with_previous_hash(
            0,
            GENESIS_TIMESTAMP,
            GENESIS_DATA,
            GENESIS_PREVIOUS_HASH,
        )?;
        match sealing {
            Sealing::Direct => genesis.seal(),
            // The genesis block is fixed content and is never mined.
            Sealing::ProofOfWork { .. } => {
                let hash = genesis.provisional_hash().to_string();
                Ok(genesis.into_sealed(hash, Some(0)))
            }
        }
    }

    pub fn sealing(&self) -> Sealing {
        self.sealing
    }

    /// `None` for chains without proof of work.
    pub fn difficulty(&self) -> Option<u32> {
        self.sealing.difficulty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, position: usize) -> Option<&Block> {
        self.blocks.get(position)
    }

    /// Mutable access to a sealed block, used to model tampering.
    pub fn block_mut(&mut self, position: usize) -> Option<&mut Block> {
        self.blocks.get_mut(position)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false for a chain built through this API; genesis is never removed.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn latest_block(&self) -> Result<&Block> {
        self.blocks.last().ok_or_else(|| {
            ChainError::InvariantViolation("Chain has no blocks; genesis is missing.".to_string())
        })
    }

    /// Link the candidate to the current tail, seal it, and push it.
    ///
    /// Whatever `previous_hash` the candidate carried is overwritten. If mining
    /// fails (budget or cancellation) the chain is left unchanged.
    pub fn append(&mut self, mut candidate: UnsealedBlock) -> Result<&Block> {
        let tail_hash = self.latest_block()?.hash().to_string();
        candidate.link_to(&tail_hash);
        trace!(index = candidate.index(), previous_hash = %tail_hash, "Sealing block");

        let block = match self.sealing {
            Sealing::Direct => candidate.seal()?,
            Sealing::ProofOfWork { difficulty } => self.miner.mine(candidate, difficulty)?,
        };

        info!(
            position = self.blocks.len(),
            index = block.index(),
            hash = %block.hash(),
            "Appended block"
        );
        self.blocks.push(block);
        self.latest_block()
    }

    /// True when every block's hash matches its content and links to its predecessor.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Like [`Blockchain::is_valid`], but reports the first failure found.
    pub fn validate(&self) -> std::result::Result<(), IntegrityViolation> {
        validate_blocks(&self.blocks).inspect_err(|violation| {
            warn!(position = violation.position(), "Chain integrity check failed: {}", violation);
        })
    }

    /// Positions of non-genesis blocks whose hash does not meet the chain's difficulty.
    ///
    /// Not part of [`Blockchain::is_valid`]: a rehashed block still links correctly
    /// as long as nothing follows it, and only this check notices the missing work.
    pub fn underworked_blocks(&self) -> Vec<usize> {
        match self.sealing {
            Sealing::Direct => Vec::new(),
            Sealing::ProofOfWork { difficulty } => underworked_positions(&self.blocks, difficulty),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Import an exported chain. Recorded hashes are kept verbatim; integrity is
    /// left to [`Blockchain::validate`].
    pub fn from_json(json: &str) -> Result<Self> {
        let chain: Blockchain = serde_json::from_str(json)?;
        chain.sealing.check()?;
        if chain.blocks.is_empty() {
            return Err(ChainError::InvariantViolation(
                "Imported chain has no blocks; genesis is missing.".to_string(),
            ));
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{calculate_hash, BlockState, MAX_DIFFICULTY};
    use crate::miner::CancelToken;
    use serde_json::json;

    fn candidate(index: u64, amount: u64) -> UnsealedBlock {
        UnsealedBlock::new(index, format!("{:02}/01/2018", 22 + index), &json!({ "amount": amount }))
            .unwrap()
    }

    #[test]
    fn test_new_chain_holds_only_genesis() {
        let chain = Blockchain::new(DEFAULT_DIFFICULTY).unwrap();
        assert_eq!(chain.len(), 1);
        assert!(!chain.is_empty());
        assert_eq!(chain.difficulty(), Some(2));

        let genesis = chain.latest_block().unwrap();
        assert_eq!(genesis.index(), 0);
        assert_eq!(genesis.timestamp(), GENESIS_TIMESTAMP);
        assert_eq!(genesis.data(), &json!(GENESIS_DATA));
        assert_eq!(genesis.previous_hash(), "0");
        assert_eq!(genesis.nonce(), Some(0));
        assert_eq!(genesis.state(), BlockState::Sealed);
        assert!(chain.is_valid());
    }

    #[test]
    fn test_genesis_is_caller_independent() {
        let a = Blockchain::new(1).unwrap();
        let b = Blockchain::new(3).unwrap();
        assert_eq!(a.blocks()[0], b.blocks()[0]);
        assert_eq!(
            a.blocks()[0].hash(),
            calculate_hash(0, "0", GENESIS_TIMESTAMP, "\"Genesis block\"", Some(0))
        );
    }

    #[test]
    fn test_direct_chain_genesis_has_no_nonce() {
        let chain = Blockchain::without_proof_of_work().unwrap();
        assert_eq!(chain.difficulty(), None);
        assert_eq!(chain.blocks()[0].nonce(), None);
        assert!(chain.is_valid());
    }

    #[test]
    fn test_rejects_difficulty_above_cap() {
        let result = Blockchain::new(MAX_DIFFICULTY + 1);
        assert!(matches!(result, Err(ChainError::InvalidDifficulty { .. })));
    }

    #[test]
    fn test_append_links_and_mines() {
        let mut chain = Blockchain::new(2).unwrap();
        for i in 1..=3 {
            chain.append(candidate(i, i * 2)).unwrap();
        }

        assert_eq!(chain.len(), 4);
        for i in 1..chain.len() {
            let (previous, current) = (&chain.blocks()[i - 1], &chain.blocks()[i]);
            assert_eq!(current.previous_hash(), previous.hash());
            assert!(current.hash().starts_with("00"));
            assert!(current.nonce().is_some());
        }
        assert!(chain.is_valid());
        assert!(chain.underworked_blocks().is_empty());
    }

    #[test]
    fn test_append_overwrites_caller_previous_hash() {
        let mut chain = Blockchain::new(1).unwrap();
        let bogus = UnsealedBlock::with_previous_hash(1, "t", &json!({"amount": 1}), "not-a-hash")
            .unwrap();

        let tail = chain.latest_block().unwrap().hash().to_string();
        let appended = chain.append(bogus).unwrap();
        assert_eq!(appended.previous_hash(), tail);
        assert!(chain.is_valid());
    }

    #[test]
    fn test_append_without_proof_of_work() {
        let mut chain = Blockchain::without_proof_of_work().unwrap();
        chain.append(candidate(1, 4)).unwrap();
        chain.append(candidate(2, 6)).unwrap();

        let tail = chain.latest_block().unwrap();
        assert_eq!(tail.nonce(), None);
        assert_eq!(tail.previous_hash(), chain.blocks()[1].hash());
        assert!(chain.is_valid());
        assert!(chain.underworked_blocks().is_empty());
    }

    #[test]
    fn test_failed_mining_leaves_chain_unchanged() {
        let token = CancelToken::new();
        token.cancel();
        let mut chain = Blockchain::new(8)
            .unwrap()
            .with_miner(Miner::new().with_cancel_token(token));

        let result = chain.append(candidate(1, 4));
        assert!(matches!(result, Err(ChainError::MiningCancelled { .. })));
        assert_eq!(chain.len(), 1);
        assert!(chain.is_valid());
    }

    #[test]
    fn test_payload_tamper_detected() {
        let mut chain = Blockchain::new(1).unwrap();
        chain.append(candidate(1, 4)).unwrap();
        chain.append(candidate(2, 6)).unwrap();

        chain.block_mut(2).unwrap().overwrite_data(&json!({"amount": 600})).unwrap();
        assert!(!chain.is_valid());
        assert!(matches!(
            chain.validate(),
            Err(IntegrityViolation::HashMismatch { position: 2, .. })
        ));
    }

    #[test]
    fn test_rehashed_tail_passes_validation_but_lacks_work() {
        let mut chain = Blockchain::new(2).unwrap();
        chain.append(candidate(1, 4)).unwrap();
        chain.append(candidate(2, 6)).unwrap();

        let tail = chain.block_mut(2).unwrap();
        tail.overwrite_data(&json!({"amount": 600})).unwrap();
        tail.rehash().unwrap();

        assert!(chain.is_valid());
        let underworked = chain.underworked_blocks();
        if !chain.blocks()[2].hash().starts_with("00") {
            assert_eq!(underworked, vec![2]);
        } else {
            assert!(underworked.is_empty());
        }
    }

    #[test]
    fn test_json_export_keeps_every_field() {
        let mut chain = Blockchain::new(1).unwrap();
        chain.append(candidate(1, 4)).unwrap();

        let value: serde_json::Value = serde_json::from_str(&chain.to_json().unwrap()).unwrap();
        assert_eq!(value["sealing"]["mode"], "proof_of_work");
        assert_eq!(value["sealing"]["difficulty"], 1);

        let exported = &value["blocks"][1];
        let block = &chain.blocks()[1];
        assert_eq!(exported["index"], 1);
        assert_eq!(exported["timestamp"], block.timestamp());
        assert_eq!(exported["data"], json!({"amount": 4}));
        assert_eq!(exported["previous_hash"], block.previous_hash());
        assert_eq!(exported["hash"], block.hash());
        assert_eq!(exported["nonce"], block.nonce().unwrap());
    }

    #[test]
    fn test_direct_export_omits_nonce() {
        let mut chain = Blockchain::without_proof_of_work().unwrap();
        chain.append(candidate(1, 4)).unwrap();

        let value: serde_json::Value = serde_json::from_str(&chain.to_json().unwrap()).unwrap();
        assert_eq!(value["sealing"]["mode"], "direct");
        assert!(value["blocks"][1].get("nonce").is_none());
    }

    #[test]
    fn test_import_rejects_empty_chain() {
        let json = r#"{"sealing":{"mode":"direct"},"blocks":[]}"#;
        let result = Blockchain::from_json(json);
        assert!(matches!(result, Err(ChainError::InvariantViolation(_))));
    }

    #[test]
    fn test_import_rejects_over_cap_difficulty() {
        let json = r#"{"sealing":{"mode":"proof_of_work","difficulty":65},"blocks":[]}"#;
        let result = Blockchain::from_json(json);
        assert!(matches!(result, Err(ChainError::InvalidDifficulty { .. })));
    }

    #[test]
    fn test_import_rejects_malformed_json() {
        let result = Blockchain::from_json("{not json");
        assert!(matches!(result, Err(ChainError::SerializationError(_))));
    }
}
