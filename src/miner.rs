//! Proof-of-work mining

use crate::blockchain::{check_difficulty, meets_difficulty, Block, UnsealedBlock};
use crate::config::MinerConfig;
use crate::error::{ChainError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

/// How many attempts pass between two looks at the cancel flag.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Shared flag that stops a running search from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Nonce search with optional limits. The default miner has none and runs
/// until a qualifying hash turns up.
#[derive(Debug, Clone)]
pub struct Miner {
    max_iterations: Option<u64>,
    progress_interval: u64,
    cancel: Option<CancelToken>,
}

impl Default for Miner {
    fn default() -> Self {
        Self {
            max_iterations: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            cancel: None,
        }
    }
}

impl Miner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &MinerConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            progress_interval: config.progress_interval,
            cancel: None,
        }
    }

    /// Give up with [`ChainError::ExceededIterationBudget`] after `budget` failed attempts.
    pub fn with_max_iterations(mut self, budget: u64) -> Self {
        self.max_iterations = Some(budget);
        self
    }

    /// Emit a progress event every `interval` attempts; 0 disables it.
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn max_iterations(&self) -> Option<u64> {
        self.max_iterations
    }

    /// Search nonces upward from 0 and seal the block with the first one whose
    /// hash starts with `difficulty` zero hex characters.
    pub fn mine(&self, block: UnsealedBlock, difficulty: u32) -> Result<Block> {
        check_difficulty(difficulty)?;

        let preimage = block.preimage();
        let mut buf = String::with_capacity(20);
        let started = Instant::now();
        let mut nonce: u64 = 0;

        loop {
            let digest = preimage.digest_with_nonce(nonce, &mut buf);
            if meets_difficulty(&digest, difficulty) {
                let hash = hex::encode(digest);
                info!(
                    index = block.index(),
                    nonce,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Mined block: {}",
                    hash
                );
                return Ok(block.into_sealed(hash, Some(nonce)));
            }

            let attempts = nonce + 1;
            if let Some(budget) = self.max_iterations {
                if attempts >= budget {
                    return Err(ChainError::ExceededIterationBudget { budget });
                }
            }
            if attempts.is_multiple_of(CANCEL_CHECK_INTERVAL) {
                if let Some(token) = &self.cancel {
                    if token.is_cancelled() {
                        return Err(ChainError::MiningCancelled { attempts });
                    }
                }
            }
            if self.progress_interval > 0 && attempts.is_multiple_of(self.progress_interval) {
                let elapsed = started.elapsed().as_secs_f64();
                let hash_rate = if elapsed > 0.0 { attempts as f64 / elapsed } else { 0.0 };
                debug!(
                    index = block.index(),
                    difficulty,
                    nonce,
                    "Mining... {:.2} H/s",
                    hash_rate
                );
            }

            nonce = nonce.checked_add(1).ok_or_else(|| {
                ChainError::InvariantViolation("Nonce space exhausted while mining".to_string())
            })?;
        }
    }
}

/// Mine with the unbounded default miner.
pub fn mine_block(block: UnsealedBlock, difficulty: u32) -> Result<Block> {
    Miner::new().mine(block, difficulty)
}
