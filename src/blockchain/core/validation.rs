use super::block::Block;
use thiserror::Error;

/// First integrity failure found while scanning a chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityViolation {
    #[error("Block at position {position} has hash {recorded} but its content hashes to {computed}")]
    HashMismatch {
        position: usize,
        recorded: String,
        computed: String,
    },
    #[error("Block at position {position} links to {found} but its predecessor hash is {expected}")]
    BrokenLink {
        position: usize,
        expected: String,
        found: String,
    },
    #[error("Block at position {position} cannot be rehashed: {reason}")]
    Unhashable { position: usize, reason: String },
}

impl IntegrityViolation {
    pub fn position(&self) -> usize {
        match self {
            IntegrityViolation::HashMismatch { position, .. }
            | IntegrityViolation::BrokenLink { position, .. }
            | IntegrityViolation::Unhashable { position, .. } => *position,
        }
    }
}

/// Walk every non-genesis block, recomputing its hash and checking its link.
pub fn validate_blocks(blocks: &[Block]) -> Result<(), IntegrityViolation> {
    for (position, pair) in blocks.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        let position = position + 1;

        let computed = current
            .calculate_hash()
            .map_err(|e| IntegrityViolation::Unhashable {
                position,
                reason: e.to_string(),
            })?;
        if computed != current.hash() {
            return Err(IntegrityViolation::HashMismatch {
                position,
                recorded: current.hash().to_string(),
                computed,
            });
        }

        if current.previous_hash() != previous.hash() {
            return Err(IntegrityViolation::BrokenLink {
                position,
                expected: previous.hash().to_string(),
                found: current.previous_hash().to_string(),
            });
        }
    }
    Ok(())
}

/// Positions of non-genesis blocks whose hash lacks the required zero prefix.
pub fn underworked_positions(blocks: &[Block], difficulty: u32) -> Vec<usize> {
    blocks
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, block)| !block.meets_difficulty(difficulty))
        .map(|(position, _)| position)
        .collect()
}
