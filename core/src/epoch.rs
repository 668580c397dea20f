// Epoch clock: maps block timestamps to epochs and waits for boundaries

use crate::ledger::{Block, Ledger, LedgerError};
use std::sync::Arc;

/// Default epoch length in seconds.
pub const EPOCH_LENGTH: u64 = 60;

pub fn epoch_of(timestamp: u64, epoch_length: u64) -> u64 {
    timestamp / epoch_length.max(1)
}

/// Seconds left before the epoch containing `timestamp` ends.
pub fn seconds_until_next_epoch(timestamp: u64, epoch_length: u64) -> u64 {
    let epoch_length = epoch_length.max(1);
    (epoch_of(timestamp, epoch_length) + 1) * epoch_length - timestamp
}

#[derive(Clone)]
pub struct EpochClock {
    ledger: Arc<dyn Ledger>,
    epoch_length: u64,
}

impl EpochClock {
    pub fn new(ledger: Arc<dyn Ledger>, epoch_length: u64) -> Self {
        Self {
            ledger,
            epoch_length: epoch_length.max(1),
        }
    }

    pub fn epoch_length(&self) -> u64 {
        self.epoch_length
    }

    pub fn epoch_of(&self, timestamp: u64) -> u64 {
        epoch_of(timestamp, self.epoch_length)
    }

    pub fn seconds_until_next_epoch(&self, timestamp: u64) -> u64 {
        seconds_until_next_epoch(timestamp, self.epoch_length)
    }

    /// Resolve with the first block whose epoch is past `current`'s.
    ///
    /// The block subscription is released as soon as this returns or the
    /// future is dropped.
    pub async fn wait_for_next_epoch(&self, current: &Block) -> Result<Block, LedgerError> {
        let epoch = self.epoch_of(current.timestamp);
        let mut blocks = self.ledger.subscribe_blocks();

        while let Some(block) = blocks.recv().await {
            if self.epoch_of(block.timestamp) > epoch {
                tracing::debug!(
                    "Epoch {} began at block {}",
                    self.epoch_of(block.timestamp),
                    block.number
                );
                return Ok(block);
            }
        }

        Err(LedgerError::SubscriptionClosed)
    }
}
