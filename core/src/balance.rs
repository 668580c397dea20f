// Balance tracking: available and pending funds across epoch rollovers

use crate::crypto::{homomorphic_difference, CipherError, Ciphertext};
use crate::epoch::EpochClock;
use crate::identity::{PublicKey, SecretKey};
use crate::ledger::{Block, Ledger, LedgerError};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Plaintext view of an account. Amounts are in milli-ETH.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BalanceState {
    /// Spendable this epoch.
    pub available: u64,
    /// Credited but only spendable from the next epoch.
    pub pending: u64,
}

impl BalanceState {
    /// Add the decrypted contents of `snapshot`.
    ///
    /// Additive so that credits observed by a concurrent update survive.
    pub fn initialize(
        &mut self,
        snapshot: &AccountSnapshot,
        secret: &SecretKey,
        bound: u64,
    ) -> Result<(), CipherError> {
        let (available, pending) = snapshot.decrypt(secret, bound)?;
        self.credit(available, pending);
        Ok(())
    }

    /// Add already decrypted amounts.
    pub fn credit(&mut self, available: u64, pending: u64) {
        self.available = self.available.saturating_add(available);
        self.pending = self.pending.saturating_add(pending);
    }

    /// Fold pending funds into available at an epoch boundary.
    pub fn roll_over(&mut self) {
        self.available = self.available.saturating_add(self.pending);
        self.pending = 0;
    }

    pub fn total(&self) -> u64 {
        self.available.saturating_add(self.pending)
    }
}

/// The account's ciphertext now and at the start of the next epoch, read
/// against a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub block: Block,
    pub epoch: u64,
    pub present: Ciphertext,
    pub future: Ciphertext,
}

impl AccountSnapshot {
    /// Read epochs `e` and `e + 1` pinned to `block`.
    pub async fn read(
        ledger: &dyn Ledger,
        key: &PublicKey,
        block: Block,
        epoch_length: u64,
    ) -> Result<Self, LedgerError> {
        let epoch = crate::epoch::epoch_of(block.timestamp, epoch_length);
        let present = read_one(ledger, key, epoch, block.number).await?;
        let future = read_one(ledger, key, epoch + 1, block.number).await?;

        Ok(Self {
            block,
            epoch,
            present,
            future,
        })
    }

    /// Read the current epoch only and treat it as fully available.
    pub async fn read_settled(
        ledger: &dyn Ledger,
        key: &PublicKey,
        block: Block,
        epoch_length: u64,
    ) -> Result<Self, LedgerError> {
        let epoch = crate::epoch::epoch_of(block.timestamp, epoch_length);
        let current = read_one(ledger, key, epoch, block.number).await?;

        Ok(Self {
            block,
            epoch,
            present: current,
            future: current,
        })
    }

    /// `(available, pending)` in plaintext.
    pub fn decrypt(&self, secret: &SecretKey, bound: u64) -> Result<(u64, u64), CipherError> {
        let available = secret.decrypt(&self.present, bound)?;
        let pending = secret.decrypt(&homomorphic_difference(&self.future, &self.present), bound)?;
        Ok((available, pending))
    }

    /// [`decrypt`](Self::decrypt) on the blocking pool. The search is CPU
    /// bound and may run for up to `bound` group additions.
    pub async fn decrypt_off_runtime(
        &self,
        secret: &SecretKey,
        bound: u64,
    ) -> Result<(u64, u64), CipherError> {
        let snapshot = *self;
        let secret = secret.clone();
        tokio::task::spawn_blocking(move || snapshot.decrypt(&secret, bound))
            .await
            .map_err(|e| CipherError::SearchAborted(e.to_string()))?
    }
}

async fn read_one(
    ledger: &dyn Ledger,
    key: &PublicKey,
    epoch: u64,
    at_block: u64,
) -> Result<Ciphertext, LedgerError> {
    let states = ledger
        .simulate_accounts(std::slice::from_ref(key), epoch, at_block)
        .await?;
    let state = states
        .first()
        .ok_or(LedgerError::AccountCountMismatch {
            expected: 1,
            found: 0,
        })?;
    if state.epoch != epoch {
        return Err(LedgerError::EpochMismatch {
            expected: epoch,
            found: state.epoch,
        });
    }
    Ok(state.ciphertext)
}

// ============================================================================
// TRACKER
// ============================================================================

#[derive(Default)]
struct Tracked {
    balance: BalanceState,
    epoch: Option<u64>,
}

/// Shared balance that rolls over at most once per epoch.
#[derive(Clone, Default)]
pub struct BalanceTracker {
    inner: Arc<RwLock<Tracked>>,
}

impl BalanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decrypt `snapshot` and add it to the tracked balance.
    pub async fn synchronize(
        &self,
        snapshot: &AccountSnapshot,
        secret: &SecretKey,
        bound: u64,
    ) -> Result<BalanceState, CipherError> {
        // Decrypt outside the lock and off the runtime.
        let (available, pending) = snapshot.decrypt_off_runtime(secret, bound).await?;

        let mut tracked = self.inner.write();
        tracked.balance.credit(available, pending);
        tracked.epoch = Some(tracked.epoch.map_or(snapshot.epoch, |e| e.max(snapshot.epoch)));
        Ok(tracked.balance)
    }

    /// Roll over if `epoch` is later than the last one seen. Returns whether
    /// a rollover happened.
    pub fn advance_to(&self, epoch: u64) -> bool {
        let mut tracked = self.inner.write();
        match tracked.epoch {
            Some(seen) if seen >= epoch => false,
            _ => {
                tracked.balance.roll_over();
                tracked.epoch = Some(epoch);
                tracing::debug!("Rolled balance over into epoch {}", epoch);
                true
            }
        }
    }

    pub fn current(&self) -> BalanceState {
        self.inner.read().balance
    }

    pub fn epoch(&self) -> Option<u64> {
        self.inner.read().epoch
    }

    /// Roll over when the epoch after `block`'s begins.
    pub fn spawn_rollover(&self, clock: EpochClock, block: Block) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            match clock.wait_for_next_epoch(&block).await {
                Ok(next) => {
                    tracker.advance_to(clock.epoch_of(next.timestamp));
                }
                Err(e) => tracing::warn!("Balance rollover abandoned: {}", e),
            }
        })
    }
}
