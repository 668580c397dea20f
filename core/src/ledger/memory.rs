// In-memory ledger for tests and offline hosts

use super::{
    AccountState, Block, Ledger, LedgerError, Receipt, ReceiptStatus, Subscription, TxHash,
    WithdrawalEvent,
};
use crate::crypto::Ciphertext;
use crate::identity::PublicKey;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

#[derive(Default)]
struct LedgerState {
    head: Block,
    accounts: HashMap<PublicKey, BTreeMap<u64, Ciphertext>>,
    anonset: Vec<PublicKey>,
    stale_epochs: u64,
    block_subscribers: HashMap<u64, mpsc::UnboundedSender<Block>>,
    withdrawal_subscribers: HashMap<u64, mpsc::UnboundedSender<WithdrawalEvent>>,
    receipts: HashMap<TxHash, ReceiptStatus>,
    receipt_waiters: HashMap<TxHash, Vec<oneshot::Sender<Receipt>>>,
    next_subscriber: u64,
}

/// Scriptable ledger: tests push blocks, set account ciphertexts and mine
/// transactions by hand.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new(genesis_timestamp: u64) -> Self {
        let ledger = Self::default();
        ledger.state.lock().head = Block {
            number: 0,
            timestamp: genesis_timestamp,
        };
        ledger
    }

    /// Append a block and notify block subscribers.
    pub fn push_block(&self, timestamp: u64) -> Block {
        let mut state = self.state.lock();
        let block = Block {
            number: state.head.number + 1,
            timestamp,
        };
        state.head = block;
        state
            .block_subscribers
            .retain(|_, subscriber| subscriber.send(block).is_ok());
        block
    }

    /// Record `ciphertext` as the account state from `epoch` onward.
    pub fn set_account(&self, key: &PublicKey, epoch: u64, ciphertext: Ciphertext) {
        self.state
            .lock()
            .accounts
            .entry(*key)
            .or_default()
            .insert(epoch, ciphertext);
    }

    /// Keys returned by the next `sample_anonset` calls.
    pub fn set_anonset(&self, keys: Vec<PublicKey>) {
        self.state.lock().anonset = keys;
    }

    /// Make simulations report an epoch `lag` behind the one requested.
    pub fn set_stale_epochs(&self, lag: u64) {
        self.state.lock().stale_epochs = lag;
    }

    pub fn emit_withdrawal(&self, event: WithdrawalEvent) {
        self.state
            .lock()
            .withdrawal_subscribers
            .retain(|_, subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// Mine `hash` with the given status, resolving anyone waiting on it.
    pub fn mine(&self, hash: TxHash, status: ReceiptStatus) {
        let waiters = {
            let mut state = self.state.lock();
            state.receipts.insert(hash, status);
            state.receipt_waiters.remove(&hash).unwrap_or_default()
        };
        for waiter in waiters {
            let _ = waiter.send(Receipt {
                transaction_hash: hash,
                status,
            });
        }
    }

    pub fn block_subscriber_count(&self) -> usize {
        self.state.lock().block_subscribers.len()
    }

    pub fn withdrawal_subscriber_count(&self) -> usize {
        self.state.lock().withdrawal_subscribers.len()
    }

    fn account_at(state: &LedgerState, key: &PublicKey, epoch: u64) -> Ciphertext {
        state
            .accounts
            .get(key)
            .and_then(|history| history.range(..=epoch).next_back())
            .map(|(_, ciphertext)| *ciphertext)
            .unwrap_or_else(Ciphertext::zero)
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn latest_block(&self) -> Result<Block, LedgerError> {
        Ok(self.state.lock().head)
    }

    async fn simulate_accounts(
        &self,
        keys: &[PublicKey],
        epoch: u64,
        _at_block: u64,
    ) -> Result<Vec<AccountState>, LedgerError> {
        let state = self.state.lock();
        let reported = epoch.saturating_sub(state.stale_epochs);
        Ok(keys
            .iter()
            .map(|key| AccountState {
                epoch: reported,
                ciphertext: Self::account_at(&state, key, reported),
            })
            .collect())
    }

    async fn sample_anonset(
        &self,
        _seed: [u8; 32],
        _amount: u64,
    ) -> Result<Vec<PublicKey>, LedgerError> {
        Ok(self.state.lock().anonset.clone())
    }

    fn subscribe_blocks(&self) -> Subscription<Block> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.state.lock();
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            state.block_subscribers.insert(id, tx);
            id
        };
        let state = self.state.clone();
        Subscription::new(rx, move || {
            state.lock().block_subscribers.remove(&id);
        })
    }

    fn watch_withdrawals(&self) -> Subscription<WithdrawalEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.state.lock();
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            state.withdrawal_subscribers.insert(id, tx);
            id
        };
        let state = self.state.clone();
        Subscription::new(rx, move || {
            state.lock().withdrawal_subscribers.remove(&id);
        })
    }

    async fn wait_for_receipt(&self, hash: &TxHash) -> Result<Receipt, LedgerError> {
        let waiter = {
            let mut state = self.state.lock();
            if let Some(status) = state.receipts.get(hash) {
                return Ok(Receipt {
                    transaction_hash: *hash,
                    status: *status,
                });
            }
            let (tx, rx) = oneshot::channel();
            state.receipt_waiters.entry(*hash).or_default().push(tx);
            rx
        };

        waiter
            .await
            .map_err(|_| LedgerError::TransactionNotFound(*hash))
    }
}
