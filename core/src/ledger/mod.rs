//! Chain access used by the withdrawal client.
//!
//! The client never talks to a node directly; everything it needs from the
//! chain goes through [`Ledger`]. Hosts wire in their RPC provider, tests use
//! [`InMemoryLedger`].

mod memory;

pub use memory::InMemoryLedger;

use crate::crypto::Ciphertext;
use crate::identity::PublicKey;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::mpsc;

// ============================================================================
// CHAIN TYPES
// ============================================================================

/// 32-byte transaction hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxHash(pub [u8; 32]);

/// 20-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

fn parse_fixed_hex<const N: usize>(value: &str) -> Result<[u8; N], String> {
    let raw = hex::decode(value.trim().trim_start_matches("0x")).map_err(|e| e.to_string())?;
    raw.try_into()
        .map_err(|v: Vec<u8>| format!("expected {} bytes, got {}", N, v.len()))
}

macro_rules! hex_newtype {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                parse_fixed_hex(value).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = String::deserialize(deserializer)?;
                value.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_newtype!(TxHash);
hex_newtype!(Address);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

/// Simulated account state at a given epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountState {
    /// Epoch the ledger evaluated the account at.
    pub epoch: u64,
    pub ciphertext: Ciphertext,
}

/// A withdrawal the contract executed, as seen in its event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalEvent {
    pub transaction_hash: TxHash,
    pub y: Vec<[u8; 32]>,
    pub c: Vec<[u8; 32]>,
    pub d: [u8; 32],
}

impl WithdrawalEvent {
    pub fn commitment_hash(&self) -> [u8; 32] {
        crate::withdraw::commitment_hash(&self.y, &self.c, &self.d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: TxHash,
    pub status: ReceiptStatus,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Ledger RPC failed: {0}")]
    Rpc(String),

    #[error("Ledger subscription closed")]
    SubscriptionClosed,

    #[error("Transaction {0} not found")]
    TransactionNotFound(TxHash),

    #[error("Ledger returned state for epoch {found}, expected {expected}")]
    EpochMismatch { expected: u64, found: u64 },

    #[error("Ledger returned {found} accounts, expected {expected}")]
    AccountCountMismatch { expected: usize, found: usize },
}

// ============================================================================
// SUBSCRIPTIONS
// ============================================================================

/// Stream of chain notifications. Unsubscribes when dropped.
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    on_unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<T>,
        on_unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            on_unsubscribe: Some(Box::new(on_unsubscribe)),
        }
    }

    /// Next notification, or `None` once the ledger side has gone away.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.on_unsubscribe.take() {
            unsubscribe();
        }
    }
}

// ============================================================================
// LEDGER TRAIT
// ============================================================================

/// Read and watch access to the chain hosting the pool contract.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn latest_block(&self) -> Result<Block, LedgerError>;

    /// Simulate every key's account at `epoch`, evaluated against state at
    /// block `at_block`. One entry per key, in order.
    async fn simulate_accounts(
        &self,
        keys: &[PublicKey],
        epoch: u64,
        at_block: u64,
    ) -> Result<Vec<AccountState>, LedgerError>;

    /// Ask the pool to sample an anonymity set for a withdrawal of `amount`.
    async fn sample_anonset(&self, seed: [u8; 32], amount: u64)
        -> Result<Vec<PublicKey>, LedgerError>;

    fn subscribe_blocks(&self) -> Subscription<Block>;

    fn watch_withdrawals(&self) -> Subscription<WithdrawalEvent>;

    /// Resolve once `hash` is mined.
    async fn wait_for_receipt(&self, hash: &TxHash) -> Result<Receipt, LedgerError>;
}
