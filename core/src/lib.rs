// Rime Core: client side of a private withdrawal pool
//
// Balances live on-chain as ElGamal ciphertexts. This crate decrypts them,
// builds withdrawals hidden in an anonymity set, and sees each submission
// through to a single definitive outcome.

pub mod balance;
pub mod config;
pub mod crypto;
pub mod epoch;
pub mod fees;
pub mod identity;
pub mod ledger;
pub mod network;
pub mod relay;
pub mod store;
pub mod submit;
pub mod withdraw;

use async_trait::async_trait;
use curve25519_dalek::scalar::Scalar;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

pub use balance::{AccountSnapshot, BalanceState, BalanceTracker};
pub use config::{ClientConfig, ConfigError, SubmissionTimeouts};
pub use crypto::{CipherError, Ciphertext};
pub use epoch::EpochClock;
pub use fees::{FixedGasOracle, GasOracle};
pub use identity::{AccountKeys, PublicKey, SecretKey, SessionStore};
pub use ledger::{Address, Block, InMemoryLedger, Ledger, LedgerError, TxHash};
pub use network::Chain;
pub use relay::{HttpRelayClient, RelayClientConfig, RelayError, RelayTransport};
pub use submit::{PreconditionViolation, SubmissionCoordinator, WithdrawalError};
pub use withdraw::{
    AnonsetError, BuildError, ProverError, WithdrawalPayload, WithdrawalProof, WithdrawalProver,
    WithdrawalWitness,
};

use withdraw::{AnonsetEntropy, AnonymitySetBuilder, WithdrawalBuilder, WithdrawalRequest};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error)]
pub enum RimeError {
    #[error("Address {0} has not logged in")]
    NotLoggedIn(String),

    #[error("Chain ID {0} is not supported")]
    UnsupportedChain(u64),

    #[error("User rejected the request")]
    UserRejected,

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Ledger(LedgerError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Anonset(#[from] AnonsetError),

    #[error(transparent)]
    Prover(#[from] ProverError),

    #[error(transparent)]
    Withdrawal(#[from] WithdrawalError),
}

impl From<LedgerError> for RimeError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::EpochMismatch { expected, found } => RimeError::Withdrawal(
                WithdrawalError::PreconditionViolation(PreconditionViolation::EpochMismatch {
                    expected,
                    found,
                }),
            ),
            other => RimeError::Ledger(other),
        }
    }
}

impl From<BuildError> for RimeError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Precondition(violation) => {
                RimeError::Withdrawal(WithdrawalError::PreconditionViolation(violation))
            }
            BuildError::Ledger(e) => e.into(),
            BuildError::Prover(e) => RimeError::Prover(e),
        }
    }
}

impl From<PreconditionViolation> for RimeError {
    fn from(violation: PreconditionViolation) -> Self {
        RimeError::Withdrawal(WithdrawalError::PreconditionViolation(violation))
    }
}

impl From<anyhow::Error> for RimeError {
    fn from(err: anyhow::Error) -> Self {
        RimeError::Storage(err.to_string())
    }
}

// ============================================================================
// HOST BRIDGE
// ============================================================================

/// Something the host must show the user before we proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalPrompt {
    BalanceDisclosure {
        origin: String,
        chain: Chain,
        balance: u64,
    },
    Transaction {
        origin: String,
        destination: Address,
        amount: u64,
        data: Vec<u8>,
        fees: u64,
    },
}

impl ApprovalPrompt {
    pub fn heading(&self) -> &'static str {
        match self {
            ApprovalPrompt::BalanceDisclosure { .. } => "Balance Disclosure Request",
            ApprovalPrompt::Transaction { .. } => "Transaction Approval Request",
        }
    }

    /// Body text, one paragraph per entry.
    pub fn lines(&self) -> Vec<String> {
        match self {
            ApprovalPrompt::BalanceDisclosure {
                origin,
                chain,
                balance,
            } => vec![
                format!("The site {} is requesting to see your Rime balance on {}.", origin, chain),
                format!("Your balance is {} ETH.", fees::format_eth(*balance)),
                "Would you like to share it?".to_string(),
            ],
            ApprovalPrompt::Transaction {
                origin,
                destination,
                amount,
                data,
                fees: total_fees,
            } => vec![
                format!("The site {} is proposing the following transaction on your behalf.", origin),
                format!("Destination address: {}.", destination),
                format!("Value: {} ETH.", fees::format_eth(*amount)),
                format!("Data: 0x{}.", hex::encode(data)),
                format!(
                    "Your fees, including gas, will be {} ETH.",
                    fees::format_eth(*total_fees)
                ),
                "Would you like to execute this transaction privately?".to_string(),
            ],
        }
    }
}

/// Approval surface supplied by the host wallet.
#[async_trait]
pub trait HostBridge: Send + Sync {
    /// Show `prompt`; `true` if the user approved.
    async fn confirm(&self, prompt: &ApprovalPrompt) -> bool;
}

// ============================================================================
// SESSION
// ============================================================================

/// External collaborators a session runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn Ledger>,
    pub relay: Arc<dyn RelayTransport>,
    pub prover: Arc<dyn WithdrawalProver>,
    pub gas: Arc<dyn GasOracle>,
    pub host: Arc<dyn HostBridge>,
}

/// A withdrawal as requested by a dapp. Amounts in milli-ETH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactRequest {
    pub destination: Address,
    pub amount: u64,
    pub data: Vec<u8>,
}

struct SessionBalance {
    tracker: BalanceTracker,
    rollover: Option<JoinHandle<()>>,
}

/// One logged-in account on one chain. Holds the secret key for its
/// lifetime; dropping the session wipes it.
pub struct RimeSession {
    address: String,
    keys: AccountKeys,
    chain: Chain,
    config: ClientConfig,
    parts: Collaborators,
    clock: EpochClock,
    balance: Mutex<SessionBalance>,
}

impl RimeSession {
    /// Open a session for an address that has already logged in.
    pub fn open(
        store: &SessionStore,
        address: &str,
        chain_id: u64,
        config: ClientConfig,
        parts: Collaborators,
    ) -> Result<Self, RimeError> {
        config.validate()?;
        let chain = Chain::from_id(chain_id).ok_or(RimeError::UnsupportedChain(chain_id))?;
        let keys = store
            .load(address)?
            .ok_or_else(|| RimeError::NotLoggedIn(address.to_string()))?;

        tracing::info!("Opened session for {} on {}", keys.public(), chain);
        Ok(Self {
            address: address.to_string(),
            clock: EpochClock::new(parts.ledger.clone(), config.epoch_length),
            keys,
            chain,
            config,
            parts,
            balance: Mutex::new(SessionBalance {
                tracker: BalanceTracker::new(),
                rollover: None,
            }),
        })
    }

    /// Forget the login material and end the session.
    pub fn logout(self, store: &SessionStore) -> Result<(), RimeError> {
        store.logout(&self.address)?;
        Ok(())
    }

    pub fn public_key(&self) -> &PublicKey {
        self.keys.public()
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Last synchronized balance.
    pub fn balance(&self) -> BalanceState {
        self.balance.lock().tracker.current()
    }

    /// Re-read the account from the ledger and schedule the next rollover.
    pub async fn synchronize(&self) -> Result<BalanceState, RimeError> {
        let ledger = self.parts.ledger.as_ref();
        let block = ledger.latest_block().await?;
        let snapshot =
            AccountSnapshot::read(ledger, self.keys.public(), block, self.config.epoch_length)
                .await?;

        let tracker = BalanceTracker::new();
        let state = tracker
            .synchronize(&snapshot, self.keys.secret(), self.config.decrypt_bound)
            .await?;
        let rollover = tracker.spawn_rollover(self.clock.clone(), block);

        let mut balance = self.balance.lock();
        if let Some(previous) = balance.rollover.replace(rollover) {
            previous.abort();
        }
        balance.tracker = tracker;
        tracing::debug!(
            "Synchronized balance at epoch {}: {} available, {} pending",
            snapshot.epoch,
            state.available,
            state.pending
        );
        Ok(state)
    }

    /// Reveal the settled balance to `origin` if the user agrees.
    pub async fn disclose_balance(&self, origin: &str) -> Result<u64, RimeError> {
        let ledger = self.parts.ledger.as_ref();
        let block = ledger.latest_block().await?;
        let snapshot = AccountSnapshot::read_settled(
            ledger,
            self.keys.public(),
            block,
            self.config.epoch_length,
        )
        .await?;

        let (available, pending) = snapshot
            .decrypt_off_runtime(self.keys.secret(), self.config.decrypt_bound)
            .await?;
        let mut state = BalanceState::default();
        state.credit(available, pending);
        let balance = state.total();

        let prompt = ApprovalPrompt::BalanceDisclosure {
            origin: origin.to_string(),
            chain: self.chain,
            balance,
        };
        if !self.parts.host.confirm(&prompt).await {
            return Err(RimeError::UserRejected);
        }
        Ok(balance)
    }

    /// Withdraw `request.amount` to `request.destination` through a relay.
    pub async fn transact(&self, origin: &str, request: TransactRequest) -> Result<TxHash, RimeError> {
        self.synchronize().await?;
        let tracker = self.balance.lock().tracker.clone();

        let fee = fees::protocol_fee(request.amount, self.config.fee_divisor);
        let gas_cost = self
            .parts
            .gas
            .withdrawal_gas_cost(self.chain, &request.data)
            .await?;
        let withdrawal = WithdrawalRequest {
            amount: request.amount,
            fee,
            tip: fees::tip_from_wei(gas_cost),
            destination: request.destination,
            data: request.data,
        };
        let debit = withdrawal.total_debit()?;

        let balance = tracker.current();
        if balance.total() < debit {
            return Err(PreconditionViolation::InsufficientBalance {
                required: debit,
                available: balance.total(),
            }
            .into());
        }

        let prompt = ApprovalPrompt::Transaction {
            origin: origin.to_string(),
            destination: withdrawal.destination,
            amount: withdrawal.amount,
            data: withdrawal.data.clone(),
            fees: withdrawal.fee + withdrawal.tip,
        };
        if !self.parts.host.confirm(&prompt).await {
            return Err(RimeError::UserRejected);
        }

        // The user may have taken a while; start from a fresh block.
        let ledger = self.parts.ledger.as_ref();
        let mut block = ledger.latest_block().await?;
        let headroom = self.clock.seconds_until_next_epoch(block.timestamp);
        if debit > tracker.current().available || headroom < self.config.min_epoch_headroom_secs {
            tracing::info!(
                "Deferring withdrawal to the next epoch ({}s left, {} pending)",
                headroom,
                tracker.current().pending
            );
            block = self.clock.wait_for_next_epoch(&block).await?;
            tracker.advance_to(self.clock.epoch_of(block.timestamp));
        }
        let epoch = self.clock.epoch_of(block.timestamp);

        let anonset = AnonymitySetBuilder::new(self.config.anonset_size)?
            .build(
                ledger,
                self.keys.public(),
                withdrawal.amount,
                AnonsetEntropy::draw(&mut OsRng, self.config.anonset_size),
            )
            .await?;
        let payload = WithdrawalBuilder::new(self.parts.prover.clone())
            .build(
                ledger,
                &self.keys,
                &anonset,
                epoch,
                block.number,
                &withdrawal,
                tracker.current().available,
                Scalar::random(&mut OsRng),
            )
            .await?;

        let coordinator = SubmissionCoordinator::new(
            self.parts.ledger.clone(),
            self.parts.relay.clone(),
            self.clock.clone(),
            self.config.timeouts,
        );
        let hash = coordinator
            .submit(&self.chain.relay_endpoint(), payload, block)
            .await?;
        Ok(hash)
    }
}

impl Drop for RimeSession {
    fn drop(&mut self) {
        if let Some(rollover) = self.balance.get_mut().rollover.take() {
            rollover.abort();
        }
    }
}
