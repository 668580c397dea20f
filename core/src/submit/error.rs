// Withdrawal failure taxonomy and its user-facing wording

use crate::ledger::TxHash;
use crate::relay::{RejectionReason, RelayError};
use thiserror::Error;

/// Local checks that failed before anything was sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionViolation {
    #[error("insufficient balance: {required} required, {available} available")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("ledger state is for epoch {found}, expected {expected}")]
    EpochMismatch { expected: u64, found: u64 },

    #[error("ledger returned {found} accounts for an anonymity set of {expected}")]
    AccountCountMismatch { expected: usize, found: usize },

    #[error("amount plus fees overflows")]
    AmountOverflow,
}

/// How a submitted withdrawal failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WithdrawalError {
    #[error("Could not reach the relay ({0}). Please check your connection and try again.")]
    TransportUnreachable(String),

    #[error(
        "Withdrawal {transaction_hash} was mined but reverted. This is usually a timing \
         issue; refresh your balance and try again."
    )]
    DefinitiveRevert { transaction_hash: TxHash },

    #[error(
        "The relay did not respond before the proof expired. This is probably a \
         connectivity issue; please try again."
    )]
    NoResponse,

    #[error(
        "The relay broadcast withdrawal {transaction_hash} but it was not mined before \
         the proof expired. Please try again."
    )]
    ExpiredAfterAcceptance { transaction_hash: TxHash },

    #[error(
        "Lost contact with the network while the withdrawal was in flight. This is \
         probably a connectivity issue; check your balance before retrying."
    )]
    RadioSilence,

    #[error("{}", .0.user_message())]
    ServerRejection(RejectionReason),

    #[error("Withdrawal not attempted: {0}")]
    PreconditionViolation(#[from] PreconditionViolation),
}

impl WithdrawalError {
    /// Whether the current proof may be resubmitted. Every other kind needs
    /// a fresh proof in a new epoch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportUnreachable(_) | Self::ServerRejection(_))
    }

    /// The balance should be re-read before another attempt.
    pub fn requires_resync(&self) -> bool {
        matches!(
            self,
            Self::DefinitiveRevert { .. } | Self::RadioSilence | Self::PreconditionViolation(_)
        )
    }

    /// Hash of the broadcast transaction, when one exists.
    pub fn transaction_hash(&self) -> Option<TxHash> {
        match self {
            Self::DefinitiveRevert { transaction_hash }
            | Self::ExpiredAfterAcceptance { transaction_hash } => Some(*transaction_hash),
            _ => None,
        }
    }
}

impl From<RelayError> for WithdrawalError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::NoRelays => Self::TransportUnreachable("no relays configured".to_string()),
            RelayError::Unreachable(reason) => Self::TransportUnreachable(reason),
            RelayError::Rejected(reason) => Self::ServerRejection(reason),
            RelayError::MalformedResponse(detail) => {
                Self::ServerRejection(RejectionReason::Undisclosed(detail))
            }
        }
    }
}
