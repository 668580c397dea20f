// Submit module: the confirmation race and its failure taxonomy

pub mod coordinator;
pub mod error;
pub mod outcome;

pub use coordinator::SubmissionCoordinator;
pub use error::{PreconditionViolation, WithdrawalError};
pub use outcome::{OutcomeSlot, Participant, PendingOutcome, Settlement};
