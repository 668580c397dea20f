// Single-fire outcome slot shared by the submission race participants

use super::error::WithdrawalError;
use crate::ledger::TxHash;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Which race participant settled the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    Relay,
    ChainEvent,
    EpochExpiry,
    NoResponse,
    RadioSilence,
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Participant::Relay => "relay",
            Participant::ChainEvent => "chain event",
            Participant::EpochExpiry => "epoch expiry",
            Participant::NoResponse => "no response",
            Participant::RadioSilence => "radio silence",
        };
        f.write_str(name)
    }
}

pub type Settlement = Result<TxHash, WithdrawalError>;

/// At-most-once write slot. The first `settle` wins; later ones are dropped.
pub struct OutcomeSlot {
    sender: Mutex<Option<oneshot::Sender<(Participant, Settlement)>>>,
}

/// Read side of an [`OutcomeSlot`].
pub struct PendingOutcome {
    receiver: oneshot::Receiver<(Participant, Settlement)>,
}

impl OutcomeSlot {
    pub fn new() -> (Arc<Self>, PendingOutcome) {
        let (sender, receiver) = oneshot::channel();
        (
            Arc::new(Self {
                sender: Mutex::new(Some(sender)),
            }),
            PendingOutcome { receiver },
        )
    }

    /// Returns `true` if this call fixed the outcome.
    pub fn settle(&self, participant: Participant, settlement: Settlement) -> bool {
        let Some(sender) = self.sender.lock().take() else {
            tracing::debug!("Ignoring late {} outcome: {:?}", participant, settlement);
            return false;
        };
        // A dropped receiver means nobody is waiting any more; the slot is
        // still spent.
        let _ = sender.send((participant, settlement));
        true
    }

    pub fn is_settled(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl PendingOutcome {
    /// Wait for the winning settlement. `None` if the slot was dropped unset.
    pub async fn wait(self) -> Option<(Participant, Settlement)> {
        self.receiver.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_writer_wins() {
        let (slot, pending) = OutcomeSlot::new();
        assert!(!slot.is_settled());

        assert!(slot.settle(Participant::ChainEvent, Ok(TxHash([1u8; 32]))));
        assert!(!slot.settle(Participant::RadioSilence, Err(WithdrawalError::RadioSilence)));
        assert!(slot.is_settled());

        let (winner, settlement) = pending.wait().await.unwrap();
        assert_eq!(winner, Participant::ChainEvent);
        assert_eq!(settlement, Ok(TxHash([1u8; 32])));
    }

    #[tokio::test]
    async fn test_dropped_slot_yields_none() {
        let (slot, pending) = OutcomeSlot::new();
        drop(slot);
        assert!(pending.wait().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_writers_settle_once() {
        let (slot, pending) = OutcomeSlot::new();
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let slot = slot.clone();
                tokio::spawn(async move { slot.settle(Participant::Relay, Ok(TxHash([i; 32]))) })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert!(pending.wait().await.is_some());
    }
}
