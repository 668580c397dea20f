//! Submission race.
//!
//! Once a payload is built, several independent sources can tell us how the
//! withdrawal ended: the relay and its receipt, the contract's event log, and
//! a set of timers anchored on the next epoch boundary (after which the proof
//! is no longer valid). Each source runs as its own task and writes to a
//! single [`OutcomeSlot`]; the first write decides, the rest are aborted.

use super::error::WithdrawalError;
use super::outcome::{OutcomeSlot, Participant};
use crate::config::SubmissionTimeouts;
use crate::epoch::EpochClock;
use crate::ledger::{Block, Ledger, LedgerError, ReceiptStatus, TxHash};
use crate::relay::RelayTransport;
use crate::withdraw::WithdrawalPayload;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// The next epoch boundary after the proof's block, awaited by several
/// participants at once.
type EpochBoundary = Shared<BoxFuture<'static, Result<Block, LedgerError>>>;

/// Wait for the boundary, then `grace`. Never resolves if the block stream
/// dies; radio silence covers that case.
async fn after_boundary(boundary: EpochBoundary, grace: std::time::Duration) {
    if boundary.await.is_err() {
        std::future::pending::<()>().await;
    }
    sleep(grace).await;
}

pub struct SubmissionCoordinator {
    ledger: Arc<dyn Ledger>,
    relay: Arc<dyn RelayTransport>,
    clock: EpochClock,
    timeouts: SubmissionTimeouts,
}

impl SubmissionCoordinator {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        relay: Arc<dyn RelayTransport>,
        clock: EpochClock,
        timeouts: SubmissionTimeouts,
    ) -> Self {
        Self {
            ledger,
            relay,
            clock,
            timeouts,
        }
    }

    /// Submit `payload` and race every outcome source. `proof_block` is the
    /// block whose epoch the proof was built for.
    pub async fn submit(
        &self,
        endpoint: &str,
        payload: WithdrawalPayload,
        proof_block: Block,
    ) -> Result<TxHash, WithdrawalError> {
        let commitment = payload.commitment_hash();
        let payload = Arc::new(payload);
        let boundary: EpochBoundary = {
            let clock = self.clock.clone();
            async move { clock.wait_for_next_epoch(&proof_block).await }
                .boxed()
                .shared()
        };
        let (slot, pending) = OutcomeSlot::new();

        tracing::info!(
            "Submitting withdrawal for epoch {} (commitment 0x{})",
            payload.epoch,
            hex::encode(commitment)
        );

        let participants: Vec<JoinHandle<()>> = vec![
            tokio::spawn(relay_path(
                self.relay.clone(),
                self.ledger.clone(),
                endpoint.to_string(),
                payload,
                boundary.clone(),
                self.timeouts,
                slot.clone(),
            )),
            tokio::spawn(event_path(
                self.ledger.clone(),
                commitment,
                self.timeouts,
                slot.clone(),
            )),
            tokio::spawn(no_response(boundary, self.timeouts, slot.clone())),
            tokio::spawn(radio_silence(self.timeouts, slot.clone())),
        ];
        // Participants now hold the only writers.
        drop(slot);

        let outcome = pending.wait().await;
        for participant in &participants {
            participant.abort();
        }

        match outcome {
            Some((winner, settlement)) => {
                match &settlement {
                    Ok(hash) => tracing::info!("Withdrawal {} confirmed via {}", hash, winner),
                    Err(e) => tracing::warn!("Withdrawal failed via {}: {}", winner, e),
                }
                settlement
            }
            // Every participant exited without settling.
            None => Err(WithdrawalError::RadioSilence),
        }
    }
}

/// POST to the relay, then race the receipt against proof expiry.
async fn relay_path(
    relay: Arc<dyn RelayTransport>,
    ledger: Arc<dyn Ledger>,
    endpoint: String,
    payload: Arc<WithdrawalPayload>,
    boundary: EpochBoundary,
    timeouts: SubmissionTimeouts,
    slot: Arc<OutcomeSlot>,
) {
    let hash = match relay.submit(&endpoint, &payload).await {
        Ok(hash) => hash,
        Err(e) => {
            slot.settle(Participant::Relay, Err(e.into()));
            return;
        }
    };
    tracing::debug!("Relay accepted withdrawal as {}", hash);

    let status = tokio::select! {
        receipt = ledger.wait_for_receipt(&hash) => match receipt {
            Ok(receipt) => receipt.status,
            Err(e) => {
                tracing::warn!("Receipt lookup for {} failed, treating as reverted: {}", hash, e);
                ReceiptStatus::Reverted
            }
        },
        _ = after_boundary(boundary.clone(), timeouts.expiry_grace()) => {
            slot.settle(
                Participant::EpochExpiry,
                Err(WithdrawalError::ExpiredAfterAcceptance { transaction_hash: hash }),
            );
            return;
        }
    };

    match status {
        ReceiptStatus::Success => {
            slot.settle(Participant::Relay, Ok(hash));
        }
        ReceiptStatus::Reverted => {
            // Someone else may have landed an equivalent withdrawal; give the
            // event watcher until past the boundary to report it.
            tracing::debug!("Withdrawal {} reverted, waiting out the epoch", hash);
            after_boundary(boundary, timeouts.revert_grace()).await;
            slot.settle(
                Participant::Relay,
                Err(WithdrawalError::DefinitiveRevert {
                    transaction_hash: hash,
                }),
            );
        }
    }
}

/// Watch withdrawal events for our commitment. Only ever reports success.
async fn event_path(
    ledger: Arc<dyn Ledger>,
    commitment: [u8; 32],
    timeouts: SubmissionTimeouts,
    slot: Arc<OutcomeSlot>,
) {
    let mut events = ledger.watch_withdrawals();
    let matched = tokio::time::timeout(timeouts.event_watch(), async {
        while let Some(event) = events.recv().await {
            if event.commitment_hash() == commitment {
                return Some(event.transaction_hash);
            }
        }
        None
    })
    .await;
    events.unsubscribe();

    match matched {
        Ok(Some(hash)) => {
            slot.settle(Participant::ChainEvent, Ok(hash));
        }
        Ok(None) => tracing::debug!("Withdrawal event stream closed"),
        Err(_) => tracing::debug!("Stopped watching withdrawal events"),
    }
}

async fn no_response(boundary: EpochBoundary, timeouts: SubmissionTimeouts, slot: Arc<OutcomeSlot>) {
    after_boundary(boundary, timeouts.no_response_grace()).await;
    slot.settle(Participant::NoResponse, Err(WithdrawalError::NoResponse));
}

async fn radio_silence(timeouts: SubmissionTimeouts, slot: Arc<OutcomeSlot>) {
    sleep(timeouts.radio_silence()).await;
    slot.settle(Participant::RadioSilence, Err(WithdrawalError::RadioSilence));
}
