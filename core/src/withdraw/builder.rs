// Withdrawal construction: balance commitments, epoch tag and proof

use super::anonset::AnonymitySet;
use super::prover::{ProverError, WithdrawalProver, WithdrawalWitness};
use crate::crypto::{generators, rerandomized_commit, Ciphertext};
use crate::identity::{AccountKeys, PublicKey};
use crate::ledger::{Address, Ledger, LedgerError};
use crate::submit::PreconditionViolation;
use curve25519_dalek::scalar::Scalar;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error(transparent)]
    Precondition(#[from] PreconditionViolation),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Prover(#[from] ProverError),
}

/// What the user asked to withdraw. Amounts in milli-ETH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub amount: u64,
    pub fee: u64,
    pub tip: u64,
    pub destination: Address,
    pub data: Vec<u8>,
}

impl WithdrawalRequest {
    /// `amount + fee + tip`, the total debited from the sender.
    pub fn total_debit(&self) -> Result<u64, PreconditionViolation> {
        self.amount
            .checked_add(self.fee)
            .and_then(|sum| sum.checked_add(self.tip))
            .ok_or(PreconditionViolation::AmountOverflow)
    }
}

/// The signed-off withdrawal, ready to hand to a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalPayload {
    /// Anonymity set keys, compressed.
    pub y: Vec<[u8; 32]>,
    /// Left components of the per-member commitments.
    pub c: Vec<[u8; 32]>,
    /// Shared right component `r*G`.
    pub d: [u8; 32],
    /// Epoch tag `x * g_epoch`.
    pub u: [u8; 32],
    pub epoch: u64,
    pub tip: u64,
    pub proof: Vec<u8>,
    pub destination: Address,
    pub data: Vec<u8>,
    pub amount: u64,
}

impl WithdrawalPayload {
    /// Hash matched against on-chain withdrawal events.
    pub fn commitment_hash(&self) -> [u8; 32] {
        super::commitment_hash(&self.y, &self.c, &self.d)
    }
}

pub struct WithdrawalBuilder {
    prover: Arc<dyn WithdrawalProver>,
}

impl WithdrawalBuilder {
    pub fn new(prover: Arc<dyn WithdrawalProver>) -> Self {
        Self { prover }
    }

    /// Build the payload for withdrawing `request` out of `available`.
    ///
    /// `blinding` is the single random scalar shared by every member's
    /// commitment, so `D` is common to all of them.
    #[allow(clippy::too_many_arguments)]
    pub async fn build(
        &self,
        ledger: &dyn Ledger,
        keys: &AccountKeys,
        anonset: &AnonymitySet,
        epoch: u64,
        at_block: u64,
        request: &WithdrawalRequest,
        available: u64,
        blinding: Scalar,
    ) -> Result<WithdrawalPayload, BuildError> {
        let debit = request.total_debit()?;
        let residual = available
            .checked_sub(debit)
            .ok_or(PreconditionViolation::InsufficientBalance {
                required: debit,
                available,
            })?;

        let members = anonset.members();
        let accounts = ledger.simulate_accounts(members, epoch, at_block).await?;
        if accounts.len() != members.len() {
            return Err(PreconditionViolation::AccountCountMismatch {
                expected: members.len(),
                found: accounts.len(),
            }
            .into());
        }
        if let Some(stale) = accounts.iter().find(|account| account.epoch != epoch) {
            return Err(PreconditionViolation::EpochMismatch {
                expected: epoch,
                found: stale.epoch,
            }
            .into());
        }

        let debit_scalar = -Scalar::from(debit);
        let commitments: Vec<Ciphertext> = members
            .iter()
            .enumerate()
            .map(|(i, member)| {
                let delta = if i == anonset.sender_index() {
                    debit_scalar
                } else {
                    Scalar::ZERO
                };
                rerandomized_commit(member, &blinding, &delta)
            })
            .collect();
        let new_ciphertexts: Vec<Ciphertext> = accounts
            .iter()
            .zip(&commitments)
            .map(|(account, commitment)| account.ciphertext + *commitment)
            .collect();

        let d = generators::compress(&(generators::base() * blinding));
        let u = generators::compress(&keys.secret().epoch_tag(epoch));
        let y: Vec<[u8; 32]> = members.iter().map(PublicKey::to_bytes).collect();
        let c: Vec<[u8; 32]> = commitments
            .iter()
            .map(|commitment| generators::compress(&commitment.left))
            .collect();

        let witness = WithdrawalWitness {
            anonset: members.to_vec(),
            new_ciphertexts,
            commitments,
            epoch,
            sender_index: anonset.sender_index(),
            amount: request.amount,
            fee: request.fee + request.tip,
            residual,
            destination: request.destination,
            data: request.data.clone(),
            secret: keys.secret().clone(),
            blinding,
        };

        let prover = self.prover.clone();
        let proof = tokio::task::spawn_blocking(move || prover.prove(&witness))
            .await
            .map_err(|e| ProverError::Failed(e.to_string()))??;
        tracing::info!(
            "Built withdrawal of {} for epoch {} over {} accounts",
            request.amount,
            epoch,
            members.len()
        );

        Ok(WithdrawalPayload {
            y,
            c,
            d,
            u,
            epoch,
            tip: request.tip,
            proof: proof.into_bytes(),
            destination: request.destination,
            data: request.data.clone(),
            amount: request.amount,
        })
    }
}
