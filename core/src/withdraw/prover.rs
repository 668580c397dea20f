// Prover seam: the zero-knowledge proof system is supplied by the host

use crate::crypto::Ciphertext;
use crate::identity::{PublicKey, SecretKey};
use crate::ledger::Address;
use curve25519_dalek::scalar::Scalar;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroize;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProverError {
    #[error("Proof generation failed: {0}")]
    Failed(String),
}

/// Everything the proof attests to. Holds the secret key and blinding
/// scalar, both wiped on drop.
#[derive(Clone)]
pub struct WithdrawalWitness {
    pub anonset: Vec<PublicKey>,
    /// Account ciphertexts after the withdrawal is applied.
    pub new_ciphertexts: Vec<Ciphertext>,
    /// The per-member commitments that were added.
    pub commitments: Vec<Ciphertext>,
    pub epoch: u64,
    pub sender_index: usize,
    pub amount: u64,
    /// Fee plus tip.
    pub fee: u64,
    pub residual: u64,
    pub destination: Address,
    pub data: Vec<u8>,
    pub secret: SecretKey,
    pub blinding: Scalar,
}

impl Drop for WithdrawalWitness {
    fn drop(&mut self) {
        self.blinding.zeroize();
        self.residual.zeroize();
        self.sender_index.zeroize();
    }
}

impl fmt::Debug for WithdrawalWitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithdrawalWitness")
            .field("anonset", &self.anonset.len())
            .field("epoch", &self.epoch)
            .field("amount", &self.amount)
            .field("fee", &self.fee)
            .finish_non_exhaustive()
    }
}

/// Serialized proof bytes as the verifier contract expects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalProof(Vec<u8>);

impl WithdrawalProof {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Produces the withdrawal proof. CPU-bound; called off the async runtime.
#[cfg_attr(test, mockall::automock)]
pub trait WithdrawalProver: Send + Sync {
    fn prove(&self, witness: &WithdrawalWitness) -> Result<WithdrawalProof, ProverError>;
}
