// Withdraw module: anonymity set, payload construction and the prover seam

pub mod anonset;
pub mod builder;
pub mod prover;

pub use anonset::{AnonsetEntropy, AnonsetError, AnonymitySet, AnonymitySetBuilder, ANONSET_SIZE};
pub use builder::{BuildError, WithdrawalBuilder, WithdrawalPayload, WithdrawalRequest};
pub use prover::{ProverError, WithdrawalProof, WithdrawalProver, WithdrawalWitness};

use sha3::{Digest, Keccak256};

/// `keccak256(Y[0..N] || C[0..N] || D)`.
pub fn commitment_hash(y: &[[u8; 32]], c: &[[u8; 32]], d: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for key in y {
        hasher.update(key);
    }
    for commitment in c {
        hasher.update(commitment);
    }
    hasher.update(d);
    hasher.finalize().into()
}
