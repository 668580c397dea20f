// Exponential ElGamal over Ristretto: balances live on-chain as (C, D) pairs

use super::generators;
use crate::identity::{PublicKey, SecretKey};
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use std::ops::{Add, Sub};
use thiserror::Error;

/// Default exhaustive-search bound for decryption.
pub const DEFAULT_DECRYPT_BOUND: u64 = 1 << 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("Ciphertext does not encode an amount below {bound}")]
    BalanceOutOfRange { bound: u64 },

    #[error("Invalid group element encoding")]
    InvalidPoint,

    #[error("Invalid ciphertext length: expected 64 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Decryption task failed: {0}")]
    SearchAborted(String),
}

/// Ciphertext `(C, D)` with `C = m*G + r*Pub` and `D = r*G`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ciphertext {
    pub left: RistrettoPoint,
    pub right: RistrettoPoint,
}

impl Ciphertext {
    pub fn new(left: RistrettoPoint, right: RistrettoPoint) -> Self {
        Self { left, right }
    }

    /// Encryption of zero with zero randomness, the state of an untouched account.
    pub fn zero() -> Self {
        Self {
            left: RistrettoPoint::identity(),
            right: RistrettoPoint::identity(),
        }
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&generators::compress(&self.left));
        out[32..].copy_from_slice(&generators::compress(&self.right));
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() != 64 {
            return Err(CipherError::InvalidLength(bytes.len()));
        }
        let mut left = [0u8; 32];
        let mut right = [0u8; 32];
        left.copy_from_slice(&bytes[..32]);
        right.copy_from_slice(&bytes[32..]);

        Ok(Self {
            left: generators::decompress(&left).ok_or(CipherError::InvalidPoint)?,
            right: generators::decompress(&right).ok_or(CipherError::InvalidPoint)?,
        })
    }
}

impl Add for Ciphertext {
    type Output = Ciphertext;

    fn add(self, other: Ciphertext) -> Ciphertext {
        Ciphertext {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl Sub for Ciphertext {
    type Output = Ciphertext;

    fn sub(self, other: Ciphertext) -> Ciphertext {
        Ciphertext {
            left: self.left - other.left,
            right: self.right - other.right,
        }
    }
}

/// Commitment to `delta` under `public` with randomness `r`.
///
/// Negative deltas are passed as negated scalars, so debiting `k` is
/// `rerandomized_commit(pk, r, &-Scalar::from(k))`.
pub fn rerandomized_commit(public: &PublicKey, r: &Scalar, delta: &Scalar) -> Ciphertext {
    Ciphertext {
        left: generators::base() * delta + public.point() * r,
        right: generators::base() * r,
    }
}

pub fn encrypt(amount: u64, public: &PublicKey, r: &Scalar) -> Ciphertext {
    rerandomized_commit(public, r, &Scalar::from(amount))
}

/// `future - present`: the ciphertext of whatever is still pending.
pub fn homomorphic_difference(future: &Ciphertext, present: &Ciphertext) -> Ciphertext {
    *future - *present
}

/// Recover `m` from `(C, D)` by computing `C - x*D` and searching `m*G` for
/// `m` in `[0, bound)`.
pub fn decrypt(ciphertext: &Ciphertext, secret: &SecretKey, bound: u64) -> Result<u64, CipherError> {
    let target = ciphertext.left - ciphertext.right * secret.scalar();
    let base = generators::base();

    let mut accumulator = RistrettoPoint::identity();
    for amount in 0..bound {
        if accumulator == target {
            return Ok(amount);
        }
        accumulator += base;
    }

    Err(CipherError::BalanceOutOfRange { bound })
}
