// Anonymity set construction: sample, shuffle, and make sure the sender is in it

use crate::identity::PublicKey;
use crate::ledger::{Ledger, LedgerError};
use rand::{CryptoRng, RngCore};
use std::collections::HashSet;
use thiserror::Error;

/// Default anonymity set size.
pub const ANONSET_SIZE: usize = 16;
/// Largest size a shuffle byte can index.
pub const MAX_ANONSET_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnonsetError {
    #[error("Anonymity set size must be a power of two between 2 and 256, got {0}")]
    InvalidSize(usize),

    #[error("Ledger sampled {found} members, expected {expected}")]
    WrongSize { expected: usize, found: usize },

    #[error("Ledger sampled {0} more than once")]
    DuplicateMember(PublicKey),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// A shuffled set of exactly `N` distinct keys containing the sender once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymitySet {
    members: Vec<PublicKey>,
    sender_index: usize,
}

impl AnonymitySet {
    pub fn members(&self) -> &[PublicKey] {
        &self.members
    }

    pub fn sender_index(&self) -> usize {
        self.sender_index
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Randomness consumed by one build: the sampling seed and one byte per slot.
#[derive(Debug, Clone)]
pub struct AnonsetEntropy {
    pub seed: [u8; 32],
    pub shuffle: Vec<u8>,
}

impl AnonsetEntropy {
    pub fn draw<R: RngCore + CryptoRng>(rng: &mut R, size: usize) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        let mut shuffle = vec![0u8; size];
        rng.fill_bytes(&mut shuffle);
        Self { seed, shuffle }
    }
}

/// In-place Durstenfeld shuffle driven by one random byte per position.
///
/// For `i` from `N - 1` down to `1`, swap `i` with `random[i] % (i + 1)`.
///
/// # Panics
///
/// If `random` is shorter than `items`.
pub fn permute<T>(items: &mut [T], random: &[u8]) {
    for i in (1..items.len()).rev() {
        let j = random[i] as usize % (i + 1);
        items.swap(i, j);
    }
}

/// Shuffle `members`, then locate the sender or overwrite slot
/// `random[0] & (N - 1)` with it. Returns the sender's index.
///
/// `members.len()` must be a nonzero power of two and `random` at least as
/// long; `AnonymitySetBuilder::build` checks both before calling.
pub(crate) fn permute_and_place(members: &mut [PublicKey], sender: &PublicKey, random: &[u8]) -> usize {
    debug_assert!(members.len().is_power_of_two() && random.len() >= members.len());
    permute(members, random);

    match members.iter().rposition(|member| member == sender) {
        Some(index) => index,
        None => {
            let index = random[0] as usize & (members.len() - 1);
            members[index] = *sender;
            index
        }
    }
}

pub struct AnonymitySetBuilder {
    size: usize,
}

impl AnonymitySetBuilder {
    pub fn new(size: usize) -> Result<Self, AnonsetError> {
        if size < 2 || size > MAX_ANONSET_SIZE || !size.is_power_of_two() {
            return Err(AnonsetError::InvalidSize(size));
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Sample from the ledger, validate, shuffle and place the sender.
    pub async fn build(
        &self,
        ledger: &dyn Ledger,
        sender: &PublicKey,
        amount: u64,
        entropy: AnonsetEntropy,
    ) -> Result<AnonymitySet, AnonsetError> {
        let mut members = ledger.sample_anonset(entropy.seed, amount).await?;

        if members.len() != self.size {
            return Err(AnonsetError::WrongSize {
                expected: self.size,
                found: members.len(),
            });
        }
        let mut seen = HashSet::with_capacity(members.len());
        for member in &members {
            if !seen.insert(*member) {
                return Err(AnonsetError::DuplicateMember(*member));
            }
        }
        if entropy.shuffle.len() < self.size {
            return Err(AnonsetError::InvalidSize(entropy.shuffle.len()));
        }

        let sender_index = permute_and_place(&mut members, sender, &entropy.shuffle);
        tracing::debug!(
            "Built anonymity set of {} with sender at slot {}",
            members.len(),
            sender_index
        );

        Ok(AnonymitySet {
            members,
            sender_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AccountKeys;
    use crate::ledger::InMemoryLedger;
    use rand::rngs::OsRng;

    fn keys(n: usize) -> Vec<PublicKey> {
        (0..n)
            .map(|_| *AccountKeys::generate(&mut OsRng).public())
            .collect()
    }

    #[test]
    fn test_permute_matches_durstenfeld() {
        let mut items = [0, 1, 2, 3];
        // i=3: j=7%4=3, i=2: j=4%3=1, i=1: j=5%2=1
        permute(&mut items, &[0, 5, 4, 7]);
        assert_eq!(items, [0, 2, 1, 3]);
    }

    #[test]
    fn test_builder_rejects_bad_sizes() {
        for size in [0, 1, 3, 12, 512] {
            assert_eq!(
                AnonymitySetBuilder::new(size).err(),
                Some(AnonsetError::InvalidSize(size))
            );
        }
        assert!(AnonymitySetBuilder::new(2).is_ok());
        assert!(AnonymitySetBuilder::new(256).is_ok());
    }

    #[tokio::test]
    async fn test_absent_sender_is_patched_in() {
        let ledger = InMemoryLedger::new(0);
        let sampled = keys(ANONSET_SIZE);
        ledger.set_anonset(sampled.clone());
        let sender = *AccountKeys::generate(&mut OsRng).public();

        let builder = AnonymitySetBuilder::new(ANONSET_SIZE).unwrap();
        let entropy = AnonsetEntropy::draw(&mut OsRng, ANONSET_SIZE);
        let expected_index = entropy.shuffle[0] as usize & (ANONSET_SIZE - 1);
        let set = builder.build(&ledger, &sender, 5, entropy).await.unwrap();

        assert_eq!(set.len(), ANONSET_SIZE);
        assert_eq!(set.members().iter().filter(|m| **m == sender).count(), 1);
        assert_eq!(set.members()[set.sender_index()], sender);
        assert_eq!(set.sender_index(), expected_index);

        let unique: HashSet<_> = set.members().iter().collect();
        assert_eq!(unique.len(), ANONSET_SIZE);
    }

    #[tokio::test]
    async fn test_present_sender_is_located() {
        let ledger = InMemoryLedger::new(0);
        let sampled = keys(ANONSET_SIZE);
        let sender = sampled[5];
        ledger.set_anonset(sampled.clone());

        let builder = AnonymitySetBuilder::new(ANONSET_SIZE).unwrap();
        let entropy = AnonsetEntropy::draw(&mut OsRng, ANONSET_SIZE);
        let set = builder.build(&ledger, &sender, 5, entropy).await.unwrap();

        assert_eq!(set.members()[set.sender_index()], sender);
        let mut sorted: Vec<_> = set.members().iter().map(|k| k.to_bytes()).collect();
        let mut original: Vec<_> = sampled.iter().map(|k| k.to_bytes()).collect();
        sorted.sort();
        original.sort();
        assert_eq!(sorted, original);
    }

    #[tokio::test]
    async fn test_short_shuffle_rejected() {
        let ledger = InMemoryLedger::new(0);
        ledger.set_anonset(keys(ANONSET_SIZE));
        let sender = *AccountKeys::generate(&mut OsRng).public();
        let builder = AnonymitySetBuilder::new(ANONSET_SIZE).unwrap();

        for len in [0, ANONSET_SIZE - 1] {
            let entropy = AnonsetEntropy {
                seed: [7u8; 32],
                shuffle: vec![0u8; len],
            };
            let err = builder.build(&ledger, &sender, 1, entropy).await.unwrap_err();
            assert_eq!(err, AnonsetError::InvalidSize(len));
        }
    }

    #[tokio::test]
    async fn test_wrong_size_and_duplicates_rejected() {
        let ledger = InMemoryLedger::new(0);
        let sender = *AccountKeys::generate(&mut OsRng).public();
        let builder = AnonymitySetBuilder::new(ANONSET_SIZE).unwrap();

        ledger.set_anonset(keys(ANONSET_SIZE - 1));
        let err = builder
            .build(&ledger, &sender, 1, AnonsetEntropy::draw(&mut OsRng, ANONSET_SIZE))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AnonsetError::WrongSize {
                expected: ANONSET_SIZE,
                found: ANONSET_SIZE - 1
            }
        );

        let mut sampled = keys(ANONSET_SIZE);
        sampled[3] = sampled[9];
        ledger.set_anonset(sampled.clone());
        let err = builder
            .build(&ledger, &sender, 1, AnonsetEntropy::draw(&mut OsRng, ANONSET_SIZE))
            .await
            .unwrap_err();
        assert_eq!(err, AnonsetError::DuplicateMember(sampled[9]));
    }
}
