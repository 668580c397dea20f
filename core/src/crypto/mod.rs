// Cryptography module: additively homomorphic balances and group helpers

pub mod cipher;
pub mod generators;

pub use cipher::{
    decrypt, encrypt, homomorphic_difference, rerandomized_commit, CipherError, Ciphertext,
    DEFAULT_DECRYPT_BOUND,
};
