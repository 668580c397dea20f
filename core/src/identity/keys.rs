// Account key material: the ElGamal secret and its public key

use crate::crypto::cipher::{self, CipherError, Ciphertext};
use crate::crypto::generators;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::hash::{Hash, Hasher};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Public key `Pub = x*G`, kept together with its canonical encoding.
#[derive(Clone, Copy)]
pub struct PublicKey {
    point: RistrettoPoint,
    compressed: [u8; 32],
}

impl PublicKey {
    pub fn from_point(point: RistrettoPoint) -> Self {
        Self {
            point,
            compressed: generators::compress(&point),
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CipherError> {
        let point = generators::decompress(bytes).ok_or(CipherError::InvalidPoint)?;
        Ok(Self {
            point,
            compressed: *bytes,
        })
    }

    pub fn from_hex(value: &str) -> Result<Self, CipherError> {
        let raw = hex::decode(value.trim_start_matches("0x")).map_err(|_| CipherError::InvalidPoint)?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|v: Vec<u8>| CipherError::InvalidLength(v.len()))?;
        Self::from_bytes(&bytes)
    }

    pub fn point(&self) -> RistrettoPoint {
        self.point
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.compressed
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.compressed))
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.compressed == other.compressed
    }
}

impl Eq for PublicKey {}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.compressed.hash(state);
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Secret scalar `x`. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    scalar: Scalar,
}

impl SecretKey {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            scalar: Scalar::random(rng),
        }
    }

    /// Reduce stored login material (32 big-endian bytes) into a scalar.
    pub fn from_login_material(material: &[u8; 32]) -> Self {
        Self {
            scalar: generators::scalar_from_be_bytes(material),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_point(generators::base() * self.scalar)
    }

    /// `u = x * g_epoch`, the per-epoch tag that stops a key withdrawing twice.
    pub fn epoch_tag(&self, epoch: u64) -> RistrettoPoint {
        generators::epoch_generator(epoch) * self.scalar
    }

    pub fn decrypt(&self, ciphertext: &Ciphertext, bound: u64) -> Result<u64, CipherError> {
        cipher::decrypt(ciphertext, self, bound)
    }

    pub(crate) fn scalar(&self) -> &Scalar {
        &self.scalar
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Hash a login signature into the 32 bytes persisted per address.
pub fn derive_login_material(signature: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut hasher = Keccak256::new();
    hasher.update(signature);
    Zeroizing::new(hasher.finalize().into())
}

/// Secret key plus its cached public key.
#[derive(Clone)]
pub struct AccountKeys {
    secret: SecretKey,
    public: PublicKey,
}

impl AccountKeys {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_secret(SecretKey::generate(rng))
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn from_login_material(material: &[u8; 32]) -> Self {
        Self::from_secret(SecretKey::from_login_material(material))
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }
}

impl fmt::Debug for AccountKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKeys")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
