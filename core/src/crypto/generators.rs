// Group generators and scalar helpers shared by the cipher and the withdrawal builder

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use sha2::Sha512;

const EPOCH_GENERATOR_DOMAIN: &[u8] = b"rime/epoch-generator/v1";

/// The fixed base point `G` every ciphertext is expressed against.
pub fn base() -> RistrettoPoint {
    RISTRETTO_BASEPOINT_POINT
}

/// Per-epoch generator used to derive the nullifier-like tag `u = x * g_epoch`.
///
/// Derived by hashing to the group so nobody knows its discrete log with
/// respect to `G`.
pub fn epoch_generator(epoch: u64) -> RistrettoPoint {
    let mut input = Vec::with_capacity(EPOCH_GENERATOR_DOMAIN.len() + 8);
    input.extend_from_slice(EPOCH_GENERATOR_DOMAIN);
    input.extend_from_slice(&epoch.to_be_bytes());
    RistrettoPoint::hash_from_bytes::<Sha512>(&input)
}

/// Interpret 32 big-endian bytes as an integer reduced modulo the group order.
pub fn scalar_from_be_bytes(bytes: &[u8; 32]) -> Scalar {
    let mut le = *bytes;
    le.reverse();
    Scalar::from_bytes_mod_order(le)
}

pub fn compress(point: &RistrettoPoint) -> [u8; 32] {
    point.compress().to_bytes()
}

pub fn decompress(bytes: &[u8; 32]) -> Option<RistrettoPoint> {
    CompressedRistretto(*bytes).decompress()
}
