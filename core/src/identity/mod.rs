// Identity: account keys derived from a host login signature

mod keys;
mod store;

pub use keys::{derive_login_material, AccountKeys, PublicKey, SecretKey};
pub use store::SessionStore;
