//! Relays broadcast withdrawals on the user's behalf.

pub mod client;
pub mod protocol;

pub use client::{HttpRelayClient, RelayClientConfig, RelayError, RelayTransport};
pub use protocol::{withdrawal_endpoint, RejectionReason, RelayReceipt, WithdrawalBody};
