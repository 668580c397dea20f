// Client configuration: protocol constants, relays and submission timeouts

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// How long each participant of the submission race waits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionTimeouts {
    /// After a revert, wait this long past the epoch boundary before failing
    pub revert_grace_secs: u64,
    /// After relay acceptance, give up waiting for a receipt this long past the boundary
    pub expiry_grace_secs: u64,
    /// With no relay answer at all, fail this long past the boundary
    pub no_response_grace_secs: u64,
    /// How long to watch chain events for the withdrawal
    pub event_watch_secs: u64,
    /// Absolute ceiling on the whole race
    pub radio_silence_secs: u64,
}

impl Default for SubmissionTimeouts {
    fn default() -> Self {
        Self {
            revert_grace_secs: 15,
            expiry_grace_secs: 15,
            no_response_grace_secs: 20,
            event_watch_secs: 180,
            radio_silence_secs: 180,
        }
    }
}

impl SubmissionTimeouts {
    pub fn revert_grace(&self) -> Duration {
        Duration::from_secs(self.revert_grace_secs)
    }

    pub fn expiry_grace(&self) -> Duration {
        Duration::from_secs(self.expiry_grace_secs)
    }

    pub fn no_response_grace(&self) -> Duration {
        Duration::from_secs(self.no_response_grace_secs)
    }

    pub fn event_watch(&self) -> Duration {
        Duration::from_secs(self.event_watch_secs)
    }

    pub fn radio_silence(&self) -> Duration {
        Duration::from_secs(self.radio_silence_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.radio_silence_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "radio_silence_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Withdrawal client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay base URLs, tried in order
    pub relays: Vec<String>,
    /// Epoch length in seconds
    pub epoch_length: u64,
    /// Anonymity set size (power of two)
    pub anonset_size: usize,
    /// Exclusive upper bound for balance decryption
    pub decrypt_bound: u64,
    /// Minimum seconds left in an epoch to start a withdrawal in it
    pub min_epoch_headroom_secs: u64,
    /// Protocol fee is `amount / fee_divisor`
    pub fee_divisor: u64,
    pub relay_request_timeout_secs: u64,
    pub timeouts: SubmissionTimeouts,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relays: Vec::new(),
            epoch_length: crate::epoch::EPOCH_LENGTH,
            anonset_size: crate::withdraw::ANONSET_SIZE,
            decrypt_bound: crate::crypto::DEFAULT_DECRYPT_BOUND,
            min_epoch_headroom_secs: 10,
            fee_divisor: crate::fees::FEE_DIVISOR,
            relay_request_timeout_secs: 30,
            timeouts: SubmissionTimeouts::default(),
        }
    }
}

impl ClientConfig {
    pub fn relay_request_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epoch_length == 0 {
            return Err(ConfigError::InvalidConfig(
                "epoch_length must be greater than 0".to_string(),
            ));
        }
        if self.min_epoch_headroom_secs >= self.epoch_length {
            return Err(ConfigError::InvalidConfig(
                "min_epoch_headroom_secs must be shorter than an epoch".to_string(),
            ));
        }
        if crate::withdraw::AnonymitySetBuilder::new(self.anonset_size).is_err() {
            return Err(ConfigError::InvalidConfig(format!(
                "anonset_size must be a power of two between 2 and 256, got {}",
                self.anonset_size
            )));
        }
        if self.decrypt_bound == 0 {
            return Err(ConfigError::InvalidConfig(
                "decrypt_bound must be greater than 0".to_string(),
            ));
        }
        if self.fee_divisor == 0 {
            return Err(ConfigError::InvalidConfig(
                "fee_divisor must be greater than 0".to_string(),
            ));
        }
        self.timeouts.validate()
    }
}
