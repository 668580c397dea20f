//! Relay wire format: the JSON body posted to a relay and its replies

use crate::ledger::TxHash;
use crate::withdraw::WithdrawalPayload;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Path segment for a chain's withdrawal endpoint.
pub fn withdrawal_endpoint(chain_id: u64) -> String {
    format!("withdrawal{}", chain_id)
}

fn hex32(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn hex_bytes(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Body of `POST {relay}/{endpoint}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalBody {
    #[serde(rename = "Y")]
    pub y: Vec<String>,
    #[serde(rename = "C")]
    pub c: Vec<String>,
    #[serde(rename = "D")]
    pub d: String,
    pub u: String,
    pub epoch: u64,
    pub tip: u64,
    pub proof: String,
    pub destination: String,
    pub data: String,
    pub amount: u64,
}

impl From<&WithdrawalPayload> for WithdrawalBody {
    fn from(payload: &WithdrawalPayload) -> Self {
        Self {
            y: payload.y.iter().map(hex32).collect(),
            c: payload.c.iter().map(hex32).collect(),
            d: hex32(&payload.d),
            u: hex32(&payload.u),
            epoch: payload.epoch,
            tip: payload.tip,
            proof: hex_bytes(&payload.proof),
            destination: payload.destination.to_string(),
            data: hex_bytes(&payload.data),
            amount: payload.amount,
        }
    }
}

/// Successful relay reply: the hash of the broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReceipt {
    pub hash: TxHash,
}

/// Why a relay refused a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    TipTooLow,
    WrongEpoch,
    Undisclosed(String),
}

impl RejectionReason {
    /// Classify the body text of a non-success relay response.
    pub fn parse(body: &str) -> Self {
        let text = body.trim();
        if text.contains("Tip too low") {
            Self::TipTooLow
        } else if text.contains("Wrong epoch") {
            Self::WrongEpoch
        } else {
            Self::Undisclosed(text.to_string())
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::TipTooLow => "The relay rejected the withdrawal because gas prices rose \
                 while the proof was being built. Please try again."
                .to_string(),
            Self::WrongEpoch => "The relay rejected the withdrawal because an epoch boundary \
                 passed while the proof was being built. Please try again."
                .to_string(),
            Self::Undisclosed(_) => "The relay rejected the withdrawal for an unexpected \
                 reason. Please contact support."
                .to_string(),
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TipTooLow => f.write_str("tip too low"),
            Self::WrongEpoch => f.write_str("wrong epoch"),
            Self::Undisclosed(reason) => write!(f, "undisclosed ({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Address;

    fn payload() -> WithdrawalPayload {
        WithdrawalPayload {
            y: vec![[1u8; 32], [2u8; 32]],
            c: vec![[3u8; 32], [4u8; 32]],
            d: [5u8; 32],
            u: [6u8; 32],
            epoch: 9,
            tip: 2,
            proof: vec![0xca, 0xfe],
            destination: Address([0xaa; 20]),
            data: vec![],
            amount: 40,
        }
    }

    #[test]
    fn test_body_field_names() {
        let body = WithdrawalBody::from(&payload());
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["Y"][1], format!("0x{}", "02".repeat(32)));
        assert_eq!(json["C"].as_array().unwrap().len(), 2);
        assert_eq!(json["D"], format!("0x{}", "05".repeat(32)));
        assert_eq!(json["u"], format!("0x{}", "06".repeat(32)));
        assert_eq!(json["proof"], "0xcafe");
        assert_eq!(json["data"], "0x");
        assert_eq!(json["destination"], format!("0x{}", "aa".repeat(20)));
        assert_eq!(json["epoch"], 9);
        assert_eq!(json["amount"], 40);
    }

    #[test]
    fn test_parse_rejection_reason() {
        assert_eq!(RejectionReason::parse("Tip too low."), RejectionReason::TipTooLow);
        assert_eq!(
            RejectionReason::parse("  Wrong epoch  "),
            RejectionReason::WrongEpoch
        );
        assert_eq!(
            RejectionReason::parse("database on fire"),
            RejectionReason::Undisclosed("database on fire".to_string())
        );
    }

    #[test]
    fn test_receipt_parse() {
        let json = format!("{{\"hash\":\"0x{}\"}}", "0f".repeat(32));
        let receipt: RelayReceipt = serde_json::from_str(&json).unwrap();
        assert_eq!(receipt.hash, TxHash([0x0f; 32]));
    }

    #[test]
    fn test_endpoint_name() {
        assert_eq!(withdrawal_endpoint(10), "withdrawal10");
    }
}
