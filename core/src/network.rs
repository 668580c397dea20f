// Supported chains

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    Ethereum,
    OpMainnet,
    Base,
    ArbitrumOne,
}

impl Chain {
    pub const ALL: [Chain; 4] = [
        Chain::Ethereum,
        Chain::OpMainnet,
        Chain::Base,
        Chain::ArbitrumOne,
    ];

    pub fn from_id(chain_id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|chain| chain.id() == chain_id)
    }

    pub fn id(&self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::OpMainnet => 10,
            Chain::Base => 8453,
            Chain::ArbitrumOne => 42161,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "Ethereum",
            Chain::OpMainnet => "OP Mainnet",
            Chain::Base => "Base",
            Chain::ArbitrumOne => "Arbitrum One",
        }
    }

    /// Message the wallet signs to log in on this chain.
    pub fn login_message(&self) -> &'static str {
        match self {
            Chain::Ethereum => "Log into your Rime account on mainnet Ethereum.",
            Chain::OpMainnet => "Log into your Rime account on OP Mainnet.",
            Chain::Base => "Log into your Rime account on Base.",
            Chain::ArbitrumOne => "Log into your Rime account on Arbitrum One.",
        }
    }

    pub fn relay_endpoint(&self) -> String {
        crate::relay::withdrawal_endpoint(self.id())
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_table() {
        assert_eq!(Chain::from_id(1), Some(Chain::Ethereum));
        assert_eq!(Chain::from_id(10), Some(Chain::OpMainnet));
        assert_eq!(Chain::from_id(8453), Some(Chain::Base));
        assert_eq!(Chain::from_id(42161), Some(Chain::ArbitrumOne));
        assert_eq!(Chain::from_id(5), None);
    }

    #[test]
    fn test_relay_endpoint() {
        assert_eq!(Chain::ArbitrumOne.relay_endpoint(), "withdrawal42161");
        assert_eq!(Chain::Base.to_string(), "Base");
    }
}
