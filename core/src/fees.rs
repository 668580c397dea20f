// Protocol fee and relay tip. Amounts in milli-ETH.

use crate::ledger::LedgerError;
use crate::network::Chain;
use async_trait::async_trait;

/// Protocol fee is `amount / FEE_DIVISOR`, rounded down.
pub const FEE_DIVISOR: u64 = 128;

const WEI_PER_MILLI_ETH: u128 = 1_000_000_000_000_000;

pub fn protocol_fee(amount: u64, divisor: u64) -> u64 {
    amount / divisor.max(1)
}

/// Convert a wei gas cost into a tip in milli-ETH, rounding to nearest.
pub fn tip_from_wei(gas_cost_wei: u128) -> u64 {
    let tip = gas_cost_wei.saturating_add(WEI_PER_MILLI_ETH / 2) / WEI_PER_MILLI_ETH;
    u64::try_from(tip).unwrap_or(u64::MAX)
}

/// Render milli-ETH as ETH with three decimals.
pub fn format_eth(amount: u64) -> String {
    format!("{}.{:03}", amount / 1000, amount % 1000)
}

/// Estimates what the relay will pay in gas to broadcast a withdrawal.
#[async_trait]
pub trait GasOracle: Send + Sync {
    async fn withdrawal_gas_cost(&self, chain: Chain, data: &[u8]) -> Result<u128, LedgerError>;
}

/// Oracle returning a constant cost.
#[derive(Debug, Clone, Copy)]
pub struct FixedGasOracle(pub u128);

#[async_trait]
impl GasOracle for FixedGasOracle {
    async fn withdrawal_gas_cost(&self, _chain: Chain, _data: &[u8]) -> Result<u128, LedgerError> {
        Ok(self.0)
    }
}
