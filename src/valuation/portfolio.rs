//! Portfolio snapshots and their valuation

use alloy_primitives::Address;
use alloy_sol_types::SolCall;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::error::{Result, ValuationError};
use crate::multicall::{tolerant_call, MulticallClient};
use crate::tokens::{TokenDetails, IERC20};

/// ERC-20 balances held at one block
#[derive(Debug, Clone, Default, Serialize)]
pub struct Portfolio {
    balances: BTreeMap<Address, Decimal>,
    /// Per-token whitelist of DEX names to route through
    dex_hints: HashMap<Address, Vec<String>>,
}

impl Portfolio {
    pub fn new(balances: impl IntoIterator<Item = (Address, Decimal)>) -> Result<Self> {
        let mut portfolio = Self::default();
        for (token, amount) in balances {
            if amount.is_sign_negative() && !amount.is_zero() {
                return Err(ValuationError::NegativeBalance { token, amount });
            }
            portfolio.balances.insert(token, amount);
        }
        Ok(portfolio)
    }

    /// Restrict `token` to quoters with one of these DEX names
    pub fn with_dex_hint(mut self, token: Address, dexes: &[&str]) -> Self {
        self.dex_hints
            .insert(token, dexes.iter().map(|d| d.to_string()).collect());
        self
    }

    pub fn balances(&self) -> &BTreeMap<Address, Decimal> {
        &self.balances
    }

    pub fn balance(&self, token: &Address) -> Option<Decimal> {
        self.balances.get(token).copied()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Address> {
        self.balances.keys()
    }

    pub fn dex_hint(&self, token: &Address) -> Option<&[String]> {
        self.dex_hints.get(token).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// `balanceOf(owner)` for every token, in one multicall at `block_number`
    pub async fn fetch_balances(
        client: &dyn MulticallClient,
        owner: Address,
        tokens: &[TokenDetails],
        block_number: u64,
    ) -> Result<Self> {
        let calls = tokens
            .iter()
            .map(|t| tolerant_call(t.address, IERC20::balanceOfCall { account: owner }))
            .collect();

        let results = client.aggregate3(calls, block_number).await?;
        if results.len() != tokens.len() {
            return Err(ValuationError::decode(
                "balanceOf results",
                format!("expected {}, got {}", tokens.len(), results.len()),
            ));
        }

        let mut balances = Vec::with_capacity(tokens.len());
        for (token, result) in tokens.iter().zip(results.iter()) {
            if !result.success {
                return Err(ValuationError::decode(
                    format!("balanceOf for {}", token.symbol),
                    "call reverted",
                ));
            }
            let raw = IERC20::balanceOfCall::abi_decode_returns(&result.returnData)
                .map_err(|e| ValuationError::decode(format!("balanceOf for {}", token.symbol), e))?;
            let amount = token.convert_to_decimals(raw)?;
            debug!("{} balance: {}", token.symbol, amount);
            balances.push((token.address, amount));
        }

        Self::new(balances)
    }
}

/// Portfolio value in denomination-token units.
///
/// Amounts serialize as decimal strings so JSON output stays exact.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioValuation {
    pub denomination_token: TokenDetails,
    pub block_number: u64,
    pub valued_at: DateTime<Utc>,
    pub spot_valuations: BTreeMap<Address, Decimal>,
    total: Decimal,
}

impl PortfolioValuation {
    pub fn new(
        denomination_token: TokenDetails,
        block_number: u64,
        spot_valuations: BTreeMap<Address, Decimal>,
    ) -> Self {
        let total = spot_valuations.values().copied().sum();
        Self {
            denomination_token,
            block_number,
            valued_at: Utc::now(),
            spot_valuations,
            total,
        }
    }

    /// Sum of all entries
    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn get(&self, token: &Address) -> Option<Decimal> {
        self.spot_valuations.get(token).copied()
    }

    pub fn len(&self) -> usize {
        self.spot_valuations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spot_valuations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;
    use crate::tokens::{USDC, WETH};
    use alloy_primitives::U256;
    use rust_decimal_macros::dec;

    #[test]
    fn test_negative_balance_rejected() {
        let err = Portfolio::new([(USDC, dec!(-1))]).unwrap_err();
        assert!(matches!(err, ValuationError::NegativeBalance { token, .. } if token == USDC));
    }

    #[test]
    fn test_dex_hints() {
        let portfolio = Portfolio::new([(WETH, dec!(1))])
            .unwrap()
            .with_dex_hint(WETH, &["uniswap-v3"]);
        assert_eq!(portfolio.dex_hint(&WETH), Some(&["uniswap-v3".to_string()][..]));
        assert!(portfolio.dex_hint(&USDC).is_none());
    }

    #[test]
    fn test_valuation_total() {
        let valuation = PortfolioValuation::new(
            TokenDetails::new(USDC, "USDC", 6),
            1,
            BTreeMap::from([(WETH, dec!(1000)), (USDC, dec!(5))]),
        );
        assert_eq!(valuation.total(), dec!(1005));
        assert_eq!(valuation.get(&WETH), Some(dec!(1000)));
    }

    #[test]
    fn test_valuation_json_keeps_full_precision() {
        let valuation = PortfolioValuation::new(
            TokenDetails::new(USDC, "USDC", 6),
            1,
            BTreeMap::from([(WETH, dec!(12345678901234.123456))]),
        );

        let json = serde_json::to_value(&valuation).unwrap();
        assert_eq!(json["total"], "12345678901234.123456");
        let weth_key = format!("{:?}", WETH).to_lowercase();
        let entries = json["spot_valuations"].as_object().unwrap();
        let (key, value) = entries.iter().next().unwrap();
        assert_eq!(key.to_lowercase(), weth_key);
        assert_eq!(value, "12345678901234.123456");
    }

    #[tokio::test]
    async fn test_fetch_balances() {
        let owner = Address::repeat_byte(0xaa);
        let chain = MockChain::new()
            .with_balance(USDC, owner, U256::from(5_250_000u64))
            .with_balance(WETH, owner, U256::from(10u64).pow(U256::from(18)));

        let tokens = vec![
            TokenDetails::new(USDC, "USDC", 6),
            TokenDetails::new(WETH, "WETH", 18),
        ];
        let portfolio = Portfolio::fetch_balances(&chain, owner, &tokens, 100).await.unwrap();

        assert_eq!(portfolio.balance(&USDC), Some(dec!(5.25)));
        assert_eq!(portfolio.balance(&WETH), Some(dec!(1)));
        assert_eq!(chain.aggregate_count(), 1);
    }
}
