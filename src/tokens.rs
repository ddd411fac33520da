//! Token metadata
//!
//! - `TokenDetails`: address, symbol, decimals and raw <-> decimal conversion
//! - `TokenCache`: TTL cache in front of a batched `decimals()`/`symbol()` fetch
//! - Well-known mainnet tokens for config defaults

use alloy_primitives::{address, Address, U256};
use alloy_sol_types::{sol, SolCall};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::error::{Result, ValuationError};
use crate::multicall::{tolerant_call, MulticallClient};

sol! {
    #[allow(missing_docs)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string memory);
        function balanceOf(address account) external view returns (uint256);
    }
}

/// Largest mantissa `rust_decimal` can hold (2^96 - 1)
const MAX_DECIMAL_MANTISSA: u128 = 79_228_162_514_264_337_593_543_950_335;

/// Largest scale `rust_decimal` can hold
const MAX_DECIMAL_SCALE: u32 = 28;

// ============================================
// TOKEN DETAILS
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenDetails {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenDetails {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
        }
    }

    /// Raw on-chain amount to human units.
    ///
    /// Exact while the value fits a 96-bit mantissa; beyond that trailing
    /// digits are dropped until it does.
    pub fn convert_to_decimals(&self, raw: U256) -> Result<Decimal> {
        let mut value = raw;
        let mut scale = self.decimals as u32;
        let max_mantissa = U256::from(MAX_DECIMAL_MANTISSA);
        let ten = U256::from(10u64);

        while scale > MAX_DECIMAL_SCALE || (value > max_mantissa && scale > 0) {
            value /= ten;
            scale -= 1;
        }

        if value > max_mantissa {
            return Err(ValuationError::Conversion(format!(
                "{} raw {} exceeds decimal range",
                self.symbol, raw
            )));
        }

        Decimal::try_from_i128_with_scale(value.to::<u128>() as i128, scale)
            .map_err(|e| ValuationError::Conversion(e.to_string()))
    }

    /// Human units to raw on-chain amount. Excess fractional digits are truncated.
    pub fn convert_to_raw(&self, amount: Decimal) -> Result<U256> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ValuationError::Conversion(format!(
                "negative amount {} {}",
                amount, self.symbol
            )));
        }

        let mantissa = U256::from(amount.mantissa().unsigned_abs());
        let scale = amount.scale();
        let decimals = self.decimals as u32;
        let ten = U256::from(10u64);

        let overflow = || ValuationError::Conversion(format!("{} {} overflows", amount, self.symbol));
        let raw = if decimals >= scale {
            let factor = ten.checked_pow(U256::from(decimals - scale)).ok_or_else(overflow)?;
            mantissa.checked_mul(factor).ok_or_else(overflow)?
        } else {
            mantissa / ten.pow(U256::from(scale - decimals))
        };

        Ok(raw)
    }

    /// Short address form when no symbol is known
    pub fn short_address(address: &Address) -> String {
        let full = format!("{:?}", address);
        format!("{}...", &full[..8])
    }
}

impl std::fmt::Display for TokenDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

// ============================================
// WELL-KNOWN TOKENS (Ethereum Mainnet)
// ============================================

pub const WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
pub const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
pub const USDT: Address = address!("dAC17F958D2ee523a2206206994597C13D831ec7");
pub const DAI: Address = address!("6B175474E89094C44Da98b954EedcdeCB5BE3830");
pub const WBTC: Address = address!("2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599");

pub fn known_tokens() -> Vec<TokenDetails> {
    vec![
        TokenDetails::new(WETH, "WETH", 18),
        TokenDetails::new(USDC, "USDC", 6),
        TokenDetails::new(USDT, "USDT", 6),
        TokenDetails::new(DAI, "DAI", 18),
        TokenDetails::new(WBTC, "WBTC", 8),
    ]
}

// ============================================
// TOKEN CACHE
// ============================================

/// Token details behind a TTL cache.
///
/// Missing entries are fetched together in one multicall.
pub struct TokenCache {
    cache: TtlCache<Address, TokenDetails>,
}

impl TokenCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(ttl),
        }
    }

    /// Cache pre-filled with `known_tokens()`
    pub fn with_known_tokens(ttl: Duration) -> Self {
        let cache = Self::new(ttl);
        for token in known_tokens() {
            cache.insert(token);
        }
        cache
    }

    pub fn insert(&self, token: TokenDetails) {
        self.cache.insert(token.address, token);
    }

    pub fn get(&self, address: &Address) -> Option<TokenDetails> {
        self.cache.get(address)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Details for every address, fetching the uncached ones at `block_number`
    pub async fn fetch_many(
        &self,
        client: &dyn MulticallClient,
        addresses: &[Address],
        block_number: u64,
    ) -> Result<HashMap<Address, TokenDetails>> {
        let evicted = self.cache.purge_expired();
        if evicted > 0 {
            debug!("Evicted {} expired token details", evicted);
        }

        let mut found = HashMap::new();
        let mut missing = Vec::new();

        for address in addresses {
            match self.cache.get(address) {
                Some(details) => {
                    found.insert(*address, details);
                }
                None if !missing.contains(address) => missing.push(*address),
                None => {}
            }
        }

        if missing.is_empty() {
            return Ok(found);
        }

        debug!("Fetching token details for {} uncached tokens", missing.len());

        let calls = missing
            .iter()
            .flat_map(|address| {
                [
                    tolerant_call(*address, IERC20::decimalsCall {}),
                    tolerant_call(*address, IERC20::symbolCall {}),
                ]
            })
            .collect();

        let results = client.aggregate3(calls, block_number).await?;
        if results.len() != missing.len() * 2 {
            return Err(ValuationError::decode(
                "token details",
                format!("expected {} results, got {}", missing.len() * 2, results.len()),
            ));
        }

        for (i, address) in missing.iter().enumerate() {
            let decimals_result = &results[i * 2];
            let symbol_result = &results[i * 2 + 1];

            let decimals = if decimals_result.success {
                IERC20::decimalsCall::abi_decode_returns(&decimals_result.returnData).ok()
            } else {
                None
            };
            let decimals = decimals.ok_or(ValuationError::UnknownToken(*address))?;

            let symbol = if symbol_result.success {
                IERC20::symbolCall::abi_decode_returns(&symbol_result.returnData).ok()
            } else {
                None
            };
            let symbol = symbol.unwrap_or_else(|| {
                warn!("No symbol() for {:?}", address);
                TokenDetails::short_address(address)
            });

            let details = TokenDetails::new(*address, symbol, decimals);
            self.insert(details.clone());
            found.insert(*address, details);
        }

        Ok(found)
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::cache::DEFAULT_TTL_SECS))
    }
}
