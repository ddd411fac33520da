//! Uniswap V3 quoter
//!
//! Quotes via QuoterV2 `quoteExactInput(bytes path, uint256 amountIn)`.
//! One adapter instance covers one fee tier, so route generation keeps the
//! direct + one three-hop per intermediary shape. Register several
//! instances to cover several tiers.

use alloy_primitives::{address, Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use rust_decimal::Decimal;

use super::quoter::{candidate_paths, ValuationQuoter};
use super::route::Route;
use crate::error::{Result, ValuationError};
use crate::multicall::{tolerant_call, IMulticall3};
use crate::tokens::TokenDetails;

sol! {
    #[derive(Debug)]
    interface IQuoterV2 {
        function quoteExactInput(bytes memory path, uint256 amountIn)
            external
            returns (
                uint256 amountOut,
                uint160[] memory sqrtPriceX96AfterList,
                uint32[] memory initializedTicksCrossedList,
                uint256 gasEstimate
            );
    }
}

/// Official Uniswap V3 QuoterV2 address on mainnet
pub const QUOTER_V2: Address = address!("61fFE014bA17989E743c5F6cB21bF9697530B21e");

/// Fee tiers deployed by the Uniswap V3 factory
pub const UNIV3_FEE_TIERS: &[u32] = &[100, 500, 3000, 10000];

pub struct UniswapV3Quoter {
    quoter: Address,
    fee: u32,
    dex_name: String,
}

impl UniswapV3Quoter {
    pub fn new(quoter: Address, fee: u32) -> Self {
        Self {
            quoter,
            fee,
            dex_name: "uniswap-v3".to_string(),
        }
    }

    pub fn with_name(mut self, dex_name: impl Into<String>) -> Self {
        self.dex_name = dex_name.into();
        self
    }

    pub fn fee(&self) -> u32 {
        self.fee
    }
}

/// Packed V3 path: `token (20) | fee (3) | token (20) | ...`
pub fn encode_path(tokens: &[Address], fees: &[u32]) -> Bytes {
    let mut encoded = Vec::with_capacity(tokens.len() * 20 + fees.len() * 3);
    for (i, token) in tokens.iter().enumerate() {
        encoded.extend_from_slice(token.as_slice());
        if let Some(fee) = fees.get(i) {
            encoded.extend_from_slice(&fee.to_be_bytes()[1..]);
        }
    }
    encoded.into()
}

impl ValuationQuoter for UniswapV3Quoter {
    fn dex_name(&self) -> &str {
        &self.dex_name
    }

    fn contract(&self) -> Address {
        self.quoter
    }

    fn generate_routes<'a>(
        &'a self,
        source: &'a TokenDetails,
        target: &'a TokenDetails,
        intermediaries: &'a [TokenDetails],
    ) -> Box<dyn Iterator<Item = Route> + 'a> {
        Box::new(
            candidate_paths(source, target, intermediaries).map(move |path| {
                let fees = vec![self.fee; path.len() - 1];
                Route {
                    source_token: source.clone(),
                    target_token: target.clone(),
                    quoter: self.contract(),
                    dex: self.dex_name.clone(),
                    path,
                    fees,
                }
            }),
        )
    }

    fn create_call(&self, route: &Route, amount_in: U256) -> IMulticall3::Call3 {
        tolerant_call(
            self.quoter,
            IQuoterV2::quoteExactInputCall {
                path: encode_path(&route.path, &route.fees),
                amountIn: amount_in,
            },
        )
    }

    fn handle_onchain_return_value(&self, route: &Route, data: &[u8]) -> Result<Option<Decimal>> {
        let decoded = IQuoterV2::quoteExactInputCall::abi_decode_returns(data)
            .map_err(|e| ValuationError::decode(format!("quoteExactInput for {}", route), e))?;

        route.target_token.convert_to_decimals(decoded.amountOut).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{USDC, WETH, WBTC};

    #[test]
    fn test_encode_path_packs_fees() {
        let path = encode_path(&[WBTC, WETH, USDC], &[3000, 500]);
        assert_eq!(path.len(), 20 * 3 + 3 * 2);
        assert_eq!(&path[..20], WBTC.as_slice());
        // 3000 = 0x000bb8
        assert_eq!(&path[20..23], &[0x00, 0x0b, 0xb8]);
        assert_eq!(&path[23..43], WETH.as_slice());
        // 500 = 0x0001f4
        assert_eq!(&path[43..46], &[0x00, 0x01, 0xf4]);
        assert_eq!(&path[46..], USDC.as_slice());
    }

    #[test]
    fn test_routes_carry_fee_per_hop() {
        let quoter = UniswapV3Quoter::new(QUOTER_V2, 500);
        let wbtc = TokenDetails::new(WBTC, "WBTC", 8);
        let usdc = TokenDetails::new(USDC, "USDC", 6);
        let mids = vec![TokenDetails::new(WETH, "WETH", 18)];

        let routes: Vec<_> = quoter.generate_routes(&wbtc, &usdc, &mids).collect();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].fees, vec![500]);
        assert_eq!(routes[1].fees, vec![500, 500]);

        // Different fee tier, different identity
        let other_tier = UniswapV3Quoter::new(QUOTER_V2, 3000);
        let other: Vec<_> = other_tier.generate_routes(&wbtc, &usdc, &mids).collect();
        assert_ne!(routes[0].key(), other[0].key());

        let call = quoter.create_call(&routes[1], U256::from(1u64));
        let decoded = IQuoterV2::quoteExactInputCall::abi_decode(&call.callData).unwrap();
        assert_eq!(decoded.path, encode_path(&[WBTC, WETH, USDC], &[500, 500]));
    }
}
