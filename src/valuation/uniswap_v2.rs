//! Uniswap V2 style quoter
//!
//! Quotes via the router's `getAmountsOut(amountIn, path)`. Works for every
//! V2 fork that keeps the Router02 interface (Sushi, Pancake, ...).

use alloy_primitives::{address, Address, U256};
use alloy_sol_types::{sol, SolCall};
use rust_decimal::Decimal;

use super::quoter::{candidate_paths, ValuationQuoter};
use super::route::Route;
use crate::error::{Result, ValuationError};
use crate::multicall::{tolerant_call, IMulticall3};
use crate::tokens::TokenDetails;

sol! {
    #[derive(Debug)]
    interface IUniswapV2Router02 {
        function getAmountsOut(uint256 amountIn, address[] calldata path)
            external view returns (uint256[] memory amounts);
    }
}

/// Uniswap V2 Router02 on Ethereum mainnet
pub const UNISWAP_V2_ROUTER: Address = address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D");

pub struct UniswapV2Quoter {
    router: Address,
    dex_name: String,
}

impl UniswapV2Quoter {
    pub fn new(router: Address) -> Self {
        Self::with_name(router, "uniswap-v2")
    }

    /// A V2 fork under its own routing hint name
    pub fn with_name(router: Address, dex_name: impl Into<String>) -> Self {
        Self {
            router,
            dex_name: dex_name.into(),
        }
    }
}

impl ValuationQuoter for UniswapV2Quoter {
    fn dex_name(&self) -> &str {
        &self.dex_name
    }

    fn contract(&self) -> Address {
        self.router
    }

    fn generate_routes<'a>(
        &'a self,
        source: &'a TokenDetails,
        target: &'a TokenDetails,
        intermediaries: &'a [TokenDetails],
    ) -> Box<dyn Iterator<Item = Route> + 'a> {
        Box::new(
            candidate_paths(source, target, intermediaries).map(move |path| Route {
                source_token: source.clone(),
                target_token: target.clone(),
                quoter: self.contract(),
                dex: self.dex_name.clone(),
                path,
                fees: Vec::new(),
            }),
        )
    }

    fn create_call(&self, route: &Route, amount_in: U256) -> IMulticall3::Call3 {
        tolerant_call(
            self.router,
            IUniswapV2Router02::getAmountsOutCall {
                amountIn: amount_in,
                path: route.path.clone(),
            },
        )
    }

    fn handle_onchain_return_value(&self, route: &Route, data: &[u8]) -> Result<Option<Decimal>> {
        let amounts = IUniswapV2Router02::getAmountsOutCall::abi_decode_returns(data)
            .map_err(|e| ValuationError::decode(format!("getAmountsOut for {}", route), e))?;

        match amounts.last() {
            Some(amount_out) => route.target_token.convert_to_decimals(*amount_out).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{USDC, WBTC, WETH};
    use alloy_sol_types::SolValue;
    use rust_decimal_macros::dec;

    fn tokens() -> (TokenDetails, TokenDetails, Vec<TokenDetails>) {
        (
            TokenDetails::new(WBTC, "WBTC", 8),
            TokenDetails::new(USDC, "USDC", 6),
            vec![TokenDetails::new(WETH, "WETH", 18)],
        )
    }

    #[test]
    fn test_generate_routes() {
        let quoter = UniswapV2Quoter::new(UNISWAP_V2_ROUTER);
        let (wbtc, usdc, mids) = tokens();

        let routes: Vec<_> = quoter.generate_routes(&wbtc, &usdc, &mids).collect();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].path, vec![WBTC, USDC]);
        assert_eq!(routes[1].path, vec![WBTC, WETH, USDC]);
        assert!(routes.iter().all(|r| r.quoter == UNISWAP_V2_ROUTER && r.fees.is_empty()));
    }

    #[test]
    fn test_create_call_encodes_path() {
        let quoter = UniswapV2Quoter::new(UNISWAP_V2_ROUTER);
        let (wbtc, usdc, mids) = tokens();
        let route = quoter.generate_routes(&wbtc, &usdc, &mids).nth(1).unwrap();

        let call = quoter.create_call(&route, U256::from(100_000_000u64));
        assert_eq!(call.target, UNISWAP_V2_ROUTER);
        assert!(call.allowFailure);

        let decoded = IUniswapV2Router02::getAmountsOutCall::abi_decode(&call.callData).unwrap();
        assert_eq!(decoded.amountIn, U256::from(100_000_000u64));
        assert_eq!(decoded.path, vec![WBTC, WETH, USDC]);
    }

    #[test]
    fn test_return_value_takes_last_amount() {
        let quoter = UniswapV2Quoter::new(UNISWAP_V2_ROUTER);
        let (wbtc, usdc, mids) = tokens();
        let route = quoter.generate_routes(&wbtc, &usdc, &mids).nth(1).unwrap();

        let amounts = vec![
            U256::from(100_000_000u64),
            U256::from(30u64) * U256::from(10u64).pow(U256::from(18)),
            U256::from(95_000_000_000u64),
        ];
        let data = (amounts,).abi_encode_params();

        let value = quoter.handle_onchain_return_value(&route, &data).unwrap();
        assert_eq!(value, Some(dec!(95000)));
    }

    #[test]
    fn test_malformed_return_value_is_error() {
        let quoter = UniswapV2Quoter::new(UNISWAP_V2_ROUTER);
        let (wbtc, usdc, mids) = tokens();
        let route = quoter.generate_routes(&wbtc, &usdc, &mids).next().unwrap();

        let err = quoter.handle_onchain_return_value(&route, &[0xde, 0xad]).unwrap_err();
        assert!(matches!(err, ValuationError::Decode { .. }));
    }
}
