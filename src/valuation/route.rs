//! Swap routes and their map key

use alloy_primitives::Address;

use crate::tokens::TokenDetails;

/// Explicit identity of a route: source token, path (with pool fees) and quoting contract
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub source_token: Address,
    pub path: Vec<Address>,
    pub fees: Vec<u32>,
    pub quoter: Address,
}

/// One candidate way to sell `source_token` for `target_token` on one DEX
#[derive(Debug, Clone)]
pub struct Route {
    pub source_token: TokenDetails,
    pub target_token: TokenDetails,
    /// Contract the quote call goes to (router or quoter)
    pub quoter: Address,
    pub dex: String,
    /// Full token path, source first and target last
    pub path: Vec<Address>,
    /// Pool fee per hop, empty for fee-less path encodings
    pub fees: Vec<u32>,
}

impl Route {
    pub fn key(&self) -> RouteKey {
        RouteKey {
            source_token: self.source_token.address,
            path: self.path.clone(),
            fees: self.fees.clone(),
            quoter: self.quoter,
        }
    }

    pub fn hop_count(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    pub fn is_direct(&self) -> bool {
        self.hop_count() == 1
    }

    /// Human readable path, e.g. `WBTC -> WETH -> USDC`
    pub fn describe(&self, intermediaries: &[TokenDetails]) -> String {
        self.path
            .iter()
            .map(|address| {
                if *address == self.source_token.address {
                    self.source_token.symbol.clone()
                } else if *address == self.target_token.address {
                    self.target_token.symbol.clone()
                } else {
                    intermediaries
                        .iter()
                        .find(|t| t.address == *address)
                        .map(|t| t.symbol.clone())
                        .unwrap_or_else(|| TokenDetails::short_address(address))
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}->{} ({} hops)",
            self.dex,
            self.source_token.symbol,
            self.target_token.symbol,
            self.hop_count()
        )
    }
}
