//! DEX quoter adapters
//!
//! Each adapter knows how to enumerate candidate routes on its DEX, build the
//! read-only quote call for a route, and turn the raw return bytes into an
//! amount of the target token.

use alloy_primitives::{Address, U256};
use rust_decimal::Decimal;

use super::route::Route;
use crate::error::Result;
use crate::multicall::IMulticall3;
use crate::tokens::TokenDetails;

pub trait ValuationQuoter: Send + Sync {
    /// Name used in routing hints and diagnostics, e.g. `uniswap-v2`
    fn dex_name(&self) -> &str;

    /// Contract that receives the quote calls
    fn contract(&self) -> Address;

    /// Lazy sequence of candidate routes: the direct path first, then one
    /// three-hop path per intermediary in iteration order.
    ///
    /// Yields nothing when source and target are the same token.
    fn generate_routes<'a>(
        &'a self,
        source: &'a TokenDetails,
        target: &'a TokenDetails,
        intermediaries: &'a [TokenDetails],
    ) -> Box<dyn Iterator<Item = Route> + 'a>;

    /// Read-only quote call selling `amount_in` raw source units along `route`
    fn create_call(&self, route: &Route, amount_in: U256) -> IMulticall3::Call3;

    /// Decode a successful call's return data into target-token units.
    ///
    /// `Ok(None)` means the call carried no quote; malformed data is an error.
    fn handle_onchain_return_value(&self, route: &Route, data: &[u8]) -> Result<Option<Decimal>>;
}

/// Token paths shared by all adapters: `[source, target]`, then
/// `[source, mid, target]` per usable intermediary.
pub fn candidate_paths<'a>(
    source: &'a TokenDetails,
    target: &'a TokenDetails,
    intermediaries: &'a [TokenDetails],
) -> Box<dyn Iterator<Item = Vec<Address>> + 'a> {
    if source.address == target.address {
        return Box::new(std::iter::empty());
    }

    let direct = std::iter::once(vec![source.address, target.address]);
    let three_hop = intermediaries
        .iter()
        .filter(move |mid| mid.address != source.address && mid.address != target.address)
        .map(move |mid| vec![source.address, mid.address, target.address]);

    Box::new(direct.chain(three_hop))
}
