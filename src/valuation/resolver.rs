//! Best-route resolver
//!
//! Per source token, the strictly greatest quote wins. Equal quotes keep the
//! route seen first, which is generation order (direct before three-hop).

use alloy_primitives::Address;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::batch::QuoteBook;
use super::route::Route;
use crate::error::{Result, ValuationError};
use crate::tokens::TokenDetails;

/// Winning route for one token
#[derive(Debug, Clone)]
pub struct BestRoute {
    pub route: Route,
    pub amount: Decimal,
}

/// Pick the best route per token.
///
/// Every token in `required` must have at least one non-null quote in `book`,
/// otherwise the whole resolution fails with `NoRouteFound`.
pub fn resolve_best_routes(
    required: &[TokenDetails],
    book: &QuoteBook,
) -> Result<BTreeMap<Address, BestRoute>> {
    let mut best: BTreeMap<Address, BestRoute> = BTreeMap::new();
    let mut tried: HashMap<Address, usize> = HashMap::new();

    for (route, quote) in book.iter() {
        let token = route.source_token.address;
        *tried.entry(token).or_default() += 1;

        let Some(amount) = quote else {
            continue;
        };

        match best.get(&token) {
            Some(current) if *amount <= current.amount => {}
            _ => {
                best.insert(
                    token,
                    BestRoute {
                        route: route.clone(),
                        amount: *amount,
                    },
                );
            }
        }
    }

    for token in required {
        if !best.contains_key(&token.address) {
            return Err(ValuationError::NoRouteFound {
                token: token.address,
                symbol: token.symbol.clone(),
                routes_tried: tried.get(&token.address).copied().unwrap_or(0),
            });
        }
    }

    for (token, winner) in &best {
        debug!("Best route for {:?}: {} = {}", token, winner.route, winner.amount);
    }

    Ok(best)
}
