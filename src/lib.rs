//! NAV Valuer - portfolio valuation through on-chain DEX quotes
//!
//! Values ERC-20 holdings in a single denomination token by quoting every
//! candidate swap route in one Multicall3 batch and keeping the best per token.

pub mod cache;
pub mod config;
pub mod error;
pub mod multicall;
pub mod tokens;
pub mod valuation;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, ValuationError};
pub use multicall::{AlloyMulticallClient, BlockSelector, MulticallClient};
pub use tokens::{TokenCache, TokenDetails};
pub use valuation::{NetAssetValueCalculator, Portfolio, PortfolioValuation};
