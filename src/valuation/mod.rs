//! Net Asset Value valuation with multi-route DEX quotes
//!
//! ## Key Components
//!
//! - **ValuationQuoter**: per-DEX route generation, call building and decoding
//! - **fetch_quotes**: all candidate routes in one Multicall3 round trip
//! - **resolve_best_routes**: best quote per token, fail fast on unroutable tokens
//! - **NetAssetValueCalculator**: the whole pipeline over a `Portfolio`

mod batch;
mod calculator;
mod portfolio;
mod quoter;
mod resolver;
mod route;
pub mod uniswap_v2;
pub mod uniswap_v3;

pub use batch::{fetch_quotes, QuoteBook, QuoteRequest};
pub use calculator::{NetAssetValueCalculator, RouteDiagnostic};
pub use portfolio::{Portfolio, PortfolioValuation};
pub use quoter::{candidate_paths, ValuationQuoter};
pub use resolver::{resolve_best_routes, BestRoute};
pub use route::{Route, RouteKey};
pub use uniswap_v2::{UniswapV2Quoter, UNISWAP_V2_ROUTER};
pub use uniswap_v3::{UniswapV3Quoter, QUOTER_V2, UNIV3_FEE_TIERS};
