//! Net Asset Value Calculator
//!
//! Values a portfolio by what every holding would fetch if market-sold into
//! the denomination token right now.
//!
//! PIPELINE (single linear pass, no retries):
//! 1. Resolve the block all reads are pinned to
//! 2. Resolve token details (cache first, one multicall for the rest)
//! 3. Generate candidate routes per token per quoter
//! 4. Quote every route in one batched multicall
//! 5. Pick the best route per token
//! 6. Assemble the valuation, denomination token at face value

use alloy_primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::batch::{fetch_quotes, QuoteBook, QuoteRequest};
use super::portfolio::{Portfolio, PortfolioValuation};
use super::quoter::ValuationQuoter;
use super::resolver::resolve_best_routes;
use crate::error::{Result, ValuationError};
use crate::multicall::{BlockSelector, MulticallClient, DEFAULT_BLOCK_LAG};
use crate::tokens::{TokenCache, TokenDetails};

/// One row of the route debugging table
#[derive(Debug, Clone, Serialize)]
pub struct RouteDiagnostic {
    pub token: Address,
    pub symbol: String,
    pub dex: String,
    pub path: String,
    pub amount_in: Decimal,
    pub quote: Option<Decimal>,
    pub best: bool,
}

pub struct NetAssetValueCalculator {
    client: Arc<dyn MulticallClient>,
    denomination_token: TokenDetails,
    intermediary_tokens: Vec<TokenDetails>,
    quoters: Vec<Box<dyn ValuationQuoter>>,
    tokens: Arc<TokenCache>,
    block: BlockSelector,
    block_lag: u64,
}

impl NetAssetValueCalculator {
    pub fn new(
        client: Arc<dyn MulticallClient>,
        denomination_token: TokenDetails,
        intermediary_tokens: Vec<TokenDetails>,
        quoters: Vec<Box<dyn ValuationQuoter>>,
        tokens: Arc<TokenCache>,
    ) -> Self {
        tokens.insert(denomination_token.clone());
        for token in &intermediary_tokens {
            tokens.insert(token.clone());
        }

        Self {
            client,
            denomination_token,
            intermediary_tokens,
            quoters,
            tokens,
            block: BlockSelector::default(),
            block_lag: DEFAULT_BLOCK_LAG,
        }
    }

    pub fn with_block(mut self, block: BlockSelector) -> Self {
        self.block = block;
        self
    }

    pub fn with_block_lag(mut self, block_lag: u64) -> Self {
        self.block_lag = block_lag;
        self
    }

    pub fn denomination_token(&self) -> &TokenDetails {
        &self.denomination_token
    }

    pub fn intermediary_tokens(&self) -> &[TokenDetails] {
        &self.intermediary_tokens
    }

    pub fn quoters(&self) -> impl Iterator<Item = &dyn ValuationQuoter> {
        self.quoters.iter().map(|q| q.as_ref())
    }

    pub fn client(&self) -> &dyn MulticallClient {
        self.client.as_ref()
    }

    pub fn token_cache(&self) -> &TokenCache {
        &self.tokens
    }

    pub async fn resolve_block(&self) -> Result<u64> {
        self.block.resolve(self.client.as_ref(), self.block_lag).await
    }

    /// Quoters a token may route through, honouring the portfolio's DEX hints
    fn quoters_for<'a>(
        &'a self,
        portfolio: &'a Portfolio,
        token: &'a Address,
    ) -> impl Iterator<Item = &'a dyn ValuationQuoter> + 'a {
        let hint = portfolio.dex_hint(token);
        self.quoters
            .iter()
            .map(|q| q.as_ref())
            .filter(move |q| match hint {
                Some(dexes) => dexes.iter().any(|d| d.as_str() == q.dex_name()),
                None => true,
            })
    }

    /// Tokens that need routing: non-denomination, non-zero balance
    async fn routable_tokens(
        &self,
        portfolio: &Portfolio,
        block_number: u64,
    ) -> Result<Vec<(TokenDetails, Decimal)>> {
        let addresses: Vec<Address> = portfolio
            .balances()
            .iter()
            .filter(|(token, amount)| **token != self.denomination_token.address && !amount.is_zero())
            .map(|(token, _)| *token)
            .collect();

        let details = self
            .tokens
            .fetch_many(self.client.as_ref(), &addresses, block_number)
            .await?;

        addresses
            .iter()
            .map(|address| {
                let token = details
                    .get(address)
                    .cloned()
                    .ok_or(ValuationError::UnknownToken(*address))?;
                let amount = portfolio.balance(address).unwrap_or(Decimal::ZERO);
                Ok((token, amount))
            })
            .collect()
    }

    /// Candidate routes for every routable token, in generation order
    pub fn generate_routes_for_portfolio<'a>(
        &'a self,
        portfolio: &'a Portfolio,
        holdings: &'a [(TokenDetails, Decimal)],
    ) -> Result<Vec<QuoteRequest<'a>>> {
        let mut requests = Vec::new();

        for (token, amount) in holdings {
            let amount_in: U256 = token.convert_to_raw(*amount)?;
            let before = requests.len();

            for quoter in self.quoters_for(portfolio, &token.address) {
                for route in
                    quoter.generate_routes(token, &self.denomination_token, &self.intermediary_tokens)
                {
                    requests.push(QuoteRequest {
                        quoter,
                        route,
                        amount_in,
                    });
                }
            }

            debug!("{}: {} candidate routes", token.symbol, requests.len() - before);
        }

        Ok(requests)
    }

    async fn fetch_onchain_quotes(
        &self,
        portfolio: &Portfolio,
        block_number: u64,
    ) -> Result<(Vec<(TokenDetails, Decimal)>, QuoteBook)> {
        let holdings = self.routable_tokens(portfolio, block_number).await?;
        let requests = self.generate_routes_for_portfolio(portfolio, &holdings)?;
        let book = fetch_quotes(self.client.as_ref(), requests, block_number).await?;
        Ok((holdings, book))
    }

    /// Market-sell value of every holding, fails if any token cannot be routed
    pub async fn calculate_market_sell_nav(&self, portfolio: &Portfolio) -> Result<PortfolioValuation> {
        let block_number = self.resolve_block().await?;

        info!(
            "Valuing {} tokens in {} at block {} ({} quoters, {} intermediaries)",
            portfolio.len(),
            self.denomination_token.symbol,
            block_number,
            self.quoters.len(),
            self.intermediary_tokens.len()
        );

        let (holdings, book) = self.fetch_onchain_quotes(portfolio, block_number).await?;
        let required: Vec<TokenDetails> = holdings.iter().map(|(t, _)| t.clone()).collect();
        let best = resolve_best_routes(&required, &book)?;

        let mut spot_valuations = BTreeMap::new();
        for (token, amount) in portfolio.balances() {
            let value = if *token == self.denomination_token.address || amount.is_zero() {
                *amount
            } else {
                best.get(token)
                    .map(|b| b.amount)
                    .ok_or(ValuationError::UnknownToken(*token))?
            };
            spot_valuations.insert(*token, value);
        }

        let valuation =
            PortfolioValuation::new(self.denomination_token.clone(), block_number, spot_valuations);

        info!(
            "💰 NAV: {} {} at block {}",
            valuation.total(),
            self.denomination_token.symbol,
            block_number
        );

        Ok(valuation)
    }

    /// Every candidate route with its quote, flagging the winners.
    ///
    /// Does not fail on unroutable tokens; they show up with no best row.
    pub async fn route_diagnostics(&self, portfolio: &Portfolio) -> Result<Vec<RouteDiagnostic>> {
        let block_number = self.resolve_block().await?;
        let (holdings, book) = self.fetch_onchain_quotes(portfolio, block_number).await?;

        // Resolve per token so one dead token does not hide the others
        let mut winners = BTreeMap::new();
        for (token, _) in &holdings {
            if let Ok(best) = resolve_best_routes(std::slice::from_ref(token), &book) {
                winners.extend(best.into_iter().map(|(address, b)| (address, b.route.key())));
            }
        }

        let rows = book
            .iter()
            .map(|(route, quote)| {
                let token = route.source_token.address;
                RouteDiagnostic {
                    token,
                    symbol: route.source_token.symbol.clone(),
                    dex: route.dex.clone(),
                    path: route.describe(&self.intermediary_tokens),
                    amount_in: portfolio.balance(&token).unwrap_or(Decimal::ZERO),
                    quote: *quote,
                    best: winners.get(&token) == Some(&route.key()),
                }
            })
            .collect();

        Ok(rows)
    }
}
