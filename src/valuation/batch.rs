//! Batch quote fetcher
//!
//! Packs every candidate route's quote call into one Multicall3 `aggregate3`
//! at a fixed block. A revert on one route only nulls that route's quote;
//! transport failures and malformed responses fail the whole fetch.

use alloy_primitives::U256;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

use super::quoter::ValuationQuoter;
use super::route::{Route, RouteKey};
use crate::error::{Result, ValuationError};
use crate::multicall::MulticallClient;

/// One route to quote, with the adapter that understands it
pub struct QuoteRequest<'a> {
    pub quoter: &'a dyn ValuationQuoter,
    pub route: Route,
    /// Raw source-token units to sell
    pub amount_in: U256,
}

/// Route quotes in generation order, addressable by `RouteKey`
#[derive(Debug, Clone, Default)]
pub struct QuoteBook {
    entries: Vec<(Route, Option<Decimal>)>,
    index: HashMap<RouteKey, usize>,
}

impl QuoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a quote. A repeated key overwrites the quote but keeps its position.
    pub fn insert(&mut self, route: Route, quote: Option<Decimal>) {
        let key = route.key();
        match self.index.get(&key) {
            Some(&i) => self.entries[i] = (route, quote),
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push((route, quote));
            }
        }
    }

    pub fn get(&self, key: &RouteKey) -> Option<Option<Decimal>> {
        self.index.get(key).map(|&i| self.entries[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Route, Option<Decimal>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Routes that produced a quote
    pub fn successful(&self) -> usize {
        self.entries.iter().filter(|(_, q)| q.is_some()).count()
    }
}

/// Quote every request in one batched round trip at `block_number`
pub async fn fetch_quotes(
    client: &dyn MulticallClient,
    requests: Vec<QuoteRequest<'_>>,
    block_number: u64,
) -> Result<QuoteBook> {
    if !client.supports_batching() {
        return Err(ValuationError::BatchingUnsupported);
    }

    let mut book = QuoteBook::new();
    if requests.is_empty() {
        return Ok(book);
    }

    let start = Instant::now();
    let calls = requests
        .iter()
        .map(|r| r.quoter.create_call(&r.route, r.amount_in))
        .collect();

    let results = client.aggregate3(calls, block_number).await?;
    if results.len() != requests.len() {
        return Err(ValuationError::decode(
            "quote batch",
            format!("expected {} results, got {}", requests.len(), results.len()),
        ));
    }

    for (request, result) in requests.into_iter().zip(results) {
        let quote = if !result.success {
            debug!("Route reverted: {} {:?}", request.route, request.route.path);
            None
        } else if result.returnData.is_empty() {
            // Nothing deployed at the quoter address on this chain
            debug!("Empty return data: {}", request.route);
            None
        } else {
            request
                .quoter
                .handle_onchain_return_value(&request.route, &result.returnData)?
        };

        book.insert(request.route, quote);
    }

    info!(
        "⚡ Quoted {} routes in {:?} ({} succeeded, block {})",
        book.len(),
        start.elapsed(),
        book.successful(),
        block_number
    );

    Ok(book)
}
