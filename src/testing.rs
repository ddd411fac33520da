//! In-memory chain for unit tests
//!
//! Decodes each Multicall3 sub-call by selector and answers from tables.
//! Unknown routes revert, same as a router with no pool.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{Result, ValuationError};
use crate::multicall::{IMulticall3, MulticallClient};
use crate::tokens::IERC20;
use crate::valuation::uniswap_v2::IUniswapV2Router02;
use crate::valuation::uniswap_v3::{encode_path, IQuoterV2};

/// `amount * 10^decimals`
pub fn raw(amount: u64, decimals: u8) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(decimals))
}

pub struct MockChain {
    tip: u64,
    batching: bool,
    failing: bool,
    tokens: HashMap<Address, (String, u8)>,
    balances: HashMap<(Address, Address), U256>,
    v2_quotes: HashMap<(Address, Vec<Address>), U256>,
    v3_quotes: HashMap<(Address, Bytes), U256>,
    v2_raw_returns: HashMap<(Address, Vec<Address>), Vec<u8>>,
    drop_last_result: bool,
    aggregate_calls: AtomicUsize,
    last_block: Mutex<Option<u64>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            tip: 1_000,
            batching: true,
            failing: false,
            tokens: HashMap::new(),
            balances: HashMap::new(),
            v2_quotes: HashMap::new(),
            v3_quotes: HashMap::new(),
            v2_raw_returns: HashMap::new(),
            drop_last_result: false,
            aggregate_calls: AtomicUsize::new(0),
            last_block: Mutex::new(None),
        }
    }

    pub fn with_tip(mut self, tip: u64) -> Self {
        self.tip = tip;
        self
    }

    pub fn without_batching(mut self) -> Self {
        self.batching = false;
        self
    }

    pub fn failing_transport(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn with_token(mut self, token: Address, symbol: &str, decimals: u8) -> Self {
        self.tokens.insert(token, (symbol.to_string(), decimals));
        self
    }

    pub fn with_balance(mut self, token: Address, owner: Address, amount: U256) -> Self {
        self.balances.insert((token, owner), amount);
        self
    }

    /// `getAmountsOut` on `router` along `path` returns `amount_out` as last element
    pub fn with_v2_quote(mut self, router: Address, path: Vec<Address>, amount_out: U256) -> Self {
        self.v2_quotes.insert((router, path), amount_out);
        self
    }

    /// `getAmountsOut` along `path` succeeds with exactly `data` as return bytes
    pub fn with_v2_raw_return(mut self, router: Address, path: Vec<Address>, data: Vec<u8>) -> Self {
        self.v2_raw_returns.insert((router, path), data);
        self
    }

    /// Answer every batch with one result fewer than calls
    pub fn dropping_last_result(mut self) -> Self {
        self.drop_last_result = true;
        self
    }

    pub fn with_v3_quote(
        mut self,
        quoter: Address,
        path: Vec<Address>,
        fees: Vec<u32>,
        amount_out: U256,
    ) -> Self {
        self.v3_quotes.insert((quoter, encode_path(&path, &fees)), amount_out);
        self
    }

    pub fn aggregate_count(&self) -> usize {
        self.aggregate_calls.load(Ordering::SeqCst)
    }

    pub fn last_block(&self) -> Option<u64> {
        *self.last_block.lock().unwrap()
    }

    fn answer(&self, call: &IMulticall3::Call3) -> Option<Vec<u8>> {
        let data = call.callData.as_ref();
        let selector: [u8; 4] = data.get(..4)?.try_into().ok()?;

        if selector == IERC20::decimalsCall::SELECTOR {
            let (_, decimals) = self.tokens.get(&call.target)?;
            Some((U256::from(*decimals),).abi_encode_params())
        } else if selector == IERC20::symbolCall::SELECTOR {
            let (symbol, _) = self.tokens.get(&call.target)?;
            Some((symbol.clone(),).abi_encode_params())
        } else if selector == IERC20::balanceOfCall::SELECTOR {
            let decoded = IERC20::balanceOfCall::abi_decode(data).ok()?;
            let amount = self.balances.get(&(call.target, decoded.account))?;
            Some((*amount,).abi_encode_params())
        } else if selector == IUniswapV2Router02::getAmountsOutCall::SELECTOR {
            let decoded = IUniswapV2Router02::getAmountsOutCall::abi_decode(data).ok()?;
            if let Some(raw) = self.v2_raw_returns.get(&(call.target, decoded.path.clone())) {
                return Some(raw.clone());
            }
            let amount_out = self.v2_quotes.get(&(call.target, decoded.path.clone()))?;
            let mut amounts = vec![decoded.amountIn; decoded.path.len() - 1];
            amounts.push(*amount_out);
            Some((amounts,).abi_encode_params())
        } else if selector == IQuoterV2::quoteExactInputCall::SELECTOR {
            let decoded = IQuoterV2::quoteExactInputCall::abi_decode(data).ok()?;
            let amount_out = self.v3_quotes.get(&(call.target, decoded.path))?;
            // Empty tick lists encode the same for any element type
            Some(
                (
                    *amount_out,
                    Vec::<U256>::new(),
                    Vec::<U256>::new(),
                    U256::from(100_000u64),
                )
                    .abi_encode_params(),
            )
        } else {
            None
        }
    }
}

#[async_trait]
impl MulticallClient for MockChain {
    fn supports_batching(&self) -> bool {
        self.batching
    }

    async fn aggregate3(
        &self,
        calls: Vec<IMulticall3::Call3>,
        block_number: u64,
    ) -> Result<Vec<IMulticall3::Result>> {
        if self.failing {
            return Err(ValuationError::Transport("connection refused".to_string()));
        }

        self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_block.lock().unwrap() = Some(block_number);

        let mut results: Vec<IMulticall3::Result> = calls
            .iter()
            .map(|call| match self.answer(call) {
                Some(data) => IMulticall3::Result {
                    success: true,
                    returnData: data.into(),
                },
                None => IMulticall3::Result {
                    success: false,
                    returnData: Bytes::new(),
                },
            })
            .collect();

        if self.drop_last_result {
            results.pop();
        }
        Ok(results)
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.tip)
    }
}
