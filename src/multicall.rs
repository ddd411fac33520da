//! Multicall3 chain client
//!
//! Every read in a valuation goes through one `aggregate3` round trip,
//! pinned to a single block number.

use alloy_eips::BlockId;
use alloy_primitives::{address, Address};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{sol, SolCall};
use alloy_transport_http::reqwest::Url;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ValuationError};

// ============================================
// MULTICALL3 INTERFACE
// ============================================

sol! {
    /// Multicall3 - deployed at same address on all EVM chains
    #[derive(Debug)]
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external payable returns (Result[] memory returnData);
    }
}

/// Multicall3 address (same on all EVM chains)
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// How far behind the chain tip "almost latest" reads
pub const DEFAULT_BLOCK_LAG: u64 = 4;

// ============================================
// BLOCK SELECTION
// ============================================

/// Which block a valuation reads at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlockSelector {
    /// A few blocks behind the tip, out of reorg range
    #[default]
    AlmostLatest,
    Latest,
    Number(u64),
}

impl BlockSelector {
    /// Resolve to a concrete block number
    pub async fn resolve(&self, client: &dyn MulticallClient, lag: u64) -> Result<u64> {
        match self {
            BlockSelector::Number(n) => Ok(*n),
            BlockSelector::Latest => client.block_number().await,
            BlockSelector::AlmostLatest => {
                let tip = client.block_number().await?;
                Ok(tip.saturating_sub(lag).max(1))
            }
        }
    }
}

impl std::fmt::Display for BlockSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockSelector::AlmostLatest => write!(f, "almost-latest"),
            BlockSelector::Latest => write!(f, "latest"),
            BlockSelector::Number(n) => write!(f, "#{}", n),
        }
    }
}

// ============================================
// CHAIN CLIENT
// ============================================

/// Executes batched read-only contract calls
#[async_trait]
pub trait MulticallClient: Send + Sync {
    /// Whether calls can be batched into one round trip
    fn supports_batching(&self) -> bool {
        true
    }

    /// Run all calls at `block_number`. One result per call, same order.
    async fn aggregate3(
        &self,
        calls: Vec<IMulticall3::Call3>,
        block_number: u64,
    ) -> Result<Vec<IMulticall3::Result>>;

    async fn block_number(&self) -> Result<u64>;
}

/// Build a call that may revert without failing the batch
pub fn tolerant_call(target: Address, call: impl SolCall) -> IMulticall3::Call3 {
    IMulticall3::Call3 {
        target,
        allowFailure: true,
        callData: call.abi_encode().into(),
    }
}

/// Multicall3 over HTTP JSON-RPC
pub struct AlloyMulticallClient {
    rpc_url: String,
    multicall: Address,
}

impl AlloyMulticallClient {
    pub fn new(rpc_url: String) -> Self {
        Self {
            rpc_url,
            multicall: MULTICALL3,
        }
    }

    pub fn with_multicall_address(mut self, multicall: Address) -> Self {
        self.multicall = multicall;
        self
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    fn parsed_url(&self) -> Result<Url> {
        self.rpc_url
            .parse()
            .map_err(|e| ValuationError::Transport(format!("bad RPC url {}: {}", self.rpc_url, e)))
    }

    /// Is there code deployed at the Multicall3 address
    pub async fn multicall_deployed(&self) -> Result<bool> {
        let provider = ProviderBuilder::new().connect_http(self.parsed_url()?);
        let code = provider
            .get_code_at(self.multicall)
            .await
            .map_err(|e| ValuationError::Transport(e.to_string()))?;
        Ok(!code.is_empty())
    }
}

#[async_trait]
impl MulticallClient for AlloyMulticallClient {
    async fn aggregate3(
        &self,
        calls: Vec<IMulticall3::Call3>,
        block_number: u64,
    ) -> Result<Vec<IMulticall3::Result>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let call_count = calls.len();
        let provider = ProviderBuilder::new().connect_http(self.parsed_url()?);

        let calldata = IMulticall3::aggregate3Call { calls }.abi_encode();

        let tx = TransactionRequest::default()
            .to(self.multicall)
            .input(calldata.into());

        let result = provider
            .call(tx)
            .block(BlockId::number(block_number))
            .await
            .map_err(|e| ValuationError::Transport(format!("Multicall3 failed: {}", e)))?;

        let decoded = IMulticall3::aggregate3Call::abi_decode_returns(&result)
            .map_err(|e| ValuationError::decode("multicall result", e))?;

        if decoded.len() != call_count {
            return Err(ValuationError::decode(
                "multicall result",
                format!("expected {} results, got {}", call_count, decoded.len()),
            ));
        }

        debug!("Multicall3: {} calls at block {}", call_count, block_number);

        Ok(decoded)
    }

    async fn block_number(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().connect_http(self.parsed_url()?);
        provider
            .get_block_number()
            .await
            .map_err(|e| ValuationError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;

    #[tokio::test]
    async fn test_almost_latest_lags_tip() {
        let chain = MockChain::new().with_tip(1_000);

        let block = BlockSelector::AlmostLatest
            .resolve(&chain, DEFAULT_BLOCK_LAG)
            .await
            .unwrap();
        assert_eq!(block, 996);

        let latest = BlockSelector::Latest.resolve(&chain, DEFAULT_BLOCK_LAG).await.unwrap();
        assert_eq!(latest, 1_000);

        let fixed = BlockSelector::Number(42).resolve(&chain, DEFAULT_BLOCK_LAG).await.unwrap();
        assert_eq!(fixed, 42);
    }

    #[tokio::test]
    async fn test_almost_latest_never_below_one() {
        let chain = MockChain::new().with_tip(2);
        let block = BlockSelector::AlmostLatest.resolve(&chain, 4).await.unwrap();
        assert_eq!(block, 1);
    }

    #[tokio::test]
    async fn test_unreachable_rpc_is_transport_error() {
        // Nothing listens on port 1
        let client = AlloyMulticallClient::new("http://127.0.0.1:1".to_string());
        assert!(matches!(client.block_number().await, Err(ValuationError::Transport(_))));

        let calls = vec![tolerant_call(MULTICALL3, IMulticall3::aggregate3Call { calls: vec![] })];
        assert!(matches!(client.aggregate3(calls, 1).await, Err(ValuationError::Transport(_))));
    }

    #[test]
    fn test_bad_rpc_url_is_transport_error() {
        let client = AlloyMulticallClient::new("not a url".to_string());
        assert!(matches!(client.parsed_url(), Err(ValuationError::Transport(_))));
    }
}
