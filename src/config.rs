//! Configuration for the NAV valuer
//!
//! Loaded from environment variables (and `.env`), or from a TOML file.
//! Builds the chain client, quoters and calculator the binaries run with.

use alloy_primitives::Address;
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::DEFAULT_TTL_SECS;
use crate::multicall::{AlloyMulticallClient, BlockSelector, DEFAULT_BLOCK_LAG, MULTICALL3};
use crate::tokens::{TokenCache, TokenDetails, DAI, USDC, USDT, WBTC, WETH};
use crate::valuation::{
    NetAssetValueCalculator, UniswapV2Quoter, UniswapV3Quoter, ValuationQuoter, QUOTER_V2,
    UNISWAP_V2_ROUTER,
};

/// Uniswap v3 fees are packed into 3 bytes of the path
const MAX_V3_FEE: u32 = 1_000_000;

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // ========== Network Settings ==========
    /// JSON-RPC endpoint used for every read
    pub rpc_url: String,

    /// Chain ID (1 = Ethereum Mainnet)
    pub chain_id: u64,

    /// Multicall3 deployment
    pub multicall_address: Address,

    /// Blocks behind the tip for almost-latest reads
    pub block_lag: u64,

    // ========== Valuation Settings ==========
    /// Token every holding is valued in
    pub denomination_token: Address,

    /// Tokens allowed as the middle hop of a three-hop route
    pub intermediary_tokens: Vec<Address>,

    // ========== Quoters ==========
    /// Uniswap v2 style router, unset to disable
    pub uniswap_v2_router: Option<Address>,

    /// Uniswap v3 QuoterV2, unset to disable
    pub uniswap_v3_quoter: Option<Address>,

    /// One v3 quoter instance per fee tier
    pub uniswap_v3_fee_tiers: Vec<u32>,

    // ========== Caching ==========
    pub token_cache_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            // Network
            rpc_url: env::var("RPC_URL").unwrap_or(defaults.rpc_url),
            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),
            multicall_address: match env::var("MULTICALL3_ADDRESS") {
                Ok(s) => parse_address(&s)?,
                Err(_) => defaults.multicall_address,
            },
            block_lag: env::var("BLOCK_LAG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BLOCK_LAG),

            // Valuation
            denomination_token: match env::var("DENOMINATION_TOKEN") {
                Ok(s) => parse_address(&s)?,
                Err(_) => defaults.denomination_token,
            },
            intermediary_tokens: match env::var("INTERMEDIARY_TOKENS") {
                Ok(s) => parse_address_list(&s)?,
                Err(_) => defaults.intermediary_tokens,
            },

            // Quoters
            uniswap_v2_router: match env::var("UNISWAP_V2_ROUTER") {
                Ok(s) => parse_optional_address(&s)?,
                Err(_) => defaults.uniswap_v2_router,
            },
            uniswap_v3_quoter: match env::var("UNISWAP_V3_QUOTER") {
                Ok(s) => parse_optional_address(&s)?,
                Err(_) => defaults.uniswap_v3_quoter,
            },
            uniswap_v3_fee_tiers: match env::var("UNISWAP_V3_FEE_TIERS") {
                Ok(s) => parse_fee_tiers(&s)?,
                Err(_) => defaults.uniswap_v3_fee_tiers,
            },

            // Caching
            token_cache_ttl_secs: env::var("TOKEN_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TTL_SECS),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration before touching the chain
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre::eyre!("Invalid RPC_URL - please set a valid JSON-RPC endpoint"));
        }

        if self.uniswap_v2_router.is_none() && self.uniswap_v3_quoter.is_none() {
            return Err(eyre::eyre!(
                "No quoter configured - set UNISWAP_V2_ROUTER and/or UNISWAP_V3_QUOTER"
            ));
        }

        if self.uniswap_v3_quoter.is_some() && self.uniswap_v3_fee_tiers.is_empty() {
            return Err(eyre::eyre!("UNISWAP_V3_QUOTER is set but UNISWAP_V3_FEE_TIERS is empty"));
        }

        if let Some(fee) = self.uniswap_v3_fee_tiers.iter().find(|f| **f >= MAX_V3_FEE) {
            return Err(eyre::eyre!("Fee tier {} is out of range (must be < {})", fee, MAX_V3_FEE));
        }

        if self.intermediary_tokens.contains(&self.denomination_token) {
            return Err(eyre::eyre!(
                "DENOMINATION_TOKEN must not also be listed in INTERMEDIARY_TOKENS"
            ));
        }

        Ok(())
    }

    pub fn token_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.token_cache_ttl_secs)
    }

    pub fn client(&self) -> AlloyMulticallClient {
        AlloyMulticallClient::new(self.rpc_url.clone()).with_multicall_address(self.multicall_address)
    }

    /// v2 router first, then one v3 quoter per fee tier
    pub fn quoters(&self) -> Vec<Box<dyn ValuationQuoter>> {
        let mut quoters: Vec<Box<dyn ValuationQuoter>> = Vec::new();

        if let Some(router) = self.uniswap_v2_router {
            quoters.push(Box::new(UniswapV2Quoter::new(router)));
        }

        if let Some(quoter) = self.uniswap_v3_quoter {
            for fee in &self.uniswap_v3_fee_tiers {
                quoters.push(Box::new(UniswapV3Quoter::new(quoter, *fee)));
            }
        }

        quoters
    }

    /// Wire up a calculator, resolving token details for the configured tokens
    pub async fn build_calculator(&self, block: BlockSelector) -> Result<NetAssetValueCalculator> {
        let client = self.client();
        let tokens = TokenCache::with_known_tokens(self.token_cache_ttl());

        let block_number = block.resolve(&client, self.block_lag).await?;
        let mut addresses = vec![self.denomination_token];
        addresses.extend(self.intermediary_tokens.iter().copied());
        let details = tokens.fetch_many(&client, &addresses, block_number).await?;

        let lookup = |address: &Address| -> Result<TokenDetails> {
            details
                .get(address)
                .cloned()
                .ok_or_else(|| eyre::eyre!("No token details for {:?}", address))
        };
        let denomination = lookup(&self.denomination_token)?;
        let intermediaries = self
            .intermediary_tokens
            .iter()
            .map(lookup)
            .collect::<Result<Vec<_>>>()?;

        let calculator = NetAssetValueCalculator::new(
            Arc::new(client),
            denomination,
            intermediaries,
            self.quoters(),
            Arc::new(tokens),
        )
        .with_block(block)
        .with_block_lag(self.block_lag);

        Ok(calculator)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let enabled = |a: &Option<Address>| match a {
            Some(address) => TokenDetails::short_address(address),
            None => "✗ Disabled".to_string(),
        };

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              NAV VALUER - CONFIGURATION                    ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("║ Multicall3:        {:^40} ║", TokenDetails::short_address(&self.multicall_address));
        println!("║ Block Lag:         {:^40} ║", self.block_lag);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ VALUATION                                                  ║");
        println!("║ • Denomination:    {:^40} ║", TokenDetails::short_address(&self.denomination_token));
        println!("║ • Intermediaries:  {:^40} ║", self.intermediary_tokens.len());
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ QUOTERS                                                    ║");
        println!("║ • Uniswap V2:      {:^40} ║", enabled(&self.uniswap_v2_router));
        println!("║ • Uniswap V3:      {:^40} ║", enabled(&self.uniswap_v3_quoter));
        println!("║ • V3 Fee Tiers:    {:^40} ║", format!("{:?}", self.uniswap_v3_fee_tiers));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Token Cache TTL:   {:^40} ║", format!("{}s", self.token_cache_ttl_secs));
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "https://eth.llamarpc.com".to_string(),
            chain_id: 1,
            multicall_address: MULTICALL3,
            block_lag: DEFAULT_BLOCK_LAG,
            denomination_token: USDC,
            intermediary_tokens: vec![WETH, USDT, DAI, WBTC],
            uniswap_v2_router: Some(UNISWAP_V2_ROUTER),
            uniswap_v3_quoter: Some(QUOTER_V2),
            uniswap_v3_fee_tiers: vec![500, 3000],
            token_cache_ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

fn parse_address(s: &str) -> Result<Address> {
    Address::from_str(s.trim()).map_err(|e| eyre::eyre!("Invalid address {:?}: {}", s, e))
}

/// Empty string or `none` disables
fn parse_optional_address(s: &str) -> Result<Option<Address>> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    parse_address(s).map(Some)
}

/// Comma-separated, blanks ignored
pub fn parse_address_list(s: &str) -> Result<Vec<Address>> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_address)
        .collect()
}

fn parse_fee_tiers(s: &str) -> Result<Vec<u32>> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|fee| {
            fee.parse::<u32>()
                .map_err(|e| eyre::eyre!("Invalid fee tier {:?}: {}", fee, e))
        })
        .collect()
}

// ============================================
// TESTS
// ============================================
