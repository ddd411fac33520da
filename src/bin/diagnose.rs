//! Diagnostic tool - Check configuration and chain reachability
//!
//! Run with: cargo run --bin diagnose

use color_eyre::eyre::Result;
use std::env;

use nav_valuer::config::Config;
use nav_valuer::MulticallClient;

/// Keep the head and tail of long URLs, hiding most of an embedded API key
fn shorten_url(url: &str) -> String {
    let chars: Vec<char> = url.chars().collect();
    if chars.len() <= 50 {
        return url.to_string();
    }
    let head: String = chars[..30].iter().collect();
    let tail: String = chars[chars.len() - 15..].iter().collect();
    format!("{}...{}", head, tail)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    println!("🔍 NAV VALUER DIAGNOSTIC CHECK\n");

    let config = Config::from_env()?;

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    let keys = [
        ("DENOMINATION_TOKEN", "Token holdings are valued in"),
        ("INTERMEDIARY_TOKENS", "Middle hops for three-hop routes"),
        ("UNISWAP_V2_ROUTER", "getAmountsOut router"),
        ("UNISWAP_V3_QUOTER", "QuoterV2 contract"),
        ("UNISWAP_V3_FEE_TIERS", "One v3 quoter per tier"),
        ("MULTICALL3_ADDRESS", "Batch call contract"),
        ("BLOCK_LAG", "Blocks behind tip for reads"),
        ("TOKEN_CACHE_TTL_SECS", "Token metadata cache lifetime"),
    ];

    for (key, desc) in keys {
        let marker = if env::var(key).is_ok() { "(from .env)" } else { "(default)" };
        println!("  {}: {}", key, marker);
        println!("    └─ {}\n", desc);
    }

    println!("  RPC_URL: {}\n", shorten_url(&config.rpc_url));

    config.print_summary();

    println!("\n═══════════════════════════════════════════════════");
    println!("                     STATUS                         ");
    println!("═══════════════════════════════════════════════════\n");

    match config.validate() {
        Ok(()) => println!("  ✅ Configuration valid"),
        Err(e) => println!("  ❌ Configuration invalid: {}", e),
    }

    let client = config.client();
    match client.block_number().await {
        Ok(block) => println!("  ✅ RPC reachable, tip at block {}", block),
        Err(e) => {
            println!("  ❌ RPC unreachable: {}", e);
            println!("\n⚠️  Diagnostic incomplete\n");
            return Ok(());
        }
    }

    match client.multicall_deployed().await {
        Ok(true) => println!("  ✅ Multicall3 deployed at {:?}", config.multicall_address),
        Ok(false) => {
            println!("  ❌ No code at {:?}", config.multicall_address);
            println!("     → Valuation needs batching, set MULTICALL3_ADDRESS");
        }
        Err(e) => println!("  ❌ Multicall3 check failed: {}", e),
    }

    println!("\n✅ Diagnostic complete!\n");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorten_url() {
        assert_eq!(shorten_url("https://eth.llamarpc.com"), "https://eth.llamarpc.com");

        let long = format!("https://eth-mainnet.g.alchemy.com/v2/{}", "k".repeat(32));
        let short = shorten_url(&long);
        assert!(short.starts_with("https://eth-mainnet.g.alchemy"));
        assert!(short.ends_with(&"k".repeat(15)));
    }

    #[test]
    fn test_shorten_url_multibyte() {
        // Byte offsets 30 and len-15 fall inside multi-byte characters here
        let url = format!("https://x{}", "é".repeat(60));
        let short = shorten_url(&url);
        assert_eq!(short.chars().count(), 30 + 3 + 15);
        assert!(short.ends_with(&"é".repeat(15)));
    }
}
