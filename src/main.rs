//! NAV Valuer - market-sell value of an ERC-20 portfolio
//!
//! Run with: cargo run -- --owner 0x... [--tokens 0x...,0x...] [--block N] [--json]

use alloy_primitives::Address;
use clap::Parser;
use color_eyre::eyre::Result;
use console::style;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nav_valuer::config::Config;
use nav_valuer::tokens::{known_tokens, TokenDetails};
use nav_valuer::valuation::RouteDiagnostic;
use nav_valuer::{BlockSelector, Portfolio, PortfolioValuation};

#[derive(Parser, Debug)]
#[command(name = "nav-valuer", version, about = "Value ERC-20 holdings through batched DEX quotes")]
struct Cli {
    /// Address whose balances are valued
    #[arg(long)]
    owner: Address,

    /// Tokens to value (comma-separated), defaults to the well-known mainnet set
    #[arg(long, value_delimiter = ',')]
    tokens: Vec<Address>,

    /// Pin every read to this block
    #[arg(long, conflicts_with = "latest")]
    block: Option<u64>,

    /// Read at the chain tip instead of a few blocks behind it
    #[arg(long)]
    latest: bool,

    /// Only route through these DEXes (e.g. uniswap-v2,uniswap-v3)
    #[arg(long, value_delimiter = ',')]
    dex: Vec<String>,

    /// Print every candidate route and its quote
    #[arg(long)]
    diagnostics: bool,

    /// Machine-readable output
    #[arg(long)]
    json: bool,

    /// TOML config file, environment is used when absent
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn block_selector(&self) -> BlockSelector {
        match (self.block, self.latest) {
            (Some(n), _) => BlockSelector::Number(n),
            (None, true) => BlockSelector::Latest,
            (None, false) => BlockSelector::AlmostLatest,
        }
    }
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 💰 NAV VALUER - Multi-route DEX Valuation").cyan().bold()
    );
    println!(
        "{}",
        style("    Batched Quotes | Best Route per Token | Pinned Block").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn print_valuation(valuation: &PortfolioValuation, portfolio: &Portfolio, symbols: &HashMap<Address, String>) {
    let denomination = &valuation.denomination_token.symbol;

    println!();
    println!("{}", style(format!("═══ VALUATION @ block {} ═══", valuation.block_number)).green().bold());
    println!();
    println!("  {:<10} {:>24} {:>24}", style("TOKEN").bold(), style("BALANCE").bold(), style(denomination).bold());

    for (token, value) in &valuation.spot_valuations {
        let symbol = symbols
            .get(token)
            .cloned()
            .unwrap_or_else(|| TokenDetails::short_address(token));
        let balance = portfolio.balance(token).unwrap_or_default();
        println!("  {:<10} {:>24} {:>24.2}", symbol, balance.normalize(), value);
    }

    println!("  {}", style("─".repeat(60)).dim());
    println!(
        "  {:<10} {:>24} {:>24}",
        style("TOTAL").bold(),
        "",
        style(format!("{:.2}", valuation.total())).green().bold()
    );
    println!();
}

fn print_diagnostics(rows: &[RouteDiagnostic]) {
    println!();
    println!("{}", style("═══ ROUTE DIAGNOSTICS ═══").magenta().bold());
    println!();

    for row in rows {
        let quote = match row.quote {
            Some(q) => format!("{:.4}", q),
            None => style("reverted").red().to_string(),
        };
        let marker = if row.best {
            style("★").green().bold().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "  {} {:<8} {:<12} {:<32} {:>20}",
            marker, row.symbol, row.dex, row.path, quote
        );
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nav_valuer=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }

    if !cli.json {
        print_banner();
        config.print_summary();
    }

    let start = Instant::now();

    // Pin the block once so balances and quotes read the same state
    let calculator = config.build_calculator(cli.block_selector()).await?;
    let block_number = calculator.resolve_block().await?;
    let calculator = calculator.with_block(BlockSelector::Number(block_number));

    let addresses: Vec<Address> = if cli.tokens.is_empty() {
        known_tokens().iter().map(|t| t.address).collect()
    } else {
        cli.tokens.clone()
    };

    let details = calculator
        .token_cache()
        .fetch_many(calculator.client(), &addresses, block_number)
        .await?;
    let tokens: Vec<TokenDetails> = addresses
        .iter()
        .filter_map(|a| details.get(a).cloned())
        .collect();
    let symbols: HashMap<Address, String> = tokens
        .iter()
        .map(|t| (t.address, t.symbol.clone()))
        .collect();

    let mut portfolio = Portfolio::fetch_balances(calculator.client(), cli.owner, &tokens, block_number).await?;
    if !cli.dex.is_empty() {
        let dexes: Vec<&str> = cli.dex.iter().map(String::as_str).collect();
        let held: Vec<Address> = portfolio.tokens().copied().collect();
        for token in held {
            portfolio = portfolio.with_dex_hint(token, &dexes);
        }
    }

    info!(
        "Fetched {} balances for {:?} at block {}",
        portfolio.len(),
        cli.owner,
        block_number
    );

    if cli.diagnostics {
        let rows = calculator.route_diagnostics(&portfolio).await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            print_diagnostics(&rows);
        }
    }

    let valuation = match calculator.calculate_market_sell_nav(&portfolio).await {
        Ok(valuation) => valuation,
        Err(e) if e.is_no_route() => {
            error!("{}", e);
            error!("Try --diagnostics to see every candidate route");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&valuation)?);
    } else {
        print_valuation(&valuation, &portfolio, &symbols);
        println!(
            "{} Valued {} tokens in {:?}",
            style("✓").green(),
            valuation.len(),
            start.elapsed()
        );
    }

    Ok(())
}
