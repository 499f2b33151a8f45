//! Whale wallet tracking
//!
//! For each configured address, fetches the token list and DeFi positions
//! from DeBank, derives portfolio statistics, and writes:
//!
//! - `data/wallets/<address>_data.json` (raw holdings)
//! - `data/wallets/<address>_stats.json` (derived statistics)
//! - `content/wallets/<address>.md` (per-wallet report)
//! - `content/wallets/index.md` (summary of every processed wallet)

use super::{generated_at, null_as_default};
use crate::context::TaskContext;
use crate::error::{Error, Result};
use crate::fetch::{FetchRequest, SourceResult};
use crate::output::{ensure_directory, save_json, save_markdown};
use crate::runner::Job;
use crate::utils::{format_thousands, table_cell, validate_address};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// A token balance as reported by DeBank
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    /// Token contract id
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    /// Chain id (`eth`, `bsc`, ...)
    #[serde(deserialize_with = "null_as_default")]
    pub chain: String,
    /// Ticker
    #[serde(deserialize_with = "null_as_default")]
    pub symbol: String,
    /// Display name
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    /// Unit price in USD
    #[serde(deserialize_with = "null_as_default")]
    pub price: f64,
    /// Balance in token units
    #[serde(deserialize_with = "null_as_default")]
    pub amount: f64,
}

impl Token {
    /// Holding value in USD
    pub fn value_usd(&self) -> f64 {
        self.price * self.amount
    }
}

/// Value summary of a position
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioStats {
    /// Assets minus debt, in USD
    #[serde(deserialize_with = "null_as_default")]
    pub net_usd_value: f64,
}

/// One position inside a protocol
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioItem {
    /// Value summary
    pub stats: PortfolioStats,
}

/// A DeFi protocol position as reported by DeBank
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Protocol {
    /// Protocol id
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    /// Display name
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    /// Chain id
    #[serde(deserialize_with = "null_as_default")]
    pub chain: String,
    /// Positions held in the protocol
    #[serde(deserialize_with = "null_as_default")]
    pub portfolio_item_list: Vec<PortfolioItem>,
}

impl Protocol {
    /// Net USD value of the protocol's leading position
    pub fn net_usd_value(&self) -> f64 {
        self.portfolio_item_list
            .first()
            .map_or(0.0, |item| item.stats.net_usd_value)
    }
}

/// Holdings of one wallet, cached as a unit
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletData {
    /// Wallet address as configured
    pub address: String,
    /// Token balances
    pub tokens: Vec<Token>,
    /// DeFi positions
    pub protocols: Vec<Protocol>,
    /// When the data was fetched
    pub fetched_at: DateTime<Utc>,
}

/// Share of one token in a portfolio
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenShare {
    /// Ticker, `Unknown` if missing
    pub symbol: String,
    /// Holding value
    pub value_usd: f64,
    /// Share of the total portfolio, 0 to 100
    pub percentage: f64,
}

/// Derived portfolio statistics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletStats {
    /// Tokens plus DeFi positions
    pub total_value_usd: f64,
    /// Sum of token holdings
    pub token_value_usd: f64,
    /// Sum of leading DeFi positions
    pub defi_value_usd: f64,
    /// Non-zero holdings, largest first
    pub token_distribution: Vec<TokenShare>,
}

/// Compute totals and the token distribution of a wallet
pub fn calculate_stats(data: &WalletData) -> WalletStats {
    let token_value_usd: f64 = data.tokens.iter().map(Token::value_usd).sum();
    let defi_value_usd: f64 = data.protocols.iter().map(Protocol::net_usd_value).sum();
    let total_value_usd = token_value_usd + defi_value_usd;

    let mut token_distribution: Vec<TokenShare> = data
        .tokens
        .iter()
        .filter(|t| t.value_usd() > 0.0)
        .map(|t| {
            let value_usd = t.value_usd();
            TokenShare {
                symbol: if t.symbol.is_empty() {
                    "Unknown".to_string()
                } else {
                    t.symbol.clone()
                },
                value_usd,
                percentage: if total_value_usd > 0.0 {
                    value_usd / total_value_usd * 100.0
                } else {
                    0.0
                },
            }
        })
        .collect();
    token_distribution.sort_by(|a, b| b.value_usd.total_cmp(&a.value_usd));

    WalletStats {
        total_value_usd,
        token_value_usd,
        defi_value_usd,
        token_distribution,
    }
}

fn usd(value: f64) -> String {
    format!("${}", format_thousands(value, 2))
}

/// Per-wallet Markdown report
pub fn render_wallet_report(data: &WalletData, stats: &WalletStats) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Whale Wallet Analysis: {}\n", data.address);
    let _ = writeln!(md, "*Generated on: {}*\n", generated_at());
    md.push_str("## Portfolio Summary\n\n");
    let _ = writeln!(md, "- **Total Portfolio Value:** {}", usd(stats.total_value_usd));
    let _ = writeln!(md, "- **Token Holdings Value:** {}", usd(stats.token_value_usd));
    let _ = writeln!(md, "- **DeFi Positions Value:** {}\n", usd(stats.defi_value_usd));

    md.push_str("## Top Token Holdings\n\n");
    md.push_str("| Token | Value (USD) | % of Portfolio |\n");
    md.push_str("|-------|-------------|----------------|\n");
    for share in stats.token_distribution.iter().take(10) {
        let _ = writeln!(
            md,
            "| {} | {} | {:.2}% |",
            table_cell(&share.symbol),
            usd(share.value_usd),
            share.percentage
        );
    }

    md.push_str("\n## DeFi Positions\n\n");
    md.push_str("| Protocol | Value (USD) |\n");
    md.push_str("|----------|-------------|\n");
    for protocol in &data.protocols {
        let value = protocol.net_usd_value();
        if value > 0.0 {
            let name = if protocol.name.is_empty() {
                "Unknown"
            } else {
                protocol.name.as_str()
            };
            let _ = writeln!(md, "| {} | {} |", table_cell(name), usd(value));
        }
    }
    md
}

/// Summary table linking every processed wallet
pub fn render_index(wallets: &[(String, WalletStats)]) -> String {
    let mut md = String::from("# Whale Wallet Tracking Summary\n\n");
    let _ = writeln!(md, "*Generated on: {}*\n", generated_at());
    md.push_str("| Address | Total Value (USD) | Token Value (USD) | DeFi Value (USD) |\n");
    md.push_str("|---------|------------------|-------------------|------------------|\n");
    for (address, stats) in wallets {
        let _ = writeln!(
            md,
            "| [{address}](./{address}.md) | {} | {} | {} |",
            usd(stats.total_value_usd),
            usd(stats.token_value_usd),
            usd(stats.defi_value_usd)
        );
    }
    md
}

/// Fetch (or load from cache) the holdings of one wallet
///
/// The token list is required; a failed protocol lookup yields no positions.
pub async fn fetch_wallet(ctx: &TaskContext, address: &str) -> SourceResult<WalletData> {
    if !validate_address(address) {
        return SourceResult::Unavailable(Error::InvalidAddress(address.to_string()).to_string());
    }

    let key = format!("debank_wallet_{address}");
    if let Some(cached) = ctx.cache.get::<WalletData>(&key).await {
        tracing::debug!(address, "Using cached DeBank data");
        return SourceResult::Available(cached);
    }

    let base = &ctx.config.sources.debank;
    let access_key = ctx.config.api.debank_access_key.as_deref();

    let tokens_request = FetchRequest::get(format!("{base}/user/token_list"))
        .param("id", address)
        .param("is_all", "true")
        .header_opt("AccessKey", access_key);
    let tokens: Vec<Token> = match ctx.fetch_json(&tokens_request).await {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::error!(address, error = %e, "Failed to fetch token data");
            return SourceResult::Unavailable(e.to_string());
        }
    };

    ctx.pace().await;

    let protocols_request = FetchRequest::get(format!("{base}/user/complex_protocol_list"))
        .param("id", address)
        .header_opt("AccessKey", access_key);
    let protocols: Vec<Protocol> = match ctx.fetch_json(&protocols_request).await {
        Ok(protocols) => protocols,
        Err(e) => {
            tracing::warn!(address, error = %e, "No DeFi positions fetched");
            Vec::new()
        }
    };

    let data = WalletData {
        address: address.to_string(),
        tokens,
        protocols,
        fetched_at: Utc::now(),
    };
    ctx.cache.set(&key, &data).await;
    tracing::info!(address, "Fetched DeBank data");
    SourceResult::Available(data)
}

/// Tracks the configured whale wallets
#[derive(Clone, Copy, Debug, Default)]
pub struct WalletsJob;

#[async_trait]
impl Job for WalletsJob {
    fn name(&self) -> &str {
        "wallets"
    }

    fn description(&self) -> &str {
        "Track whale wallet holdings"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let data_dir = ctx.config.paths.data_dir.join("wallets");
        let content_dir = ctx.config.paths.content_dir.join("wallets");
        ensure_directory(&data_dir).await?;
        ensure_directory(&content_dir).await?;

        let addresses = &ctx.config.wallets.addresses;
        let mut processed: Vec<(String, WalletStats)> = Vec::new();
        let mut failed: Vec<&str> = Vec::new();

        for (i, address) in addresses.iter().enumerate() {
            if i > 0 {
                ctx.pace().await;
            }
            tracing::info!(address = %address, "Processing wallet");

            if !validate_address(address) {
                tracing::error!(address = %address, "Invalid address format");
                failed.push(address);
                continue;
            }

            let data = match fetch_wallet(ctx, address).await {
                SourceResult::Available(data) => data,
                SourceResult::Unavailable(reason) => {
                    tracing::warn!(address = %address, reason = %reason, "No data fetched");
                    failed.push(address);
                    continue;
                }
            };

            let stats = calculate_stats(&data);
            let saved = async {
                save_json(&data, &data_dir.join(format!("{address}_data.json"))).await?;
                save_json(&stats, &data_dir.join(format!("{address}_stats.json"))).await?;
                save_markdown(
                    &render_wallet_report(&data, &stats),
                    &content_dir.join(format!("{address}.md")),
                )
                .await?;
                Ok::<(), Error>(())
            };
            match saved.await {
                Ok(()) => processed.push((address.clone(), stats)),
                Err(e) => {
                    tracing::error!(address = %address, error = %e, "Error saving wallet outputs");
                    failed.push(address);
                }
            }
        }

        if !processed.is_empty() {
            save_markdown(&render_index(&processed), &content_dir.join("index.md")).await?;
        }

        tracing::info!(
            succeeded = processed.len(),
            failed = failed.len(),
            "Wallet tracking complete"
        );
        if !failed.is_empty() {
            tracing::warn!(addresses = ?failed, "Failed addresses");
        }

        if processed.is_empty() && !addresses.is_empty() {
            return Err(Error::Job(format!(
                "no wallet data fetched for {} addresses",
                addresses.len()
            )));
        }
        Ok(())
    }
}
