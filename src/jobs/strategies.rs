//! Trading strategy performance reports
//!
//! Reads daily return series from `DATA_DIR/strategies/*.csv` (columns
//! `date` and `returns`), computes summary metrics and renders one page per
//! strategy plus a dashboard. Without input files two seeded sample
//! strategies are reported instead.

use super::generated_at;
use crate::context::TaskContext;
use crate::error::{Error, Result};
use crate::output::{ensure_directory, save_json, save_markdown};
use crate::runner::Job;
use crate::utils::{format_percentage, table_cell};
use async_trait::async_trait;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Trading days per year used for annualisation
pub const TRADING_DAYS: f64 = 252.0;

/// Rows in the "Recent Daily Returns" table
const RECENT_ROWS: usize = 10;

/// Seed for the sample return series
const SAMPLE_SEED: u64 = 42;

/// 2022-01-01 through 2023-01-01
const SAMPLE_DAYS: usize = 366;

const DATE_COLUMNS: &[&str] = &["date", "Date"];
const RETURN_COLUMNS: &[&str] = &["returns", "Returns", "daily_return"];

/// One day of a return series
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyReturn {
    /// Trading day
    pub date: NaiveDate,
    /// Simple return for the day (`0.01` = 1%)
    pub returns: f64,
}

/// Summary statistics of a return series
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Compounded return over the whole series
    pub total_return: f64,
    /// Total return annualised over 252 trading days
    pub annual_return: f64,
    /// Annualised sample standard deviation
    pub volatility: f64,
    /// Annual return over volatility, 0 when volatility is 0
    pub sharpe_ratio: f64,
    /// Deepest fall of cumulative (summed) returns from their running peak
    pub max_drawdown: f64,
    /// Share of days with a positive return
    pub win_rate: f64,
}

/// A named strategy and its daily returns, oldest first
#[derive(Clone, Debug, PartialEq)]
pub struct Strategy {
    /// Display name
    pub name: String,
    /// Return series sorted by date
    pub series: Vec<DailyReturn>,
}

impl Strategy {
    /// Markdown file name of the strategy page
    pub fn page_name(&self) -> String {
        format!("{}.md", self.name.to_lowercase().replace(' ', "_"))
    }
}

/// Entry of `strategy_metrics.json`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategySummary {
    /// Strategy name
    pub name: String,
    /// Computed metrics
    pub metrics: PerformanceMetrics,
}

/// Metrics of a return series, `None` when it is empty
pub fn calculate_metrics(returns: &[f64]) -> Option<PerformanceMetrics> {
    if returns.is_empty() {
        return None;
    }
    let n = returns.len() as f64;

    let total_return = returns.iter().map(|r| 1.0 + r).product::<f64>() - 1.0;
    let annual_return = (1.0 + total_return).powf(TRADING_DAYS / n) - 1.0;

    let volatility = if returns.len() > 1 {
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt() * TRADING_DAYS.sqrt()
    } else {
        0.0
    };
    let sharpe_ratio = if volatility == 0.0 { 0.0 } else { annual_return / volatility };

    let mut cumulative = 0.0_f64;
    let mut peak = f64::NEG_INFINITY;
    let mut max_drawdown = 0.0_f64;
    for r in returns {
        cumulative += r;
        peak = peak.max(cumulative);
        max_drawdown = max_drawdown.min(cumulative - peak);
    }

    let wins = returns.iter().filter(|r| **r > 0.0).count() as f64;

    Some(PerformanceMetrics {
        total_return,
        annual_return,
        volatility,
        sharpe_ratio,
        max_drawdown,
        win_rate: wins / n,
    })
}

/// Compounded return up to and including each day
pub fn cumulative_returns(series: &[DailyReturn]) -> Vec<f64> {
    let mut growth = 1.0_f64;
    series
        .iter()
        .map(|day| {
            growth *= 1.0 + day.returns;
            growth - 1.0
        })
        .collect()
}

/// Split one CSV line into fields; double quotes may wrap a field
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field).trim().to_string()),
            _ => field.push(ch),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    // Accept datetimes by keeping the date part
    let date = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Parse a return series from CSV text
///
/// The header must name a date column (`date` or `Date`) and a returns
/// column (`returns`, `Returns` or `daily_return`); other columns are
/// ignored. Rows are sorted by date.
pub fn parse_returns_csv(text: &str) -> Result<Vec<DailyReturn>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = split_csv_line(lines.next().unwrap_or_default());
    let column = |names: &[&str]| header.iter().position(|h| names.contains(&h.as_str()));
    let (Some(date_col), Some(return_col)) = (column(DATE_COLUMNS), column(RETURN_COLUMNS)) else {
        return Err(Error::Other(format!(
            "expected date and returns columns, found {}",
            header.join(", ")
        )));
    };

    let mut series = Vec::new();
    for (i, line) in lines.enumerate() {
        let fields = split_csv_line(line);
        let date = fields.get(date_col).and_then(|d| parse_date(d));
        let returns = fields.get(return_col).and_then(|r| r.parse::<f64>().ok());
        match (date, returns) {
            (Some(date), Some(returns)) if returns.is_finite() => {
                series.push(DailyReturn { date, returns });
            }
            _ => return Err(Error::Other(format!("invalid row {}: {line}", i + 2))),
        }
    }
    series.sort_by_key(|day| day.date);
    Ok(series)
}

/// `momentum_strategy` → `Momentum Strategy`
fn strategy_name(stem: &str) -> String {
    stem.split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strategies from the `*.csv` files in `dir`, in file name order
///
/// Files that cannot be parsed are skipped with a warning.
pub async fn load_strategies(dir: &Path) -> Result<Vec<Strategy>> {
    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
            files.push(path);
        }
    }
    files.sort();

    let mut strategies = Vec::new();
    for path in files {
        let text = tokio::fs::read_to_string(&path).await?;
        match parse_returns_csv(&text) {
            Ok(series) if !series.is_empty() => {
                let stem = path.file_stem().unwrap_or_default().to_string_lossy();
                strategies.push(Strategy { name: strategy_name(&stem), series });
            }
            Ok(_) => tracing::warn!(path = %path.display(), "Strategy file has no rows"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping strategy file"),
        }
    }
    Ok(strategies)
}

/// Page for one strategy
pub fn render_strategy(strategy: &Strategy, metrics: &PerformanceMetrics, generated_at: &str) -> String {
    let mut md = format!("# {} Strategy Performance\n\n", strategy.name);
    let _ = writeln!(md, "*Generated on: {generated_at}*\n");

    md.push_str("## Performance Summary\n\n| Metric | Value |\n|--------|-------|\n");
    let _ = writeln!(md, "| Total Return | {} |", format_percentage(metrics.total_return));
    let _ = writeln!(md, "| Annual Return | {} |", format_percentage(metrics.annual_return));
    let _ = writeln!(md, "| Volatility | {} |", format_percentage(metrics.volatility));
    let _ = writeln!(md, "| Sharpe Ratio | {:.2} |", metrics.sharpe_ratio);
    let _ = writeln!(md, "| Maximum Drawdown | {} |", format_percentage(metrics.max_drawdown));
    let _ = writeln!(md, "| Win Rate | {} |", format_percentage(metrics.win_rate));

    md.push_str(
        "\n## Recent Daily Returns\n\n| Date | Return | Cumulative Return |\n|------|--------|------------------|\n",
    );
    let cumulative = cumulative_returns(&strategy.series);
    for (day, total) in strategy.series.iter().zip(&cumulative).rev().take(RECENT_ROWS) {
        let _ = writeln!(
            md,
            "| {} | {} | {} |",
            day.date.format("%Y-%m-%d"),
            format_percentage(day.returns),
            format_percentage(*total)
        );
    }
    md
}

/// Dashboard linking every strategy page
pub fn render_index(strategies: &[(&Strategy, &PerformanceMetrics)], generated_at: &str) -> String {
    let mut md = String::from("# Trading Strategy Performance Dashboard\n\n");
    let _ = writeln!(md, "*Last updated: {generated_at}*\n");
    md.push_str(
        "## Strategy Performance Summary\n\n\
         | Strategy | Total Return | Annual Return | Sharpe Ratio | Win Rate |\n\
         |----------|--------------|--------------|--------------|----------|\n",
    );
    for (strategy, m) in strategies {
        let _ = writeln!(
            md,
            "| [{}](./{}) | {} | {} | {:.2} | {} |",
            table_cell(&strategy.name),
            strategy.page_name(),
            format_percentage(m.total_return),
            format_percentage(m.annual_return),
            m.sharpe_ratio,
            format_percentage(m.win_rate)
        );
    }
    md
}

/// Renders strategy performance pages
#[derive(Clone, Copy, Debug, Default)]
pub struct StrategiesJob;

#[async_trait]
impl Job for StrategiesJob {
    fn name(&self) -> &str {
        "strategies"
    }

    fn description(&self) -> &str {
        "Generate strategy performance reports"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let data_dir = ctx.config.paths.data_dir.join("strategies");
        let content_dir = ctx.config.paths.content_dir.join("strategies");
        ensure_directory(&data_dir).await?;
        ensure_directory(&content_dir).await?;

        let mut strategies = load_strategies(&data_dir).await?;
        if strategies.is_empty() {
            tracing::info!("No strategy data found, using sample strategies");
            strategies = sample_strategies();
        }

        let now = generated_at();
        let mut reported = Vec::new();
        for strategy in &strategies {
            let returns: Vec<f64> = strategy.series.iter().map(|d| d.returns).collect();
            let Some(metrics) = calculate_metrics(&returns) else {
                continue;
            };
            let page = render_strategy(strategy, &metrics, &now);
            save_markdown(&page, &content_dir.join(strategy.page_name())).await?;
            tracing::info!(strategy = %strategy.name, "Generated strategy report");
            reported.push((strategy, metrics));
        }

        let index: Vec<(&Strategy, &PerformanceMetrics)> =
            reported.iter().map(|(s, m)| (*s, m)).collect();
        save_markdown(&render_index(&index, &now), &content_dir.join("index.md")).await?;

        let summaries: Vec<StrategySummary> = reported
            .iter()
            .map(|(s, m)| StrategySummary {
                name: s.name.clone(),
                metrics: m.clone(),
            })
            .collect();
        save_json(&summaries, &data_dir.join("strategy_metrics.json")).await?;

        tracing::info!(strategies = summaries.len(), "Strategy reports generated");
        Ok(())
    }
}

/// Normally distributed sample via the Box-Muller transform
fn normal(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1 = 1.0 - rng.r#gen::<f64>();
    let u2 = rng.r#gen::<f64>();
    mean + std_dev * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn sample_series(rng: &mut StdRng, mean: f64, std_dev: f64) -> Vec<DailyReturn> {
    let Some(start) = NaiveDate::from_ymd_opt(2022, 1, 1) else {
        return Vec::new();
    };
    start
        .iter_days()
        .take(SAMPLE_DAYS)
        .map(|date| DailyReturn {
            date,
            returns: normal(rng, mean, std_dev),
        })
        .collect()
}

/// Two reproducible strategies covering 2022 day by day
pub fn sample_strategies() -> Vec<Strategy> {
    let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
    vec![
        Strategy {
            name: "Momentum Strategy".into(),
            series: sample_series(&mut rng, 0.001, 0.01),
        },
        Strategy {
            name: "Mean Reversion Strategy".into(),
            series: sample_series(&mut rng, 0.0008, 0.008),
        },
    ]
}
