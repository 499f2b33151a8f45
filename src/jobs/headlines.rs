//! Daily crypto headlines and content ideas
//!
//! Pulls the latest articles from NewsAPI when `NEWS_API_KEY` is set (bundled
//! sample articles otherwise), extracts trending keywords, and renders a
//! daily page with a news summary and script outlines for the top topics.

use super::{generated_at, null_as_default};
use crate::context::TaskContext;
use crate::error::Result;
use crate::fetch::FetchRequest;
use crate::output::{ensure_directory, save_json, save_markdown};
use crate::runner::Job;
use crate::utils::{format_thousands, table_cell, time_ago};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::LazyLock;

/// NewsAPI query used for the daily fetch
pub const NEWS_QUERY: &str = "cryptocurrency OR blockchain OR bitcoin OR ethereum";

/// Articles requested per fetch
pub const PAGE_SIZE: usize = 10;

/// Keywords kept after ranking
pub const KEYWORD_LIMIT: usize = 20;

/// Topics that get a script outline
const SCRIPT_TOPICS: usize = 3;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "has", "with", "its", "from", "that", "this", "have",
];

#[allow(clippy::expect_used)]
static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z0-9]{3,}\b").expect("keyword pattern is valid"));

/// Publisher of an article
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleSource {
    /// Publisher name
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
}

/// A news article in NewsAPI shape
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Article {
    /// Headline
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    /// Teaser text
    pub description: Option<String>,
    /// Link to the article
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    /// RFC 3339 publication time
    #[serde(rename = "publishedAt", deserialize_with = "null_as_default")]
    pub published_at: String,
    /// Publisher
    #[serde(deserialize_with = "null_as_default")]
    pub source: ArticleSource,
}

#[derive(Deserialize)]
struct NewsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    articles: Vec<Article>,
}

/// A trending discussion topic
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    /// Topic label
    pub topic: String,
    /// Mention volume
    pub volume: u64,
    /// Overall tone
    pub sentiment: String,
}

/// A keyword and its frequency
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    /// Lower-cased token
    pub keyword: String,
    /// Occurrences across articles and topics
    pub count: usize,
}

/// Everything written to `daily/<date>_data.json`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DailyDigest {
    /// Articles used
    pub news: Vec<Article>,
    /// Trending topics
    pub topics: Vec<Topic>,
    /// Ranked keywords
    pub keywords: Vec<Keyword>,
    /// Summary paragraph(s)
    pub summary: String,
    /// Script outline per topic
    pub scripts: BTreeMap<String, String>,
    /// Local generation time
    pub generated_at: String,
}

/// Rank words from article titles, descriptions and topic labels
///
/// Tokens are lower-cased runs of three or more ASCII letters or digits;
/// stop words are dropped. Ties keep first-seen order.
pub fn extract_keywords(articles: &[Article], topics: &[Topic]) -> Vec<Keyword> {
    let mut text = String::new();
    for article in articles {
        text.push_str(&article.title);
        text.push(' ');
        text.push_str(article.description.as_deref().unwrap_or_default());
        text.push(' ');
    }
    for topic in topics {
        text.push_str(&topic.topic);
        text.push(' ');
    }
    let text = text.to_lowercase();

    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in WORD_RE.find_iter(&text).map(|m| m.as_str()) {
        if STOP_WORDS.contains(&word) {
            continue;
        }
        let count = counts.entry(word).or_insert(0);
        if *count == 0 {
            order.push(word);
        }
        *count += 1;
    }

    let mut ranked: Vec<Keyword> = order
        .into_iter()
        .map(|word| Keyword {
            keyword: word.to_string(),
            count: counts.get(word).copied().unwrap_or_default(),
        })
        .collect();
    // Stable: equal counts stay in first-seen order
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(KEYWORD_LIMIT);
    ranked
}

/// Deterministic summary of the day's articles
pub fn summarize(articles: &[Article], keywords: &[Keyword]) -> String {
    if articles.is_empty() {
        return "No crypto news was collected today.".to_string();
    }

    let mut sources: Vec<&str> = articles
        .iter()
        .map(|a| a.source.name.as_str())
        .filter(|name| !name.is_empty())
        .collect();
    sources.sort_unstable();
    sources.dedup();

    let mut summary = format!(
        "Today's digest covers {} stories from {} sources.",
        articles.len(),
        sources.len()
    );
    let leading: Vec<&str> = articles.iter().take(3).map(|a| a.title.as_str()).collect();
    let _ = write!(summary, " Leading the coverage: {}.", leading.join("; "));
    if !keywords.is_empty() {
        let terms: Vec<&str> = keywords.iter().take(5).map(|k| k.keyword.as_str()).collect();
        let _ = write!(summary, " The most discussed terms were {}.", terms.join(", "));
    }
    summary
}

/// Script outline for a content piece on `topic`
pub fn script_for(topic: &str, keywords: &[Keyword]) -> String {
    let terms: Vec<&str> = keywords.iter().take(5).map(|k| k.keyword.as_str()).collect();
    let mut script = format!("## SCRIPT: {topic}\n\n");
    let _ = writeln!(
        script,
        "### INTRO\nWelcome back! Today we are looking at {topic}, one of the stories moving the market right now.\n"
    );
    let _ = writeln!(
        script,
        "### MAIN POINTS\n1. What is happening with {topic} and who is driving it.\n\
         2. What it means for builders and investors beyond the price action.\n\
         3. How to follow the story from here.\n"
    );
    if !terms.is_empty() {
        let _ = writeln!(script, "Keywords to mention: {}\n", terms.join(", "));
    }
    script.push_str(
        "### CONCLUSION\nThat is the picture on this topic today. Share your questions in the comments \
         and follow for the next update. Nothing here is financial advice.\n",
    );
    script
}

fn article_age(published_at: &str, now: DateTime<Utc>) -> String {
    if published_at.is_empty() {
        return "Recent".to_string();
    }
    match DateTime::parse_from_rfc3339(published_at) {
        Ok(dt) => time_ago(dt.with_timezone(&Utc), now),
        Err(_) => published_at.to_string(),
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Daily page
pub fn render_report(digest: &DailyDigest) -> String {
    let now = Utc::now();
    let mut md = String::from("# Daily Crypto Headlines & Content Ideas\n\n");
    let _ = writeln!(md, "*Generated on: {}*\n", digest.generated_at);

    md.push_str("## Today's Hot Topics\n\n| Topic | Volume | Sentiment |\n|-------|--------|-----------|\n");
    for topic in digest.topics.iter().take(5) {
        let _ = writeln!(
            md,
            "| {} | {} | {} |",
            table_cell(&topic.topic),
            format_thousands(topic.volume as f64, 0),
            title_case(&topic.sentiment)
        );
    }

    let _ = write!(md, "\n## News Summary\n\n{}\n\n", digest.summary);

    md.push_str("## Latest News Headlines\n\n| Headline | Source | Time |\n|----------|--------|------|\n");
    for article in digest.news.iter().take(8) {
        let url = if article.url.is_empty() { "#" } else { article.url.as_str() };
        let source = if article.source.name.is_empty() {
            "Unknown"
        } else {
            article.source.name.as_str()
        };
        let _ = writeln!(
            md,
            "| [{}]({url}) | {} | {} |",
            table_cell(&article.title),
            table_cell(source),
            article_age(&article.published_at, now)
        );
    }

    md.push_str("\n## Trending Keywords\n\n");
    for keyword in digest.keywords.iter().take(15) {
        let level = (keyword.count / 2).clamp(1, 3);
        let _ = write!(md, "{} {} ", "#".repeat(level), keyword.keyword);
    }

    md.push_str(
        "\n\n## Content Script Ideas\n\nThe following script templates can be used as starting points for creating content:\n\n",
    );
    for (topic, script) in &digest.scripts {
        let _ = write!(md, "### {topic}\n\n```\n{script}\n```\n\n");
    }
    md
}

async fn fetch_news(ctx: &TaskContext) -> Vec<Article> {
    let Some(api_key) = ctx.config.api.news_api_key.as_deref() else {
        tracing::info!("NEWS_API_KEY not set, using sample news");
        return sample_news(Utc::now());
    };

    let request = FetchRequest::get(format!("{}/everything", ctx.config.sources.newsapi))
        .param("q", NEWS_QUERY)
        .param("sortBy", "publishedAt")
        .param("language", "en")
        .param("pageSize", PAGE_SIZE)
        .param("apiKey", api_key);
    ctx.source("newsapi_everything")
        .fetch_json_with(request, |response: NewsResponse| response.articles)
        .await
        .unwrap_or_else(|reason| {
            tracing::warn!(reason, "NewsAPI unavailable, using sample news");
            sample_news(Utc::now())
        })
}

/// Generates the daily headlines page
#[derive(Clone, Copy, Debug, Default)]
pub struct HeadlinesJob;

#[async_trait]
impl Job for HeadlinesJob {
    fn name(&self) -> &str {
        "headlines"
    }

    fn description(&self) -> &str {
        "Generate daily headlines and content scripts"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let data_dir = ctx.config.paths.data_dir.join("daily");
        let content_dir = ctx.config.paths.content_dir.join("daily");
        ensure_directory(&data_dir).await?;
        ensure_directory(&content_dir).await?;

        tracing::info!("Fetching latest crypto news");
        let news = fetch_news(ctx).await;
        let topics = sample_topics();

        let keywords = extract_keywords(&news, &topics);
        let summary = summarize(&news, &keywords);
        let scripts: BTreeMap<String, String> = topics
            .iter()
            .take(SCRIPT_TOPICS)
            .map(|t| (t.topic.clone(), script_for(&t.topic, &keywords)))
            .collect();

        let digest = DailyDigest {
            news,
            topics,
            keywords,
            summary,
            scripts,
            generated_at: generated_at(),
        };

        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let markdown = render_report(&digest);
        save_markdown(&markdown, &content_dir.join(format!("{today}.md"))).await?;
        save_markdown(&markdown, &content_dir.join("index.md")).await?;
        save_json(&digest, &data_dir.join(format!("{today}_data.json"))).await?;

        tracing::info!(date = %today, articles = digest.news.len(), "Daily headlines generated");
        Ok(())
    }
}

fn article(title: &str, description: &str, slug: &str, hours_ago: i64, source: &str, now: DateTime<Utc>) -> Article {
    Article {
        title: title.into(),
        description: Some(description.into()),
        url: format!("https://example.com/{slug}"),
        published_at: (now - chrono::Duration::hours(hours_ago))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string(),
        source: ArticleSource { name: source.into() },
    }
}

/// Bundled articles used without a NewsAPI key
pub fn sample_news(now: DateTime<Utc>) -> Vec<Article> {
    vec![
        article(
            "Bitcoin Surges Past $60,000 as ETF Approval Rumors Intensify",
            "Bitcoin has surged past $60,000 for the first time in months as rumors of a potential spot ETF approval by the SEC intensify.",
            "bitcoin-etf-rumors",
            0,
            "Crypto News Daily",
            now,
        ),
        article(
            "Ethereum Completes Major Network Upgrade, Gas Fees Drop 30%",
            "Ethereum has successfully completed its latest network upgrade, resulting in a significant 30% reduction in gas fees for users.",
            "ethereum-upgrade",
            2,
            "Blockchain Insider",
            now,
        ),
        article(
            "Major Bank Launches Cryptocurrency Custody Service for Institutional Clients",
            "A major global bank has announced the launch of a cryptocurrency custody service aimed at institutional clients.",
            "bank-crypto-custody",
            5,
            "Financial Times Crypto",
            now,
        ),
        article(
            "New Layer 2 Solution Claims 100,000 TPS with Full Ethereum Security",
            "A new Layer 2 scaling solution for Ethereum claims to achieve 100,000 transactions per second while keeping full security guarantees.",
            "layer2-scaling",
            8,
            "DeFi Pulse",
            now,
        ),
        article(
            "SEC Commissioner Speaks Out in Favor of Clearer Crypto Regulations",
            "A commissioner from the U.S. Securities and Exchange Commission has spoken in favor of clearer regulations for the cryptocurrency industry.",
            "sec-crypto-regulations",
            10,
            "Regulatory Watch",
            now,
        ),
    ]
}

/// Bundled trending topics, highest volume first
pub fn sample_topics() -> Vec<Topic> {
    [
        ("Bitcoin ETF", 45_000, "positive"),
        ("Ethereum Layer 2", 32_000, "positive"),
        ("DeFi Yield Farming", 28_000, "neutral"),
        ("NFT Market Recovery", 25_000, "positive"),
        ("Crypto Regulations", 22_000, "negative"),
        ("Solana Ecosystem", 18_000, "positive"),
        ("Meme Coins", 15_000, "mixed"),
        ("Web3 Gaming", 12_000, "positive"),
        ("DAO Governance", 10_000, "neutral"),
        ("Cross-chain Bridges", 8_000, "neutral"),
    ]
    .into_iter()
    .map(|(topic, volume, sentiment)| Topic {
        topic: topic.into(),
        volume,
        sentiment: sentiment.into(),
    })
    .collect()
}
