//! Formatting and validation helpers shared by the report jobs

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("address pattern is valid"));

#[allow(clippy::expect_used)]
static INVALID_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("filename pattern is valid"));

#[allow(clippy::expect_used)]
static REPEATED_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{2,}").expect("underscore pattern is valid"));

/// Format a USD amount with a magnitude suffix
///
/// # Examples
///
/// ```
/// use datatask::utils::format_currency;
///
/// assert_eq!(format_currency(1_250_000_000.0, "$"), "$1.2B");
/// assert_eq!(format_currency(3_400_000.0, "$"), "$3.4M");
/// assert_eq!(format_currency(12_500.0, "$"), "$12.5K");
/// assert_eq!(format_currency(9.5, "$"), "$9.50");
/// ```
#[must_use]
pub fn format_currency(amount: f64, symbol: &str) -> String {
    if amount >= 1e9 {
        format!("{symbol}{:.1}B", amount / 1e9)
    } else if amount >= 1e6 {
        format!("{symbol}{:.1}M", amount / 1e6)
    } else if amount >= 1e3 {
        format!("{symbol}{:.1}K", amount / 1e3)
    } else {
        format!("{symbol}{amount:.2}")
    }
}

/// Format a ratio as a percentage with two decimals (`0.1234` → `12.34%`)
#[must_use]
pub fn format_percentage(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// Format a number with thousands separators (`1234567.891` → `1,234,567.89`)
#[must_use]
pub fn format_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Relative "time ago" label for a timestamp
#[must_use]
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now - then;
    if diff.num_days() > 0 {
        format!("{}d ago", diff.num_days())
    } else if diff.num_hours() > 0 {
        format!("{}h ago", diff.num_hours())
    } else if diff.num_minutes() > 0 {
        format!("{}m ago", diff.num_minutes())
    } else {
        "Just now".to_string()
    }
}

/// Replace characters that are unsafe in file names
///
/// # Examples
///
/// ```
/// use datatask::utils::clean_filename;
///
/// assert_eq!(clean_filename("a<b>:c"), "a_b_c");
/// assert_eq!(clean_filename("__x??y__"), "x_y");
/// ```
#[must_use]
pub fn clean_filename(name: &str) -> String {
    let replaced = INVALID_FILENAME_CHARS.replace_all(name, "_");
    let collapsed = REPEATED_UNDERSCORES.replace_all(&replaced, "_");
    collapsed.trim_matches('_').to_string()
}

/// Shorten text to at most `max_len` characters, ending with `suffix`
#[must_use]
pub fn truncate_text(text: &str, max_len: usize, suffix: &str) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let keep = max_len.saturating_sub(suffix.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(suffix);
    out
}

/// Host part of a URL, or an empty string if it does not parse
#[must_use]
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// True for a `0x`-prefixed, 40 hex digit EVM address
#[must_use]
pub fn validate_address(address: &str) -> bool {
    ADDRESS_RE.is_match(address)
}

/// Escape characters that would break a Markdown table cell
#[must_use]
pub fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}
