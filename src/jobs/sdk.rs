//! SDK and developer tool updates
//!
//! For each tracked SDK, collects the latest GitHub releases and repository
//! statistics plus the newest npm / PyPI version, pulls code samples out of
//! the release notes, and writes `tools/sdk_updates.json` and
//! `tools/index.md`.

use super::{generated_at, null_as_default};
use crate::config::SdkSpec;
use crate::context::TaskContext;
use crate::error::Result;
use crate::fetch::FetchRequest;
use crate::output::{ensure_directory, save_json, save_markdown};
use crate::runner::Job;
use crate::utils::{table_cell, truncate_text};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::LazyLock;

/// Releases kept per SDK
pub const RELEASES_KEPT: usize = 5;

/// Code examples shown per SDK
const EXAMPLES_SHOWN: usize = 3;

#[allow(clippy::expect_used)]
static FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:\w+)?\s*(.*?)\s*```").expect("fenced code pattern is valid"));

#[allow(clippy::expect_used)]
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`(.*?)`").expect("inline code pattern is valid"));

/// A GitHub release
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Release {
    /// Git tag, used as the version
    #[serde(deserialize_with = "null_as_default")]
    pub tag_name: String,
    /// Release title
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    /// Release notes (Markdown)
    #[serde(deserialize_with = "null_as_default")]
    pub body: String,
    /// Release page
    #[serde(deserialize_with = "null_as_default")]
    pub html_url: String,
    /// RFC 3339 publication time
    pub published_at: Option<String>,
}

impl Release {
    /// Publication date (`YYYY-MM-DD`), if known
    pub fn published_date(&self) -> Option<&str> {
        self.published_at
            .as_deref()
            .and_then(|ts| ts.split('T').next())
            .filter(|d| !d.is_empty())
    }
}

/// GitHub repository statistics
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoInfo {
    /// Repository description
    pub description: Option<String>,
    /// Stars
    pub stargazers_count: Option<u64>,
    /// Forks
    pub forks_count: Option<u64>,
    /// Open issues and pull requests
    pub open_issues_count: Option<u64>,
}

#[derive(Deserialize)]
struct NpmDocument {
    #[serde(rename = "dist-tags", default)]
    dist_tags: NpmDistTags,
}

#[derive(Default, Deserialize)]
struct NpmDistTags {
    #[serde(default, deserialize_with = "null_as_default")]
    latest: String,
}

#[derive(Deserialize)]
struct PypiDocument {
    #[serde(default)]
    info: PypiInfo,
}

#[derive(Default, Deserialize)]
struct PypiInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    version: String,
}

/// Latest published version of a package
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackageVersion {
    /// Package name
    pub name: String,
    /// Latest version, `N/A` if unknown
    pub latest_version: String,
}

/// Everything collected for one SDK
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SdkReport {
    /// Tracked SDK
    #[serde(flatten)]
    pub spec: SdkSpec,
    /// GitHub URL
    pub repo_url: String,
    /// Repository statistics, if GitHub answered
    pub repo_info: Option<RepoInfo>,
    /// Newest releases, newest first
    pub releases: Vec<Release>,
    /// npm version, if published there
    pub npm: Option<PackageVersion>,
    /// PyPI version, if published there
    pub pypi: Option<PackageVersion>,
    /// Code snippets from the latest release notes
    pub code_examples: Vec<String>,
}

impl SdkReport {
    /// Newest release, if any
    pub fn latest_release(&self) -> Option<&Release> {
        self.releases.first()
    }
}

/// Row of `sdk_updates.json`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SdkSummary {
    /// SDK name
    pub name: String,
    /// GitHub URL
    pub repo_url: String,
    /// Latest release tag or `N/A`
    pub latest_version: String,
    /// Latest release time or `N/A`
    pub latest_release_date: String,
    /// Stars, if known
    pub stars: Option<u64>,
    /// Latest npm version
    pub npm_version: Option<String>,
    /// Latest PyPI version
    pub pypi_version: Option<String>,
    /// Local time of the update
    pub updated_at: String,
}

impl SdkSummary {
    fn from_report(report: &SdkReport, updated_at: &str) -> Self {
        let latest = report.latest_release();
        Self {
            name: report.spec.name.clone(),
            repo_url: report.repo_url.clone(),
            latest_version: latest.map_or_else(|| "N/A".into(), |r| r.tag_name.clone()),
            latest_release_date: latest
                .and_then(|r| r.published_at.clone())
                .unwrap_or_else(|| "N/A".into()),
            stars: report.repo_info.as_ref().and_then(|i| i.stargazers_count),
            npm_version: report.npm.as_ref().map(|p| p.latest_version.clone()),
            pypi_version: report.pypi.as_ref().map(|p| p.latest_version.clone()),
            updated_at: updated_at.to_string(),
        }
    }
}

/// Code snippets in release notes
///
/// Fenced blocks are preferred; when there are none, inline code spans are
/// returned instead.
pub fn extract_code_examples(notes: &str) -> Vec<String> {
    let fenced: Vec<String> = FENCED_CODE
        .captures_iter(notes)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();
    if !fenced.is_empty() {
        return fenced;
    }
    INLINE_CODE
        .captures_iter(notes)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

/// SDK updates page
pub fn render_report(reports: &[SdkReport], generated_at: &str) -> String {
    let mut md = String::from("# SDK Updates Report\n\n");
    let _ = writeln!(md, "*Generated on: {generated_at}*\n");
    md.push_str("This report tracks updates to popular Web3 SDKs and developer tools.\n\n");
    md.push_str("## Latest SDK Releases\n\n");
    md.push_str("| SDK | Latest Version | Release Date | Changes |\n");
    md.push_str("|-----|----------------|--------------|---------|\n");
    for report in reports {
        let latest = report.latest_release();
        let changes = latest.map(|r| truncate_text(&r.body, 103, "...")).unwrap_or_default();
        let _ = writeln!(
            md,
            "| [{}]({}) | {} | {} | {} |",
            report.spec.name,
            report.repo_url,
            or_na(latest.map(|r| r.tag_name.as_str())),
            or_na(latest.and_then(Release::published_date)),
            table_cell(&changes)
        );
    }

    md.push_str("\n## SDK Details\n\n");
    for report in reports {
        let spec = &report.spec;
        let _ = writeln!(md, "### {}\n", spec.name);
        let _ = writeln!(
            md,
            "**Repository:** [{}/{}]({})\n",
            spec.repo_owner, spec.repo_name, report.repo_url
        );

        let info = report.repo_info.clone().unwrap_or_default();
        let _ = writeln!(md, "**Description:** {}\n", or_na(info.description));
        let _ = writeln!(
            md,
            "**Stars:** {} | **Forks:** {} | **Open Issues:** {}\n",
            or_na(info.stargazers_count),
            or_na(info.forks_count),
            or_na(info.open_issues_count)
        );

        if let Some(release) = report.latest_release() {
            let _ = writeln!(
                md,
                "**Latest Release:** [{}]({})\n",
                release.tag_name,
                if release.html_url.is_empty() {
                    "#"
                } else {
                    release.html_url.as_str()
                }
            );
            let _ = writeln!(md, "**Released on:** {}\n", or_na(release.published_date()));
            if !release.body.is_empty() {
                let _ = writeln!(md, "**Release Notes:**\n\n```\n{}\n```\n", release.body);
            }
        }

        if !report.code_examples.is_empty() {
            md.push_str("**Code Examples:**\n\n");
            for (i, example) in report.code_examples.iter().take(EXAMPLES_SHOWN).enumerate() {
                let _ = writeln!(md, "Example {}:\n\n```\n{example}\n```\n", i + 1);
            }
        }

        if let Some(npm) = &report.npm {
            let _ = writeln!(
                md,
                "**NPM Package:** [{0}](https://www.npmjs.com/package/{0}) ({1})\n",
                npm.name, npm.latest_version
            );
        }
        if let Some(pypi) = &report.pypi {
            let _ = writeln!(
                md,
                "**PyPI Package:** [{0}](https://pypi.org/project/{0}) ({1})\n",
                pypi.name, pypi.latest_version
            );
        }
        md.push_str("---\n\n");
    }
    md
}

fn github_request(ctx: &TaskContext, path: &str) -> FetchRequest {
    let auth = ctx
        .config
        .api
        .github_token
        .as_deref()
        .map(|token| format!("token {token}"));
    FetchRequest::get(format!("{}{path}", ctx.config.sources.github))
        .header("Accept", "application/vnd.github.v3+json")
        .header_opt("Authorization", auth)
}

async fn package_version(ctx: &TaskContext, registry: &str, name: &str) -> PackageVersion {
    let latest = match registry {
        "npm" => {
            let url = format!("{}/{}", ctx.config.sources.npm, urlencoding::encode(name));
            ctx.source(format!("npm_{name}"))
                .fetch_json_with(FetchRequest::get(url), |doc: NpmDocument| doc.dist_tags.latest)
                .await
        }
        _ => {
            let url = format!("{}/{}/json", ctx.config.sources.pypi, urlencoding::encode(name));
            ctx.source(format!("pypi_{name}"))
                .fetch_json_with(FetchRequest::get(url), |doc: PypiDocument| doc.info.version)
                .await
        }
    };
    PackageVersion {
        name: name.to_string(),
        latest_version: latest
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "N/A".to_string()),
    }
}

/// Collect releases, repository statistics and package versions for one SDK
pub async fn collect(ctx: &TaskContext, spec: &SdkSpec) -> SdkReport {
    let slug = format!("{}_{}", spec.repo_owner, spec.repo_name);
    let repo_path = format!("/repos/{}/{}", spec.repo_owner, spec.repo_name);

    let releases = ctx
        .source(format!("github_releases_{slug}"))
        .fetch_json_with(
            github_request(ctx, &format!("{repo_path}/releases")).param("per_page", RELEASES_KEPT),
            |mut releases: Vec<Release>| {
                releases.truncate(RELEASES_KEPT);
                releases
            },
        )
        .await
        .unwrap_or_else(|reason| {
            tracing::warn!(sdk = %spec.name, reason, "No releases fetched");
            Vec::new()
        });

    let repo_info = ctx
        .source(format!("github_repo_{slug}"))
        .fetch_json::<RepoInfo>(github_request(ctx, &repo_path))
        .await
        .ok();

    let npm = match &spec.npm_package {
        Some(name) => Some(package_version(ctx, "npm", name).await),
        None => None,
    };
    let pypi = match &spec.pypi_package {
        Some(name) => Some(package_version(ctx, "pypi", name).await),
        None => None,
    };

    let code_examples = releases
        .first()
        .map(|r| extract_code_examples(&r.body))
        .unwrap_or_default();

    SdkReport {
        spec: spec.clone(),
        repo_url: spec.repo_url(),
        repo_info,
        releases,
        npm,
        pypi,
        code_examples,
    }
}

/// Tracks SDK releases
#[derive(Clone, Copy, Debug, Default)]
pub struct SdkJob;

#[async_trait]
impl Job for SdkJob {
    fn name(&self) -> &str {
        "sdk"
    }

    fn description(&self) -> &str {
        "Fetch SDK and developer tool updates"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let data_dir = ctx.config.paths.data_dir.join("tools");
        let content_dir = ctx.config.paths.content_dir.join("tools");
        ensure_directory(&data_dir).await?;
        ensure_directory(&content_dir).await?;

        let mut reports = Vec::with_capacity(ctx.config.sdk.sdks.len());
        for (i, spec) in ctx.config.sdk.sdks.iter().enumerate() {
            if i > 0 {
                ctx.pace().await;
            }
            tracing::info!(sdk = %spec.name, "Processing SDK");
            reports.push(collect(ctx, spec).await);
        }

        let updated_at = generated_at();
        save_markdown(&render_report(&reports, &updated_at), &content_dir.join("index.md")).await?;
        let summaries: Vec<SdkSummary> = reports
            .iter()
            .map(|r| SdkSummary::from_report(r, &updated_at))
            .collect();
        save_json(&summaries, &data_dir.join("sdk_updates.json")).await?;

        tracing::info!(sdks = reports.len(), "SDK update report generated");
        Ok(())
    }
}
