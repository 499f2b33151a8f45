//! Tutorial index
//!
//! Scans `CONTENT_DIR/tutorials` for Markdown tutorials, reads their YAML
//! front matter and writes an index page grouped by category and tag, plus
//! the collected metadata as JSON.

use super::generated_at;
use crate::context::TaskContext;
use crate::error::{Error, Result};
use crate::output::{ensure_directory, save_json, save_markdown};
use crate::runner::Job;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;
use walkdir::WalkDir;

/// Generated index, skipped when scanning
pub const INDEX_FILE: &str = "index.md";

/// Metadata written next to the index
pub const METADATA_FILE: &str = "tutorials_metadata.json";

#[allow(clippy::expect_used)]
static FRONT_MATTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^---\s*(.*?)\s*---").expect("front matter pattern is valid"));

/// Metadata of one tutorial
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tutorial {
    /// Display title
    pub title: String,
    /// Publication date as written, empty when unknown
    pub date: String,
    /// Free-form tags
    pub tags: Vec<String>,
    /// Categories
    pub categories: Vec<String>,
    /// Short description, may be empty
    pub description: String,
    /// Path relative to the tutorials directory, `/`-separated
    pub path: String,
    /// Source format
    #[serde(rename = "type")]
    pub kind: String,
}

impl Tutorial {
    /// Site link: the relative path with `.md` replaced by `/`
    pub fn link(&self) -> String {
        match self.path.strip_suffix(".md") {
            Some(stem) => format!("{stem}/"),
            None => self.path.clone(),
        }
    }
}

/// Tutorials grouped by category and by tag, names sorted
#[derive(Debug, Default)]
pub struct Categorized<'a> {
    /// Category name to its tutorials
    pub by_category: BTreeMap<&'a str, Vec<&'a Tutorial>>,
    /// Tag to its tutorials
    pub by_tag: BTreeMap<&'a str, Vec<&'a Tutorial>>,
}

/// Front matter of the generated index
#[derive(Serialize)]
struct IndexFrontMatter<'a> {
    date: &'a str,
    description: &'a str,
    draft: bool,
    title: &'a str,
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// `getting-started.md` → `Getting Started`
fn title_from_file_name(file_name: &str) -> String {
    let stem = file_name.strip_suffix(".md").unwrap_or(file_name);
    title_case(&stem.replace('-', " "))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A single value or a sequence of values, as strings
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Sequence(items)) => items.iter().filter_map(scalar).collect(),
        Some(other) => scalar(other).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Metadata from a tutorial's content
///
/// Without front matter, or when it is not a YAML mapping, only the title
/// (derived from the file name) is known.
pub fn parse_tutorial(content: &str, path: &str) -> Tutorial {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let mut tutorial = Tutorial {
        title: title_from_file_name(file_name),
        path: path.to_string(),
        kind: "markdown".into(),
        ..Default::default()
    };

    let Some(block) = FRONT_MATTER_RE.captures(content).and_then(|c| c.get(1)) else {
        return tutorial;
    };
    let doc: Value = match serde_yaml::from_str(block.as_str()) {
        Ok(doc @ Value::Mapping(_)) => doc,
        Ok(_) => return tutorial,
        Err(e) => {
            tracing::error!(path, error = %e, "Error parsing front matter");
            return tutorial;
        }
    };

    if let Some(title) = doc.get("title").and_then(scalar) {
        tutorial.title = title;
    }
    tutorial.date = doc.get("date").and_then(scalar).unwrap_or_default();
    tutorial.description = doc.get("description").and_then(scalar).unwrap_or_default();
    tutorial.tags = string_list(doc.get("tags"));
    tutorial.categories = string_list(doc.get("categories"));
    tutorial
}

/// Every Markdown tutorial under `root`, sorted by path
///
/// The generated index at the top level is skipped. A missing directory
/// yields no tutorials.
pub fn scan_tutorials(root: &Path) -> Vec<Tutorial> {
    let mut tutorials = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if e.depth() > 0 {
                    tracing::warn!(error = %e, "Skipping unreadable tutorial entry");
                }
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "md") {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if relative == INDEX_FILE {
            continue;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => tutorials.push(parse_tutorial(&content, &relative)),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Cannot read tutorial"),
        }
    }
    tutorials
}

/// Group tutorials by category and by tag
pub fn categorize(tutorials: &[Tutorial]) -> Categorized<'_> {
    let mut grouped = Categorized::default();
    for tutorial in tutorials {
        for category in &tutorial.categories {
            grouped.by_category.entry(category.as_str()).or_default().push(tutorial);
        }
        for tag in &tutorial.tags {
            grouped.by_tag.entry(tag.as_str()).or_default().push(tutorial);
        }
    }
    grouped
}

fn by_title<'a>(tutorials: impl IntoIterator<Item = &'a Tutorial>) -> Vec<&'a Tutorial> {
    let mut sorted: Vec<&Tutorial> = tutorials.into_iter().collect();
    sorted.sort_by(|a, b| a.title.cmp(&b.title));
    sorted
}

/// Index page with YAML front matter
pub fn render_index(tutorials: &[Tutorial], generated_at: &str) -> Result<String> {
    let front_matter = serde_yaml::to_string(&IndexFrontMatter {
        date: generated_at,
        description: "Index of all tutorials",
        draft: false,
        title: "Tutorials Index",
    })
    .map_err(|e| Error::Other(format!("front matter: {e}")))?;

    let mut md = format!("---\n{front_matter}---\n\n# Tutorial Index\n\n");
    let _ = writeln!(md, "*Last updated: {generated_at}*\n");
    md.push_str(
        "Welcome to our comprehensive tutorial collection. Browse by category or explore the full list below.\n\n",
    );

    let grouped = categorize(tutorials);
    md.push_str("## Categories\n\n");
    for (category, members) in &grouped.by_category {
        let _ = writeln!(md, "### {}\n", title_case(category));
        for t in by_title(members.iter().copied()) {
            let _ = write!(md, "- [{}]({})", t.title, t.link());
            if !t.description.is_empty() {
                let _ = write!(md, " - {}", t.description);
            }
            md.push('\n');
        }
        md.push('\n');
    }

    md.push_str("## Tags\n\n");
    for (tag, members) in &grouped.by_tag {
        let _ = writeln!(md, "### #{tag}\n");
        for t in by_title(members.iter().copied()) {
            let _ = writeln!(md, "- [{}]({})", t.title, t.link());
        }
        md.push('\n');
    }

    md.push_str("## All Tutorials\n\n");
    for t in by_title(tutorials) {
        let _ = write!(md, "- [{}]({})", t.title, t.link());
        if !t.date.is_empty() {
            let _ = write!(md, " ({})", t.date);
        }
        md.push('\n');
    }
    Ok(md)
}

/// Builds the tutorial index
#[derive(Clone, Copy, Debug, Default)]
pub struct TutorialsJob;

#[async_trait]
impl Job for TutorialsJob {
    fn name(&self) -> &str {
        "tutorials"
    }

    fn description(&self) -> &str {
        "Build the tutorial index"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let dir = ctx.config.paths.content_dir.join("tutorials");
        ensure_directory(&dir).await?;

        let root = dir.clone();
        let tutorials = tokio::task::spawn_blocking(move || scan_tutorials(&root))
            .await
            .map_err(|e| Error::Other(format!("tutorial scan failed: {e}")))?;

        let markdown = render_index(&tutorials, &generated_at())?;
        save_markdown(&markdown, &dir.join(INDEX_FILE)).await?;
        save_json(&tutorials, &dir.join(METADATA_FILE)).await?;

        tracing::info!(tutorials = tutorials.len(), "Tutorial index generated");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const WITH_FRONT_MATTER: &str = "---\n\
        title: Deploying an ERC-20\n\
        date: 2024-02-01\n\
        tags: [solidity, tokens]\n\
        categories: smart contracts\n\
        description: From zero to mainnet\n\
        ---\n\n# Body\n";

    #[test]
    fn front_matter_fields_are_read() {
        let t = parse_tutorial(WITH_FRONT_MATTER, "eth/erc20.md");

        assert_eq!(t.title, "Deploying an ERC-20");
        assert_eq!(t.date, "2024-02-01");
        assert_eq!(t.tags, ["solidity", "tokens"]);
        assert_eq!(t.categories, ["smart contracts"]);
        assert_eq!(t.description, "From zero to mainnet");
        assert_eq!(t.kind, "markdown");
        assert_eq!(t.link(), "eth/erc20/");
    }

    #[test]
    fn missing_or_broken_front_matter_keeps_file_title() {
        let plain = parse_tutorial("# Just text\n", "wallet-setup-GUIDE.md");
        assert_eq!(plain.title, "Wallet Setup Guide");
        assert!(plain.tags.is_empty() && plain.date.is_empty());

        let broken = parse_tutorial("---\ntitle: [unclosed\n---\n", "x/gas-fees.md");
        assert_eq!(broken.title, "Gas Fees");

        let scalar_doc = parse_tutorial("---\njust a string\n---\n", "y.md");
        assert_eq!(scalar_doc.title, "Y");
    }

    #[test]
    fn index_groups_by_category_and_tag() {
        let tutorials = vec![
            parse_tutorial(WITH_FRONT_MATTER, "eth/erc20.md"),
            parse_tutorial(
                "---\ntitle: Bridging Basics\ntags: tokens\ncategories: [defi, smart contracts]\n---\n",
                "bridging.md",
            ),
            parse_tutorial("no front matter", "zk-intro.md"),
        ];

        let md = render_index(&tutorials, "2024-03-01 10:00:00").unwrap();

        assert!(md.starts_with("---\n"));
        assert!(md.contains("title: Tutorials Index\n"));
        assert!(md.contains("draft: false\n"));
        assert!(md.contains("*Last updated: 2024-03-01 10:00:00*"));

        let defi = md.find("### Defi").unwrap();
        let contracts = md.find("### Smart Contracts").unwrap();
        assert!(defi < contracts);
        let section = &md[contracts..md.find("## Tags").unwrap()];
        assert_eq!(
            section.lines().filter(|l| l.starts_with("- ")).collect::<Vec<_>>(),
            [
                "- [Bridging Basics](bridging/)",
                "- [Deploying an ERC-20](eth/erc20/) - From zero to mainnet",
            ]
        );
        assert!(md.contains("### #tokens\n\n- [Bridging Basics](bridging/)\n- [Deploying an ERC-20](eth/erc20/)\n"));

        let all = &md[md.find("## All Tutorials").unwrap()..];
        assert!(all.contains("- [Deploying an ERC-20](eth/erc20/) (2024-02-01)\n"));
        assert!(all.contains("- [Zk Intro](zk-intro/)\n"));
    }

    #[tokio::test]
    async fn job_indexes_nested_tutorials_and_skips_its_own_index() {
        let tmp = TempDir::new().unwrap();
        let ctx = crate::jobs::test_context(tmp.path(), "http://127.0.0.1:9");
        let dir = tmp.path().join("content/tutorials");
        std::fs::create_dir_all(dir.join("eth")).unwrap();
        std::fs::write(dir.join("eth/erc20.md"), WITH_FRONT_MATTER).unwrap();
        std::fs::write(dir.join("intro.md"), "# Intro").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        TutorialsJob.run(&ctx).await.unwrap();
        // A second run must not index the generated page
        TutorialsJob.run(&ctx).await.unwrap();

        let metadata: Vec<Tutorial> =
            serde_json::from_str(&std::fs::read_to_string(dir.join(METADATA_FILE)).unwrap()).unwrap();
        let paths: Vec<&str> = metadata.iter().map(|t| t.path.as_str()).collect();
        assert_eq!(paths, ["eth/erc20.md", "intro.md"]);
        let index = std::fs::read_to_string(dir.join(INDEX_FILE)).unwrap();
        assert!(index.contains("- [Intro](intro/)"));
    }

    #[tokio::test]
    async fn job_writes_empty_index_without_tutorials() {
        let tmp = TempDir::new().unwrap();
        let ctx = crate::jobs::test_context(tmp.path(), "http://127.0.0.1:9");

        TutorialsJob.run(&ctx).await.unwrap();

        let dir = tmp.path().join("content/tutorials");
        let index = std::fs::read_to_string(dir.join(INDEX_FILE)).unwrap();
        assert!(index.contains("## All Tutorials\n\n"));
        assert_eq!(std::fs::read_to_string(dir.join(METADATA_FILE)).unwrap().trim(), "[]");
    }
}
