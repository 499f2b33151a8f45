//! Airdrop project tracker
//!
//! Tracks a curated list of projects with expected airdrops, looks up their
//! Galxe campaigns, spreads the project tasks over a 30-day calendar and
//! renders a tracker page. Galxe is optional: a project that cannot be found
//! there is reported without campaigns.

use super::{generated_at, null_as_default};
use crate::context::TaskContext;
use crate::error::Result;
use crate::fetch::FetchRequest;
use crate::output::{ensure_directory, save_json, save_markdown};
use crate::runner::Job;
use crate::utils::table_cell;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Days covered by the task calendar, starting today
pub const CALENDAR_DAYS: usize = 30;

/// Campaigns listed per project in the details section
const CAMPAIGNS_SHOWN: usize = 5;

/// A Galxe campaign
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Campaign {
    /// Galxe campaign id
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    /// Campaign title
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    /// Campaign type (Drop, Oat, ...)
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    /// Unix start time
    #[serde(alias = "startTime")]
    pub start_time: Option<i64>,
    /// Unix end time
    #[serde(alias = "endTime")]
    pub end_time: Option<i64>,
    /// Participants so far
    #[serde(alias = "participantsCount", deserialize_with = "null_as_default")]
    pub participants: u64,
}

/// A project expected to reward early users
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirdropProject {
    /// Display name
    pub name: String,
    /// Twitter handle, without `@`
    pub twitter: String,
    /// Zealy community slug
    pub zealy: String,
    /// Galxe space name
    pub galxe: String,
    /// Project category
    pub category: String,
    /// One-line description
    pub description: String,
    /// Expected airdrop window, free text
    pub expected_airdrop: String,
    /// Tasks that qualify a wallet
    pub tasks: Vec<String>,
    /// Galxe campaigns, empty when Galxe had nothing
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub campaigns: Vec<Campaign>,
}

impl AirdropProject {
    /// Zealy quest board of the project
    pub fn questboard_url(&self) -> String {
        format!("https://zealy.io/c/{}/questboard", self.zealy)
    }

    fn anchor(&self) -> String {
        self.name.to_lowercase().replace(' ', "-")
    }
}

/// One task scheduled on the calendar
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    /// Project name
    pub project: String,
    /// What to do
    pub task: String,
    /// Where to do it
    pub link: String,
}

/// Date (`YYYY-MM-DD`) to scheduled tasks; every day of the window is present
pub type Calendar = BTreeMap<String, Vec<CalendarEntry>>;

#[derive(Default, Deserialize)]
struct Space {
    #[serde(default, deserialize_with = "null_as_default")]
    id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
}

#[derive(Default, Deserialize)]
struct SearchData {
    #[serde(default, deserialize_with = "null_as_default")]
    spaces: Vec<Space>,
}

#[derive(Default, Deserialize)]
struct CampaignData {
    #[serde(default, deserialize_with = "null_as_default")]
    campaigns: Vec<Campaign>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    data: SearchData,
}

#[derive(Deserialize)]
struct CampaignResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    data: CampaignData,
}

/// Spread projects over the calendar window starting at `start`
///
/// Project `i` lands on day `i % CALENDAR_DAYS`. Returns the calendar and
/// each project's scheduled date.
pub fn build_calendar(projects: &[AirdropProject], start: NaiveDate) -> (Calendar, BTreeMap<String, String>) {
    let days: Vec<String> = start
        .iter_days()
        .take(CALENDAR_DAYS)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect();
    let mut calendar: Calendar = days.iter().map(|d| (d.clone(), Vec::new())).collect();
    let mut project_dates = BTreeMap::new();

    for (i, project) in projects.iter().enumerate() {
        let date = &days[i % days.len()];
        if let Some(entries) = calendar.get_mut(date) {
            entries.push(CalendarEntry {
                project: project.name.clone(),
                task: format!("Complete {} tasks", project.name),
                link: project.questboard_url(),
            });
        }
        project_dates.insert(project.name.clone(), date.clone());
    }
    (calendar, project_dates)
}

fn task_preview(tasks: &[String]) -> String {
    let shown = tasks.iter().take(2).map(String::as_str).collect::<Vec<_>>().join(", ");
    if tasks.len() > 2 {
        format!("{shown}, ...")
    } else {
        shown
    }
}

/// Tracker page
pub fn render_report(
    projects: &[AirdropProject],
    calendar: &Calendar,
    project_dates: &BTreeMap<String, String>,
    generated_at: &str,
) -> String {
    let mut md = String::from("# Airdrop Projects Tracker\n\n");
    let _ = writeln!(md, "*Generated on: {generated_at}*\n");

    md.push_str(
        "## Upcoming Airdrop Projects\n\n\
         | Project | Category | Expected Airdrop | Twitter | Tasks |\n\
         |---------|----------|------------------|---------|-------|\n",
    );
    for p in projects {
        let _ = writeln!(
            md,
            "| [{}](#{}) | {} | {} | [@{tw}](https://twitter.com/{tw}) | {} |",
            table_cell(&p.name),
            p.anchor(),
            table_cell(&p.category),
            table_cell(&p.expected_airdrop),
            table_cell(&task_preview(&p.tasks)),
            tw = p.twitter,
        );
    }

    md.push_str(
        "\n## Airdrop Task Calendar\n\n\
         | Date | Project | Task | Link |\n\
         |------|---------|------|------|\n",
    );
    for (date, entries) in calendar {
        for entry in entries {
            let _ = writeln!(
                md,
                "| {date} | {} | {} | [Complete Tasks]({}) |",
                table_cell(&entry.project),
                table_cell(&entry.task),
                entry.link
            );
        }
    }

    md.push_str("\n## Project Details\n\n");
    for p in projects {
        let _ = writeln!(md, "### {}\n", p.name);
        let _ = writeln!(md, "**Category:** {}\n", p.category);
        let _ = writeln!(md, "**Description:** {}\n", p.description);
        let _ = writeln!(md, "**Expected Airdrop:** {}\n", p.expected_airdrop);
        let _ = writeln!(
            md,
            "**Twitter:** [@{tw}](https://twitter.com/{tw})\n",
            tw = p.twitter
        );

        md.push_str("**Required Tasks:**\n\n");
        for task in &p.tasks {
            let _ = writeln!(md, "- {task}");
        }

        if !p.campaigns.is_empty() {
            md.push_str("\n**Galxe Campaigns:**\n\n");
            for c in p.campaigns.iter().take(CAMPAIGNS_SHOWN) {
                let _ = writeln!(md, "- {} ({} participants)", c.name, c.participants);
            }
        }
        let _ = writeln!(md, "\n[View All Quests on Zealy]({})", p.questboard_url());

        if let Some(date) = project_dates.get(&p.name) {
            let _ = writeln!(md, "\n**Next Task Deadline:** {date}");
        }
        md.push_str("\n---\n\n");
    }
    md
}

/// Campaigns of the Galxe space named `space`, matched case-insensitively
async fn fetch_campaigns(ctx: &TaskContext, space: &str) -> Vec<Campaign> {
    let base = &ctx.config.sources.galxe;
    let slug = space.to_lowercase();
    let wanted = slug.clone();

    let search = FetchRequest::get(format!("{base}/search")).param("keyword", space);
    let space_id = ctx
        .source(format!("galxe_search_{slug}"))
        .fetch_json_with(search, move |raw: SearchResponse| {
            raw.data
                .spaces
                .into_iter()
                .find(|s| s.name.to_lowercase() == wanted)
                .map(|s| s.id)
                .filter(|id| !id.is_empty())
        })
        .await
        .ok()
        .flatten();

    let Some(id) = space_id else {
        tracing::info!(project = space, "Project not found on Galxe");
        return Vec::new();
    };

    let request = FetchRequest::get(format!("{base}/spaces/{}/campaigns", urlencoding::encode(&id)));
    ctx.source(format!("galxe_campaigns_{id}"))
        .fetch_json_with(request, |raw: CampaignResponse| raw.data.campaigns)
        .await
        .unwrap_or_else(|reason| {
            tracing::warn!(project = space, reason, "Galxe campaigns unavailable");
            Vec::new()
        })
}

/// Builds the airdrop tracker
#[derive(Clone, Copy, Debug, Default)]
pub struct AirdropsJob;

#[async_trait]
impl Job for AirdropsJob {
    fn name(&self) -> &str {
        "airdrops"
    }

    fn description(&self) -> &str {
        "Fetch airdrop projects and build the task calendar"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let data_dir = ctx.config.paths.data_dir.join("airdrops");
        let content_dir = ctx.config.paths.content_dir.join("airdrops");
        ensure_directory(&data_dir).await?;
        ensure_directory(&content_dir).await?;

        let mut projects = tracked_projects();
        for (i, project) in projects.iter_mut().enumerate() {
            if i > 0 {
                ctx.pace().await;
            }
            tracing::info!(project = %project.name, "Enriching airdrop project");
            project.campaigns = fetch_campaigns(ctx, &project.galxe).await;
        }

        let today = chrono::Local::now().date_naive();
        let (calendar, project_dates) = build_calendar(&projects, today);

        let markdown = render_report(&projects, &calendar, &project_dates, &generated_at());
        save_markdown(&markdown, &content_dir.join("index.md")).await?;
        save_json(&projects, &data_dir.join("projects.json")).await?;
        save_json(&calendar, &data_dir.join("calendar.json")).await?;

        tracing::info!(projects = projects.len(), "Airdrop tracker generated");
        Ok(())
    }
}

fn project(
    name: &str,
    twitter: &str,
    zealy: &str,
    category: &str,
    description: &str,
    expected_airdrop: &str,
    tasks: [&str; 3],
) -> AirdropProject {
    AirdropProject {
        name: name.into(),
        twitter: twitter.into(),
        zealy: zealy.into(),
        galxe: name.into(),
        category: category.into(),
        description: description.into(),
        expected_airdrop: expected_airdrop.into(),
        tasks: tasks.iter().map(|t| t.to_string()).collect(),
        campaigns: Vec::new(),
    }
}

/// Projects tracked by the job
pub fn tracked_projects() -> Vec<AirdropProject> {
    vec![
        project(
            "LayerZero",
            "LayerZero_Labs",
            "layerzero",
            "Cross-chain",
            "Omnichain interoperability protocol",
            "Q1 2024",
            ["Bridge assets", "Use supported dApps", "Participate in Zealy quests"],
        ),
        project(
            "ZKSync",
            "zksync",
            "zksync",
            "Layer 2",
            "Zero-knowledge rollup scaling solution",
            "TBA",
            ["Bridge to ZKSync", "Use ZKSync dApps", "Complete Galxe campaigns"],
        ),
        project(
            "Starknet",
            "StarkNetEco",
            "starknet",
            "Layer 2",
            "Permissionless validity-rollup",
            "TBA",
            ["Deploy contracts", "Use Starknet dApps", "Participate in community"],
        ),
        project(
            "Scroll",
            "Scroll_ZKP",
            "scroll",
            "Layer 2",
            "zkEVM-based Layer 2 solution",
            "2024",
            ["Bridge to Scroll", "Use Scroll dApps", "Complete testnet tasks"],
        ),
        project(
            "Linea",
            "LineaBuild",
            "linea",
            "Layer 2",
            "Consensys zkEVM rollup",
            "TBA",
            ["Bridge to Linea", "Use Linea dApps", "Complete Galxe campaigns"],
        ),
    ]
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::test_context;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn calendar_spans_thirty_days_and_wraps() {
        let many: Vec<AirdropProject> = (0..32)
            .map(|i| AirdropProject { name: format!("p{i}"), zealy: format!("z{i}"), ..Default::default() })
            .collect();

        let (calendar, dates) = build_calendar(&many, day("2024-02-20"));

        assert_eq!(calendar.len(), CALENDAR_DAYS);
        assert_eq!(calendar.keys().next().unwrap(), "2024-02-20");
        assert_eq!(calendar.keys().last().unwrap(), "2024-03-20");
        assert_eq!(dates["p0"], "2024-02-20");
        assert_eq!(dates["p30"], "2024-02-20");
        assert_eq!(dates["p31"], "2024-02-21");

        let first = &calendar["2024-02-20"];
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].task, "Complete p0 tasks");
        assert_eq!(first[0].link, "https://zealy.io/c/z0/questboard");
    }

    #[test]
    fn report_lists_projects_calendar_and_details() {
        let mut projects = tracked_projects();
        projects[1].campaigns = vec![Campaign {
            name: "zkSync Odyssey".into(),
            participants: 1200,
            ..Default::default()
        }];
        let (calendar, dates) = build_calendar(&projects, day("2024-01-01"));

        let md = render_report(&projects, &calendar, &dates, "2024-01-01 00:00:00");

        assert!(md.starts_with("# Airdrop Projects Tracker\n\n*Generated on: 2024-01-01 00:00:00*"));
        assert!(md.contains(
            "| [LayerZero](#layerzero) | Cross-chain | Q1 2024 | [@LayerZero_Labs](https://twitter.com/LayerZero_Labs) | Bridge assets, Use supported dApps, ... |"
        ), "{md}");
        assert!(md.contains(
            "| 2024-01-05 | Linea | Complete Linea tasks | [Complete Tasks](https://zealy.io/c/linea/questboard) |"
        ));
        // Empty days are not rendered
        assert!(!md.contains("| 2024-01-06 |"));
        assert!(md.contains("- zkSync Odyssey (1200 participants)"));
        assert!(md.contains("**Next Task Deadline:** 2024-01-03"));
        assert_eq!(md.matches("\n---\n").count(), projects.len());
    }

    #[tokio::test]
    async fn job_attaches_matching_galxe_campaigns() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("keyword", "Scroll"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"spaces": [
                    {"id": "99", "name": "Scroll Fans"},
                    {"id": "42", "name": "scroll"}
                ]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/spaces/42/campaigns"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"campaigns": [{
                    "id": "GC1", "name": "Scroll Origins", "type": "Drop",
                    "startTime": 1700000000, "endTime": null, "participantsCount": 5000
                }]}
            })))
            .mount(&server)
            .await;
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), &server.uri());

        AirdropsJob.run(&ctx).await.unwrap();

        let projects: Vec<AirdropProject> = serde_json::from_str(
            &std::fs::read_to_string(tmp.path().join("data/airdrops/projects.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(projects.len(), 5);
        let scroll = projects.iter().find(|p| p.name == "Scroll").unwrap();
        assert_eq!(scroll.campaigns.len(), 1);
        assert_eq!(scroll.campaigns[0].kind, "Drop");
        assert_eq!(scroll.campaigns[0].start_time, Some(1_700_000_000));
        assert_eq!(scroll.campaigns[0].participants, 5000);
        assert!(projects.iter().filter(|p| p.name != "Scroll").all(|p| p.campaigns.is_empty()));

        let calendar: Calendar = serde_json::from_str(
            &std::fs::read_to_string(tmp.path().join("data/airdrops/calendar.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(calendar.len(), CALENDAR_DAYS);
        assert_eq!(calendar.values().map(Vec::len).sum::<usize>(), 5);

        let md = std::fs::read_to_string(tmp.path().join("content/airdrops/index.md")).unwrap();
        assert!(md.contains("- Scroll Origins (5000 participants)"), "{md}");
    }

    #[tokio::test]
    async fn job_succeeds_without_galxe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), &server.uri());

        AirdropsJob.run(&ctx).await.unwrap();

        let md = std::fs::read_to_string(tmp.path().join("content/airdrops/index.md")).unwrap();
        assert!(md.contains("### Starknet"));
        assert!(!md.contains("**Galxe Campaigns:**"));
        // Search failures are not cached, and no campaigns lookup follows
        assert_eq!(server.received_requests().await.unwrap().len(), 5);
    }
}
