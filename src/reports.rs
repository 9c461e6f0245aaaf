//! Quarterly and annual progress reports.
//!
//! Reports are assembled from a plain list of goals so the grouping and
//! thresholds can be exercised without a database. `render_text` produces a
//! plain-text layout meant to be pasted into slides.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{GoalListItem, GoalStatus, TeamLevel};
use crate::period::{PeriodKey, parse_quarter, validate_year};
use crate::storage::Storage;
use crate::Result;

/// Goals at or above this progress count as top performing.
const TOP_PERFORMING_MIN: f64 = 70.0;
/// Goals below this progress are at risk in a quarterly report.
const AT_RISK_BELOW: f64 = 40.0;
/// Goals below this progress need attention in an annual report.
const NEEDS_ATTENTION_BELOW: f64 = 30.0;
const HIGHLIGHT_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureLine {
    pub title: String,
    pub current: f64,
    pub target: f64,
    pub unit: String,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalLine {
    pub id: String,
    pub title: String,
    pub status: GoalStatus,
    pub progress: f64,
    pub owner: String,
    pub measures: Vec<MeasureLine>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamProgress {
    pub team_id: String,
    pub team_name: String,
    pub team_level: TeamLevel,
    pub total_goals: usize,
    pub completed_goals: usize,
    pub at_risk_goals: usize,
    pub avg_progress: i64,
    pub goals: Vec<GoalLine>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalHighlight {
    pub title: String,
    pub team: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarterlySummary {
    pub total_goals: usize,
    pub avg_progress: i64,
    pub by_status: BTreeMap<String, usize>,
    pub top_performing: Vec<GoalHighlight>,
    pub at_risk: Vec<GoalHighlight>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarterlyReport {
    pub quarter: String,
    pub year: i32,
    pub generated_at: DateTime<Utc>,
    pub organization: String,
    pub summary: QuarterlySummary,
    pub team_breakdown: Vec<TeamProgress>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarterProgress {
    pub quarter: String,
    pub avg_progress: i64,
    /// Number of measures scoped to the quarter
    pub goal_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualSummary {
    pub total_goals: usize,
    pub avg_progress: i64,
    pub by_status: BTreeMap<String, usize>,
    pub by_quarter: Vec<QuarterProgress>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlights {
    pub completed: Vec<GoalHighlight>,
    pub top_progress: Vec<GoalHighlight>,
    pub needs_attention: Vec<GoalHighlight>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualReport {
    pub year: i32,
    pub generated_at: DateTime<Utc>,
    pub organization: String,
    pub summary: AnnualSummary,
    pub team_breakdown: Vec<TeamProgress>,
    pub highlights: Highlights,
}

/// Either kind of report.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Report {
    Quarterly(QuarterlyReport),
    Annual(AnnualReport),
}

/// Build the report for quarter key `quarter` (e.g. `Q1-2026`).
pub fn quarterly_report(storage: &Storage, org_id: &str, quarter: &str) -> Result<QuarterlyReport> {
    let key = parse_quarter(quarter)?;
    let org = storage.get_organization(org_id)?;
    let goals = storage.goals_for_periods(org_id, &PeriodKey::keys_in_year(key.year()))?;
    Ok(build_quarterly(&org.name, key, goals, Utc::now()))
}

/// Build the report for a whole year.
pub fn annual_report(storage: &Storage, org_id: &str, year: i32) -> Result<AnnualReport> {
    validate_year(year)?;
    let org = storage.get_organization(org_id)?;
    let goals = storage.goals_for_periods(org_id, &PeriodKey::keys_in_year(year))?;
    Ok(build_annual(&org.name, year, goals, Utc::now()))
}

fn round(value: f64) -> i64 {
    value.round() as i64
}

fn mean_rounded(values: impl Iterator<Item = f64>) -> i64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0 } else { round(sum / n as f64) }
}

fn by_progress_desc(mut goals: Vec<GoalListItem>) -> Vec<GoalListItem> {
    goals.sort_by(|a, b| b.goal.progress.total_cmp(&a.goal.progress));
    goals
}

fn status_counts(goals: &[GoalListItem]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for g in goals {
        *counts.entry(g.goal.status.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}

fn team_breakdown(goals: &[GoalListItem]) -> Vec<TeamProgress> {
    let mut order: Vec<String> = Vec::new();
    let mut teams: HashMap<String, TeamProgress> = HashMap::new();

    for g in goals {
        let entry = teams.entry(g.team.id.clone()).or_insert_with(|| {
            order.push(g.team.id.clone());
            TeamProgress {
                team_id: g.team.id.clone(),
                team_name: g.team.name.clone(),
                team_level: g.team.level,
                total_goals: 0,
                completed_goals: 0,
                at_risk_goals: 0,
                avg_progress: 0,
                goals: Vec::new(),
            }
        });
        entry.total_goals += 1;
        if g.goal.status == GoalStatus::Completed {
            entry.completed_goals += 1;
        }
        if g.goal.status.is_troubled() {
            entry.at_risk_goals += 1;
        }
        entry.goals.push(GoalLine {
            id: g.goal.id.clone(),
            title: g.goal.title.clone(),
            status: g.goal.status,
            progress: g.goal.progress,
            owner: g.owner.full_name(),
            measures: g
                .measures
                .iter()
                .map(|m| MeasureLine {
                    title: m.title.clone(),
                    current: m.current_value,
                    target: m.target_value,
                    unit: m.unit.clone().unwrap_or_default(),
                    progress: m.progress,
                })
                .collect(),
        });
    }

    let mut breakdown: Vec<TeamProgress> = order
        .into_iter()
        .filter_map(|id| teams.remove(&id))
        .map(|mut t| {
            t.avg_progress = mean_rounded(t.goals.iter().map(|g| g.progress));
            t
        })
        .collect();
    breakdown.sort_by_key(|t| t.team_level.rank());
    breakdown
}

/// Assemble a quarterly report from every goal of the quarter's year.
/// Measures not scoped to the quarter are dropped.
pub fn build_quarterly(
    organization: &str,
    quarter: PeriodKey,
    goals: Vec<GoalListItem>,
    now: DateTime<Utc>,
) -> QuarterlyReport {
    let key = quarter.to_string();
    let goals: Vec<GoalListItem> = by_progress_desc(goals)
        .into_iter()
        .map(|mut g| {
            g.measures.retain(|m| m.period.as_deref() == Some(key.as_str()));
            g
        })
        .collect();

    let top_performing = goals
        .iter()
        .filter(|g| g.goal.progress >= TOP_PERFORMING_MIN)
        .take(HIGHLIGHT_LIMIT)
        .map(|g| GoalHighlight {
            title: g.goal.title.clone(),
            team: g.team.name.clone(),
            progress: Some(g.goal.progress),
            owner: None,
        })
        .collect();
    let at_risk = goals
        .iter()
        .filter(|g| g.goal.status.is_troubled() || g.goal.progress < AT_RISK_BELOW)
        .map(|g| GoalHighlight {
            title: g.goal.title.clone(),
            team: g.team.name.clone(),
            progress: Some(g.goal.progress),
            owner: Some(g.owner.full_name()),
        })
        .collect();

    QuarterlyReport {
        quarter: key,
        year: quarter.year(),
        generated_at: now,
        organization: organization.to_string(),
        summary: QuarterlySummary {
            total_goals: goals.len(),
            avg_progress: mean_rounded(goals.iter().map(|g| g.goal.progress)),
            by_status: status_counts(&goals),
            top_performing,
            at_risk,
        },
        team_breakdown: team_breakdown(&goals),
    }
}

/// Assemble an annual report from every goal of the year.
pub fn build_annual(
    organization: &str,
    year: i32,
    goals: Vec<GoalListItem>,
    now: DateTime<Utc>,
) -> AnnualReport {
    let goals = by_progress_desc(goals);

    let mut quarters: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for m in goals.iter().flat_map(|g| g.measures.iter()) {
        if let Some(period) = &m.period {
            let slot = quarters.entry(period.clone()).or_insert((0.0, 0));
            slot.0 += m.progress;
            slot.1 += 1;
        }
    }
    let by_quarter = quarters
        .into_iter()
        .map(|(quarter, (total, count))| QuarterProgress {
            quarter,
            avg_progress: if count > 0 { round(total / count as f64) } else { 0 },
            goal_count: count,
        })
        .collect();

    let completed = goals
        .iter()
        .filter(|g| g.goal.status == GoalStatus::Completed)
        .map(|g| GoalHighlight {
            title: g.goal.title.clone(),
            team: g.team.name.clone(),
            progress: None,
            owner: Some(g.owner.full_name()),
        })
        .collect();
    let top_progress = goals
        .iter()
        .filter(|g| g.goal.status != GoalStatus::Completed)
        .take(HIGHLIGHT_LIMIT)
        .map(|g| GoalHighlight {
            title: g.goal.title.clone(),
            team: g.team.name.clone(),
            progress: Some(g.goal.progress),
            owner: None,
        })
        .collect();
    let needs_attention = goals
        .iter()
        .filter(|g| g.goal.status.is_troubled() || g.goal.progress < NEEDS_ATTENTION_BELOW)
        .map(|g| GoalHighlight {
            title: g.goal.title.clone(),
            team: g.team.name.clone(),
            progress: Some(g.goal.progress),
            owner: None,
        })
        .collect();

    AnnualReport {
        year,
        generated_at: now,
        organization: organization.to_string(),
        summary: AnnualSummary {
            total_goals: goals.len(),
            avg_progress: mean_rounded(goals.iter().map(|g| g.goal.progress)),
            by_status: status_counts(&goals),
            by_quarter,
        },
        team_breakdown: team_breakdown(&goals),
        highlights: Highlights {
            completed,
            top_progress,
            needs_attention,
        },
    }
}

fn pct(value: f64) -> String {
    format!("{}%", round(value))
}

fn section(lines: &mut Vec<String>, title: &str) {
    lines.push(title.to_string());
    lines.push("-".repeat(40));
}

/// Render a report as plain text.
pub fn render_text(report: &Report) -> String {
    let mut lines: Vec<String> = Vec::new();

    let (total, avg, by_status, teams, generated_at) = match report {
        Report::Quarterly(r) => {
            lines.push(format!("{} - {} OKR Progress Report", r.organization, r.quarter));
            let s = &r.summary;
            (s.total_goals, s.avg_progress, &s.by_status, &r.team_breakdown, r.generated_at)
        }
        Report::Annual(r) => {
            lines.push(format!("{} - {} Annual OKR Report", r.organization, r.year));
            let s = &r.summary;
            (s.total_goals, s.avg_progress, &s.by_status, &r.team_breakdown, r.generated_at)
        }
    };
    lines.push("=".repeat(60));
    lines.push(String::new());

    section(&mut lines, "EXECUTIVE SUMMARY");
    lines.push(format!("Total Objectives: {}", total));
    lines.push(format!("Average Progress: {}%", avg));
    lines.push(String::new());
    lines.push("Status Breakdown:".to_string());
    for (status, count) in by_status {
        lines.push(format!("  - {}: {}", status.replace('_', " "), count));
    }
    lines.push(String::new());

    match report {
        Report::Quarterly(r) => {
            if !r.summary.top_performing.is_empty() {
                section(&mut lines, "TOP PERFORMING OBJECTIVES");
                for (i, g) in r.summary.top_performing.iter().enumerate() {
                    lines.push(format!("{}. {}", i + 1, g.title));
                    lines.push(format!(
                        "   Team: {} | Progress: {}",
                        g.team,
                        pct(g.progress.unwrap_or_default())
                    ));
                }
                lines.push(String::new());
            }
            if !r.summary.at_risk.is_empty() {
                section(&mut lines, "OBJECTIVES AT RISK");
                for (i, g) in r.summary.at_risk.iter().enumerate() {
                    lines.push(format!("{}. {}", i + 1, g.title));
                    lines.push(format!(
                        "   Team: {} | Owner: {} | Progress: {}",
                        g.team,
                        g.owner.as_deref().unwrap_or_default(),
                        pct(g.progress.unwrap_or_default())
                    ));
                }
                lines.push(String::new());
            }
        }
        Report::Annual(r) => {
            if !r.summary.by_quarter.is_empty() {
                section(&mut lines, "PROGRESS BY QUARTER");
                for q in &r.summary.by_quarter {
                    lines.push(format!(
                        "  {}: {}% avg ({} key results)",
                        q.quarter, q.avg_progress, q.goal_count
                    ));
                }
                lines.push(String::new());
            }
            if !r.highlights.completed.is_empty() {
                section(&mut lines, "COMPLETED OBJECTIVES");
                for (i, g) in r.highlights.completed.iter().enumerate() {
                    lines.push(format!("{}. {}", i + 1, g.title));
                    lines.push(format!(
                        "   Team: {} | Owner: {}",
                        g.team,
                        g.owner.as_deref().unwrap_or_default()
                    ));
                }
                lines.push(String::new());
            }
            if !r.highlights.needs_attention.is_empty() {
                section(&mut lines, "NEEDS ATTENTION");
                for (i, g) in r.highlights.needs_attention.iter().enumerate() {
                    lines.push(format!("{}. {}", i + 1, g.title));
                    lines.push(format!(
                        "   Team: {} | Progress: {}",
                        g.team,
                        pct(g.progress.unwrap_or_default())
                    ));
                }
                lines.push(String::new());
            }
        }
    }

    section(&mut lines, "TEAM BREAKDOWN");
    for team in teams {
        lines.push(String::new());
        lines.push(format!("{} ({})", team.team_name.to_uppercase(), team.team_level));
        lines.push(format!(
            "Objectives: {} | Completed: {} | At Risk: {}",
            team.total_goals, team.completed_goals, team.at_risk_goals
        ));
        lines.push(format!("Average Progress: {}%", team.avg_progress));
        lines.push(String::new());
        for g in &team.goals {
            lines.push(format!("  • {}", g.title));
            lines.push(format!(
                "    Status: {} | Progress: {} | Owner: {}",
                g.status.label(),
                pct(g.progress),
                g.owner
            ));
            if !g.measures.is_empty() {
                lines.push("    Key Results:".to_string());
                for m in &g.measures {
                    lines.push(format!(
                        "      - {}: {}/{} {} ({})",
                        m.title,
                        m.current,
                        m.target,
                        m.unit,
                        pct(m.progress)
                    ));
                }
            }
        }
    }

    lines.push(String::new());
    lines.push("=".repeat(60));
    lines.push(format!("Generated: {}", generated_at.format("%Y-%m-%d")));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Goal, LinkCounts, Measure, MeasureType, OwnerSummary, TeamSummary};
    use crate::test_utils::{TestEnv, add_goal, add_measure, seed};

    fn item(id: &str, team: (&str, TeamLevel), status: GoalStatus, progress: f64) -> GoalListItem {
        let mut goal = Goal::new(
            id.to_string(),
            format!("Goal {}", id),
            "2026".to_string(),
            team.0.to_string(),
            "u1".to_string(),
        );
        goal.status = status;
        goal.progress = progress;
        GoalListItem {
            goal,
            owner: OwnerSummary {
                id: "u1".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
            },
            team: TeamSummary {
                id: team.0.to_string(),
                name: team.0.to_string(),
                level: team.1,
            },
            measures: Vec::new(),
            counts: LinkCounts::default(),
        }
    }

    fn measure(goal: &str, period: &str, progress: f64) -> Measure {
        let now = Utc::now();
        Measure {
            id: format!("m-{}-{}", goal, period),
            goal_id: goal.to_string(),
            title: "KR".to_string(),
            description: None,
            period: Some(period.to_string()),
            measure_type: MeasureType::IncreaseTo,
            unit: None,
            start_value: 0.0,
            current_value: progress,
            target_value: 100.0,
            progress,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample() -> Vec<GoalListItem> {
        let team = ("eng", TeamLevel::Team);
        let corp = ("corp", TeamLevel::Corporate);
        let mut a = item("a", team, GoalStatus::OnTrack, 75.0);
        a.measures = vec![measure("a", "Q1-2026", 80.0), measure("a", "Q2-2026", 70.0)];
        vec![
            item("low", team, GoalStatus::Active, 10.0),
            a,
            item("done", corp, GoalStatus::Completed, 100.0),
            item("risky", corp, GoalStatus::AtRisk, 55.0),
        ]
    }

    #[test]
    fn test_quarterly_summary() {
        let q = "Q1-2026".parse().unwrap();
        let report = build_quarterly("Acme", q, sample(), Utc::now());

        assert_eq!(report.summary.total_goals, 4);
        // (10 + 75 + 100 + 55) / 4 = 60
        assert_eq!(report.summary.avg_progress, 60);
        assert_eq!(report.summary.by_status["AT_RISK"], 1);

        let top: Vec<&str> = report.summary.top_performing.iter().map(|g| g.title.as_str()).collect();
        assert_eq!(top, vec!["Goal done", "Goal a"]);

        let risk: Vec<&str> = report.summary.at_risk.iter().map(|g| g.title.as_str()).collect();
        assert_eq!(risk, vec!["Goal risky", "Goal low"]);
        assert_eq!(report.summary.at_risk[0].owner.as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn test_quarterly_filters_measures_and_orders_teams() {
        let q = "Q1-2026".parse().unwrap();
        let report = build_quarterly("Acme", q, sample(), Utc::now());

        assert_eq!(report.team_breakdown[0].team_id, "corp");
        assert_eq!(report.team_breakdown[0].completed_goals, 1);
        assert_eq!(report.team_breakdown[0].at_risk_goals, 1);
        assert_eq!(report.team_breakdown[0].avg_progress, 78);

        let eng = &report.team_breakdown[1];
        let a = eng.goals.iter().find(|g| g.id == "a").unwrap();
        assert_eq!(a.measures.len(), 1);
        assert_eq!(a.measures[0].progress, 80.0);
    }

    #[test]
    fn test_annual_highlights_and_quarters() {
        let report = build_annual("Acme", 2026, sample(), Utc::now());

        assert_eq!(report.summary.by_quarter.len(), 2);
        assert_eq!(report.summary.by_quarter[0].quarter, "Q1-2026");
        assert_eq!(report.summary.by_quarter[0].avg_progress, 80);
        assert_eq!(report.highlights.completed.len(), 1);

        let top: Vec<&str> = report.highlights.top_progress.iter().map(|g| g.title.as_str()).collect();
        assert_eq!(top, vec!["Goal a", "Goal risky", "Goal low"]);

        let attention: Vec<&str> = report
            .highlights
            .needs_attention
            .iter()
            .map(|g| g.title.as_str())
            .collect();
        assert_eq!(attention, vec!["Goal risky", "Goal low"]);
    }

    #[test]
    fn test_empty_report() {
        let report = build_annual("Acme", 2026, Vec::new(), Utc::now());
        assert_eq!(report.summary.avg_progress, 0);
        assert!(report.team_breakdown.is_empty());
    }

    #[test]
    fn test_render_text_sections() {
        let q = "Q1-2026".parse().unwrap();
        let text = render_text(&Report::Quarterly(build_quarterly("Acme", q, sample(), Utc::now())));
        assert!(text.starts_with("Acme - Q1-2026 OKR Progress Report\n"));
        assert!(text.contains("EXECUTIVE SUMMARY"));
        assert!(text.contains("TOP PERFORMING OBJECTIVES"));
        assert!(text.contains("OBJECTIVES AT RISK"));
        assert!(text.contains("  - AT RISK: 1"));
        assert!(text.contains("CORP (CORPORATE)"));
        assert!(text.contains(&"=".repeat(60)));

        let text = render_text(&Report::Annual(build_annual("Acme", 2026, sample(), Utc::now())));
        assert!(text.contains("Acme - 2026 Annual OKR Report"));
        assert!(text.contains("PROGRESS BY QUARTER"));
        assert!(text.contains("COMPLETED OBJECTIVES"));
        assert!(text.contains("NEEDS ATTENTION"));
        assert!(!text.contains("TOP PERFORMING"));
    }

    #[test]
    fn test_reports_from_storage() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let goal = add_goal(&mut storage, &fx, "Annual", "2026");
        let m = add_measure(&mut storage, &fx, &goal.id, "KR", 0.0, 10.0);
        storage
            .record_measure_update(&m.id, &fx.org.id, &fx.admin.id, 10.0, None)
            .unwrap();
        add_goal(&mut storage, &fx, "Quarterly", "Q1-2026");
        add_goal(&mut storage, &fx, "Last year", "2025");

        let q = quarterly_report(&storage, &fx.org.id, "Q1-2026").unwrap();
        assert_eq!(q.organization, "Acme");
        assert_eq!(q.summary.total_goals, 2);
        // measure period defaults to the goal's "2026", not the quarter
        assert!(q.team_breakdown[0].goals.iter().all(|g| g.measures.is_empty()));

        let a = annual_report(&storage, &fx.org.id, 2026).unwrap();
        assert_eq!(a.highlights.completed.len(), 1);

        assert!(quarterly_report(&storage, &fx.org.id, "2026").is_err());
        assert!(annual_report(&storage, &fx.org.id, 1999).is_err());
    }
}
