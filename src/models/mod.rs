//! Data models for Bearing entities.
//!
//! This module defines the core data structures:
//! - `Organization` - Tenant boundary owning teams and users
//! - `Team` - Node in the strict organizational tree
//! - `User` - Member of an organization with an authorization role
//! - `Goal` - Objective tracked through measures and aligned through links
//! - `GoalLink` - Weighted "child contributes to parent" edge between goals
//! - `Measure` - Typed key result whose progress rolls up into its goal
//! - `MeasureUpdate` / `GoalUpdate` - Append-only logs
//! - `AiInteraction` - Audit record of an LLM call

pub mod graph;
pub mod input;
pub mod progress;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use input::{
    BulkGoal, BulkMeasure, CloneGoalInput, GoalFilter, GoalPatch, MeasurePatch, NewGoal,
    NewMeasure, NewTeam, NewUser, TeamPatch, UserPatch,
};

/// Organizational level of a team. Declaration order is rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeamLevel {
    Corporate,
    Executive,
    Department,
    Team,
    Individual,
}

impl TeamLevel {
    /// Rank in the tree, 0 is the top.
    pub fn rank(&self) -> u8 {
        match self {
            TeamLevel::Corporate => 0,
            TeamLevel::Executive => 1,
            TeamLevel::Department => 2,
            TeamLevel::Team => 3,
            TeamLevel::Individual => 4,
        }
    }

    /// Returns true if a team at this level may be the parent of one at `child`.
    pub fn can_parent(&self, child: TeamLevel) -> bool {
        self.rank() < child.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TeamLevel::Corporate => "CORPORATE",
            TeamLevel::Executive => "EXECUTIVE",
            TeamLevel::Department => "DEPARTMENT",
            TeamLevel::Team => "TEAM",
            TeamLevel::Individual => "INDIVIDUAL",
        }
    }
}

impl fmt::Display for TeamLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for TeamLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CORPORATE" => Ok(TeamLevel::Corporate),
            "EXECUTIVE" => Ok(TeamLevel::Executive),
            "DEPARTMENT" => Ok(TeamLevel::Department),
            "TEAM" => Ok(TeamLevel::Team),
            "INDIVIDUAL" => Ok(TeamLevel::Individual),
            _ => Err(format!("Unknown team level: {}", s)),
        }
    }
}

/// Authorization level of a user. Not related to team rank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Executive,
    Manager,
    #[default]
    Contributor,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Executive => "EXECUTIVE",
            UserRole::Manager => "MANAGER",
            UserRole::Contributor => "CONTRIBUTOR",
        }
    }

    /// Roles allowed to restructure teams.
    pub fn can_manage_teams(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Executive | UserRole::Manager)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ADMIN" => Ok(UserRole::Admin),
            "EXECUTIVE" => Ok(UserRole::Executive),
            "MANAGER" => Ok(UserRole::Manager),
            "CONTRIBUTOR" => Ok(UserRole::Contributor),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Goal status. Derived from measure progress on every rollup, but may be
/// set by hand in between.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalStatus {
    #[default]
    Draft,
    Active,
    OnTrack,
    AtRisk,
    Behind,
    Completed,
    Cancelled,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Draft => "DRAFT",
            GoalStatus::Active => "ACTIVE",
            GoalStatus::OnTrack => "ON_TRACK",
            GoalStatus::AtRisk => "AT_RISK",
            GoalStatus::Behind => "BEHIND",
            GoalStatus::Completed => "COMPLETED",
            GoalStatus::Cancelled => "CANCELLED",
        }
    }

    /// AT_RISK or BEHIND.
    pub fn is_troubled(&self) -> bool {
        matches!(self, GoalStatus::AtRisk | GoalStatus::Behind)
    }

    /// Human label, e.g. "ON TRACK".
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for GoalStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(GoalStatus::Draft),
            "ACTIVE" => Ok(GoalStatus::Active),
            "ON_TRACK" => Ok(GoalStatus::OnTrack),
            "AT_RISK" => Ok(GoalStatus::AtRisk),
            "BEHIND" => Ok(GoalStatus::Behind),
            "COMPLETED" => Ok(GoalStatus::Completed),
            "CANCELLED" => Ok(GoalStatus::Cancelled),
            _ => Err(format!("Unknown goal status: {}", s)),
        }
    }
}

/// How a measure's progress is computed from start/current/target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeasureType {
    #[default]
    IncreaseTo,
    DecreaseTo,
    Maintain,
    Milestone,
}

impl MeasureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasureType::IncreaseTo => "INCREASE_TO",
            MeasureType::DecreaseTo => "DECREASE_TO",
            MeasureType::Maintain => "MAINTAIN",
            MeasureType::Milestone => "MILESTONE",
        }
    }
}

impl fmt::Display for MeasureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for MeasureType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INCREASE_TO" => Ok(MeasureType::IncreaseTo),
            "DECREASE_TO" => Ok(MeasureType::DecreaseTo),
            "MAINTAIN" => Ok(MeasureType::Maintain),
            "MILESTONE" => Ok(MeasureType::Milestone),
            _ => Err(format!("Unknown measure type: {}", s)),
        }
    }
}

/// Kind of LLM call recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiInteractionKind {
    GoalSuggestion,
    MeasureReview,
    AlignmentSuggestion,
    ProgressSummary,
    Chat,
    DocumentImport,
}

impl AiInteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiInteractionKind::GoalSuggestion => "GOAL_SUGGESTION",
            AiInteractionKind::MeasureReview => "MEASURE_REVIEW",
            AiInteractionKind::AlignmentSuggestion => "ALIGNMENT_SUGGESTION",
            AiInteractionKind::ProgressSummary => "PROGRESS_SUMMARY",
            AiInteractionKind::Chat => "CHAT",
            AiInteractionKind::DocumentImport => "DOCUMENT_IMPORT",
        }
    }
}

impl fmt::Display for AiInteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Tenant boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    /// Short unique handle (e.g. the company domain)
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

/// A node in the organizational tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub level: TeamLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    pub fn summary(&self) -> TeamSummary {
        TeamSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            level: self.level,
        }
    }
}

/// Compact team reference embedded in goal views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub id: String,
    pub name: String,
    pub level: TeamLevel,
}

/// Member, goal and child-team counts for a team.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamCounts {
    pub members: usize,
    pub goals: usize,
    pub children: usize,
}

/// Team list entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamListItem {
    #[serde(flatten)]
    pub team: Team,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<TeamSummary>,
    pub counts: TeamCounts,
}

/// Full team view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamDetail {
    #[serde(flatten)]
    pub team: Team,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<TeamSummary>,
    pub children: Vec<TeamSummary>,
    pub members: Vec<User>,
    /// Most recent goals of the team
    pub goals: Vec<Goal>,
}

/// A team with its subtree, as returned by the hierarchy view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamNode {
    #[serde(flatten)]
    pub team: Team,
    pub counts: TeamCounts,
    pub children: Vec<TeamNode>,
}

/// A person in an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub organization_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub role: UserRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<String>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn summary(&self) -> OwnerSummary {
        OwnerSummary {
            id: self.id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Compact user reference embedded in goal views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

impl OwnerSummary {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// The authenticated caller of an API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub organization_id: String,
    pub role: UserRole,
}

/// An objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Opaque period key, e.g. "2026" or "Q1-2026"
    pub period: String,
    pub status: GoalStatus,
    /// Mean measure progress (0-100), never set directly by clients
    pub progress: f64,
    pub is_stretch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub owner_id: String,
    pub team_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    /// Create a new draft goal with zero progress.
    pub fn new(
        id: String,
        title: String,
        period: String,
        team_id: String,
        owner_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            description: None,
            period,
            status: GoalStatus::Draft,
            progress: 0.0,
            is_stretch: false,
            due_date: None,
            owner_id,
            team_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Goal reference used inside link views.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSummary {
    pub id: String,
    pub title: String,
    pub progress: f64,
    pub status: GoalStatus,
}

/// Directed alignment edge: the child goal contributes to the parent goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalLink {
    pub id: String,
    pub parent_goal_id: String,
    pub child_goal_id: String,
    /// Share of the child's success that counts toward the parent (0-1)
    #[serde(default = "default_weight")]
    pub contribution_weight: f64,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn default_weight() -> f64 {
    1.0
}

/// Link counts shown in goal lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkCounts {
    pub parent_links: usize,
    pub child_links: usize,
}

/// Goal list entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalListItem {
    #[serde(flatten)]
    pub goal: Goal,
    pub owner: OwnerSummary,
    pub team: TeamSummary,
    pub measures: Vec<Measure>,
    pub counts: LinkCounts,
}

/// A link as seen from one end, with the goal at the other end.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedGoal {
    #[serde(flatten)]
    pub link: GoalLink,
    pub goal: GoalSummary,
}

/// A goal together with its measures, as returned by clone and bulk import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalWithMeasures {
    #[serde(flatten)]
    pub goal: Goal,
    pub measures: Vec<Measure>,
}

/// A measure with its most recent updates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureWithUpdates {
    #[serde(flatten)]
    pub measure: Measure,
    pub updates: Vec<MeasureUpdate>,
}

/// Full goal view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalDetail {
    #[serde(flatten)]
    pub goal: Goal,
    pub owner: OwnerSummary,
    pub team: TeamSummary,
    pub measures: Vec<MeasureWithUpdates>,
    pub updates: Vec<GoalUpdate>,
    pub parent_links: Vec<LinkedGoal>,
    pub child_links: Vec<LinkedGoal>,
}

/// A key result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    pub id: String,
    pub goal_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Opaque period key; measures may be scoped tighter than their goal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    pub measure_type: MeasureType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub start_value: f64,
    pub current_value: f64,
    pub target_value: f64,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Measure {
    /// Recompute `progress` from the current values.
    pub fn refresh_progress(&mut self) {
        self.progress = progress::measure_progress(
            self.measure_type,
            self.start_value,
            self.current_value,
            self.target_value,
        );
    }
}

/// A recorded value of a measure. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureUpdate {
    pub id: String,
    pub measure_id: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub author: OwnerSummary,
    pub created_at: DateTime<Utc>,
}

/// A free-text log entry on a goal. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalUpdate {
    pub id: String,
    pub goal_id: String,
    pub content: String,
    pub author: OwnerSummary,
    pub created_at: DateTime<Utc>,
}

/// Audit record of one LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiInteraction {
    pub id: String,
    pub user_id: String,
    pub kind: AiInteractionKind,
    pub prompt: String,
    pub response: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Page metadata for list endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl Pagination {
    pub fn new(page: usize, limit: usize, total: usize) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// One page of goals.
#[derive(Debug, Clone, Serialize)]
pub struct GoalPage {
    pub goals: Vec<GoalListItem>,
    pub pagination: Pagination,
}

/// Parent-side link reference on a map goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    pub parent_goal_id: String,
    pub contribution_weight: f64,
}

/// Child-side link reference on a map goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRef {
    pub child_goal_id: String,
    pub contribution_weight: f64,
}

/// Measure reference on a map goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureSummary {
    pub id: String,
    pub title: String,
    pub progress: f64,
}

/// A goal in the alignment map snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapGoal {
    #[serde(flatten)]
    pub goal: Goal,
    pub team: TeamSummary,
    pub owner: OwnerSummary,
    pub measures: Vec<MeasureSummary>,
    pub parent_links: Vec<ParentRef>,
    pub child_links: Vec<ChildRef>,
}

/// Flat snapshot of goals and links for client-side rendering.
#[derive(Debug, Clone, Serialize)]
pub struct GoalsMap {
    pub goals: Vec<MapGoal>,
    pub links: Vec<GoalLink>,
}

/// A candidate parent goal.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateGoal {
    #[serde(flatten)]
    pub goal: Goal,
    pub team: TeamSummary,
    pub owner: OwnerSummary,
}
