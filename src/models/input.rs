//! Write payloads accepted by storage and the HTTP API.
//!
//! These are deserialized straight from request bodies, so field names follow
//! the same camelCase convention as the read models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{GoalStatus, MeasureType, TeamLevel, UserRole};
use crate::{Error, Result};

/// Longest title accepted for goals and measures.
pub const MAX_TITLE_LEN: usize = 200;

pub(crate) fn validate_title(title: &str) -> Result<()> {
    let len = title.trim().chars().count();
    if len == 0 {
        return Err(Error::InvalidArgument("Title is required".to_string()));
    }
    if len > MAX_TITLE_LEN {
        return Err(Error::InvalidArgument(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

pub(crate) fn validate_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("{} must be a finite number", name)))
    }
}

fn default_true() -> bool {
    true
}

fn default_target() -> f64 {
    100.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTeam {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub level: TeamLevel,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub organization_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub manager_id: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoal {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub period: String,
    pub team_id: String,
    #[serde(default)]
    pub is_stretch: bool,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl NewGoal {
    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)
    }
}

/// Fields a client may change on a goal. Progress is absent on purpose:
/// it is only ever written by the rollup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<GoalStatus>,
    #[serde(default)]
    pub is_stretch: Option<bool>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl GoalPatch {
    pub fn validate(&self) -> Result<()> {
        match &self.title {
            Some(title) => validate_title(title),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMeasure {
    pub goal_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to the goal's period
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub measure_type: MeasureType,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub start_value: f64,
    pub target_value: f64,
}

impl NewMeasure {
    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)?;
        validate_finite("startValue", self.start_value)?;
        validate_finite("targetValue", self.target_value)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub measure_type: Option<MeasureType>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub start_value: Option<f64>,
    #[serde(default)]
    pub current_value: Option<f64>,
    #[serde(default)]
    pub target_value: Option<f64>,
}

impl MeasurePatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        for (name, value) in [
            ("startValue", self.start_value),
            ("currentValue", self.current_value),
            ("targetValue", self.target_value),
        ] {
            if let Some(v) = value {
                validate_finite(name, v)?;
            }
        }
        Ok(())
    }

    /// True when the patch touches any value that feeds progress.
    pub fn affects_progress(&self) -> bool {
        self.measure_type.is_some()
            || self.start_value.is_some()
            || self.current_value.is_some()
            || self.target_value.is_some()
    }
}

/// Filters for the goal list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalFilter {
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub status: Option<GoalStatus>,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl GoalFilter {
    pub const DEFAULT_LIMIT: usize = 20;
    pub const MAX_LIMIT: usize = 100;

    /// 1-based page number.
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    /// Row offset of the first goal on the page, as SQLite takes it.
    pub fn offset(&self) -> Result<i64> {
        (self.page() - 1)
            .checked_mul(self.limit())
            .and_then(|rows| i64::try_from(rows).ok())
            .ok_or_else(|| Error::InvalidArgument("Page out of range".to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneGoalInput {
    pub source_goal_id: String,
    pub target_team_id: String,
    /// Period of the new goal
    pub period: String,
    #[serde(default = "default_true")]
    pub include_measures: bool,
    /// Period for the copied measures; defaults to the new goal's period
    #[serde(default)]
    pub measure_period: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkMeasure {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub measure_type: MeasureType,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub start_value: f64,
    #[serde(default = "default_target")]
    pub target_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkGoal {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_stretch: bool,
    #[serde(default)]
    pub measures: Vec<BulkMeasure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_bounds() {
        assert!(validate_title("Ship it").is_ok());
        assert!(matches!(validate_title("   "), Err(Error::InvalidArgument(_))));
        assert!(validate_title(&"x".repeat(200)).is_ok());
        assert!(validate_title(&"x".repeat(201)).is_err());
    }

    #[test]
    fn test_filter_defaults_and_caps() {
        let filter = GoalFilter::default();
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.limit(), 20);
        assert_eq!(filter.offset().unwrap(), 0);

        let filter = GoalFilter {
            page: Some(0),
            limit: Some(500),
            ..Default::default()
        };
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.limit(), 100);
    }

    #[test]
    fn test_offset_rejects_huge_pages() {
        let page = |n: usize| GoalFilter {
            page: Some(n),
            limit: Some(10),
            ..GoalFilter::default()
        };
        assert_eq!(page(3).offset().unwrap(), 20);
        assert!(matches!(page(usize::MAX).offset(), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            page(i64::MAX as usize).offset(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_measure_patch_rejects_nan() {
        let patch = MeasurePatch {
            current_value: Some(f64::NAN),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
        assert!(patch.affects_progress());
        assert!(!MeasurePatch::default().affects_progress());
    }

    #[test]
    fn test_clone_input_defaults() {
        let input: CloneGoalInput = serde_json::from_str(
            r#"{"sourceGoalId":"g","targetTeamId":"t","period":"2027"}"#,
        )
        .unwrap();
        assert!(input.include_measures);
        assert!(input.measure_period.is_none());
    }

    #[test]
    fn test_bulk_measure_defaults() {
        let m: BulkMeasure = serde_json::from_str(r#"{"title":"Revenue"}"#).unwrap();
        assert_eq!(m.measure_type, MeasureType::IncreaseTo);
        assert_eq!(m.start_value, 0.0);
        assert_eq!(m.target_value, 100.0);
    }
}
