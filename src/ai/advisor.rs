//! Advisory operations built on an [`LlmProvider`].
//!
//! Each operation gathers its context from storage, releases the lock, asks
//! the provider, then re-locks only to append the audit record.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::extract_json;
use super::provider::{CompletionOptions, LlmProvider};
use crate::models::input::validate_title;
use crate::models::{AiInteraction, AiInteractionKind, GoalStatus, MeasureType, Principal};
use crate::storage::{Storage, new_id};
use crate::{Error, Result};

const COACH_SYSTEM_PROMPT: &str = "You are an expert OKR coach. Always respond with valid JSON.";
const UNABLE_TO_SUGGEST: &str = "Unable to generate suggestions at this time.";
const UNABLE_TO_ASSESS: &str = "Unable to assess";
pub const SUMMARY_FALLBACK: &str =
    "Unable to generate a progress summary right now. Please try again later.";
pub const CHAT_FALLBACK: &str =
    "Sorry, I'm unable to answer right now. Please try again in a moment.";

/// Request for a rewritten goal.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestGoalInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub team_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedMeasure {
    pub title: String,
    #[serde(rename = "type")]
    pub measure_type: MeasureType,
    pub target: f64,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSuggestion {
    pub improved_title: String,
    pub explanation: String,
    #[serde(default)]
    pub suggested_measures: Vec<SuggestedMeasure>,
    #[serde(default)]
    pub suggested_parent_id: Option<String>,
}

impl GoalSuggestion {
    fn fallback(title: &str) -> Self {
        Self {
            improved_title: title.to_string(),
            explanation: UNABLE_TO_SUGGEST.to_string(),
            suggested_measures: Vec::new(),
            suggested_parent_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub score: f64,
    #[serde(default)]
    pub note: String,
}

impl CriterionScore {
    fn unknown() -> Self {
        Self {
            score: 5.0,
            note: UNABLE_TO_ASSESS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartAssessment {
    pub specific: CriterionScore,
    pub measurable: CriterionScore,
    pub achievable: CriterionScore,
    pub relevant: CriterionScore,
    pub time_bound: CriterionScore,
}

/// Concrete edits a user can apply to a draft measure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improved_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improved_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_target_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_measure_type: Option<MeasureType>,
}

/// SMART review of a measure, scores on a 1-10 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureReview {
    pub score: f64,
    pub assessment: SmartAssessment,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Recommendations>,
}

impl MeasureReview {
    fn fallback() -> Self {
        Self {
            score: 5.0,
            assessment: SmartAssessment {
                specific: CriterionScore::unknown(),
                measurable: CriterionScore::unknown(),
                achievable: CriterionScore::unknown(),
                relevant: CriterionScore::unknown(),
                time_bound: CriterionScore::unknown(),
            },
            suggestions: vec![UNABLE_TO_SUGGEST.to_string()],
            risks: Vec::new(),
            recommendations: None,
        }
    }
}

/// A measure that has not been saved yet.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMeasure {
    pub goal_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub measure_type: MeasureType,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub start_value: f64,
    pub target_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentSuggestion {
    pub goal_id: String,
    pub goal_title: String,
    pub team_name: String,
    pub relevance: f64,
    pub explanation: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAlignment {
    goal_id: String,
    #[serde(default)]
    relevance: f64,
    #[serde(default)]
    explanation: String,
}

#[derive(Debug, Deserialize)]
struct RawAlignments {
    suggestions: Vec<RawAlignment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// What the measure prompts describe, whether saved or draft.
struct MeasureFacts<'a> {
    title: &'a str,
    description: Option<&'a str>,
    measure_type: MeasureType,
    unit: Option<&'a str>,
    start_value: f64,
    target_value: f64,
}

fn review_prompt(
    goal_title: &str,
    goal_description: Option<&str>,
    m: &MeasureFacts<'_>,
    with_recommendations: bool,
) -> String {
    let mut p = String::from("You are an expert OKR coach reviewing a key result for quality.\n\n");
    let _ = writeln!(p, "Goal: \"{}\"", goal_title);
    if let Some(d) = goal_description {
        let _ = writeln!(p, "Goal Description: \"{}\"", d);
    }
    p.push_str("\nKey Result being reviewed:\n");
    let _ = writeln!(p, "- Title: \"{}\"", m.title);
    let _ = writeln!(p, "- Target: {} {}", m.target_value, m.unit.unwrap_or(""));
    let _ = writeln!(p, "- Start Value: {}", m.start_value);
    let _ = writeln!(p, "- Type: {}", m.measure_type);
    if let Some(d) = m.description {
        let _ = writeln!(p, "- Description: \"{}\"", d);
    }
    p.push_str(
        "\nEvaluate this key result against SMART criteria:
- Specific: Is it clear what's being measured?
- Measurable: Can progress be objectively tracked?
- Achievable: Is the target realistic?
- Relevant: Does it actually indicate goal success?
- Time-bound: Is there a clear deadline?

Also consider:
- Is this a leading or lagging indicator?
- Could this metric be gamed?
- What might this miss?
",
    );
    if with_recommendations {
        p.push_str(
            "\nIf the score is less than 8, include a \"recommendations\" object with \
             improvedTitle, improvedDescription, suggestedTargetValue, suggestedUnit and \
             suggestedMeasureType, filling only the fields that need to change.\n",
        );
    }
    p.push_str(
        "\nRespond in JSON format:
{
  \"score\": number (1-10),
  \"assessment\": {
    \"specific\": { \"score\": number, \"note\": \"string\" },
    \"measurable\": { \"score\": number, \"note\": \"string\" },
    \"achievable\": { \"score\": number, \"note\": \"string\" },
    \"relevant\": { \"score\": number, \"note\": \"string\" },
    \"timeBound\": { \"score\": number, \"note\": \"string\" }
  },
  \"suggestions\": [\"string\"],
  \"risks\": [\"string\"]
}",
    );
    p
}

/// LLM-backed coaching over the shared store.
#[derive(Clone)]
pub struct Advisor {
    storage: Arc<Mutex<Storage>>,
    provider: Arc<dyn LlmProvider>,
}

impl Advisor {
    pub fn new(storage: Arc<Mutex<Storage>>, provider: Arc<dyn LlmProvider>) -> Self {
        Self { storage, provider }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Ask the provider; failures are logged and reported as `None`.
    pub async fn ask(&self, prompt: &str, options: &CompletionOptions) -> Option<String> {
        match self.provider.complete(prompt, options).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                tracing::warn!(
                    provider = self.provider.provider_name(),
                    error = %e,
                    "LLM call failed, using fallback"
                );
                None
            }
        }
    }

    /// Append an audit record. Never fails the caller.
    pub async fn record(
        &self,
        principal: &Principal,
        kind: AiInteractionKind,
        prompt: &str,
        response: &str,
        entity: Option<(&str, &str)>,
    ) {
        let entry = AiInteraction {
            id: new_id(),
            user_id: principal.user_id.clone(),
            kind,
            prompt: prompt.to_string(),
            response: response.to_string(),
            model: self.provider.model_name().to_string(),
            entity_type: entity.map(|(t, _)| t.to_string()),
            entity_id: entity.map(|(_, id)| id.to_string()),
            created_at: Utc::now(),
        };
        let mut storage = self.storage.lock().await;
        if let Err(e) = storage.log_ai_interaction(&entry) {
            tracing::warn!(kind = %kind, error = %e, "Failed to log AI interaction");
        }
    }

    /// Rewrite a draft goal title and propose measures and a parent.
    pub async fn suggest_goal(
        &self,
        principal: &Principal,
        input: SuggestGoalInput,
    ) -> Result<GoalSuggestion> {
        validate_title(&input.title)?;
        let org = &principal.organization_id;

        let prompt = {
            let storage = self.storage.lock().await;
            let team = storage.get_team_row(&input.team_id, org)?;
            let parent_name = match &team.parent_id {
                Some(id) => Some(storage.team_summary(id)?.name),
                None => None,
            };
            let candidates = storage.recent_goals(
                org,
                &[GoalStatus::Active, GoalStatus::OnTrack, GoalStatus::AtRisk],
                10,
            )?;

            let mut p = String::from("You are an expert OKR coach helping improve goal quality.\n\n");
            p.push_str("Team context:\n");
            let _ = writeln!(p, "- Team: {} ({} level)", team.name, team.level);
            let _ = writeln!(
                p,
                "- Parent team: {}",
                parent_name.as_deref().unwrap_or("None (top-level)")
            );
            p.push_str("\nUser's draft goal:\n");
            let _ = writeln!(p, "Title: \"{}\"", input.title);
            if let Some(d) = &input.description {
                let _ = writeln!(p, "Description: \"{}\"", d);
            }
            p.push_str("\nAvailable parent goals to potentially align to:\n");
            for (i, c) in candidates.iter().enumerate() {
                let _ = writeln!(
                    p,
                    "{}. ID: \"{}\" | \"{}\" ({} - {})",
                    i + 1,
                    c.goal.id,
                    c.goal.title,
                    c.team.name,
                    c.team.level
                );
            }
            p.push_str(
                "\nPlease provide:
1. An improved version of the goal title that is clearer, more inspiring, and action-oriented
2. A brief explanation of why the changes help
3. 3 suggested key results with specific targets
4. The ID of the best parent goal to link to (or null if none fit well)

Respond in JSON format:
{
  \"improvedTitle\": \"string\",
  \"explanation\": \"string\",
  \"suggestedMeasures\": [
    { \"title\": \"string\", \"type\": \"INCREASE_TO|DECREASE_TO|MAINTAIN|MILESTONE\", \"target\": number, \"unit\": \"string\" }
  ],
  \"suggestedParentId\": \"string or null\"
}",
            );
            p
        };

        let options = CompletionOptions::new(1024, 0.7, COACH_SYSTEM_PROMPT);
        let suggestion = self
            .ask(&prompt, &options)
            .await
            .and_then(|reply| extract_json::<GoalSuggestion>(&reply).ok())
            .unwrap_or_else(|| GoalSuggestion::fallback(&input.title));

        let response = serde_json::to_string(&suggestion)?;
        self.record(
            principal,
            AiInteractionKind::GoalSuggestion,
            &format!("Title: {}", input.title),
            &response,
            None,
        )
        .await;
        Ok(suggestion)
    }

    /// SMART review of a saved measure.
    pub async fn review_measure(&self, principal: &Principal, measure_id: &str) -> Result<MeasureReview> {
        let prompt = {
            let storage = self.storage.lock().await;
            let measure = storage.get_measure(measure_id, &principal.organization_id)?;
            let goal = storage.get_goal(&measure.goal_id, &principal.organization_id)?;
            review_prompt(
                &goal.title,
                goal.description.as_deref(),
                &MeasureFacts {
                    title: &measure.title,
                    description: measure.description.as_deref(),
                    measure_type: measure.measure_type,
                    unit: measure.unit.as_deref(),
                    start_value: measure.start_value,
                    target_value: measure.target_value,
                },
                false,
            )
        };

        let review = self.review(&prompt).await;
        let response = serde_json::to_string(&review)?;
        self.record(
            principal,
            AiInteractionKind::MeasureReview,
            &format!("Measure ID: {}", measure_id),
            &response,
            Some(("Measure", measure_id)),
        )
        .await;
        Ok(review)
    }

    /// SMART review of a measure before it is saved, with applicable edits.
    pub async fn review_draft_measure(
        &self,
        principal: &Principal,
        draft: DraftMeasure,
    ) -> Result<MeasureReview> {
        validate_title(&draft.title)?;
        let prompt = {
            let storage = self.storage.lock().await;
            let goal = storage.get_goal(&draft.goal_id, &principal.organization_id)?;
            review_prompt(
                &goal.title,
                goal.description.as_deref(),
                &MeasureFacts {
                    title: &draft.title,
                    description: draft.description.as_deref(),
                    measure_type: draft.measure_type,
                    unit: draft.unit.as_deref(),
                    start_value: draft.start_value,
                    target_value: draft.target_value,
                },
                true,
            )
        };

        let review = self.review(&prompt).await;
        let response = serde_json::to_string(&review)?;
        self.record(
            principal,
            AiInteractionKind::MeasureReview,
            &format!("Draft: {}", draft.title),
            &response,
            None,
        )
        .await;
        Ok(review)
    }

    async fn review(&self, prompt: &str) -> MeasureReview {
        let options = CompletionOptions::new(1024, 0.5, COACH_SYSTEM_PROMPT);
        self.ask(prompt, &options)
            .await
            .and_then(|reply| extract_json::<MeasureReview>(&reply).ok())
            .unwrap_or_else(MeasureReview::fallback)
    }

    /// Rank candidate parents for a goal. Suggestions naming anything other
    /// than a listed candidate are dropped.
    pub async fn suggest_alignment(
        &self,
        principal: &Principal,
        goal_id: &str,
    ) -> Result<Vec<AlignmentSuggestion>> {
        let org = &principal.organization_id;
        let (prompt, candidates) = {
            let storage = self.storage.lock().await;
            let goal = storage.get_goal(goal_id, org)?;
            let team = storage.team_summary(&goal.team_id)?;
            let candidates: Vec<_> = storage
                .available_parents(goal_id, org)?
                .into_iter()
                .filter(|c| {
                    matches!(
                        c.goal.status,
                        GoalStatus::Draft | GoalStatus::Active | GoalStatus::OnTrack | GoalStatus::AtRisk
                    )
                })
                .collect();

            let mut p = String::from("You are an expert OKR coach helping align goals.\n\n");
            p.push_str("Goal to align:\n");
            let _ = writeln!(p, "- Title: \"{}\"", goal.title);
            let _ = writeln!(p, "- Team: {} ({})", team.name, team.level);
            if let Some(d) = &goal.description {
                let _ = writeln!(p, "- Description: \"{}\"", d);
            }
            p.push_str("\nPotential parent goals to link to:\n");
            for (i, c) in candidates.iter().enumerate() {
                let _ = writeln!(
                    p,
                    "{}. ID: \"{}\" | \"{}\" | Team: {} ({})",
                    i + 1,
                    c.goal.id,
                    c.goal.title,
                    c.team.name,
                    c.team.level
                );
            }
            p.push_str(
                "\nAnalyze which parent goals this objective could contribute to.
Consider semantic similarity, strategic fit, and how the child goal's success would drive the parent goal.

Respond in JSON format with the top 3 matches:
{
  \"suggestions\": [
    { \"goalId\": \"string\", \"relevance\": number (0-1), \"explanation\": \"string\" }
  ]
}",
            );
            (p, candidates)
        };

        let suggestions = if candidates.is_empty() {
            Vec::new()
        } else {
            let options = CompletionOptions::new(1024, 0.5, COACH_SYSTEM_PROMPT);
            self.ask(&prompt, &options)
                .await
                .and_then(|reply| extract_json::<RawAlignments>(&reply).ok())
                .map(|raw| {
                    raw.suggestions
                        .into_iter()
                        .filter_map(|s| {
                            let c = candidates.iter().find(|c| c.goal.id == s.goal_id)?;
                            Some(AlignmentSuggestion {
                                goal_id: s.goal_id,
                                goal_title: c.goal.title.clone(),
                                team_name: c.team.name.clone(),
                                relevance: s.relevance.clamp(0.0, 1.0),
                                explanation: s.explanation,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let response = serde_json::to_string(&suggestions)?;
        self.record(
            principal,
            AiInteractionKind::AlignmentSuggestion,
            &format!("Goal ID: {}", goal_id),
            &response,
            Some(("Goal", goal_id)),
        )
        .await;
        Ok(suggestions)
    }

    /// Short executive summary of one goal's progress.
    pub async fn progress_summary(&self, principal: &Principal, goal_id: &str) -> Result<String> {
        let prompt = {
            let storage = self.storage.lock().await;
            let detail = storage.get_goal_detail(goal_id, &principal.organization_id)?;
            let weeks = (Utc::now() - detail.goal.created_at).num_weeks().max(0);

            let mut p = String::from("Generate a brief executive summary of OKR progress.\n\n");
            let _ = writeln!(p, "Goal: \"{}\"", detail.goal.title);
            let _ = writeln!(p, "Status: {}", detail.goal.status);
            let _ = writeln!(p, "Overall Progress: {}%", detail.goal.progress.round());
            let _ = writeln!(p, "Time elapsed: ~{} weeks", weeks);
            p.push_str("\nKey Results:\n");
            if detail.measures.is_empty() {
                p.push_str("No key results defined\n");
            }
            for m in &detail.measures {
                let m = &m.measure;
                let _ = writeln!(
                    p,
                    "- {}: {}/{} {} ({}%)",
                    m.title,
                    m.current_value,
                    m.target_value,
                    m.unit.as_deref().unwrap_or(""),
                    m.progress.round()
                );
            }
            p.push_str("\nRecent updates:\n");
            if detail.updates.is_empty() {
                p.push_str("No recent updates\n");
            }
            for u in detail.updates.iter().take(5) {
                let _ = writeln!(p, "- {}: \"{}\"", u.author.first_name, u.content);
            }
            p.push_str(
                "\nWrite a 2-3 sentence executive summary highlighting overall status, key wins, \
                 main risks or blockers, and any recommended actions. Keep it concise and actionable.",
            );
            p
        };

        let options = CompletionOptions::new(
            256,
            0.7,
            "You are a business analyst generating concise executive summaries.",
        );
        let summary = match self.ask(&prompt, &options).await {
            Some(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            _ => SUMMARY_FALLBACK.to_string(),
        };

        self.record(
            principal,
            AiInteractionKind::ProgressSummary,
            &format!("Goal ID: {}", goal_id),
            &summary,
            Some(("Goal", goal_id)),
        )
        .await;
        Ok(summary)
    }

    /// Free-form conversation grounded in the organization's current goals.
    pub async fn chat(&self, principal: &Principal, messages: &[ChatMessage]) -> Result<String> {
        if messages.is_empty() {
            return Err(Error::InvalidArgument(
                "At least one message is required".to_string(),
            ));
        }
        let org = &principal.organization_id;

        let prompt = {
            let storage = self.storage.lock().await;
            let counts = storage.goal_status_counts(org)?;
            let recent = storage.recent_goals(org, &[], 20)?;

            let mut p = String::from(
                "You are an AI assistant helping users understand and manage their OKRs.\n\n",
            );
            p.push_str("Current OKR Summary for this organization:\n");
            let by_status: Vec<String> = counts
                .iter()
                .map(|(status, n)| format!("{}: {}", status, n))
                .collect();
            let _ = writeln!(p, "- Total goals by status: {}", by_status.join(", "));
            p.push_str("\nRecent/Active Goals:\n");
            for g in &recent {
                let _ = writeln!(
                    p,
                    "- \"{}\" ({}) - {} - {}% complete",
                    g.goal.title,
                    g.team.name,
                    g.goal.status,
                    g.goal.progress.round()
                );
            }
            p.push_str(
                "\nThe user may ask questions about their goals, request summaries, or ask for advice.
Be helpful, specific, and reference actual data when possible.\n\nConversation:\n",
            );
            let history: Vec<String> = messages
                .iter()
                .map(|m| {
                    let who = match m.role {
                        ChatRole::User => "User",
                        ChatRole::Assistant => "Assistant",
                    };
                    format!("{}: {}", who, m.content)
                })
                .collect();
            p.push_str(&history.join("\n\n"));
            p.push_str("\n\nRespond helpfully to the user's most recent message.");
            p
        };

        let options = CompletionOptions::new(
            1024,
            0.7,
            "You are a helpful OKR assistant. Be concise but thorough.",
        );
        let reply = match self.ask(&prompt, &options).await {
            Some(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            _ => CHAT_FALLBACK.to_string(),
        };

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        self.record(principal, AiInteractionKind::Chat, last_user, &reply, None)
            .await;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::MockProvider;
    use crate::models::UserRole;
    use crate::test_utils::{Fixture, TestEnv, add_goal, add_measure, seed};
    use async_trait::async_trait;

    /// Replies with fixed text, or fails when `reply` is `None`.
    struct Scripted {
        reply: Option<String>,
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
            self.reply
                .clone()
                .ok_or_else(|| Error::Upstream("scripted failure".to_string()))
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }

        fn model_name(&self) -> &str {
            "scripted-1"
        }
    }

    fn principal(fx: &Fixture) -> Principal {
        Principal {
            user_id: fx.admin.id.clone(),
            organization_id: fx.org.id.clone(),
            role: UserRole::Admin,
        }
    }

    fn setup(env: &TestEnv, provider: Arc<dyn LlmProvider>) -> (Advisor, Arc<Mutex<Storage>>, Fixture) {
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let storage = Arc::new(Mutex::new(storage));
        (Advisor::new(storage.clone(), provider), storage, fx)
    }

    fn failing() -> Arc<dyn LlmProvider> {
        Arc::new(Scripted { reply: None })
    }

    #[tokio::test]
    async fn test_suggest_goal_with_mock() {
        let env = TestEnv::new();
        let (advisor, storage, fx) = setup(&env, Arc::new(MockProvider::new()));
        let suggestion = advisor
            .suggest_goal(
                &principal(&fx),
                SuggestGoalInput {
                    title: "happy customers".to_string(),
                    description: None,
                    team_id: fx.corporate.id.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(suggestion.suggested_measures.len(), 3);
        assert_eq!(suggestion.suggested_measures[2].measure_type, MeasureType::DecreaseTo);
        assert_eq!(storage.lock().await.count_ai_interactions(None).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_suggest_goal_fallback_keeps_title() {
        let env = TestEnv::new();
        let (advisor, storage, fx) = setup(&env, failing());
        let suggestion = advisor
            .suggest_goal(
                &principal(&fx),
                SuggestGoalInput {
                    title: "happy customers".to_string(),
                    description: None,
                    team_id: fx.corporate.id.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(suggestion, GoalSuggestion::fallback("happy customers"));
        // a failed call is still audited
        assert_eq!(storage.lock().await.count_ai_interactions(None).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_suggest_goal_unknown_team() {
        let env = TestEnv::new();
        let (advisor, _storage, fx) = setup(&env, Arc::new(MockProvider::new()));
        let err = advisor
            .suggest_goal(
                &principal(&fx),
                SuggestGoalInput {
                    title: "x".to_string(),
                    description: None,
                    team_id: "missing".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_review_measure_unparsable_reply() {
        let env = TestEnv::new();
        let (advisor, storage, fx) = setup(
            &env,
            Arc::new(Scripted {
                reply: Some("I think it's a fine measure.".to_string()),
            }),
        );
        let measure = {
            let mut s = storage.lock().await;
            let goal = add_goal(&mut s, &fx, "Grow", "2026");
            add_measure(&mut s, &fx, &goal.id, "Revenue", 0.0, 100.0)
        };

        let review = advisor.review_measure(&principal(&fx), &measure.id).await.unwrap();
        assert_eq!(review.score, 5.0);
        assert_eq!(review.assessment.time_bound.note, "Unable to assess");
        assert_eq!(review.suggestions, vec![UNABLE_TO_SUGGEST.to_string()]);
        assert!(review.risks.is_empty());
    }

    #[tokio::test]
    async fn test_review_draft_measure_parses_recommendations() {
        let env = TestEnv::new();
        let reply = r#"Here you go: {"score": 6, "assessment": {
            "specific": {"score": 6, "note": "a"}, "measurable": {"score": 7, "note": "b"},
            "achievable": {"score": 6, "note": "c"}, "relevant": {"score": 6, "note": "d"},
            "timeBound": {"score": 5, "note": "e"}},
            "suggestions": ["Add a unit"], "risks": [],
            "recommendations": {"suggestedUnit": "%", "suggestedMeasureType": "MAINTAIN"}}"#;
        let (advisor, storage, fx) = setup(
            &env,
            Arc::new(Scripted {
                reply: Some(reply.to_string()),
            }),
        );
        let goal = add_goal(&mut *storage.lock().await, &fx, "Grow", "2026");

        let review = advisor
            .review_draft_measure(
                &principal(&fx),
                DraftMeasure {
                    goal_id: goal.id.clone(),
                    title: "Uptime".to_string(),
                    description: None,
                    measure_type: MeasureType::IncreaseTo,
                    unit: None,
                    start_value: 0.0,
                    target_value: 99.9,
                },
            )
            .await
            .unwrap();
        let rec = review.recommendations.unwrap();
        assert_eq!(rec.suggested_unit.as_deref(), Some("%"));
        assert_eq!(rec.suggested_measure_type, Some(MeasureType::Maintain));
    }

    #[tokio::test]
    async fn test_suggest_alignment_filters_unknown_ids() {
        let env = TestEnv::new();
        let (advisor, storage, fx) = setup(&env, Arc::new(MockProvider::new()));
        let (child, parent) = {
            let mut s = storage.lock().await;
            (
                add_goal(&mut s, &fx, "Child", "2026"),
                add_goal(&mut s, &fx, "Parent", "2026"),
            )
        };
        add_goal(&mut *storage.lock().await, &fx, "Other year", "2025");

        let suggestions = advisor
            .suggest_alignment(&principal(&fx), &child.id)
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].goal_id, parent.id);
        assert_eq!(suggestions[0].goal_title, "Parent");
        assert_eq!(suggestions[0].team_name, "Acme Corp");

        let env = TestEnv::new();
        let reply = r#"{"suggestions": [{"goalId": "made-up", "relevance": 0.9, "explanation": "x"}]}"#;
        let (advisor, storage, fx) = setup(
            &env,
            Arc::new(Scripted {
                reply: Some(reply.to_string()),
            }),
        );
        let child = {
            let mut s = storage.lock().await;
            add_goal(&mut s, &fx, "Parent", "2026");
            add_goal(&mut s, &fx, "Child", "2026")
        };
        let suggestions = advisor
            .suggest_alignment(&principal(&fx), &child.id)
            .await
            .unwrap();
        assert!(suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_progress_summary_and_chat_fallbacks() {
        let env = TestEnv::new();
        let (advisor, storage, fx) = setup(&env, failing());
        let goal = add_goal(&mut *storage.lock().await, &fx, "Grow", "2026");
        let p = principal(&fx);

        let summary = advisor.progress_summary(&p, &goal.id).await.unwrap();
        assert_eq!(summary, SUMMARY_FALLBACK);

        let reply = advisor
            .chat(
                &p,
                &[ChatMessage {
                    role: ChatRole::User,
                    content: "How are we doing?".to_string(),
                }],
            )
            .await
            .unwrap();
        assert_eq!(reply, CHAT_FALLBACK);
        assert_eq!(storage.lock().await.count_ai_interactions(Some(fx.admin.id.as_str())).unwrap(), 2);

        assert!(matches!(
            advisor.chat(&p, &[]).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            advisor.progress_summary(&p, "missing").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_progress_summary_trims_reply() {
        let env = TestEnv::new();
        let (advisor, storage, fx) = setup(
            &env,
            Arc::new(Scripted {
                reply: Some("  On track.\n".to_string()),
            }),
        );
        let goal = add_goal(&mut *storage.lock().await, &fx, "Grow", "2026");
        let summary = advisor.progress_summary(&principal(&fx), &goal.id).await.unwrap();
        assert_eq!(summary, "On track.");
    }
}
