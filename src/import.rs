//! Turning free-form planning documents into goals.
//!
//! A [`TextExtractor`] flattens an uploaded document to text, the LLM pulls
//! objectives and key results out of it, and the user reviews the result
//! before [`create_from_document`] bulk-imports it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ai::{Advisor, CompletionOptions, LlmProvider, extract_json};
use crate::models::input::MAX_TITLE_LEN;
use crate::models::{
    AiInteractionKind, BulkGoal, BulkMeasure, GoalWithMeasures, MeasureType, Principal,
};
use crate::period::validate_period;
use crate::storage::Storage;
use crate::{Error, Result};

const DEFAULT_CONFIDENCE: f64 = 0.5;
const DEFAULT_TARGET: f64 = 100.0;
const AUDIT_PROMPT_CHARS: usize = 500;
const AUDIT_RESPONSE_CHARS: usize = 1000;
const NO_OKRS_WARNING: &str = "No OKRs could be identified in the presentation. \
     The content may not contain OKR-structured information.";

/// Flattens an uploaded document to plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String>;
}

/// UTF-8 text and markdown documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| Error::InvalidArgument("Document is not valid UTF-8 text".to_string()))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidArgument("Document contains no text".to_string()));
        }
        Ok(text.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedKeyResult {
    pub title: String,
    #[serde(default)]
    pub measure_type: MeasureType,
    pub target_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedObjective {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One objective with its key results, as found in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedOkr {
    pub objective: ExtractedObjective,
    #[serde(default)]
    pub key_results: Vec<ExtractedKeyResult>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_slide: Option<u32>,
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

impl ExtractedOkr {
    pub fn into_bulk_goal(self) -> BulkGoal {
        BulkGoal {
            title: self.objective.title,
            description: self.objective.description,
            is_stretch: false,
            measures: self
                .key_results
                .into_iter()
                .map(|kr| BulkMeasure {
                    title: kr.title,
                    description: None,
                    measure_type: kr.measure_type,
                    unit: kr.unit,
                    start_value: kr.start_value.unwrap_or(0.0),
                    target_value: kr.target_value,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportAnalysis {
    pub extracted_okrs: Vec<ExtractedOkr>,
    pub raw_text: String,
    pub warnings: Vec<String>,
}

/// Reviewed OKRs to create as draft goals on one team.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFromDocument {
    pub team_id: String,
    pub owner_id: String,
    pub period: String,
    #[serde(default)]
    pub measure_period: Option<String>,
    pub okrs: Vec<ExtractedOkr>,
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn text_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn normalize_type(v: Option<&Value>) -> MeasureType {
    v.and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

fn normalize_key_result(v: &Value) -> ExtractedKeyResult {
    ExtractedKeyResult {
        title: truncate(
            &text_field(v, "title").unwrap_or_else(|| "Untitled Key Result".to_string()),
            MAX_TITLE_LEN,
        ),
        measure_type: normalize_type(v.get("measureType")),
        target_value: v
            .get("targetValue")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_TARGET),
        unit: text_field(v, "unit"),
        start_value: v.get("startValue").and_then(Value::as_f64),
    }
}

fn normalize_okr(v: &Value) -> ExtractedOkr {
    let objective = v.get("objective").unwrap_or(&Value::Null);
    ExtractedOkr {
        objective: ExtractedObjective {
            title: truncate(
                &text_field(objective, "title").unwrap_or_else(|| "Untitled Objective".to_string()),
                MAX_TITLE_LEN,
            ),
            description: text_field(objective, "description"),
        },
        key_results: v
            .get("keyResults")
            .and_then(Value::as_array)
            .map(|krs| krs.iter().map(normalize_key_result).collect())
            .unwrap_or_default(),
        confidence: v
            .get("confidence")
            .and_then(Value::as_f64)
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(DEFAULT_CONFIDENCE),
        source_slide: v
            .get("sourceSlide")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok()),
    }
}

/// Normalize an extraction reply. Malformed replies become warnings.
pub fn parse_extraction(reply: &str, raw_text: &str) -> ImportAnalysis {
    let failed = |msg: &str| ImportAnalysis {
        extracted_okrs: Vec::new(),
        raw_text: raw_text.to_string(),
        warnings: vec![format!(
            "Failed to extract OKRs: {}. Please try again or import manually.",
            msg
        )],
    };

    let parsed: Value = match extract_json(reply) {
        Ok(v) => v,
        Err(e) => return failed(&e),
    };
    let okrs = match parsed.get("okrs").and_then(Value::as_array) {
        Some(okrs) => okrs,
        None => return failed("Invalid response structure: missing okrs array"),
    };
    if okrs.is_empty() {
        return ImportAnalysis {
            extracted_okrs: Vec::new(),
            raw_text: raw_text.to_string(),
            warnings: vec![NO_OKRS_WARNING.to_string()],
        };
    }

    let warnings = parsed
        .get("warnings")
        .and_then(Value::as_array)
        .map(|ws| {
            ws.iter()
                .filter_map(|w| w.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    ImportAnalysis {
        extracted_okrs: okrs.iter().map(normalize_okr).collect(),
        raw_text: raw_text.to_string(),
        warnings,
    }
}

fn extraction_prompt(text: &str) -> String {
    format!(
        "You are an expert OKR analyst. Extract all Objectives and Key Results from the following document.

Document content:
---
{}
---

Instructions:
1. Identify clear Objectives (what to achieve) and their associated Key Results (how to measure success)
2. For each Key Result, determine:
   - measureType: INCREASE_TO, DECREASE_TO, MAINTAIN or MILESTONE (binary completion)
   - targetValue: a numeric target (use 100 for percentages, 1 for milestones)
   - unit: the unit of measurement if mentioned
   - startValue: the baseline value if mentioned
3. If a Key Result has no clear target, infer a reasonable one from context
4. Include a confidence score (0.0-1.0) for each OKR based on how clear the extraction was
5. Include any warnings about ambiguous content

Respond in JSON format only:
{{
  \"okrs\": [
    {{
      \"objective\": {{ \"title\": \"string\", \"description\": \"string or null\" }},
      \"keyResults\": [
        {{ \"title\": \"string\", \"measureType\": \"INCREASE_TO|DECREASE_TO|MAINTAIN|MILESTONE\", \"targetValue\": number, \"unit\": \"string or null\", \"startValue\": number or null }}
      ],
      \"confidence\": number,
      \"sourceSlide\": number or null
    }}
  ],
  \"warnings\": [\"string\"]
}}",
        text
    )
}

/// Ask the provider to pull OKRs out of `text`.
///
/// Returns the analysis and the raw reply (empty when the call failed).
pub async fn extract_okrs(provider: &dyn LlmProvider, text: &str) -> (ImportAnalysis, String) {
    let prompt = extraction_prompt(text);
    let options = CompletionOptions::new(
        4096,
        0.3,
        "You are an expert OKR analyst. Extract OKRs accurately and respond with valid JSON only.",
    );
    match provider.complete(&prompt, &options).await {
        Ok(reply) => (parse_extraction(&reply, text), reply),
        Err(e) => {
            tracing::warn!(error = %e, "OKR extraction call failed");
            let analysis = ImportAnalysis {
                extracted_okrs: Vec::new(),
                raw_text: text.to_string(),
                warnings: vec![format!(
                    "Failed to extract OKRs: {}. Please try again or import manually.",
                    e
                )],
            };
            (analysis, String::new())
        }
    }
}

/// Extract text from an uploaded document and analyze it, recording the call.
pub async fn analyze_document(
    advisor: &Advisor,
    extractor: &dyn TextExtractor,
    principal: &Principal,
    bytes: &[u8],
) -> Result<ImportAnalysis> {
    let text = extractor.extract(bytes)?;
    let (analysis, reply) = extract_okrs(advisor.provider().as_ref(), &text).await;

    advisor
        .record(
            principal,
            AiInteractionKind::DocumentImport,
            &truncate(&text, AUDIT_PROMPT_CHARS),
            &truncate(&reply, AUDIT_RESPONSE_CHARS),
            None,
        )
        .await;

    tracing::info!(
        okrs = analysis.extracted_okrs.len(),
        warnings = analysis.warnings.len(),
        "analyzed document"
    );
    Ok(analysis)
}

/// Create reviewed OKRs as draft goals in one transaction.
pub fn create_from_document(
    storage: &mut Storage,
    org_id: &str,
    input: CreateFromDocument,
) -> Result<Vec<GoalWithMeasures>> {
    let period = validate_period(&input.period)?;
    let measure_period = match &input.measure_period {
        Some(p) => Some(validate_period(p)?),
        None => None,
    };
    let goals: Vec<BulkGoal> = input
        .okrs
        .into_iter()
        .map(ExtractedOkr::into_bulk_goal)
        .collect();
    storage.bulk_import_goals(
        org_id,
        &input.owner_id,
        &input.team_id,
        &period,
        measure_period.as_deref(),
        &goals,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use super::*;
    use crate::ai::MockProvider;
    use crate::models::UserRole;
    use crate::test_utils::{TestEnv, seed};

    #[test]
    fn test_plain_text_extractor() {
        let extractor = PlainTextExtractor;
        assert_eq!(extractor.extract(b"  Objective: grow \n").unwrap(), "Objective: grow");
        assert!(matches!(extractor.extract(b"   "), Err(Error::InvalidArgument(_))));
        assert!(extractor.extract(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_parse_extraction_normalizes() {
        let long = "x".repeat(250);
        let reply = format!(
            r#"```json
{{"okrs": [{{
  "objective": {{"title": "{}"}},
  "keyResults": [
    {{"title": "Raise NPS", "measureType": "increase_to", "targetValue": 60}},
    {{"title": "Unknown kind", "measureType": "GROW_BY"}},
    {{"measureType": "MILESTONE", "targetValue": 1, "unit": "launch"}}
  ],
  "confidence": 1.7
}}, {{"objective": {{"title": "Second"}}}}],
"warnings": ["slide 3 was ambiguous"]}}
```"#,
            long
        );
        let analysis = parse_extraction(&reply, "raw");

        assert_eq!(analysis.raw_text, "raw");
        assert_eq!(analysis.warnings, vec!["slide 3 was ambiguous"]);
        assert_eq!(analysis.extracted_okrs.len(), 2);

        let first = &analysis.extracted_okrs[0];
        assert_eq!(first.objective.title.len(), MAX_TITLE_LEN);
        assert_eq!(first.confidence, 1.0);
        assert_eq!(first.key_results[0].measure_type, MeasureType::IncreaseTo);
        assert_eq!(first.key_results[1].measure_type, MeasureType::IncreaseTo);
        assert_eq!(first.key_results[1].target_value, DEFAULT_TARGET);
        assert_eq!(first.key_results[2].title, "Untitled Key Result");
        assert_eq!(first.key_results[2].measure_type, MeasureType::Milestone);

        let second = &analysis.extracted_okrs[1];
        assert_eq!(second.confidence, DEFAULT_CONFIDENCE);
        assert!(second.key_results.is_empty());
    }

    #[test]
    fn test_parse_extraction_failures_become_warnings() {
        let analysis = parse_extraction("sorry, I can't", "raw");
        assert!(analysis.extracted_okrs.is_empty());
        assert!(analysis.warnings[0].starts_with("Failed to extract OKRs: No JSON found"));

        let analysis = parse_extraction(r#"{"items": []}"#, "raw");
        assert!(analysis.warnings[0].contains("missing okrs array"));

        let analysis = parse_extraction(r#"{"okrs": []}"#, "raw");
        assert_eq!(analysis.warnings, vec![NO_OKRS_WARNING.to_string()]);
    }

    #[tokio::test]
    async fn test_analyze_then_create() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let storage = Arc::new(Mutex::new(storage));
        let advisor = Advisor::new(storage.clone(), Arc::new(MockProvider::new()));
        let principal = Principal {
            user_id: fx.admin.id.clone(),
            organization_id: fx.org.id.clone(),
            role: UserRole::Admin,
        };

        let analysis = analyze_document(
            &advisor,
            &PlainTextExtractor,
            &principal,
            b"Objective: Delight our customers\n- Raise NPS from 40 to 60",
        )
        .await
        .unwrap();
        assert_eq!(analysis.extracted_okrs.len(), 1);

        let mut s = storage.lock().await;
        assert_eq!(s.count_ai_interactions(Some(fx.admin.id.as_str())).unwrap(), 1);

        let created = create_from_document(
            &mut s,
            &fx.org.id,
            CreateFromDocument {
                team_id: fx.corporate.id.clone(),
                owner_id: fx.admin.id.clone(),
                period: "2026".to_string(),
                measure_period: Some("Q1-2026".to_string()),
                okrs: analysis.extracted_okrs,
            },
        )
        .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].goal.title, "Delight our customers");
        assert_eq!(created[0].measures.len(), 2);
        assert_eq!(created[0].measures[0].start_value, 40.0);
        assert_eq!(created[0].measures[0].period.as_deref(), Some("Q1-2026"));

        let err = create_from_document(
            &mut s,
            &fx.org.id,
            CreateFromDocument {
                team_id: fx.corporate.id.clone(),
                owner_id: fx.admin.id.clone(),
                period: "FY26".to_string(),
                measure_period: None,
                okrs: Vec::new(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
