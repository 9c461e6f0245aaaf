//! LLM-assisted advice on goals and measures.
//!
//! Everything here is advisory: a failing or unparsable provider reply
//! degrades to a fixed fallback instead of failing the request.

pub mod advisor;
pub mod provider;

pub use advisor::{
    Advisor, AlignmentSuggestion, ChatMessage, ChatRole, CriterionScore, DraftMeasure,
    GoalSuggestion, MeasureReview, Recommendations, SmartAssessment, SuggestGoalInput,
    SuggestedMeasure,
};
pub use provider::{AnthropicProvider, CompletionOptions, LlmProvider, MockProvider};

use serde::de::DeserializeOwned;

/// Parse the outermost `{...}` span of an LLM reply.
///
/// Replies often wrap JSON in prose or markdown fences, so everything
/// before the first `{` and after the last `}` is ignored.
pub fn extract_json<T: DeserializeOwned>(reply: &str) -> std::result::Result<T, String> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str(&reply[start..=end]).map_err(|e| e.to_string())
        }
        _ => Err("No JSON found in response".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_extract_json_from_fenced_reply() {
        let reply = "Sure!\n```json\n{\"a\": {\"b\": 1}}\n```\nHope that helps.";
        let value: Value = extract_json(reply).unwrap();
        assert_eq!(value["a"]["b"], 1);
    }

    #[test]
    fn test_extract_json_failures() {
        assert_eq!(
            extract_json::<Value>("no braces").unwrap_err(),
            "No JSON found in response"
        );
        assert!(extract_json::<Value>("} backwards {").is_err());
        assert!(extract_json::<Value>("{not json}").is_err());
    }
}
