pub mod on_demand;

pub use on_demand::MistralClient;

use indoc::formatdoc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::categorizer::{SingleCategory, TitleCategory};

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ModelLength,
    Error,
    ToolCalls,
    ContentFilter,
    Safety,
    #[serde(other)]
    Unknown,
}

impl FinishReason {
    pub fn is_safety_block(&self) -> bool {
        matches!(self, FinishReason::ContentFilter | FinishReason::Safety)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: i32,
    pub message: ChatMessage,
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: Option<PromptUsage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiError {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error(ChatApiError),
}

pub fn batch_system_prompt(categories: &[String]) -> String {
    formatdoc! {r#"
        You are a research paper classification engine.
        Assign every paper title you are given to exactly one of the categories inside the square brackets below.
        [{categories}]
        Copy each title verbatim into your answer so it can be matched back to the request.
        You will only respond with a JSON object with the key results, holding an array of objects with the keys title, category and confidence.
        "confidence" is a float between 0 and 1 representing classification certainty.
        Do not provide explanations."#,
    categories = categories.join(", ")}
}

pub fn single_system_prompt(categories: &[String]) -> String {
    formatdoc! {r#"
        You are a research paper classification engine.
        Assign the paper title you are given to exactly one of the categories inside the square brackets below.
        [{categories}]
        You will only respond with a JSON object with the keys category and confidence.
        "confidence" is a float between 0 and 1 representing classification certainty.
        Do not provide explanations."#,
    categories = categories.join(", ")}
}

pub fn batch_user_prompt(titles: &[String]) -> String {
    let titles_json = serde_json::to_string_pretty(titles).unwrap_or_else(|_| "[]".to_string());
    formatdoc!(
        r#"Categorize each of the following research paper titles.

            {}"#,
        titles_json
    )
}

pub fn single_user_prompt(title: &str) -> String {
    format!("Categorize the following research paper title.\n\n<title>{title}</title>")
}

#[derive(Debug, Deserialize)]
struct BatchAnswerJson {
    results: Vec<TitleCategory>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchAnswer {
    Wrapped(BatchAnswerJson),
    Bare(Vec<TitleCategory>),
}

/// Strip a ```json fence if the model wrapped its answer in one.
fn strip_code_fence(content: &str) -> &str {
    static RE_FENCE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").unwrap());
    RE_FENCE
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map_or(content.trim(), |m| m.as_str())
}

/// Parse the model's batch answer. Accepts `{"results": [...]}` or a bare
/// array. Returns None if neither shape parses.
pub fn parse_batch_answer(content: &str) -> Option<Vec<TitleCategory>> {
    let answer: BatchAnswer = serde_json::from_str(strip_code_fence(content)).ok()?;
    let results = match answer {
        BatchAnswer::Wrapped(wrapped) => wrapped.results,
        BatchAnswer::Bare(list) => list,
    };

    Some(
        results
            .into_iter()
            .map(|r| TitleCategory {
                confidence: clamp_confidence(r.confidence),
                ..r
            })
            .collect(),
    )
}

pub fn parse_single_answer(content: &str) -> Option<SingleCategory> {
    let answer: SingleCategory = serde_json::from_str(strip_code_fence(content)).ok()?;
    Some(SingleCategory {
        confidence: clamp_confidence(answer.confidence),
        ..answer
    })
}

fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}
