//! The seam between the categorization pipeline and whatever LLM backend
//! answers it.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One entry of a batch answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleCategory {
    pub title: String,
    pub category: String,
    pub confidence: f32,
}

/// Answer for a single title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleCategory {
    pub category: String,
    pub confidence: f32,
}

/// Failure of one external call, classified at the boundary.
///
/// The `Display` output keeps the `SAFETY` and `429` tokens so callers that
/// only see the message still classify it the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategorizeError {
    #[error("SAFETY: {0}")]
    SafetyBlocked(String),
    #[error("429: {0}")]
    RateLimited(String),
    #[error("Request timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("{0}")]
    Other(String),
}

impl CategorizeError {
    /// Classify a raw backend error message. `SAFETY` wins over `429`.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("SAFETY") {
            CategorizeError::SafetyBlocked(message)
        } else if message.contains("429") {
            CategorizeError::RateLimited(message)
        } else {
            CategorizeError::Other(message)
        }
    }
}

pub trait Categorizer: Send + Sync {
    /// Categorize a batch of titles with one external call. The answer may
    /// omit titles and need not follow request order.
    fn categorize_batch(
        &self,
        titles: &[String],
        key: &str,
    ) -> impl Future<Output = Result<Vec<TitleCategory>, CategorizeError>> + Send;

    /// Categorize one title; used to retry records that failed in a batch.
    fn categorize_single(
        &self,
        title: &str,
        key: &str,
    ) -> impl Future<Output = Result<SingleCategory, CategorizeError>> + Send;
}
