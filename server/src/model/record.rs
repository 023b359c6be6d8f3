//! Paper records and the two terminal outcomes of categorizing one.

use serde::{Deserialize, Serialize};

/// Wire form of a paper as submitted by a client. Every field is optional;
/// [`Record::from_input`] fills the gaps.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordInput {
    pub title: Option<String>,
    pub year: Option<String>,
    pub terms: Option<String>,
    pub identifier: Option<String>,
    pub authors: Option<String>,
}

/// A paper to classify. Never mutated once built; outcomes copy it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub title: String,
    pub year: String,
    pub terms: String,
    pub identifier: String,
    pub authors: String,
}

impl Record {
    /// Build a record from client input. `position` is the 0-based index in
    /// the submitted list and seeds the default identifier.
    pub fn from_input(input: RecordInput, position: usize) -> Self {
        let identifier = input
            .identifier
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("paper-{}", position + 1));

        Self {
            title: input.title.map(|t| t.trim().to_string()).unwrap_or_default(),
            year: input.year.unwrap_or_default(),
            terms: input.terms.unwrap_or_default(),
            identifier,
            authors: input.authors.unwrap_or_default(),
        }
    }

    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }

    pub fn categorized(self, category: String, confidence: f32) -> CategorizedRecord {
        CategorizedRecord {
            record: self,
            category,
            confidence,
        }
    }

    pub fn failed(self, kind: FailureKind, reason: impl Into<String>) -> FailedRecord {
        FailedRecord {
            record: self,
            failure_reason: reason.into(),
            failure_kind: kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorizedRecord {
    #[serde(flatten)]
    pub record: Record,
    pub category: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRecord {
    #[serde(flatten)]
    pub record: Record,
    pub failure_reason: String,
    pub failure_kind: FailureKind,
}

impl FailedRecord {
    /// Strip the failure and hand back the original record.
    pub fn into_record(self) -> Record {
        self.record
    }
}

/// Why a record ended up in the failed list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    MissingTitle,
    NoKeyAvailable,
    SafetyBlocked,
    RateLimited,
    TimedOut,
    UnknownBatchError,
    OmittedResult,
    Cancelled,
}

impl FailureKind {
    /// A record without a title can never be categorized, everything else
    /// may succeed on a later single-title attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureKind::MissingTitle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_input_defaults_identifier_from_position() {
        let record = Record::from_input(
            RecordInput {
                title: Some("  Attention Is All You Need ".to_string()),
                ..Default::default()
            },
            4,
        );

        assert_eq!(record.identifier, "paper-5");
        assert_eq!(record.title, "Attention Is All You Need");
        assert_eq!(record.year, "");
    }

    #[test]
    fn test_from_input_keeps_explicit_identifier() {
        let record = Record::from_input(
            RecordInput {
                title: Some("A".to_string()),
                identifier: Some("doi:10.1/abc".to_string()),
                ..Default::default()
            },
            0,
        );
        assert_eq!(record.identifier, "doi:10.1/abc");
    }

    #[test]
    fn test_blank_title_is_missing() {
        let record = Record::from_input(
            RecordInput {
                title: Some("   ".to_string()),
                ..Default::default()
            },
            0,
        );
        assert!(!record.has_title());
    }

    #[test]
    fn test_failed_record_serializes_flat_camel_case() {
        let record = Record::from_input(
            RecordInput {
                title: Some("T".to_string()),
                ..Default::default()
            },
            0,
        );
        let failed = record.failed(FailureKind::RateLimited, "slow down");
        let value = serde_json::to_value(&failed).unwrap();

        assert_eq!(value["title"], "T");
        assert_eq!(value["failureReason"], "slow down");
        assert_eq!(value["failureKind"], "rate_limited");
    }

    #[test]
    fn test_missing_title_not_retryable() {
        assert!(!FailureKind::MissingTitle.is_retryable());
        assert!(FailureKind::OmittedResult.is_retryable());
        assert!(FailureKind::NoKeyAvailable.is_retryable());
    }
}
