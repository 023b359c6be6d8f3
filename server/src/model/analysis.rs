use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::{CategorizedRecord, FailedRecord};

/// The persisted result of one completed categorization run.
///
/// Only `generated_titles` and `drafted_paper` change after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub id: Uuid,
    pub name: String,
    pub date: DateTime<Utc>,
    pub categorized_papers: Vec<CategorizedRecord>,
    pub failed_papers: Vec<FailedRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_titles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drafted_paper: Option<String>,
}

impl Analysis {
    pub fn new(
        id: Uuid,
        name: String,
        categorized_papers: Vec<CategorizedRecord>,
        failed_papers: Vec<FailedRecord>,
    ) -> Self {
        Self {
            id,
            name,
            date: Utc::now(),
            categorized_papers,
            failed_papers,
            generated_titles: None,
            drafted_paper: None,
        }
    }

    pub fn total_papers(&self) -> usize {
        self.categorized_papers.len() + self.failed_papers.len()
    }

    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            id: self.id,
            name: self.name.clone(),
            date: self.date,
            categorized_count: self.categorized_papers.len(),
            failed_count: self.failed_papers.len(),
        }
    }

    /// Swap the failed entry `original` for the outcome of retrying it. A
    /// recovered record moves to the end of the categorized list; a repeat
    /// failure keeps its slot. Returns false if `original` is no longer in
    /// the failed list.
    pub fn apply_retry(
        &mut self,
        original: &FailedRecord,
        outcome: Result<CategorizedRecord, FailedRecord>,
    ) -> bool {
        let Some(index) = self.failed_papers.iter().position(|f| f == original) else {
            return false;
        };
        match outcome {
            Ok(categorized) => {
                self.failed_papers.remove(index);
                self.categorized_papers.push(categorized);
            }
            Err(failed) => self.failed_papers[index] = failed,
        }
        true
    }

    pub fn apply_enrichment(&mut self, enrichment: AnalysisEnrichment) {
        if let Some(titles) = enrichment.generated_titles {
            self.generated_titles = Some(titles);
        }
        if let Some(draft) = enrichment.drafted_paper {
            self.drafted_paper = Some(draft);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub id: Uuid,
    pub name: String,
    pub date: DateTime<Utc>,
    pub categorized_count: usize,
    pub failed_count: usize,
}

/// Output of the generation features layered on top of an analysis.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisEnrichment {
    pub generated_titles: Option<Vec<String>>,
    pub drafted_paper: Option<String>,
}
