use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::{Analysis, AnalysisSummary};

/// In-memory home for completed analyses, keyed by run id.
#[derive(Debug, Clone, Default)]
pub struct AnalysisStore {
    analyses: Arc<RwLock<HashMap<Uuid, Analysis>>>,
}

impl AnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an analysis.
    pub async fn save(&self, analysis: Analysis) {
        self.analyses.write().await.insert(analysis.id, analysis);
    }

    pub async fn get(&self, id: &Uuid) -> Option<Analysis> {
        self.analyses.read().await.get(id).cloned()
    }

    /// Summaries ordered newest first.
    pub async fn list(&self) -> Vec<AnalysisSummary> {
        let analyses = self.analyses.read().await;
        let mut summaries: Vec<_> = analyses.values().map(Analysis::summary).collect();
        summaries.sort_by(|a, b| b.date.cmp(&a.date));
        summaries
    }

    /// Apply `f` to a stored analysis under the write lock.
    pub async fn update<F>(&self, id: &Uuid, f: F) -> Option<Analysis>
    where
        F: FnOnce(&mut Analysis),
    {
        let mut analyses = self.analyses.write().await;
        let analysis = analyses.get_mut(id)?;
        f(analysis);
        Some(analysis.clone())
    }

    pub async fn len(&self) -> usize {
        self.analyses.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[tokio::test]
    async fn test_save_and_get() {
        let store = AnalysisStore::new();
        let id = Uuid::new_v4();
        store
            .save(Analysis::new(id, "first".into(), vec![], vec![]))
            .await;

        assert_eq!(store.get(&id).await.map(|a| a.name), Some("first".to_string()));
        assert!(store.get(&Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = AnalysisStore::new();
        let mut older = Analysis::new(Uuid::new_v4(), "older".into(), vec![], vec![]);
        older.date -= Duration::hours(1);
        let newer = Analysis::new(Uuid::new_v4(), "newer".into(), vec![], vec![]);
        store.save(older).await;
        store.save(newer).await;

        let names: Vec<_> = store.list().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["newer".to_string(), "older".to_string()]);
    }

    #[tokio::test]
    async fn test_update_missing_returns_none() {
        let store = AnalysisStore::new();
        let updated = store
            .update(&Uuid::new_v4(), |a| a.drafted_paper = Some("x".into()))
            .await;
        assert!(updated.is_none());
        assert_eq!(store.len().await, 0);
    }
}
