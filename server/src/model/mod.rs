pub mod analysis;
pub mod record;

pub use analysis::{Analysis, AnalysisEnrichment, AnalysisSummary};
pub use record::{CategorizedRecord, FailedRecord, FailureKind, Record, RecordInput};
