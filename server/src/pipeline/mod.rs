//! Batch categorization pipeline: partition titled records, submit each batch
//! with the next key from the pool, and collect per-record outcomes.

mod invoker;
mod orchestrator;
mod partition;
mod retry;
mod types;

pub use invoker::{invoke_batch, merge_results, BatchOutcome};
pub use orchestrator::CategorizationPipeline;
pub use partition::{partition, Batch};
pub use retry::{retry_failed, RetryOutcome};
pub use types::*;
