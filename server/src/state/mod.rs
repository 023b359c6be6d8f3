pub mod analysis_store;
pub mod key_pool;

pub use analysis_store::AnalysisStore;
pub use key_pool::KeyPool;
