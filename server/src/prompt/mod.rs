pub mod categorizer;
pub(crate) mod mistral;

pub use categorizer::{CategorizeError, Categorizer, SingleCategory, TitleCategory};
pub use mistral::MistralClient;
