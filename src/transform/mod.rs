//! Transform stage: normalization, inference and cleaning

pub mod cleaner;
pub mod inference;
pub mod normalize;

pub use cleaner::{CleanError, CleanResult, RecordCleaner};
pub use inference::{Inference, InferenceEngine, UNKNOWN};
pub use normalize::{normalize_name, title_case};
