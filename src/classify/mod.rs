pub mod engine;
pub mod pipeline;
pub mod types;

pub use engine::{rank_top_k, softmax_percent, InferenceEngine, TOP_K};
pub use pipeline::ClassificationPipeline;
pub use types::{ClassificationResult, Prediction};
