pub mod classifier;
pub mod labels;
pub mod registry;

pub use classifier::{ClassifierModel, LoadedModel, OnnxClassifier, OnnxModelFactory};
pub use labels::LabelCatalog;
pub use registry::{ModelFactory, ModelRegistry, ModelStats};
