pub mod loader;
pub mod preprocessing;
pub mod transforms;

pub use loader::{ImageLoader, ImageStore, RawImage};
pub use preprocessing::{ImagePreprocessor, PreprocessConfig, PreprocessedTensor};
pub use transforms::{EnhanceOptions, ImageEnhancer};
