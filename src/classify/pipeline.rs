use crate::classify::engine::InferenceEngine;
use crate::classify::types::ClassificationResult;
use crate::image::{ImageLoader, ImagePreprocessor, RawImage};
use crate::models::{LabelCatalog, ModelRegistry};
use crate::Result;
use std::sync::Arc;
use std::time::Instant;

/// 分类流水线：模型解析 → 图像预处理 → 推理排序
///
/// 注册表与标签目录为进程级共享状态，流水线本身可被多个请求并发调用。
pub struct ClassificationPipeline {
    registry: Arc<ModelRegistry>,
    catalog: Arc<LabelCatalog>,
    preprocessor: ImagePreprocessor,
    engine: InferenceEngine,
}

impl ClassificationPipeline {
    pub fn new(registry: Arc<ModelRegistry>, catalog: Arc<LabelCatalog>) -> Self {
        Self {
            registry,
            catalog,
            preprocessor: ImagePreprocessor::default(),
            engine: InferenceEngine::default(),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }

    /// 对已解码的图像分类，遇到第一个错误即返回
    pub fn classify(&self, model_id: &str, image: &RawImage) -> Result<ClassificationResult> {
        let start = Instant::now();

        let model = self.registry.resolve(model_id)?;
        let tensor = self.preprocessor.preprocess(image)?;
        let result = self.engine.infer(model.as_ref(), &tensor, &self.catalog)?;

        tracing::info!(
            "Classified {}x{} {:?} image with '{}': top={:?}, time={:.3}s",
            image.width(),
            image.height(),
            image.color(),
            model_id,
            result.top().map(|p| p.label.as_str()),
            start.elapsed().as_secs_f32()
        );

        Ok(result)
    }

    /// 先解码再分类，无法解码的数据不会触发模型加载
    pub fn classify_bytes(&self, model_id: &str, bytes: &[u8]) -> Result<ClassificationResult> {
        let image = ImageLoader::from_bytes(bytes)?;
        self.classify(model_id, &image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::engine::TOP_K;
    use crate::image::PreprocessedTensor;
    use crate::models::{ClassifierModel, LoadedModel};
    use crate::utils::error::ClassifyError;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// 以输入张量的通道均值生成确定性的分数
    struct ChannelMeanModel {
        width: usize,
    }

    impl ClassifierModel for ChannelMeanModel {
        fn name(&self) -> &str {
            "channel-mean"
        }

        fn forward(&self, input: &PreprocessedTensor) -> Result<Vec<f32>> {
            let data = input.as_array();
            let means: Vec<f32> = (0..3)
                .map(|c| data.index_axis(ndarray::Axis(1), c).mean().unwrap_or(0.0))
                .collect();
            Ok((0..self.width)
                .map(|i| means[i % 3] * (i as f32 + 1.0) * 0.01)
                .collect())
        }
    }

    fn pipeline(width: usize, labels: usize) -> ClassificationPipeline {
        let mut registry = ModelRegistry::new();
        registry
            .register("resnet18", move |_id: &str| -> Result<LoadedModel> {
                Ok(Arc::new(ChannelMeanModel { width }))
            })
            .unwrap();
        let catalog = LabelCatalog::new((0..labels).map(|i| format!("label_{i}")).collect())
            .unwrap();
        ClassificationPipeline::new(Arc::new(registry), Arc::new(catalog))
    }

    fn sample_image() -> RawImage {
        let image = RgbImage::from_fn(320, 240, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        RawImage::new(DynamicImage::ImageRgb8(image))
    }

    fn png_bytes(image: &RawImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image
            .as_dynamic()
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn returns_five_descending_scores() {
        let pipeline = pipeline(1000, 1000);
        let result = pipeline.classify("resnet18", &sample_image()).unwrap();

        assert_eq!(result.len(), TOP_K);
        for pair in result.predictions().windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert!(result.predictions().iter().all(|p| (0.0..=100.0).contains(&p.score)));
    }

    #[test]
    fn same_bytes_give_identical_results() {
        let pipeline = pipeline(1000, 1000);
        let bytes = png_bytes(&sample_image());

        let first = pipeline.classify_bytes("resnet18", &bytes).unwrap();
        let second = pipeline.classify_bytes("resnet18", &bytes).unwrap();
        assert_eq!(first, second);
        assert_eq!(pipeline.registry().load_count(), 1);
    }

    #[test]
    fn unknown_model_is_reported_as_such() {
        let pipeline = pipeline(1000, 1000);
        let err = pipeline
            .classify("nonexistent_model", &sample_image())
            .unwrap_err();
        assert!(matches!(err, ClassifyError::UnknownModel(_)));
    }

    #[test]
    fn malformed_bytes_fail_before_model_load() {
        let pipeline = pipeline(1000, 1000);
        let err = pipeline
            .classify_bytes("resnet18", b"\x89PNG\r\n\x1a\nnot really")
            .unwrap_err();
        assert!(matches!(err, ClassifyError::ImageDecode(_)));
        assert_eq!(pipeline.registry().load_count(), 0);
    }

    #[test]
    fn catalog_mismatch_is_surfaced() {
        let pipeline = pipeline(1001, 1000);
        let err = pipeline.classify("resnet18", &sample_image()).unwrap_err();
        assert!(matches!(
            err,
            ClassifyError::CatalogMismatch {
                catalog: 1000,
                model: 1001
            }
        ));
    }
}
