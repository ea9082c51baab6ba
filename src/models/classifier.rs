use crate::config::OnnxConfig;
use crate::image::PreprocessedTensor;
use crate::models::registry::ModelFactory;
use crate::utils::error::ClassifyError;
use crate::Result;
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 分类模型：一次前向推理，返回每个类别的原始分数（logits）
pub trait ClassifierModel: Send + Sync {
    fn name(&self) -> &str;

    fn forward(&self, input: &PreprocessedTensor) -> Result<Vec<f32>>;
}

pub type LoadedModel = Arc<dyn ClassifierModel>;

/// 基于ONNX Runtime的分类模型
///
/// ONNX导出的图只包含推理路径（无dropout、BN统计更新），因此天然处于评估模式。
pub struct OnnxClassifier {
    name: String,
    session: Mutex<Session>,
    input_name: String,  // 动态发现的输入名称
    output_name: String, // 动态发现的输出名称
}

impl OnnxClassifier {
    pub fn from_file(name: &str, model_path: &Path, onnx_config: &OnnxConfig) -> Result<Self> {
        if !model_path.exists() {
            return Err(ClassifyError::ModelLoad(format!(
                "Model '{}' not found: {}",
                name,
                model_path.display()
            )));
        }

        tracing::info!("Loading model '{}' from: {}", name, model_path.display());

        let session = Self::build_session(model_path, onnx_config).map_err(|e| {
            ClassifyError::ModelLoad(format!("Failed to create session for '{}': {}", name, e))
        })?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => {
                return Err(ClassifyError::ModelLoad(format!("Model '{}' has no inputs", name)));
            }
        };

        // 动态发现输出名称
        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => {
                return Err(ClassifyError::ModelLoad(format!("Model '{}' has no outputs", name)));
            }
        };

        tracing::info!("Model '{}' input: '{}', output: '{}'", name, input_name, output_name);
        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("Model '{}' output[{}]: '{}'", name, i, output.name);
        }

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    fn build_session(model_path: &Path, onnx_config: &OnnxConfig) -> ort::Result<Session> {
        let level = if onnx_config.enable_optimization {
            match onnx_config.optimization_level {
                i32::MIN..=0 => GraphOptimizationLevel::Disable,
                1 => GraphOptimizationLevel::Level1,
                2 => GraphOptimizationLevel::Level2,
                _ => GraphOptimizationLevel::Level3,
            }
        } else {
            GraphOptimizationLevel::Disable
        };

        Session::builder()?
            .with_optimization_level(level)?
            .with_intra_threads(onnx_config.intra_threads)?
            .commit_from_file(model_path)
    }
}

impl ClassifierModel for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: &PreprocessedTensor) -> Result<Vec<f32>> {
        let input_tensor = Tensor::from_array(input.as_array().clone()).map_err(|e| {
            ClassifyError::Inference(format!("Failed to build input tensor: {}", e))
        })?;

        // 推理 - 立即提取数据避免生命周期冲突
        let predictions = {
            let mut session = self.session.lock();
            let outputs = session
                .run(inputs![self.input_name.as_str() => input_tensor])
                .map_err(|e| ClassifyError::Inference(format!("'{}': {}", self.name, e)))?;

            match outputs.get(self.output_name.as_str()) {
                Some(output) => output
                    .try_extract_array::<f32>()
                    .map_err(|e| ClassifyError::Inference(format!("'{}': {}", self.name, e)))?
                    .into_owned(),
                None => {
                    let available_outputs: Vec<String> =
                        outputs.keys().map(|s| s.to_string()).collect();
                    return Err(ClassifyError::Inference(format!(
                        "Output '{}' not found. Available outputs: {:?}",
                        self.output_name, available_outputs
                    )));
                }
            }
        };

        // 期望 [1, N] 或 [N]
        let shape = predictions.shape().to_vec();
        let single_row = match shape.as_slice() {
            [_] => true,
            [1, _] => true,
            _ => false,
        };
        if !single_row {
            return Err(ClassifyError::Inference(format!(
                "Expected logits of shape [1, N], got {:?}",
                shape
            )));
        }

        Ok(predictions.iter().copied().collect())
    }
}

/// 从模型目录按 `<id>.onnx` 加载模型
#[derive(Debug, Clone)]
pub struct OnnxModelFactory {
    models_dir: PathBuf,
    onnx_config: OnnxConfig,
}

impl OnnxModelFactory {
    pub fn new(models_dir: PathBuf, onnx_config: OnnxConfig) -> Self {
        Self {
            models_dir,
            onnx_config,
        }
    }
}

impl ModelFactory for OnnxModelFactory {
    fn load(&self, model_id: &str) -> Result<LoadedModel> {
        let path = self.models_dir.join(format!("{model_id}.onnx"));
        let model = OnnxClassifier::from_file(model_id, &path, &self.onnx_config)?;
        Ok(Arc::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_file_is_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let factory = OnnxModelFactory::new(
            dir.path().to_path_buf(),
            OnnxConfig {
                intra_threads: 1,
                optimization_level: 3,
                enable_optimization: true,
            },
        );

        match factory.load("resnet18") {
            Err(ClassifyError::ModelLoad(msg)) => assert!(msg.contains("resnet18")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("loading a missing model should fail"),
        }
    }
}
