use crate::classify::types::{ClassificationResult, Prediction};
use crate::image::PreprocessedTensor;
use crate::models::{ClassifierModel, LabelCatalog};
use crate::utils::error::ClassifyError;
use crate::Result;

/// 返回的结果数量
pub const TOP_K: usize = 5;

/// 推理引擎：前向推理 → softmax百分比 → 按原始分数排序取Top-K
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    top_k: usize,
}

impl Default for InferenceEngine {
    fn default() -> Self {
        Self { top_k: TOP_K }
    }
}

impl InferenceEngine {
    pub fn infer(
        &self,
        model: &dyn ClassifierModel,
        tensor: &PreprocessedTensor,
        catalog: &LabelCatalog,
    ) -> Result<ClassificationResult> {
        let scores = model.forward(tensor)?;
        tracing::debug!(
            "Model '{}' produced {} scores for input {:?}",
            model.name(),
            scores.len(),
            tensor.shape()
        );
        self.rank(&scores, catalog)
    }

    /// 将原始分数映射为带标签的Top-K结果
    pub fn rank(&self, scores: &[f32], catalog: &LabelCatalog) -> Result<ClassificationResult> {
        if scores.len() != catalog.len() {
            tracing::error!(
                "Label catalog size {} does not match model output width {}",
                catalog.len(),
                scores.len()
            );
            return Err(ClassifyError::CatalogMismatch {
                catalog: catalog.len(),
                model: scores.len(),
            });
        }

        if let Some(idx) = scores.iter().position(|s| !s.is_finite()) {
            return Err(ClassifyError::Inference(format!(
                "Model produced non-finite score {} at index {}",
                scores[idx], idx
            )));
        }

        let percentages = softmax_percent(scores);
        let predictions = rank_top_k(scores, self.top_k)
            .into_iter()
            .map(|idx| {
                let label = catalog.get(idx).ok_or(ClassifyError::CatalogMismatch {
                    catalog: catalog.len(),
                    model: scores.len(),
                })?;
                Ok(Prediction {
                    label: label.to_string(),
                    score: percentages[idx],
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ClassificationResult::new(predictions))
    }
}

/// softmax × 100，减去最大值保证数值稳定
pub fn softmax_percent(scores: &[f32]) -> Vec<f32> {
    let max = scores
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max) as f64;

    let exps: Vec<f64> = scores.iter().map(|&s| (s as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();

    exps.into_iter().map(|e| (e / sum * 100.0) as f32).collect()
}

/// 按分数降序返回前k个下标；稳定排序，分数相同时下标小的在前
///
/// 使用IEEE 754全序比较，NaN 也有确定的位置（正NaN排在最前）。
pub fn rank_top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    indices.truncate(k);
    indices
}
