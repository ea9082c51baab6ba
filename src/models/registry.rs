use crate::models::classifier::{LoadedModel, OnnxModelFactory};
use crate::utils::error::ClassifyError;
use crate::{Config, Result};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// 模型构造函数：标识 → 已加载的模型
pub trait ModelFactory: Send + Sync {
    fn load(&self, model_id: &str) -> Result<LoadedModel>;
}

impl<F> ModelFactory for F
where
    F: Fn(&str) -> Result<LoadedModel> + Send + Sync,
{
    fn load(&self, model_id: &str) -> Result<LoadedModel> {
        self(model_id)
    }
}

struct ModelEntry {
    factory: Arc<dyn ModelFactory>,
    // 首次使用时加载；并发的首次请求阻塞等待同一次加载
    slot: OnceCell<LoadedModel>,
}

/// 模型注册表
///
/// 标识集合在构造时确定，之后只读。每个标识最多加载一次，失败时槽位保持为空。
pub struct ModelRegistry {
    entries: HashMap<String, ModelEntry>,
    order: Vec<String>,
    load_count: AtomicUsize,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            load_count: AtomicUsize::new(0),
        }
    }

    /// 按配置的允许列表注册ONNX模型
    pub fn from_config(config: &Config) -> Result<Self> {
        let factory: Arc<dyn ModelFactory> = Arc::new(OnnxModelFactory::new(
            config.models_dir.clone(),
            config.onnx_config.clone(),
        ));

        let mut registry = Self::new();
        for model_id in &config.models {
            registry.register_shared(model_id, Arc::clone(&factory))?;
        }

        tracing::info!("Model registry configured with: {:?}", registry.order);
        Ok(registry)
    }

    pub fn register<F>(&mut self, model_id: &str, factory: F) -> Result<()>
    where
        F: ModelFactory + 'static,
    {
        self.register_shared(model_id, Arc::new(factory))
    }

    fn register_shared(&mut self, model_id: &str, factory: Arc<dyn ModelFactory>) -> Result<()> {
        if self.entries.contains_key(model_id) {
            return Err(ClassifyError::Config(format!(
                "Model '{}' registered twice",
                model_id
            )));
        }

        self.entries.insert(
            model_id.to_string(),
            ModelEntry {
                factory,
                slot: OnceCell::new(),
            },
        );
        self.order.push(model_id.to_string());
        Ok(())
    }

    /// 获取模型，首次请求时加载并缓存
    pub fn resolve(&self, model_id: &str) -> Result<LoadedModel> {
        let entry = self
            .entries
            .get(model_id)
            .ok_or_else(|| ClassifyError::UnknownModel(model_id.to_string()))?;

        let model = entry.slot.get_or_try_init(|| {
            self.load_count.fetch_add(1, Ordering::SeqCst);
            let start = Instant::now();

            match entry.factory.load(model_id) {
                Ok(model) => {
                    tracing::info!(
                        "Model '{}' loaded in {:.3}s",
                        model_id,
                        start.elapsed().as_secs_f32()
                    );
                    Ok(model)
                }
                Err(e) => {
                    tracing::error!("Failed to load model '{}': {}", model_id, e);
                    Err(match e {
                        ClassifyError::ModelLoad(_) => e,
                        other => ClassifyError::ModelLoad(format!("'{}': {}", model_id, other)),
                    })
                }
            }
        })?;

        Ok(Arc::clone(model))
    }

    /// 预加载全部模型，返回加载失败的模型
    pub fn preload_all(&self) -> Vec<(String, ClassifyError)> {
        self.order
            .iter()
            .filter_map(|id| self.resolve(id).err().map(|e| (id.clone(), e)))
            .collect()
    }

    pub fn supported_models(&self) -> &[String] {
        &self.order
    }

    pub fn is_loaded(&self, model_id: &str) -> bool {
        self.entries
            .get(model_id)
            .is_some_and(|entry| entry.slot.get().is_some())
    }

    /// 工厂被调用的次数
    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    pub fn get_stats(&self) -> ModelStats {
        ModelStats {
            supported_models: self.order.clone(),
            loaded_models: self
                .order
                .iter()
                .filter(|id| self.is_loaded(id))
                .cloned()
                .collect(),
            load_count: self.load_count(),
        }
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 模型统计信息
#[derive(Debug, Clone, Serialize)]
pub struct ModelStats {
    pub supported_models: Vec<String>,
    pub loaded_models: Vec<String>,
    pub load_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PreprocessedTensor;
    use crate::models::ClassifierModel;
    use std::sync::Barrier;
    use std::time::Duration;

    struct ConstantModel;

    impl ClassifierModel for ConstantModel {
        fn name(&self) -> &str {
            "constant"
        }

        fn forward(&self, _input: &PreprocessedTensor) -> Result<Vec<f32>> {
            Ok(vec![0.0; 5])
        }
    }

    fn constant_factory(_id: &str) -> Result<LoadedModel> {
        Ok(Arc::new(ConstantModel))
    }

    #[test]
    fn unknown_model_is_rejected_before_loading() {
        let mut registry = ModelRegistry::new();
        registry.register("resnet18", constant_factory).unwrap();

        let err = registry.resolve("nonexistent_model").err().unwrap();
        assert!(matches!(err, ClassifyError::UnknownModel(ref id) if id == "nonexistent_model"));
        assert_eq!(registry.load_count(), 0);
    }

    #[test]
    fn resolved_models_are_cached() {
        let mut registry = ModelRegistry::new();
        registry.register("resnet18", constant_factory).unwrap();

        let first = registry.resolve("resnet18").unwrap();
        let second = registry.resolve("resnet18").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.load_count(), 1);
        assert!(registry.is_loaded("resnet18"));
    }

    #[test]
    fn duplicate_registration_is_config_error() {
        let mut registry = ModelRegistry::new();
        registry.register("resnet18", constant_factory).unwrap();
        let result = registry.register("resnet18", constant_factory);
        assert!(matches!(result, Err(ClassifyError::Config(_))));
    }

    #[test]
    fn concurrent_first_requests_load_once() {
        let mut registry = ModelRegistry::new();
        registry
            .register("resnet18", |_id: &str| -> Result<LoadedModel> {
                std::thread::sleep(Duration::from_millis(50));
                Ok(Arc::new(ConstantModel))
            })
            .unwrap();

        let threads = 8;
        let barrier = Barrier::new(threads);
        let models: Vec<LoadedModel> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        registry.resolve("resnet18").unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(registry.load_count(), 1);
        assert!(models.iter().all(|m| Arc::ptr_eq(m, &models[0])));
    }

    #[test]
    fn failed_load_is_reported_and_not_cached() {
        let mut registry = ModelRegistry::new();
        registry
            .register("broken", |_id: &str| -> Result<LoadedModel> {
                Err(ClassifyError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "weights missing",
                )))
            })
            .unwrap();

        let err = registry.resolve("broken").err().unwrap();
        assert!(matches!(err, ClassifyError::ModelLoad(_)));
        assert!(!registry.is_loaded("broken"));

        // 下一次请求会重新尝试加载
        assert!(registry.resolve("broken").is_err());
        assert_eq!(registry.load_count(), 2);
    }

    #[test]
    fn preload_reports_failures_per_model() {
        let mut registry = ModelRegistry::new();
        registry.register("good", constant_factory).unwrap();
        registry
            .register("bad", |id: &str| -> Result<LoadedModel> {
                Err(ClassifyError::ModelLoad(format!("{id} missing")))
            })
            .unwrap();

        let failures = registry.preload_all();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "bad");

        let stats = registry.get_stats();
        assert_eq!(stats.supported_models, vec!["good", "bad"]);
        assert_eq!(stats.loaded_models, vec!["good"]);
    }
}
