use crate::utils::error::ClassifyError;
use crate::Result;
use std::collections::HashSet;
use std::path::PathBuf;

/// 默认启用的模型列表
pub const DEFAULT_MODELS: &[&str] = &["resnet18", "resnet50", "alexnet", "vgg16", "mobilenet_v2"];

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 模型文件目录（每个模型对应 `<id>.onnx`）
    pub models_dir: PathBuf,

    /// 受管图像目录
    pub images_dir: PathBuf,

    /// 标签文件路径
    pub labels_path: PathBuf,

    /// 允许使用的模型标识
    pub models: Vec<String>,

    /// 工作线程数量
    pub workers: usize,

    /// 启动时预加载全部模型
    pub preload: bool,

    /// 开发模式
    pub dev_mode: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别 (0-3)
    pub optimization_level: i32,

    /// 启用图优化
    pub enable_optimization: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,
}

impl Config {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bind_addr: String,
        models_dir: String,
        images_dir: String,
        labels_path: Option<String>,
        models: Vec<String>,
        workers: Option<usize>,
        preload: bool,
        dev_mode: bool,
    ) -> Result<Self> {
        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores).max(1);

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1), // 使用75%的CPU核心
            optimization_level: 3,
            enable_optimization: true,
        };

        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 }, // 开发模式更长超时
            max_request_size: 50 * 1024 * 1024, // 50MB
        };

        let models = if models.is_empty() {
            DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
        } else {
            models
        };
        Self::validate_models(&models)?;

        let models_dir = PathBuf::from(models_dir);
        let images_dir = PathBuf::from(images_dir);
        // 标签文件默认位于图像目录中
        let labels_path = labels_path
            .map(PathBuf::from)
            .unwrap_or_else(|| images_dir.join("imagenet_labels.json"));

        Ok(Self {
            bind_addr,
            models_dir,
            images_dir,
            labels_path,
            models,
            workers,
            preload,
            dev_mode,
            onnx_config,
            server_config,
        })
    }

    fn validate_models(models: &[String]) -> Result<()> {
        let mut seen = HashSet::new();
        for id in models {
            let valid = !id.is_empty()
                && id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
                && !id.contains("..");
            if !valid {
                return Err(ClassifyError::Config(format!("Invalid model identifier '{id}'")));
            }
            if !seen.insert(id.as_str()) {
                return Err(ClassifyError::Config(format!("Duplicate model identifier '{id}'")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(models: Vec<String>) -> Result<Config> {
        Config::new(
            "127.0.0.1:0".to_string(),
            "models".to_string(),
            "images".to_string(),
            None,
            models,
            Some(2),
            false,
            false,
        )
    }

    #[test]
    fn empty_model_list_falls_back_to_defaults() {
        let config = config_with(Vec::new()).unwrap();
        assert_eq!(config.models.len(), DEFAULT_MODELS.len());
        assert_eq!(config.workers, 2);
        assert_eq!(config.labels_path, PathBuf::from("images").join("imagenet_labels.json"));
        assert_eq!(config.models_dir, PathBuf::from("models"));
    }

    #[test]
    fn rejects_duplicate_and_unsafe_identifiers() {
        let dup = config_with(vec!["resnet18".into(), "resnet18".into()]);
        assert!(matches!(dup, Err(ClassifyError::Config(_))));

        let traversal = config_with(vec!["../etc/passwd".into()]);
        assert!(matches!(traversal, Err(ClassifyError::Config(_))));

        let blank = config_with(vec![String::new()]);
        assert!(matches!(blank, Err(ClassifyError::Config(_))));
    }

    #[test]
    fn dev_mode_extends_timeout() {
        let config = Config::new(
            "127.0.0.1:0".into(),
            "models".into(),
            "images".into(),
            Some("labels.txt".into()),
            vec!["resnet18".into()],
            None,
            false,
            true,
        )
        .unwrap();
        assert_eq!(config.server_config.request_timeout, 300);
        assert_eq!(config.labels_path, PathBuf::from("labels.txt"));
        assert!(config.workers >= 1);
    }
}
