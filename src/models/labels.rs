use crate::classify::engine::TOP_K;
use crate::utils::error::ClassifyError;
use crate::Result;
use std::fs;
use std::path::Path;

/// 标签目录：输出位置 i 对应 `labels[i]`，进程生命周期内只读
#[derive(Debug, Clone)]
pub struct LabelCatalog {
    labels: Vec<String>,
}

impl LabelCatalog {
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.len() < TOP_K {
            return Err(ClassifyError::Config(format!(
                "Label catalog needs at least {} entries, got {}",
                TOP_K,
                labels.len()
            )));
        }
        Ok(Self { labels })
    }

    /// 从文件加载标签
    ///
    /// `.json` 文件必须是字符串数组；其他扩展名按每行一个标签读取。
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ClassifyError::Config(format!(
                "Label catalog not found: {}",
                path.display()
            )));
        }

        tracing::info!("Loading label catalog from: {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| {
            ClassifyError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let labels = if is_json {
            Self::parse_json(&content).map_err(|e| {
                ClassifyError::Config(format!(
                    "Label catalog {} is not a JSON list of strings: {}",
                    path.display(),
                    e
                ))
            })?
        } else {
            Self::parse_lines(&content)
        };

        let catalog = Self::new(labels)?;
        tracing::info!("Loaded label catalog with {} classes", catalog.len());
        tracing::debug!("First 5 labels: {:?}", &catalog.labels[..TOP_K]);
        Ok(catalog)
    }

    fn parse_json(content: &str) -> std::result::Result<Vec<String>, serde_json::Error> {
        serde_json::from_str::<Vec<String>>(content)
    }

    fn parse_lines(content: &str) -> Vec<String> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_json_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "labels.json", r#"["cat","dog","car","tree","fish"]"#);

        let catalog = LabelCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.get(1), Some("dog"));
        assert_eq!(catalog.get(5), None);
    }

    #[test]
    fn loads_plain_text_skipping_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "labels.txt", "cat\n\ndog\n car \ntree\nfish\n");

        let catalog = LabelCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.get(0), Some("cat"));
        assert_eq!(catalog.get(2), Some("car"));
        assert_eq!(catalog.get(4), Some("fish"));
        assert_eq!(catalog.get(5), None);
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = LabelCatalog::load(&dir.path().join("nope.json"));
        assert!(matches!(result, Err(ClassifyError::Config(_))));
    }

    #[test]
    fn malformed_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "labels.json", r#"{"0": "cat"}"#);
        assert!(matches!(LabelCatalog::load(&path), Err(ClassifyError::Config(_))));

        let path = write_file(&dir, "numbers.json", "[1, 2, 3, 4, 5]");
        assert!(matches!(LabelCatalog::load(&path), Err(ClassifyError::Config(_))));
    }

    #[test]
    fn too_few_labels_is_config_error() {
        let result = LabelCatalog::new(vec!["cat".into(), "dog".into()]);
        assert!(matches!(result, Err(ClassifyError::Config(_))));
    }
}
