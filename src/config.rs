use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Conventional location of model files relative to the project root.
pub const DEFAULT_MODELS_DIR: &str = "src/models";

/// Name of the optional per-project settings file.
pub const CONFIG_FILE_NAME: &str = ".modelsight.json";

/// What a `ProjectIndex` needs to know about its project layout.
///
/// Callers build this from project settings; the index treats `models_dir` as
/// an opaque path relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub models_dir: PathBuf,
    /// Lowercase extensions (without dot) of files scanned in `models_dir`.
    pub extensions: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Config::default().index_config()
    }
}

impl IndexConfig {
    pub fn with_models_dir(mut self, models_dir: impl Into<PathBuf>) -> Self {
        self.models_dir = models_dir.into();
        self
    }

    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Contents of `.modelsight.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Directory holding model files, relative to the project root.
    pub models_dir: String,
    /// File extensions treated as model sources.
    pub extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models_dir: DEFAULT_MODELS_DIR.to_string(),
            extensions: ["js", "jsx", "ts", "tsx"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    pub fn index_config(&self) -> IndexConfig {
        let models_dir = self.models_dir.trim().trim_end_matches(['/', '\\']);
        IndexConfig {
            models_dir: if models_dir.is_empty() {
                PathBuf::from(DEFAULT_MODELS_DIR)
            } else {
                PathBuf::from(models_dir)
            },
            extensions: self
                .extensions
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }
}

/// Read `.modelsight.json` from `project_root`; a missing or malformed file
/// yields the defaults.
pub fn load_config(project_root: &Path) -> Config {
    let primary = project_root.join(CONFIG_FILE_NAME);

    let text = std::fs::read_to_string(&primary);
    let Ok(text) = text else { return Config::default() };

    serde_json::from_str::<Config>(&text).unwrap_or_else(|e| {
        tracing::warn!(file = %primary.display(), error = %e, "ignoring malformed config");
        Config::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = load_config(tmp.path()).index_config();
        assert_eq!(cfg.models_dir, PathBuf::from("src/models"));
        assert!(cfg.accepts_extension("TSX"));
        assert!(!cfg.accepts_extension("vue"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), r#"{ "modelsDir": "app/models/" }"#).unwrap();
        let cfg = load_config(tmp.path()).index_config();
        assert_eq!(cfg.models_dir, PathBuf::from("app/models"));
        assert_eq!(cfg.extensions, ["js", "jsx", "ts", "tsx"]);
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), "{ not json").unwrap();
        assert_eq!(load_config(tmp.path()).models_dir, DEFAULT_MODELS_DIR);
    }

    #[test]
    fn extensions_are_normalized() {
        let cfg = Config {
            models_dir: String::new(),
            extensions: vec![".JS".into(), " ts ".into(), "".into()],
        }
        .index_config();
        assert_eq!(cfg.models_dir, PathBuf::from(DEFAULT_MODELS_DIR));
        assert_eq!(cfg.extensions, ["js", "ts"]);
    }
}
