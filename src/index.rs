//! Per-project model index.
//!
//! One `ProjectIndex` owns the namespace -> `ModuleResult` map for a single
//! project root. It is the only stateful piece of the crate; mutation goes
//! through `&mut self`, so concurrent writers are serialized by the caller.

use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::error::ExtractError;
use crate::extract::{extract, ModuleResult};
use crate::syntax::path_ext_lower;

/// Inbound mutation requests, typically produced by a file watcher or an
/// editor's change notifications (already debounced by the caller).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexCommand {
    /// Re-extract one file, from `text` when given, otherwise from disk.
    ReloadFile { path: PathBuf, text: Option<String> },
}

/// What a reload did to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The entry for `namespace` now reflects the reloaded file.
    Updated { namespace: String },
    /// The file did not extract; the previous entry (if any) is kept.
    Unchanged { reason: String },
}

#[derive(Debug)]
pub struct ProjectIndex {
    root: PathBuf,
    config: IndexConfig,
    ok: bool,
    models: BTreeMap<String, ModuleResult>,
    /// Namespace most recently installed from each file.
    latest: HashMap<PathBuf, String>,
}

impl ProjectIndex {
    pub fn new(root: impl Into<PathBuf>, config: IndexConfig) -> Self {
        Self {
            root: root.into(),
            config,
            ok: false,
            models: BTreeMap::new(),
            latest: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// True once `load` found and scanned the models directory.
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join(&self.config.models_dir)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Scan the models directory and rebuild the index from scratch.
    ///
    /// Returns `false` (and leaves the index empty) when the directory does
    /// not exist; most workspace folders are simply not model projects.
    pub async fn load(&mut self) -> bool {
        self.ok = false;
        self.models.clear();
        self.latest.clear();

        let dir = self.models_dir();
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                debug!(dir = %dir.display(), "no models directory");
                return false;
            }
        }

        let files = match self.list_model_files(&dir).await {
            Ok(files) => files,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to list models directory");
                return false;
            }
        };

        let results = join_all(files.iter().map(|file| extract(file, None))).await;
        for (file, result) in files.iter().zip(results) {
            match result {
                Ok(model) if model.ok => self.install(model),
                Ok(model) => {
                    debug!(
                        file = %file.display(),
                        reason = model.failure.as_deref().unwrap_or("unknown"),
                        "not a model module"
                    );
                }
                Err(e) => warn!(error = %e, "skipping unreadable model file"),
            }
        }

        self.ok = true;
        info!(root = %self.root.display(), models = self.models.len(), "indexed project");
        true
    }

    /// Files directly inside `dir` with an accepted extension, sorted by path.
    async fn list_model_files(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !self.config.accepts_extension(&path_ext_lower(&path)) {
                continue;
            }
            // metadata() follows symlinks, so linked model files count too.
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => files.push(path),
                _ => continue,
            }
        }
        files.sort();
        Ok(files)
    }

    /// Re-extract one file and replace the entry for its namespace.
    ///
    /// `text` (an unsaved buffer) is used instead of the file contents when
    /// given; nothing is written to disk. A file that no longer extracts leaves
    /// the index as it was.
    pub async fn reload(&mut self, path: &Path, text: Option<&str>) -> Result<ReloadOutcome, ExtractError> {
        let model = extract(path, text).await?;
        if !model.ok {
            let reason = model.failure.unwrap_or_else(|| "not a model module".to_string());
            debug!(file = %path.display(), %reason, "reload kept previous entry");
            return Ok(ReloadOutcome::Unchanged { reason });
        }
        let namespace = model.namespace.clone();
        self.install(model);
        Ok(ReloadOutcome::Updated { namespace })
    }

    pub async fn apply(&mut self, command: IndexCommand) -> Result<ReloadOutcome, ExtractError> {
        match command {
            IndexCommand::ReloadFile { path, text } => self.reload(&path, text.as_deref()).await,
        }
    }

    fn install(&mut self, model: ModuleResult) {
        if let Some(previous) = self.models.get(&model.namespace) {
            if previous.file != model.file {
                debug!(
                    namespace = %model.namespace,
                    previous = %previous.file.display(),
                    file = %model.file.display(),
                    "namespace redeclared, last one wins"
                );
            }
        }
        self.latest.insert(model.file.clone(), model.namespace.clone());
        self.models.insert(model.namespace.clone(), model);
    }

    pub fn find_by_name(&self, namespace: &str) -> Option<&ModuleResult> {
        self.models.get(namespace)
    }

    /// Entry declared by `file`. After a namespace rename the entry from the
    /// latest reload wins over the stale one.
    pub fn find_by_file(&self, file: &Path) -> Option<&ModuleResult> {
        self.latest
            .get(file)
            .and_then(|ns| self.models.get(ns))
            .filter(|m| m.file == file)
            .or_else(|| self.models.values().find(|m| m.file == file))
    }

    pub fn list_namespaces(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn models(&self) -> impl Iterator<Item = &ModuleResult> {
        self.models.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const USER_TS: &str = include_str!("../tests/fixtures/models/user.ts");

    fn project_with(files: &[(&str, &str)]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("src/models");
        std::fs::create_dir_all(&dir).unwrap();
        for (name, body) in files {
            std::fs::write(dir.join(name), body).unwrap();
        }
        tmp
    }

    fn model(ns: &str) -> String {
        format!("export default {{ namespace: '{ns}', state: {{}}, effects: {{ *load() {{}} }}, reducers: {{}} }};\n")
    }

    #[tokio::test]
    async fn load_indexes_user_model() {
        let tmp = project_with(&[("user.ts", USER_TS)]);
        let mut index = ProjectIndex::new(tmp.path(), IndexConfig::default());
        assert!(index.load().await);
        assert!(index.is_ok());
        assert_eq!(index.list_namespaces(), ["user"]);

        let user = index.find_by_name("user").unwrap();
        assert!(user.ok);
        assert_eq!(user.file, tmp.path().join("src/models/user.ts"));
        let names = |l: &[crate::extract::NamedLocation]| l.iter().map(|n| n.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&user.states), ["list", "currentUser"]);
        assert_eq!(names(&user.effects), ["fetch", "fetchCurrent"]);
        assert_eq!(names(&user.reducers), ["save", "saveCurrentUser", "changeNotifyCount"]);
    }

    #[tokio::test]
    async fn missing_models_dir_is_not_ok() {
        let tmp = TempDir::new().unwrap();
        let mut index = ProjectIndex::new(tmp.path(), IndexConfig::default());
        assert!(!index.load().await);
        assert!(!index.is_ok());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn models_dir_that_is_a_file_is_not_ok() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::write(tmp.path().join("src/models"), "nope").unwrap();
        let mut index = ProjectIndex::new(tmp.path(), IndexConfig::default());
        assert!(!index.load().await);
    }

    #[tokio::test]
    async fn malformed_files_are_dropped_from_batch() {
        let tmp = project_with(&[
            ("a.js", model("a").as_str()),
            ("b.jsx", model("b").as_str()),
            ("c.ts", model("c").as_str()),
            ("d.tsx", model("d").as_str()),
            ("broken.js", "export default { namespace: 'broken', "),
            ("shape.js", "export const x = 1;"),
            ("notes.md", model("markdown").as_str()),
        ]);
        std::fs::create_dir_all(tmp.path().join("src/models/nested.js")).unwrap();

        let mut index = ProjectIndex::new(tmp.path(), IndexConfig::default());
        assert!(index.load().await);
        assert_eq!(index.list_namespaces(), ["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn duplicate_namespace_last_file_wins() {
        let tmp = project_with(&[("a.js", model("same").as_str()), ("b.js", model("same").as_str())]);
        let mut index = ProjectIndex::new(tmp.path(), IndexConfig::default());
        index.load().await;
        assert_eq!(index.len(), 1);
        assert_eq!(index.find_by_name("same").unwrap().file, tmp.path().join("src/models/b.js"));
    }

    #[tokio::test]
    async fn custom_models_dir_and_extensions() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("app/store");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.js"), model("a")).unwrap();
        std::fs::write(dir.join("b.ts"), model("b")).unwrap();

        let cfg = IndexConfig {
            models_dir: PathBuf::from("app/store"),
            extensions: vec!["js".into()],
        };
        let mut index = ProjectIndex::new(tmp.path(), cfg);
        assert!(index.load().await);
        assert_eq!(index.list_namespaces(), ["a"]);
    }

    #[tokio::test]
    async fn reload_from_unsaved_text_does_not_touch_disk() {
        let tmp = project_with(&[("user.ts", USER_TS)]);
        let file = tmp.path().join("src/models/user.ts");
        let mut index = ProjectIndex::new(tmp.path(), IndexConfig::default());
        index.load().await;

        let edited = USER_TS.replace("changeNotifyCount", "clearNotices");
        let outcome = index.reload(&file, Some(&edited)).await.unwrap();
        assert_eq!(outcome, ReloadOutcome::Updated { namespace: "user".into() });
        let user = index.find_by_name("user").unwrap();
        assert_eq!(user.reducers.last().unwrap().name, "clearNotices");
        assert_eq!(std::fs::read_to_string(&file).unwrap(), USER_TS);

        // Reloading from disk brings the saved version back.
        index.reload(&file, None).await.unwrap();
        assert_eq!(index.find_by_name("user").unwrap().reducers.last().unwrap().name, "changeNotifyCount");
    }

    #[tokio::test]
    async fn failed_reload_keeps_last_good_entry() {
        let tmp = project_with(&[("user.ts", USER_TS)]);
        let file = tmp.path().join("src/models/user.ts");
        let mut index = ProjectIndex::new(tmp.path(), IndexConfig::default());
        index.load().await;
        let before = index.find_by_name("user").unwrap().clone();

        let outcome = index
            .apply(IndexCommand::ReloadFile {
                path: file.clone(),
                text: Some("export default { namespace: 'user', effects: {".into()),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, ReloadOutcome::Unchanged { .. }));
        assert_eq!(index.find_by_name("user"), Some(&before));
    }

    #[tokio::test]
    async fn reload_of_missing_file_is_an_error() {
        let tmp = project_with(&[]);
        let mut index = ProjectIndex::new(tmp.path(), IndexConfig::default());
        index.load().await;
        let gone = tmp.path().join("src/models/gone.js");
        assert!(index.reload(&gone, None).await.is_err());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn reload_adds_new_model_and_find_by_file() {
        let tmp = project_with(&[("a.js", model("a").as_str())]);
        let mut index = ProjectIndex::new(tmp.path(), IndexConfig::default());
        index.load().await;

        let b = tmp.path().join("src/models/b.js");
        std::fs::write(&b, model("b")).unwrap();
        index.reload(&b, None).await.unwrap();
        assert_eq!(index.list_namespaces(), ["a", "b"]);
        assert_eq!(index.find_by_file(&b).unwrap().namespace, "b");
        assert!(index.find_by_file(&tmp.path().join("src/models/c.js")).is_none());
    }

    #[tokio::test]
    async fn find_by_file_prefers_latest_namespace() {
        let tmp = project_with(&[]);
        let file = tmp.path().join("src/models/a.js");
        let mut index = ProjectIndex::new(tmp.path(), IndexConfig::default());
        index.load().await;

        let alpha = "export default { namespace: 'alpha', reducers: { old(s) { return s; } } };";
        let zeta = "export default { namespace: 'zeta', reducers: { fresh(s) { return s; } } };";
        index.reload(&file, Some(alpha)).await.unwrap();
        index.reload(&file, Some(zeta)).await.unwrap();

        // The renamed-away entry is kept, but lookups by file see the new one.
        assert_eq!(index.list_namespaces(), ["alpha", "zeta"]);
        let current = index.find_by_file(&file).unwrap();
        assert_eq!(current.namespace, "zeta");
        assert_eq!(current.reducers[0].name, "fresh");

        // Another file taking over `zeta` falls back to what `a.js` still owns.
        let other = tmp.path().join("src/models/b.js");
        index.reload(&other, Some(zeta)).await.unwrap();
        assert_eq!(index.find_by_file(&file).unwrap().namespace, "alpha");
        assert_eq!(index.find_by_file(&other).unwrap().namespace, "zeta");
    }
}
