//! Multi-folder workspaces.
//!
//! An editor window can hold several folders; each one that has a models
//! directory gets its own `ProjectIndex`. File events are routed to the project
//! whose root contains the file (the deepest root wins for nested folders).

use anyhow::Result;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::load_config;
use crate::index::{IndexCommand, ProjectIndex, ReloadOutcome};
use crate::syntax::path_ext_lower;

#[derive(Debug, Default)]
pub struct Workspace {
    folders: Vec<PathBuf>,
    /// Overrides `modelsDir` from each folder's config file when set.
    models_dir: Option<String>,
    projects: Vec<ProjectIndex>,
}

impl Workspace {
    pub fn new(folders: Vec<PathBuf>) -> Self {
        Self {
            folders,
            models_dir: None,
            projects: Vec::new(),
        }
    }

    pub fn with_models_dir(mut self, models_dir: Option<String>) -> Self {
        self.models_dir = models_dir.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn folders(&self) -> &[PathBuf] {
        &self.folders
    }

    /// Rebuild every project index. Returns how many folders turned out to be
    /// model projects.
    pub async fn rescan(&mut self) -> usize {
        self.projects = self
            .folders
            .iter()
            .map(|folder| {
                let mut cfg = load_config(folder);
                if let Some(dir) = &self.models_dir {
                    cfg.models_dir = dir.clone();
                }
                ProjectIndex::new(folder.clone(), cfg.index_config())
            })
            .collect();

        let loaded = join_all(self.projects.iter_mut().map(|p| p.load())).await;
        let ok = loaded.into_iter().filter(|ok| *ok).count();
        info!(folders = self.folders.len(), projects = ok, "workspace scanned");
        ok
    }

    /// Projects whose models directory was found.
    pub fn projects(&self) -> impl Iterator<Item = &ProjectIndex> {
        self.projects.iter().filter(|p| p.is_ok())
    }

    pub fn project(&self, root: &Path) -> Option<&ProjectIndex> {
        self.projects().find(|p| p.root() == root)
    }

    fn owner_index(&self, path: &Path) -> Option<usize> {
        self.projects
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_ok() && path.starts_with(p.root()))
            .max_by_key(|(_, p)| p.root().components().count())
            .map(|(idx, _)| idx)
    }

    /// The project owning `path`, if any.
    pub fn project_for_path(&self, path: &Path) -> Option<&ProjectIndex> {
        self.owner_index(path).map(|idx| &self.projects[idx])
    }

    /// A model file was created or saved on disk.
    ///
    /// Only files directly inside the owning project's models directory are
    /// considered; anything else returns `Ok(None)`.
    pub async fn file_changed(&mut self, path: &Path) -> Result<Option<ReloadOutcome>> {
        let Some(idx) = self.owner_index(path) else {
            return Ok(None);
        };
        let project = &mut self.projects[idx];
        let in_models_dir = path.parent() == Some(project.models_dir().as_path());
        if !in_models_dir || !project.config().accepts_extension(&path_ext_lower(path)) {
            debug!(file = %path.display(), "change outside models directory");
            return Ok(None);
        }
        let outcome = project
            .apply(IndexCommand::ReloadFile {
                path: path.to_path_buf(),
                text: None,
            })
            .await?;
        Ok(Some(outcome))
    }

    /// An open buffer changed. Only files that are already indexed models are
    /// re-extracted, from `text` rather than from disk.
    pub async fn file_edited(&mut self, path: &Path, text: &str) -> Result<Option<ReloadOutcome>> {
        let Some(idx) = self.owner_index(path) else {
            return Ok(None);
        };
        let project = &mut self.projects[idx];
        if project.find_by_file(path).is_none() {
            return Ok(None);
        }
        let outcome = project
            .apply(IndexCommand::ReloadFile {
                path: path.to_path_buf(),
                text: Some(text.to_string()),
            })
            .await?;
        Ok(Some(outcome))
    }

    /// `(project root, namespaces)` for every model project, for tree views.
    pub fn model_names(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.projects()
            .map(|p| (p.root().to_path_buf(), p.list_namespaces()))
            .collect()
    }

    /// File declaring `namespace` in the project rooted at `root`.
    pub fn model_file(&self, root: &Path, namespace: &str) -> Option<&Path> {
        self.project(root)?.find_by_name(namespace).map(|m| m.file.as_path())
    }
}
