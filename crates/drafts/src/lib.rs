//! Draft persistence for the analysis configuration.
//!
//! The workbench saves the draft after every meaningful change so a reload
//! resumes where the user left off; "Reset Form" clears it.

use std::path::{Path, PathBuf};

use analysis::config::AnalysisConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub saved_at_ms: u64,
    pub config: AnalysisConfig,
}

impl Draft {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            saved_at_ms: foundation::time::now_ms(),
            config,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("draft storage corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("draft storage error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DraftError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        DraftError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub trait DraftStore {
    fn load(&self) -> Result<Option<Draft>, DraftError>;
    fn save(&mut self, config: &AnalysisConfig) -> Result<(), DraftError>;
    fn clear(&mut self) -> Result<(), DraftError>;
}

/// Content hash of a config, used to skip rewriting an unchanged draft.
pub fn fingerprint(config: &AnalysisConfig) -> Result<String, DraftError> {
    let bytes = serde_json::to_vec(config)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[derive(Debug, Default)]
pub struct InMemoryDraftStore {
    draft: Option<Draft>,
    saves: usize,
}

impl InMemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saves that reached storage.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl DraftStore for InMemoryDraftStore {
    fn load(&self) -> Result<Option<Draft>, DraftError> {
        Ok(self.draft.clone())
    }

    fn save(&mut self, config: &AnalysisConfig) -> Result<(), DraftError> {
        self.draft = Some(Draft::new(config.clone()));
        self.saves += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DraftError> {
        self.draft = None;
        Ok(())
    }
}

/// JSON file on disk, replaced atomically through a temporary sibling.
#[derive(Debug)]
pub struct FileDraftStore {
    path: PathBuf,
    last_written: Option<String>,
}

impl FileDraftStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_written: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DraftStore for FileDraftStore {
    fn load(&self) -> Result<Option<Draft>, DraftError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DraftError::io(&self.path, e)),
        }
    }

    fn save(&mut self, config: &AnalysisConfig) -> Result<(), DraftError> {
        let hash = fingerprint(config)?;
        if self.last_written.as_deref() == Some(hash.as_str()) && self.path.exists() {
            debug!(path = %self.path.display(), "draft unchanged, skipping write");
            return Ok(());
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| DraftError::io(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(&Draft::new(config.clone()))?;
        std::fs::write(&tmp, text).map_err(|e| DraftError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| DraftError::io(&self.path, e))?;
        self.last_written = Some(hash);
        debug!(path = %self.path.display(), "draft saved");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DraftError> {
        self.last_written = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove draft");
                Err(DraftError::io(&self.path, e))
            }
        }
    }
}
