//! File-backed flow repository

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::flow::{
    parse_stored_flow, to_json, validate, FlowDefinition, FlowError, FlowId, FlowRepository,
    ValidatedFlow,
};

const FLOW_EXTENSION: &str = "json";

/// Flow definitions stored one file per flow:
///
/// ```text
/// {root}/
/// └── flows/
///     ├── triage.json
///     └── summarize.json
/// ```
///
/// Each save writes its own `.{id}.{uuid}.json.tmp` next to the target and
/// renames it into place. Readers in other processes see either the old or the
/// new document, and concurrent writers of one ID resolve to the last rename.
#[derive(Debug, Clone)]
pub struct FileFlowRepository {
    dir: PathBuf,
}

impl FileFlowRepository {
    /// Repository over a directory of flow documents
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Repository over `<root>/flows`
    pub fn for_root(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join("flows"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `id`
    pub fn path_for(&self, id: &FlowId) -> PathBuf {
        self.dir.join(format!("{}.{}", id, FLOW_EXTENSION))
    }

    fn temp_path_for(&self, id: &FlowId) -> PathBuf {
        self.dir
            .join(format!(".{}.{}.{}.tmp", id, Uuid::new_v4().simple(), FLOW_EXTENSION))
    }

    async fn read(&self, id: &FlowId) -> Result<Vec<u8>, FlowError> {
        let path = self.path_for(id);
        fs::read(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                FlowError::not_found(id.as_str())
            } else {
                FlowError::storage(format!("Failed to read {}: {}", path.display(), e))
            }
        })
    }
}

fn io_error(action: &str, path: &Path, error: std::io::Error) -> FlowError {
    FlowError::storage(format!("Failed to {} {}: {}", action, path.display(), error))
}

#[async_trait]
impl FlowRepository for FileFlowRepository {
    async fn list(&self) -> Result<Vec<FlowId>, FlowError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "Flow directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_error("read directory", &self.dir, e)),
        };

        let mut ids = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("read directory", &self.dir, e))?
        {
            let path = entry.path();

            if path.extension().and_then(|ext| ext.to_str()) != Some(FLOW_EXTENSION) {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            // Hidden files are in-progress saves
            if stem.starts_with('.') {
                continue;
            }

            match FlowId::new(stem) {
                Ok(id) => ids.push(id),
                Err(e) => warn!(
                    file = %path.display(),
                    error = %e,
                    "Skipping flow file with invalid name"
                ),
            }
        }

        ids.sort();
        Ok(ids)
    }

    async fn load(&self, id: &FlowId) -> Result<ValidatedFlow, FlowError> {
        let bytes = self.read(id).await?;
        parse_stored_flow(id, &bytes)
    }

    async fn save(&self, definition: &FlowDefinition) -> Result<(), FlowError> {
        let validated = validate(definition.clone())?;
        let json = to_json(&validated)?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error("create", &self.dir, e))?;

        let target = self.path_for(definition.id());
        let temp = self.temp_path_for(definition.id());

        let write = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(json.as_bytes()).await?;
            file.write_all(b"\n").await?;
            file.sync_all().await?;
            fs::rename(&temp, &target).await
        };

        if let Err(e) = write.await {
            let _ = fs::remove_file(&temp).await;
            return Err(io_error("write", &target, e));
        }

        debug!(flow = %definition.id(), path = %target.display(), "Flow saved");
        Ok(())
    }

    async fn delete(&self, id: &FlowId) -> Result<bool, FlowError> {
        let path = self.path_for(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error("delete", &path, e)),
        }
    }

    async fn exists(&self, id: &FlowId) -> Result<bool, FlowError> {
        fs::try_exists(self.path_for(id))
            .await
            .map_err(|e| io_error("inspect", &self.path_for(id), e))
    }
}
