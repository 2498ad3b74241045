//! File-backed checkpoints: one plain integer per file

use super::{CheckpointName, CheckpointStore};
use crate::error::{FederatorError, FederatorResult};

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Stores each checkpoint as `<dir>/<name>.txt`
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn open(dir: impl AsRef<Path>) -> FederatorResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, name: CheckpointName) -> PathBuf {
        self.dir.join(name.file_name())
    }

    fn tmp_path_for(&self, name: CheckpointName) -> PathBuf {
        self.dir.join(format!(".{}.tmp", name.file_name()))
    }

    /// Persist the directory entry created by a rename
    async fn sync_dir(&self) -> FederatorResult<()> {
        #[cfg(unix)]
        fs::File::open(&self.dir).await?.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, name: CheckpointName) -> FederatorResult<Option<u64>> {
        let path = self.path_for(name);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        raw.trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| FederatorError::Checkpoint {
                name: name.to_string(),
                message: format!("{:?} does not hold an integer: {}", path, e),
            })
    }

    async fn save(&self, name: CheckpointName, value: u64) -> FederatorResult<()> {
        let path = self.path_for(name);
        // Same directory so the rename never crosses filesystems.
        let tmp = self.tmp_path_for(name);

        // Data must be on disk before the rename makes it visible.
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(value.to_string().as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &path).await?;
        self.sync_dir().await?;

        debug!("Saved checkpoint {} = {}", name, value);
        Ok(())
    }
}
