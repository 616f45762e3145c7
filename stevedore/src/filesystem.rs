use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::resources::ResourceLocator;

/// Metadata for one entry of a cluster filesystem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStatus {
    pub path: PathBuf,
    pub len: u64,
    pub modified: DateTime<Utc>,
    pub is_dir: bool,
}

/// Handle to the filesystem that launch resources are staged from.
///
/// Node-local container managers download staged resources from this
/// filesystem, so every path handed out must be reachable cluster-wide.
#[async_trait]
pub trait ClusterFilesystem: Send + Sync {
    /// Locator a node uses to fetch `path`.
    fn locator(&self, path: &Path) -> ResourceLocator;

    /// Status of a single file or directory.
    async fn status(&self, path: &Path) -> io::Result<FileStatus>;

    /// Entries directly under `dir`.
    async fn list(&self, dir: &Path) -> io::Result<Vec<FileStatus>>;

    /// Create or replace a file and return its new status.
    async fn write(
        &self,
        path: &Path,
        contents: &[u8],
    ) -> io::Result<FileStatus>;
}

/// [`ClusterFilesystem`] backed by a local (or locally mounted) directory tree.
#[derive(Clone, Debug, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }

    fn to_status(path: &Path, metadata: &std::fs::Metadata) -> FileStatus {
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        FileStatus {
            path: path.to_path_buf(),
            len: metadata.len(),
            modified,
            is_dir: metadata.is_dir(),
        }
    }
}

#[async_trait]
impl ClusterFilesystem for LocalFilesystem {
    fn locator(&self, path: &Path) -> ResourceLocator {
        ResourceLocator::file(path)
    }

    async fn status(&self, path: &Path) -> io::Result<FileStatus> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(Self::to_status(path, &metadata))
    }

    async fn list(&self, dir: &Path) -> io::Result<Vec<FileStatus>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut statuses = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            statuses.push(Self::to_status(&entry.path(), &metadata));
        }
        Ok(statuses)
    }

    async fn write(
        &self,
        path: &Path,
        contents: &[u8],
    ) -> io::Result<FileStatus> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        self.status(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_filesystem_write_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new();

        let written = fs
            .write(&dir.path().join("conf/site.xml"), b"<configuration/>")
            .await
            .unwrap();
        assert_eq!(written.len, 16);
        assert!(!written.is_dir);

        let listed = fs.list(&dir.path().join("conf")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, dir.path().join("conf/site.xml"));
    }

    #[tokio::test]
    async fn test_local_filesystem_status_of_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalFilesystem::new()
            .status(&dir.path().join("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_local_locator_uses_file_scheme() {
        let locator = LocalFilesystem::new().locator(Path::new("/srv/image.tar"));
        assert_eq!(locator.to_string(), "file:///srv/image.tar");
    }
}
