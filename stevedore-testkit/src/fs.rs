use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use stevedore::*;

pub const MEM_SCHEME: &str = "memfs";
pub const MEM_AUTHORITY: &str = "cluster";

#[derive(Clone, Debug)]
struct MemFile {
    contents: Vec<u8>,
    modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemState {
    files: BTreeMap<PathBuf, MemFile>,
    dirs: BTreeSet<PathBuf>,
    failing: HashSet<PathBuf>,
    writes: usize,
}

impl MemState {
    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
            || self.files.keys().any(|file| file.starts_with(path) && file != path)
    }

    fn check(&self, path: &Path) -> io::Result<()> {
        if self.failing.contains(path) {
            return Err(io::Error::other(format!(
                "injected failure for {}",
                path.display()
            )));
        }
        Ok(())
    }
}

/// Shared in-memory [`ClusterFilesystem`].
///
/// Clones share the same tree. Directories exist when created explicitly or
/// when a file lives under them.
#[derive(Clone, Debug, Default)]
pub struct InMemoryFilesystem {
    state: Arc<Mutex<MemState>>,
}

impl InMemoryFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        self.state.lock().files.insert(
            path.as_ref().to_path_buf(),
            MemFile {
                contents: contents.into(),
                modified: Utc::now(),
            },
        );
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        self.state.lock().dirs.insert(path.as_ref().to_path_buf());
    }

    /// Make every operation on `path` fail with an I/O error.
    pub fn fail_on(&self, path: impl AsRef<Path>) {
        self.state.lock().failing.insert(path.as_ref().to_path_buf());
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.state
            .lock()
            .files
            .get(path.as_ref())
            .map(|file| file.contents.clone())
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }
}

#[async_trait]
impl ClusterFilesystem for InMemoryFilesystem {
    fn locator(&self, path: &Path) -> ResourceLocator {
        ResourceLocator::new(
            MEM_SCHEME,
            Some(MEM_AUTHORITY.to_string()),
            None,
            path.to_string_lossy(),
        )
    }

    async fn status(&self, path: &Path) -> io::Result<FileStatus> {
        let state = self.state.lock();
        state.check(path)?;
        if let Some(file) = state.files.get(path) {
            return Ok(FileStatus {
                path: path.to_path_buf(),
                len: file.contents.len() as u64,
                modified: file.modified,
                is_dir: false,
            });
        }
        if state.is_dir(path) {
            return Ok(FileStatus {
                path: path.to_path_buf(),
                len: 0,
                modified: Utc::now(),
                is_dir: true,
            });
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        ))
    }

    async fn list(&self, dir: &Path) -> io::Result<Vec<FileStatus>> {
        let state = self.state.lock();
        state.check(dir)?;
        if !state.is_dir(dir) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", dir.display()),
            ));
        }

        let mut entries: BTreeMap<PathBuf, FileStatus> = BTreeMap::new();
        for (path, file) in &state.files {
            let Ok(rest) = path.strip_prefix(dir) else {
                continue;
            };
            let mut parts = rest.components();
            let Some(first) = parts.next() else {
                continue;
            };
            let child = dir.join(first);
            let status = if parts.next().is_none() {
                FileStatus {
                    path: child.clone(),
                    len: file.contents.len() as u64,
                    modified: file.modified,
                    is_dir: false,
                }
            } else {
                FileStatus {
                    path: child.clone(),
                    len: 0,
                    modified: file.modified,
                    is_dir: true,
                }
            };
            entries.entry(child).or_insert(status);
        }
        for path in &state.dirs {
            if path.parent() == Some(dir) {
                entries.entry(path.clone()).or_insert(FileStatus {
                    path: path.clone(),
                    len: 0,
                    modified: Utc::now(),
                    is_dir: true,
                });
            }
        }
        Ok(entries.into_values().collect())
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<FileStatus> {
        let mut state = self.state.lock();
        state.check(path)?;
        if let Some(parent) = path.parent() {
            state.check(parent)?;
        }
        let modified = Utc::now();
        state.files.insert(
            path.to_path_buf(),
            MemFile {
                contents: contents.to_vec(),
                modified,
            },
        );
        state.writes += 1;
        Ok(FileStatus {
            path: path.to_path_buf(),
            len: contents.len() as u64,
            modified,
            is_dir: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_returns_direct_children_only() {
        let fs = InMemoryFilesystem::new();
        fs.add_file("/conf/b.xml", "b");
        fs.add_file("/conf/a.xml", "a");
        fs.add_file("/conf/nested/c.xml", "c");

        let listed = fs.list(Path::new("/conf")).await.unwrap();
        let names: Vec<(String, bool)> = listed
            .iter()
            .map(|s| (s.path.display().to_string(), s.is_dir))
            .collect();
        assert_eq!(
            names,
            vec![
                ("/conf/a.xml".to_string(), false),
                ("/conf/b.xml".to_string(), false),
                ("/conf/nested".to_string(), true),
            ]
        );
    }

    #[tokio::test]
    async fn test_injected_failure_and_missing_paths() {
        let fs = InMemoryFilesystem::new();
        fs.add_file("/img/app.tar.gz", "img");
        fs.fail_on("/img/app.tar.gz");

        assert!(fs.status(Path::new("/img/app.tar.gz")).await.is_err());
        let missing = fs.list(Path::new("/absent")).await.unwrap_err();
        assert_eq!(missing.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_locator_is_cluster_wide() {
        let locator = InMemoryFilesystem::new().locator(Path::new("/conf/a.xml"));
        assert_eq!(locator.to_string(), "memfs://cluster/conf/a.xml");
    }
}
