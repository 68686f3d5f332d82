use crate::error::{CommonError, CommonResult};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// File system abstraction for document persistence and testing
pub trait FileSystem: Send + Sync {
    /// Check if a file exists
    fn exists(&self, path: &Path) -> bool;

    /// Read the full contents of a file
    fn read(&self, path: &Path) -> CommonResult<Vec<u8>>;

    /// Replace the contents of a file
    fn write(&self, path: &Path, contents: &[u8]) -> CommonResult<()>;
}

/// Real file system implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> CommonResult<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    /// Writes to a sibling temp file first so readers never observe a
    /// half-written document.
    fn write(&self, path: &Path, contents: &[u8]) -> CommonResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, contents)?;
        if let Err(err) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }
}

/// In-memory file system for testing, with write failure injection
#[derive(Debug, Default)]
pub struct MockFileSystem {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    failing_writes: AtomicUsize,
    writes: AtomicUsize,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(path.into(), contents.into());
        }
    }

    /// Make the next `count` writes fail with a permission error
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().ok()?.get(path).cloned()
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.files
            .lock()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }

    fn read(&self, path: &Path) -> CommonResult<Vec<u8>> {
        self.contents(path).ok_or_else(|| {
            CommonError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))
        })
    }

    fn write(&self, path: &Path, contents: &[u8]) -> CommonResult<()> {
        let should_fail = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(CommonError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot write {}", path.display()),
            )));
        }

        let mut files = self
            .files
            .lock()
            .map_err(|_| CommonError::from("mock file system lock poisoned"))?;
        files.insert(path.to_path_buf(), contents.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_write_and_read() {
        let fs = MockFileSystem::new();
        let path = Path::new("/project/card.json");

        assert!(!fs.exists(path));
        fs.write(path, b"{}").unwrap();

        assert!(fs.exists(path));
        assert_eq!(fs.read(path).unwrap(), b"{}");
        assert_eq!(fs.write_count(), 1);
    }

    #[test]
    fn test_mock_failure_injection() {
        let fs = MockFileSystem::new();
        let path = Path::new("/project/card.json");
        fs.fail_next_writes(1);

        let err = fs.write(path, b"first").unwrap_err();
        assert!(matches!(err, CommonError::Io(ref e) if e.kind() == io::ErrorKind::PermissionDenied));
        assert!(!fs.exists(path));

        // only the next write was failing
        fs.write(path, b"second").unwrap();
        assert_eq!(fs.read(path).unwrap(), b"second");
    }

    #[test]
    fn test_real_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let fs = RealFileSystem;

        fs.write(&path, b"one").unwrap();
        fs.write(&path, b"two").unwrap();

        assert!(fs.exists(&path));
        assert_eq!(fs.read(&path).unwrap(), b"two");
    }

    #[test]
    fn test_real_write_cleans_up_after_failed_rename() {
        let dir = tempfile::tempdir().unwrap();
        // a non-empty directory cannot be replaced by a file
        let path = dir.path().join("doc.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let err = RealFileSystem.write(&path, b"one").unwrap_err();
        assert!(matches!(err, CommonError::Io(_)));

        assert!(!dir.path().join("doc.json.tmp").exists());
        assert!(path.join("keep").exists());
    }
}
