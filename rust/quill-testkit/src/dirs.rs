//! Index directories for tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use quill_io::{Directory, FsDirectory, IndexInput, IndexOutput, RamDirectory};

/// Creates a temporary directory and an [`FsDirectory`] over it. The directory is
/// removed when the returned guard is dropped.
pub fn temp_fs_directory() -> anyhow::Result<(tempfile::TempDir, FsDirectory)> {
    let temp = tempfile::TempDir::new()?;
    let directory = FsDirectory::open(temp.path())?;
    Ok((temp, directory))
}

/// A [`RamDirectory`] that fails to create files with chosen extensions once
/// armed.
#[derive(Default)]
pub struct FailingDirectory {
    inner: RamDirectory,
    extensions: Mutex<Vec<String>>,
    armed: AtomicBool,
    failures: AtomicUsize,
}

impl FailingDirectory {
    pub fn new() -> Arc<FailingDirectory> {
        Arc::new(FailingDirectory::default())
    }

    /// Makes `create_output` fail for names ending in `.{ext}` while armed.
    pub fn fail_on(&self, ext: &str) {
        self.extensions.lock().unwrap().push(ext.to_string());
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Number of injected failures so far.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    fn should_fail(&self, name: &str) -> bool {
        if !self.armed.load(Ordering::SeqCst) {
            return false;
        }
        let extensions = self.extensions.lock().unwrap();
        name.rsplit_once('.')
            .is_some_and(|(_, ext)| extensions.iter().any(|e| e == ext))
    }
}

impl Directory for FailingDirectory {
    fn create_output(&self, name: &str) -> std::io::Result<Box<dyn IndexOutput>> {
        if self.should_fail(name) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(std::io::Error::other(format!("injected failure creating {name}")));
        }
        self.inner.create_output(name)
    }

    fn open_input(&self, name: &str) -> std::io::Result<Box<dyn IndexInput>> {
        self.inner.open_input(name)
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(name)
    }

    fn file_length(&self, name: &str) -> std::io::Result<u64> {
        self.inner.file_length(name)
    }

    fn delete_file(&self, name: &str) -> std::io::Result<()> {
        self.inner.delete_file(name)
    }

    fn list_all(&self) -> std::io::Result<Vec<String>> {
        self.inner.list_all()
    }
}
