//! Memory-backed implementations: the [`RamOutput`] scratch buffer, the
//! [`BytesInput`] reader over an immutable byte buffer, and [`RamDirectory`].

use std::sync::{Arc, RwLock};

use ahash::AHashMap;

use crate::{
    DataInput, DataOutput, Directory, IndexInput, IndexOutput, utils::unexpected_eof, verify,
};

/// A growable in-memory output, used to stage per-document and per-level data before
/// it is copied into a real file with [`write_to`](RamOutput::write_to).
#[derive(Debug, Default, Clone)]
pub struct RamOutput {
    buf: Vec<u8>,
}

impl RamOutput {
    pub fn new() -> RamOutput {
        RamOutput::default()
    }

    pub fn file_pointer(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Copies the buffered bytes to `out`. The buffer keeps its content.
    pub fn write_to<W: DataOutput + ?Sized>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_bytes(&self.buf)
    }

    /// Discards the content, keeping the allocated capacity.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Returns the heap capacity held by this buffer.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }
}

impl DataOutput for RamOutput {
    fn write_byte(&mut self, b: u8) -> std::io::Result<()> {
        self.buf.push(b);
        Ok(())
    }

    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.buf.extend_from_slice(buf);
        Ok(())
    }
}

/// An [`IndexInput`] over an immutable, shared byte buffer.
#[derive(Clone)]
pub struct BytesInput {
    name: Arc<str>,
    data: Arc<[u8]>,
    pos: usize,
}

impl BytesInput {
    pub fn new(name: impl Into<Arc<str>>, data: impl Into<Arc<[u8]>>) -> BytesInput {
        BytesInput {
            name: name.into(),
            data: data.into(),
            pos: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl DataInput for BytesInput {
    fn read_byte(&mut self) -> std::io::Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| unexpected_eof(&self.name))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            return Err(unexpected_eof(&self.name));
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }
}

impl IndexInput for BytesInput {
    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn file_pointer(&self) -> u64 {
        self.pos as u64
    }

    fn seek(&mut self, pos: u64) -> std::io::Result<()> {
        verify!(pos <= self.data.len() as u64);
        self.pos = pos as usize;
        Ok(())
    }

    fn clone_input(&self) -> Box<dyn IndexInput> {
        Box::new(self.clone())
    }
}

type RamFile = Arc<RwLock<Arc<[u8]>>>;

/// A [`Directory`] keeping every file in memory.
///
/// A file becomes visible (empty) as soon as it is created; its content is published
/// when the output is sealed.
#[derive(Default)]
pub struct RamDirectory {
    files: RwLock<AHashMap<String, RamFile>>,
}

impl RamDirectory {
    pub fn new() -> RamDirectory {
        RamDirectory::default()
    }

    fn file(&self, name: &str) -> std::io::Result<RamFile> {
        let files = self.files.read().map_err(|_| poisoned())?;
        files.get(name).cloned().ok_or_else(|| not_found(name))
    }
}

impl Directory for RamDirectory {
    fn create_output(&self, name: &str) -> std::io::Result<Box<dyn IndexOutput>> {
        let file: RamFile = Arc::new(RwLock::new(Arc::from(Vec::new())));
        self.files
            .write()
            .map_err(|_| poisoned())?
            .insert(name.to_string(), file.clone());
        Ok(Box::new(RamFileOutput {
            file,
            buf: Vec::new(),
        }))
    }

    fn open_input(&self, name: &str) -> std::io::Result<Box<dyn IndexInput>> {
        let file = self.file(name)?;
        let data = file.read().map_err(|_| poisoned())?.clone();
        Ok(Box::new(BytesInput::new(name, data)))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files
            .read()
            .map(|files| files.contains_key(name))
            .unwrap_or(false)
    }

    fn file_length(&self, name: &str) -> std::io::Result<u64> {
        let file = self.file(name)?;
        let len = file.read().map_err(|_| poisoned())?.len();
        Ok(len as u64)
    }

    fn delete_file(&self, name: &str) -> std::io::Result<()> {
        self.files
            .write()
            .map_err(|_| poisoned())?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    fn list_all(&self) -> std::io::Result<Vec<String>> {
        let files = self.files.read().map_err(|_| poisoned())?;
        Ok(files.keys().cloned().collect())
    }
}

struct RamFileOutput {
    file: RamFile,
    buf: Vec<u8>,
}

impl DataOutput for RamFileOutput {
    fn write_byte(&mut self, b: u8) -> std::io::Result<()> {
        self.buf.push(b);
        Ok(())
    }

    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.buf.extend_from_slice(buf);
        Ok(())
    }
}

impl IndexOutput for RamFileOutput {
    fn file_pointer(&self) -> u64 {
        self.buf.len() as u64
    }

    fn seal(&mut self) -> std::io::Result<()> {
        let mut content = self.file.write().map_err(|_| poisoned())?;
        *content = Arc::from(std::mem::take(&mut self.buf));
        Ok(())
    }
}

fn not_found(name: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotFound, format!("file '{name}' not found"))
}

fn poisoned() -> std::io::Error {
    std::io::Error::other("directory lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ram_output_write_to() {
        let mut staged = RamOutput::new();
        staged.write_vint(300).unwrap();
        staged.write_string("title").unwrap();
        assert_eq!(staged.file_pointer(), 8);

        let mut target = Vec::new();
        target.write_byte(0xaa).unwrap();
        staged.write_to(&mut target).unwrap();
        assert_eq!(target.len(), 9);
        assert_eq!(&target[1..], staged.as_bytes());

        staged.reset();
        assert!(staged.is_empty());
    }

    #[test]
    fn test_ram_directory_seal_publishes() {
        let dir = RamDirectory::new();
        let mut out = dir.create_output("_0.frq").unwrap();
        out.write_vint(5).unwrap();
        out.write_long(42).unwrap();
        assert!(dir.file_exists("_0.frq"));
        assert_eq!(dir.file_length("_0.frq").unwrap(), 0);
        out.seal().unwrap();
        assert_eq!(dir.file_length("_0.frq").unwrap(), 9);

        let mut input = dir.open_input("_0.frq").unwrap();
        assert_eq!(input.read_vint().unwrap(), 5);
        assert_eq!(input.read_long().unwrap(), 42);
        assert!(input.read_byte().is_err());

        input.seek(1).unwrap();
        let mut copy = input.clone_input();
        assert_eq!(copy.read_long().unwrap(), 42);
        assert!(input.seek(10).is_err());
    }

    #[test]
    fn test_ram_directory_delete_and_list() {
        let dir = RamDirectory::new();
        for name in ["_0.fnm", "_0.tis"] {
            let mut out = dir.create_output(name).unwrap();
            out.seal().unwrap();
        }
        let mut names = dir.list_all().unwrap();
        names.sort();
        assert_eq!(names, ["_0.fnm", "_0.tis"]);

        dir.delete_file("_0.fnm").unwrap();
        assert!(!dir.file_exists("_0.fnm"));
        assert!(dir.delete_file("_0.fnm").is_err());
        assert!(dir.open_input("_0.fnm").is_err());
    }
}
