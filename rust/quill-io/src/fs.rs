//! File-system [`Directory`]: one OS file per index file under a root folder.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::{BytesInput, DataOutput, Directory, IndexInput, IndexOutput};

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

pub struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    /// Opens (creating it if needed) the directory at `root`.
    pub fn open(root: impl AsRef<Path>) -> std::io::Result<FsDirectory> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(FsDirectory { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Directory for FsDirectory {
    fn create_output(&self, name: &str) -> std::io::Result<Box<dyn IndexOutput>> {
        let file = File::create(self.path(name))?;
        Ok(Box::new(FsOutput {
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
            pos: 0,
        }))
    }

    /// Reads the whole file into memory.
    fn open_input(&self, name: &str) -> std::io::Result<Box<dyn IndexInput>> {
        let data = std::fs::read(self.path(name))?;
        Ok(Box::new(BytesInput::new(name, data)))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn file_length(&self, name: &str) -> std::io::Result<u64> {
        Ok(std::fs::metadata(self.path(name))?.len())
    }

    fn delete_file(&self, name: &str) -> std::io::Result<()> {
        std::fs::remove_file(self.path(name))
    }

    fn list_all(&self) -> std::io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }
}

struct FsOutput {
    writer: BufWriter<File>,
    pos: u64,
}

impl DataOutput for FsOutput {
    fn write_byte(&mut self, b: u8) -> std::io::Result<()> {
        self.writer.write_all(&[b])?;
        self.pos += 1;
        Ok(())
    }

    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }
}

impl IndexOutput for FsOutput {
    fn file_pointer(&self) -> u64 {
        self.pos
    }

    fn seal(&mut self) -> std::io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }
}
