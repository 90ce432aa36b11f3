//! I/O abstractions used by the index writer and readers:
//! - `DataOutput` / `DataInput`: byte-level encoders and decoders for the fixed-width
//!   big-endian and variable-length (VInt) integers used by all index files.
//! - `IndexOutput`: sequential writer with a `seal()` operation, committing the write
//!   activity.
//! - `IndexInput`: seekable reader over one index file.
//! - `Directory`: a flat namespace of named index files.
//!
//! Provides a couple of simple implementations: memory-based and file-based.

pub mod data;
pub mod fs;
pub mod ram;
pub mod utils;

use std::sync::Arc;

pub use data::{DataInput, DataOutput};
pub use fs::FsDirectory;
pub use ram::{BytesInput, RamDirectory, RamOutput};

/// A sequential writer for one index file.
///
/// Data becomes durable only after [`seal`](IndexOutput::seal) returns successfully.
/// Dropping an output without sealing it leaves the file in an unspecified (but
/// deletable) state.
pub trait IndexOutput: DataOutput + Send {
    /// Returns the number of bytes written so far, i.e. the offset at which the next
    /// byte will be written.
    fn file_pointer(&self) -> u64;

    /// Flushes buffered data and commits the file.
    ///
    /// Once sealed, the output should not accept any further write operations.
    fn seal(&mut self) -> std::io::Result<()>;
}

/// A positioned reader over one index file.
pub trait IndexInput: DataInput + Send {
    /// Returns the total length of the file in bytes.
    fn length(&self) -> u64;

    /// Returns the current read position.
    fn file_pointer(&self) -> u64;

    /// Moves the read position to `pos`. Seeking to `length()` is allowed; seeking
    /// beyond it is an error.
    fn seek(&mut self, pos: u64) -> std::io::Result<()>;

    /// Returns an independent reader over the same file content, positioned at the
    /// same offset.
    fn clone_input(&self) -> Box<dyn IndexInput>;
}

/// A flat collection of named index files.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the index writer creates outputs from
/// several threads, and readers may open inputs concurrently with writes to other
/// files.
pub trait Directory: Send + Sync + 'static {
    /// Creates a new, empty file (truncating any existing file with the same name)
    /// and returns a writer for it.
    fn create_output(&self, name: &str) -> std::io::Result<Box<dyn IndexOutput>>;

    /// Opens an existing file for reading.
    fn open_input(&self, name: &str) -> std::io::Result<Box<dyn IndexInput>>;

    /// Returns `true` if a file with the given name exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Returns the length of the file in bytes.
    fn file_length(&self, name: &str) -> std::io::Result<u64>;

    /// Removes the file. Removing a missing file is an error.
    fn delete_file(&self, name: &str) -> std::io::Result<()>;

    /// Lists the names of all files, in no particular order.
    fn list_all(&self) -> std::io::Result<Vec<String>>;
}

impl<D: Directory + ?Sized> Directory for Arc<D> {
    fn create_output(&self, name: &str) -> std::io::Result<Box<dyn IndexOutput>> {
        self.as_ref().create_output(name)
    }

    fn open_input(&self, name: &str) -> std::io::Result<Box<dyn IndexInput>> {
        self.as_ref().open_input(name)
    }

    fn file_exists(&self, name: &str) -> bool {
        self.as_ref().file_exists(name)
    }

    fn file_length(&self, name: &str) -> std::io::Result<u64> {
        self.as_ref().file_length(name)
    }

    fn delete_file(&self, name: &str) -> std::io::Result<()> {
        self.as_ref().delete_file(name)
    }

    fn list_all(&self) -> std::io::Result<Vec<String>> {
        self.as_ref().list_all()
    }
}
