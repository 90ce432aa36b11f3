//! Core definitions (error type, result alias, verification helpers), relied upon by
//! all quill-* crates.

pub mod error;
pub mod macros;
pub mod result;

pub use error::{Error, ErrorKind};
pub use result::Result;
