//! Command implementations for quill-cmd

pub mod dump;
pub mod index;
