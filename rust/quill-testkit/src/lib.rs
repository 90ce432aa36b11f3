//! Test utilities for the quill crates.
//!
//! - [`corpus`]: random text documents over a bounded vocabulary.
//! - [`dirs`]: temporary index directories and a directory that fails on demand.

pub mod corpus;
pub mod dirs;
