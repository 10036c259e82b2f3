pub mod analyzer;
pub mod config;
pub mod document;
pub mod error;
pub mod format;
pub mod hash;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod persist;
pub mod search;
pub mod snippet;
pub mod vocabulary;
pub mod writer;

pub use error::{IndexError, Result};
pub use index::*;

pub type TermId = u32;
pub type DocId = u32;
/// Non-negative 31-bit term hash, see [`hash::term_hash`].
pub type TermHash = u64;
