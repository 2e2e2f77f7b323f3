//! Corpus file resolution and content caching
//!
//! [`ProjectResolver`] maps a project name plus optional filename override to
//! a concrete corpus file through a fixed-priority search over candidate
//! directories and default filenames. [`CorpusCache`] keeps loaded content
//! per resolved path, reloading when the file's modification time changes.

pub mod cache;
pub mod resolver;

pub use cache::{CorpusCache, LoadError};
pub use resolver::{
    DEFAULT_FILENAMES, ProjectResolver, ResolutionMethod, ResolveError, ResolvedFile,
};
