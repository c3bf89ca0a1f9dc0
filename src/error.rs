//! Error types for the model indexer.
//!
//! Most failures in this crate are soft: a file that does not parse or does not
//! look like a model module comes back as a `ModuleResult` with `ok == false`.
//! The types here cover the cases a caller has to handle explicitly.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn source text into a usable syntax tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The grammar could not be installed into the parser (ABI mismatch).
    #[error("failed to load {dialect} grammar: {message}")]
    Grammar { dialect: &'static str, message: String },

    /// tree-sitter returned no tree at all.
    #[error("parser produced no syntax tree")]
    NoTree,

    /// The tree contains an error or missing node.
    ///
    /// `line` is 1-based and `character` 0-based, same as `SourceLocation`.
    #[error("{message} ({line}:{character})")]
    Syntax {
        message: String,
        line: u32,
        character: u32,
    },
}

/// Failure of an extraction that the caller must see.
///
/// Syntax errors and shape mismatches are deliberately absent: they are
/// reported through `ModuleResult::ok`.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            ExtractError::Read { path, .. } => path,
        }
    }
}
