//! Error types for cardbox.
//!
//! Resolution misses are not errors: [`AssetStore::resolve`](crate::AssetStore::resolve)
//! returns `None` when a file is absent. Batch operations collect per-item
//! failures into their report types instead of returning early.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for cardbox operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while storing, migrating or recovering modules.
#[derive(Debug, Error)]
pub enum Error {
    /// An asset could not be copied into the store.
    #[error("failed to copy asset '{}': {reason}", source_path.display())]
    AssetCopy {
        /// The file that was being copied.
        source_path: PathBuf,
        /// Why the copy failed.
        reason: String,
    },

    /// An asset reference does not resolve to a file.
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    /// A module with this name already exists.
    #[error("a module named '{0}' already exists")]
    DuplicateName(String),

    /// An imported module collides with an existing one and no
    /// replace-or-rename decision was supplied.
    #[error("module '{0}' already exists; choose to replace it or import under a new name")]
    NameConflict(String),

    /// A module file is corrupt or incompatible.
    #[error("failed to read module file '{}': {source}", path.display())]
    Deserialization {
        /// The module file.
        path: PathBuf,
        /// The underlying parse error.
        source: serde_json::Error,
    },

    /// A module file could not be removed from disk.
    #[error("failed to delete '{}': {source}", path.display())]
    Deletion {
        /// The file that should have been removed.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// No module with this name is loaded.
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    /// No card with this id exists in any module.
    #[error("card not found: {0}")]
    CardNotFound(String),

    /// The module owning a card could not be determined.
    #[error("could not determine the module owning card {0}")]
    UnknownOwner(String),

    /// A module or topic name was empty or otherwise unusable.
    #[error("invalid name: '{0}'")]
    InvalidName(String),

    /// A card index is past the end of a module.
    #[error("card index {index} out of range for module '{module}'")]
    CardIndexOutOfRange {
        /// Module name.
        module: String,
        /// The offending index.
        index: usize,
    },

    /// A module could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the caller must make a naming decision
    /// before retrying.
    pub fn needs_decision(&self) -> bool {
        matches!(self, Error::NameConflict(_) | Error::UnknownOwner(_))
    }
}
