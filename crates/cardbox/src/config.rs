//! Storage location configuration.
//!
//! # Example TOML
//!
//! ```toml
//! data_dir = "/home/me/.local/share/flashcards"
//! images_dir = "images"
//! module_extension = "json"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "flashcards";

/// Default name of the asset root below the data directory.
pub const DEFAULT_IMAGES_DIR: &str = "images";

/// Default extension for module files.
pub const DEFAULT_MODULE_EXTENSION: &str = "json";

const README_NAME: &str = "README.txt";

/// Where modules and their image assets live on disk.
///
/// The resulting layout is:
///
/// ```text
/// <data_dir>/
/// ├── <module>.json
/// └── images/
///     └── <module>/<millis>_<stem><ext>
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding module files.
    pub data_dir: PathBuf,
    /// Name of the asset root, below `data_dir`.
    pub images_dir: String,
    /// Extension used for module files, without the leading dot.
    pub module_extension: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            images_dir: DEFAULT_IMAGES_DIR.to_string(),
            module_extension: DEFAULT_MODULE_EXTENSION.to_string(),
        }
    }
}

impl StoreConfig {
    /// Create a config rooted at `data_dir` with default names.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Load a config from a TOML file.
    ///
    /// Missing keys fall back to their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a config from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Set the data directory.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the asset root name.
    pub fn images_dir(mut self, name: impl Into<String>) -> Self {
        self.images_dir = name.into();
        self
    }

    /// Set the module file extension.
    pub fn module_extension(mut self, ext: impl Into<String>) -> Self {
        self.module_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    /// Absolute or relative path of the asset root.
    pub fn images_root(&self) -> PathBuf {
        self.data_dir.join(&self.images_dir)
    }

    /// Create the data and asset directories and drop a README describing
    /// the layout if there is none yet.
    pub fn ensure_layout(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.images_root())?;

        let readme = self.data_dir.join(README_NAME);
        if !readme.exists() {
            // Best effort: a missing README never blocks storage.
            if let Err(e) = std::fs::write(&readme, self.readme_text()) {
                warn!(path = %readme.display(), error = %e, "Failed to write README");
            } else {
                debug!(path = %readme.display(), "Wrote layout README");
            }
        }
        Ok(())
    }

    fn readme_text(&self) -> String {
        format!(
            "Flashcard data directory\n\
             ------------------------\n\
             This directory holds your flashcard modules.\n\
             \n\
             *.{ext} - one file per module\n\
             {images}/ - image assets\n\
             {images}/<module>/ - images belonging to one module\n\
             \n\
             Images used to live directly in {images}/; they are moved into\n\
             their module's directory the next time the module is loaded.\n",
            ext = self.module_extension,
            images = self.images_dir,
        )
    }
}
