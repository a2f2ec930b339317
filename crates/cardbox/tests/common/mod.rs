//! Common test utilities for cardbox integration tests.

use std::path::{Path, PathBuf};

use cardbox::{Repository, StoreConfig};
use tempfile::TempDir;

/// A scratch data directory that lives as long as the test.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    /// Create an empty data directory with its asset root.
    pub fn new() -> Self {
        let fixture = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        fixture.config().ensure_layout().unwrap();
        fixture
    }

    pub fn config(&self) -> StoreConfig {
        StoreConfig::new(self.dir.path().join("flashcards"))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config().data_dir
    }

    pub fn images_root(&self) -> PathBuf {
        self.config().images_root()
    }

    /// Open a repository over the data directory, loading what is there.
    pub fn open(&self) -> Repository {
        Repository::open(self.config()).unwrap()
    }

    /// Write a raw module file, bypassing the repository.
    pub fn write_module_json(&self, file_name: &str, json: &str) -> PathBuf {
        let path = self.data_dir().join(file_name);
        std::fs::write(&path, json).unwrap();
        path
    }

    /// Write a file outside the data directory, e.g. a user's picture.
    pub fn write_outside(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join("outside").join(relative);
        write_file(&path, bytes);
        path
    }

    /// Write a file under the asset root.
    #[allow(dead_code)]
    pub fn write_asset(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = self.images_root().join(relative);
        write_file(&path, bytes);
        path
    }

    /// Read a module file back as JSON.
    #[allow(dead_code)]
    pub fn read_module_json(&self, file_name: &str) -> serde_json::Value {
        let content = std::fs::read_to_string(self.data_dir().join(file_name)).unwrap();
        serde_json::from_str(&content).unwrap()
    }
}

fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
}

/// A minimal PNG signature followed by filler.
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfiller";

/// Module JSON in the earliest format: no version, raw image paths.
#[allow(dead_code)]
pub fn legacy_module_json(name: &str, image_file: &Path) -> String {
    serde_json::json!({
        "name": name,
        "cards": [
            {
                "question": "What organelle is this?",
                "answer_type": "IMAGE",
                "image_answer_file": image_file,
                "topic": "Cells"
            },
            {
                "question": "Powerhouse of the cell?",
                "answer_type": "TEXT",
                "text_answer": "Mitochondria"
            }
        ]
    })
    .to_string()
}
