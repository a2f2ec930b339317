//! File-backed flashcard modules with image answers.
//!
//! A data directory holds one JSON file per module and an asset root with
//! one image directory per module. Data written by older releases, where
//! images shared a single directory or were referenced by raw paths, is
//! upgraded in place the first time it is loaded.
//!
//! # Layout
//!
//! ```text
//! flashcards/
//! ├── README.txt
//! ├── Spanish.json
//! └── images/
//!     └── Spanish/
//!         └── 1718000000000_gato.png
//! ```
//!
//! # Module File Format
//!
//! ```json
//! {
//!   "format_version": 3,
//!   "name": "Spanish",
//!   "cards": [
//!     {
//!       "id": "6c1b0c9e-3d2f-4a8e-9a57-0f6f0a1c2b3d",
//!       "question": "el gato",
//!       "answer_type": "image",
//!       "image_path": "Spanish/1718000000000_gato.png",
//!       "topic": "Animals",
//!       "module_name": "Spanish"
//!     }
//!   ]
//! }
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use cardbox::{Card, Repository, StoreConfig};
//!
//! # fn main() -> cardbox::Result<()> {
//! let mut repo = Repository::open(StoreConfig::new("flashcards"))?;
//!
//! let module = repo.create_module("Spanish")?;
//! module.add_card(Card::with_text("hola", "hello", "Greetings", "Spanish"));
//! repo.save_module("Spanish")?;
//!
//! for module in repo.modules() {
//!     println!("{}: {} cards", module.name(), module.len());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod asset;
pub mod card;
pub mod config;
pub mod error;
pub mod image;
pub mod module;
pub mod recovery;
pub mod repository;

pub use asset::{AssetStore, sanitize};
pub use card::{
    Answer, AnswerKind, Card, CardId, CardMigration, DEFAULT_MODULE, DEFAULT_TOPIC, ImageRef,
    MISSING_IMAGE, MigrationOutcome, MigrationState, normalize_topic,
};
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use image::{DecodedImage, ImageFormat};
pub use module::{ALL_TOPICS, MigrationSummary, Module};
pub use recovery::{
    AssetAudit, ConflictResolution, FixedImage, ImportedModule, MissingImage, MissingImageScan,
    Recovery,
};
pub use repository::{LoadReport, MODULE_FORMAT_VERSION, Repository, SaveReport};
