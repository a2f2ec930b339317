//! Cards and the upgrade path for their image references.
//!
//! Image cards written by older releases point at their asset in one of
//! three ways, and each is read into a distinct [`ImageRef`] variant:
//!
//! | Form | Stored as | Variant |
//! |------|-----------|---------|
//! | raw file path | `image_answer_file` only | [`ImageRef::Legacy`] |
//! | shared directory | `image_path = "photo.png"` | [`ImageRef::Flat`] |
//! | per-module directory | `image_path = "Bio/1718000000000_photo.png"` | [`ImageRef::ModuleRelative`] |
//!
//! [`Card::migrate`] classifies the reference into a [`MigrationState`] and
//! upgrades it to the per-module form, relocating the file through the
//! [`AssetStore`] when needed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::asset::{AssetStore, sanitize};
use crate::error::Result;
use crate::image::DecodedImage;

/// Topic given to cards that have none.
pub const DEFAULT_TOPIC: &str = "General";

/// Module name assumed for cards that do not record one.
pub const DEFAULT_MODULE: &str = "General";

/// Stored in place of a path once an image is known to be gone.
pub const MISSING_IMAGE: &str = "missing_image";

/// Normalize a topic: blank topics become [`DEFAULT_TOPIC`]. Any other
/// topic is kept exactly as written.
pub fn normalize_topic(topic: &str) -> String {
    if topic.trim().is_empty() {
        DEFAULT_TOPIC.to_string()
    } else {
        topic.to_string()
    }
}

/// Opaque, stable card identifier.
///
/// Positions shift when cards are removed; ids do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(Uuid);

impl CardId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CardId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CardId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Which kind of answer a card has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerKind {
    /// A text answer.
    #[default]
    #[serde(alias = "TEXT")]
    Text,
    /// An image answer.
    #[serde(alias = "IMAGE")]
    Image,
}

/// Where an image answer's file lives, in the form it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// `<module>/<file>` under the asset root. The current form.
    ModuleRelative {
        /// Relative path with `/` separators.
        path: String,
        /// Raw path left over from an older release, if any.
        legacy_file: Option<PathBuf>,
    },
    /// A bare file name from when every image shared one directory.
    Flat {
        /// File name directly under the asset root.
        file_name: String,
        /// Raw path left over from an older release, if any.
        legacy_file: Option<PathBuf>,
    },
    /// Only a raw file path, as the earliest releases stored it.
    Legacy(PathBuf),
    /// The image is known to be gone. Persisted as [`MISSING_IMAGE`].
    Missing,
}

impl ImageRef {
    /// Build a reference from the raw stored fields.
    pub fn from_parts(image_path: Option<&str>, legacy_file: Option<PathBuf>) -> Self {
        let legacy_file = legacy_file.filter(|p| !p.as_os_str().is_empty());
        match image_path.map(str::trim).filter(|p| !p.is_empty()) {
            Some(MISSING_IMAGE) => ImageRef::Missing,
            Some(path) if path.contains('/') || path.contains('\\') => ImageRef::ModuleRelative {
                path: path.replace('\\', "/"),
                legacy_file,
            },
            Some(name) => ImageRef::Flat {
                file_name: name.to_string(),
                legacy_file,
            },
            None => match legacy_file {
                Some(file) => ImageRef::Legacy(file),
                None => ImageRef::Missing,
            },
        }
    }

    /// A reference in current form.
    pub fn module_relative(path: impl Into<String>) -> Self {
        ImageRef::ModuleRelative {
            path: path.into(),
            legacy_file: None,
        }
    }

    /// The value written to `image_path`.
    pub fn stored_path(&self) -> Option<&str> {
        match self {
            ImageRef::ModuleRelative { path, .. } => Some(path),
            ImageRef::Flat { file_name, .. } => Some(file_name),
            ImageRef::Legacy(_) => None,
            ImageRef::Missing => Some(MISSING_IMAGE),
        }
    }

    /// The raw path kept from an older release.
    pub fn legacy_file(&self) -> Option<&Path> {
        match self {
            ImageRef::ModuleRelative { legacy_file, .. } | ImageRef::Flat { legacy_file, .. } => {
                legacy_file.as_deref()
            }
            ImageRef::Legacy(file) => Some(file),
            ImageRef::Missing => None,
        }
    }

    /// Whether this is the current per-module form.
    pub fn is_current_form(&self) -> bool {
        matches!(self, ImageRef::ModuleRelative { .. })
    }

    /// Find the file this reference points at, if it exists.
    ///
    /// The stored relative path wins; a leftover raw path is the fallback.
    pub fn locate(&self, store: &AssetStore) -> Option<PathBuf> {
        let existing_legacy = || self.legacy_file().filter(|p| p.is_file()).map(Path::to_path_buf);
        match self {
            ImageRef::ModuleRelative { path, .. } => store.resolve(path).or_else(existing_legacy),
            ImageRef::Flat { file_name, .. } => store.resolve(file_name).or_else(existing_legacy),
            ImageRef::Legacy(_) => existing_legacy(),
            ImageRef::Missing => None,
        }
    }

    /// Determine which upgrade this reference needs.
    pub fn classify(&self, store: &AssetStore) -> MigrationState {
        let existing_legacy = || self.legacy_file().filter(|p| p.is_file()).map(Path::to_path_buf);
        match self {
            ImageRef::ModuleRelative { path, .. } => {
                if store.resolve(path).is_some() {
                    MigrationState::Current
                } else if let Some(source) = existing_legacy() {
                    MigrationState::FlatLegacy { source }
                } else {
                    MigrationState::Missing
                }
            }
            ImageRef::Flat { file_name, .. } => match store.resolve(file_name).or_else(existing_legacy) {
                Some(source) => MigrationState::FlatLegacy { source },
                None => MigrationState::Missing,
            },
            ImageRef::Legacy(file) => {
                if file.is_file() {
                    MigrationState::FlatLegacy {
                        source: file.clone(),
                    }
                } else {
                    MigrationState::BrokenReference
                }
            }
            ImageRef::Missing => MigrationState::Missing,
        }
    }
}

/// Where an image reference stands relative to the current format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    /// Per-module path that resolves. Nothing to do.
    Current,
    /// The file exists somewhere the current layout does not expect it.
    FlatLegacy {
        /// The file to relocate into the module directory.
        source: PathBuf,
    },
    /// A raw path whose file is gone and nothing else to go on.
    BrokenReference,
    /// Nothing resolves.
    Missing,
}

/// A card's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Text answer.
    Text(String),
    /// Image answer.
    Image(ImageRef),
}

impl Answer {
    /// The answer's kind tag.
    pub fn kind(&self) -> AnswerKind {
        match self {
            Answer::Text(_) => AnswerKind::Text,
            Answer::Image(_) => AnswerKind::Image,
        }
    }
}

/// What [`Card::migrate`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Text card; no image to migrate.
    NotImage,
    /// Already current.
    Current,
    /// The asset was copied into the module directory.
    Relocated {
        /// Where the file was found.
        from: PathBuf,
        /// New module-relative path.
        to: String,
    },
    /// The reference was replaced with [`MISSING_IMAGE`].
    MarkedMissing,
    /// Nothing resolves; left as it was.
    Unresolved,
}

/// Result of migrating a single card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardMigration {
    /// What happened to the image reference.
    pub outcome: MigrationOutcome,
    /// Whether the card's module name was defaulted.
    pub defaulted_module: bool,
}

impl CardMigration {
    /// Whether the card now differs from what was loaded.
    pub fn changed(&self) -> bool {
        self.defaulted_module
            || matches!(
                self.outcome,
                MigrationOutcome::Relocated { .. } | MigrationOutcome::MarkedMissing
            )
    }
}

/// A question with a text or image answer.
///
/// # Example
///
/// ```
/// use cardbox::{Answer, Card};
///
/// let card = Card::with_text("hola", "hello", "", "Spanish");
/// assert_eq!(card.topic(), "General");
/// assert_eq!(card.answer(), &Answer::Text("hello".into()));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CardRecord", into = "CardRecord")]
pub struct Card {
    id: CardId,
    question: String,
    answer: Answer,
    topic: String,
    module_name: String,
    image: Option<DecodedImage>,
}

impl Card {
    /// Create a text card.
    pub fn with_text(
        question: impl Into<String>,
        answer: impl Into<String>,
        topic: &str,
        module_name: impl Into<String>,
    ) -> Self {
        Self::new(question.into(), Answer::Text(answer.into()), topic, module_name.into())
    }

    /// Create an image card from an existing reference.
    pub fn with_image_ref(
        question: impl Into<String>,
        image: ImageRef,
        topic: &str,
        module_name: impl Into<String>,
    ) -> Self {
        Self::new(question.into(), Answer::Image(image), topic, module_name.into())
    }

    /// Create an image card, copying `source` into the module's asset
    /// directory.
    pub fn with_image_file(
        store: &AssetStore,
        question: impl Into<String>,
        source: &Path,
        topic: &str,
        module_name: impl Into<String>,
    ) -> Result<Self> {
        let mut card = Self::new(
            question.into(),
            Answer::Image(ImageRef::Missing),
            topic,
            module_name.into(),
        );
        card.set_image(store, source)?;
        Ok(card)
    }

    fn new(question: String, answer: Answer, topic: &str, module_name: String) -> Self {
        Self {
            id: CardId::new(),
            question,
            answer,
            topic: normalize_topic(topic),
            module_name,
            image: None,
        }
    }

    /// Stable id.
    pub fn id(&self) -> CardId {
        self.id
    }

    /// Question text.
    pub fn question(&self) -> &str {
        &self.question
    }

    /// The answer.
    pub fn answer(&self) -> &Answer {
        &self.answer
    }

    /// Text or image.
    pub fn answer_kind(&self) -> AnswerKind {
        self.answer.kind()
    }

    /// The image reference, for image cards.
    pub fn image_ref(&self) -> Option<&ImageRef> {
        match &self.answer {
            Answer::Image(image) => Some(image),
            Answer::Text(_) => None,
        }
    }

    /// Topic; never empty.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Name of the owning module. Empty if never recorded.
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// The image loaded by the last successful [`load_image`](Self::load_image).
    pub fn image(&self) -> Option<&DecodedImage> {
        self.image.as_ref()
    }

    /// Replace the question.
    pub fn set_question(&mut self, question: impl Into<String>) {
        self.question = question.into();
    }

    /// Replace the topic. Blank topics become [`DEFAULT_TOPIC`].
    pub fn set_topic(&mut self, topic: &str) {
        self.topic = normalize_topic(topic);
    }

    /// Switch to a text answer, dropping any image state.
    pub fn set_text_answer(&mut self, text: impl Into<String>) {
        self.answer = Answer::Text(text.into());
        self.image = None;
    }

    pub(crate) fn reassign_id(&mut self) {
        self.id = CardId::new();
    }

    pub(crate) fn set_module_name(&mut self, module_name: &str) {
        self.module_name = module_name.to_string();
    }

    /// Copy `source` into this card's module directory and make it the
    /// answer.
    ///
    /// On failure the card is left exactly as it was.
    pub fn set_image(&mut self, store: &AssetStore, source: &Path) -> Result<()> {
        let module = self.effective_module().to_string();
        let stored = store.store(source, &module)?;

        if self.module_name.is_empty() {
            self.module_name = module;
        }
        self.answer = Answer::Image(ImageRef::module_relative(store.relative_path_of(&stored)));
        self.image = DecodedImage::open(&stored);
        Ok(())
    }

    /// Resolve and read the image answer.
    ///
    /// Returns `None`, and clears any previously loaded image, if this is a
    /// text card or the file cannot be found or read.
    ///
    /// A card whose relocation failed during [`migrate`](Self::migrate)
    /// keeps its old reference, so its image still loads from the old
    /// location until a later migration moves it.
    pub fn load_image(&mut self, store: &AssetStore) -> Option<&DecodedImage> {
        self.image = self
            .image_ref()
            .and_then(|image| image.locate(store))
            .and_then(|path| DecodedImage::open(&path));
        self.image.as_ref()
    }

    /// Classify the image reference without changing anything.
    pub fn migration_state(&self, store: &AssetStore) -> Option<MigrationState> {
        self.image_ref().map(|image| image.classify(store))
    }

    /// Upgrade the image reference to the per-module form.
    ///
    /// Idempotent: migrating a current card does nothing.
    pub fn migrate(&mut self, store: &AssetStore) -> CardMigration {
        let defaulted_module = if self.module_name.trim().is_empty() {
            self.module_name = DEFAULT_MODULE.to_string();
            true
        } else {
            false
        };

        let state = match &self.answer {
            Answer::Text(_) => {
                return CardMigration {
                    outcome: MigrationOutcome::NotImage,
                    defaulted_module,
                };
            }
            Answer::Image(image) => image.classify(store),
        };

        let outcome = match state {
            MigrationState::Current => MigrationOutcome::Current,
            MigrationState::FlatLegacy { source } => {
                match store.relocate(&source, &self.module_name) {
                    Ok(stored) => {
                        let to = store.relative_path_of(&stored);
                        debug!(card = %self.id, from = %source.display(), to = %to, "Relocated image");
                        self.answer = Answer::Image(ImageRef::module_relative(to.clone()));
                        self.image = None;
                        MigrationOutcome::Relocated { from: source, to }
                    }
                    Err(e) => {
                        warn!(card = %self.id, error = %e, "Could not relocate image");
                        MigrationOutcome::Unresolved
                    }
                }
            }
            MigrationState::BrokenReference => {
                debug!(card = %self.id, "Image reference is broken, marking missing");
                self.answer = Answer::Image(ImageRef::Missing);
                self.image = None;
                MigrationOutcome::MarkedMissing
            }
            MigrationState::Missing => MigrationOutcome::Unresolved,
        };

        CardMigration {
            outcome,
            defaulted_module,
        }
    }

    /// Move this card to `module_name`, copying a resolvable asset that sits
    /// in another module's directory, then migrate.
    ///
    /// The other module's copy is left alone since it may still use it.
    pub fn rehome(&mut self, store: &AssetStore, module_name: &str) -> CardMigration {
        self.module_name = module_name.to_string();

        let foreign = match &self.answer {
            Answer::Image(ImageRef::ModuleRelative { path, .. }) => {
                let owner = path.split('/').next().unwrap_or_default();
                if owner != sanitize(module_name) {
                    store.resolve(path)
                } else {
                    None
                }
            }
            _ => None,
        };

        if let Some(source) = foreign {
            match store.relocate(&source, module_name) {
                Ok(stored) => {
                    let to = store.relative_path_of(&stored);
                    self.answer = Answer::Image(ImageRef::module_relative(to.clone()));
                    self.image = None;
                    let mut result = self.migrate(store);
                    result.outcome = MigrationOutcome::Relocated { from: source, to };
                    return result;
                }
                Err(e) => warn!(card = %self.id, error = %e, "Could not copy image into new module"),
            }
        }

        self.migrate(store)
    }

    fn effective_module(&self) -> &str {
        if self.module_name.trim().is_empty() {
            DEFAULT_MODULE
        } else {
            &self.module_name
        }
    }
}

/// On-disk shape of a card. Every field is optional so records written by
/// any release deserialize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct CardRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<CardId>,
    question: String,
    answer_type: AnswerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_answer_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module_name: Option<String>,
}

impl From<CardRecord> for Card {
    fn from(record: CardRecord) -> Self {
        let answer = match record.answer_type {
            AnswerKind::Text => Answer::Text(record.text_answer.unwrap_or_default()),
            AnswerKind::Image => Answer::Image(ImageRef::from_parts(
                record.image_path.as_deref(),
                record.image_answer_file,
            )),
        };

        Self {
            id: record.id.unwrap_or_default(),
            question: record.question,
            answer,
            topic: normalize_topic(record.topic.as_deref().unwrap_or_default()),
            module_name: record.module_name.unwrap_or_default(),
            image: None,
        }
    }
}

impl From<Card> for CardRecord {
    fn from(card: Card) -> Self {
        let (text_answer, image_path, image_answer_file) = match &card.answer {
            Answer::Text(text) => (Some(text.clone()), None, None),
            Answer::Image(image) => (
                None,
                image.stored_path().map(str::to_string),
                image.legacy_file().map(Path::to_path_buf),
            ),
        };

        Self {
            id: Some(card.id),
            question: card.question,
            answer_type: card.answer.kind(),
            text_answer,
            image_path,
            image_answer_file,
            topic: Some(card.topic),
            module_name: (!card.module_name.is_empty()).then_some(card.module_name),
        }
    }
}
