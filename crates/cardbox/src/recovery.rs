//! Repair workflows: reattaching missing images and importing module files.
//!
//! Both run outside the bulk load path and make no automatic retries. Any
//! step that needs a decision (which module owns a card, what to call an
//! imported module) fails with an explicit error instead of guessing.
//!
//! # Example
//!
//! ```no_run
//! use cardbox::{ConflictResolution, Repository, StoreConfig};
//!
//! # fn main() -> cardbox::Result<()> {
//! let mut repo = Repository::open(StoreConfig::default())?;
//!
//! let scan = repo.recovery().scan_missing_images();
//! for missing in &scan.missing {
//!     println!("{}: {}", missing.module, missing.question);
//! }
//!
//! let imported = repo.recovery().import_module_file(
//!     "/backups/Spanish.json",
//!     Some(ConflictResolution::Rename("Spanish (restored)".into())),
//! )?;
//! println!("Imported {} cards", imported.cards);
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::asset::sanitize;
use crate::card::{AnswerKind, CardId};
use crate::error::{Error, Result};
use crate::module::MigrationSummary;
use crate::repository::{Repository, SaveReport};

/// An image card whose asset cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingImage {
    /// Module the card sits in.
    pub module: String,
    /// Position within the module.
    pub index: usize,
    /// The card's id.
    pub card_id: String,
    /// The card's question.
    pub question: String,
    /// The stored reference, if any.
    pub reference: Option<String>,
}

/// Result of [`Recovery::scan_missing_images`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct MissingImageScan {
    /// Modules examined.
    pub modules_scanned: usize,
    /// Cards examined.
    pub cards_scanned: usize,
    /// Cards with unresolvable images, in module then card order.
    pub missing: Vec<MissingImage>,
}

/// Result of [`Recovery::fix_card_image`].
#[derive(Debug, Clone)]
pub struct FixedImage {
    /// Module owning the card.
    pub module: String,
    /// The repaired card.
    pub card_id: CardId,
    /// New module-relative asset path.
    pub path: String,
    /// Result of saving all modules afterwards.
    pub save: SaveReport,
}

/// How to resolve a name collision when importing a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Delete the existing module and take its place.
    Replace,
    /// Import under this name instead.
    Rename(String),
}

/// Result of [`Recovery::import_module_file`].
#[derive(Debug, Clone)]
pub struct ImportedModule {
    /// Name the module was imported under.
    pub name: String,
    /// Number of cards imported.
    pub cards: usize,
    /// Whether an existing module was replaced.
    pub replaced: bool,
    /// Cards given new ids because theirs were already taken.
    pub reassigned_ids: usize,
    /// What migrating the imported cards did.
    pub migration: MigrationSummary,
}

/// Result of [`Recovery::audit_assets`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssetAudit {
    /// Files under the asset root.
    pub total_files: usize,
    /// Files no card refers to.
    pub orphaned: Vec<String>,
    /// Image cards whose file is missing.
    pub missing: Vec<MissingImage>,
}

/// Repair workflows over a [`Repository`].
pub struct Recovery<'a> {
    repo: &'a mut Repository,
}

impl<'a> Recovery<'a> {
    pub(crate) fn new(repo: &'a mut Repository) -> Self {
        Self { repo }
    }

    /// Find every image card whose asset does not resolve.
    pub fn scan_missing_images(&self) -> MissingImageScan {
        let store = self.repo.store();
        let mut scan = MissingImageScan::default();

        for module in self.repo.modules() {
            scan.modules_scanned += 1;
            for (index, card) in module.cards().iter().enumerate() {
                scan.cards_scanned += 1;
                let Some(image) = card.image_ref() else {
                    continue;
                };
                let reference = image.stored_path();
                if reference.and_then(|r| store.resolve(r)).is_none() {
                    scan.missing.push(MissingImage {
                        module: module.name().to_string(),
                        index,
                        card_id: card.id().to_string(),
                        question: card.question().to_string(),
                        reference: reference.map(str::to_string),
                    });
                }
            }
        }

        info!(
            modules = scan.modules_scanned,
            cards = scan.cards_scanned,
            missing = scan.missing.len(),
            "Scanned for missing images"
        );
        scan
    }

    /// Attach `source` as the image answer of card `id` and save.
    ///
    /// The owning module is the one named on the card if it holds the card,
    /// otherwise the single module that contains it.
    ///
    /// # Errors
    ///
    /// - [`Error::CardNotFound`] if no module holds the card.
    /// - [`Error::UnknownOwner`] if several modules hold it and the card
    ///   names none of them.
    /// - [`Error::AssetCopy`] if `source` cannot be copied; nothing changes.
    pub fn fix_card_image(&mut self, id: CardId, source: &Path) -> Result<FixedImage> {
        let owner = self.owner_of(id)?;
        let store = self.repo.store().clone();

        let card = self
            .repo
            .get_mut_by_name(&owner)
            .and_then(|m| m.card_by_id_mut(id))
            .ok_or_else(|| Error::CardNotFound(id.to_string()))?;

        if card.module_name() != owner {
            card.set_module_name(&owner);
        }
        card.set_image(&store, source)?;
        let path = card
            .image_ref()
            .and_then(|i| i.stored_path())
            .unwrap_or_default()
            .to_string();

        let save = self.repo.save_all();
        if !save.is_complete() {
            warn!(failed = save.failed.len(), "Image fixed but not every module was saved");
        }
        info!(card = %id, module = %owner, path = %path, "Fixed card image");

        Ok(FixedImage {
            module: owner,
            card_id: id,
            path,
            save,
        })
    }

    fn owner_of(&self, id: CardId) -> Result<String> {
        let holders: Vec<&str> = self
            .repo
            .modules()
            .filter(|m| m.position_of(id).is_some())
            .map(|m| m.name())
            .collect();

        let named = self
            .repo
            .find_card(id)
            .and_then(|(m, i)| m.card(i))
            .map(|c| c.module_name().to_string())
            .unwrap_or_default();

        match holders.as_slice() {
            [] => Err(Error::CardNotFound(id.to_string())),
            _ if holders.contains(&named.as_str()) => Ok(named),
            [only] => Ok(only.to_string()),
            _ => Err(Error::UnknownOwner(id.to_string())),
        }
    }

    /// Import a module from a file chosen by the caller.
    ///
    /// The file is fully read before the repository is touched. If the
    /// module's name is taken, `resolution` decides between replacing the
    /// existing module and importing under a new name. Every card is then
    /// moved to the final name, images included, and migrated.
    ///
    /// # Errors
    ///
    /// - [`Error::Deserialization`] if the file is not a module.
    /// - [`Error::NameConflict`] if the name is taken and `resolution` is
    ///   `None`.
    /// - [`Error::InvalidName`] for a blank rename.
    /// - [`Error::DuplicateName`] if the new name is taken too.
    pub fn import_module_file(
        &mut self,
        path: impl AsRef<Path>,
        resolution: Option<ConflictResolution>,
    ) -> Result<ImportedModule> {
        let path = path.as_ref();
        let mut module = self.repo.load_module_file(path)?;
        let original = module.name().to_string();

        let mut replaced = false;
        let target = match resolution {
            Some(ConflictResolution::Rename(name)) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(Error::InvalidName(name));
                }
                if self.repo.conflicts_with(&name) {
                    return Err(Error::DuplicateName(name));
                }
                name
            }
            Some(ConflictResolution::Replace) if self.repo.conflicts_with(&original) => {
                let existing: Vec<String> = self
                    .repo
                    .names()
                    .into_iter()
                    .filter(|n| *n == original || sanitize(n) == sanitize(&original))
                    .map(str::to_string)
                    .collect();
                for name in existing {
                    match self.repo.remove_by_name(&name) {
                        Ok(_) | Err(Error::Deletion { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
                replaced = true;
                original.clone()
            }
            None if self.repo.conflicts_with(&original) => {
                return Err(Error::NameConflict(original));
            }
            _ => original.clone(),
        };

        let taken: HashSet<CardId> = self
            .repo
            .modules()
            .flat_map(|m| m.cards().iter().map(|c| c.id()))
            .collect();
        let reassigned_ids = module.reassign_ids_in(&taken);

        let migration = module.rehome(self.repo.store(), &target);
        let cards = module.len();
        self.repo.add(module)?;

        info!(
            path = %path.display(),
            module = %target,
            cards,
            replaced,
            "Imported module"
        );

        Ok(ImportedModule {
            name: target,
            cards,
            replaced,
            reassigned_ids,
            migration,
        })
    }

    /// Compare the asset directory with what cards reference.
    pub fn audit_assets(&self) -> Result<AssetAudit> {
        let files = self.repo.store().list_assets()?;

        let referenced: HashSet<&str> = self
            .repo
            .modules()
            .flat_map(|m| m.cards())
            .filter(|c| c.answer_kind() == AnswerKind::Image)
            .filter_map(|c| c.image_ref().and_then(|i| i.stored_path()))
            .collect();

        let orphaned = files
            .iter()
            .filter(|f| !referenced.contains(f.as_str()))
            .cloned()
            .collect();

        Ok(AssetAudit {
            total_files: files.len(),
            orphaned,
            missing: self.scan_missing_images().missing,
        })
    }
}
