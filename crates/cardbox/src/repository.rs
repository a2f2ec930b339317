//! Loading, saving and deleting whole modules.
//!
//! Each module lives in its own file, `<data_dir>/<sanitized name>.json`.
//! Loading upgrades every card in memory and writes the upgraded modules
//! straight back, so a data directory only has to be migrated once.
//!
//! # Example
//!
//! ```no_run
//! use cardbox::{Card, Repository, StoreConfig};
//!
//! # fn main() -> cardbox::Result<()> {
//! let mut repo = Repository::new(StoreConfig::new("/tmp/flashcards"));
//! let report = repo.load_all();
//! println!("Loaded {} modules, {} failed", report.loaded.len(), report.failed.len());
//!
//! let module = repo.create_module("Spanish")?;
//! module.add_card(Card::with_text("hola", "hello", "Greetings", "Spanish"));
//! repo.save_module("Spanish")?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::asset::{AssetStore, sanitize};
use crate::card::{Card, CardId};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::module::{MigrationSummary, Module};
use crate::recovery::Recovery;

/// Version written to every module file.
///
/// Files without a version predate per-module image directories.
pub const MODULE_FORMAT_VERSION: u32 = 3;

fn legacy_format_version() -> u32 {
    1
}

/// On-disk shape of a module file.
#[derive(Debug, Serialize, Deserialize)]
struct ModuleFile {
    #[serde(default = "legacy_format_version")]
    format_version: u32,
    name: String,
    #[serde(default)]
    cards: Vec<Card>,
}

/// The set of modules in a data directory.
#[derive(Debug)]
pub struct Repository {
    config: StoreConfig,
    store: AssetStore,
    modules: BTreeMap<String, Module>,
    /// File each module was read from, when that differs from where it is
    /// saved. Cleared once the module is written to its own path.
    sources: HashMap<String, PathBuf>,
}

impl Repository {
    /// Create an empty repository over `config`. Nothing is read yet.
    pub fn new(config: StoreConfig) -> Self {
        let store = AssetStore::from_config(&config);
        Self {
            config,
            store,
            modules: BTreeMap::new(),
            sources: HashMap::new(),
        }
    }

    /// Prepare the directory layout and load every module.
    ///
    /// # Errors
    ///
    /// Fails only if the directories cannot be created. Unreadable module
    /// files are skipped and logged.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.ensure_layout()?;
        let mut repo = Self::new(config);
        let report = repo.load_all();
        if !report.failed.is_empty() {
            warn!(failed = report.failed.len(), "Some module files could not be loaded");
        }
        Ok(repo)
    }

    /// Storage configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The asset store shared by every module.
    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// Number of loaded modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no modules are loaded.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Loaded modules, ordered by name.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Names of loaded modules, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    /// Module called `name`.
    pub fn get_by_name(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Mutable module called `name`. Save it afterwards.
    pub fn get_mut_by_name(&mut self, name: &str) -> Option<&mut Module> {
        self.modules.get_mut(name)
    }

    /// Find a card by id, returning its module and position.
    pub fn find_card(&self, id: CardId) -> Option<(&Module, usize)> {
        self.modules
            .values()
            .find_map(|m| m.position_of(id).map(|index| (m, index)))
    }

    /// File a module with this name is saved to.
    pub fn module_path(&self, name: &str) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{}.{}", sanitize(name), self.config.module_extension))
    }

    /// Replace the in-memory modules with everything in the data directory.
    ///
    /// Corrupt files are logged and reported, never fatal. Every card is then
    /// migrated; if anything changed, or a file used an older format, all
    /// modules are saved again.
    pub fn load_all(&mut self) -> LoadReport {
        self.modules.clear();
        self.sources.clear();
        let mut report = LoadReport::default();
        let mut outdated = false;

        for path in self.module_files(&mut report) {
            let (mut module, version) = match read_module_file(&path) {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable module file");
                    report.failed.push((path, e.to_string()));
                    continue;
                }
            };

            if self.modules.contains_key(module.name()) {
                warn!(path = %path.display(), module = module.name(), "Skipping duplicate module");
                report.failed.push((
                    path,
                    Error::DuplicateName(module.name().to_string()).to_string(),
                ));
                continue;
            }

            if version < MODULE_FORMAT_VERSION {
                debug!(path = %path.display(), version, "Module file uses an older format");
                outdated = true;
            }

            let fixed = module.sync_card_modules();
            report.migration.module_names_fixed += fixed;
            let name = module.name().to_string();
            if path != self.module_path(&name) {
                debug!(path = %path.display(), module = %name, "Module file is not at its canonical path");
                self.sources.insert(name.clone(), path);
            }
            report.loaded.push(name.clone());
            self.modules.insert(name, module);
        }

        report.migration.merge(self.migrate_all());

        if outdated || report.migration.changed() {
            info!(
                relocated = report.migration.relocated,
                marked_missing = report.migration.marked_missing,
                "Writing back upgraded modules"
            );
            report.resaved = Some(self.save_all());
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Loaded modules"
        );
        report
    }

    /// Module files in the data directory, sorted by file name.
    fn module_files(&self, report: &mut LoadReport) -> Vec<PathBuf> {
        let dir = &self.config.data_dir;
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "Data directory does not exist yet");
            return Vec::new();
        }

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot read data directory");
                report.failed.push((dir.clone(), e.to_string()));
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension().and_then(|e| e.to_str())
                        == Some(self.config.module_extension.as_str())
            })
            .collect();
        files.sort();
        files
    }

    /// Read one module file without touching the repository.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deserialization`] if the file is not a module, and
    /// [`Error::InvalidName`] if it names no module.
    pub fn load_module_file(&self, path: impl AsRef<Path>) -> Result<Module> {
        read_module_file(path.as_ref()).map(|(module, _)| module)
    }

    /// Migrate every card of every loaded module. Nothing is saved.
    pub fn migrate_all(&mut self) -> MigrationSummary {
        let mut summary = MigrationSummary::default();
        for module in self.modules.values_mut() {
            summary.merge(module.migrate(&self.store));
        }
        summary
    }

    /// Write every module to its own file.
    ///
    /// A failure on one module is reported and the rest are still written.
    pub fn save_all(&mut self) -> SaveReport {
        let mut report = SaveReport::default();
        let names: Vec<String> = self.modules.keys().cloned().collect();
        for name in names {
            match self.save_module(&name) {
                Ok(path) => report.saved.push(path),
                Err(e) => {
                    warn!(module = %name, error = %e, "Failed to save module");
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        report
    }

    /// Write one module, replacing its file as a whole.
    ///
    /// A module loaded from a file other than [`module_path`](Self::module_path)
    /// moves to its canonical path: the old file is removed once the new one
    /// is written.
    pub fn save_module(&mut self, name: &str) -> Result<PathBuf> {
        let module = self
            .modules
            .get(name)
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))?;

        let file = ModuleFile {
            format_version: MODULE_FORMAT_VERSION,
            name: module.name().to_string(),
            cards: module.cards().to_vec(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        std::fs::create_dir_all(&self.config.data_dir)?;
        let path = self.module_path(name);
        let tmp = path.with_extension(format!("{}.tmp", self.config.module_extension));
        std::fs::write(&tmp, json)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!(module = name, path = %path.display(), "Saved module");

        if let Some(old) = self.sources.remove(name) {
            if self.claimed_by_other(&old, name) {
                debug!(path = %old.display(), "Old module file now belongs to another module");
            } else {
                match std::fs::remove_file(&old) {
                    Ok(()) => info!(module = name, path = %old.display(), "Removed superseded module file"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!(module = name, path = %old.display(), error = %e, "Failed to remove superseded module file");
                        self.sources.insert(name.to_string(), old);
                    }
                }
            }
        }
        Ok(path)
    }

    /// Whether `path` is where another loaded module lives or is saved.
    fn claimed_by_other(&self, path: &Path, name: &str) -> bool {
        self.modules.keys().filter(|other| *other != name).any(|other| {
            self.module_path(other) == path || self.sources.get(other).is_some_and(|p| p == path)
        })
    }

    /// Insert a module and save it.
    ///
    /// Every card is claimed for the module first.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateName`] if a module with the same name, or the same
    /// file name after sanitizing, exists; the repository is unchanged.
    /// If only the save fails the module stays loaded and the error is
    /// returned.
    pub fn add(&mut self, mut module: Module) -> Result<()> {
        let name = module.name().to_string();
        if name.trim().is_empty() {
            return Err(Error::InvalidName(name));
        }
        if self.conflicts_with(&name) {
            return Err(Error::DuplicateName(name));
        }

        module.sync_card_modules();
        self.modules.insert(name.clone(), module);
        info!(module = %name, "Added module");
        self.save_module(&name)?;
        Ok(())
    }

    /// Create and save an empty module.
    pub fn create_module(&mut self, name: &str) -> Result<&mut Module> {
        let name = name.trim();
        self.add(Module::new(name))?;
        self.modules
            .get_mut(name)
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))
    }

    /// Whether `name` is taken, directly or by sharing a file name.
    pub fn conflicts_with(&self, name: &str) -> bool {
        let stem = sanitize(name);
        self.modules
            .keys()
            .any(|existing| existing == name || sanitize(existing) == stem)
    }

    /// Unload a module and delete its file, and the file it was loaded
    /// from if that was elsewhere.
    ///
    /// # Errors
    ///
    /// [`Error::ModuleNotFound`] if nothing is loaded under `name`.
    /// [`Error::Deletion`] if a file could not be removed; the module is
    /// unloaded regardless.
    pub fn remove_by_name(&mut self, name: &str) -> Result<Module> {
        if !self.modules.contains_key(name) {
            return Err(Error::ModuleNotFound(name.to_string()));
        }

        let mut paths = vec![self.module_path(name)];
        if let Some(source) = self.sources.get(name) {
            paths.push(source.clone());
        }
        paths.retain(|p| !self.claimed_by_other(p, name));

        let module = self
            .modules
            .remove(name)
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))?;
        self.sources.remove(name);

        let mut failure = None;
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => info!(module = name, path = %path.display(), "Deleted module file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(module = name, path = %path.display(), "Module file was already gone");
                }
                Err(e) => {
                    warn!(module = name, path = %path.display(), error = %e, "Failed to delete module file");
                    if failure.is_none() {
                        failure = Some(Error::Deletion { path, source: e });
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(module),
        }
    }

    /// Access the repair workflows.
    pub fn recovery(&mut self) -> Recovery<'_> {
        Recovery::new(self)
    }
}

fn read_module_file(path: &Path) -> Result<(Module, u32)> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::Deserialization {
        path: path.to_path_buf(),
        source: serde_json::Error::io(e),
    })?;
    let file: ModuleFile = serde_json::from_str(&content).map_err(|e| Error::Deserialization {
        path: path.to_path_buf(),
        source: e,
    })?;

    if file.name.trim().is_empty() {
        return Err(Error::InvalidName(file.name));
    }

    let mut module = Module::new(file.name);
    for card in file.cards {
        module.push_loaded(card);
    }
    Ok((module, file.format_version))
}

/// Outcome of [`Repository::load_all`].
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Names of modules loaded.
    pub loaded: Vec<String>,
    /// Files that could not be loaded (path, error message).
    pub failed: Vec<(PathBuf, String)>,
    /// What migration changed.
    pub migration: MigrationSummary,
    /// Result of writing upgraded modules back, if that was needed.
    pub resaved: Option<SaveReport>,
}

/// Outcome of [`Repository::save_all`].
#[derive(Debug, Clone, Default)]
pub struct SaveReport {
    /// Files written.
    pub saved: Vec<PathBuf>,
    /// Modules that could not be written (name, error message).
    pub failed: Vec<(String, String)>,
}

impl SaveReport {
    /// Whether every module was written.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
