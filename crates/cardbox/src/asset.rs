//! On-disk layout for image assets.
//!
//! Assets live under a single root, one directory per module:
//!
//! ```text
//! images/
//! ├── old_flat_file.png          # legacy flat layout, still resolvable
//! └── Spanish_Verbs/
//!     └── 1718000000000_hablar.png
//! ```
//!
//! Cards store the path relative to the root (`Spanish_Verbs/1718000000000_hablar.png`),
//! always with `/` separators.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{Error, Result};

/// Last timestamp handed out by [`next_stamp`], shared by every store in
/// the process so two copies never claim the same millisecond.
static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Replace every character outside `[A-Za-z0-9.-]` with `_`.
///
/// Pure and idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
///
/// # Example
///
/// ```
/// assert_eq!(cardbox::sanitize("Spanish Verbs!"), "Spanish_Verbs_");
/// ```
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Manages the asset root and translates between files and the relative
/// paths stored on cards.
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a store at the asset root described by `config`.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.images_root())
    }

    /// The asset root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a module's assets. Not created by this call.
    pub fn module_dir(&self, module_name: &str) -> PathBuf {
        self.root.join(sanitize(module_name))
    }

    /// Copy `source` into the module's asset directory.
    ///
    /// The copy is named `<unix_millis>_<sanitized_stem><ext>`. Returns the
    /// path of the new file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssetCopy`] if the source is missing or the copy
    /// cannot complete. Nothing is left behind on failure.
    pub fn store(&self, source: &Path, module_name: &str) -> Result<PathBuf> {
        if !source.is_file() {
            warn!(source = %source.display(), "Asset source does not exist");
            return Err(copy_error(source, "source file does not exist"));
        }

        let dir = self.module_dir(module_name);
        std::fs::create_dir_all(&dir).map_err(|e| {
            copy_error(
                source,
                format!("cannot create directory '{}': {}", dir.display(), e),
            )
        })?;

        let (stem, ext) = split_file_name(source);
        let mut dest = dir.join(format!("{}_{}{}", next_stamp(), stem, ext));
        while dest.exists() {
            dest = dir.join(format!("{}_{}{}", next_stamp(), stem, ext));
        }

        std::fs::copy(source, &dest).map_err(|e| {
            // Partial copies must not be mistaken for real assets later.
            let _ = std::fs::remove_file(&dest);
            copy_error(source, e.to_string())
        })?;

        debug!(
            source = %source.display(),
            dest = %dest.display(),
            module = module_name,
            "Stored asset"
        );
        Ok(dest)
    }

    /// Like [`store`](Self::store), then delete the source if it sat
    /// directly in the asset root (a flat-layout asset being promoted).
    ///
    /// Sources anywhere else are never deleted.
    pub fn relocate(&self, source: &Path, module_name: &str) -> Result<PathBuf> {
        let stored = self.store(source, module_name)?;

        if self.is_flat_legacy(source) {
            match std::fs::remove_file(source) {
                Ok(()) => debug!(source = %source.display(), "Removed promoted flat asset"),
                Err(e) => warn!(
                    source = %source.display(),
                    error = %e,
                    "Promoted flat asset but could not remove the original"
                ),
            }
        }

        Ok(stored)
    }

    /// Whether `path` is a file directly inside the asset root.
    pub fn is_flat_legacy(&self, path: &Path) -> bool {
        match path.parent() {
            Some(parent) => paths_are_same(parent, &self.root),
            None => false,
        }
    }

    /// Path of `stored` relative to the asset root, using `/` separators.
    ///
    /// Falls back to the bare file name when `stored` is outside the root.
    pub fn relative_path_of(&self, stored: &Path) -> String {
        let relative = stored.strip_prefix(&self.root).ok().map(Path::to_path_buf).or_else(|| {
            let root = std::fs::canonicalize(&self.root).ok()?;
            let stored = std::fs::canonicalize(stored).ok()?;
            stored.strip_prefix(root).ok().map(Path::to_path_buf)
        });

        match relative {
            Some(rel) if rel.components().next().is_some() => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/"),
            _ => stored
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// Resolve a stored relative path to an existing file.
    ///
    /// Paths with a directory separator are looked up under the root. A bare
    /// file name is probed directly in the root, where the flat layout kept
    /// every image. Returns `None` if nothing exists there.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let relative = relative.trim();
        if relative.is_empty() {
            return None;
        }

        let normalized = relative.replace('\\', "/");
        let rel = Path::new(&normalized);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            debug!(path = relative, "Refusing to resolve path outside the asset root");
            return None;
        }

        let candidate = self.root.join(rel);
        candidate.is_file().then_some(candidate)
    }

    /// Like [`resolve`](Self::resolve), but a miss is an error.
    pub fn require(&self, relative: &str) -> Result<PathBuf> {
        self.resolve(relative)
            .ok_or_else(|| Error::AssetNotFound(relative.to_string()))
    }

    /// Every file under the root, as relative paths, sorted.
    pub fn list_assets(&self) -> Result<Vec<String>> {
        let mut found = Vec::new();
        if self.root.is_dir() {
            collect_files(&self.root, &mut found)?;
        }
        let mut relative: Vec<String> = found.iter().map(|p| self.relative_path_of(p)).collect();
        relative.sort();
        Ok(relative)
    }
}

fn copy_error(source: &Path, reason: impl Into<String>) -> Error {
    Error::AssetCopy {
        source_path: source.to_path_buf(),
        reason: reason.into(),
    }
}

/// Split a file name into a sanitized stem and its extension (with dot).
fn split_file_name(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| sanitize(&s.to_string_lossy()))
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

/// Milliseconds since the epoch, strictly increasing within the process.
fn next_stamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Check if two paths refer to the same location.
fn paths_are_same(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => a == b,
    }
}

fn collect_files(dir: &Path, results: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, results)?;
        } else {
            results.push(path);
        }
    }
    Ok(())
}
