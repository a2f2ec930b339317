//! Loaded image assets.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Image container formats recognized by their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Portable Network Graphics.
    Png,
    /// JPEG / JFIF.
    Jpeg,
    /// GIF87a / GIF89a.
    Gif,
    /// Windows bitmap.
    Bmp,
    /// WebP (RIFF container).
    WebP,
    /// Readable, but not a format listed above.
    Unknown,
}

impl ImageFormat {
    /// Detect the format from a file's first bytes.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            ImageFormat::Png
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            ImageFormat::Jpeg
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            ImageFormat::Gif
        } else if bytes.starts_with(b"BM") {
            ImageFormat::Bmp
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            ImageFormat::WebP
        } else {
            ImageFormat::Unknown
        }
    }
}

/// An image asset read into memory.
///
/// Scaling and rendering belong to the display layer; this only carries the
/// bytes and where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// File the image was read from.
    pub path: PathBuf,
    /// Detected container format.
    pub format: ImageFormat,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl DecodedImage {
    /// Read an image file. Returns `None` if it cannot be read or is empty.
    pub fn open(path: &Path) -> Option<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                debug!(path = %path.display(), "Image file is empty");
                return None;
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Image file unreadable");
                return None;
            }
        };

        Some(Self {
            path: path.to_path_buf(),
            format: ImageFormat::sniff(&bytes),
            bytes,
        })
    }

    /// Size of the image file in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false for a successfully opened image.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
