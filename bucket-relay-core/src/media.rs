//! Media items discovered in the bucket and the rules that classify them.

use serde::Serialize;

use crate::contract::ObjectDescriptor;

const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "gif", "zip", "rar", "7z", "doc", "docx", "epub"];

/// Extension of companion caption files.
pub const COMPANION_EXTENSION: &str = "txt";

/// How an item is sent to the delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
}

impl MediaKind {
    /// Classify a key by its extension, case-insensitively. `None` means unsupported.
    pub fn from_key(key: &str) -> Option<Self> {
        let ext = extension(key)?.to_ascii_lowercase();
        if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Photo)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Document)
        } else {
            None
        }
    }
}

/// A candidate object for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    pub key: String,
    pub size_bytes: u64,
    /// `None` when the extension is not one we know how to send.
    pub kind: Option<MediaKind>,
    pub folder: String,
}

impl MediaItem {
    pub fn new(descriptor: ObjectDescriptor, folder: impl Into<String>) -> Self {
        let kind = MediaKind::from_key(&descriptor.key);
        Self {
            key: descriptor.key,
            size_bytes: descriptor.size,
            kind,
            folder: folder.into(),
        }
    }

    /// Key of the companion text resource: the item's extension replaced by `.txt`.
    pub fn companion_key(&self) -> String {
        companion_key(&self.key)
    }

    /// Name of the local staging file for this item.
    pub fn staging_file_name(&self) -> String {
        self.key.replace('/', "_")
    }
}

/// Replace the extension of `key` with the companion text extension.
pub fn companion_key(key: &str) -> String {
    match extension(key) {
        Some(ext) => format!(
            "{}{}",
            &key[..key.len() - ext.len()],
            COMPANION_EXTENSION
        ),
        None => format!("{key}.{COMPANION_EXTENSION}"),
    }
}

/// Files that live next to the media but are never delivered themselves.
pub fn is_auxiliary(key: &str, archive_prefix: Option<&str>) -> bool {
    if key.ends_with('/') {
        return true;
    }
    if let Some(prefix) = archive_prefix {
        if !prefix.is_empty() && key.starts_with(prefix) {
            return true;
        }
    }
    let file_name = key.rsplit('/').next().unwrap_or(key);
    if file_name == ".DS_Store" {
        return true;
    }
    matches!(extension(key), Some(ext) if ext.eq_ignore_ascii_case(COMPANION_EXTENSION))
}

/// Archive location of `key`: `source_prefix` swapped for `archive_prefix`.
/// Keys outside the source prefix are placed under the archive prefix as-is.
pub fn archive_key(key: &str, source_prefix: &str, archive_prefix: &str) -> String {
    let relative = key.strip_prefix(source_prefix).unwrap_or(key);
    format!("{archive_prefix}{relative}")
}

/// Extension of the final path segment, without the dot.
fn extension(key: &str) -> Option<&str> {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_extension_ignoring_case() {
        assert_eq!(MediaKind::from_key("source/a/x.JPG"), Some(MediaKind::Photo));
        assert_eq!(MediaKind::from_key("source/a/x.mov"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_key("source/a/x.pdf"), Some(MediaKind::Document));
        assert_eq!(MediaKind::from_key("source/a/x.exe"), None);
        assert_eq!(MediaKind::from_key("source/a/noext"), None);
    }

    #[test]
    fn companion_key_swaps_extension() {
        assert_eq!(companion_key("alpha/a.jpg"), "alpha/a.txt");
        assert_eq!(companion_key("source/alpha/clip.final.mp4"), "source/alpha/clip.final.txt");
        assert_eq!(companion_key("alpha/noext"), "alpha/noext.txt");
    }

    #[test]
    fn auxiliary_files_are_recognised() {
        assert!(is_auxiliary("alpha/a.txt", None));
        assert!(is_auxiliary("alpha/.DS_Store", None));
        assert!(is_auxiliary("alpha/", None));
        assert!(is_auxiliary("sent/alpha/a.jpg", Some("sent/")));
        assert!(!is_auxiliary("alpha/a.jpg", Some("sent/")));
    }

    #[test]
    fn archive_key_replaces_source_prefix() {
        assert_eq!(archive_key("source/alpha/a.jpg", "source/", "sent/"), "sent/alpha/a.jpg");
        assert_eq!(archive_key("alpha/a.jpg", "", "sent/"), "sent/alpha/a.jpg");
    }
}
