use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a media item in the host's media library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MediaId(pub u64);

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MediaId {
    fn from(value: u64) -> Self {
        MediaId(value)
    }
}

/// A derived rendition of a media item (thumbnail, medium, ...).
/// Its file lives in the same directory as the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeVariant {
    pub name: String,
    pub file: String,
    pub mime: Option<String>,
}

/// Where an offloaded item now lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub bucket: String,
    pub key: String,
    pub url: String,
}

/// Structural metadata stored alongside a media item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    /// Path relative to the uploads directory, e.g. `2024/05/photo.jpg`.
    pub file: String,
    pub sizes: Vec<SizeVariant>,
    pub remote: Option<RemoteObject>,
}

impl AttachmentMeta {
    /// Directory part of `file`, empty when the file sits at the uploads root.
    pub fn dir(&self) -> &str {
        match self.file.rfind('/') {
            Some(idx) => &self.file[..idx],
            None => "",
        }
    }

    /// Relative paths of the original and every derived size, original first.
    pub fn relative_paths(&self) -> Vec<String> {
        let dir = self.dir();
        let mut paths = vec![self.file.clone()];
        for size in &self.sizes {
            let path = if dir.is_empty() {
                size.file.clone()
            } else {
                format!("{dir}/{}", size.file)
            };
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: MediaId,
    pub relative_path: String,
    pub mime: Option<String>,
    pub meta: AttachmentMeta,
}

impl MediaItem {
    pub fn is_offloaded(&self) -> bool {
        self.meta.remote.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(name: &str, file: &str) -> SizeVariant {
        SizeVariant {
            name: name.into(),
            file: file.into(),
            mime: None,
        }
    }

    #[test]
    fn relative_paths_include_sizes_once() {
        let meta = AttachmentMeta {
            file: "2024/05/photo.jpg".into(),
            sizes: vec![
                size("thumbnail", "photo-150x150.jpg"),
                size("medium", "photo-300x200.jpg"),
                size("medium_square", "photo-150x150.jpg"),
            ],
            remote: None,
        };

        assert_eq!(meta.dir(), "2024/05");
        assert_eq!(
            meta.relative_paths(),
            vec![
                "2024/05/photo.jpg",
                "2024/05/photo-150x150.jpg",
                "2024/05/photo-300x200.jpg"
            ]
        );
    }

    #[test]
    fn root_level_file_has_empty_dir() {
        let meta = AttachmentMeta {
            file: "logo.png".into(),
            sizes: vec![size("thumbnail", "logo-50x50.png")],
            remote: None,
        };
        assert_eq!(meta.dir(), "");
        assert_eq!(meta.relative_paths(), vec!["logo.png", "logo-50x50.png"]);
    }
}
