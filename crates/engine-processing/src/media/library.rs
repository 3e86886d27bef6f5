use crate::{
    codec::php::{self, PhpKey, PhpValue},
    error::MediaError,
    host::{ATTACHED_FILE_KEY, ATTACHMENT_METADATA_KEY, ATTACHMENT_POST_TYPE, HostLayout},
};
use async_trait::async_trait;
use connectors::sql::base::adapter::SqlAdapter;
use model::{
    core::value::Value,
    media::{AttachmentMeta, MediaId, MediaItem, RemoteObject, SizeVariant},
};
use std::sync::Arc;
use tracing::debug;

/// Key inside the attachment metadata that records the remote copy.
pub const OFFLOAD_FIELD: &str = "offload";

/// The host's media library as seen by the migration.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Every item eligible for migration, in ascending id order.
    async fn list_ids(&self) -> Result<Vec<MediaId>, MediaError>;

    /// `Ok(None)` when the item or its stored file reference is gone.
    async fn fetch(&self, id: MediaId) -> Result<Option<MediaItem>, MediaError>;

    /// Records the remote location in the item's stored metadata.
    async fn mark_offloaded(&self, id: MediaId, remote: &RemoteObject) -> Result<(), MediaError>;
}

pub struct SqlMediaLibrary {
    db: Arc<dyn SqlAdapter>,
    layout: HostLayout,
}

impl SqlMediaLibrary {
    pub fn new(db: Arc<dyn SqlAdapter>, layout: HostLayout) -> Self {
        SqlMediaLibrary { db, layout }
    }

    fn q(&self, ident: &str) -> String {
        self.db.dialect().quote_identifier(ident)
    }

    fn p(&self, index: usize) -> String {
        self.db.dialect().get_placeholder(index)
    }

    async fn meta_value(&self, id: MediaId, key: &str) -> Result<Option<String>, MediaError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {} AND {} = {}",
            self.q("meta_value"),
            self.q(&self.layout.postmeta()),
            self.q("post_id"),
            self.p(0),
            self.q("meta_key"),
            self.p(1),
        );
        let rows = self
            .db
            .query_rows(&sql, vec![Value::Uint(id.0), Value::from(key)])
            .await?;
        Ok(rows.first().and_then(|row| row.first_value().as_string()))
    }
}

#[async_trait]
impl MediaLibrary for SqlMediaLibrary {
    async fn list_ids(&self) -> Result<Vec<MediaId>, MediaError> {
        let sql = format!(
            "SELECT {id} FROM {} WHERE {} = {} ORDER BY {id}",
            self.q(&self.layout.posts()),
            self.q("post_type"),
            self.p(0),
            id = self.q("ID"),
        );
        let rows = self
            .db
            .query_rows(&sql, vec![Value::from(ATTACHMENT_POST_TYPE)])
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.first_value().as_u64())
            .map(MediaId)
            .collect())
    }

    async fn fetch(&self, id: MediaId) -> Result<Option<MediaItem>, MediaError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {} AND {} = {}",
            self.q("post_mime_type"),
            self.q(&self.layout.posts()),
            self.q("ID"),
            self.p(0),
            self.q("post_type"),
            self.p(1),
        );
        let rows = self
            .db
            .query_rows(&sql, vec![Value::Uint(id.0), Value::from(ATTACHMENT_POST_TYPE)])
            .await?;
        let Some(post) = rows.first() else {
            debug!(media_id = %id, "Attachment not found");
            return Ok(None);
        };
        let mime = post
            .first_value()
            .as_string()
            .filter(|m| !m.is_empty());

        let attached_file = self.meta_value(id, ATTACHED_FILE_KEY).await?;
        let metadata = self.meta_value(id, ATTACHMENT_METADATA_KEY).await?;

        let meta = match metadata.filter(|m| !m.is_empty()) {
            Some(raw) => parse_attachment_meta(&raw, attached_file.as_deref())
                .map_err(|reason| MediaError::Malformed { id, reason })?,
            None => match attached_file.as_deref().filter(|f| !f.is_empty()) {
                Some(file) => AttachmentMeta {
                    file: file.to_string(),
                    ..AttachmentMeta::default()
                },
                None => return Ok(None),
            },
        };

        Ok(Some(MediaItem {
            id,
            relative_path: attached_file
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| meta.file.clone()),
            mime,
            meta,
        }))
    }

    async fn mark_offloaded(&self, id: MediaId, remote: &RemoteObject) -> Result<(), MediaError> {
        let existing = self.meta_value(id, ATTACHMENT_METADATA_KEY).await?;

        let mut document = match existing.as_deref().filter(|m| !m.is_empty()) {
            Some(raw) => php::decode(raw.as_bytes())
                .or_else(|_| php::decode_lenient(raw.as_bytes()))
                .map_err(|err| MediaError::Malformed {
                    id,
                    reason: err.to_string(),
                })?,
            None => PhpValue::Array(Vec::new()),
        };
        if !document.set(OFFLOAD_FIELD, remote_to_php(remote)) {
            return Err(MediaError::Malformed {
                id,
                reason: "metadata is not an array".into(),
            });
        }

        let encoded = String::from_utf8(php::encode(&document)).map_err(|e| {
            MediaError::Malformed {
                id,
                reason: e.to_string(),
            }
        })?;

        let params = vec![
            Value::String(encoded),
            Value::Uint(id.0),
            Value::from(ATTACHMENT_METADATA_KEY),
        ];
        let sql = if existing.is_some() {
            format!(
                "UPDATE {} SET {} = {} WHERE {} = {} AND {} = {}",
                self.q(&self.layout.postmeta()),
                self.q("meta_value"),
                self.p(0),
                self.q("post_id"),
                self.p(1),
                self.q("meta_key"),
                self.p(2),
            )
        } else {
            format!(
                "INSERT INTO {} ({}, {}, {}) VALUES ({}, {}, {})",
                self.q(&self.layout.postmeta()),
                self.q("meta_value"),
                self.q("post_id"),
                self.q("meta_key"),
                self.p(0),
                self.p(1),
                self.p(2),
            )
        };
        self.db.exec_params(&sql, params).await?;
        debug!(media_id = %id, url = %remote.url, "Marked as offloaded");
        Ok(())
    }
}

/// Decodes stored attachment metadata.
pub fn parse_attachment_meta(
    raw: &str,
    attached_file: Option<&str>,
) -> Result<AttachmentMeta, String> {
    let document = php::decode(raw.as_bytes())
        .or_else(|_| php::decode_lenient(raw.as_bytes()))
        .map_err(|err| err.to_string())?;
    if !matches!(document, PhpValue::Array(_)) {
        return Err("metadata is not an array".into());
    }

    let file = document
        .get("file")
        .and_then(PhpValue::as_str)
        .or(attached_file)
        .filter(|f| !f.is_empty())
        .ok_or("metadata has no file")?
        .to_string();

    let sizes = document
        .get("sizes")
        .map(|sizes| {
            sizes
                .entries()
                .iter()
                .filter_map(|(name, size)| {
                    let name = match name {
                        PhpKey::Str(s) => String::from_utf8_lossy(s).into_owned(),
                        PhpKey::Int(i) => i.to_string(),
                    };
                    Some(SizeVariant {
                        name,
                        file: size.get("file")?.as_str()?.to_string(),
                        mime: size
                            .get("mime-type")
                            .and_then(PhpValue::as_str)
                            .map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let remote = document.get(OFFLOAD_FIELD).and_then(|r| {
        Some(RemoteObject {
            bucket: r.get("bucket")?.as_str()?.to_string(),
            key: r.get("key")?.as_str()?.to_string(),
            url: r.get("url")?.as_str()?.to_string(),
        })
    });

    Ok(AttachmentMeta {
        file,
        sizes,
        remote,
    })
}

fn remote_to_php(remote: &RemoteObject) -> PhpValue {
    PhpValue::Array(vec![
        (PhpKey::Str(b"bucket".to_vec()), PhpValue::string(&remote.bucket)),
        (PhpKey::Str(b"key".to_vec()), PhpValue::string(&remote.key)),
        (PhpKey::Str(b"url".to_vec()), PhpValue::string(&remote.url)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    const META: &str = r#"a:4:{s:5:"width";i:1024;s:6:"height";i:768;s:4:"file";s:17:"2024/05/photo.jpg";s:5:"sizes";a:2:{s:9:"thumbnail";a:2:{s:4:"file";s:17:"photo-150x150.jpg";s:9:"mime-type";s:10:"image/jpeg";}s:6:"medium";a:2:{s:4:"file";s:17:"photo-300x225.jpg";s:9:"mime-type";s:10:"image/jpeg";}}}"#;

    #[test]
    fn parses_file_and_sizes() {
        let meta = parse_attachment_meta(META, None).unwrap();
        assert_eq!(meta.file, "2024/05/photo.jpg");
        assert_eq!(meta.sizes.len(), 2);
        assert_eq!(meta.sizes[0].name, "thumbnail");
        assert_eq!(meta.sizes[1].file, "photo-300x225.jpg");
        assert_eq!(meta.sizes[1].mime.as_deref(), Some("image/jpeg"));
        assert!(meta.remote.is_none());
    }

    #[test]
    fn falls_back_to_attached_file() {
        let meta = parse_attachment_meta(r#"a:1:{s:8:"filesize";i:10;}"#, Some("docs/a.pdf")).unwrap();
        assert_eq!(meta.file, "docs/a.pdf");
        assert!(meta.sizes.is_empty());
    }

    #[test]
    fn rejects_malformed_metadata() {
        assert!(parse_attachment_meta("a:1:{s:4:\"file\"", None).is_err());
        assert!(parse_attachment_meta("i:5;", Some("a.jpg")).is_err());
        assert!(parse_attachment_meta("a:0:{}", None).is_err());
    }

    #[test]
    fn offload_marker_round_trips() {
        let remote = RemoteObject {
            bucket: "media".into(),
            key: "site/2024/05/photo.jpg".into(),
            url: "https://cdn.test/site/2024/05/photo.jpg".into(),
        };
        let mut document = php::decode(META.as_bytes()).unwrap();
        document.set(OFFLOAD_FIELD, remote_to_php(&remote));
        let raw = String::from_utf8(php::encode(&document)).unwrap();

        let meta = parse_attachment_meta(&raw, None).unwrap();
        assert_eq!(meta.remote, Some(remote));
        assert_eq!(meta.sizes.len(), 2);
    }
}
