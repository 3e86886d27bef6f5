use model::{media::MediaItem, rewrite::RewriteJob};

/// Maps upload-relative paths to object keys and to local or remote URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlMapper {
    local_base_url: String,
    public_url: String,
    key_prefix: String,
}

impl UrlMapper {
    pub fn new(local_base_url: &str, public_url: &str, key_prefix: &str) -> Self {
        UrlMapper {
            local_base_url: local_base_url.trim_end_matches('/').to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
            key_prefix: key_prefix.trim_matches('/').to_string(),
        }
    }

    pub fn object_key(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        if self.key_prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{relative}", self.key_prefix)
        }
    }

    pub fn local_url(&self, relative: &str) -> String {
        format!(
            "{}/{}",
            self.local_base_url,
            relative.trim_start_matches('/')
        )
    }

    pub fn remote_url(&self, relative: &str) -> String {
        format!("{}/{}", self.public_url, self.object_key(relative))
    }

    /// One job per stored file of the item (original plus every size).
    /// Pairs that would not change anything are dropped.
    pub fn rewrite_jobs(&self, item: &MediaItem) -> Vec<RewriteJob> {
        item.meta
            .relative_paths()
            .iter()
            .map(|path| RewriteJob::new(self.local_url(path), self.remote_url(path)))
            .filter(|job| !job.is_noop())
            .collect()
    }

    /// URL the site should serve for `item`: the remote copy once the item
    /// is marked offloaded, the local file otherwise.
    pub fn resolve(&self, item: &MediaItem) -> String {
        if item.is_offloaded() {
            self.remote_url(&item.relative_path)
        } else {
            self.local_url(&item.relative_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::media::{AttachmentMeta, MediaId, RemoteObject, SizeVariant};

    fn mapper() -> UrlMapper {
        UrlMapper::new(
            "https://example.com/wp-content/uploads/",
            "https://cdn.example.com",
            "/site-a/",
        )
    }

    fn item(remote: Option<RemoteObject>) -> MediaItem {
        MediaItem {
            id: MediaId(7),
            relative_path: "2024/05/photo.jpg".into(),
            mime: Some("image/jpeg".into()),
            meta: AttachmentMeta {
                file: "2024/05/photo.jpg".into(),
                sizes: vec![SizeVariant {
                    name: "thumbnail".into(),
                    file: "photo-150x150.jpg".into(),
                    mime: None,
                }],
                remote,
            },
        }
    }

    #[test]
    fn builds_keys_and_urls() {
        let m = mapper();
        assert_eq!(m.object_key("2024/05/a.jpg"), "site-a/2024/05/a.jpg");
        assert_eq!(
            m.local_url("2024/05/a.jpg"),
            "https://example.com/wp-content/uploads/2024/05/a.jpg"
        );
        assert_eq!(
            m.remote_url("2024/05/a.jpg"),
            "https://cdn.example.com/site-a/2024/05/a.jpg"
        );
    }

    #[test]
    fn rewrite_jobs_cover_sizes() {
        let jobs = mapper().rewrite_jobs(&item(None));
        assert_eq!(jobs.len(), 2);
        assert_eq!(
            jobs[1],
            RewriteJob::new(
                "https://example.com/wp-content/uploads/2024/05/photo-150x150.jpg",
                "https://cdn.example.com/site-a/2024/05/photo-150x150.jpg"
            )
        );
    }

    #[test]
    fn identical_bases_produce_no_jobs() {
        let m = UrlMapper::new("https://cdn.test/u", "https://cdn.test/u", "");
        assert!(m.rewrite_jobs(&item(None)).is_empty());
    }

    #[test]
    fn resolve_prefers_remote_once_offloaded() {
        let m = mapper();
        assert_eq!(
            m.resolve(&item(None)),
            "https://example.com/wp-content/uploads/2024/05/photo.jpg"
        );
        let remote = RemoteObject {
            bucket: "media".into(),
            key: "site-a/2024/05/photo.jpg".into(),
            url: "https://old-cdn.example.com/photo.jpg".into(),
        };
        assert_eq!(
            m.resolve(&item(Some(remote))),
            "https://cdn.example.com/site-a/2024/05/photo.jpg"
        );
    }
}
