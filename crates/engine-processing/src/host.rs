use std::collections::BTreeSet;

pub const ATTACHMENT_POST_TYPE: &str = "attachment";
pub const ATTACHED_FILE_KEY: &str = "_wp_attached_file";
pub const ATTACHMENT_METADATA_KEY: &str = "_wp_attachment_metadata";

/// Tables the host creates itself, without prefix.
const CORE_TABLES: [&str; 19] = [
    "commentmeta",
    "comments",
    "links",
    "options",
    "postmeta",
    "posts",
    "term_relationships",
    "term_taxonomy",
    "termmeta",
    "terms",
    "usermeta",
    "users",
    "blogs",
    "blogmeta",
    "blog_versions",
    "registration_log",
    "signups",
    "site",
    "sitemeta",
];

/// Table naming of the host install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    prefix: String,
}

impl HostLayout {
    pub fn new(prefix: impl Into<String>) -> Self {
        HostLayout {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn posts(&self) -> String {
        format!("{}posts", self.prefix)
    }

    pub fn postmeta(&self) -> String {
        format!("{}postmeta", self.prefix)
    }

    /// The two content tables every rewrite pass covers.
    pub fn content_tables(&self) -> [String; 2] {
        [self.posts(), self.postmeta()]
    }

    /// Tables a scan never reports.
    pub fn core_tables(&self) -> BTreeSet<String> {
        CORE_TABLES
            .iter()
            .map(|t| format!("{}{t}", self.prefix))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_table_names() {
        let layout = HostLayout::new("site_");
        assert_eq!(layout.content_tables(), ["site_posts", "site_postmeta"]);
        assert!(layout.core_tables().contains("site_options"));
        assert!(!layout.core_tables().contains("wp_options"));
    }
}
