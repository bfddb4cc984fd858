use std::fmt;

use serde::{Deserialize, Serialize};

pub const WILDCARD_CATEGORY: &str = "all";
pub const NONE_MARKER: &str = "none";
pub const LINK_SCHEME: &str = "site://";
pub const UNKNOWN_PUBLISHER: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub name: String,
    pub download_url: String,
    pub unlock_key: String,
    pub category: String,
    pub publisher: String,
    pub cover_image_url: String,
}

impl CatalogItem {
    pub fn target(&self) -> Option<DownloadTarget> {
        DownloadTarget::parse(&self.download_url)
    }

    /// The unlock key, or `None` when the catalog marks the item as keyless.
    pub fn unlock_key(&self) -> Option<&str> {
        let key = self.unlock_key.trim();
        (!is_none_marker(key)).then_some(key)
    }

    pub fn is_wildcard(&self) -> bool {
        is_wildcard_category(&self.category)
    }

    pub fn has_category(&self) -> bool {
        !self.category.trim().is_empty()
    }

    pub fn has_cover(&self) -> bool {
        !is_none_marker(&self.cover_image_url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DownloadTarget {
    Link { target: String },
    File { url: String },
}

impl DownloadTarget {
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        match strip_prefix_ignore_case(trimmed, LINK_SCHEME) {
            Some(rest) => Some(DownloadTarget::Link {
                target: rest.trim().to_string(),
            }),
            None => Some(DownloadTarget::File {
                url: trimmed.to_string(),
            }),
        }
    }
}

impl fmt::Display for DownloadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadTarget::Link { target } => write!(f, "link {target}"),
            DownloadTarget::File { url } => write!(f, "file {url}"),
        }
    }
}

pub fn is_wildcard_category(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(WILDCARD_CATEGORY)
}

/// Empty values count as "none" too.
pub fn is_none_marker(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NONE_MARKER)
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn item(url: &str, key: &str) -> CatalogItem {
        CatalogItem {
            name: "Book".to_string(),
            download_url: url.to_string(),
            unlock_key: key.to_string(),
            category: "5".to_string(),
            publisher: UNKNOWN_PUBLISHER.to_string(),
            cover_image_url: NONE_MARKER.to_string(),
        }
    }

    #[test]
    fn site_scheme_is_a_link() {
        let target = item("site://https://example.com/x", "none").target();
        assert_eq!(
            target,
            Some(DownloadTarget::Link {
                target: "https://example.com/x".to_string()
            })
        );
    }

    #[test]
    fn plain_url_is_a_file() {
        let target = item("https://cdn.example.com/book.pdf", "none").target();
        assert_matches!(target, Some(DownloadTarget::File { .. }));
    }

    #[test]
    fn blank_url_has_no_target() {
        assert_eq!(item("   ", "none").target(), None);
    }

    #[test]
    fn unlock_key_none_marker() {
        assert_eq!(item("x", "NONE").unlock_key(), None);
        assert_eq!(item("x", " ABC123 ").unlock_key(), Some("ABC123"));
    }

    #[test]
    fn wildcard_is_case_insensitive() {
        assert!(is_wildcard_category("ALL"));
        assert!(is_wildcard_category(" all "));
        assert!(!is_wildcard_category("allx"));
    }
}
