//! Saved-file naming for downloaded items.

use std::sync::LazyLock;

use regex::Regex;

const FALLBACK_NAME: &str = "download";

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f\x7f]"#).unwrap());

/// Derives the saved filename from the last URL path segment. The unlock key,
/// when present, is appended to the base name so variants of one item with
/// different keys do not overwrite each other.
///
/// `book.pdf` + `ABC123` becomes `book_ABC123.pdf`.
pub fn derive_filename(download_url: &str, unlock_key: Option<&str>, item_name: &str) -> String {
    let segment = last_path_segment(download_url).unwrap_or_default();
    let (base, extension) = split_extension(&segment);
    let base = if base.trim().is_empty() {
        item_name.trim()
    } else {
        base
    };

    let mut name = base.to_string();
    if let Some(key) = unlock_key.map(str::trim).filter(|key| !key.is_empty()) {
        name.push('_');
        name.push_str(key);
    }
    if let Some(extension) = extension {
        name.push('.');
        name.push_str(extension);
    }

    let sanitized = sanitize(&name);
    if sanitized.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        sanitized
    }
}

pub fn last_path_segment(url: &str) -> Option<String> {
    let path = match url::Url::parse(url.trim()) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .trim()
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let segment = path.split(['/', '\\']).filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

fn split_extension(segment: &str) -> (&str, Option<&str>) {
    match segment.rsplit_once('.') {
        Some((base, extension)) if !base.is_empty() && !extension.is_empty() => {
            (base, Some(extension))
        }
        _ => (segment, None),
    }
}

/// Strips characters that are unsafe in filenames on common platforms.
pub fn sanitize(name: &str) -> String {
    let stripped = UNSAFE_CHARS.replace_all(name, "");
    stripped
        .trim_matches(|c: char| c == ' ' || c == '.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_goes_before_extension() {
        assert_eq!(
            derive_filename("https://cdn.example.com/files/book.pdf", Some("ABC123"), "Book"),
            "book_ABC123.pdf"
        );
    }

    #[test]
    fn no_key_keeps_segment() {
        assert_eq!(
            derive_filename("https://cdn.example.com/files/book.pdf", None, "Book"),
            "book.pdf"
        );
    }

    #[test]
    fn query_and_fragment_are_ignored() {
        assert_eq!(
            derive_filename("https://x.test/dl/setup.exe?token=1#top", Some("K"), "Setup"),
            "setup_K.exe"
        );
    }

    #[test]
    fn unsafe_characters_are_stripped() {
        assert_eq!(
            derive_filename("https://x.test/a/app.zip", Some("AB:C/D*?"), "App"),
            "app_ABCD.zip"
        );
    }

    #[test]
    fn missing_segment_falls_back_to_item_name() {
        assert_eq!(
            derive_filename("https://x.test/", Some("K1"), "Math 5"),
            "Math 5_K1"
        );
        assert_eq!(derive_filename("https://x.test/", None, "  "), "download");
    }

    #[test]
    fn dotfile_has_no_extension() {
        assert_eq!(derive_filename("https://x.test/.hidden", Some("K"), "x"), "hidden_K");
    }

    #[test]
    fn unparseable_url_still_yields_a_name() {
        assert_eq!(
            derive_filename("files/guide.epub?x=1", None, "Guide"),
            "guide.epub"
        );
    }
}
