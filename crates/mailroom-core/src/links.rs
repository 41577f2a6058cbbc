//! Link extraction from mail text.
//!
//! The spam checks work on link-like substrings: anything with a host
//! and a recognizable top-level domain, with or without a scheme. The
//! scanner is deliberately permissive so that obfuscated links
//! ("visit evil-site.com now") are still caught.

use std::sync::LazyLock;

use regex::Regex;

/// Matches an optional scheme, a host containing at least one dot, and
/// an optional path.
#[allow(clippy::expect_used)] // the pattern is a constant
static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(https?://)?(www\.)?[\w.-]+\.[a-z]{2,}(/\S*)?")
        .expect("link pattern compiles")
});

/// Extracts every link-like substring from a text, in order of
/// appearance. Duplicates are kept.
#[must_use]
pub fn extract(text: &str) -> Vec<String> {
    LINK_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Extracts the first link-like substring, if any.
#[must_use]
pub fn first(text: &str) -> Option<String> {
    LINK_PATTERN.find(text).map(|m| m.as_str().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn finds_bare_domains() {
        let links = extract("meet me at evil-site.com after lunch");
        assert_eq!(links, vec!["evil-site.com"]);
    }

    #[test]
    fn finds_full_urls_with_paths() {
        let links = extract("click https://www.evil.example.com/login?next=1 now");
        assert_eq!(links, vec!["https://www.evil.example.com/login?next=1"]);
    }

    #[test]
    fn keeps_order_and_duplicates() {
        let links = extract("a.com then b.org then a.com again");
        assert_eq!(links, vec!["a.com", "b.org", "a.com"]);
    }

    #[test]
    fn trailing_punctuation_is_not_part_of_a_hostname() {
        assert_eq!(first("see example.com."), Some("example.com".to_string()));
        assert_eq!(first("(example.com)"), Some("example.com".to_string()));
    }

    #[test]
    fn plain_text_has_no_links() {
        assert!(extract("just words, no links here").is_empty());
        assert_eq!(first(""), None);
    }

    #[test]
    fn scheme_is_case_insensitive() {
        assert_eq!(
            first("HTTPS://EVIL.COM/PATH"),
            Some("HTTPS://EVIL.COM/PATH".to_string())
        );
    }

    proptest! {
        #[test]
        fn extracted_links_contain_a_dot_and_no_whitespace(text in "\\PC{0,60}") {
            for link in extract(&text) {
                prop_assert!(link.contains('.'));
                prop_assert!(!link.chars().any(char::is_whitespace));
            }
        }

        #[test]
        fn extraction_is_stable_on_its_own_output(text in "\\PC{0,60}") {
            for link in extract(&text) {
                prop_assert_eq!(first(&link), Some(link.clone()));
            }
        }
    }
}
