//! Decoding of post-page URL parameters.
//!
//! Post links carry the feed page they came from so the post page can fetch
//! its neighbors. Current links pass the page as an explicit `from` query
//! parameter. Older links encoded it as a single digit glued onto the end of
//! the uid (`my-post2`), which is ambiguous for uids that genuinely end in a
//! digit, so decoding keeps the raw value around as a fallback lookup key.

/// Where a post link points, and which feed page it was followed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostLocator {
    pub uid: String,
    /// 1-based feed page the link originated on.
    pub origin_page: u32,
    /// Set when a trailing digit was stripped from the path segment. If the
    /// stripped uid does not resolve, the raw segment is retried as-is.
    pub fallback_uid: Option<String>,
}

/// Decode the `/post/{segment}` path segment together with the optional
/// `from` query parameter.
///
/// An explicit `from` page wins and suppresses digit stripping entirely.
/// Without it, a single trailing digit `1`..=`9` is read as the legacy page
/// marker. A trailing `0` is never a page marker, and a one-character
/// segment is never split.
pub fn decode_post_param(raw: &str, from: Option<u32>) -> PostLocator {
    if let Some(page) = from {
        return PostLocator {
            uid: raw.to_string(),
            origin_page: page.max(1),
            fallback_uid: None,
        };
    }

    let mut chars = raw.chars();
    if let Some(last) = chars.next_back() {
        let stem = chars.as_str();
        if !stem.is_empty() && last.is_ascii_digit() && last != '0' {
            let page = u32::from(last as u8 - b'0');
            return PostLocator {
                uid: stem.to_string(),
                origin_page: page,
                fallback_uid: Some(raw.to_string()),
            };
        }
    }

    PostLocator {
        uid: raw.to_string(),
        origin_page: 1,
        fallback_uid: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_digit_is_read_as_the_origin_page() {
        let locator = decode_post_param("my-post2", None);
        assert_eq!(locator.uid, "my-post");
        assert_eq!(locator.origin_page, 2);
        assert_eq!(locator.fallback_uid.as_deref(), Some("my-post2"));
    }

    #[test]
    fn segments_without_a_digit_default_to_page_one() {
        let locator = decode_post_param("my-post", None);
        assert_eq!(locator.uid, "my-post");
        assert_eq!(locator.origin_page, 1);
        assert_eq!(locator.fallback_uid, None);
    }

    #[test]
    fn explicit_from_parameter_suppresses_digit_stripping() {
        let locator = decode_post_param("launch-2024", Some(3));
        assert_eq!(locator.uid, "launch-2024");
        assert_eq!(locator.origin_page, 3);
        assert_eq!(locator.fallback_uid, None);
    }

    #[test]
    fn digit_final_uids_keep_the_raw_segment_as_fallback() {
        let locator = decode_post_param("launch-2024", None);
        assert_eq!(locator.uid, "launch-202");
        assert_eq!(locator.origin_page, 4);
        assert_eq!(locator.fallback_uid.as_deref(), Some("launch-2024"));
    }

    #[test]
    fn single_character_segments_are_never_split() {
        let locator = decode_post_param("7", None);
        assert_eq!(locator.uid, "7");
        assert_eq!(locator.origin_page, 1);
        assert_eq!(locator.fallback_uid, None);
    }

    #[test]
    fn trailing_zero_is_not_a_page_marker() {
        let locator = decode_post_param("my-post0", None);
        assert_eq!(locator.uid, "my-post0");
        assert_eq!(locator.origin_page, 1);
    }

    #[test]
    fn from_zero_clamps_to_the_first_page() {
        let locator = decode_post_param("my-post", Some(0));
        assert_eq!(locator.origin_page, 1);
    }
}
