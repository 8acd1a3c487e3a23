//! Feed cursor encoding shared between the page shell and partial requests.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FeedCursorPayload {
    next_page: Option<String>,
    page: u32,
}

/// Where the feed currently stands: the upstream token for the next page and
/// the 1-based number of the page rendered last.
///
/// Issued to the browser as an opaque string and replaced wholesale each time
/// a page is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCursor {
    next_page: Option<String>,
    page: u32,
}

impl FeedCursor {
    pub fn new(next_page: Option<String>, page: u32) -> Self {
        Self { next_page, page }
    }

    pub fn next_page(&self) -> Option<&str> {
        self.next_page.as_deref()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Whether a further page may be requested from this position.
    ///
    /// An exhausted cursor still allows a single request from page 1: the
    /// shell may have been rendered without a usable token, and that first
    /// follow-up is the only chance to find out whether more posts exist.
    pub fn allows_follow(&self) -> bool {
        self.next_page.is_some() || self.page == 1
    }

    pub fn encode(&self) -> String {
        let payload = FeedCursorPayload {
            next_page: self.next_page.clone(),
            page: self.page,
        };
        let serialized =
            serde_json::to_vec(&payload).expect("serializing feed cursor payload should succeed");
        URL_SAFE_NO_PAD.encode(serialized)
    }

    pub fn decode(cursor: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        let payload: FeedCursorPayload = serde_json::from_slice(&bytes)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(Self {
            next_page: payload.next_page,
            page: payload.page,
        })
    }
}

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_cursor_round_trip_with_token() {
        let cursor = FeedCursor::new(Some("https://api.example/page/2".to_string()), 1);
        let encoded = cursor.encode();
        let decoded = FeedCursor::decode(&encoded).expect("decoded cursor");

        assert_eq!(decoded.next_page(), Some("https://api.example/page/2"));
        assert_eq!(decoded.page(), 1);
    }

    #[test]
    fn feed_cursor_round_trip_when_exhausted() {
        let cursor = FeedCursor::new(None, 4);
        let decoded = FeedCursor::decode(&cursor.encode()).expect("decoded cursor");

        assert_eq!(decoded.next_page(), None);
        assert_eq!(decoded.page(), 4);
    }

    #[test]
    fn decoding_invalid_base64_reports_error() {
        let err = FeedCursor::decode("not!!valid##base64").unwrap_err();
        assert!(matches!(err, PaginationError::InvalidCursor(_)));
    }

    #[test]
    fn decoding_tampered_payload_reports_error() {
        let encoded = FeedCursor::new(Some("https://api.example/page/2".to_string()), 1).encode();
        let truncated = &encoded[..encoded.len() / 2];
        let err = FeedCursor::decode(truncated).unwrap_err();
        assert!(matches!(err, PaginationError::InvalidCursor(_)));
    }

    #[test]
    fn follow_is_allowed_while_a_token_remains() {
        assert!(FeedCursor::new(Some("token".to_string()), 7).allows_follow());
    }

    #[test]
    fn follow_is_allowed_once_from_the_first_page() {
        assert!(FeedCursor::new(None, 1).allows_follow());
    }

    #[test]
    fn follow_is_refused_when_exhausted_past_page_one() {
        assert!(!FeedCursor::new(None, 2).allows_follow());
    }
}
