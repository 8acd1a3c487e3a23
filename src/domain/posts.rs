use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::domain::rich_text::Block;

/// Reading speed assumed when estimating how long a post takes to read.
pub const WORDS_PER_MINUTE: usize = 200;

pub const DISPLAY_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[day padding:zero] [month repr:short] [year]");
pub const EDITED_STAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[day padding:zero] [month repr:short] [year], [hour padding:zero]:[minute padding:zero]"
);
pub const ISO_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month padding:zero]-[day padding:zero]");

// Some content APIs emit offsets without a colon ("+0000"), which strict
// RFC 3339 parsing rejects.
const COMPACT_OFFSET_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]"
);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized publication timestamp `{raw}`")]
pub struct TimestampError {
    raw: String,
}

/// Parse a publication timestamp as delivered by the content API.
///
/// Accepts strict RFC 3339 as well as the compact-offset variant
/// (`2021-03-25T19:25:28+0000`).
pub fn parse_api_timestamp(raw: &str) -> Result<OffsetDateTime, TimestampError> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(raw, COMPACT_OFFSET_FORMAT))
        .map_err(|_| TimestampError {
            raw: raw.to_string(),
        })
}

/// A post as it appears in the paginated feed.
#[derive(Debug, Clone, PartialEq)]
pub struct PostSummary {
    pub uid: String,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub published_at: OffsetDateTime,
    /// Feed page this summary was delivered on. Carried into post links so
    /// the post page can locate its neighbors without re-walking the feed.
    pub page: u32,
}

/// One heading-plus-body section of a post.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentGroup {
    /// May be empty; the API allows untitled sections.
    pub heading: String,
    pub body: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostDetail {
    pub uid: String,
    pub title: String,
    pub author: String,
    pub banner_url: Option<String>,
    pub published_at: OffsetDateTime,
    /// Present only when the post was edited after initial publication.
    pub edited_at: Option<OffsetDateTime>,
    pub content: Vec<ContentGroup>,
}

impl PostDetail {
    /// Total whitespace-separated words across all headings and body text.
    pub fn word_count(&self) -> usize {
        self.content
            .iter()
            .map(|group| {
                let heading_words = group.heading.split_whitespace().count();
                let body_words: usize = group
                    .body
                    .iter()
                    .map(|block| block.plain_text().split_whitespace().count())
                    .sum();
                heading_words + body_words
            })
            .sum()
    }

    /// Estimated reading time in whole minutes, rounded up.
    pub fn read_minutes(&self) -> usize {
        self.word_count().div_ceil(WORDS_PER_MINUTE)
    }
}

pub fn format_display_date(moment: OffsetDateTime) -> String {
    moment
        .format(DISPLAY_DATE_FORMAT)
        .expect("valid calendar date")
}

pub fn format_edited_stamp(moment: OffsetDateTime) -> String {
    moment
        .format(EDITED_STAMP_FORMAT)
        .expect("valid calendar date")
}

pub fn format_iso_date(moment: OffsetDateTime) -> String {
    moment.format(ISO_DATE_FORMAT).expect("valid calendar date")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rich_text::RichText;

    fn paragraph(text: &str) -> Block {
        Block::Paragraph(RichText::plain(text))
    }

    fn detail_with(content: Vec<ContentGroup>) -> PostDetail {
        PostDetail {
            uid: "sample".to_string(),
            title: "Sample".to_string(),
            author: "Ada".to_string(),
            banner_url: None,
            published_at: parse_api_timestamp("2021-03-25T19:25:28+0000").unwrap(),
            edited_at: None,
            content,
        }
    }

    #[test]
    fn parses_rfc3339_timestamps() {
        let moment = parse_api_timestamp("2021-03-25T19:25:28+00:00").unwrap();
        assert_eq!(moment.year(), 2021);
        assert_eq!(moment.hour(), 19);
    }

    #[test]
    fn parses_compact_offset_timestamps() {
        let moment = parse_api_timestamp("2021-03-25T19:25:28+0000").unwrap();
        assert_eq!(moment.year(), 2021);
        assert_eq!(moment.minute(), 25);
    }

    #[test]
    fn rejects_malformed_timestamps() {
        let err = parse_api_timestamp("yesterday at noon").unwrap_err();
        assert!(err.to_string().contains("yesterday at noon"));
    }

    #[test]
    fn formats_dates_for_display() {
        let moment = parse_api_timestamp("2021-03-25T19:25:28+0000").unwrap();
        assert_eq!(format_display_date(moment), "25 Mar 2021");
        assert_eq!(format_iso_date(moment), "2021-03-25");
        assert_eq!(format_edited_stamp(moment), "25 Mar 2021, 19:25");
    }

    #[test]
    fn counts_heading_and_body_words_together() {
        let detail = detail_with(vec![ContentGroup {
            heading: "Two words".to_string(),
            body: vec![paragraph("and three more")],
        }]);
        assert_eq!(detail.word_count(), 5);
        assert_eq!(detail.read_minutes(), 1);
    }

    #[test]
    fn reading_time_rounds_up_to_the_next_minute() {
        let words = (0..201).map(|n| format!("w{n}")).collect::<Vec<_>>();
        let detail = detail_with(vec![ContentGroup {
            heading: String::new(),
            body: vec![paragraph(&words.join(" "))],
        }]);
        assert_eq!(detail.word_count(), 201);
        assert_eq!(detail.read_minutes(), 2);
    }

    #[test]
    fn empty_sections_do_not_add_words() {
        let detail = detail_with(vec![ContentGroup {
            heading: String::new(),
            body: vec![paragraph("")],
        }]);
        assert_eq!(detail.word_count(), 0);
        assert_eq!(detail.read_minutes(), 0);
    }
}
