//! Wire format of the content API search endpoint.
//!
//! Decoding is deliberately forgiving about presentation fields: missing
//! titles and authors become empty strings and unknown rich-text block kinds
//! are skipped. Identity fields (uid, publication timestamp) are required,
//! since nothing downstream can render a document without them.

use serde::Deserialize;

use crate::application::repos::{ContentError, NavNeighbor, PageFrame, SummaryBatch};
use crate::domain::posts::{ContentGroup, PostDetail, PostSummary, parse_api_timestamp};
use crate::domain::rich_text::{Block, RichText, Span, SpanKind};

#[derive(Debug, Deserialize)]
pub(super) struct ApiSearchResponse {
    #[serde(default)]
    pub results: Vec<ApiDocument>,
    #[serde(default)]
    pub next_page: Option<String>,
    #[serde(default)]
    pub prev_page: Option<String>,
    #[serde(default = "first_page_number")]
    pub page: u32,
}

fn first_page_number() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiDocument {
    pub uid: Option<String>,
    pub first_publication_date: Option<String>,
    #[serde(default)]
    pub last_publication_date: Option<String>,
    #[serde(default)]
    pub data: ApiDocumentData,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ApiDocumentData {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub banner: Option<ApiImage>,
    #[serde(default)]
    pub content: Vec<ApiContentGroup>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiImage {
    pub url: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiContentGroup {
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub body: Vec<ApiRichBlock>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiRichBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub spans: Vec<ApiSpan>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiSpan {
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Option<ApiSpanData>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiSpanData {
    #[serde(default)]
    pub url: Option<String>,
}

/// Turn one search response into a feed batch. `page_size` is the size the
/// feed queries with; it anchors each result's 1-based position in the
/// overall feed ordering.
pub(super) fn batch_from_response(
    response: ApiSearchResponse,
    page_size: u32,
) -> Result<SummaryBatch, ContentError> {
    let page = response.page.max(1);
    let mut results = Vec::with_capacity(response.results.len());
    for (index, doc) in response.results.iter().enumerate() {
        let ordinal = (page - 1) * page_size.max(1) + index as u32 + 1;
        results.push(summary_from_document(doc, ordinal)?);
    }

    Ok(SummaryBatch {
        results,
        next_page: response.next_page,
        page,
    })
}

pub(super) fn frame_from_response(response: ApiSearchResponse) -> PageFrame {
    PageFrame {
        prev_page: response.prev_page,
        next_page: response.next_page,
    }
}

pub(super) fn neighbor_from_response(
    response: &ApiSearchResponse,
) -> Result<Option<NavNeighbor>, ContentError> {
    let Some(doc) = response.results.first() else {
        return Ok(None);
    };
    let uid = doc
        .uid
        .clone()
        .ok_or_else(|| ContentError::Decode("document missing uid".to_string()))?;

    Ok(Some(NavNeighbor {
        page: response.page.max(1),
        uid,
        title: doc.data.title.clone().unwrap_or_default(),
    }))
}

fn summary_from_document(doc: &ApiDocument, ordinal: u32) -> Result<PostSummary, ContentError> {
    let uid = doc
        .uid
        .clone()
        .ok_or_else(|| ContentError::Decode("document missing uid".to_string()))?;
    let raw_date = doc.first_publication_date.as_deref().ok_or_else(|| {
        ContentError::Decode(format!("document `{uid}` missing first_publication_date"))
    })?;
    let published_at = parse_api_timestamp(raw_date).map_err(ContentError::from_decode)?;

    Ok(PostSummary {
        uid,
        title: doc.data.title.clone().unwrap_or_default(),
        subtitle: doc.data.subtitle.clone().unwrap_or_default(),
        author: doc.data.author.clone().unwrap_or_default(),
        published_at,
        page: ordinal,
    })
}

pub(super) fn detail_from_document(doc: ApiDocument) -> Result<PostDetail, ContentError> {
    let uid = doc
        .uid
        .ok_or_else(|| ContentError::Decode("document missing uid".to_string()))?;
    let first_raw = doc.first_publication_date.as_deref().ok_or_else(|| {
        ContentError::Decode(format!("document `{uid}` missing first_publication_date"))
    })?;
    let published_at = parse_api_timestamp(first_raw).map_err(ContentError::from_decode)?;

    // Edited status compares the raw strings: the API re-stamps the last
    // publication date on every republish, so any difference counts.
    let edited_at = match doc.last_publication_date.as_deref() {
        Some(last) if last != first_raw => {
            Some(parse_api_timestamp(last).map_err(ContentError::from_decode)?)
        }
        _ => None,
    };

    let content = doc.data.content.iter().map(group_from_api).collect();

    Ok(PostDetail {
        uid,
        title: doc.data.title.unwrap_or_default(),
        author: doc.data.author.unwrap_or_default(),
        banner_url: doc.data.banner.and_then(|banner| banner.url),
        published_at,
        edited_at,
        content,
    })
}

fn group_from_api(group: &ApiContentGroup) -> ContentGroup {
    ContentGroup {
        heading: group.heading.clone().unwrap_or_default(),
        body: group.body.iter().filter_map(block_from_api).collect(),
    }
}

fn block_from_api(block: &ApiRichBlock) -> Option<Block> {
    match block.kind.as_str() {
        "paragraph" => Some(Block::Paragraph(rich_from_api(block))),
        "preformatted" => Some(Block::Preformatted(rich_from_api(block))),
        "list-item" => Some(Block::ListItem(rich_from_api(block))),
        "o-list-item" => Some(Block::OrderedListItem(rich_from_api(block))),
        "image" => block.url.clone().map(|url| Block::Image {
            url,
            alt: block.alt.clone(),
        }),
        kind => kind
            .strip_prefix("heading")
            .and_then(|digits| digits.parse::<u8>().ok())
            .map(|level| Block::Heading {
                level,
                text: rich_from_api(block),
            }),
    }
}

fn rich_from_api(block: &ApiRichBlock) -> RichText {
    RichText {
        text: block.text.clone().unwrap_or_default(),
        spans: block.spans.iter().filter_map(span_from_api).collect(),
    }
}

fn span_from_api(span: &ApiSpan) -> Option<Span> {
    let kind = match span.kind.as_str() {
        "strong" => SpanKind::Strong,
        "em" => SpanKind::Em,
        "hyperlink" => SpanKind::Hyperlink {
            url: span.data.as_ref().and_then(|data| data.url.clone())?,
        },
        _ => return None,
    };

    Some(Span {
        start: span.start,
        end: span.end,
        kind,
    })
}
