use std::collections::HashSet;
use std::sync::Arc;

use ammonia::Builder as AmmoniaBuilder;
use askama::Template;
use axum::response::Response;
use datastar::prelude::ElementPatchMode;
use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::warn;

use crate::application::error::HttpError;
use crate::application::pagination::FeedCursor;
use crate::application::repos::{ContentError, ContentRepo, SummaryBatch};
use crate::application::stream::StreamBuilder;
use crate::domain::posts::{self, PostDetail, PostSummary};
use crate::domain::rich_text::render_blocks;
use crate::domain::route::PostLocator;
use crate::presentation::views::{
    ContentGroupView, FeedLoaderContext, FeedLoaderTemplate, NavLinkView, NavigationContext,
    PageContext, PostCard, PostCardsAppendTemplate, PostDetailContext, TemplateRenderError,
};

/// Cards plus the follow-up cursor for one appended feed page.
#[derive(Clone, Debug)]
pub struct AppendPayload {
    pub cards: Vec<PostCard>,
    /// Encoded cursor for the next follow-up, absent once the feed is done.
    pub next_cursor: Option<String>,
}

#[derive(Clone)]
pub struct FeedService {
    content: Arc<dyn ContentRepo>,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error(transparent)]
    Content(#[from] ContentError),
}

impl FeedService {
    pub fn new(content: Arc<dyn ContentRepo>) -> Self {
        Self { content }
    }

    /// Assemble the initial listing page.
    pub async fn page_context(&self) -> Result<PageContext, FeedError> {
        let batch = self.content.first_page().await?;
        let cards = batch_to_cards(&batch);
        let next_cursor = encode_follow_cursor(&batch);

        Ok(PageContext {
            has_results: !cards.is_empty(),
            posts: cards,
            loader: FeedLoaderContext { next_cursor },
        })
    }

    /// Load one more feed page for an encoded cursor.
    ///
    /// Returns `Ok(None)` when the cursor is exhausted past page 1, which is
    /// a deliberate no-op: no upstream call is made and nothing changes for
    /// the client. A cursor still on page 1 without a token is allowed one
    /// follow-up, which appends nothing and retires the loader.
    pub async fn append_payload(&self, raw_cursor: &str) -> Result<Option<AppendPayload>, FeedError> {
        let cursor =
            FeedCursor::decode(raw_cursor).map_err(|err| FeedError::InvalidCursor(err.to_string()))?;

        if !cursor.allows_follow() {
            return Ok(None);
        }

        let Some(token) = cursor.next_page() else {
            // Page 1 without a token: honor the single permitted follow-up
            // by reporting an empty page and no further cursor.
            return Ok(Some(AppendPayload {
                cards: Vec::new(),
                next_cursor: None,
            }));
        };

        let batch = self.content.follow_page(token).await?;
        let cards = batch_to_cards(&batch);
        let next_cursor = encode_follow_cursor(&batch);

        Ok(Some(AppendPayload { cards, next_cursor }))
    }

    /// Resolve one post for display, including the legacy fallback lookup
    /// for uids that genuinely end in a digit.
    pub async fn post_detail(
        &self,
        locator: &PostLocator,
        preview_ref: Option<&str>,
    ) -> Result<Option<PostDetailContext>, FeedError> {
        if let Some(detail) = self
            .content
            .document_by_uid(&locator.uid, preview_ref)
            .await?
        {
            return Ok(Some(build_post_context(detail, locator.origin_page)));
        }

        let Some(fallback) = locator.fallback_uid.as_deref() else {
            return Ok(None);
        };

        // The stripped digit was part of the uid after all, so the derived
        // origin page is meaningless; fall back to the front of the feed.
        let detail = self.content.document_by_uid(fallback, preview_ref).await?;
        Ok(detail.map(|detail| build_post_context(detail, 1)))
    }

    /// Resolve the previous/next links around one feed position. A failed
    /// neighbor lookup degrades to an absent link rather than an error.
    pub async fn post_navigation(&self, page: u32) -> Result<NavigationContext, FeedError> {
        let frame = self.content.pagination_frame(page.max(1)).await?;
        let (previous, next) = tokio::join!(
            self.resolve_neighbor(frame.prev_page.as_deref()),
            self.resolve_neighbor(frame.next_page.as_deref()),
        );

        Ok(NavigationContext { previous, next })
    }

    pub async fn health(&self) -> Result<(), FeedError> {
        self.content.health_probe().await.map_err(FeedError::from)
    }

    async fn resolve_neighbor(&self, token: Option<&str>) -> Option<NavLinkView> {
        let token = token?;
        match self.content.neighbor(token).await {
            Ok(Some(neighbor)) => Some(NavLinkView {
                title: neighbor.title,
                href: format!("/post/{}?from={}", neighbor.uid, neighbor.page),
            }),
            Ok(None) => None,
            Err(err) => {
                warn!(
                    target = "vetrina::feed",
                    error = %err,
                    "neighbor lookup failed; dropping navigation link"
                );
                None
            }
        }
    }
}

fn batch_to_cards(batch: &SummaryBatch) -> Vec<PostCard> {
    batch.results.iter().map(summary_to_card).collect()
}

fn summary_to_card(summary: &PostSummary) -> PostCard {
    PostCard {
        slug: summary.uid.clone(),
        title: summary.title.clone(),
        subtitle: summary.subtitle.clone(),
        author: summary.author.clone(),
        iso_date: posts::format_iso_date(summary.published_at),
        published: posts::format_display_date(summary.published_at),
        page: summary.page,
    }
}

/// Encode the cursor a client needs for its next follow-up, or `None` when
/// no further request should be offered.
fn encode_follow_cursor(batch: &SummaryBatch) -> Option<String> {
    let cursor = FeedCursor::new(batch.next_page.clone(), batch.page);
    cursor.allows_follow().then(|| cursor.encode())
}

/// Sanitizer restricted to the tags the rich text renderer emits.
static BODY_SANITIZER: Lazy<AmmoniaBuilder<'static>> = Lazy::new(build_body_sanitizer);

fn build_body_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();

    let tags: HashSet<&'static str> = HashSet::from([
        "a", "em", "strong", "p", "pre", "ul", "ol", "li", "img", "h1", "h2", "h3", "h4", "h5",
        "h6",
    ]);
    builder.tags(tags);

    builder.add_tag_attributes("a", &["href"]);
    builder.add_tag_attributes("img", &["src", "alt"]);
    builder.add_url_schemes(["http", "https", "mailto"].iter().copied());

    builder
}

fn build_post_context(detail: PostDetail, origin_page: u32) -> PostDetailContext {
    let groups = detail
        .content
        .iter()
        .map(|group| ContentGroupView {
            heading: group.heading.clone(),
            body_html: BODY_SANITIZER.clean(&render_blocks(&group.body)).to_string(),
        })
        .collect();

    PostDetailContext {
        read_minutes: detail.read_minutes(),
        uid: detail.uid,
        title: detail.title,
        author: detail.author,
        banner_url: detail.banner_url,
        published: posts::format_display_date(detail.published_at),
        iso_date: posts::format_iso_date(detail.published_at),
        edited_stamp: detail.edited_at.map(posts::format_edited_stamp),
        groups,
        origin_page,
    }
}

/// Build the SSE response that appends freshly loaded cards, swaps the
/// loader for its next state, and clears the client's loading signal.
pub fn build_datastar_append_response(payload: AppendPayload) -> Result<Response, HttpError> {
    let AppendPayload { cards, next_cursor } = payload;

    let cards_html = if cards.is_empty() {
        None
    } else {
        let template = PostCardsAppendTemplate { posts: cards };
        Some(template.render().map_err(|err| {
            HttpError::from(TemplateRenderError::new(
                "application::feed::build_datastar_append_response",
                "Template rendering failed",
                err,
            ))
        })?)
    };

    let loader_html = FeedLoaderTemplate {
        view: FeedLoaderContext { next_cursor },
    }
    .render()
    .map_err(|err| {
        HttpError::from(TemplateRenderError::new(
            "application::feed::build_datastar_append_response",
            "Template rendering failed",
            err,
        ))
    })?;

    let mut stream = StreamBuilder::new();

    if let Some(html) = cards_html {
        stream.push_patch(html, "#post-grid", ElementPatchMode::Append);
    }

    stream.push_patch(
        loader_html,
        "#feed-sentinel-container",
        ElementPatchMode::Inner,
    );

    stream.push_signals(r#"{"feedLoading": false}"#);

    Ok(stream.into_response())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::application::repos::{NavNeighbor, PageFrame};
    use crate::domain::posts::parse_api_timestamp;
    use crate::domain::route::decode_post_param;

    enum StubNeighbor {
        Found(NavNeighbor),
        Missing,
        Fails,
    }

    #[derive(Default)]
    struct StubContent {
        first: Option<SummaryBatch>,
        follows: Mutex<HashMap<String, SummaryBatch>>,
        documents: Mutex<HashMap<String, PostDetail>>,
        frames: Mutex<HashMap<u32, PageFrame>>,
        neighbors: Mutex<HashMap<String, StubNeighbor>>,
        upstream_calls: AtomicUsize,
    }

    impl StubContent {
        fn calls(&self) -> usize {
            self.upstream_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContentRepo for StubContent {
        async fn first_page(&self) -> Result<SummaryBatch, ContentError> {
            self.upstream_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.first.clone().expect("stubbed first page"))
        }

        async fn follow_page(&self, token: &str) -> Result<SummaryBatch, ContentError> {
            self.upstream_calls.fetch_add(1, Ordering::SeqCst);
            self.follows
                .lock()
                .unwrap()
                .get(token)
                .cloned()
                .ok_or_else(|| ContentError::Transport(format!("unscripted token {token}")))
        }

        async fn document_by_uid(
            &self,
            uid: &str,
            _preview_ref: Option<&str>,
        ) -> Result<Option<PostDetail>, ContentError> {
            self.upstream_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.documents.lock().unwrap().get(uid).cloned())
        }

        async fn pagination_frame(&self, page: u32) -> Result<PageFrame, ContentError> {
            self.upstream_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .frames
                .lock()
                .unwrap()
                .get(&page)
                .cloned()
                .unwrap_or_default())
        }

        async fn neighbor(&self, token: &str) -> Result<Option<NavNeighbor>, ContentError> {
            self.upstream_calls.fetch_add(1, Ordering::SeqCst);
            match self.neighbors.lock().unwrap().get(token) {
                Some(StubNeighbor::Found(neighbor)) => Ok(Some(neighbor.clone())),
                Some(StubNeighbor::Missing) | None => Ok(None),
                Some(StubNeighbor::Fails) => {
                    Err(ContentError::Transport("stubbed failure".to_string()))
                }
            }
        }

        async fn health_probe(&self) -> Result<(), ContentError> {
            self.upstream_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn summary(uid: &str, page: u32) -> PostSummary {
        PostSummary {
            uid: uid.to_string(),
            title: format!("Title {uid}"),
            subtitle: "Subtitle".to_string(),
            author: "Ada".to_string(),
            published_at: parse_api_timestamp("2021-03-25T19:25:28+0000").unwrap(),
            page,
        }
    }

    fn batch(uids: &[&str], page: u32, next_page: Option<&str>) -> SummaryBatch {
        SummaryBatch {
            results: uids
                .iter()
                .enumerate()
                .map(|(i, uid)| summary(uid, (page - 1) * uids.len() as u32 + i as u32 + 1))
                .collect(),
            next_page: next_page.map(str::to_string),
            page,
        }
    }

    fn detail(uid: &str) -> PostDetail {
        PostDetail {
            uid: uid.to_string(),
            title: format!("Title {uid}"),
            author: "Ada".to_string(),
            banner_url: None,
            published_at: parse_api_timestamp("2021-03-25T19:25:28+0000").unwrap(),
            edited_at: None,
            content: Vec::new(),
        }
    }

    fn service(stub: StubContent) -> (FeedService, Arc<StubContent>) {
        let stub = Arc::new(stub);
        (FeedService::new(stub.clone()), stub)
    }

    #[tokio::test]
    async fn initial_page_reports_cards_and_a_follow_cursor() {
        let (service, _stub) = service(StubContent {
            first: Some(batch(&["one", "two"], 1, Some("https://api.example/p2"))),
            ..StubContent::default()
        });

        let context = service.page_context().await.expect("page context");
        assert!(context.has_results);
        assert_eq!(context.posts.len(), 2);

        let encoded = context.loader.next_cursor.expect("follow cursor");
        let cursor = FeedCursor::decode(&encoded).expect("decoded cursor");
        assert_eq!(cursor.next_page(), Some("https://api.example/p2"));
        assert_eq!(cursor.page(), 1);
    }

    #[tokio::test]
    async fn appended_pages_arrive_in_order_without_duplicates() {
        let stub = StubContent {
            first: Some(batch(&["a", "b"], 1, Some("tok2"))),
            ..StubContent::default()
        };
        stub.follows
            .lock()
            .unwrap()
            .insert("tok2".to_string(), batch(&["c", "d"], 2, Some("tok3")));
        stub.follows
            .lock()
            .unwrap()
            .insert("tok3".to_string(), batch(&["e"], 3, None));
        let (service, _stub) = service(stub);

        let mut shown: Vec<String> = Vec::new();
        let context = service.page_context().await.expect("page context");
        shown.extend(context.posts.iter().map(|card| card.slug.clone()));
        let mut cursor = context.loader.next_cursor;

        while let Some(encoded) = cursor {
            let payload = service
                .append_payload(&encoded)
                .await
                .expect("append")
                .expect("allowed follow");
            shown.extend(payload.cards.iter().map(|card| card.slug.clone()));
            cursor = payload.next_cursor;
        }

        assert_eq!(shown, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn exhausted_cursor_past_page_one_is_a_no_op() {
        let (service, stub) = service(StubContent::default());
        let encoded = FeedCursor::new(None, 3).encode();

        let payload = service.append_payload(&encoded).await.expect("append");
        assert!(payload.is_none());
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn first_page_without_token_gets_one_empty_follow_up() {
        let (service, stub) = service(StubContent::default());
        let encoded = FeedCursor::new(None, 1).encode();

        let payload = service
            .append_payload(&encoded)
            .await
            .expect("append")
            .expect("allowed follow");
        assert!(payload.cards.is_empty());
        assert!(payload.next_cursor.is_none());
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn garbage_cursor_is_rejected_before_any_fetch() {
        let (service, stub) = service(StubContent::default());

        let err = service.append_payload("@@@").await.unwrap_err();
        assert!(matches!(err, FeedError::InvalidCursor(_)));
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn post_detail_resolves_the_stripped_uid_first() {
        let stub = StubContent::default();
        stub.documents
            .lock()
            .unwrap()
            .insert("my-post".to_string(), detail("my-post"));
        let (service, _stub) = service(stub);

        let locator = decode_post_param("my-post2", None);
        let context = service
            .post_detail(&locator, None)
            .await
            .expect("lookup")
            .expect("post found");
        assert_eq!(context.uid, "my-post");
        assert_eq!(context.origin_page, 2);
    }

    #[tokio::test]
    async fn post_detail_falls_back_to_the_raw_segment() {
        let stub = StubContent::default();
        stub.documents
            .lock()
            .unwrap()
            .insert("launch-2024".to_string(), detail("launch-2024"));
        let (service, _stub) = service(stub);

        let locator = decode_post_param("launch-2024", None);
        let context = service
            .post_detail(&locator, None)
            .await
            .expect("lookup")
            .expect("post found");
        assert_eq!(context.uid, "launch-2024");
        assert_eq!(context.origin_page, 1);
    }

    #[tokio::test]
    async fn post_detail_misses_report_none() {
        let (service, _stub) = service(StubContent::default());

        let locator = decode_post_param("unknown", None);
        let context = service.post_detail(&locator, None).await.expect("lookup");
        assert!(context.is_none());
    }

    #[tokio::test]
    async fn navigation_resolves_both_neighbors() {
        let stub = StubContent::default();
        stub.frames.lock().unwrap().insert(
            2,
            PageFrame {
                prev_page: Some("prev-tok".to_string()),
                next_page: Some("next-tok".to_string()),
            },
        );
        stub.neighbors.lock().unwrap().insert(
            "prev-tok".to_string(),
            StubNeighbor::Found(NavNeighbor {
                page: 1,
                uid: "newer".to_string(),
                title: "Newer".to_string(),
            }),
        );
        stub.neighbors.lock().unwrap().insert(
            "next-tok".to_string(),
            StubNeighbor::Found(NavNeighbor {
                page: 3,
                uid: "older".to_string(),
                title: "Older".to_string(),
            }),
        );
        let (service, _stub) = service(stub);

        let nav = service.post_navigation(2).await.expect("navigation");
        let previous = nav.previous.expect("previous link");
        let next = nav.next.expect("next link");
        assert_eq!(previous.href, "/post/newer?from=1");
        assert_eq!(next.title, "Older");
        assert_eq!(next.href, "/post/older?from=3");
    }

    #[tokio::test]
    async fn failed_neighbor_lookup_degrades_to_an_absent_link() {
        let stub = StubContent::default();
        stub.frames.lock().unwrap().insert(
            2,
            PageFrame {
                prev_page: Some("prev-tok".to_string()),
                next_page: Some("next-tok".to_string()),
            },
        );
        stub.neighbors
            .lock()
            .unwrap()
            .insert("prev-tok".to_string(), StubNeighbor::Fails);
        stub.neighbors.lock().unwrap().insert(
            "next-tok".to_string(),
            StubNeighbor::Found(NavNeighbor {
                page: 3,
                uid: "older".to_string(),
                title: "Older".to_string(),
            }),
        );
        let (service, _stub) = service(stub);

        let nav = service.post_navigation(2).await.expect("navigation");
        assert!(nav.previous.is_none());
        assert!(nav.next.is_some());
    }

    #[tokio::test]
    async fn edge_of_feed_leaves_neighbors_absent() {
        let (service, _stub) = service(StubContent::default());

        let nav = service.post_navigation(1).await.expect("navigation");
        assert!(nav.previous.is_none());
        assert!(nav.next.is_none());
    }

    #[test]
    fn edited_posts_carry_a_formatted_stamp() {
        let mut edited = detail("stamped");
        edited.edited_at = Some(parse_api_timestamp("2021-03-26T10:00:00+0000").unwrap());

        let context = build_post_context(edited, 1);
        assert_eq!(context.edited_stamp.as_deref(), Some("26 Mar 2021, 10:00"));

        let context = build_post_context(detail("plain"), 1);
        assert!(context.edited_stamp.is_none());
    }

    #[test]
    fn body_html_is_sanitized() {
        use crate::domain::posts::ContentGroup;
        use crate::domain::rich_text::{Block, RichText};

        let mut raw = detail("scripted");
        raw.content = vec![ContentGroup {
            heading: "Heading".to_string(),
            body: vec![Block::Paragraph(RichText::plain("safe text"))],
        }];

        let context = build_post_context(raw, 1);
        assert_eq!(context.groups.len(), 1);
        assert!(context.groups[0].body_html.contains("safe text"));
        assert!(!context.groups[0].body_html.contains("<script"));
    }

    #[test]
    fn body_links_with_disallowed_schemes_lose_their_href() {
        use crate::domain::posts::ContentGroup;
        use crate::domain::rich_text::{Block, RichText, Span, SpanKind};

        let mut raw = detail("linked");
        raw.content = vec![ContentGroup {
            heading: "Heading".to_string(),
            body: vec![Block::Paragraph(RichText {
                text: "here".to_string(),
                spans: vec![Span {
                    start: 0,
                    end: 4,
                    kind: SpanKind::Hyperlink {
                        url: "javascript:alert(1)".to_string(),
                    },
                }],
            })],
        }];

        let context = build_post_context(raw, 1);
        assert!(context.groups[0].body_html.contains("here"));
        assert!(!context.groups[0].body_html.contains("javascript:"));
    }
}
