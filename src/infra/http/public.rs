use std::sync::Arc;

use askama::Template;
use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use datastar::prelude::ElementPatchMode;
use metrics::counter;
use serde::Deserialize;
use tracing::warn;

use crate::{
    application::{
        chrome::ChromeService,
        error::{ErrorReport, HttpError},
        feed::{self, FeedError, FeedService},
        repos::ContentError,
        stream::StreamBuilder,
    },
    domain::route::decode_post_param,
    presentation::views::{
        FeedErrorContext, FeedErrorTemplate, FeedLoaderContext, IndexTemplate, LayoutChrome,
        LayoutContext, NavigationContext, PageContext, PageMetaView, PostDetailContext,
        PostNavigationTemplate, PostTemplate, PostsPartial, TemplateRenderError,
        render_not_found_response, render_template_response, render_unavailable_response,
    },
};

use super::{
    DATASTAR_REQUEST_HEADER, content_health_response,
    middleware::{log_responses, set_request_context},
};

const METRIC_FEED_APPEND_TOTAL: &str = "vetrina_feed_append_total";

/// Cookie set by the CMS preview toolbar; its value is the preview ref
/// passed through on document lookups.
const PREVIEW_COOKIE: &str = "preview-ref";

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub chrome: Arc<ChromeService>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/post/{slug}", get(post_detail))
        .route("/ui/posts", get(posts_partial))
        .route("/ui/post-nav", get(post_navigation))
        .route("/_health/content", get(content_health))
        .route("/favicon.ico", get(crate::infra::assets::serve_favicon))
        .route("/static/{*path}", get(crate::infra::assets::serve_site))
        .fallback(fallback_router)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CursorQuery {
    cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FromQuery {
    from: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NavQuery {
    page: u32,
}

async fn index(State(state): State<HttpState>, jar: CookieJar) -> Response {
    let chrome = state.chrome.load(preview_ref(&jar).is_some());

    match state.feed.page_context().await {
        Ok(content) => {
            let view = LayoutContext::new(chrome, content);
            render_template_response(IndexTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    Path(slug): Path<String>,
    Query(query): Query<FromQuery>,
    jar: CookieJar,
) -> Response {
    let preview = preview_ref(&jar);
    let chrome = state.chrome.load(preview.is_some());
    let locator = decode_post_param(&slug, query.from);

    match state.feed.post_detail(&locator, preview.as_deref()).await {
        Ok(Some(content)) => {
            let meta = post_meta(&chrome, &content);
            let view = LayoutContext::new(chrome.clone().with_meta(meta), content);
            render_template_response(PostTemplate { view }, StatusCode::OK)
        }
        Ok(None) => render_not_found_response(chrome),
        Err(err) => feed_error_to_response(err, chrome),
    }
}

/// Feed follow-ups. Datastar requests get an SSE exchange that appends
/// cards and updates the loader in place; anything else gets the plain
/// HTML fragment so the page still works without scripting.
async fn posts_partial(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Query(query): Query<CursorQuery>,
) -> Result<Response, HttpError> {
    let is_datastar = headers.contains_key(DATASTAR_REQUEST_HEADER);

    let Some(cursor) = query.cursor.as_deref() else {
        let content = state.feed.page_context().await?;
        return Ok(render_template_response(
            PostsPartial { content },
            StatusCode::OK,
        ));
    };

    if is_datastar {
        return append_exchange(&state, cursor).await;
    }

    match state.feed.append_payload(cursor).await? {
        Some(payload) => {
            let content = PageContext {
                has_results: !payload.cards.is_empty(),
                posts: payload.cards,
                loader: FeedLoaderContext {
                    next_cursor: payload.next_cursor,
                },
            };
            Ok(render_template_response(
                PostsPartial { content },
                StatusCode::OK,
            ))
        }
        // Exhausted cursor: nothing to add and nothing to re-render.
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn append_exchange(state: &HttpState, cursor: &str) -> Result<Response, HttpError> {
    match state.feed.append_payload(cursor).await {
        Ok(Some(payload)) => {
            counter!(METRIC_FEED_APPEND_TOTAL).increment(1);
            Ok(feed::build_datastar_append_response(payload)?)
        }
        // The follow guard refused the cursor. Clear the client's loading
        // signal and leave the page untouched.
        Ok(None) => {
            let mut stream = StreamBuilder::new();
            stream.push_signals(r#"{"feedLoading": false}"#);
            Ok(stream.into_response())
        }
        // Tampered tokens are rejected like malformed cursors, not retried.
        Err(err @ FeedError::Content(ContentError::ForeignPageToken { .. })) => {
            Err(HttpError::from(err))
        }
        Err(FeedError::Content(err)) => {
            warn!(
                target = "vetrina::http",
                error = %err,
                "feed follow-up failed; offering inline retry"
            );
            feed_retry_response(cursor)
        }
        Err(err) => Err(HttpError::from(err)),
    }
}

/// Swap the loader slot for an inline failure notice that can retry the
/// same cursor, and clear the loading signal.
fn feed_retry_response(cursor: &str) -> Result<Response, HttpError> {
    let html = FeedErrorTemplate {
        view: FeedErrorContext {
            cursor: cursor.to_string(),
        },
    }
    .render()
    .map_err(|err| {
        HttpError::from(TemplateRenderError::new(
            "infra::http::public::feed_retry_response",
            "Template rendering failed",
            err,
        ))
    })?;

    let mut stream = StreamBuilder::new();
    stream.push_patch(html, "#feed-sentinel-container", ElementPatchMode::Inner);
    stream.push_signals(r#"{"feedLoading": false}"#);
    Ok(stream.into_response())
}

/// Previous/next links for a post, fetched by the detail page after it
/// loads. A content failure degrades to an empty rail rather than
/// breaking the page around it.
async fn post_navigation(
    State(state): State<HttpState>,
    Query(query): Query<NavQuery>,
) -> Result<Response, HttpError> {
    let nav = match state.feed.post_navigation(query.page).await {
        Ok(nav) => nav,
        Err(err) => {
            warn!(
                target = "vetrina::http",
                error = %err,
                page = query.page,
                "post navigation lookup failed; rendering empty links"
            );
            NavigationContext::empty()
        }
    };

    let html = PostNavigationTemplate { view: nav }.render().map_err(|err| {
        HttpError::from(TemplateRenderError::new(
            "infra::http::public::post_navigation",
            "Template rendering failed",
            err,
        ))
    })?;

    let mut stream = StreamBuilder::new();
    stream.push_patch(html, "#post-navigation", ElementPatchMode::Inner);
    Ok(stream.into_response())
}

async fn content_health(State(state): State<HttpState>) -> Response {
    content_health_response(state.feed.health().await)
}

async fn fallback_router(State(state): State<HttpState>, jar: CookieJar) -> Response {
    let chrome = state.chrome.load(preview_ref(&jar).is_some());
    render_not_found_response(chrome)
}

/// Full-page feed failures keep the site chrome: an unreachable content
/// service renders the styled unavailable page instead of a bare status.
fn feed_error_to_response(err: FeedError, chrome: LayoutChrome) -> Response {
    match err {
        err @ FeedError::Content(ContentError::ForeignPageToken { .. }) => {
            HttpError::from(err).into_response()
        }
        FeedError::Content(err) => {
            let report = ErrorReport::from_error(
                "infra::http::feed_error_to_response",
                StatusCode::BAD_GATEWAY,
                &err,
            );
            render_unavailable_response(chrome, report)
        }
        err => HttpError::from(err).into_response(),
    }
}

fn post_meta(chrome: &LayoutChrome, content: &PostDetailContext) -> PageMetaView {
    chrome.meta.clone().with_content(
        format!("{} | {}", content.title, chrome.brand.title),
        chrome.meta.description.clone(),
    )
}

fn preview_ref(jar: &CookieJar) -> Option<String> {
    jar.get(PREVIEW_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

