use crate::application::error::{ErrorReport, HttpError};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let content = ErrorPageView::not_found();
    let view = LayoutContext::new(chrome, content);
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Full-page failure view for when the content service cannot be reached.
/// The caller supplies the report so the log line carries the real cause.
pub fn render_unavailable_response(chrome: LayoutChrome, report: ErrorReport) -> Response {
    let content = ErrorPageView::content_unavailable();
    let view = LayoutContext::new(chrome, content);
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::BAD_GATEWAY);
    report.attach(&mut response);
    response
}

#[derive(Clone)]
pub struct BrandView {
    pub title: String,
    pub tagline: String,
    pub href: String,
}

#[derive(Clone)]
pub struct FooterView {
    pub copy: String,
}

#[derive(Clone)]
pub struct PageMetaView {
    pub title: String,
    pub description: String,
}

impl PageMetaView {
    pub fn with_content(self, title: String, description: String) -> Self {
        Self { title, description }
    }
}

/// Preview banner state for the current request.
#[derive(Clone)]
pub struct PreviewView {
    pub active: bool,
    pub exit_path: String,
}

#[derive(Clone)]
pub struct LayoutChrome {
    pub brand: BrandView,
    pub footer: FooterView,
    pub meta: PageMetaView,
    pub preview: PreviewView,
}

impl LayoutChrome {
    pub fn with_meta(self, meta: PageMetaView) -> Self {
        Self { meta, ..self }
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub brand: BrandView,
    pub footer: FooterView,
    pub meta: PageMetaView,
    pub preview: PreviewView,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            brand: chrome.brand,
            footer: chrome.footer,
            meta: chrome.meta,
            preview: chrome.preview,
            content,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PostCard {
    pub slug: String,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub iso_date: String,
    pub published: String,
    /// 1-based position of this post in the overall feed, newest first.
    /// Carried into the post link so the detail page can anchor its
    /// previous/next lookups without re-walking the feed.
    pub page: u32,
}

pub struct PageContext {
    pub posts: Vec<PostCard>,
    pub has_results: bool,
    pub loader: FeedLoaderContext,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<PageContext>,
}

#[derive(Template)]
#[template(path = "partials/content.html")]
pub struct PostsPartial {
    pub content: PageContext,
}

pub struct FeedLoaderContext {
    pub next_cursor: Option<String>,
}

#[derive(Template)]
#[template(path = "partials/feed_loader.html")]
pub struct FeedLoaderTemplate {
    pub view: FeedLoaderContext,
}

#[derive(Template)]
#[template(path = "partials/post_cards_append.html")]
pub struct PostCardsAppendTemplate {
    pub posts: Vec<PostCard>,
}

/// Inline failure state swapped into the loader slot when a follow-up
/// fetch fails. Keeps the cursor so the reader can retry the same page.
pub struct FeedErrorContext {
    pub cursor: String,
}

#[derive(Template)]
#[template(path = "partials/feed_error.html")]
pub struct FeedErrorTemplate {
    pub view: FeedErrorContext,
}

#[derive(Clone)]
pub struct ContentGroupView {
    pub heading: String,
    pub body_html: String,
}

pub struct PostDetailContext {
    pub uid: String,
    pub title: String,
    pub author: String,
    pub banner_url: Option<String>,
    pub published: String,
    pub iso_date: String,
    pub read_minutes: usize,
    pub edited_stamp: Option<String>,
    pub groups: Vec<ContentGroupView>,
    /// Feed position the reader navigated from, used to seed the
    /// previous/next lookup.
    pub origin_page: u32,
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub view: LayoutContext<PostDetailContext>,
}

#[derive(Clone)]
pub struct NavLinkView {
    pub title: String,
    pub href: String,
}

pub struct NavigationContext {
    pub previous: Option<NavLinkView>,
    pub next: Option<NavLinkView>,
}

impl NavigationContext {
    pub fn empty() -> Self {
        Self {
            previous: None,
            next: None,
        }
    }
}

#[derive(Template)]
#[template(path = "partials/post_navigation.html")]
pub struct PostNavigationTemplate {
    pub view: NavigationContext,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
    pub primary_action: Option<ErrorAction>,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page Not Found".to_string(),
            message: "The page you requested does not exist. Try returning to the homepage to continue exploring.".to_string(),
            primary_action: Some(ErrorAction::home()),
        }
    }

    pub fn content_unavailable() -> Self {
        Self {
            title: "Posts Unavailable".to_string(),
            message: "The content service could not be reached. Please try again in a moment."
                .to_string(),
            primary_action: Some(ErrorAction::home()),
        }
    }
}

pub struct ErrorAction {
    pub href: String,
    pub label: String,
}

impl ErrorAction {
    pub fn home() -> Self {
        Self {
            href: "/".to_string(),
            label: "Back to home".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}
