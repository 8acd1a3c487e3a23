//! Repository traits describing content API adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::posts::{PostDetail, PostSummary};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content API transport error: {0}")]
    Transport(String),
    #[error("content API returned status {status}")]
    Status { status: u16 },
    #[error("content API payload could not be decoded: {0}")]
    Decode(String),
    #[error("refusing to follow page token outside the content API origin: `{token}`")]
    ForeignPageToken { token: String },
}

impl ContentError {
    pub fn from_transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn from_decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

/// One feed page as delivered by the content API.
#[derive(Debug, Clone)]
pub struct SummaryBatch {
    pub results: Vec<PostSummary>,
    /// Opaque absolute URL of the following page, if any.
    pub next_page: Option<String>,
    /// 1-based page number reported by the API.
    pub page: u32,
}

/// Pagination tokens surrounding one feed position, without its results.
#[derive(Debug, Clone, Default)]
pub struct PageFrame {
    pub prev_page: Option<String>,
    pub next_page: Option<String>,
}

/// Enough of a neighboring post to render a navigation link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavNeighbor {
    pub page: u32,
    pub uid: String,
    pub title: String,
}

/// Read-side port onto the headless content API.
#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// First feed page, newest posts first.
    async fn first_page(&self) -> Result<SummaryBatch, ContentError>;

    /// Follow an opaque next-page token previously returned by the API.
    async fn follow_page(&self, token: &str) -> Result<SummaryBatch, ContentError>;

    /// Full document lookup by uid. `preview_ref` routes the read through an
    /// unpublished preview release when present.
    async fn document_by_uid(
        &self,
        uid: &str,
        preview_ref: Option<&str>,
    ) -> Result<Option<PostDetail>, ContentError>;

    /// Prev and next tokens around a single-document page of the feed.
    async fn pagination_frame(&self, page: u32) -> Result<PageFrame, ContentError>;

    /// Resolve one neighboring document from a pagination token.
    async fn neighbor(&self, token: &str) -> Result<Option<NavNeighbor>, ContentError>;

    /// Cheap reachability probe used by the health endpoint.
    async fn health_probe(&self) -> Result<(), ContentError>;
}
