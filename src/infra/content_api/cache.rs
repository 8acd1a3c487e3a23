//! TTL cache in front of a content repository.
//!
//! The upstream API is slow relative to page rendering and its content
//! changes rarely, so successful reads are kept for a configured TTL.
//! Preview reads bypass the cache entirely: they are scoped to a draft ref
//! and must never leak into published responses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;

use crate::application::repos::{ContentError, ContentRepo, NavNeighbor, PageFrame, SummaryBatch};
use crate::domain::posts::PostDetail;

const METRIC_CACHE_HIT_TOTAL: &str = "vetrina_content_cache_hit_total";
const METRIC_CACHE_MISS_TOTAL: &str = "vetrina_content_cache_miss_total";
const METRIC_CACHE_EVICT_TOTAL: &str = "vetrina_content_cache_evict_total";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    FirstPage,
    FollowPage(String),
    Document(String),
    Frame(u32),
    Neighbor(String),
}

#[derive(Clone)]
enum CachedPayload {
    Batch(SummaryBatch),
    Document(Option<PostDetail>),
    Frame(PageFrame),
    Neighbor(Option<NavNeighbor>),
}

struct CacheEntry {
    inserted_at: Instant,
    payload: CachedPayload,
}

pub struct CachedContent {
    inner: Arc<dyn ContentRepo>,
    ttl: Duration,
    capacity: usize,
    entries: DashMap<CacheKey, CacheEntry>,
}

impl CachedContent {
    /// A zero TTL disables caching; every call goes straight upstream.
    pub fn new(inner: Arc<dyn ContentRepo>, ttl: Duration, capacity: u32) -> Self {
        Self {
            inner,
            ttl,
            capacity: capacity.max(1) as usize,
            entries: DashMap::new(),
        }
    }

    fn enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    fn lookup(&self, key: &CacheKey) -> Option<CachedPayload> {
        let entry = self.entries.get(key)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.payload.clone())
    }

    fn store(&self, key: CacheKey, payload: CachedPayload) {
        if self.entries.len() >= self.capacity {
            let before = self.entries.len();
            self.entries
                .retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
            let evicted = before.saturating_sub(self.entries.len());
            if evicted > 0 {
                counter!(METRIC_CACHE_EVICT_TOTAL).increment(evicted as u64);
            }
        }

        // Still full of fresh entries: let this one pass through uncached
        // rather than dropping a fresher neighbor.
        if self.entries.len() >= self.capacity {
            return;
        }

        self.entries.insert(
            key,
            CacheEntry {
                inserted_at: Instant::now(),
                payload,
            },
        );
    }

    async fn cached_batch<F>(&self, key: CacheKey, fetch: F) -> Result<SummaryBatch, ContentError>
    where
        F: std::future::Future<Output = Result<SummaryBatch, ContentError>>,
    {
        if !self.enabled() {
            return fetch.await;
        }
        if let Some(CachedPayload::Batch(batch)) = self.lookup(&key) {
            counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
            return Ok(batch);
        }
        counter!(METRIC_CACHE_MISS_TOTAL).increment(1);

        let batch = fetch.await?;
        self.store(key, CachedPayload::Batch(batch.clone()));
        Ok(batch)
    }
}

#[async_trait]
impl ContentRepo for CachedContent {
    async fn first_page(&self) -> Result<SummaryBatch, ContentError> {
        self.cached_batch(CacheKey::FirstPage, self.inner.first_page())
            .await
    }

    async fn follow_page(&self, token: &str) -> Result<SummaryBatch, ContentError> {
        self.cached_batch(
            CacheKey::FollowPage(token.to_string()),
            self.inner.follow_page(token),
        )
        .await
    }

    async fn document_by_uid(
        &self,
        uid: &str,
        preview_ref: Option<&str>,
    ) -> Result<Option<PostDetail>, ContentError> {
        if preview_ref.is_some() || !self.enabled() {
            return self.inner.document_by_uid(uid, preview_ref).await;
        }

        let key = CacheKey::Document(uid.to_string());
        if let Some(CachedPayload::Document(detail)) = self.lookup(&key) {
            counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
            return Ok(detail);
        }
        counter!(METRIC_CACHE_MISS_TOTAL).increment(1);

        let detail = self.inner.document_by_uid(uid, None).await?;
        self.store(key, CachedPayload::Document(detail.clone()));
        Ok(detail)
    }

    async fn pagination_frame(&self, page: u32) -> Result<PageFrame, ContentError> {
        if !self.enabled() {
            return self.inner.pagination_frame(page).await;
        }

        let key = CacheKey::Frame(page);
        if let Some(CachedPayload::Frame(frame)) = self.lookup(&key) {
            counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
            return Ok(frame);
        }
        counter!(METRIC_CACHE_MISS_TOTAL).increment(1);

        let frame = self.inner.pagination_frame(page).await?;
        self.store(key, CachedPayload::Frame(frame.clone()));
        Ok(frame)
    }

    async fn neighbor(&self, token: &str) -> Result<Option<NavNeighbor>, ContentError> {
        if !self.enabled() {
            return self.inner.neighbor(token).await;
        }

        let key = CacheKey::Neighbor(token.to_string());
        if let Some(CachedPayload::Neighbor(neighbor)) = self.lookup(&key) {
            counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
            return Ok(neighbor);
        }
        counter!(METRIC_CACHE_MISS_TOTAL).increment(1);

        let neighbor = self.inner.neighbor(token).await?;
        self.store(key, CachedPayload::Neighbor(neighbor.clone()));
        Ok(neighbor)
    }

    async fn health_probe(&self) -> Result<(), ContentError> {
        self.inner.health_probe().await
    }
}
