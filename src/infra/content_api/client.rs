//! HTTP adapter for the remote content API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::application::repos::{ContentError, ContentRepo, NavNeighbor, PageFrame, SummaryBatch};
use crate::domain::posts::PostDetail;
use crate::infra::error::InfraError;

use super::types::{
    ApiSearchResponse, batch_from_response, detail_from_document, frame_from_response,
    neighbor_from_response,
};

const METRIC_FETCH_TOTAL: &str = "vetrina_content_fetch_total";
const METRIC_FETCH_ERRORS_TOTAL: &str = "vetrina_content_fetch_errors_total";
const METRIC_FETCH_MS: &str = "vetrina_content_fetch_ms";

const FEED_ORDERINGS: &str = "[document.first_publication_date desc]";

pub struct ContentClient {
    http: Client,
    search_url: Url,
    document_type: String,
    page_size: u32,
}

impl ContentClient {
    /// Build a client for the given API base URL (the `/documents/search`
    /// endpoint is derived from it).
    pub fn connect(
        api_url: &Url,
        document_type: &str,
        page_size: u32,
        timeout: Duration,
    ) -> Result<Self, InfraError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vetrina/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("content API client setup failed: {err}"))
            })?;

        let mut search_url = api_url.clone();
        search_url
            .path_segments_mut()
            .map_err(|_| InfraError::configuration("content API url cannot be a base"))?
            .pop_if_empty()
            .extend(["documents", "search"]);

        Ok(Self {
            http,
            search_url,
            document_type: document_type.to_string(),
            page_size: page_size.max(1),
        })
    }

    fn feed_query(&self, page: u32, page_size: u32) -> Url {
        let mut url = self.search_url.clone();
        url.query_pairs_mut()
            .append_pair(
                "q",
                &format!("[[at(document.type,\"{}\")]]", self.document_type),
            )
            .append_pair("orderings", FEED_ORDERINGS)
            .append_pair("page", &page.to_string())
            .append_pair("pageSize", &page_size.to_string());
        url
    }

    fn uid_query(&self, uid: &str, preview_ref: Option<&str>) -> Url {
        let mut url = self.search_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(
                "q",
                &format!("[[at(my.{}.uid,\"{uid}\")]]", self.document_type),
            );
            pairs.append_pair("pageSize", "1");
            if let Some(reference) = preview_ref {
                pairs.append_pair("ref", reference);
            }
        }
        url
    }

    /// Page tokens are absolute URLs minted by the API, but they reach us
    /// through client-held cursors. Only same-origin tokens are followed.
    fn checked_token_url(&self, token: &str) -> Result<Url, ContentError> {
        let foreign = || ContentError::ForeignPageToken {
            token: token.to_string(),
        };
        let url = Url::parse(token).map_err(|_| foreign())?;

        let same_origin = url.scheme() == self.search_url.scheme()
            && url.host_str() == self.search_url.host_str()
            && url.port_or_known_default() == self.search_url.port_or_known_default();
        if !same_origin {
            return Err(foreign());
        }

        Ok(url)
    }

    async fn fetch_search(
        &self,
        url: Url,
        operation: &'static str,
    ) -> Result<ApiSearchResponse, ContentError> {
        let started = Instant::now();
        counter!(METRIC_FETCH_TOTAL).increment(1);

        let outcome = self.execute(url).await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_FETCH_MS, "operation" => operation).record(elapsed_ms);
        if outcome.is_err() {
            counter!(METRIC_FETCH_ERRORS_TOTAL).increment(1);
        }
        debug!(
            target = "vetrina::content",
            operation,
            elapsed_ms,
            ok = outcome.is_ok(),
            "content API request"
        );

        outcome
    }

    async fn execute(&self, url: Url) -> Result<ApiSearchResponse, ContentError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(ContentError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentError::Status {
                status: status.as_u16(),
            });
        }

        response
            .json::<ApiSearchResponse>()
            .await
            .map_err(ContentError::from_decode)
    }
}

#[async_trait]
impl ContentRepo for ContentClient {
    async fn first_page(&self) -> Result<SummaryBatch, ContentError> {
        let response = self
            .fetch_search(self.feed_query(1, self.page_size), "first_page")
            .await?;
        batch_from_response(response, self.page_size)
    }

    async fn follow_page(&self, token: &str) -> Result<SummaryBatch, ContentError> {
        let url = self.checked_token_url(token)?;
        let response = self.fetch_search(url, "follow_page").await?;
        batch_from_response(response, self.page_size)
    }

    async fn document_by_uid(
        &self,
        uid: &str,
        preview_ref: Option<&str>,
    ) -> Result<Option<PostDetail>, ContentError> {
        let response = self
            .fetch_search(self.uid_query(uid, preview_ref), "document_by_uid")
            .await?;
        response
            .results
            .into_iter()
            .next()
            .map(detail_from_document)
            .transpose()
    }

    async fn pagination_frame(&self, page: u32) -> Result<PageFrame, ContentError> {
        let response = self
            .fetch_search(self.feed_query(page, 1), "pagination_frame")
            .await?;
        Ok(frame_from_response(response))
    }

    async fn neighbor(&self, token: &str) -> Result<Option<NavNeighbor>, ContentError> {
        let url = self.checked_token_url(token)?;
        let response = self.fetch_search(url, "neighbor").await?;
        neighbor_from_response(&response)
    }

    async fn health_probe(&self) -> Result<(), ContentError> {
        self.fetch_search(self.feed_query(1, 1), "health_probe")
            .await
            .map(|_| ())
    }
}
