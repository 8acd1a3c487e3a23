//! Content API adapters: the HTTP client and its caching layer.

mod cache;
mod client;
mod types;

pub use cache::CachedContent;
pub use client::ContentClient;
