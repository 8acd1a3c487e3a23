//! Application services layer scaffolding.

pub mod chrome;
pub mod error;
pub mod feed;
pub mod pagination;
pub mod repos;
pub mod stream;
