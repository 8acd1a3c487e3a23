//! Domain layer types and invariants.

pub mod posts;
pub mod rich_text;
pub mod route;
