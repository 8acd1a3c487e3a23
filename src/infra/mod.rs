//! Infrastructure adapters and runtime bootstrap.

pub mod assets;
pub mod content_api;
pub mod error;
pub mod http;
pub mod telemetry;
