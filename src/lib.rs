//! Vetrina is a server-rendered blog front-end for a headless content API.
//!
//! The crate is layered the same way the binary boots: [`domain`] holds the
//! pure post and rich-text models, [`application`] composes them into feed
//! and page services, [`infra`] talks to the outside world (content API,
//! HTTP, telemetry), and [`presentation`] renders templates.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
