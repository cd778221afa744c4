//! Fact News - a news aggregation and fact-checking service
//!
//! This crate registers news sources by their RSS feeds, ingests recent
//! articles with their page text, and uses a generative model to
//! fact-check articles and build a daily digest of everything published.

pub mod ai;
pub mod config;
pub mod db;
pub mod dedup;
pub mod digest;
pub mod error;
pub mod extractor;
pub mod factcheck;
pub mod fetcher;
pub mod resolver;
pub mod routes;

pub use error::{Error, Result};
