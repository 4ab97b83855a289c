pub mod api;
pub mod config;
pub mod extractor;
pub mod fetcher;
pub mod generation;
pub mod humanize;
pub mod observability;
pub mod pipeline;
pub mod storage;
pub mod workspace;
