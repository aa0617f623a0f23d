pub mod api;
pub mod config;
pub mod fetcher;
pub mod history;
pub mod humanize;
pub mod media;
pub mod observability;
pub mod pipeline;
pub mod storage;
pub mod tasks;
pub mod transcription;
