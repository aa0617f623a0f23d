use thiserror::Error;

use super::models::{
    DEFAULT_PER_PAGE, DownloadRequest, HistoryQuery, MAX_PER_PAGE, TranscribeRequest,
};
use crate::media::{extract_url, is_plain_filename};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestValidationError {
    #[error("no valid URL found")]
    MissingUrl,
    #[error("filename is required")]
    MissingFilename,
    #[error("invalid filename: {0}")]
    InvalidFilename(String),
    #[error("per_page must be between 1 and {MAX_PER_PAGE}")]
    InvalidPageSize,
}

/// Returns the first http(s) URL found in the request text.
pub fn validate_download(request: &DownloadRequest) -> Result<String, RequestValidationError> {
    extract_url(&request.url).ok_or(RequestValidationError::MissingUrl)
}

pub fn validate_transcribe(request: &TranscribeRequest) -> Result<(), RequestValidationError> {
    let filename = request.filename.trim();
    if filename.is_empty() {
        return Err(RequestValidationError::MissingFilename);
    }
    if !is_plain_filename(filename) {
        return Err(RequestValidationError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Resolves `(page, per_page)`; pages start at 1 and 0 is treated as 1.
pub fn validate_history_query(
    query: &HistoryQuery,
) -> Result<(usize, usize), RequestValidationError> {
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE);
    if !(1..=MAX_PER_PAGE).contains(&per_page) {
        return Err(RequestValidationError::InvalidPageSize);
    }
    Ok((query.page.unwrap_or(1).max(1), per_page))
}
