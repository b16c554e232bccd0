use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PreseeaError {
    #[error("invalid utterance identifier: {0}")]
    InvalidUtterance(String),

    #[error("invalid country label: {0}")]
    InvalidCountry(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("search page request failed: {0}")]
    PageHttp(String),

    #[error("search page {page} returned status {status}: {message}")]
    PageStatus {
        page: u32,
        status: u16,
        message: String,
    },

    #[error("download of {url} failed: {message}")]
    DownloadHttp { url: String, message: String },

    #[error("download of {url} returned status {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read transcript {path}: {message}")]
    TranscriptRead { path: String, message: String },
}
