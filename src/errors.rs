use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("{service} responded with HTTP {status}")]
    ExternalCall { service: &'static str, status: u16 },
    #[error("unexpected API status {status}: {detail}")]
    UnexpectedStatus { status: String, detail: String },
    #[error("{0}")]
    Config(String),
    #[error("unit task failed: {0}")]
    Task(String),
}
