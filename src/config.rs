use std::path::PathBuf;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 100;
pub const DEFAULT_PLACES_API_BASE: &str = "https://maps.googleapis.com/maps/api/place";
pub const DEFAULT_WEB_SEARCH_BASE: &str = "https://www.google.com";
const DEFAULT_CACHE_PATH: &str = "placecache.db";
const DEFAULT_START_ROW: usize = 2;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub google_api_key: Option<SecretString>,
    pub cache_path: PathBuf,
    pub max_concurrent_requests: usize,
    pub places_api_base: String,
    pub web_search_base: String,
    pub http_timeout_secs: Option<u64>,
    pub start_row: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub cache_path: String,
    pub max_concurrent_requests: usize,
    pub places_api_base: String,
    pub web_search_base: String,
    pub http_timeout_secs: Option<u64>,
    pub start_row: usize,
    pub has_google_api_key: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            google_api_key: env::var("GOOGLE_API_KEY")
                .or_else(|_| env::var("GOOGLE_PLACES_API_KEY"))
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            cache_path: env::var("PLACE_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_PATH)),
            max_concurrent_requests: parse_usize(
                "MAX_CONCURRENT_REQUESTS",
                DEFAULT_MAX_CONCURRENT_REQUESTS,
            )
            .max(1),
            places_api_base: env::var("PLACES_API_BASE")
                .unwrap_or_else(|_| DEFAULT_PLACES_API_BASE.to_string()),
            web_search_base: env::var("WEB_SEARCH_BASE")
                .unwrap_or_else(|_| DEFAULT_WEB_SEARCH_BASE.to_string()),
            http_timeout_secs: Some(parse_u64("HTTP_TIMEOUT_SECS", 0)).filter(|secs| *secs > 0),
            start_row: parse_usize("START_ROW", DEFAULT_START_ROW).max(DEFAULT_START_ROW),
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            cache_path: self.cache_path.to_string_lossy().to_string(),
            max_concurrent_requests: self.max_concurrent_requests,
            places_api_base: self.places_api_base.clone(),
            web_search_base: self.web_search_base.clone(),
            http_timeout_secs: self.http_timeout_secs,
            start_row: self.start_row,
            has_google_api_key: self.google_api_key.is_some(),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}
