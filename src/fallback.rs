use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use crate::errors::{AppError, AppResult};

static RESULT_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<a[^>]*\shref="(/url\?[^"]+)""#).expect("result link pattern compiles")
});

/// Best-effort name to URL lookup used when the Places API has nothing usable.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> AppResult<String>;
}

/// Asks the web search endpoint for its top hit ("I'm feeling lucky") and
/// reads the redirect instead of following it.
pub struct WebSearchResolver {
    http: reqwest::Client,
    base: Url,
}

impl WebSearchResolver {
    pub fn new(base: &str, timeout: Option<Duration>) -> AppResult<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent("leadsheet/0.1.0")
            .redirect(Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let base = Url::parse(&format!("{}/", base.trim_end_matches('/')))?;
        Ok(Self {
            http: builder.build()?,
            base,
        })
    }

    pub fn search_url(&self, name: &str) -> AppResult<Url> {
        let mut url = self.base.join("search")?;
        url.set_query(Some("btnI"));
        url.query_pairs_mut().append_pair("q", name);
        Ok(url)
    }
}

#[async_trait]
impl LinkResolver for WebSearchResolver {
    async fn resolve(&self, name: &str) -> AppResult<String> {
        let query_url = self.search_url(name)?;
        let response = self.http.get(query_url.clone()).send().await?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            return location.ok_or(AppError::ExternalCall {
                service: "web search",
                status: status.as_u16(),
            });
        }

        if status == StatusCode::OK {
            let body = response.text().await?;
            return Ok(match first_result_link(&body, &query_url) {
                Some(destination) => destination,
                None => {
                    debug!(
                        target: "fallback",
                        name,
                        "no result link on search page; using the search url"
                    );
                    query_url.to_string()
                }
            });
        }

        Err(AppError::ExternalCall {
            service: "web search",
            status: status.as_u16(),
        })
    }
}

/// Destination of the first organic result, which the results page wraps as
/// `/url?q=<destination>&...`.
fn first_result_link(body: &str, page_url: &Url) -> Option<String> {
    let start = ["id=\"ires\"", "id=\"search\""]
        .iter()
        .find_map(|marker| body.find(marker))
        .unwrap_or(0);
    let href = RESULT_LINK.captures(&body[start..])?.get(1)?.as_str();
    let link = page_url.join(&href.replace("&amp;", "&")).ok()?;
    if link.path() != "/url" {
        return None;
    }
    let destination = link
        .query_pairs()
        .find(|(key, _)| key == "q" || key == "url")
        .map(|(_, value)| value.into_owned())?;
    let parsed = Url::parse(&destination).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(destination)
}
