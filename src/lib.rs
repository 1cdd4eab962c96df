mod batch;
mod cache;
mod config;
mod disambiguate;
mod errors;
mod fallback;
mod ingestion;
mod limiter;
mod output;
mod pipeline;
mod places;
mod query;
mod sheet;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tokio::io::AsyncBufRead;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use batch::{BatchDriver, BatchReport, UnitOutcome};
pub use cache::{QueryCache, QueryKey, QueryKind};
pub use config::{AppConfig, PublicAppConfig};
pub use disambiguate::select;
pub use errors::{AppError, AppResult};
pub use fallback::{LinkResolver, WebSearchResolver};
pub use ingestion::{InputUnit, UnitOrigin};
pub use limiter::RateLimiter;
pub use output::{CsvLineWriter, LINE_HEADERS};
pub use pipeline::{OperatingStatus, PlaceRecord, PlaceResolver, Resolution, ResolutionKind};
pub use places::{
    ApiResponse, HttpPlacesClient, LatLng, PlaceDetail, PlacesApi, SearchCandidate,
};
pub use query::{CachedQuery, QuerySource};
pub use sheet::Sheet;

/// Owns the query cache and the batch driver for one run.
pub struct Enricher {
    cache: QueryCache,
    driver: BatchDriver,
}

impl Enricher {
    /// Wires the HTTP Places client and web search fallback from `config`.
    pub fn initialize(config: AppConfig) -> AppResult<Self> {
        let api_key = config
            .google_api_key
            .clone()
            .ok_or_else(|| AppError::Config("GOOGLE_API_KEY is not set".into()))?;
        let timeout = config.http_timeout_secs.map(Duration::from_secs);
        let places = HttpPlacesClient::new(api_key, &config.places_api_base, timeout)?;
        let links = WebSearchResolver::new(&config.web_search_base, timeout)?;
        Self::with_clients(config, Arc::new(places), Arc::new(links))
    }

    pub fn with_clients(
        config: AppConfig,
        places: Arc<dyn PlacesApi>,
        links: Arc<dyn LinkResolver>,
    ) -> AppResult<Self> {
        let cache = QueryCache::open(&config.cache_path)?;
        let limiter = RateLimiter::new(config.max_concurrent_requests);
        let resolver = PlaceResolver::new(places, links, cache.clone(), limiter);
        info!(profile = ?config.public_profile(), "enricher ready");
        Ok(Self {
            cache,
            driver: BatchDriver::new(Arc::new(resolver)),
        })
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Reads place names from `reader` and streams CSV rows to `writer` as
    /// each name resolves.
    pub async fn enrich_lines<R, W>(&self, reader: R, writer: W) -> AppResult<BatchReport>
    where
        R: AsyncBufRead + Unpin,
        W: std::io::Write,
    {
        let mut csv_out = CsvLineWriter::new(writer)?;
        let mut write_error = None;
        let report = self
            .driver
            .run_lines(reader, |outcome| {
                if write_error.is_some() {
                    return;
                }
                if let Err(err) = csv_out.write_outcome(&outcome) {
                    write_error = Some(err);
                }
            })
            .await?;
        match write_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Resolves every row from `start_row` on and saves the filled-in sheet
    /// to `output` once all rows have settled.
    pub async fn enrich_sheet(
        &self,
        input: &Path,
        output: &Path,
        start_row: usize,
    ) -> AppResult<BatchReport> {
        let mut sheet = Sheet::open(input)?;
        let units = sheet.units(start_row);
        info!(
            target: "sheet",
            path = %input.display(),
            rows = units.len(),
            start_row,
            "resolving sheet rows"
        );

        let report = self
            .driver
            .run_all(units, |outcome| {
                let Ok(resolution) = &outcome.result else {
                    return;
                };
                if let Err(err) = sheet.apply(outcome.unit.origin, resolution) {
                    warn!(target: "sheet", unit = %outcome.unit.origin, ?err, "failed to update row");
                }
            })
            .await;

        sheet.save(output)?;
        Ok(report)
    }

    pub fn close(self) -> AppResult<()> {
        let Self { cache, driver } = self;
        drop(driver);
        cache.close()
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,leadsheet_lib=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}
