use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{QueryCache, QueryKind};
use crate::disambiguate::select;
use crate::errors::{AppError, AppResult};
use crate::fallback::LinkResolver;
use crate::ingestion::InputUnit;
use crate::limiter::RateLimiter;
use crate::places::{
    ensure_known_status, ApiResponse, DetailsResponse, LatLng, PlaceDetail, PlacesApi,
    SearchCandidate, SearchResponse,
};
use crate::query::CachedQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperatingStatus {
    Operational,
    Closed,
}

impl OperatingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingStatus::Operational => "operational",
            OperatingStatus::Closed => "closed",
        }
    }
}

/// Normalized output for one unit. `None` fields were not resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaceRecord {
    pub name: Option<String>,
    pub address: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub location: Option<LatLng>,
    pub status: Option<OperatingStatus>,
}

impl PlaceRecord {
    fn from_detail(candidate: &SearchCandidate, detail: PlaceDetail) -> Self {
        let status = if detail.is_permanently_closed() {
            OperatingStatus::Closed
        } else {
            OperatingStatus::Operational
        };
        Self {
            street: detail.street_address(),
            city: detail.locality(),
            state: detail.region(),
            postal_code: detail.postal_code(),
            location: detail.location().or(candidate.geometry.location),
            name: Some(detail.name)
                .filter(|name| !name.is_empty())
                .or_else(|| non_empty(&candidate.name)),
            address: detail
                .formatted_address
                .or_else(|| non_empty(&candidate.formatted_address)),
            phone: detail
                .formatted_phone_number
                .or_else(|| candidate.formatted_phone_number.clone()),
            website: detail.website.or_else(|| candidate.website.clone()),
            status: Some(status),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    Some(value.to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionKind {
    /// Search and details both succeeded.
    Matched,
    /// The chosen place no longer has details; treated as not operating.
    Closed,
    /// Only a website came back, from the web search fallback.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub kind: ResolutionKind,
    pub record: PlaceRecord,
}

enum Stage {
    TextSearch,
    DetailLookup(SearchCandidate),
    Fallback,
    Done(Resolution),
}

/// Resolves one input unit: text search, pick a candidate, fetch its
/// details, or fall back to the web search lookup. Never retries.
pub struct PlaceResolver {
    places: Arc<dyn PlacesApi>,
    links: Arc<dyn LinkResolver>,
    limiter: RateLimiter,
    text_search: CachedQuery,
    details: CachedQuery,
}

impl PlaceResolver {
    pub fn new(
        places: Arc<dyn PlacesApi>,
        links: Arc<dyn LinkResolver>,
        cache: QueryCache,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            places,
            links,
            text_search: CachedQuery::new(QueryKind::TextSearch, cache.clone(), limiter.clone()),
            details: CachedQuery::new(QueryKind::Details, cache, limiter.clone()),
            limiter,
        }
    }

    pub async fn resolve(&self, unit: &InputUnit) -> AppResult<Resolution> {
        let mut stage = Stage::TextSearch;
        loop {
            stage = match stage {
                Stage::TextSearch => self.search(unit).await?,
                Stage::DetailLookup(candidate) => self.lookup_details(unit, candidate).await?,
                Stage::Fallback => self.fall_back(unit).await?,
                Stage::Done(resolution) => return Ok(resolution),
            };
        }
    }

    async fn search(&self, unit: &InputUnit) -> AppResult<Stage> {
        let (raw, source) = self
            .text_search
            .run(&unit.name, || async {
                ensure_known_status(self.places.text_search(&unit.name).await?)
            })
            .await?;

        match SearchResponse::from_raw(&raw)? {
            ApiResponse::Ok(candidates) => {
                // Name lists carry no hint; their first result is taken as is.
                let chosen = match unit.locale_hint.as_deref() {
                    Some(hint) => select(&candidates, hint),
                    None => candidates.first(),
                };
                match chosen {
                    Some(candidate) => {
                        debug!(
                            target: "place_pipeline",
                            unit = %unit.origin,
                            ?source,
                            place_id = %candidate.place_id,
                            "candidate selected"
                        );
                        Ok(Stage::DetailLookup(candidate.clone()))
                    }
                    None => {
                        debug!(
                            target: "place_pipeline",
                            unit = %unit.origin,
                            candidates = candidates.len(),
                            hint = unit.locale_hint.as_deref().unwrap_or_default(),
                            "no candidate matched the locale hint"
                        );
                        Ok(Stage::Fallback)
                    }
                }
            }
            ApiResponse::ZeroResults => Ok(Stage::Fallback),
            ApiResponse::Other { status, detail } => {
                Err(AppError::UnexpectedStatus { status, detail })
            }
        }
    }

    async fn lookup_details(
        &self,
        unit: &InputUnit,
        candidate: SearchCandidate,
    ) -> AppResult<Stage> {
        let (raw, _) = self
            .details
            .run(&candidate.place_id, || async {
                ensure_known_status(self.places.details(&candidate.place_id).await?)
            })
            .await?;

        match DetailsResponse::from_raw(&raw)? {
            ApiResponse::Ok(detail) => Ok(Stage::Done(Resolution {
                kind: ResolutionKind::Matched,
                record: PlaceRecord::from_detail(&candidate, detail),
            })),
            ApiResponse::ZeroResults => {
                warn!(
                    target: "place_pipeline",
                    unit = %unit.origin,
                    name = %unit.name,
                    place_id = %candidate.place_id,
                    "place has no details; marking it closed"
                );
                Ok(Stage::Done(Resolution {
                    kind: ResolutionKind::Closed,
                    record: PlaceRecord {
                        name: Some(unit.name.clone()),
                        status: Some(OperatingStatus::Closed),
                        ..PlaceRecord::default()
                    },
                }))
            }
            ApiResponse::Other { status, detail } => {
                Err(AppError::UnexpectedStatus { status, detail })
            }
        }
    }

    async fn fall_back(&self, unit: &InputUnit) -> AppResult<Stage> {
        let website = self
            .limiter
            .schedule(|| self.links.resolve(&unit.name))
            .await?;
        debug!(
            target: "place_pipeline",
            unit = %unit.origin,
            %website,
            "resolved through web search"
        );
        Ok(Stage::Done(Resolution {
            kind: ResolutionKind::Fallback,
            record: PlaceRecord {
                name: Some(unit.name.clone()),
                website: Some(website),
                ..PlaceRecord::default()
            },
        }))
    }
}
