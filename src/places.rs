use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::errors::{AppError, AppResult};

const STATUS_OK: &str = "OK";
const STATUS_ZERO_RESULTS: &str = "ZERO_RESULTS";
const CLOSED_PERMANENTLY: &str = "CLOSED_PERMANENTLY";

/// Raw access to the Places web service. Implementations return the response
/// document untouched so it can be cached verbatim.
#[async_trait]
pub trait PlacesApi: Send + Sync {
    async fn text_search(&self, query: &str) -> AppResult<Value>;
    async fn details(&self, place_id: &str) -> AppResult<Value>;
}

/// A decoded Places response, split on its `status` field.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse<T> {
    Ok(T),
    ZeroResults,
    Other { status: String, detail: String },
}

pub type SearchResponse = ApiResponse<Vec<SearchCandidate>>;
pub type DetailsResponse = ApiResponse<PlaceDetail>;

impl<T: DeserializeOwned> ApiResponse<T> {
    fn decode(raw: &Value, payload_field: &str) -> AppResult<Self> {
        match raw.get("status").and_then(Value::as_str) {
            Some(STATUS_OK) => {
                let payload = raw.get(payload_field).cloned().unwrap_or(Value::Null);
                Ok(ApiResponse::Ok(serde_json::from_value(payload)?))
            }
            Some(STATUS_ZERO_RESULTS) => Ok(ApiResponse::ZeroResults),
            other => Ok(ApiResponse::Other {
                status: other.unwrap_or("<missing>").to_string(),
                detail: failure_detail(raw),
            }),
        }
    }
}

impl SearchResponse {
    pub fn from_raw(raw: &Value) -> AppResult<Self> {
        Self::decode(raw, "results")
    }
}

impl DetailsResponse {
    pub fn from_raw(raw: &Value) -> AppResult<Self> {
        Self::decode(raw, "result")
    }
}

/// Fails unless the document carries `OK` or `ZERO_RESULTS`, the only
/// statuses worth keeping in the query cache.
pub fn ensure_known_status(raw: Value) -> AppResult<Value> {
    match raw.get("status").and_then(Value::as_str) {
        Some(STATUS_OK) | Some(STATUS_ZERO_RESULTS) => Ok(raw),
        other => Err(AppError::UnexpectedStatus {
            status: other.unwrap_or("<missing>").to_string(),
            detail: failure_detail(&raw),
        }),
    }
}

fn failure_detail(raw: &Value) -> String {
    raw.get("error_message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| raw.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Geometry {
    pub location: Option<LatLng>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchCandidate {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub formatted_address: String,
    pub formatted_phone_number: Option<String>,
    pub website: Option<String>,
    #[serde(default)]
    pub place_id: String,
    #[serde(default)]
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AddressComponent {
    #[serde(default)]
    pub long_name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlaceDetail {
    #[serde(default)]
    pub name: String,
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub address_components: Vec<AddressComponent>,
    pub formatted_phone_number: Option<String>,
    pub website: Option<String>,
    #[serde(default)]
    pub geometry: Geometry,
    #[serde(default)]
    pub permanently_closed: bool,
    pub business_status: Option<String>,
}

impl PlaceDetail {
    fn component(&self, kind: &str) -> Option<&AddressComponent> {
        self.address_components
            .iter()
            .find(|component| component.types.iter().any(|t| t == kind))
    }

    /// Street number and route, or the route alone when there is no number.
    pub fn street_address(&self) -> Option<String> {
        let route = self.component("route").map(|c| c.long_name.as_str());
        match (self.component("street_number"), route) {
            (Some(number), Some(route)) => Some(format!("{} {}", number.long_name, route)),
            (Some(number), None) => Some(number.long_name.clone()),
            (None, route) => route.map(str::to_string),
        }
    }

    pub fn locality(&self) -> Option<String> {
        self.component("locality").map(|c| c.long_name.clone())
    }

    pub fn region(&self) -> Option<String> {
        self.component("administrative_area_level_1")
            .map(|c| c.short_name.clone())
    }

    pub fn postal_code(&self) -> Option<String> {
        self.component("postal_code").map(|c| c.long_name.clone())
    }

    pub fn location(&self) -> Option<LatLng> {
        self.geometry.location
    }

    pub fn is_permanently_closed(&self) -> bool {
        self.permanently_closed || self.business_status.as_deref() == Some(CLOSED_PERMANENTLY)
    }
}

pub struct HttpPlacesClient {
    http: reqwest::Client,
    api_key: SecretString,
    base: Url,
}

impl HttpPlacesClient {
    pub fn new(api_key: SecretString, base: &str, timeout: Option<Duration>) -> AppResult<Self> {
        let mut builder = reqwest::Client::builder().user_agent("leadsheet/0.1.0");
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let base = Url::parse(&format!("{}/", base.trim_end_matches('/')))?;
        Ok(Self {
            http: builder.build()?,
            api_key,
            base,
        })
    }

    async fn get_json(&self, endpoint: &str, params: &[(&str, &str)]) -> AppResult<Value> {
        let mut url = self.base.join(endpoint)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("key", self.api_key.expose_secret());
        }

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalCall {
                service: "places",
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PlacesApi for HttpPlacesClient {
    async fn text_search(&self, query: &str) -> AppResult<Value> {
        self.get_json("textsearch/json", &[("query", query)]).await
    }

    async fn details(&self, place_id: &str) -> AppResult<Value> {
        self.get_json("details/json", &[("placeid", place_id)]).await
    }
}

#[cfg(test)]
mod tests {
    use httptest::matchers::{all_of, contains, request, url_decoded};
    use httptest::responders::{json_encoded, status_code};
    use httptest::{Expectation, Server};
    use serde_json::json;

    use super::*;

    fn detail_fixture() -> Value {
        json!({
            "status": "OK",
            "result": {
                "name": "Blue Bottle Coffee",
                "formatted_address": "66 Mint St, San Francisco, CA 94103, USA",
                "address_components": [
                    {"long_name": "66", "short_name": "66", "types": ["street_number"]},
                    {"long_name": "Mint Street", "short_name": "Mint St", "types": ["route"]},
                    {"long_name": "San Francisco", "short_name": "SF", "types": ["locality", "political"]},
                    {"long_name": "California", "short_name": "CA", "types": ["administrative_area_level_1", "political"]},
                    {"long_name": "94103", "short_name": "94103", "types": ["postal_code"]}
                ],
                "formatted_phone_number": "(510) 653-3394",
                "website": "https://bluebottlecoffee.com/",
                "geometry": {"location": {"lat": 37.782, "lng": -122.407}},
                "business_status": "OPERATIONAL"
            }
        })
    }

    #[test]
    fn decodes_detail_components() {
        let ApiResponse::Ok(detail) = DetailsResponse::from_raw(&detail_fixture()).unwrap() else {
            panic!("expected OK details");
        };
        assert_eq!(detail.street_address().as_deref(), Some("66 Mint Street"));
        assert_eq!(detail.locality().as_deref(), Some("San Francisco"));
        assert_eq!(detail.region().as_deref(), Some("CA"));
        assert_eq!(detail.postal_code().as_deref(), Some("94103"));
        assert_eq!(
            detail.location(),
            Some(LatLng {
                lat: 37.782,
                lng: -122.407
            })
        );
        assert!(!detail.is_permanently_closed());
    }

    #[test]
    fn street_falls_back_to_route() {
        let detail = PlaceDetail {
            address_components: vec![AddressComponent {
                long_name: "Market Street".into(),
                short_name: "Market St".into(),
                types: vec!["route".into()],
            }],
            permanently_closed: true,
            ..PlaceDetail::default()
        };
        assert_eq!(detail.street_address().as_deref(), Some("Market Street"));
        assert!(detail.is_permanently_closed());
    }

    #[test]
    fn splits_responses_on_status() {
        assert_eq!(
            SearchResponse::from_raw(&json!({"status": "ZERO_RESULTS", "results": []})).unwrap(),
            ApiResponse::ZeroResults
        );

        let denied = json!({"status": "REQUEST_DENIED", "error_message": "bad key"});
        assert_eq!(
            SearchResponse::from_raw(&denied).unwrap(),
            ApiResponse::Other {
                status: "REQUEST_DENIED".into(),
                detail: "bad key".into()
            }
        );
        let err = ensure_known_status(denied).unwrap_err();
        assert!(matches!(err, AppError::UnexpectedStatus { ref status, .. } if status == "REQUEST_DENIED"));

        let err = ensure_known_status(json!({"status": "OVER_QUERY_LIMIT"})).unwrap_err();
        let AppError::UnexpectedStatus { detail, .. } = err else {
            panic!("expected unexpected status");
        };
        assert_eq!(detail, r#"{"status":"OVER_QUERY_LIMIT"}"#);
    }

    #[tokio::test]
    async fn http_client_sends_query_and_key() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/place/textsearch/json"),
                request::query(url_decoded(contains(("query", "Blue Bottle Coffee")))),
                request::query(url_decoded(contains(("key", "test-key")))),
            ])
            .respond_with(json_encoded(json!({
                "status": "OK",
                "results": [{
                    "name": "Blue Bottle Coffee",
                    "formatted_address": "66 Mint St, San Francisco, CA 94103, USA",
                    "place_id": "ChIJblue"
                }]
            }))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/place/details/json"),
                request::query(url_decoded(contains(("placeid", "ChIJblue")))),
            ])
            .respond_with(status_code(500)),
        );

        let client = HttpPlacesClient::new(
            SecretString::from("test-key".to_string()),
            &server.url_str("/place"),
            None,
        )
        .unwrap();

        let raw = client.text_search("Blue Bottle Coffee").await.unwrap();
        let ApiResponse::Ok(results) = SearchResponse::from_raw(&raw).unwrap() else {
            panic!("expected OK search");
        };
        assert_eq!(results[0].place_id, "ChIJblue");

        let err = client.details("ChIJblue").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::ExternalCall {
                service: "places",
                status: 500
            }
        ));
    }
}
