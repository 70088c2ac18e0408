//! HTTP surface of the proxy.
//!
//! One route matters: `GET /pois`. Method dispatch is done by hand so that
//! non-GET requests get the JSON 405 the client contract promises and a bare
//! `OPTIONS` gets an empty 204. CORS and the public `Cache-Control` header
//! are attached by tower-http layers on every response.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::any,
    Router,
};
use serde::Deserialize;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};

use datenportal_client::Geofence;

use crate::cache::SingleSlotCache;
use crate::normalize::{self, NormalizedPoi};
use crate::upstream::PoiSource;

/// How long a response stays valid, both in the in-process cache and in the
/// public `Cache-Control` directive.
pub const CACHE_TTL: Duration = Duration::from_secs(120);

pub struct AppState {
    pub source: Arc<dyn PoiSource>,
    pub cache: SingleSlotCache,
    pub has_credentials: bool,
}

// --- Query parsing ---

#[derive(Debug, Default, Deserialize)]
pub struct PoisQuery {
    lat: Option<String>,
    lng: Option<String>,
    #[serde(rename = "radiusKm")]
    radius_km: Option<String>,
    #[serde(rename = "includeMedia")]
    include_media: Option<String>,
}

/// Parsed request parameters. Every field is optional; unparsable values are
/// treated as absent, never as client errors.
#[derive(Debug, PartialEq)]
struct RequestParams {
    lat: Option<f64>,
    lng: Option<f64>,
    radius_km: Option<f64>,
    include_media: bool,
}

impl RequestParams {
    fn from_query(query: &PoisQuery) -> Self {
        Self {
            lat: parse_float(query.lat.as_deref()),
            lng: parse_float(query.lng.as_deref()),
            radius_km: parse_float(query.radius_km.as_deref()),
            include_media: query.include_media.as_deref() == Some("true"),
        }
    }

    /// Cache key: the four parameters joined, absent ones as the literal
    /// `all`.
    fn cache_key(&self) -> String {
        format!(
            "{},{},{},{}",
            display_or_all(self.lat),
            display_or_all(self.lng),
            display_or_all(self.radius_km),
            self.include_media,
        )
    }

    /// Geofence filter, only when the center point and a positive radius are
    /// all present.
    fn geofence(&self) -> Option<Geofence> {
        match (self.lat, self.lng, self.radius_km) {
            (Some(lat), Some(lng), Some(radius_km)) if radius_km > 0.0 => Some(Geofence {
                lat,
                lng,
                radius_km,
            }),
            _ => None,
        }
    }
}

fn parse_float(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|f| f.is_finite())
}

fn display_or_all(value: Option<f64>) -> String {
    value.map_or_else(|| "all".to_string(), |v| v.to_string())
}

// --- Router ---

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/pois", any(pois_endpoint))
        .with_state(state)
        // CORS headers are pinned rather than going through CorsLayer: that
        // layer answers every OPTIONS itself with a 200, while this API's
        // contract promises a bare 204 from the handler.
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Authorization"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=120"),
        ))
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

// --- Handlers ---

async fn pois_endpoint(
    State(state): State<Arc<AppState>>,
    method: Method,
    Query(query): Query<PoisQuery>,
) -> Response {
    if method == Method::GET {
        get_pois(state, query).await
    } else if method == Method::OPTIONS {
        // Preflights land here; the CORS headers come from the response layers.
        StatusCode::NO_CONTENT.into_response()
    } else {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(serde_json::json!({ "error": "Method not allowed" })),
        )
            .into_response()
    }
}

async fn get_pois(state: Arc<AppState>, query: PoisQuery) -> Response {
    let params = RequestParams::from_query(&query);
    let key = params.cache_key();

    if let Some(data) = state.cache.get(&key) {
        info!(key = %key, count = data.len(), "Serving POIs from cache");
        return poi_response(data, "HIT");
    }

    if !state.has_credentials {
        return error_response("Missing API credentials (DP_API_USER, DP_API_PASS)");
    }

    let geofence = params.geofence();

    let pois = match state
        .source
        .fetch_pois(geofence.as_ref(), params.include_media)
        .await
    {
        Ok(pois) => pois,
        Err(err) => {
            warn!(error = %err, "POI fetch failed");
            return error_response(&err.to_string());
        }
    };

    // Events are enrichment only; the source already degrades failures to an
    // empty list.
    let events = state.source.fetch_events(geofence.as_ref()).await;

    let normalized = normalize::build_response(&pois, &events);
    info!(
        pois = pois.len(),
        events = events.len(),
        returned = normalized.len(),
        "Built POI response"
    );

    state.cache.set(&key, normalized.clone());
    poi_response(normalized, "MISS")
}

fn poi_response(data: Vec<NormalizedPoi>, cache_status: &'static str) -> Response {
    ([("x-cache", cache_status)], Json(data)).into_response()
}

fn error_response(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "error": "Internal server error",
            "message": message,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::Body;
    use axum::http::Request;
    use datenportal_client::{DatenportalError, Result};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use async_trait::async_trait;

    struct FakeSource {
        pois: Vec<Value>,
        events: Vec<Value>,
        fail_pois: bool,
        poi_calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(pois: Vec<Value>, events: Vec<Value>) -> Self {
            Self {
                pois,
                events,
                fail_pois: false,
                poi_calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                pois: Vec::new(),
                events: Vec::new(),
                fail_pois: true,
                poi_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PoiSource for FakeSource {
        async fn fetch_pois(
            &self,
            _geofence: Option<&Geofence>,
            _include_media: bool,
        ) -> Result<Vec<Value>> {
            self.poi_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_pois {
                return Err(DatenportalError::Api {
                    status: 502,
                    message: "upstream unavailable".to_string(),
                });
            }
            Ok(self.pois.clone())
        }

        async fn fetch_events(&self, _geofence: Option<&Geofence>) -> Vec<Value> {
            self.events.clone()
        }
    }

    fn state_with(source: Arc<FakeSource>) -> Arc<AppState> {
        Arc::new(AppState {
            source,
            cache: SingleSlotCache::new(CACHE_TTL),
            has_credentials: true,
        })
    }

    fn sample_poi() -> Value {
        json!({
            "id": 42,
            "name": "Stadtmuseum",
            "address": {
                "city": "Münster",
                "latitude": "51.9607",
                "longitude": "7.6261"
            },
            "types": [{ "name": "Museum" }]
        })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn unparsable_values_count_as_absent() {
        let query = PoisQuery {
            lat: Some("fifty-one".to_string()),
            lng: Some("7.62".to_string()),
            radius_km: None,
            include_media: Some("yes".to_string()),
        };
        let params = RequestParams::from_query(&query);
        assert_eq!(params.lat, None);
        assert_eq!(params.lng, Some(7.62));
        assert!(!params.include_media, "only the literal \"true\" enables media");
        assert_eq!(params.cache_key(), "all,7.62,all,false");
        assert_eq!(params.geofence(), None);
    }

    #[test]
    fn geofence_needs_center_and_positive_radius() {
        let full = RequestParams {
            lat: Some(51.9607),
            lng: Some(7.6261),
            radius_km: Some(5.0),
            include_media: false,
        };
        assert_eq!(
            full.geofence(),
            Some(Geofence {
                lat: 51.9607,
                lng: 7.6261,
                radius_km: 5.0
            })
        );

        let zero_radius = RequestParams {
            radius_km: Some(0.0),
            ..full
        };
        assert_eq!(zero_radius.geofence(), None);

        let no_lng = RequestParams {
            lat: Some(51.9607),
            lng: None,
            radius_km: Some(5.0),
            include_media: false,
        };
        assert_eq!(no_lng.geofence(), None);
    }

    #[tokio::test]
    async fn get_returns_normalized_pois_with_cors_headers() {
        let app = app(state_with(Arc::new(FakeSource::new(
            vec![sample_poi()],
            vec![json!({
                "start_datetime": "2025-06-01T18:00:00Z",
                "poi": { "id": 42 },
                "types": [{ "name": "Konzert" }]
            })],
        ))));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/pois?lat=51.9607&lng=7.6261&radiusKm=5")
                    .header("origin", "https://discovery.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "MISS");
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(response.headers()["cache-control"], "public, max-age=120");

        let body = body_json(response).await;
        let pois: Vec<NormalizedPoi> = serde_json::from_value(body).unwrap();
        assert_eq!(pois.len(), 1);
        assert_eq!(pois[0].id, json!(42));
        assert_eq!(pois[0].event_time.as_deref(), Some("18:00"));
        assert_eq!(pois[0].event_type.as_deref(), Some("Konzert"));
    }

    #[tokio::test]
    async fn second_identical_request_is_served_from_cache() {
        let source = Arc::new(FakeSource::new(vec![sample_poi()], Vec::new()));
        let app = app(state_with(source.clone()));

        let first = app
            .clone()
            .oneshot(Request::builder().uri("/pois").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.headers()["x-cache"], "MISS");

        let second = app
            .oneshot(Request::builder().uri("/pois").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.headers()["x-cache"], "HIT");
        assert_eq!(
            source.poi_calls.load(Ordering::SeqCst),
            1,
            "cache hit must not refetch upstream"
        );

        let body = body_json(second).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn different_parameters_bypass_and_evict_the_cache() {
        let source = Arc::new(FakeSource::new(vec![sample_poi()], Vec::new()));
        let app = app(state_with(source.clone()));

        for uri in ["/pois", "/pois?lat=51.9&lng=7.6&radiusKm=5", "/pois"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.headers()["x-cache"], "MISS");
        }
        assert_eq!(source.poi_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn options_returns_204_with_empty_body() {
        let app = app(state_with(Arc::new(FakeSource::new(Vec::new(), Vec::new()))));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/pois")
                    .header("origin", "https://discovery.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn post_returns_405_with_json_error() {
        let app = app(state_with(Arc::new(FakeSource::new(Vec::new(), Vec::new()))));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/pois")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Method not allowed");
    }

    #[tokio::test]
    async fn poi_fetch_failure_returns_500_with_message() {
        let app = app(state_with(Arc::new(FakeSource::failing())));

        let response = app
            .oneshot(Request::builder().uri("/pois").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn missing_credentials_fail_at_request_time() {
        let source = Arc::new(FakeSource::new(vec![sample_poi()], Vec::new()));
        let state = Arc::new(AppState {
            source: source.clone(),
            cache: SingleSlotCache::new(CACHE_TTL),
            has_credentials: false,
        });

        let response = app(state)
            .oneshot(Request::builder().uri("/pois").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["message"].as_str().unwrap().contains("DP_API_USER"));
        assert_eq!(source.poi_calls.load(Ordering::SeqCst), 0);
    }
}
