//! HTTP client for the Datenportal Münsterland open-data API.
//!
//! Two list endpoints matter to us: `/pois` and `/events`. Both paginate via
//! `page[size]`/`page[number]` and signal further pages with a `links.next`
//! entry. The client fetches pages sequentially until the upstream is
//! exhausted or a hard page cap is hit; the caps bound worst-case latency and
//! upstream load no matter how large the dataset grows.
//!
//! Policy (which city, which POI types) is the caller's business — this crate
//! only knows how to talk to the API.

pub mod error;
pub mod types;

pub use error::{DatenportalError, Result};
pub use types::{Geofence, ListResponse, PageLinks};

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header;
use serde_json::Value;
use tracing::{debug, warn};

/// Records requested per page. A full page is one of the two signals that
/// more pages may follow.
pub const PAGE_SIZE: usize = 200;

/// Hard cap for POI pagination (2000 records).
pub const MAX_POI_PAGES: u32 = 10;

/// Hard cap for event pagination (1000 records). Events are enrichment only,
/// so they get a smaller budget.
pub const MAX_EVENT_PAGES: u32 = 5;

pub struct DatenportalClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl DatenportalClient {
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Basic-auth header value. Credentials are encoded as UTF-8 bytes before
    /// base64 so usernames/passwords containing umlauts or `§` survive.
    fn auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.username, self.password);
        format!("Basic {}", BASE64.encode(credentials.as_bytes()))
    }

    /// Fetch every POI page for a city, filtered to the given type names and
    /// optional geofence. Any non-success status aborts pagination and is
    /// returned as an error — the aggregate result would be measurably
    /// incomplete otherwise.
    pub async fn fetch_pois(
        &self,
        city: &str,
        type_names: &[&str],
        geofence: Option<&Geofence>,
        include_media: bool,
    ) -> Result<Vec<Value>> {
        let mut all_pois = Vec::new();
        let mut page_number = 1u32;

        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("filter[address.city]", city.to_string()),
                ("filter[types.name]", type_names.join(",")),
                ("page[size]", PAGE_SIZE.to_string()),
                ("page[number]", page_number.to_string()),
            ];
            if include_media {
                params.push(("append", "public_media,all_translations_grouped".to_string()));
            }
            if let Some(fence) = geofence {
                params.push(("filter[geofence]", fence.as_filter()));
            }

            let page = self.fetch_page("pois", &params).await?;
            let fetched = page.data.len();
            let has_next = page
                .links
                .as_ref()
                .and_then(|links| links.next.as_ref())
                .is_some();
            debug!(page = page_number, fetched, has_next, "Fetched POI page");

            all_pois.extend(page.data);

            if !more_pages(fetched, has_next, page_number, MAX_POI_PAGES) {
                break;
            }
            page_number += 1;
        }

        debug!(total = all_pois.len(), "POI pagination complete");
        Ok(all_pois)
    }

    /// Fetch current-or-future events for a city. Unlike POIs, any failure
    /// here degrades to an empty list: events only enrich the response, and
    /// their absence must not take the whole request down.
    pub async fn fetch_events(&self, city: &str, geofence: Option<&Geofence>) -> Vec<Value> {
        match self.fetch_event_pages(city, geofence).await {
            Ok(events) => events,
            Err(err) => {
                warn!(error = %err, "Event fetch failed, continuing without events");
                Vec::new()
            }
        }
    }

    async fn fetch_event_pages(
        &self,
        city: &str,
        geofence: Option<&Geofence>,
    ) -> Result<Vec<Value>> {
        let mut all_events = Vec::new();
        let mut page_number = 1u32;

        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("filter[poi.address.city]", city.to_string()),
                ("filter[in_future_or_current]", "true".to_string()),
                ("page[size]", PAGE_SIZE.to_string()),
                ("page[number]", page_number.to_string()),
            ];
            if let Some(fence) = geofence {
                params.push(("filter[geofence]", fence.as_filter()));
            }

            let page = self.fetch_page("events", &params).await?;
            let fetched = page.data.len();
            debug!(page = page_number, fetched, "Fetched event page");

            all_events.extend(page.data);

            // The events endpoint is paged the same way but we only trust the
            // page length as a continuation signal.
            if !more_pages(fetched, true, page_number, MAX_EVENT_PAGES) {
                break;
            }
            page_number += 1;
        }

        debug!(total = all_events.len(), "Event pagination complete");
        Ok(all_events)
    }

    async fn fetch_page(&self, endpoint: &str, params: &[(&str, String)]) -> Result<ListResponse> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let resp = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, self.auth_header())
            .header(header::ACCEPT, "application/json")
            .query(params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(DatenportalError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }
}

/// Whether another page should be requested after the current one.
///
/// Exhaustion is signalled by a short page or (where the caller trusts it) a
/// missing `links.next`; `max_pages` bounds the loop regardless of what the
/// upstream claims.
fn more_pages(fetched: usize, has_next: bool, current_page: u32, max_pages: u32) -> bool {
    fetched == PAGE_SIZE && has_next && current_page < max_pages
}
