//! Seam between the HTTP surface and the Datenportal client.
//!
//! Handlers talk to a `PoiSource` trait object so the pipeline can be
//! exercised in tests with canned records instead of a live upstream.

use async_trait::async_trait;
use datenportal_client::{DatenportalClient, Geofence, Result};
use serde_json::Value;

use crate::normalize::{ALLOWED_CITY, ALLOWED_POI_TYPES};

#[async_trait]
pub trait PoiSource: Send + Sync {
    /// Fetch every POI page for the allowed city. Failures are fatal for the
    /// request — a partial POI list would be measurably incomplete.
    async fn fetch_pois(
        &self,
        geofence: Option<&Geofence>,
        include_media: bool,
    ) -> Result<Vec<Value>>;

    /// Fetch current-or-future events for the allowed city. Failures degrade
    /// to an empty list.
    async fn fetch_events(&self, geofence: Option<&Geofence>) -> Vec<Value>;
}

/// Production source backed by the Datenportal API, with the city and type
/// policy baked in.
pub struct DatenportalSource {
    client: DatenportalClient,
}

impl DatenportalSource {
    pub fn new(client: DatenportalClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PoiSource for DatenportalSource {
    async fn fetch_pois(
        &self,
        geofence: Option<&Geofence>,
        include_media: bool,
    ) -> Result<Vec<Value>> {
        self.client
            .fetch_pois(ALLOWED_CITY, ALLOWED_POI_TYPES, geofence, include_media)
            .await
    }

    async fn fetch_events(&self, geofence: Option<&Geofence>) -> Vec<Value> {
        self.client.fetch_events(ALLOWED_CITY, geofence).await
    }
}
