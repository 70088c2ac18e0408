use serde::Deserialize;
use serde_json::Value;

/// Page envelope returned by the Datenportal list endpoints.
///
/// Records are kept as raw `Value`s: the upstream schema is heterogeneous
/// (field names vary between datasets and API revisions), so interpretation
/// is left to the consumer.
#[derive(Debug, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub links: Option<PageLinks>,
}

/// Pagination navigation links. Only `next` matters: its presence signals
/// that more pages are available.
#[derive(Debug, Deserialize)]
pub struct PageLinks {
    #[serde(default)]
    pub next: Option<String>,
}

/// Circular search filter: center point plus radius in kilometres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geofence {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: f64,
}

impl Geofence {
    /// Render the `filter[geofence]` query value. The third component is an
    /// inner radius, always zero for our searches.
    pub fn as_filter(&self) -> String {
        format!("{},{},0,{}", self.lat, self.lng, self.radius_km)
    }
}
