//! Defensive filtering and normalization of upstream POI records.
//!
//! The Datenportal's own query filters are not trusted to be exact or
//! complete, so every record is re-checked here against the allowed-city and
//! allowed-type policy before it leaves the proxy — this module is the
//! authoritative gate. Field names vary between datasets and API revisions;
//! each logical field is resolved through an ordered alias table rather than
//! branching code, so a new upstream alias is a table entry, not a rewrite.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::DateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// The only city this proxy serves. Matched case-insensitively and trimmed.
pub const ALLOWED_CITY: &str = "Münster";

/// POI type whitelist, exactly as specified by the discovery client.
pub const ALLOWED_POI_TYPES: &[&str] = &[
    "Museum",
    "Theater",
    "Schloss",
    "Park",
    "Garten",
    "Kloster",
    "Kulturstätte",
    "Tourist-Info",
    "Galerie",
    "Freilichtbühne",
    "Freizeitpark",
    "Naturraum",
    "Picknick",
    "Schwimmbad",
    "Biergarten",
    "Restaurant",
    "Café",
    "Imbiss",
    "Wirtshaus",
    "Eisdiele",
    "Gaststätte",
    "Schankwirtschaft",
    "Fahrradverleih",
    "Hofladen",
    "Schlosscafé",
    "Gastronomie",
    "Sehenswürdigkeit",
    "Kirche",
    "Marktplatz",
    "Bahnhof",
    "See",
    "Erlebnisbad",
    "Zoo",
    "Kino",
    "Picknickplatz",
    "Einkaufszentrum",
    "Rathaus",
    "Tierpark",
    "Bibliothek",
    "Kanueinsatzstellen",
    "Aussichtspunkt/ Aussichtsturm",
    "Historisches Gebäude",
    "Beachclub",
    "Brauerei/Brennerei",
    "Mühle",
    "Hofcafe",
    "Eventschiff",
    "Spielplatz",
    "Heimathaus",
    "Radservicestation",
    "Picknickstation",
    "Schutzhütte/Hütte",
    "Busbahnhof",
];

// ---------------------------------------------------------------------------
// Field alias tables
// ---------------------------------------------------------------------------

/// Ordered candidate paths for one logical field; first present match wins.
type FieldAliases = &'static [&'static [&'static str]];

const CITY_FIELDS: FieldAliases = &[&["address", "city"], &["city"]];
const LAT_FIELDS: FieldAliases = &[&["address", "latitude"], &["latitude"], &["lat"]];
const LNG_FIELDS: FieldAliases = &[&["address", "longitude"], &["longitude"], &["lng"]];
const DESCRIPTION_FIELDS: FieldAliases = &[&["description_text"], &["description"]];
const MEDIA_FIELDS: FieldAliases = &[&["public_media"], &["media"]];

// Start/end/time aliases differ between the three historical shapes event
// data arrives in: an embedded `events` list, a legacy `veranstaltungen`
// list, or bare fields on the POI itself.
const EVENT_START_FIELDS: FieldAliases = &[&["start"], &["begin"], &["start_date"], &["from_date"]];
const EVENT_END_FIELDS: FieldAliases = &[&["end"], &["end_date"], &["to_date"]];
const EVENT_TIME_FIELDS: FieldAliases = &[&["time"], &["event_time"]];

const VERANSTALTUNG_START_FIELDS: FieldAliases = &[&["beginn"], &["start"], &["start_date"]];
const VERANSTALTUNG_END_FIELDS: FieldAliases = &[&["ende"], &["end"], &["end_date"]];
const VERANSTALTUNG_TIME_FIELDS: FieldAliases = &[&["zeit"], &["time"]];

const POI_START_FIELDS: FieldAliases = &[
    &["start_date"],
    &["event_start"],
    &["from_date"],
    &["start"],
    &["beginn"],
];
const POI_END_FIELDS: FieldAliases = &[
    &["end_date"],
    &["event_end"],
    &["to_date"],
    &["end"],
    &["ende"],
];
const POI_TIME_FIELDS: FieldAliases = &[&["event_time"], &["time"], &["zeit"]];

// ---------------------------------------------------------------------------
// Output contract
// ---------------------------------------------------------------------------

/// Stable output shape consumed by the discovery client's map view.
///
/// `id` and `media` are passed through as raw JSON: ids may be numbers or
/// strings upstream, and media records have no schema we care about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPoi {
    pub id: Value,
    pub name: String,
    pub name2: Option<String>,
    pub description: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub street: Option<String>,
    pub house_number: Option<String>,
    pub types: Vec<String>,
    pub website: Option<String>,
    pub license_type: Option<String>,
    pub copyright: Option<String>,
    pub source: Option<String>,
    pub media: Value,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub event_time: Option<String>,
    pub event_type: Option<String>,
    pub event_description: Option<String>,
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

/// Loose presence test: null, false, 0, NaN and the empty string all read as
/// "not there". Empty arrays and objects are present values.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0 || f.is_nan()).unwrap_or(false),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Resolve the first present value among the alias paths.
fn lookup<'a>(record: &'a Value, aliases: FieldAliases) -> Option<&'a Value> {
    aliases.iter().find_map(|path| {
        let mut current = record;
        for key in *path {
            current = current.get(key)?;
        }
        (!is_falsy(current)).then_some(current)
    })
}

fn lookup_str(record: &Value, aliases: FieldAliases) -> Option<String> {
    lookup(record, aliases)
        .and_then(Value::as_str)
        .map(String::from)
}

fn str_field(record: &Value, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn first_element<'a>(record: &'a Value, key: &str) -> Option<&'a Value> {
    record
        .get(key)
        .and_then(Value::as_array)
        .and_then(|list| list.first())
}

/// Coordinate values arrive as numbers or strings depending on the dataset.
/// Anything unparsable coerces to 0.0 and is later dropped by the
/// coordinate gate.
fn parse_coord(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Canonical join key for a POI id, which may be numeric or a string upstream.
fn id_key(id: &Value) -> Option<String> {
    match id {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Longer descriptions are cut to 297 characters plus an ellipsis marker so
/// they fit the client's map popup.
const DESCRIPTION_LIMIT: usize = 300;

/// Remove HTML tags and `&nbsp;` entities, collapse runs of whitespace.
pub fn strip_html(raw: &str) -> String {
    let without_tags = TAG_RE.replace_all(raw, " ");
    let without_entities = without_tags.replace("&nbsp;", " ");
    WHITESPACE_RE
        .replace_all(&without_entities, " ")
        .trim()
        .to_string()
}

fn truncate_description(text: String) -> String {
    if text.chars().count() <= DESCRIPTION_LIMIT {
        return text;
    }
    let mut cut: String = text.chars().take(DESCRIPTION_LIMIT - 3).collect();
    cut.push_str("...");
    cut
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Defensive server-side re-check of the upstream query filters.
///
/// 1. City must equal the allowed city, trimmed and case-insensitive.
/// 2. The POI must carry at least one type tag matching the whitelist,
///    case-insensitively. No tags at all is a rejection.
pub fn poi_passes_filters(poi: &Value) -> bool {
    let city = lookup(poi, CITY_FIELDS)
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_lowercase();
    if city != ALLOWED_CITY.to_lowercase() {
        return false;
    }

    let Some(types) = poi.get("types").and_then(Value::as_array) else {
        return false;
    };
    let names = type_names(types);
    if names.is_empty() {
        return false;
    }

    names.iter().any(|name| {
        ALLOWED_POI_TYPES
            .iter()
            .any(|allowed| allowed.to_lowercase() == name.to_lowercase())
    })
}

/// Type tags arrive as `{ "name": "Museum" }` objects or bare strings.
fn type_names(types: &[Value]) -> Vec<String> {
    types
        .iter()
        .filter_map(|t| t.get("name").and_then(Value::as_str).or_else(|| t.as_str()))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Map one heterogeneous upstream POI record into the stable output shape.
pub fn normalize_poi(poi: &Value) -> NormalizedPoi {
    let address = poi.get("address");

    let lat = lookup(poi, LAT_FIELDS).map(parse_coord).unwrap_or(0.0);
    let lng = lookup(poi, LNG_FIELDS).map(parse_coord).unwrap_or(0.0);

    let types = poi
        .get("types")
        .and_then(Value::as_array)
        .map(|entries| type_names(entries))
        .unwrap_or_default();

    let mut description = lookup(poi, DESCRIPTION_FIELDS)
        .and_then(Value::as_str)
        .map(|raw| truncate_description(strip_html(raw)));

    let (start_date, end_date, event_time, embedded_description) = embedded_event_fields(poi);
    if description.is_none() {
        description = embedded_description;
    }

    NormalizedPoi {
        id: poi.get("id").cloned().unwrap_or(Value::Null),
        name: poi
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        name2: str_field(poi, "name2"),
        description,
        lat,
        lng,
        city: address.and_then(|a| str_field(a, "city")),
        postal_code: address.and_then(|a| str_field(a, "postal_code")),
        street: address.and_then(|a| str_field(a, "street")),
        house_number: address.and_then(|a| str_field(a, "house_number")),
        types,
        website: str_field(poi, "website"),
        license_type: str_field(poi, "license_type"),
        copyright: str_field(poi, "copyright"),
        source: str_field(poi, "source"),
        media: lookup(poi, MEDIA_FIELDS)
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())),
        start_date,
        end_date,
        event_time,
        event_type: None,
        event_description: None,
    }
}

/// Start/end/time (and possibly a description) carried directly on the POI
/// record itself, before any joined event is considered.
fn embedded_event_fields(
    poi: &Value,
) -> (Option<String>, Option<String>, Option<String>, Option<String>) {
    if let Some(event) = first_element(poi, "events") {
        return (
            lookup_str(event, EVENT_START_FIELDS),
            lookup_str(event, EVENT_END_FIELDS),
            lookup_str(event, EVENT_TIME_FIELDS),
            str_field(event, "description"),
        );
    }
    if let Some(veranstaltung) = first_element(poi, "veranstaltungen") {
        return (
            lookup_str(veranstaltung, VERANSTALTUNG_START_FIELDS),
            lookup_str(veranstaltung, VERANSTALTUNG_END_FIELDS),
            lookup_str(veranstaltung, VERANSTALTUNG_TIME_FIELDS),
            None,
        );
    }
    (
        lookup_str(poi, POI_START_FIELDS),
        lookup_str(poi, POI_END_FIELDS),
        lookup_str(poi, POI_TIME_FIELDS),
        None,
    )
}

// ---------------------------------------------------------------------------
// Join and enrichment
// ---------------------------------------------------------------------------

/// Index independently fetched events by their owning POI id. Events without
/// a resolvable POI reference cannot be joined and are skipped.
pub fn events_by_poi_id(events: &[Value]) -> HashMap<String, Vec<&Value>> {
    let mut map: HashMap<String, Vec<&Value>> = HashMap::new();
    for event in events {
        let Some(key) = event
            .get("poi")
            .and_then(|poi| poi.get("id"))
            .and_then(id_key)
        else {
            continue;
        };
        map.entry(key).or_default().push(event);
    }
    map
}

/// Overlay data from a joined event onto a normalized POI. Only the first
/// event found for a POI is surfaced.
pub fn apply_event(normalized: &mut NormalizedPoi, event: &Value) {
    normalized.start_date = str_field(event, "start_datetime");
    normalized.end_date = str_field(event, "end_datetime");
    normalized.event_time = normalized.start_date.as_deref().and_then(format_event_time);

    if let Some(name) = event
        .get("types")
        .and_then(Value::as_array)
        .and_then(|types| types.first())
        .and_then(|t| t.get("name"))
        .and_then(Value::as_str)
    {
        normalized.event_type = Some(name.to_string());
    }
    if let Some(text) = event.get("description_text").and_then(Value::as_str) {
        normalized.event_description = Some(strip_html(text));
    }
}

/// 24-hour HH:MM display time derived from an RFC 3339 event start.
fn format_event_time(start: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(start)
        .ok()
        .map(|dt| dt.format("%H:%M").to_string())
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Full per-request pipeline: defensive filter, normalize, enrich with the
/// first joined event, then drop anything without usable coordinates.
pub fn build_response(pois: &[Value], events: &[Value]) -> Vec<NormalizedPoi> {
    let by_poi = events_by_poi_id(events);

    pois.iter()
        .filter(|poi| poi_passes_filters(poi))
        .map(|poi| {
            let mut normalized = normalize_poi(poi);
            if let Some(first) = poi
                .get("id")
                .and_then(id_key)
                .and_then(|key| by_poi.get(&key))
                .and_then(|list| list.first())
            {
                apply_event(&mut normalized, first);
            }
            normalized
        })
        // Zero coordinates are indistinguishable from missing ones under the
        // upstream's coercion rules; both are dropped.
        .filter(|poi| poi.lat != 0.0 && poi.lng != 0.0)
        .collect()
}
