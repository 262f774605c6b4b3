//! STAC export (spec §6.4, grounded in `original_source/stac.cpp`):
//! Catalog -> Collection -> Item JSON at version 1.0.0.

use chrono::{TimeZone, Utc};
use dronedb_core::entry::{Entry, EntryType};
use serde_json::{json, Value};

const STAC_VERSION: &str = "1.0.0";

/// Entry types the registry can render a thumbnail for, plus PointCloud
/// (spec §6.4: "any type that supports thumbnails or is a PointCloud").
fn supports_thumbnail(t: EntryType) -> bool {
    matches!(
        t,
        EntryType::Image
            | EntryType::GeoImage
            | EntryType::Panorama
            | EntryType::GeoPanorama
            | EntryType::Video
            | EntryType::GeoVideo
            | EntryType::GeoRaster
            | EntryType::PointCloud
    )
}

/// Lowercase alphanumeric plus `-`/`_`; runs of anything else collapse to
/// a single dash; leading/trailing dashes trimmed.
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_dash = false;
    for ch in raw.to_ascii_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

fn item_datetime(entry: &Entry) -> String {
    let capture_ms = entry.properties.get("captureTime").and_then(Value::as_i64);
    let epoch_ms = match capture_ms {
        Some(ms) => ms,
        None => entry.mtime * 1000,
    };
    Utc.timestamp_millis_opt(epoch_ms).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap()).to_rfc3339()
}

fn thumbnail_asset(collection_root: &str, entry: &Entry) -> Option<Value> {
    if !supports_thumbnail(entry.r#type) {
        return None;
    }
    let encoded_path = url_encode(&entry.path);
    Some(json!({
        "href": format!("{collection_root}/thumb?path={encoded_path}&size=512"),
        "title": "Thumbnail",
        "type": "image/webp",
        "roles": ["thumbnail"],
    }))
}

/// Minimal percent-encoding sufficient for a path query parameter; avoids
/// pulling in a dedicated form-encoding crate for one field.
fn url_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn bbox_for(entry: &Entry) -> Option<[f64; 4]> {
    if let Some((lon, lat, _)) = entry.point_geom {
        return Some([lon, lat, lon, lat]);
    }
    if let Some(ring) = &entry.polygon_geom {
        let mut min_lon = f64::INFINITY;
        let mut max_lon = f64::NEG_INFINITY;
        let mut min_lat = f64::INFINITY;
        let mut max_lat = f64::NEG_INFINITY;
        for (lon, lat, _) in ring {
            min_lon = min_lon.min(*lon);
            max_lon = max_lon.max(*lon);
            min_lat = min_lat.min(*lat);
            max_lat = max_lat.max(*lat);
        }
        return Some([min_lon, min_lat, max_lon, max_lat]);
    }
    None
}

fn geometry_for(entry: &Entry) -> Value {
    if let Some((lon, lat, _)) = entry.point_geom {
        return json!({"type": "Point", "coordinates": [lon, lat]});
    }
    if let Some(ring) = &entry.polygon_geom {
        let coords: Vec<[f64; 2]> = ring.iter().map(|(lon, lat, _)| [*lon, *lat]).collect();
        return json!({"type": "Polygon", "coordinates": [coords]});
    }
    Value::Null
}

/// Builds one STAC Item for `entry`.
pub fn item(collection_id: &str, collection_root: &str, entry: &Entry) -> Value {
    let stem = entry.path.rsplit('/').next().unwrap_or(&entry.path);
    let id = slugify(stem);
    let mut assets = serde_json::Map::new();
    assets.insert(
        "data".to_string(),
        json!({
            "href": format!("{collection_root}/file?path={}", url_encode(&entry.path)),
            "title": entry.path,
            "roles": ["data"],
        }),
    );
    if let Some(thumb) = thumbnail_asset(collection_root, entry) {
        assets.insert("thumbnail".to_string(), thumb);
    }

    json!({
        "stac_version": STAC_VERSION,
        "type": "Feature",
        "id": id,
        "collection": collection_id,
        "bbox": bbox_for(entry),
        "geometry": geometry_for(entry),
        "properties": {
            "datetime": item_datetime(entry),
            "ddb:type": entry.r#type.to_human(),
            "ddb:path": entry.path,
        },
        "assets": assets,
        "links": [
            {"rel": "collection", "href": "../collection.json"},
            {"rel": "parent", "href": "../collection.json"},
        ],
    })
}

pub fn collection(collection_id: &str, extent_4326: Option<(f64, f64, f64, f64)>, item_ids: &[String]) -> Value {
    let bbox = extent_4326.map(|(min_lon, min_lat, max_lon, max_lat)| vec![min_lon, min_lat, max_lon, max_lat]);
    json!({
        "stac_version": STAC_VERSION,
        "type": "Collection",
        "id": collection_id,
        "description": format!("DroneDB dataset export: {collection_id}"),
        "license": "proprietary",
        "extent": {
            "spatial": {"bbox": [bbox.unwrap_or_else(|| vec![-180.0, -90.0, 180.0, 90.0])]},
            "temporal": {"interval": [[Value::Null, Value::Null]]},
        },
        "links": item_ids.iter().map(|id| json!({"rel": "item", "href": format!("items/{id}.json")})).collect::<Vec<_>>(),
    })
}

pub fn catalog(collection_id: &str) -> Value {
    json!({
        "stac_version": STAC_VERSION,
        "type": "Catalog",
        "id": format!("{collection_id}-catalog"),
        "description": "DroneDB export catalog",
        "links": [{"rel": "child", "href": "collection.json"}],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_and_trims() {
        assert_eq!(slugify("My Drone Flight #1.jpg"), "my-drone-flight-1-jpg");
        assert_eq!(slugify("  --weird--  "), "weird");
        assert_eq!(slugify("snake_case_name"), "snake_case_name");
    }

    #[test]
    fn datetime_falls_back_to_mtime_without_capture_time() {
        let entry = Entry {
            path: "a.txt".to_string(),
            hash: "h".to_string(),
            r#type: EntryType::Generic,
            properties: json!({}),
            mtime: 1_700_000_000,
            size: 0,
            depth: 0,
            point_geom: None,
            polygon_geom: None,
        };
        let dt = item_datetime(&entry);
        assert!(dt.starts_with("2023-"));
    }

    #[test]
    fn thumbnail_asset_present_only_for_supported_types() {
        let mut entry = Entry {
            path: "a.jpg".to_string(),
            hash: "h".to_string(),
            r#type: EntryType::Generic,
            properties: json!({}),
            mtime: 0,
            size: 0,
            depth: 0,
            point_geom: None,
            polygon_geom: None,
        };
        assert!(thumbnail_asset("http://x", &entry).is_none());
        entry.r#type = EntryType::GeoImage;
        assert!(thumbnail_asset("http://x", &entry).is_some());
    }
}
