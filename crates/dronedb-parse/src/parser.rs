//! Entry Parser (spec §4.5): given a preliminary [`Entry`] (path + type
//! already fingerprinted) and the absolute filesystem path, populates hash,
//! size, mtime, geometry and type-specific `properties`.

use crate::dsm::DsmClient;
use crate::exif_adapter::ExifData;
use crate::fingerprint::Fingerprint;
use crate::{footprint, gdal_adapter, pdal_adapter};
use dronedb_core::entry::{Entry, EntryType};
use dronedb_core::error::{DdbError, Result};
use dronedb_core::hash::file_sha256;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

/// Parses `abs_path` (already fingerprinted as `entry_type`) into a fully
/// populated entry at `rel_path`. `fp.exif`, if present, is reused instead
/// of re-opening the file (spec §4.4's shared-EXIF-parse rule).
pub fn parse(
    rel_path: &str,
    abs_path: &Path,
    fp: Fingerprint,
    dsm: &DsmClient,
) -> Result<Entry> {
    let metadata = fs::metadata(abs_path).map_err(|e| DdbError::fs(abs_path, e.to_string()))?;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    if fp.entry_type == EntryType::Directory {
        let mut entry = Entry::new_directory(rel_path);
        entry.mtime = mtime;
        return Ok(entry);
    }

    let hash = file_sha256(abs_path)?;
    let size = metadata.len() as i64;

    let (properties, point_geom, polygon_geom) = match fp.entry_type {
        EntryType::Generic | EntryType::Markdown => (json!({}), None, None),
        EntryType::Image | EntryType::Panorama | EntryType::Video => {
            let exif = fp.exif.unwrap_or_default();
            (image_properties(&exif), None, None)
        }
        EntryType::GeoImage | EntryType::GeoPanorama | EntryType::GeoVideo => {
            let exif = fp.exif.unwrap_or_default();
            parse_geo_image(&exif, dsm)
        }
        EntryType::PointCloud => parse_point_cloud(abs_path)?,
        EntryType::GeoRaster => parse_georaster(abs_path)?,
        EntryType::Model => (model_properties(abs_path), None, None),
        EntryType::Vector => (vector_properties(abs_path), None, None),
        EntryType::Directory | EntryType::Undefined | EntryType::DroneDb => (json!({}), None, None),
    };

    let mut entry = Entry {
        path: rel_path.to_string(),
        hash,
        r#type: fp.entry_type,
        properties,
        mtime,
        size,
        depth: 0,
        point_geom,
        polygon_geom,
    };
    entry.recompute_depth();
    Ok(entry)
}

/// Epoch-ms capture time, preferring GPS time over `DateTimeOriginal` when
/// the file carries a GPSDateStamp/GPSTimeStamp pair (spec §4.5).
fn capture_time(exif: &ExifData) -> Option<i64> {
    exif.gps.as_ref().and_then(|gps| gps.time_epoch_ms).or(exif.capture_time_epoch_ms)
}

fn image_properties(exif: &ExifData) -> Value {
    json!({
        "width": exif.width,
        "height": exif.height,
        "make": exif.make,
        "model": exif.model,
        "captureTime": capture_time(exif),
        "cameraYaw": exif.camera_orientation().0,
        "cameraPitch": exif.camera_orientation().1,
        "cameraRoll": exif.camera_orientation().2,
        "hasCameraOrientation": exif.has_camera_orientation(),
    })
}

fn parse_geo_image(exif: &ExifData, dsm: &DsmClient) -> (Value, Option<(f64, f64, f64)>, Option<Vec<(f64, f64, f64)>>) {
    let mut props = image_properties(exif);
    let Some(gps) = &exif.gps else {
        return (props, None, None);
    };

    let altitude = gps.altitude.unwrap_or_else(|| dsm.altitude_for(gps.lat, gps.lon));
    let point = (gps.lon, gps.lat, altitude);

    if let Some(speed) = exif.flight_speed {
        props["flightSpeed"] = json!(speed);
    } else if let Some(mag) = exif.gps_speed_magnitude {
        props["flightSpeed"] = json!((mag, 0.0, 0.0));
    }
    if let Some((xy, z, dop)) = exif.gps_accuracy {
        props["gpsAccuracy"] = json!({"xy": xy, "z": z, "dop": dop});
    }

    let polygon = match (exif.relative_altitude, exif.gimbal_yaw_pitch_roll, exif.focal_length_mm, exif.sensor_width_mm, exif.sensor_height_mm) {
        (Some(rel_alt), Some((yaw, pitch, roll)), Some(focal), Some(sw), Some(sh)) => footprint::compute_footprint(
            gps.lon, gps.lat, altitude, rel_alt, yaw, pitch, roll, focal, sw, sh,
        ),
        _ => None,
    };

    (props, Some(point), polygon)
}

fn parse_point_cloud(abs_path: &Path) -> Result<(Value, Option<(f64, f64, f64)>, Option<Vec<(f64, f64, f64)>>)> {
    let info = pdal_adapter::probe(abs_path)?;
    let props = json!({
        "pointCount": info.point_count,
        "wktProjection": info.wkt_projection,
        "dimensions": info.dimensions,
        "bounds": {
            "minX": info.bounds.0, "minY": info.bounds.1, "minZ": info.bounds.2,
            "maxX": info.bounds.3, "maxY": info.bounds.4, "maxZ": info.bounds.5,
        },
        "centroid": info.centroid,
    });

    // Polygon bounds reprojected to EPSG:4326 (spec §4.5), reusing the same
    // GDAL coordinate-transform path the raster side uses. `pdal info`
    // leaves `srs.wkt` empty for point clouds with no recognized CRS; in
    // that case there's nothing to reproject from.
    let (min_x, min_y, _, max_x, max_y, _) = info.bounds;
    let ring = [(min_x, min_y), (max_x, min_y), (max_x, max_y), (min_x, max_y)];
    let polygon = if info.wkt_projection.trim().is_empty() {
        None
    } else {
        Some(gdal_adapter::reproject_ring_to_4326(&ring, &info.wkt_projection)?)
    };

    Ok((props, None, polygon))
}

fn parse_georaster(abs_path: &Path) -> Result<(Value, Option<(f64, f64, f64)>, Option<Vec<(f64, f64, f64)>>)> {
    let info = gdal_adapter::read_raster_info(abs_path)?;
    let props = json!({
        "projection": info.projection_wkt,
        "geotransform": info.geotransform,
        "width": info.width,
        "height": info.height,
        "nodata": info.nodata,
    });
    Ok((props, None, Some(info.footprint_4326)))
}

fn model_properties(abs_path: &Path) -> Value {
    let stem = abs_path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let dir = abs_path.parent().unwrap_or_else(|| Path::new("."));
    let mut sidecars = vec![];
    if abs_path.extension().and_then(|e| e.to_str()) == Some("obj") {
        let mtl = dir.join(format!("{stem}.mtl"));
        if mtl.exists() {
            sidecars.push(mtl.file_name().unwrap().to_string_lossy().to_string());
        }
    }
    json!({ "sidecars": sidecars })
}

fn vector_properties(abs_path: &Path) -> Value {
    let stem = abs_path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let dir = abs_path.parent().unwrap_or_else(|| Path::new("."));
    let mut sidecars = vec![];
    if abs_path.extension().and_then(|e| e.to_str()) == Some("shp") {
        for ext in ["dbf", "prj", "shx", "cpg"] {
            let sidecar = dir.join(format!("{stem}.{ext}"));
            if sidecar.exists() {
                sidecars.push(sidecar.file_name().unwrap().to_string_lossy().to_string());
            }
        }
    }
    json!({ "sidecars": sidecars })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif_adapter::GpsInfo;
    use dronedb_core::config::LayeredConfig;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn dsm() -> DsmClient {
        DsmClient::from_config(&LayeredConfig::with_defaults())
    }

    #[test]
    fn generic_file_gets_only_hash_size_mtime() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"hello").unwrap();
        let fp = Fingerprint { entry_type: EntryType::Generic, exif: None };
        let entry = parse("notes.bin", f.path(), fp, &dsm()).unwrap();
        assert_eq!(entry.size, 5);
        assert!(!entry.hash.is_empty());
        assert_eq!(entry.properties, json!({}));
    }

    #[test]
    fn geo_image_without_footprint_inputs_has_point_but_no_polygon() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"jpegbytes").unwrap();
        let exif = ExifData {
            gps: Some(GpsInfo { lat: 50.8, lon: -0.13, altitude: Some(100.0), time_epoch_ms: None }),
            ..Default::default()
        };
        let fp = Fingerprint { entry_type: EntryType::GeoImage, exif: Some(exif) };
        let entry = parse("a.jpg", f.path(), fp, &dsm()).unwrap();
        assert!(entry.point_geom.is_some());
        assert!(entry.polygon_geom.is_none());
    }

    #[test]
    fn capture_time_prefers_gps_time_over_datetime_original() {
        let exif = ExifData {
            capture_time_epoch_ms: Some(1_000),
            gps: Some(GpsInfo { lat: 50.8, lon: -0.13, altitude: None, time_epoch_ms: Some(2_000) }),
            ..Default::default()
        };
        assert_eq!(capture_time(&exif), Some(2_000));
    }

    #[test]
    fn capture_time_falls_back_to_datetime_original_without_gps_time() {
        let exif = ExifData {
            capture_time_epoch_ms: Some(1_000),
            gps: Some(GpsInfo { lat: 50.8, lon: -0.13, altitude: None, time_epoch_ms: None }),
            ..Default::default()
        };
        assert_eq!(capture_time(&exif), Some(1_000));
    }
}
