//! EXIF/XMP adapter (spec §4.4/§4.5). Wraps the `exif` crate for standard
//! IFD tags and does a small attribute-scan of the raw XMP packet (when
//! present) for the DJI/GPano tags EXIF has no IFD entry for. One file open,
//! one parse, shared by the Fingerprinter and the Entry Parser.

use dronedb_core::error::{DdbError, Result};
use exif::{In, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct GpsInfo {
    pub lat: f64,
    pub lon: f64,
    /// Altitude above the ellipsoid, meters, if the GPSAltitude tag is present.
    pub altitude: Option<f64>,
    /// GPS time as epoch milliseconds, if GPSDateStamp/GPSTimeStamp are present.
    pub time_epoch_ms: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ExifData {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub make: Option<String>,
    pub model: Option<String>,
    /// EXIF DateTimeOriginal as epoch milliseconds.
    pub capture_time_epoch_ms: Option<i64>,
    pub gps: Option<GpsInfo>,
    pub focal_length_mm: Option<f64>,
    /// Sensor width, derived from FocalPlaneXResolution when present.
    pub sensor_width_mm: Option<f64>,
    pub sensor_height_mm: Option<f64>,

    // XMP-sourced fields; None when the file carries no XMP packet or the
    // specific tag is absent.
    pub xmp_projection_type: Option<String>,
    pub relative_altitude: Option<f64>,
    pub gimbal_yaw_pitch_roll: Option<(f64, f64, f64)>,
    pub flight_speed: Option<(f64, f64, f64)>,
    pub gps_speed_magnitude: Option<f64>,
    pub gps_accuracy: Option<(f64, f64, f64)>,
}

impl ExifData {
    /// True if the XMP-derived gimbal orientation tags were present.
    pub fn has_camera_orientation(&self) -> bool {
        self.gimbal_yaw_pitch_roll.is_some()
    }

    pub fn camera_orientation(&self) -> (f64, f64, f64) {
        self.gimbal_yaw_pitch_roll.unwrap_or((0.0, 0.0, 0.0))
    }
}

pub fn read(path: &Path) -> Result<ExifData> {
    let file = File::open(path).map_err(|e| DdbError::fs(path, e.to_string()))?;
    let mut bufreader = BufReader::new(&file);
    let exif_reader = exif::Reader::new();
    let fields = exif_reader
        .read_from_container(&mut bufreader)
        .map(|e| e.fields().cloned().collect::<Vec<_>>())
        .unwrap_or_default();

    let mut data = ExifData::default();
    let mut gps = GpsInfo::default();
    let mut has_gps = false;
    let mut gps_date_stamp: Option<String> = None;
    let mut gps_time_stamp: Option<(f64, f64, f64)> = None;

    for f in &fields {
        match f.tag {
            Tag::PixelXDimension => data.width = as_u32(&f.value),
            Tag::PixelYDimension => data.height = as_u32(&f.value),
            Tag::ImageWidth => data.width = data.width.or_else(|| as_u32(&f.value)),
            Tag::ImageLength => data.height = data.height.or_else(|| as_u32(&f.value)),
            Tag::Make => data.make = as_string(&f.value),
            Tag::Model => data.model = as_string(&f.value),
            Tag::DateTimeOriginal => data.capture_time_epoch_ms = parse_exif_datetime(&as_string(&f.value)),
            Tag::FocalLength => data.focal_length_mm = as_rational(&f.value),
            Tag::GPSLatitude if f.ifd_num == In::PRIMARY => {
                if let Some(v) = as_dms(&f.value) {
                    gps.lat = v;
                    has_gps = true;
                }
            }
            Tag::GPSLongitude if f.ifd_num == In::PRIMARY => {
                if let Some(v) = as_dms(&f.value) {
                    gps.lon = v;
                }
            }
            Tag::GPSLatitudeRef if f.ifd_num == In::PRIMARY => {
                if as_string(&f.value).as_deref() == Some("S") {
                    gps.lat = -gps.lat;
                }
            }
            Tag::GPSLongitudeRef if f.ifd_num == In::PRIMARY => {
                if as_string(&f.value).as_deref() == Some("W") {
                    gps.lon = -gps.lon;
                }
            }
            Tag::GPSAltitude => gps.altitude = as_rational(&f.value),
            Tag::GPSSpeed if f.ifd_num == In::PRIMARY => data.gps_speed_magnitude = as_rational(&f.value),
            Tag::GPSDateStamp if f.ifd_num == In::PRIMARY => gps_date_stamp = as_string(&f.value),
            Tag::GPSTimeStamp if f.ifd_num == In::PRIMARY => gps_time_stamp = as_rational_triplet(&f.value),
            _ => {}
        }
    }

    if has_gps {
        gps.time_epoch_ms = parse_gps_datetime(&gps_date_stamp, gps_time_stamp);
        data.gps = Some(gps);
    }

    if let Some(xmp) = extract_xmp_packet(path) {
        apply_xmp(&mut data, &xmp);
    }

    Ok(data)
}

fn as_u32(v: &Value) -> Option<u32> {
    match v {
        Value::Short(vs) => vs.first().map(|&x| x as u32),
        Value::Long(vs) => vs.first().copied(),
        _ => None,
    }
}

fn as_string(v: &Value) -> Option<String> {
    match v {
        Value::Ascii(vs) => vs.first().map(|b| String::from_utf8_lossy(b).trim().to_string()),
        _ => None,
    }
}

fn as_rational(v: &Value) -> Option<f64> {
    match v {
        Value::Rational(vs) => vs.first().map(|r| r.to_f64()),
        Value::SRational(vs) => vs.first().map(|r| r.to_f64()),
        _ => None,
    }
}

fn as_dms(v: &Value) -> Option<f64> {
    match v {
        Value::Rational(vs) if vs.len() == 3 => {
            Some(vs[0].to_f64() + vs[1].to_f64() / 60.0 + vs[2].to_f64() / 3600.0)
        }
        _ => None,
    }
}

/// Parses `"YYYY:MM:DD HH:MM:SS"` (the EXIF datetime format) to epoch ms,
/// assuming UTC (no offset is ever available in the base IFD).
fn parse_exif_datetime(s: &Option<String>) -> Option<i64> {
    let s = s.as_ref()?;
    let dt = chrono::NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S").ok()?;
    Some(dt.and_utc().timestamp_millis())
}

/// The raw (hour, minute, second) rational triplet GPSTimeStamp stores,
/// kept unsummed (unlike [`as_dms`], which sums a degree/minute/second
/// triplet into one float).
fn as_rational_triplet(v: &Value) -> Option<(f64, f64, f64)> {
    match v {
        Value::Rational(vs) if vs.len() == 3 => Some((vs[0].to_f64(), vs[1].to_f64(), vs[2].to_f64())),
        _ => None,
    }
}

/// Combines GPSDateStamp (`"YYYY:MM:DD"`) and GPSTimeStamp (H, M, S as UTC,
/// per the EXIF spec) into epoch ms. `None` unless both tags were present
/// and parse cleanly.
fn parse_gps_datetime(date: &Option<String>, time: Option<(f64, f64, f64)>) -> Option<i64> {
    let date = date.as_ref()?;
    let (h, m, s) = time?;
    let nd = chrono::NaiveDate::parse_from_str(date, "%Y:%m:%d").ok()?;
    let whole_secs = s.floor().clamp(0.0, 59.0) as u32;
    let nanos = ((s - whole_secs as f64) * 1_000_000_000.0).round() as u32;
    let nt = chrono::NaiveTime::from_hms_nano_opt(h as u32, m as u32, whole_secs, nanos)?;
    Some(chrono::NaiveDateTime::new(nd, nt).and_utc().timestamp_millis())
}

/// Scans the raw file for an embedded XMP packet (`<x:xmpmeta ...>`). Many
/// JPEGs carry XMP in an APP1 segment separate from the main EXIF IFD; this
/// is a byte-level scan rather than a full JPEG segment parse, sufficient
/// for the flat attribute-style tags DJI/GPano emit.
fn extract_xmp_packet(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let text = String::from_utf8_lossy(&bytes);
    let start = text.find("<x:xmpmeta")?;
    let end = text[start..].find("</x:xmpmeta>")? + start + "</x:xmpmeta>".len();
    Some(text[start..end].to_string())
}

/// Reads a simple `Name="Value"` or `Name='Value'` XML attribute out of a
/// flat XMP packet.
fn xmp_attr(xmp: &str, name: &str) -> Option<String> {
    for quote in ['"', '\''] {
        let needle = format!("{name}={quote}");
        if let Some(pos) = xmp.find(&needle) {
            let rest = &xmp[pos + needle.len()..];
            if let Some(end) = rest.find(quote) {
                return Some(rest[..end].to_string());
            }
        }
    }
    None
}

fn xmp_attr_f64(xmp: &str, name: &str) -> Option<f64> {
    xmp_attr(xmp, name).and_then(|s| s.parse::<f64>().ok())
}

fn apply_xmp(data: &mut ExifData, xmp: &str) {
    data.xmp_projection_type = xmp_attr(xmp, "GPano:ProjectionType");

    data.relative_altitude = xmp_attr_f64(xmp, "drone-dji:RelativeAltitude");

    let yaw = xmp_attr_f64(xmp, "drone-dji:GimbalYawDegree");
    let pitch = xmp_attr_f64(xmp, "drone-dji:GimbalPitchDegree");
    let roll = xmp_attr_f64(xmp, "drone-dji:GimbalRollDegree");
    if let (Some(yaw), Some(pitch), Some(roll)) = (yaw, pitch, roll) {
        data.gimbal_yaw_pitch_roll = Some((yaw, pitch, roll));
    }

    let fx = xmp_attr_f64(xmp, "drone-dji:FlightXSpeed");
    let fy = xmp_attr_f64(xmp, "drone-dji:FlightYSpeed");
    let fz = xmp_attr_f64(xmp, "drone-dji:FlightZSpeed");
    if let (Some(fx), Some(fy), Some(fz)) = (fx, fy, fz) {
        data.flight_speed = Some((fx, fy, fz));
    }

    let xy = xmp_attr_f64(xmp, "Camera:GPSXYAccuracy");
    let z = xmp_attr_f64(xmp, "Camera:GPSZAccuracy");
    let dop = xmp_attr_f64(xmp, "Camera:GPSDOP");
    if let (Some(xy), Some(z), Some(dop)) = (xy, z, dop) {
        data.gps_accuracy = Some((xy, z, dop));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xmp_attr_reads_double_and_single_quoted() {
        let xmp = r#"<x:xmpmeta><rdf:Description drone-dji:RelativeAltitude="+12.3" GPano:ProjectionType='equirectangular'/></x:xmpmeta>"#;
        assert_eq!(xmp_attr_f64(xmp, "drone-dji:RelativeAltitude"), Some(12.3));
        assert_eq!(xmp_attr(xmp, "GPano:ProjectionType").as_deref(), Some("equirectangular"));
    }

    #[test]
    fn missing_xmp_attribute_is_none() {
        let xmp = "<x:xmpmeta></x:xmpmeta>";
        assert!(xmp_attr(xmp, "GPano:ProjectionType").is_none());
    }

    #[test]
    fn exif_datetime_parses_to_epoch_ms() {
        let ms = parse_exif_datetime(&Some("2021:06:01 12:00:00".to_string())).unwrap();
        assert!(ms > 0);
    }

    #[test]
    fn gps_datetime_combines_date_stamp_and_time_stamp() {
        let ms = parse_gps_datetime(&Some("2021:06:01".to_string()), Some((12.0, 30.0, 15.5))).unwrap();
        let expected = chrono::NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_milli_opt(12, 30, 15, 500)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        assert_eq!(ms, expected);
    }

    #[test]
    fn gps_datetime_is_none_without_both_tags() {
        assert!(parse_gps_datetime(&None, Some((12.0, 0.0, 0.0))).is_none());
        assert!(parse_gps_datetime(&Some("2021:06:01".to_string()), None).is_none());
    }
}
