//! Web-Mercator/TMS tile math (spec §4.2): the shared coordinate plumbing
//! used by both the raster and EPT tilers and by the tile cache manager.

use dronedb_core::error::{DdbError, Result};
use std::f64::consts::PI;

/// WGS84 equatorial radius used by the spherical Web-Mercator projection.
pub const EARTH_RADIUS: f64 = 6378137.0;

/// Maximum absolute latitude representable in Web-Mercator.
pub const MAX_LATITUDE: f64 = 85.051129;

/// `2 * pi * R`, i.e. the full circumference, used to shift the Mercator
/// origin to the center of the projected plane.
const ORIGIN_SHIFT: f64 = PI * EARTH_RADIUS;

/// Google-scheme (XYZ) Web-Mercator tile math, parameterized on tile side.
#[derive(Debug, Clone, Copy)]
pub struct Mercator {
    pub tile_size: u32,
}

impl Default for Mercator {
    fn default() -> Self {
        Self { tile_size: 256 }
    }
}

impl Mercator {
    pub fn new(tile_size: u32) -> Self {
        Self { tile_size }
    }

    /// Meters-per-pixel at zoom level `z`.
    pub fn resolution(&self, z: u32) -> f64 {
        (2.0 * PI * EARTH_RADIUS) / (self.tile_size as f64) / 2f64.powi(z as i32)
    }

    /// Converts lon/lat (EPSG:4326) to Web-Mercator meters (EPSG:3857).
    /// Fails with `DomainError` outside the Mercator-valid latitude range.
    pub fn lonlat_to_meters(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        if lat.abs() > MAX_LATITUDE {
            return Err(DdbError::app(format!(
                "latitude {} outside Mercator-valid range of +/-{}",
                lat, MAX_LATITUDE
            )));
        }
        let mx = lon * ORIGIN_SHIFT / 180.0;
        let mut my = (((90.0 + lat) * PI / 360.0).tan()).ln() / (PI / 180.0);
        my *= ORIGIN_SHIFT / 180.0;
        Ok((mx, my))
    }

    /// Converts Web-Mercator meters back to lon/lat.
    pub fn meters_to_lonlat(&self, mx: f64, my: f64) -> (f64, f64) {
        let lon = (mx / ORIGIN_SHIFT) * 180.0;
        let mut lat = (my / ORIGIN_SHIFT) * 180.0;
        lat = 180.0 / PI * (2.0 * ((lat * PI / 180.0).exp()).atan() - PI / 2.0);
        (lon, lat)
    }

    /// Converts meters to pixel coordinates at zoom `z`.
    pub fn meters_to_pixels(&self, mx: f64, my: f64, z: u32) -> (f64, f64) {
        let res = self.resolution(z);
        let px = (mx + ORIGIN_SHIFT) / res;
        let py = (my + ORIGIN_SHIFT) / res;
        (px, py)
    }

    /// Converts pixel coordinates to TMS tile coordinates at zoom `z`.
    pub fn pixels_to_tile(&self, px: f64, py: f64) -> (i64, i64) {
        let ts = self.tile_size as f64;
        let mut tx = (px / ts).ceil() as i64 - 1;
        let mut ty = (py / ts).ceil() as i64 - 1;
        if tx < 0 {
            tx = 0;
        }
        if ty < 0 {
            ty = 0;
        }
        (tx, ty)
    }

    /// Bounds of TMS tile `(tx, ty)` at zoom `z`, in Web-Mercator meters:
    /// `(min_x, min_y, max_x, max_y)`.
    pub fn tile_bounds(&self, tx: i64, ty: i64, z: u32) -> (f64, f64, f64, f64) {
        let ts = self.tile_size as f64;
        let (min_x, min_y) = self.pixels_to_meters(tx as f64 * ts, ty as f64 * ts, z);
        let (max_x, max_y) = self.pixels_to_meters((tx + 1) as f64 * ts, (ty + 1) as f64 * ts, z);
        (min_x, min_y, max_x, max_y)
    }

    fn pixels_to_meters(&self, px: f64, py: f64, z: u32) -> (f64, f64) {
        let res = self.resolution(z);
        (px * res - ORIGIN_SHIFT, py * res - ORIGIN_SHIFT)
    }

    /// Bounds of TMS tile `(tx, ty)` at zoom `z`, in lon/lat.
    pub fn tile_latlon_bounds(&self, tx: i64, ty: i64, z: u32) -> (f64, f64, f64, f64) {
        let (min_x, min_y, max_x, max_y) = self.tile_bounds(tx, ty, z);
        let (min_lon, min_lat) = self.meters_to_lonlat(min_x, min_y);
        let (max_lon, max_lat) = self.meters_to_lonlat(max_x, max_y);
        (min_lon, min_lat, max_lon, max_lat)
    }

    /// Smallest zoom level whose resolution is <= `pixel_size` (meters per
    /// pixel of the source raster).
    pub fn zoom_for_pixel_size(&self, pixel_size: f64) -> u32 {
        for z in 0..=32u32 {
            if self.resolution(z) <= pixel_size {
                return z;
            }
        }
        32
    }

    /// Largest zoom level at which a feature of world-length `length`
    /// (meters) still fits within a single tile's width (used by the EPT
    /// tiler to pick a starting octree depth, spec §4.11). Resolution
    /// strictly decreases with `z`, so this is the finest zoom before the
    /// feature would need to span more than one tile.
    pub fn zoom_for_length(&self, length: f64) -> u32 {
        let mut best = 0u32;
        for z in 0..=32u32 {
            let tile_width = self.resolution(z) * self.tile_size as f64;
            if tile_width >= length {
                best = z;
            } else {
                break;
            }
        }
        best
    }
}

/// XYZ row <-> TMS row conversion; the two schemes differ only in the
/// Y-axis direction.
pub fn tms_y(y: i64, z: u32) -> i64 {
    (1i64 << z) - 1 - y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_halves_per_zoom_level() {
        let m = Mercator::default();
        let r0 = m.resolution(0);
        let r1 = m.resolution(1);
        assert!((r0 / 2.0 - r1).abs() < 1e-6);
    }

    #[test]
    fn domain_error_outside_valid_latitude() {
        let m = Mercator::default();
        assert!(m.lonlat_to_meters(0.0, 86.0).is_err());
        assert!(m.lonlat_to_meters(0.0, -86.0).is_err());
        assert!(m.lonlat_to_meters(0.0, 84.9).is_ok());
    }

    #[test]
    fn tms_y_is_involution() {
        assert_eq!(tms_y(tms_y(5, 4) as i64, 4), 5);
    }

    #[test]
    fn geo_round_trip_contains_point() {
        let m = Mercator::default();
        let (lon, lat) = (-0.137163, 50.822285); // Brighton, UK
        for z in 10..=20u32 {
            let (mx, my) = m.lonlat_to_meters(lon, lat).unwrap();
            let (px, py) = m.meters_to_pixels(mx, my, z);
            let (tx, ty) = m.pixels_to_tile(px, py);
            let (min_lon, min_lat, max_lon, max_lat) = m.tile_latlon_bounds(tx, ty, z);
            assert!(min_lon <= lon && lon <= max_lon, "z={z} lon out of bounds");
            assert!(min_lat <= lat && lat <= max_lat, "z={z} lat out of bounds");
        }
    }

    #[test]
    fn zoom_for_pixel_size_is_monotonic() {
        let m = Mercator::default();
        let z_coarse = m.zoom_for_pixel_size(10.0);
        let z_fine = m.zoom_for_pixel_size(0.1);
        assert!(z_fine >= z_coarse);
    }
}
