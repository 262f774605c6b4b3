//! GeoImage footprint computation (spec §4.5): projects the 4 corners of
//! the camera's sensor frustum onto the ground plane under a local ENU
//! (East-North-Up) tangent-plane assumption, then converts back to WGS84.
//! Grounded in the local-tangent-plane approach of a coordinate transformer
//! that projects camera-relative offsets through a flat-earth approximation
//! centered on the capture point — adequate at the sub-kilometer footprint
//! scales a single drone photo covers.

const EARTH_RADIUS_M: f64 = 6378137.0;

/// Ground footprint of a single photo, as a closed (lon, lat, altitude)
/// ring, or `None` if any of the required inputs (focal length, sensor
/// size, relative altitude, orientation) is missing.
#[allow(clippy::too_many_arguments)]
pub fn compute_footprint(
    gps_lon: f64,
    gps_lat: f64,
    gps_altitude: f64,
    relative_altitude: f64,
    yaw_deg: f64,
    pitch_deg: f64,
    roll_deg: f64,
    focal_length_mm: f64,
    sensor_width_mm: f64,
    sensor_height_mm: f64,
) -> Option<Vec<(f64, f64, f64)>> {
    if focal_length_mm <= 0.0 || sensor_width_mm <= 0.0 || sensor_height_mm <= 0.0 {
        return None;
    }
    // Nadir-relative pitch: 0 at straight-down, matching the DJI gimbal
    // convention where -90 is nadir. Height above ground the frustum spans.
    let agl = relative_altitude.max(0.1);

    let half_fov_x = (sensor_width_mm / (2.0 * focal_length_mm)).atan();
    let half_fov_y = (sensor_height_mm / (2.0 * focal_length_mm)).atan();

    // Ground-plane half-extents under a nadir assumption, then rotated by
    // yaw and tilted by the deviation of pitch from nadir (-90deg).
    let nadir_deviation = (pitch_deg + 90.0).to_radians();
    let tilt_scale = 1.0 / nadir_deviation.cos().max(0.2);

    let half_x = agl * half_fov_x.tan() * tilt_scale;
    let half_y = agl * half_fov_y.tan() * tilt_scale;

    let corners_local = [(-half_x, -half_y), (half_x, -half_y), (half_x, half_y), (-half_x, half_y)];

    let yaw = yaw_deg.to_radians();
    let roll = roll_deg.to_radians();
    let (sin_y, cos_y) = yaw.sin_cos();
    let (sin_r, cos_r) = roll.sin_cos();

    let altitude = (gps_altitude - relative_altitude).max(0.0);

    let mut ring: Vec<(f64, f64, f64)> = corners_local
        .iter()
        .map(|&(ex, ny)| {
            // Roll tilts the frustum around the flight axis before the yaw
            // rotation carries it into the world ENU frame.
            let ex_r = ex * cos_r - ny * sin_r;
            let ny_r = ex * sin_r + ny * cos_r;
            let east = ex_r * cos_y + ny_r * sin_y;
            let north = -ex_r * sin_y + ny_r * cos_y;
            enu_offset_to_lonlat(gps_lon, gps_lat, east, north, altitude)
        })
        .collect();
    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }
    Some(ring)
}

/// Converts an East/North offset in meters from `(lon0, lat0)` into
/// lon/lat, using the small-angle tangent-plane approximation.
fn enu_offset_to_lonlat(lon0: f64, lat0: f64, east_m: f64, north_m: f64, altitude: f64) -> (f64, f64, f64) {
    let lat_rad = lat0.to_radians();
    let dlat = north_m / EARTH_RADIUS_M;
    let dlon = east_m / (EARTH_RADIUS_M * lat_rad.cos());
    (lon0 + dlon.to_degrees(), lat0 + dlat.to_degrees(), altitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nadir_shot_produces_closed_four_plus_vertex_ring() {
        let ring =
            compute_footprint(-0.137163, 50.822285, 120.0, 100.0, 0.0, -90.0, 0.0, 8.8, 13.2, 8.8).unwrap();
        assert!(ring.len() >= 4);
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn missing_focal_length_yields_none() {
        assert!(compute_footprint(0.0, 0.0, 0.0, 10.0, 0.0, -90.0, 0.0, 0.0, 13.2, 8.8).is_none());
    }

    #[test]
    fn altitude_is_clamped_to_non_negative() {
        let ring = compute_footprint(0.0, 0.0, 5.0, 50.0, 0.0, -90.0, 0.0, 8.8, 13.2, 8.8).unwrap();
        assert!(ring.iter().all(|&(_, _, alt)| alt >= 0.0));
    }
}
