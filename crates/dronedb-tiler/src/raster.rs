//! Raster Tiler / GDALTiler (spec §4.10): warps the source dataset to Web
//! Mercator once at construction (via `gdalwarp` to an in-memory VRT —
//! there is no safe, version-stable `gdal` crate binding for
//! `GDALAutoCreateWarpedVRT`, so this crosses the process boundary the
//! same way the EPT/Nexus builders do), then serves XYZ tiles by reading
//! windows out of the warped dataset and compositing to PNG.

use dronedb_core::error::{DdbError, Result};
use dronedb_geo::{tms_y, Mercator};
use gdal::raster::RasterBand;
use gdal::Dataset;
use image::{ImageBuffer, Rgba};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const IDENTITY: [f64; 6] = [0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

pub struct GdalTiler {
    warped: Dataset,
    /// Keeps the warped VRT's backing directory alive for the tiler's
    /// lifetime; never read directly.
    _warp_workdir: TempDir,
    mercator: Mercator,
    width: usize,
    height: usize,
    geotransform: [f64; 6],
    band_count: usize,
}

struct GeoQuery {
    src_x: usize,
    src_y: usize,
    src_w: usize,
    src_h: usize,
    dest_x: usize,
    dest_y: usize,
    dest_w: usize,
    dest_h: usize,
}

impl GdalTiler {
    pub fn open(source: &Path, tile_size: u32) -> Result<Self> {
        let src = Dataset::open(source).map_err(|e| DdbError::Gdal(format!("{}: {e}", source.display())))?;
        let gt_is_real = src
            .geo_transform()
            .map(|gt| gt.iter().zip(IDENTITY.iter()).any(|(a, b)| (a - b).abs() > 1e-9))
            .unwrap_or(false);
        let has_gcps = !src.gcps().is_empty();
        if !gt_is_real && !has_gcps {
            return Err(DdbError::InvalidArgs(format!(
                "{} has no geotransform or GCPs, cannot be tiled",
                source.display()
            )));
        }
        drop(src);

        let warp_workdir = tempfile::tempdir().map_err(|e| DdbError::fs(source, e.to_string()))?;
        let warped_path = warp_workdir.path().join("warped.vrt");
        let status = Command::new("gdalwarp")
            .args(["-t_srs", "EPSG:3857", "-r", "near", "-dstalpha", "-of", "VRT"])
            .arg(source)
            .arg(&warped_path)
            .status()
            .map_err(|e| DdbError::Gdal(format!("failed to invoke gdalwarp: {e}")))?;
        if !status.success() {
            return Err(DdbError::Gdal(format!("gdalwarp exited with status {status}")));
        }

        let warped = Dataset::open(&warped_path).map_err(|e| DdbError::Gdal(e.to_string()))?;
        let geotransform = warped.geo_transform().map_err(|e| DdbError::Gdal(e.to_string()))?;
        let (width, height) = warped.raster_size();
        let band_count = warped.raster_count() as usize;

        Ok(Self {
            warped,
            _warp_workdir: warp_workdir,
            mercator: Mercator::new(tile_size),
            width,
            height,
            geotransform,
            band_count,
        })
    }

    /// `(min_z, max_z)` per spec §4.10: max from the source pixel size,
    /// min from the same pixel size scaled by the longest raster side.
    pub fn get_min_max_z(&self) -> (u32, u32) {
        let pixel_size = self.geotransform[1].abs();
        let max_z = self.mercator.zoom_for_pixel_size(pixel_size);
        let longest_side = self.width.max(self.height) as f64;
        let min_pixel_size = pixel_size * longest_side / self.mercator.tile_size as f64;
        let min_z = self.mercator.zoom_for_pixel_size(min_pixel_size);
        (min_z, max_z)
    }

    /// The XYZ tile at `z` covering the dataset's centroid; used by
    /// thumbnail rendering, which has no particular tile request to start
    /// from.
    pub fn covering_tile(&self, z: u32) -> (i64, i64) {
        let (min_x, min_y, max_x, max_y) = self.dataset_bounds_3857();
        let (px, py) = self.mercator.meters_to_pixels((min_x + max_x) / 2.0, (min_y + max_y) / 2.0, z);
        let (tx, tms_ty) = self.mercator.pixels_to_tile(px, py);
        (tx, tms_y(tms_ty, z))
    }

    fn dataset_bounds_3857(&self) -> (f64, f64, f64, f64) {
        let gt = &self.geotransform;
        let min_x = gt[0];
        let max_y = gt[3];
        let max_x = gt[0] + gt[1] * self.width as f64;
        let min_y = gt[3] + gt[5] * self.height as f64;
        (min_x.min(max_x), min_y.min(max_y), min_x.max(max_x), min_y.max(max_y))
    }

    /// All XYZ `(x, y)` tiles intersecting the dataset's extent at `z`.
    pub fn get_tiles_for_zoom_level(&self, z: u32) -> Vec<(i64, i64)> {
        let (min_x, min_y, max_x, max_y) = self.dataset_bounds_3857();
        let (px0, py0) = self.mercator.meters_to_pixels(min_x, max_y, z);
        let (px1, py1) = self.mercator.meters_to_pixels(max_x, min_y, z);
        let (tx0, ty0) = self.mercator.pixels_to_tile(px0.min(px1), py0.min(py1));
        let (tx1, ty1) = self.mercator.pixels_to_tile(px0.max(px1), py0.max(py1));

        let mut tiles = Vec::new();
        for tx in tx0..=tx1 {
            for tms_ty in ty0..=ty1 {
                tiles.push((tx, tms_y(tms_ty, z)));
            }
        }
        tiles
    }

    /// Source pixel window and destination canvas offset/size for tile
    /// `(z, tx, ty)` in TMS coordinates (spec §4.10's `geoQuery`). Returns
    /// `None` when the tile doesn't overlap the dataset at all.
    fn geo_query(&self, z: u32, tx: i64, ty: i64) -> Option<GeoQuery> {
        let ts = self.mercator.tile_size as f64;
        let (tile_min_x, tile_min_y, tile_max_x, tile_max_y) = self.mercator.tile_bounds(tx, ty, z);

        let gt = &self.geotransform;
        let src_x0 = (tile_min_x - gt[0]) / gt[1];
        let src_x1 = (tile_max_x - gt[0]) / gt[1];
        let src_y0 = (tile_max_y - gt[3]) / gt[5];
        let src_y1 = (tile_min_y - gt[3]) / gt[5];

        let (src_x_min, src_x_max) = (src_x0.min(src_x1), src_x0.max(src_x1));
        let (src_y_min, src_y_max) = (src_y0.min(src_y1), src_y0.max(src_y1));

        let clamped_x0 = src_x_min.max(0.0);
        let clamped_y0 = src_y_min.max(0.0);
        let clamped_x1 = src_x_max.min(self.width as f64);
        let clamped_y1 = src_y_max.min(self.height as f64);
        if clamped_x1 <= clamped_x0 || clamped_y1 <= clamped_y0 {
            return None;
        }

        let scale_x = ts / (src_x_max - src_x_min);
        let scale_y = ts / (src_y_max - src_y_min);
        let dest_x = ((clamped_x0 - src_x_min) * scale_x).round() as usize;
        let dest_y = ((clamped_y0 - src_y_min) * scale_y).round() as usize;
        let dest_w = (((clamped_x1 - clamped_x0) * scale_x).round() as usize).clamp(1, ts as usize);
        let dest_h = (((clamped_y1 - clamped_y0) * scale_y).round() as usize).clamp(1, ts as usize);

        Some(GeoQuery {
            src_x: clamped_x0.round() as usize,
            src_y: clamped_y0.round() as usize,
            src_w: ((clamped_x1 - clamped_x0).round() as usize).max(1),
            src_h: ((clamped_y1 - clamped_y0).round() as usize).max(1),
            dest_x,
            dest_y,
            dest_w,
            dest_h,
        })
    }

    /// Renders tile `(z, x, y)` (XYZ scheme) and encodes it as PNG.
    pub fn tile(&self, z: u32, x: i64, y: i64) -> Result<Vec<u8>> {
        let ty = tms_y(y, z);
        let (min_z, max_z) = self.get_min_max_z();
        if z < min_z || z > max_z {
            return Err(DdbError::InvalidArgs(format!("zoom {z} outside valid range {min_z}..={max_z}")));
        }
        let query = self
            .geo_query(z, x, ty)
            .ok_or_else(|| DdbError::InvalidArgs(format!("tile ({z},{x},{y}) is out of bounds")))?;

        let ts = self.mercator.tile_size as usize;
        let mut canvas: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::new(ts as u32, ts as u32);

        let bands_to_read = self.band_count.min(4);
        let mut band_buffers: Vec<Vec<u8>> = Vec::with_capacity(bands_to_read);
        for b in 1..=bands_to_read {
            let band: RasterBand = self.warped.rasterband(b as isize).map_err(|e| DdbError::Gdal(e.to_string()))?;
            let rescaled = read_band_rescaled(&band, &query)?;
            band_buffers.push(rescaled);
        }

        for row in 0..query.dest_h {
            for col in 0..query.dest_w {
                let idx = row * query.dest_w + col;
                let px = query.dest_x + col;
                let py = query.dest_y + row;
                if px >= ts || py >= ts {
                    continue;
                }
                let r = band_buffers.first().and_then(|b| b.get(idx)).copied().unwrap_or(0);
                let g = band_buffers.get(1).and_then(|b| b.get(idx)).copied().unwrap_or(r);
                let blue = band_buffers.get(2).and_then(|b| b.get(idx)).copied().unwrap_or(r);
                let a = if self.band_count >= 4 {
                    band_buffers.get(3).and_then(|b| b.get(idx)).copied().unwrap_or(255)
                } else {
                    255
                };
                canvas.put_pixel(px as u32, py as u32, Rgba([r, g, blue, a]));
            }
        }

        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(canvas)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageOutputFormat::Png)
            .map_err(|e| DdbError::app(format!("PNG encode failed: {e}")))?;
        Ok(out)
    }
}

/// Reads one band's window at destination resolution, rescaling non-8-bit
/// sources to 0..255 using min/max statistics (spec §4.10 step 4).
fn read_band_rescaled(band: &RasterBand, query: &GeoQuery) -> Result<Vec<u8>> {
    if matches!(band.band_type(), gdal::raster::GdalDataType::UInt8) {
        let buf = band
            .read_as::<u8>(
                (query.src_x as isize, query.src_y as isize),
                (query.src_w, query.src_h),
                (query.dest_w, query.dest_h),
                None,
            )
            .map_err(|e| DdbError::Gdal(e.to_string()))?;
        return Ok(buf.data);
    }

    let buf = band
        .read_as::<f64>(
            (query.src_x as isize, query.src_y as isize),
            (query.src_w, query.src_h),
            (query.dest_w, query.dest_h),
            None,
        )
        .map_err(|e| DdbError::Gdal(e.to_string()))?;

    let (min, max) = band
        .get_statistics(true, true)
        .map_err(|e| DdbError::Gdal(e.to_string()))
        .map(|s| (s.min, s.max))
        .unwrap_or_else(|_| {
            let min = buf.data.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = buf.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            (min, max)
        });
    let span = (max - min).max(f64::EPSILON);

    Ok(buf
        .data
        .iter()
        .map(|&v| (((v - min) / span) * 255.0).clamp(0.0, 255.0) as u8)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_geotransform_is_rejected_without_gcps() {
        assert_eq!(IDENTITY, [0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }
}
