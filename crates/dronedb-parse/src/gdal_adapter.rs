//! GDAL adapter (spec §4.4/§4.5): raster classification and metadata
//! extraction. Thin wrapper around the `gdal` crate's `Dataset` so the rest
//! of the crate never imports `gdal` directly.

use dronedb_core::error::{DdbError, Result};
use gdal::Dataset;
use std::path::Path;

/// The GDAL identity geotransform, i.e. "no georeferencing applied".
const IDENTITY: [f64; 6] = [0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

fn open(path: &Path) -> Result<Dataset> {
    Dataset::open(path).map_err(|e| DdbError::Gdal(format!("{}: {e}", path.display())))
}

/// True if the dataset has a non-identity geotransform or at least one GCP
/// (spec §4.4's raster-vs-georaster discriminator).
pub fn has_geotransform_or_gcps(path: &Path) -> Result<bool> {
    let ds = open(path)?;
    let gt_is_real = ds
        .geo_transform()
        .map(|gt| gt.iter().zip(IDENTITY.iter()).any(|(a, b)| (a - b).abs() > 1e-9))
        .unwrap_or(false);
    let has_gcps = !ds.gcps().is_empty();
    Ok(gt_is_real || has_gcps)
}

#[derive(Debug, Clone)]
pub struct RasterInfo {
    pub width: usize,
    pub height: usize,
    pub projection_wkt: String,
    pub geotransform: [f64; 6],
    pub nodata: Option<f64>,
    /// The dataset's 4 corners reprojected to EPSG:4326, as a closed ring.
    pub footprint_4326: Vec<(f64, f64, f64)>,
}

pub fn read_raster_info(path: &Path) -> Result<RasterInfo> {
    let ds = open(path)?;
    let (width, height) = ds.raster_size();
    let geotransform = ds.geo_transform().map_err(|e| DdbError::Gdal(e.to_string()))?;
    let projection_wkt = ds.projection();
    let band = ds.rasterband(1).map_err(|e| DdbError::Gdal(e.to_string()))?;
    let nodata = band.no_data_value();

    let corners_px = [(0.0, 0.0), (width as f64, 0.0), (width as f64, height as f64), (0.0, height as f64)];
    let corners_geo: Vec<(f64, f64)> = corners_px
        .iter()
        .map(|&(px, py)| apply_geotransform(&geotransform, px, py))
        .collect();

    let footprint_4326 = reproject_ring_to_4326(&corners_geo, &projection_wkt)?;

    Ok(RasterInfo { width, height, projection_wkt, geotransform, nodata, footprint_4326 })
}

fn apply_geotransform(gt: &[f64; 6], px: f64, py: f64) -> (f64, f64) {
    (gt[0] + px * gt[1] + py * gt[2], gt[3] + px * gt[4] + py * gt[5])
}

/// Reprojects a ring of dataset-CRS coordinates to EPSG:4326 and closes it.
/// Uses GDAL's coordinate transformation so it handles arbitrary source
/// SRSes, not just Web Mercator.
pub(crate) fn reproject_ring_to_4326(ring: &[(f64, f64)], source_wkt: &str) -> Result<Vec<(f64, f64, f64)>> {
    use gdal::spatial_ref::{CoordTransform, SpatialRef};

    let src = SpatialRef::from_wkt(source_wkt).map_err(|e| DdbError::Gdal(e.to_string()))?;
    let dst = SpatialRef::from_epsg(4326).map_err(|e| DdbError::Gdal(e.to_string()))?;
    let transform = CoordTransform::new(&src, &dst).map_err(|e| DdbError::Gdal(e.to_string()))?;

    let mut out = Vec::with_capacity(ring.len() + 1);
    for &(x, y) in ring {
        let mut xs = [x];
        let mut ys = [y];
        let mut zs = [0.0];
        transform
            .transform_coords(&mut xs, &mut ys, &mut zs)
            .map_err(|e| DdbError::Gdal(e.to_string()))?;
        out.push((xs[0], ys[0], 0.0));
    }
    if let Some(first) = out.first().copied() {
        out.push(first);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_geotransform_is_affine() {
        let gt = [100.0, 2.0, 0.0, 200.0, 0.0, -2.0];
        assert_eq!(apply_geotransform(&gt, 0.0, 0.0), (100.0, 200.0));
        assert_eq!(apply_geotransform(&gt, 10.0, 10.0), (120.0, 180.0));
    }
}
