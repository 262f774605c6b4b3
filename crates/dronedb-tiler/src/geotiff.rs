//! On-the-fly GeoTIFF synthesis (spec §4.12): a plain JPEG with EXIF GPS
//! but no real georeferencing can't be opened by [`crate::raster::GdalTiler`]
//! directly. This writes a GeoTIFF copy, stamped with a geotransform
//! derived from the image's footprint polygon, into the cache so it can be
//! tiled like any other raster.

use dronedb_core::error::{DdbError, Result};
use gdal::raster::RasterCreationOptions;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use std::path::{Path, PathBuf};

/// Synthesizes `<cache>/geotiff/<key>.tif` from `source_jpeg`, placing it
/// in EPSG:4326 space using the bounding box of `footprint_4326` (spec
/// §4.5's GeoImage footprint polygon).
pub fn synthesize(cache_root: &Path, key: &str, source_jpeg: &Path, footprint_4326: &[(f64, f64, f64)]) -> Result<PathBuf> {
    if footprint_4326.len() < 4 {
        return Err(DdbError::InvalidArgs("footprint polygon needs >= 4 vertices to synthesize a GeoTIFF".to_string()));
    }

    let min_lon = footprint_4326.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let max_lon = footprint_4326.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let min_lat = footprint_4326.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let max_lat = footprint_4326.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

    let src = Dataset::open(source_jpeg).map_err(|e| DdbError::Gdal(format!("{}: {e}", source_jpeg.display())))?;
    let (width, height) = src.raster_size();

    let geotransform = [
        min_lon,
        (max_lon - min_lon) / width as f64,
        0.0,
        max_lat,
        0.0,
        -(max_lat - min_lat) / height as f64,
    ];

    let out_dir = cache_root.join("geotiff");
    std::fs::create_dir_all(&out_dir).map_err(|e| DdbError::fs(&out_dir, e.to_string()))?;
    let out_path = out_dir.join(format!("{key}.tif"));

    let driver = DriverManager::get_driver_by_name("GTiff").map_err(|e| DdbError::Gdal(e.to_string()))?;
    let mut dst = driver
        .create_copy(&src, &out_path, &RasterCreationOptions::new())
        .map_err(|e| DdbError::Gdal(format!("GeoTIFF synthesis failed: {e}")))?;

    dst.set_geo_transform(&geotransform).map_err(|e| DdbError::Gdal(e.to_string()))?;
    let srs = SpatialRef::from_epsg(4326).map_err(|e| DdbError::Gdal(e.to_string()))?;
    dst.set_spatial_ref(&srs).map_err(|e| DdbError::Gdal(e.to_string()))?;

    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_footprint() {
        let err = synthesize(Path::new("/tmp"), "k", Path::new("/tmp/a.jpg"), &[(0.0, 0.0, 0.0)]).unwrap_err();
        assert!(matches!(err, DdbError::InvalidArgs(_)));
    }
}
