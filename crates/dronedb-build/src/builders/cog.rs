//! Cloud-Optimized GeoTIFF builder (spec §4.8, §6.1): writes
//! `<temp>/cog.tif` via GDAL's `COG` driver, which handles tiling,
//! overviews and compression internally.

use super::Builder;
use dronedb_core::error::{DdbError, Result};
use gdal::{Dataset, DriverManager};
use std::path::Path;

pub struct CogBuilder;

impl Builder for CogBuilder {
    fn build(&self, source_abs_path: &Path, temp_dir: &Path) -> Result<()> {
        let src = Dataset::open(source_abs_path)
            .map_err(|e| DdbError::Gdal(format!("opening {}: {e}", source_abs_path.display())))?;

        let driver = DriverManager::get_driver_by_name("COG")
            .map_err(|e| DdbError::Gdal(format!("COG driver unavailable: {e}")))?;

        let out_path = temp_dir.join("cog.tif");
        let options = ["COMPRESS=DEFLATE", "BLOCKSIZE=512", "OVERVIEWS=AUTO", "RESAMPLING=NEAREST"];
        let mut create_options = gdal::raster::RasterCreationOptions::new();
        for opt in options {
            create_options.add_name_value_from_str(opt).map_err(|e| DdbError::Gdal(e.to_string()))?;
        }

        driver
            .create_copy(&src, &out_path, &create_options)
            .map_err(|e| DdbError::Gdal(format!("COG create_copy failed: {e}")))?;

        Ok(())
    }
}
