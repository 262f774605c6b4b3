//! FlatGeobuf builder (spec §4.8, §6.1): writes `<temp>/vector.fgb` from a
//! `.shp` or `.geojson` source. Unlike the raster/point-cloud/mesh
//! builders, both the source and target formats have real Rust crates, so
//! this conversion runs in-process instead of shelling out.

use super::Builder;
use dronedb_core::error::{DdbError, Result};
use flatgeobuf::{FgbWriter, GeometryType};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub struct FlatGeobufBuilder;

impl Builder for FlatGeobufBuilder {
    fn build(&self, source_abs_path: &Path, temp_dir: &Path) -> Result<()> {
        let geometries = match source_abs_path.extension().and_then(|e| e.to_str()) {
            Some("shp") => read_shapefile(source_abs_path)?,
            Some("geojson") => read_geojson(source_abs_path)?,
            other => {
                return Err(DdbError::NotImplemented(format!(
                    "FlatGeobuf conversion from {:?} is not supported",
                    other
                )))
            }
        };

        let mut fgb = FgbWriter::create("vector", GeometryType::Unknown)
            .map_err(|e| DdbError::app(format!("flatgeobuf writer init failed: {e}")))?;
        for geom in &geometries {
            fgb.add_feature_geom(geom.clone(), |_feat| {})
                .map_err(|e| DdbError::app(format!("flatgeobuf feature write failed: {e}")))?;
        }

        let out_path = temp_dir.join("vector.fgb");
        let mut out = BufWriter::new(
            File::create(&out_path).map_err(|e| DdbError::fs(&out_path, e.to_string()))?,
        );
        fgb.write(&mut out).map_err(|e| DdbError::app(format!("flatgeobuf write failed: {e}")))?;
        Ok(())
    }
}

fn read_shapefile(path: &Path) -> Result<Vec<geo_types::Geometry<f64>>> {
    let mut reader = shapefile::Reader::from_path(path)
        .map_err(|e| DdbError::app(format!("opening shapefile {}: {e}", path.display())))?;
    let mut out = Vec::new();
    for shape_record in reader.iter_shapes_and_records() {
        let (shape, _record) = shape_record.map_err(|e| DdbError::app(e.to_string()))?;
        let geom: geo_types::Geometry<f64> =
            shape.try_into().map_err(|e: shapefile::Error| DdbError::app(e.to_string()))?;
        out.push(geom);
    }
    Ok(out)
}

fn read_geojson(path: &Path) -> Result<Vec<geo_types::Geometry<f64>>> {
    let text = std::fs::read_to_string(path).map_err(|e| DdbError::fs(path, e.to_string()))?;
    let geojson = text.parse::<geojson::GeoJson>().map_err(|e| DdbError::app(e.to_string()))?;
    let mut out = Vec::new();
    collect_geojson_geometries(&geojson, &mut out)?;
    Ok(out)
}

fn collect_geojson_geometries(geojson: &geojson::GeoJson, out: &mut Vec<geo_types::Geometry<f64>>) -> Result<()> {
    match geojson {
        geojson::GeoJson::Geometry(g) => {
            let geom: geo_types::Geometry<f64> =
                g.try_into().map_err(|e: geojson::Error| DdbError::app(e.to_string()))?;
            out.push(geom);
        }
        geojson::GeoJson::Feature(f) => {
            if let Some(g) = &f.geometry {
                collect_geojson_geometries(&geojson::GeoJson::Geometry(g.clone()), out)?;
            }
        }
        geojson::GeoJson::FeatureCollection(fc) => {
            for f in &fc.features {
                if let Some(g) = &f.geometry {
                    collect_geojson_geometries(&geojson::GeoJson::Geometry(g.clone()), out)?;
                }
            }
        }
    }
    Ok(())
}
