//! PDAL adapter (spec §4.4/§4.5): point-cloud probing. No mature PDAL Rust
//! binding exists, so this shells out to the `pdal` CLI (`pdal info
//! --metadata --stats`) and parses its JSON, the same boundary the build
//! crate's EPT/Untwine builders use for subprocess tools.

use dronedb_core::error::{DdbError, Result};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone)]
pub struct PointCloudInfo {
    pub point_count: u64,
    pub wkt_projection: String,
    pub dimensions: Vec<String>,
    /// (minX, minY, minZ, maxX, maxY, maxZ) in the source SRS.
    pub bounds: (f64, f64, f64, f64, f64, f64),
    pub centroid: (f64, f64, f64),
}

pub fn probe(path: &Path) -> Result<PointCloudInfo> {
    let output = Command::new("pdal")
        .args(["info", "--metadata", "--stats", path.to_str().unwrap_or_default()])
        .output()
        .map_err(|e| DdbError::Pdal(format!("failed to invoke pdal: {e}")))?;

    if !output.status.success() {
        return Err(DdbError::Pdal(format!(
            "pdal info exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    parse_pdal_info(&json)
}

fn parse_pdal_info(json: &serde_json::Value) -> Result<PointCloudInfo> {
    let metadata = &json["metadata"];
    let point_count = metadata["count"].as_u64().unwrap_or(0);
    let wkt_projection = metadata["srs"]["wkt"].as_str().unwrap_or_default().to_string();

    let bounds = (
        metadata["minx"].as_f64().unwrap_or(0.0),
        metadata["miny"].as_f64().unwrap_or(0.0),
        metadata["minz"].as_f64().unwrap_or(0.0),
        metadata["maxx"].as_f64().unwrap_or(0.0),
        metadata["maxy"].as_f64().unwrap_or(0.0),
        metadata["maxz"].as_f64().unwrap_or(0.0),
    );
    let centroid = (
        (bounds.0 + bounds.3) / 2.0,
        (bounds.1 + bounds.4) / 2.0,
        (bounds.2 + bounds.5) / 2.0,
    );

    let dimensions = json["schema"]["dimensions"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|d| d["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(PointCloudInfo { point_count, wkt_projection, dimensions, bounds, centroid })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_representative_pdal_info_document() {
        let doc = json!({
            "metadata": {
                "count": 120000,
                "minx": 10.0, "miny": 20.0, "minz": 0.0,
                "maxx": 15.0, "maxy": 25.0, "maxz": 3.0,
                "srs": { "wkt": "PROJCS[...]" }
            },
            "schema": { "dimensions": [{"name": "X"}, {"name": "Y"}, {"name": "Z"}, {"name": "Red"}] }
        });
        let info = parse_pdal_info(&doc).unwrap();
        assert_eq!(info.point_count, 120000);
        assert_eq!(info.bounds, (10.0, 20.0, 0.0, 15.0, 25.0, 3.0));
        assert_eq!(info.centroid, (12.5, 22.5, 1.5));
        assert!(info.dimensions.contains(&"Red".to_string()));
    }
}
