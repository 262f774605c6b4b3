//! Fingerprinter (spec §4.4): classifies a path into an [`EntryType`] by
//! extension plus, for ambiguous candidates, a single adapter probe. The
//! EXIF parse is shared with the Entry Parser via [`Fingerprint::exif`] so
//! an image file is only opened once across fingerprint + parse.

use crate::exif_adapter::{self, ExifData};
use crate::gdal_adapter;
use dronedb_core::entry::EntryType;
use dronedb_core::error::Result;
use std::path::Path;

/// The classification result plus whatever adapter probe it required, so
/// the Entry Parser can reuse it instead of re-opening the file.
pub struct Fingerprint {
    pub entry_type: EntryType,
    pub exif: Option<ExifData>,
}

enum Candidate {
    Directory,
    Raster,
    PointCloud,
    EptPointCloud,
    Image,
    Model,
    Vector,
    Video,
    Markdown,
    Generic,
}

fn candidate_for(path: &Path) -> Candidate {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_ascii_lowercase();
    if name.ends_with("ept.json") {
        return Candidate::EptPointCloud;
    }
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "tif" | "tiff" => Candidate::Raster,
        "las" | "laz" | "copc" | "ply" => Candidate::PointCloud,
        "jpg" | "jpeg" | "png" => Candidate::Image,
        "obj" | "glb" | "gltf" | "fbx" | "dae" => Candidate::Model,
        "shp" | "geojson" | "fgb" | "dxf" | "gml" | "kml" | "kmz" | "gpkg" => Candidate::Vector,
        "mp4" | "mov" => Candidate::Video,
        "md" => Candidate::Markdown,
        _ => Candidate::Generic,
    }
}

/// Classifies `path`. `path` must exist and be readable; directory-ness is
/// determined by the caller passing `is_dir`.
pub fn fingerprint(path: &Path, is_dir: bool) -> Result<Fingerprint> {
    if is_dir {
        return Ok(Fingerprint { entry_type: EntryType::Directory, exif: None });
    }

    match candidate_for(path) {
        Candidate::Directory => Ok(Fingerprint { entry_type: EntryType::Directory, exif: None }),
        Candidate::EptPointCloud => Ok(Fingerprint { entry_type: EntryType::PointCloud, exif: None }),
        Candidate::PointCloud => Ok(Fingerprint { entry_type: EntryType::PointCloud, exif: None }),
        Candidate::Model => Ok(Fingerprint { entry_type: EntryType::Model, exif: None }),
        Candidate::Vector => Ok(Fingerprint { entry_type: EntryType::Vector, exif: None }),
        Candidate::Markdown => Ok(Fingerprint { entry_type: EntryType::Markdown, exif: None }),
        Candidate::Generic => Ok(Fingerprint { entry_type: EntryType::Generic, exif: None }),

        Candidate::Raster => {
            let georeferenced = gdal_adapter::has_geotransform_or_gcps(path)?;
            let entry_type = if georeferenced { EntryType::GeoRaster } else { EntryType::Generic };
            Ok(Fingerprint { entry_type, exif: None })
        }

        Candidate::Image => {
            let exif = exif_adapter::read(path).ok();
            let entry_type = classify_image_like(&exif, false);
            Ok(Fingerprint { entry_type, exif })
        }

        Candidate::Video => {
            let exif = exif_adapter::read(path).ok();
            let entry_type = classify_image_like(&exif, true);
            Ok(Fingerprint { entry_type, exif })
        }
    }
}

fn classify_image_like(exif: &Option<ExifData>, is_video: bool) -> EntryType {
    let Some(exif) = exif else {
        return if is_video { EntryType::Video } else { EntryType::Image };
    };
    let has_gps = exif.gps.is_some();
    let is_panorama = exif.xmp_projection_type.is_some();
    match (has_gps, is_panorama, is_video) {
        (true, true, false) => EntryType::GeoPanorama,
        (true, false, false) => EntryType::GeoImage,
        (false, true, false) => EntryType::Panorama,
        (false, false, false) => EntryType::Image,
        (true, _, true) => EntryType::GeoVideo,
        (false, _, true) => EntryType::Video,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn directory_path_is_directory_regardless_of_name() {
        let fp = fingerprint(&PathBuf::from("anything.tif"), true).unwrap();
        assert_eq!(fp.entry_type, EntryType::Directory);
    }

    #[test]
    fn markdown_extension_is_markdown() {
        let fp = fingerprint(&PathBuf::from("readme.md"), false).unwrap();
        assert_eq!(fp.entry_type, EntryType::Markdown);
    }

    #[test]
    fn ept_json_suffix_is_point_cloud() {
        let fp = fingerprint(&PathBuf::from("data/ept.json"), false).unwrap();
        assert_eq!(fp.entry_type, EntryType::PointCloud);
    }

    #[test]
    fn unknown_extension_is_generic() {
        let fp = fingerprint(&PathBuf::from("notes.xyz123"), false).unwrap();
        assert_eq!(fp.entry_type, EntryType::Generic);
    }

    #[test]
    fn image_without_exif_is_plain_image() {
        assert_eq!(classify_image_like(&None, false), EntryType::Image);
        assert_eq!(classify_image_like(&None, true), EntryType::Video);
    }
}
