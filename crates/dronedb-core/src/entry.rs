//! Entry and EntryMeta domain models (spec §3.1-3.2).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of entry classifications. The integer tag is the
/// canonical on-disk/wire form (spec §6.5); human names are used only at
/// the CLI boundary via [`EntryType::to_human`]/[`EntryType::from_human`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryType {
    Undefined = 0,
    Directory = 1,
    Generic = 2,
    GeoImage = 3,
    GeoRaster = 4,
    PointCloud = 5,
    Image = 6,
    DroneDb = 7,
    Markdown = 8,
    Video = 9,
    GeoVideo = 10,
    Model = 11,
    Panorama = 12,
    GeoPanorama = 13,
    Vector = 14,
}

impl EntryType {
    pub fn from_u8(v: u8) -> Option<Self> {
        use EntryType::*;
        Some(match v {
            0 => Undefined,
            1 => Directory,
            2 => Generic,
            3 => GeoImage,
            4 => GeoRaster,
            5 => PointCloud,
            6 => Image,
            7 => DroneDb,
            8 => Markdown,
            9 => Video,
            10 => GeoVideo,
            11 => Model,
            12 => Panorama,
            13 => GeoPanorama,
            14 => Vector,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human name used only at the CLI boundary (spec §6.5).
    pub fn to_human(self) -> &'static str {
        use EntryType::*;
        match self {
            Undefined => "undefined",
            Directory => "directory",
            Generic => "generic",
            GeoImage => "geoimage",
            GeoRaster => "georaster",
            PointCloud => "pointcloud",
            Image => "image",
            DroneDb => "dronedb",
            Markdown => "markdown",
            Video => "video",
            GeoVideo => "geovideo",
            Model => "model",
            Panorama => "panorama",
            GeoPanorama => "geopanorama",
            Vector => "vector",
        }
    }

    /// Case-insensitive lookup by human name.
    pub fn from_human(s: &str) -> Option<Self> {
        let s = s.to_ascii_lowercase();
        use EntryType::*;
        Some(match s.as_str() {
            "undefined" => Undefined,
            "directory" => Directory,
            "generic" => Generic,
            "geoimage" => GeoImage,
            "georaster" => GeoRaster,
            "pointcloud" => PointCloud,
            "image" => Image,
            "dronedb" => DroneDb,
            "markdown" => Markdown,
            "video" => Video,
            "geovideo" => GeoVideo,
            "model" => Model,
            "panorama" => Panorama,
            "geopanorama" => GeoPanorama,
            "vector" => Vector,
            _ => return None,
        })
    }

    pub fn all() -> &'static [EntryType] {
        use EntryType::*;
        &[
            Undefined, Directory, Generic, GeoImage, GeoRaster, PointCloud, Image, DroneDb,
            Markdown, Video, GeoVideo, Model, Panorama, GeoPanorama, Vector,
        ]
    }

    pub fn is_buildable_candidate(self) -> bool {
        matches!(self, EntryType::PointCloud | EntryType::GeoRaster | EntryType::Model | EntryType::Vector)
    }
}

/// A single (lon, lat, altitude) vertex.
pub type GeoVertex = (f64, f64, f64);

/// Geometry attached to an entry: either a single point or a closed ring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryGeometry {
    /// Exactly one vertex when present (spec invariant).
    pub point: Option<GeoVertex>,
    /// An ordered ring of >= 4 vertices whose first equals its last.
    pub polygon: Option<Vec<GeoVertex>>,
}

impl EntryGeometry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_point(v: GeoVertex) -> Self {
        Self { point: Some(v), polygon: None }
    }

    pub fn with_polygon(ring: Vec<GeoVertex>) -> Self {
        Self { point: None, polygon: Some(ring) }
    }

    /// Validates the spec invariants: a polygon ring has >= 4 vertices and
    /// closes on itself.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ring) = &self.polygon {
            if ring.len() < 4 {
                return Err(format!("polygon ring has {} vertices, need >= 4", ring.len()));
            }
            let first = ring.first().unwrap();
            let last = ring.last().unwrap();
            if (first.0 - last.0).abs() > f64::EPSILON
                || (first.1 - last.1).abs() > f64::EPSILON
                || (first.2 - last.2).abs() > f64::EPSILON
            {
                return Err("polygon ring does not close on itself".to_string());
            }
        }
        Ok(())
    }
}

/// The fundamental catalog unit (spec §3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// POSIX-style relative path from the index root. Unique key.
    pub path: String,
    /// Lowercase hex SHA-256 of the file contents; empty for directories.
    pub hash: String,
    pub r#type: EntryType,
    /// Type-specific metadata; keys present depend on type.
    pub properties: Value,
    /// Filesystem modification time, epoch seconds.
    pub mtime: i64,
    /// File size in bytes.
    pub size: i64,
    /// Number of path separators from index root.
    pub depth: i32,
    pub point_geom: Option<GeoVertex>,
    pub polygon_geom: Option<Vec<GeoVertex>>,
}

impl Entry {
    pub fn new_directory(path: impl Into<String>) -> Self {
        let path = path.into();
        let depth = path_depth(&path);
        Self {
            path,
            hash: String::new(),
            r#type: EntryType::Directory,
            properties: Value::Object(Default::default()),
            mtime: 0,
            size: 0,
            depth,
            point_geom: None,
            polygon_geom: None,
        }
    }

    /// Recomputes `depth` from `path`; called whenever path or the entry is
    /// constructed fresh, since `depth` must always equal the number of `/`
    /// separators (spec invariant).
    pub fn recompute_depth(&mut self) {
        self.depth = path_depth(&self.path);
    }

    /// Validates the spec §3.1 invariants for this entry.
    pub fn validate(&self) -> Result<(), String> {
        if self.r#type == EntryType::Directory {
            if !self.hash.is_empty() {
                return Err("directory entry must have empty hash".to_string());
            }
            if self.size != 0 {
                return Err("directory entry must have zero size".to_string());
            }
            if self.point_geom.is_some() || self.polygon_geom.is_some() {
                return Err("directory entry must not carry geometry".to_string());
            }
        }
        if let Some(ring) = &self.polygon_geom {
            let geom = EntryGeometry::with_polygon(ring.clone());
            geom.validate()?;
        }
        if self.depth != path_depth(&self.path) {
            return Err(format!(
                "depth {} does not match path {:?} (expected {})",
                self.depth,
                self.path,
                path_depth(&self.path)
            ));
        }
        Ok(())
    }
}

pub fn path_depth(path: &str) -> i32 {
    if path.is_empty() {
        return 0;
    }
    path.matches('/').count() as i32
}

/// A key-value annotation attached either to an entry (`path` = that
/// entry's path) or globally (`path == ""`), spec §3.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Stable unique identifier: hash of payload + time.
    pub id: String,
    /// Empty for global metadata, else the owning entry's path.
    pub path: String,
    /// Plural identifier distinguishing list-valued keys from scalar
    /// "config" keys (enforced by [`validate_key`]).
    pub key: String,
    pub data: Value,
    pub mtime: i64,
}

/// The system enforces that list-valued keys are named in the plural, to
/// distinguish them from scalar "config" keys such as `"config"` itself
/// (spec §3.2). This is a convention check, not a hard pluralization
/// algorithm: a key is accepted if it ends in 's' or is explicitly in the
/// allow-list of known scalar keys.
pub fn validate_key(key: &str) -> Result<(), String> {
    const SCALAR_ALLOWLIST: &[&str] = &["config"];
    if SCALAR_ALLOWLIST.contains(&key) {
        return Ok(());
    }
    if key.ends_with('s') {
        Ok(())
    } else {
        Err(format!(
            "meta key {:?} must be plural (list-valued) or be one of {:?} (scalar)",
            key, SCALAR_ALLOWLIST
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_type_round_trips_through_u8() {
        for t in EntryType::all() {
            assert_eq!(EntryType::from_u8(t.as_u8()), Some(*t));
        }
    }

    #[test]
    fn entry_type_human_name_round_trips() {
        for t in EntryType::all() {
            assert_eq!(EntryType::from_human(t.to_human()), Some(*t));
        }
        assert_eq!(EntryType::from_human("GeoRaster"), Some(EntryType::GeoRaster));
        assert_eq!(EntryType::from_human("bogus"), None);
    }

    #[test]
    fn directory_entry_invariants_hold() {
        let dir = Entry::new_directory("a/b");
        assert!(dir.validate().is_ok());
        assert_eq!(dir.depth, 1);
    }

    #[test]
    fn polygon_must_close() {
        let geom = EntryGeometry::with_polygon(vec![
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (1.0, 1.0, 0.0),
            (0.0, 0.0, 0.0),
        ]);
        assert!(geom.validate().is_ok());

        let bad = EntryGeometry::with_polygon(vec![(0.0, 0.0, 0.0), (1.0, 0.0, 0.0), (1.0, 1.0, 0.0)]);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn meta_key_pluralization_rule() {
        assert!(validate_key("annotations").is_ok());
        assert!(validate_key("config").is_ok());
        assert!(validate_key("annotation").is_err());
    }
}
