//! Fingerprinter and Entry Parser (spec §4.4, §4.5): file classification
//! and per-type metadata extraction, plus the DSM altitude service client
//! consulted during GeoImage parsing (spec §6.3).

pub mod dsm;
pub mod exif_adapter;
pub mod fingerprint;
pub mod footprint;
pub mod gdal_adapter;
pub mod parser;
pub mod pdal_adapter;

pub use fingerprint::{fingerprint, Fingerprint};
pub use parser::parse;
