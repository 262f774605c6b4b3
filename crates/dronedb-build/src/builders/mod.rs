//! Concrete per-type builders dispatched by the Build Orchestrator (spec
//! §4.8). Each builder writes only inside the temp folder it's given; the
//! orchestrator is responsible for the atomic rename into place.

mod cog;
mod flatgeobuf;
mod nexus;
mod ept;

pub use cog::CogBuilder;
pub use ept::EptBuilder;
pub use flatgeobuf::FlatGeobufBuilder;
pub use nexus::NexusBuilder;

use dronedb_core::entry::EntryType;
use dronedb_core::error::Result;
use std::path::Path;

/// Build-folder subfolder name per buildable type (spec §4.8, §6.1).
pub fn subfolder_for(entry_type: EntryType) -> Option<&'static str> {
    match entry_type {
        EntryType::PointCloud => Some("ept"),
        EntryType::GeoRaster => Some("cog"),
        EntryType::Model => Some("nxs"),
        EntryType::Vector => Some("vec"),
        _ => None,
    }
}

/// Builds the artifact for `source_abs_path` of `entry_type` into
/// `temp_dir`. The builder owns only file creation inside `temp_dir`;
/// nothing outside it is touched.
pub trait Builder: Send + Sync {
    fn build(&self, source_abs_path: &Path, temp_dir: &Path) -> Result<()>;
}

pub fn builder_for(entry_type: EntryType) -> Option<Box<dyn Builder>> {
    match entry_type {
        EntryType::PointCloud => Some(Box::new(EptBuilder)),
        EntryType::GeoRaster => Some(Box::new(CogBuilder)),
        EntryType::Model => Some(Box::new(NexusBuilder)),
        EntryType::Vector => Some(Box::new(FlatGeobufBuilder)),
        _ => None,
    }
}
