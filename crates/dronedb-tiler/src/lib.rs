//! Raster Tiler, EPT Tiler and the Tile/Thumb Cache Manager (spec
//! §4.10-§4.12): turns georeferenced rasters and point clouds into
//! Web-Mercator XYZ PNG tiles, with a cache layer in front of both.

pub mod cache;
pub mod ept;
pub mod geotiff;
pub mod raster;

pub use cache::CacheManager;
pub use ept::EptTiler;
pub use raster::GdalTiler;
