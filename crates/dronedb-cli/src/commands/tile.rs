//! `ddb tile` / `ddb thumb`: render (or fetch cached) XYZ tiles and
//! thumbnails for raster and point-cloud entries (spec §4.10-§4.12).

use crate::cli::{ThumbArgs, TileArgs};
use crate::output::OutputWriter;
use anyhow::{bail, Result};
use dronedb_core::config::CliConfigOverrides;
use dronedb_core::entry::EntryType;
use dronedb_core::error::{DdbError, Result as DdbResult};
use dronedb_store::Database;
use dronedb_tiler::{CacheManager, EptTiler, GdalTiler};
use std::path::{Path, PathBuf};

/// Mirrors [`dronedb_build::BuildOrchestrator`]'s `build_root/<hash>/<subfolder>`
/// layout without needing a live orchestrator handle.
fn built_artifact_path(db: &Database, entry_hash: &str, entry_type: EntryType) -> Option<PathBuf> {
    let base = db.root().join(".ddb").join("build").join(entry_hash);
    match entry_type {
        EntryType::PointCloud => Some(base.join("ept").join("ept.json")),
        EntryType::GeoRaster => Some(base.join("cog").join("cog.tif")),
        _ => None,
    }
}

fn source_mtime(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub fn tile(args: TileArgs, output: &OutputWriter, tile_size_override: Option<u32>) -> Result<()> {
    let db = Database::open(&args.root, false)?;
    let config = crate::config::load(
        db.root(),
        CliConfigOverrides { tile_size: tile_size_override, ..Default::default() },
    )?;
    let tile_size = config.tile_size.value;

    let entry = db.get_entry(&args.path)?.ok_or_else(|| anyhow::anyhow!("no such entry: {}", args.path))?;
    let artifact = built_artifact_path(&db, &entry.hash, entry.r#type)
        .filter(|p| p.exists())
        .ok_or_else(|| anyhow::anyhow!("{} has no built tileable artifact (run `ddb build` first)", args.path))?;

    let cache_root = CacheManager::default_location()?;
    let cache = CacheManager::new(&cache_root);
    let key = CacheManager::cache_key(&args.path, source_mtime(&artifact), tile_size);

    let out_path = match entry.r#type {
        EntryType::GeoRaster => {
            let tiler = GdalTiler::open(&artifact, tile_size)?;
            cache.get_or_build_tile(&key, args.z, args.x, args.y, args.force, || tiler.tile(args.z, args.x, args.y))?
        }
        EntryType::PointCloud => {
            let tiler = EptTiler::open(&artifact, tile_size)?;
            cache.get_or_build_tile(&key, args.z, args.x, args.y, args.force, || tiler.tile(args.z, args.x, args.y))?
        }
        other => bail!("{} is a {}, which cannot be tiled", args.path, other.to_human()),
    };

    match &args.out {
        Some(dest) => {
            std::fs::copy(&out_path, dest)?;
            output.success(format!("wrote {}", dest.display()));
        }
        None => output.success(format!("cached at {}", out_path.display())),
    }
    Ok(())
}

pub fn thumb(args: ThumbArgs, output: &OutputWriter, tile_size_override: Option<u32>) -> Result<()> {
    let db = Database::open(&args.root, false)?;
    let config = crate::config::load(
        db.root(),
        CliConfigOverrides { tile_size: tile_size_override, ..Default::default() },
    )?;
    let tile_size = config.tile_size.value;

    let entry = db.get_entry(&args.path)?.ok_or_else(|| anyhow::anyhow!("no such entry: {}", args.path))?;
    let artifact = built_artifact_path(&db, &entry.hash, entry.r#type)
        .filter(|p| p.exists())
        .ok_or_else(|| anyhow::anyhow!("{} has no built tileable artifact (run `ddb build` first)", args.path))?;

    let cache_root = CacheManager::default_location()?;
    let cache = CacheManager::new(&cache_root);
    let key = CacheManager::cache_key(&args.path, source_mtime(&artifact), tile_size);

    let render_png = |png_bytes: DdbResult<Vec<u8>>| -> DdbResult<image::RgbaImage> {
        let png_bytes = png_bytes?;
        let image = image::load_from_memory(&png_bytes)
            .map_err(|e| DdbError::app(format!("decoding rendered tile: {e}")))?
            .to_rgba8();
        Ok(image::imageops::resize(&image, args.size, args.size, image::imageops::FilterType::Lanczos3))
    };

    let out_path = match entry.r#type {
        EntryType::GeoRaster => {
            let tiler = GdalTiler::open(&artifact, tile_size)?;
            let (min_z, _) = tiler.get_min_max_z();
            let (tx, ty) = tiler.covering_tile(min_z);
            cache.get_or_build_thumb(&key, args.size, args.force, || render_png(tiler.tile(min_z, tx, ty)))?
        }
        EntryType::PointCloud => {
            let tiler = EptTiler::open(&artifact, tile_size)?;
            let (min_z, _) = tiler.get_min_max_z();
            let (tx, ty) = tiler.covering_tile(min_z);
            cache.get_or_build_thumb(&key, args.size, args.force, || render_png(tiler.tile(min_z, tx, ty)))?
        }
        other => bail!("{} is a {}, which has no thumbnail renderer", args.path, other.to_human()),
    };

    match &args.out {
        Some(dest) => {
            std::fs::copy(&out_path, dest)?;
            output.success(format!("wrote {}", dest.display()));
        }
        None => output.success(format!("cached at {}", out_path.display())),
    }
    Ok(())
}
