//! CLI argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ddb")]
#[command(about = "Content-addressed index and build/serve pipeline for geospatial drone datasets")]
#[command(version)]
pub struct Cli {
    /// Output results as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Keep going after a per-entry failure instead of stopping at the
    /// first one (spec §7's nonzero-exit-unless rule).
    #[arg(long, global = true)]
    pub continue_on_error: bool,

    /// Override the default tile size (pixels) for this invocation.
    #[arg(long, global = true)]
    pub tile_size: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new index at (or above) the current directory.
    Init(InitArgs),

    /// Fingerprint, parse and index one or more paths.
    Add(AddArgs),

    /// Remove entries from the index.
    Rm(RmArgs),

    /// List entries, optionally filtered by a glob-ish pattern.
    List(ListArgs),

    /// Build derived artifacts (COG, EPT, Nexus, FlatGeobuf) for buildable entries.
    Build(BuildArgs),

    /// Retry any `.pending` builds whose dependency deadline has passed.
    BuildPending(BuildPendingArgs),

    /// Re-parse already-indexed entries, refreshing hash and metadata.
    Rescan(RescanArgs),

    /// Render an XYZ tile for a raster or point-cloud entry.
    Tile(TileArgs),

    /// Render (or fetch from cache) a thumbnail for an entry.
    Thumb(ThumbArgs),

    /// Export the index as a STAC Catalog/Collection/Item tree.
    Stac(StacArgs),

    /// Compute and apply the delta between this index and a remote index root.
    Sync(SyncArgs),

    /// Print a summary of the index (entry counts, extent, pending builds).
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Index root directory (defaults to the current directory).
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Parser, Debug)]
pub struct AddArgs {
    /// Index root directory.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// One or more files/directories (relative to `root`) to add.
    pub paths: Vec<PathBuf>,

    /// Recurse into directories (default: true; pass --recursive=false to disable).
    #[arg(long, default_value = "true")]
    pub recursive: bool,
}

#[derive(Parser, Debug)]
pub struct RmArgs {
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Index-relative paths to remove.
    pub paths: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Glob-ish pattern (`*`, `?`); matches everything when omitted.
    pub pattern: Option<String>,

    #[arg(long)]
    pub recursive: bool,

    #[arg(long)]
    pub max_depth: Option<u32>,
}

#[derive(Parser, Debug)]
pub struct BuildArgs {
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Build only this index-relative path; build every buildable entry when omitted.
    pub path: Option<String>,

    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct BuildPendingArgs {
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct RescanArgs {
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Restrict to these human-readable entry types (e.g. "geoimage").
    /// Directories can never be rescanned.
    #[arg(long = "type")]
    pub types: Vec<String>,

    #[arg(long)]
    pub stop_on_error: bool,
}

#[derive(Parser, Debug)]
pub struct TileArgs {
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Index-relative path of the raster or EPT point cloud entry.
    pub path: String,

    pub z: u32,
    pub x: i64,
    pub y: i64,

    #[arg(long)]
    pub force: bool,

    /// Where to save the tile PNG; defaults to stdout-suppressing cache-only mode.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ThumbArgs {
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    pub path: String,

    #[arg(long, default_value = "512")]
    pub size: u32,

    #[arg(long)]
    pub force: bool,

    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct StacArgs {
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Output directory for catalog.json/collection.json/items/*.json.
    #[arg(long, default_value = "stac")]
    pub out: PathBuf,

    /// Base URL assets (e.g. thumbnails) are rooted at.
    #[arg(long, default_value = "")]
    pub collection_root: String,

    pub collection_id: String,
}

#[derive(Parser, Debug)]
pub struct SyncArgs {
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Root directory of the other index to reconcile against.
    pub remote_root: PathBuf,

    #[arg(long, value_enum, default_value = "dont-merge")]
    pub merge_strategy: MergeStrategyArg,

    /// Only print the computed delta; apply nothing.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum MergeStrategyArg {
    DontMerge,
    KeepTheirs,
    KeepOurs,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}
