//! EPT (Entwine Point Tile) builder (spec §4.8, §6.1): shells out to
//! `untwine`, the same indexer the original links against directly. No
//! mature Rust binding exists, so this crosses the process boundary like
//! the Entry Parser's PDAL adapter does.

use super::Builder;
use dronedb_core::error::{DdbError, Result};
use std::path::Path;
use std::process::Command;

pub struct EptBuilder;

impl Builder for EptBuilder {
    fn build(&self, source_abs_path: &Path, temp_dir: &Path) -> Result<()> {
        let output = Command::new("untwine")
            .arg("--input")
            .arg(source_abs_path)
            .arg("--output_dir")
            .arg(temp_dir)
            .output()
            .map_err(|e| DdbError::Untwine(format!("failed to invoke untwine: {e}")))?;

        if !output.status.success() {
            return Err(DdbError::Untwine(format!(
                "untwine exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}
