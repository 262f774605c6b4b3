//! Nexus mesh builder (spec §4.8, §6.1): shells out to `nxsbuild`, writing
//! `<temp>/model.nxz`. No Rust binding exists for the Nexus library.

use super::Builder;
use dronedb_core::error::{DdbError, Result};
use std::path::Path;
use std::process::Command;

pub struct NexusBuilder;

impl Builder for NexusBuilder {
    fn build(&self, source_abs_path: &Path, temp_dir: &Path) -> Result<()> {
        let out_path = temp_dir.join("model.nxz");
        let output = Command::new("nxsbuild")
            .arg(source_abs_path)
            .arg("-o")
            .arg(&out_path)
            .output()
            .map_err(|e| DdbError::app(format!("failed to invoke nxsbuild: {e}")))?;

        if !output.status.success() {
            return Err(DdbError::app(format!(
                "nxsbuild exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}
