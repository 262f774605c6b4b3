//! `ddb build` / `ddb build-pending`

use crate::cli::{BuildArgs, BuildPendingArgs};
use crate::output::OutputWriter;
use anyhow::{bail, Result};
use dronedb_build::BuildOrchestrator;
use dronedb_store::Database;

pub fn build(args: BuildArgs, output: &OutputWriter, continue_on_error: bool) -> Result<()> {
    let db = Database::open(&args.root, false)?;
    let config = crate::config::load(db.root(), Default::default())?;
    let orchestrator = BuildOrchestrator::new(&db, config.build_pending_backoff_secs.value);

    match &args.path {
        Some(path) => match orchestrator.build(path, args.force, None) {
            Ok(Some(out)) => output.success(format!("built {path} -> {}", out.display())),
            Ok(None) => output.info(format!("{path} is not buildable")),
            Err(e) => {
                output.error_line(path, &e);
                if !continue_on_error {
                    bail!(e);
                }
            }
        },
        None => {
            let failures = orchestrator.build_all(args.force, None)?;
            for path in &failures {
                output.error_line(path, "build failed, see log for detail");
            }
            if !failures.is_empty() {
                output.warning(format!("{} entr{} failed to build", failures.len(), if failures.len() == 1 { "y" } else { "ies" }));
                if !continue_on_error {
                    bail!("{} build(s) failed", failures.len());
                }
            } else {
                output.success("build complete");
            }
        }
    }
    Ok(())
}

pub fn build_pending(args: BuildPendingArgs, output: &OutputWriter) -> Result<()> {
    let db = Database::open(&args.root, false)?;
    let config = crate::config::load(db.root(), Default::default())?;
    let orchestrator = BuildOrchestrator::new(&db, config.build_pending_backoff_secs.value);
    orchestrator.build_pending(args.force, None)?;
    output.success("pending builds retried");
    Ok(())
}
