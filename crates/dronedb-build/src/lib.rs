//! Build Orchestrator, cross-process `BuildLock`, in-process `ThreadLock`
//! registry and type-specific builders (spec §4.8-§4.9, §6.1).

pub mod build_lock;
pub mod builders;
pub mod orchestrator;
pub mod thread_lock;

pub use build_lock::BuildLock;
pub use builders::{builder_for, subfolder_for, Builder};
pub use orchestrator::BuildOrchestrator;
pub use thread_lock::LockRegistry;
