//! Resolve → compile/load → install orchestration, with a CLI front end
//! (`glyphb`).
//!
//! Generalizes the teacher's single-file `seqc build` (`compiler/src/
//! main.rs::run_build`) into a multi-module dependency-closure build with
//! incremental progress reporting and cooperative cancellation.

pub mod filesystem;
pub mod orchestrator;
pub mod status;

pub use filesystem::{FilesystemDependencyProvider, PlaceholderCompiler};
pub use orchestrator::{Builder, DependencyProvider, GlobalCallback, ModuleCompiler, PerModuleCallback};
pub use status::{BuildStatus, CompilerError};
