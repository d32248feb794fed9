//! Module path grammar, root resolution, and the compiled-module
//! repository.
//!
//! Grounded on the teacher's `compiler::resolver::Resolver`: an
//! insertion-ordered collection of roots, canonicalized/absolute-path
//! validation, and a project-boundary style check — generalized here from
//! "includes must resolve under one project root" to "every root path
//! must be absolute".

pub mod name;
pub mod rename;
pub mod repo;
pub mod root;

pub use name::{ModuleName, ResolvedModuleName};
pub use rename::RenameRule;
pub use repo::{Manifest, ManifestEntry, ModuleRepository};
pub use root::{ModuleRoot, ModuleRootError, RootSet};
