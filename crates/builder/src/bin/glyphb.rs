//! `glyphb` — the builder CLI.
//!
//! Subcommand/exit-code shape grounded on the teacher's `compiler/src/
//! main.rs` (`Cli`/`Commands` via `clap::Parser`, each subcommand a
//! `run_*` function that prints to stdout/stderr and calls
//! `process::exit` on failure).

use clap::{Parser, Subcommand};
use glyph_builder::{Builder, BuildStatus, FilesystemDependencyProvider, PlaceholderCompiler};
use glyph_modules::{ModuleName, ModuleRepository, RootSet};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "glyphb")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resolve, compile, and install Glyph modules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a module and its dependency closure, installing each into
    /// its root's repository.
    Build { module: String },

    /// Remove a root's installed repository entries.
    Clean { root: String },

    /// Re-validate every configured root against the filesystem.
    Refresh,
}

const USAGE_ERROR: i32 = 1;
const IO_ERROR: i32 = 3;

fn main() {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Build { module } => run_build(&module),
        Commands::Clean { root } => run_clean(&root),
        Commands::Refresh => run_refresh(),
    };
    process::exit(code);
}

fn load_roots() -> Result<RootSet, i32> {
    let value = match std::env::var("MODULE_ROOTS") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("MODULE_ROOTS is not set");
            return Err(USAGE_ERROR);
        }
    };
    RootSet::parse(&value).map_err(|e| {
        eprintln!("invalid MODULE_ROOTS: {e}");
        USAGE_ERROR
    })
}

fn run_build(module: &str) -> i32 {
    let roots = match load_roots() {
        Ok(r) => r,
        Err(code) => return code,
    };
    let name = match ModuleName::parse(module) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("invalid module name '{module}': {e}");
            return USAGE_ERROR;
        }
    };
    let Some(root) = roots.get(name.root()) else {
        eprintln!("unknown module root '{}'", name.root());
        return USAGE_ERROR;
    };
    let repo = ModuleRepository::open(&root.repo_path);
    let dependencies = Arc::new(FilesystemDependencyProvider::new(roots));
    let builder = Builder::new(repo, dependencies, Arc::new(PlaceholderCompiler));

    let per_module = Arc::new(|name: &str, line: u64, position: u64, size: u64| {
        eprintln!("  {name}: line {line}, {position}/{size} bytes");
    });
    let global = Arc::new(|name: &str, position: u64, total: u64| {
        tracing::trace!(module = name, position, total, "build progress");
    });

    let status = builder.build(module, per_module, global, |err, source| {
        eprintln!("{}", err.render_context(source));
    });

    match &status {
        BuildStatus::Done(_) => println!("{status}"),
        BuildStatus::Cancelled(_) => println!("{status}"),
        BuildStatus::Aborted(_) => println!("{status}"),
    }
    status.exit_code()
}

fn run_clean(root_name: &str) -> i32 {
    let roots = match load_roots() {
        Ok(r) => r,
        Err(code) => return code,
    };
    let Some(root) = roots.get(root_name) else {
        eprintln!("unknown module root '{root_name}'");
        return USAGE_ERROR;
    };
    let path = PathBuf::from(&root.repo_path);
    if !path.exists() {
        return 0;
    }
    match std::fs::remove_dir_all(&path) {
        Ok(()) => {
            println!("cleaned {}", path.display());
            0
        }
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            IO_ERROR
        }
    }
}

fn run_refresh() -> i32 {
    let roots = match load_roots() {
        Ok(r) => r,
        Err(code) => return code,
    };
    match roots.validate_against_filesystem() {
        Ok(()) => {
            println!("ok: {} root(s) valid", roots.len());
            0
        }
        Err(e) => {
            eprintln!("{e}");
            IO_ERROR
        }
    }
}
