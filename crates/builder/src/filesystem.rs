//! A filesystem-backed [`DependencyProvider`]/[`ModuleCompiler`] pair for
//! the `glyphb` CLI.
//!
//! Full surface-language compilation is explicitly out of scope (the
//! parser and codegen for program text are a non-goal of this
//! workspace); `PlaceholderCompiler` stands in for it the same way
//! `glyph-l2`'s `CallHook` stands in for method dispatch — it treats a
//! module's raw source bytes as an opaque blob and produces a minimal,
//! valid `CompiledCode` so the rest of the build pipeline (progress
//! reporting, cancellation, repository installation) is exercised
//! end-to-end.

use crate::orchestrator::{DependencyProvider, ModuleCompiler};
use crate::status::CompilerError;
use glyph_bytecode::code::{Instruction, Literal};
use glyph_bytecode::{CompiledCode, Opcode};
use glyph_modules::{Manifest, ModuleName, RootSet};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

/// Resolves a module name to `<sourceDir>/<package segments>/<leaf>.glyph`
/// under its root, with dependencies listed one per line in a sibling
/// `.deps` file (absent means no dependencies).
pub struct FilesystemDependencyProvider {
    roots: RootSet,
}

impl FilesystemDependencyProvider {
    pub fn new(roots: RootSet) -> Self {
        FilesystemDependencyProvider { roots }
    }

    fn source_path(&self, module_name: &str) -> Result<PathBuf, CompilerError> {
        let name = ModuleName::parse(module_name)
            .map_err(|e| CompilerError::new(module_name, 0, e.to_string()))?;
        let root = self
            .roots
            .get(name.root())
            .ok_or_else(|| CompilerError::new(module_name, 0, format!("unknown module root '{}'", name.root())))?;
        let source_dir = root.source_dir.as_ref().ok_or_else(|| {
            CompilerError::new(module_name, 0, format!("root '{}' has no source directory", name.root()))
        })?;
        let relative = name.canonical().trim_start_matches('/').replacen(&format!("{}/", name.root()), "", 1);
        Ok(source_dir.join(relative).with_extension("glyph"))
    }
}

impl DependencyProvider for FilesystemDependencyProvider {
    fn source_of(&self, module_name: &str) -> Result<Vec<u8>, CompilerError> {
        let path = self.source_path(module_name)?;
        std::fs::read(&path)
            .map_err(|e| CompilerError::new(module_name, 0, format!("{}: {e}", path.display())))
    }

    fn dependencies_of(&self, module_name: &str) -> Result<Vec<String>, CompilerError> {
        let path = self.source_path(module_name)?.with_extension("deps");
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(contents.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(CompilerError::new(module_name, 0, format!("{}: {e}", path.display()))),
        }
    }
}

/// Wraps a module's source bytes as a single literal in an otherwise
/// empty code object, reporting progress once per byte chunk of 4096.
pub struct PlaceholderCompiler;

impl ModuleCompiler for PlaceholderCompiler {
    fn compile(
        &self,
        module_name: &str,
        source: &[u8],
        interrupt: &AtomicBool,
        on_progress: &dyn Fn(u64, u64),
    ) -> Result<(CompiledCode, Manifest), CompilerError> {
        let mut position = 0u64;
        let mut line = 1u64;
        const CHUNK: u64 = 4096;
        while position < source.len() as u64 {
            if interrupt.load(std::sync::atomic::Ordering::Acquire) {
                return Err(CompilerError::new(module_name, position, "cancelled"));
            }
            let advance = CHUNK.min(source.len() as u64 - position);
            position += advance;
            line += source[position.saturating_sub(advance) as usize..position as usize]
                .iter()
                .filter(|&&b| b == b'\n')
                .count() as u64;
            on_progress(line, position);
        }
        let code = CompiledCode::new(
            0,
            0,
            0,
            1,
            vec![Literal::Str(String::from_utf8_lossy(source).into_owned())],
            vec![Instruction { opcode: Opcode::Return, operands: vec![], source_line: 1 }],
        );
        Ok((code, Manifest::default()))
    }
}
