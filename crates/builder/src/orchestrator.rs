//! Resolve → compile/load → install orchestration across a module's
//! dependency closure.
//!
//! Grounded on the teacher's `compiler::resolver::Resolver` (closure
//! discovery over imports) and `main.rs::run_build`'s
//! compile-then-report-result shape, generalized from a single source
//! file into a multi-module closure with incremental progress callbacks
//! and cooperative cancellation.

use crate::status::{BuildStatus, CompilerError};
use glyph_bytecode::CompiledCode;
use glyph_modules::{ModuleRepository, Manifest};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Per-module progress: `(moduleName, lineNumber, parsePositionBytes,
/// moduleSizeBytes)`.
pub type PerModuleCallback = Arc<dyn Fn(&str, u64, u64, u64) + Send + Sync>;

/// Aggregate progress across the whole plan: `(currentModule,
/// globalPositionBytes, globalCodeSizeBytes)`.
pub type GlobalCallback = Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

/// Supplies a module's source bytes and its direct dependency names.
pub trait DependencyProvider: Send + Sync {
    fn source_of(&self, module_name: &str) -> Result<Vec<u8>, CompilerError>;
    fn dependencies_of(&self, module_name: &str) -> Result<Vec<String>, CompilerError>;
}

/// Compiles one module's source into a code object, reporting
/// `(line, position)` progress as it goes and observing `interrupt`
/// between increments.
pub trait ModuleCompiler: Send + Sync {
    fn compile(
        &self,
        module_name: &str,
        source: &[u8],
        interrupt: &AtomicBool,
        on_progress: &dyn Fn(u64, u64),
    ) -> Result<(CompiledCode, Manifest), CompilerError>;
}

/// Orchestrates a single `build <module>` run against a repository.
pub struct Builder {
    repo: ModuleRepository,
    dependencies: Arc<dyn DependencyProvider>,
    compiler: Arc<dyn ModuleCompiler>,
    interrupt: Arc<AtomicBool>,
}

impl Builder {
    pub fn new(
        repo: ModuleRepository,
        dependencies: Arc<dyn DependencyProvider>,
        compiler: Arc<dyn ModuleCompiler>,
    ) -> Self {
        Builder { repo, dependencies, compiler, interrupt: Arc::new(AtomicBool::new(false)) }
    }

    /// The shared interrupt flag; setting it requests cancellation at the
    /// next progress callback.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// Discover `target`'s dependency closure in post-order (dependencies
    /// before dependents), compile or load each not-yet-installed module,
    /// and report progress through `per_module`/`global`.
    pub fn build(
        &self,
        target: &str,
        per_module: PerModuleCallback,
        global: GlobalCallback,
        mut error_sink: impl FnMut(&CompilerError, &[u8]),
    ) -> BuildStatus {
        let start = Instant::now();
        let plan = match self.discover_closure(target) {
            Ok(plan) => plan,
            Err(e) => {
                error_sink(&e, &[]);
                return BuildStatus::Aborted(start.elapsed());
            }
        };

        let mut total_size: u64 = 0;
        let mut sources: Vec<(String, Vec<u8>)> = Vec::new();
        for name in &plan {
            if self.repo.contains(name) {
                continue;
            }
            match self.dependencies.source_of(name) {
                Ok(source) => {
                    total_size += source.len() as u64;
                    sources.push((name.clone(), source));
                }
                Err(e) => {
                    error_sink(&e, &[]);
                    return BuildStatus::Aborted(start.elapsed());
                }
            }
        }

        let mut global_position: u64 = 0;
        for (name, source) in &sources {
            if self.interrupt.load(Ordering::Acquire) {
                return BuildStatus::Cancelled(start.elapsed());
            }
            let module_size = source.len() as u64;
            let base_position = global_position;
            let interrupt = &*self.interrupt;
            let report = |line: u64, position: u64| {
                per_module(name, line, position, module_size);
                global(name, base_position + position, total_size);
            };
            match self.compiler.compile(name, source, interrupt, &report) {
                Ok((code, manifest)) => {
                    if self.interrupt.load(Ordering::Acquire) {
                        return BuildStatus::Cancelled(start.elapsed());
                    }
                    if self.repo.store(name, &code, &manifest).is_err() {
                        error_sink(
                            &CompilerError::new(name.clone(), 0, "failed to install compiled module"),
                            source,
                        );
                        return BuildStatus::Aborted(start.elapsed());
                    }
                    global_position += module_size;
                }
                Err(e) => {
                    if self.interrupt.load(Ordering::Acquire) {
                        return BuildStatus::Cancelled(start.elapsed());
                    }
                    error_sink(&e, source);
                    return BuildStatus::Aborted(start.elapsed());
                }
            }
        }

        BuildStatus::Done(start.elapsed())
    }

    /// Post-order dependency closure: every dependency of `target`
    /// appears before `target` itself, each module appearing once.
    fn discover_closure(&self, target: &str) -> Result<Vec<String>, CompilerError> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(target.to_string(), false)];
        let mut on_path = VecDeque::new();
        while let Some((name, deps_pushed)) = stack.pop() {
            if deps_pushed {
                on_path.pop_back();
                if visited.insert(name.clone()) {
                    order.push(name);
                }
                continue;
            }
            if visited.contains(&name) {
                continue;
            }
            if on_path.contains(&name) {
                return Err(CompilerError::new(name, 0, "circular module dependency"));
            }
            on_path.push_back(name.clone());
            stack.push((name.clone(), true));
            for dep in self.dependencies.dependencies_of(&name)? {
                stack.push((dep, false));
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyph_bytecode::code::{Instruction, Literal};
    use glyph_bytecode::Opcode;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeDeps(HashMap<String, (Vec<u8>, Vec<String>)>);
    impl DependencyProvider for FakeDeps {
        fn source_of(&self, module_name: &str) -> Result<Vec<u8>, CompilerError> {
            self.0
                .get(module_name)
                .map(|(src, _)| src.clone())
                .ok_or_else(|| CompilerError::new(module_name, 0, "no such module"))
        }
        fn dependencies_of(&self, module_name: &str) -> Result<Vec<String>, CompilerError> {
            self.0
                .get(module_name)
                .map(|(_, deps)| deps.clone())
                .ok_or_else(|| CompilerError::new(module_name, 0, "no such module"))
        }
    }

    struct TrivialCompiler;
    impl ModuleCompiler for TrivialCompiler {
        fn compile(
            &self,
            _module_name: &str,
            source: &[u8],
            _interrupt: &AtomicBool,
            on_progress: &dyn Fn(u64, u64),
        ) -> Result<(CompiledCode, Manifest), CompilerError> {
            on_progress(1, source.len() as u64);
            let code = CompiledCode::new(
                0,
                0,
                0,
                1,
                vec![Literal::Int(source.len() as i64)],
                vec![Instruction { opcode: Opcode::Return, operands: vec![], source_line: 1 }],
            );
            Ok((code, Manifest::default()))
        }
    }

    struct FailingCompiler;
    impl ModuleCompiler for FailingCompiler {
        fn compile(
            &self,
            module_name: &str,
            _source: &[u8],
            _interrupt: &AtomicBool,
            _on_progress: &dyn Fn(u64, u64),
        ) -> Result<(CompiledCode, Manifest), CompilerError> {
            Err(CompilerError::new(module_name, 3, "syntax error"))
        }
    }

    fn deps_fixture() -> HashMap<String, (Vec<u8>, Vec<String>)> {
        let mut m = HashMap::new();
        m.insert("/a/Leaf".to_string(), (b"leaf source".to_vec(), vec![]));
        m.insert("/a/Root".to_string(), (b"root source".to_vec(), vec!["/a/Leaf".to_string()]));
        m
    }

    #[test]
    fn builds_the_closure_in_dependency_order_and_installs_every_module() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ModuleRepository::open(dir.path());
        let builder = Builder::new(repo, Arc::new(FakeDeps(deps_fixture())), Arc::new(TrivialCompiler));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let per_module: PerModuleCallback = Arc::new(move |name, _line, _pos, _size| {
            seen2.lock().unwrap().push(name.to_string());
        });
        let global: GlobalCallback = Arc::new(|_, _, _| {});

        let status = builder.build("/a/Root", per_module, global, |_, _| panic!("no error expected"));
        assert_eq!(status, BuildStatus::Done(status_elapsed(&status)));
        assert_eq!(*seen.lock().unwrap(), vec!["/a/Leaf", "/a/Root"]);
        assert!(builder.repo.contains("/a/Leaf"));
        assert!(builder.repo.contains("/a/Root"));
    }

    #[test]
    fn already_installed_modules_are_loaded_not_recompiled() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ModuleRepository::open(dir.path());
        let code = CompiledCode::new(0, 0, 0, 1, vec![], vec![]);
        repo.store("/a/Leaf", &code, &Manifest::default()).unwrap();
        let builder = Builder::new(repo, Arc::new(FakeDeps(deps_fixture())), Arc::new(TrivialCompiler));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let per_module: PerModuleCallback = Arc::new(move |name, _, _, _| {
            seen2.lock().unwrap().push(name.to_string());
        });
        let status = builder.build("/a/Root", per_module, Arc::new(|_, _, _| {}), |_, _| {});
        assert!(matches!(status, BuildStatus::Done(_)));
        assert_eq!(*seen.lock().unwrap(), vec!["/a/Root"]);
    }

    #[test]
    fn compile_error_finalizes_aborted_and_renders_context() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ModuleRepository::open(dir.path());
        let builder = Builder::new(repo, Arc::new(FakeDeps(deps_fixture())), Arc::new(FailingCompiler));
        let rendered = Arc::new(Mutex::new(None));
        let rendered2 = rendered.clone();
        let status = builder.build(
            "/a/Root",
            Arc::new(|_, _, _, _| {}),
            Arc::new(|_, _, _| {}),
            |e, src| *rendered2.lock().unwrap() = Some(e.render_context(src)),
        );
        assert!(matches!(status, BuildStatus::Aborted(_)));
        assert!(rendered.lock().unwrap().is_some());
    }

    #[test]
    fn interrupt_flag_cancels_before_the_next_module() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ModuleRepository::open(dir.path());
        let builder = Builder::new(repo, Arc::new(FakeDeps(deps_fixture())), Arc::new(TrivialCompiler));
        builder.interrupt_flag().store(true, Ordering::Release);
        let status = builder.build("/a/Root", Arc::new(|_, _, _, _| {}), Arc::new(|_, _, _| {}), |_, _| {});
        assert!(matches!(status, BuildStatus::Cancelled(_)));
    }

    #[test]
    fn circular_dependency_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ModuleRepository::open(dir.path());
        let mut cyclic = HashMap::new();
        cyclic.insert("/a/A".to_string(), (b"a".to_vec(), vec!["/a/B".to_string()]));
        cyclic.insert("/a/B".to_string(), (b"b".to_vec(), vec!["/a/A".to_string()]));
        let builder = Builder::new(repo, Arc::new(FakeDeps(cyclic)), Arc::new(TrivialCompiler));
        let status = builder.build("/a/A", Arc::new(|_, _, _, _| {}), Arc::new(|_, _, _| {}), |_, _| {});
        assert!(matches!(status, BuildStatus::Aborted(_)));
    }

    fn status_elapsed(status: &BuildStatus) -> std::time::Duration {
        match status {
            BuildStatus::Done(d) | BuildStatus::Cancelled(d) | BuildStatus::Aborted(d) => *d,
        }
    }
}
