//! Canonical module names: `/Root/Seg/.../Leaf`.

use std::fmt;

#[derive(Debug, Clone, Eq)]
pub struct ModuleName {
    canonical: String,
    root: String,
    segments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleNameError {
    NotAbsolute(String),
    Empty(String),
}

impl fmt::Display for ModuleNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleNameError::NotAbsolute(s) => {
                write!(f, "module name must start with '/': {s}")
            }
            ModuleNameError::Empty(s) => write!(f, "module name has no segments: {s}"),
        }
    }
}

impl std::error::Error for ModuleNameError {}

impl ModuleName {
    /// Decompose `path`: split on `/`, assert a leading empty segment (the
    /// name is absolute), the first real segment is the root, the last is
    /// the local name, and the reassembled prefix between them is the
    /// package name.
    pub fn parse(path: &str) -> Result<ModuleName, ModuleNameError> {
        let mut parts = path.split('/');
        match parts.next() {
            Some("") => {}
            _ => return Err(ModuleNameError::NotAbsolute(path.to_string())),
        }
        let segments: Vec<String> = parts.map(str::to_string).collect();
        if segments.is_empty() || segments.iter().any(String::is_empty) {
            return Err(ModuleNameError::Empty(path.to_string()));
        }
        Ok(ModuleName {
            canonical: path.to_string(),
            root: segments[0].clone(),
            segments,
        })
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn leaf(&self) -> &str {
        self.segments.last().expect("non-empty by construction")
    }

    /// The package name: the root plus every segment between the root and
    /// the leaf, reassembled as a `/`-joined path (without the leaf).
    pub fn package(&self) -> String {
        let package_segments = &self.segments[..self.segments.len() - 1];
        format!("/{}", package_segments.join("/"))
    }
}

impl PartialEq for ModuleName {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl std::hash::Hash for ModuleName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)
    }
}

/// The result of resolving a [`ModuleName`] against a [`crate::RenameRule`]
/// set: the (possibly rewritten) canonical name, tagged with whether a
/// rename actually applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModuleName {
    pub name: ModuleName,
    pub is_rename: bool,
}
