//! `MODULE_ROOTS` grammar: `path := binding (';' binding)*`,
//! `binding := name '=' repoPath (',' sourceDir)?`.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRoot {
    pub name: String,
    pub repo_path: PathBuf,
    pub source_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleRootError {
    MalformedBinding(String),
    PathNotAbsolute(String),
    DuplicateRoot(String),
    RepoPathMissing(PathBuf),
    SourceDirNotADirectory(PathBuf),
}

impl fmt::Display for ModuleRootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleRootError::MalformedBinding(s) => write!(f, "malformed root binding: {s}"),
            ModuleRootError::PathNotAbsolute(s) => write!(f, "path is not absolute: {s}"),
            ModuleRootError::DuplicateRoot(s) => write!(f, "duplicate root name: {s}"),
            ModuleRootError::RepoPathMissing(p) => {
                write!(f, "indexed repository does not exist: {}", p.display())
            }
            ModuleRootError::SourceDirNotADirectory(p) => {
                write!(f, "source path is not a directory: {}", p.display())
            }
        }
    }
}

impl std::error::Error for ModuleRootError {}

/// An insertion-ordered set of [`ModuleRoot`]s parsed from a `MODULE_ROOTS`
/// value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootSet {
    order: Vec<String>,
    roots: std::collections::HashMap<String, ModuleRoot>,
}

impl RootSet {
    /// Parse a `MODULE_ROOTS` value, validating paths against the
    /// filesystem. A leading `/` on the whole value (an artifact some
    /// shells prepend to an otherwise-relative-looking first binding) is
    /// tolerated and stripped.
    pub fn parse(value: &str) -> Result<RootSet, ModuleRootError> {
        let value = value.strip_prefix('/').unwrap_or(value);
        let mut set = RootSet::default();
        for binding in value.split(';').filter(|b| !b.is_empty()) {
            let (name, rest) = binding
                .split_once('=')
                .ok_or_else(|| ModuleRootError::MalformedBinding(binding.to_string()))?;
            if name.is_empty() {
                return Err(ModuleRootError::MalformedBinding(binding.to_string()));
            }
            let (repo_path, source_dir) = match rest.split_once(',') {
                Some((repo, src)) => (repo, Some(src)),
                None => (rest, None),
            };
            if repo_path.is_empty() {
                return Err(ModuleRootError::MalformedBinding(binding.to_string()));
            }
            let repo_path = PathBuf::from(repo_path);
            if !repo_path.is_absolute() {
                return Err(ModuleRootError::PathNotAbsolute(repo_path.display().to_string()));
            }
            let source_dir = match source_dir {
                Some(s) if !s.is_empty() => {
                    let p = PathBuf::from(s);
                    if !p.is_absolute() {
                        return Err(ModuleRootError::PathNotAbsolute(p.display().to_string()));
                    }
                    Some(p)
                }
                _ => None,
            };
            set.insert(ModuleRoot {
                name: name.to_string(),
                repo_path,
                source_dir,
            })?;
        }
        Ok(set)
    }

    fn insert(&mut self, root: ModuleRoot) -> Result<(), ModuleRootError> {
        if self.roots.contains_key(&root.name) {
            return Err(ModuleRootError::DuplicateRoot(root.name.clone()));
        }
        self.order.push(root.name.clone());
        self.roots.insert(root.name.clone(), root);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ModuleRoot> {
        self.roots.get(name)
    }

    /// Roots in the order they were declared.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleRoot> {
        self.order.iter().map(|n| &self.roots[n])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Validate each root against the filesystem: if no `source_dir` was
    /// given, `repo_path` must already exist (an indexed repository);
    /// otherwise `source_dir` must be a directory.
    pub fn validate_against_filesystem(&self) -> Result<(), ModuleRootError> {
        for root in self.iter() {
            match &root.source_dir {
                None => {
                    if !root.repo_path.exists() {
                        return Err(ModuleRootError::RepoPathMissing(root.repo_path.clone()));
                    }
                }
                Some(dir) => {
                    if !dir.is_dir() {
                        return Err(ModuleRootError::SourceDirNotADirectory(dir.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_roots_parse_in_order_second_has_no_source_dir() {
        let set = RootSet::parse("/avail=/r/avail.repo,/r/src;ext=/r/ext.repo").unwrap();
        assert_eq!(set.len(), 2);
        let roots: Vec<&ModuleRoot> = set.iter().collect();
        assert_eq!(roots[0].name, "avail");
        assert_eq!(roots[0].repo_path, PathBuf::from("/r/avail.repo"));
        assert_eq!(roots[0].source_dir, Some(PathBuf::from("/r/src")));
        assert_eq!(roots[1].name, "ext");
        assert_eq!(roots[1].repo_path, PathBuf::from("/r/ext.repo"));
        assert_eq!(roots[1].source_dir, None);
    }

    #[test]
    fn relative_repo_path_is_rejected() {
        let err = RootSet::parse("avail=r/avail.repo").unwrap_err();
        assert!(matches!(err, ModuleRootError::PathNotAbsolute(_)));
    }

    #[test]
    fn duplicate_root_name_is_rejected() {
        let err = RootSet::parse("a=/x;a=/y").unwrap_err();
        assert_eq!(err, ModuleRootError::DuplicateRoot("a".to_string()));
    }

    #[test]
    fn missing_equals_is_malformed() {
        let err = RootSet::parse("avail/r/avail.repo").unwrap_err();
        assert!(matches!(err, ModuleRootError::MalformedBinding(_)));
    }

    #[test]
    fn validate_requires_existing_repo_when_no_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.repo");
        let set = RootSet::parse(&format!("a={}", missing.display())).unwrap();
        let err = set.validate_against_filesystem().unwrap_err();
        assert!(matches!(err, ModuleRootError::RepoPathMissing(_)));
    }

    #[test]
    fn validate_requires_source_dir_to_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("x.repo");
        let not_a_dir = dir.path().join("file.txt");
        std::fs::write(&not_a_dir, b"x").unwrap();
        let set = RootSet::parse(&format!("a={},{}", repo.display(), not_a_dir.display())).unwrap();
        let err = set.validate_against_filesystem().unwrap_err();
        assert!(matches!(err, ModuleRootError::SourceDirNotADirectory(_)));
    }
}
