//! The indexed-file module repository: per module hash, a serialized
//! compiled code tree plus a manifest linking source byte ranges to L1
//! instruction spans.

use glyph_bytecode::CompiledCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

/// One source-range-to-instruction-span link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub source_start: u32,
    pub source_end: u32,
    pub instruction_start: u32,
    pub instruction_end: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Record {
    code: glyph_bytecode::code::CompiledCodeWire,
    manifest: Manifest,
}

/// A directory-backed repository, one file per module hash.
pub struct ModuleRepository {
    root: PathBuf,
}

impl ModuleRepository {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        ModuleRepository { root: root.into() }
    }

    /// The module's hash, used as its on-disk key.
    pub fn hash_of(canonical_name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(canonical_name.as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn path_for(&self, canonical_name: &str) -> PathBuf {
        self.root.join(Self::hash_of(canonical_name))
    }

    pub fn store(
        &self,
        canonical_name: &str,
        code: &CompiledCode,
        manifest: &Manifest,
    ) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let record = Record { code: code.to_wire(), manifest: manifest.clone() };
        let bytes = bincode::serialize(&record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(self.path_for(canonical_name), bytes)
    }

    pub fn load(&self, canonical_name: &str) -> io::Result<Option<(CompiledCode, Manifest)>> {
        let path = self.path_for(canonical_name);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        let record: Record = bincode::deserialize(&bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let code = CompiledCode::from_wire(&record.code);
        Ok(Some((code, record.manifest)))
    }

    pub fn contains(&self, canonical_name: &str) -> bool {
        self.path_for(canonical_name).exists()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyph_bytecode::code::Literal;
    use glyph_bytecode::Opcode;

    fn sample_code() -> CompiledCode {
        CompiledCode::new(
            1,
            1,
            0,
            1,
            vec![Literal::Int(7)],
            vec![glyph_bytecode::code::Instruction {
                opcode: Opcode::PushLiteral,
                operands: vec![0],
                source_line: 1,
            }],
        )
    }

    #[test]
    fn stores_and_loads_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ModuleRepository::open(dir.path());
        let code = sample_code();
        let manifest = Manifest {
            entries: vec![ManifestEntry {
                source_start: 0,
                source_end: 10,
                instruction_start: 0,
                instruction_end: 1,
            }],
        };
        repo.store("/avail/Example", &code, &manifest).unwrap();
        assert!(repo.contains("/avail/Example"));
        let (loaded_code, loaded_manifest) = repo.load("/avail/Example").unwrap().unwrap();
        assert_eq!(loaded_code.instructions().len(), code.instructions().len());
        assert_eq!(loaded_manifest, manifest);
    }

    #[test]
    fn missing_module_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ModuleRepository::open(dir.path());
        assert!(repo.load("/avail/Nope").unwrap().is_none());
    }

    #[test]
    fn hash_is_stable_and_distinct_per_name() {
        let h1 = ModuleRepository::hash_of("/avail/A");
        let h2 = ModuleRepository::hash_of("/avail/A");
        let h3 = ModuleRepository::hash_of("/avail/B");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }
}
