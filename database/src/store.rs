use crate::errors::{StoreError, StoreResult};
use std::fs;
use std::path::{Path, PathBuf};

pub const SUCCESS_MARKER: &str = "_SUCCESS";
const PART_PREFIX: &str = "part-";
const PART_EXTENSION: &str = "parquet";
const SIDECAR_EXTENSION: &str = "ef";

/// One columnar part file and its Elias–Fano sidecar.
#[derive(Clone, Debug)]
pub struct PartFile {
    pub parquet: PathBuf,
    pub sidecar: PathBuf,
}

/// A successfully built table directory.
#[derive(Clone, Debug)]
pub struct TableHandle {
    pub name: String,
    pub dir: PathBuf,
    /// Part files sorted by name. Empty for property-array directories.
    pub parts: Vec<PartFile>,
}

/// Storage of immutable table directories. Builders write into a staging
/// directory and promote it with a single atomic rename.
pub trait TableStore: Send + Sync {
    fn open(&self, name: &str) -> StoreResult<TableHandle>;
    fn create_staging(&self, name: &str) -> StoreResult<PathBuf>;
    fn put_atomic(&self, name: &str, staging: &Path) -> StoreResult<()>;
}

/// Local filesystem backend. `--database` accepts a bare path or a `file://`
/// URL; other schemes are rejected.
pub struct LocalTableStore {
    root: PathBuf,
}

impl LocalTableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_url(url: &str) -> StoreResult<Self> {
        if let Some(path) = url.strip_prefix("file://") {
            Ok(Self::new(path))
        } else if url.contains("://") {
            Err(StoreError::UnsupportedUrl(url.to_string()))
        } else {
            Ok(Self::new(url))
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TableStore for LocalTableStore {
    fn open(&self, name: &str) -> StoreResult<TableHandle> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(StoreError::TableNotFound(name.to_string()));
        }
        if !dir.join(SUCCESS_MARKER).is_file() {
            return Err(StoreError::TableIncomplete(name.to_string()));
        }
        let mut parts = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))? {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let path = entry.path();
            let is_part = path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with(PART_PREFIX))
                && path.extension().and_then(|e| e.to_str()) == Some(PART_EXTENSION);
            if !is_part {
                continue;
            }
            let sidecar = path.with_extension(SIDECAR_EXTENSION);
            if !sidecar.is_file() {
                return Err(StoreError::corruption(&path, "missing elias-fano sidecar"));
            }
            parts.push(PartFile { parquet: path, sidecar });
        }
        parts.sort_by(|a, b| a.parquet.cmp(&b.parquet));
        Ok(TableHandle { name: name.to_string(), dir, parts })
    }

    fn create_staging(&self, name: &str) -> StoreResult<PathBuf> {
        let staging = self.root.join(format!(".{name}.staging"));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| StoreError::io(&staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| StoreError::io(&staging, e))?;
        Ok(staging)
    }

    fn put_atomic(&self, name: &str, staging: &Path) -> StoreResult<()> {
        let dest = self.root.join(name);
        if dest.exists() {
            fs::remove_dir_all(&dest).map_err(|e| StoreError::io(&dest, e))?;
        }
        fs::rename(staging, &dest).map_err(|e| StoreError::io(&dest, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_and_incomplete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalTableStore::new(tmp.path());
        assert!(matches!(store.open("nodes"), Err(StoreError::TableNotFound(_))));

        fs::create_dir(tmp.path().join("nodes")).unwrap();
        assert!(matches!(store.open("nodes"), Err(StoreError::TableIncomplete(_))));

        fs::write(tmp.path().join("nodes").join(SUCCESS_MARKER), b"").unwrap();
        let handle = store.open("nodes").unwrap();
        assert!(handle.parts.is_empty());
    }

    #[test]
    fn test_staging_promotion() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalTableStore::new(tmp.path());
        let staging = store.create_staging("nodes").unwrap();
        fs::write(staging.join(SUCCESS_MARKER), b"").unwrap();
        store.put_atomic("nodes", &staging).unwrap();
        assert!(store.open("nodes").is_ok());
        assert!(!staging.exists());
    }

    #[test]
    fn test_missing_sidecar_is_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalTableStore::new(tmp.path());
        let dir = tmp.path().join("nodes");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join(SUCCESS_MARKER), b"").unwrap();
        fs::write(dir.join("part-00000.parquet"), b"stub").unwrap();
        assert!(matches!(store.open("nodes"), Err(StoreError::Corruption { .. })));
    }

    #[test]
    fn test_from_url() {
        assert!(LocalTableStore::from_url("/data/provenance").is_ok());
        assert!(LocalTableStore::from_url("file:///data/provenance").is_ok());
        assert!(matches!(LocalTableStore::from_url("s3://bucket/provenance"), Err(StoreError::UnsupportedUrl(_))));
    }
}
