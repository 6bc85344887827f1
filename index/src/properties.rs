//! Dense per-node timestamp arrays persisted between builder stages.
//!
//! On disk: a small header (magic + length) followed by raw little-endian
//! `i64` values. Both sentinels (`i64::MAX` for never-seen minima, `i64::MIN`
//! for unknown maxima) read back as absent.

use crate::errors::{IndexError, IndexResult};
use provenance_model::{NodeId, Timestamp};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

pub const EARLIEST_UNSET: i64 = i64::MAX;
pub const MAX_LEAF_UNKNOWN: i64 = i64::MIN;

const MAGIC: &[u8; 4] = b"PVTS";
pub const VALUES_FILE: &str = "values.bin";

pub struct TimestampArray {
    values: Vec<i64>,
}

impl TimestampArray {
    pub fn from_values(values: Vec<i64>) -> Self {
        Self { values }
    }

    pub fn from_atomic(values: Vec<AtomicI64>) -> Self {
        Self { values: values.into_iter().map(|v| v.into_inner()).collect() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw slot value, sentinel included.
    pub fn raw(&self, node: NodeId) -> i64 {
        self.values[node as usize]
    }

    /// The recorded timestamp, or `None` for out-of-range nodes and sentinels.
    pub fn get(&self, node: NodeId) -> Option<Timestamp> {
        match self.values.get(node as usize) {
            Some(&v) if v != EARLIEST_UNSET && v != MAX_LEAF_UNKNOWN => Some(v),
            _ => None,
        }
    }

    pub fn save(&self, dir: &Path) -> IndexResult<()> {
        let path = dir.join(VALUES_FILE);
        let mut bytes = Vec::with_capacity(MAGIC.len() + 8 + self.values.len() * 8);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&(self.values.len() as u64).to_le_bytes());
        for value in &self.values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        fs::write(&path, bytes).map_err(|e| IndexError::Io { path, source: e })
    }

    pub fn load(dir: &Path) -> IndexResult<Self> {
        let path = dir.join(VALUES_FILE);
        let bytes = fs::read(&path).map_err(|e| IndexError::Io { path: path.clone(), source: e })?;
        let malformed = |reason: &str| IndexError::IncompleteInput(format!("{}: {reason}", path.display()));
        if bytes.len() < MAGIC.len() + 8 || &bytes[..4] != MAGIC {
            return Err(malformed("not a timestamp array"));
        }
        let len = u64::from_le_bytes(bytes[4..12].try_into().unwrap()) as usize;
        let payload = &bytes[12..];
        if payload.len() != len * 8 {
            return Err(malformed("truncated timestamp array"));
        }
        let values = payload.chunks_exact(8).map(|c| i64::from_le_bytes(c.try_into().unwrap())).collect();
        Ok(Self { values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let array = TimestampArray::from_values(vec![10, EARLIEST_UNSET, -5, MAX_LEAF_UNKNOWN]);
        array.save(tmp.path()).unwrap();

        let loaded = TimestampArray::load(tmp.path()).unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.get(0), Some(10));
        assert_eq!(loaded.get(1), None);
        assert_eq!(loaded.get(2), Some(-5));
        assert_eq!(loaded.get(3), None);
        assert_eq!(loaded.get(4), None);
    }

    #[test]
    fn test_load_rejects_truncation() {
        let tmp = tempfile::tempdir().unwrap();
        let array = TimestampArray::from_values(vec![1, 2, 3]);
        array.save(tmp.path()).unwrap();

        let path = tmp.path().join(VALUES_FILE);
        let mut bytes = fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 3);
        fs::write(&path, bytes).unwrap();
        assert!(matches!(TimestampArray::load(tmp.path()), Err(IndexError::IncompleteInput(_))));
    }
}
