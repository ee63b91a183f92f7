use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::PersistError;
use crate::core::position::Position;
use crate::utils::io::write_atomically;

pub const CHECKPOINT_FILE: &str = "checkpoint";
pub const MANIFEST_FILE: &str = "run_manifest.json";

/// Index of the last batch whose artifacts are fully committed.
///
/// The file holds a single integer and is replaced atomically, so it is
/// either absent (nothing committed) or names a batch whose artifacts exist.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(CHECKPOINT_FILE),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last committed batch index, if any
    ///
    /// # Errors
    ///
    /// Returns `PersistError::Read` if the file exists but cannot be read,
    /// or `PersistError::Corrupt` if it does not hold an integer.
    pub fn load(&self) -> Result<Option<usize>, PersistError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(PersistError::read(&self.path, source)),
        };
        content
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PersistError::Corrupt {
                path: self.path.clone(),
                detail: format!("expected a batch index, found '{}'", content.trim()),
            })
    }

    /// First batch still to run
    ///
    /// # Errors
    ///
    /// See [`Checkpoint::load`].
    pub fn next_batch(&self) -> Result<usize, PersistError> {
        Ok(self.load()?.map_or(0, |last| last + 1))
    }

    /// Durably record `batch` as the last committed batch
    ///
    /// # Errors
    ///
    /// Returns `PersistError::Write` on any IO failure.
    pub fn commit(&self, batch: usize) -> Result<(), PersistError> {
        write_atomically(&self.path, |w| writeln!(w, "{batch}"))
            .map_err(|source| PersistError::write(&self.path, source))
    }
}

/// Identity of a scoring run, used to refuse resuming with different input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub batch_size: usize,
    pub item_count: usize,

    /// MD5 over the ordered item identifiers
    pub fingerprint: String,

    pub created_at: DateTime<Utc>,
}

impl RunManifest {
    #[must_use]
    pub fn new(items: &[Position], batch_size: usize) -> Self {
        Self {
            batch_size,
            item_count: items.len(),
            fingerprint: Self::fingerprint(items),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn fingerprint(items: &[Position]) -> String {
        let mut context = md5::Context::new();
        for item in items {
            context.consume(item.variant_id().as_bytes());
            context.consume(b"\n");
        }
        format!("{:x}", context.compute())
    }

    /// Describe how `other` differs from this manifest, ignoring creation time
    #[must_use]
    pub fn mismatch(&self, other: &Self) -> Option<String> {
        if self.batch_size != other.batch_size {
            Some(format!(
                "batch size {} vs {}",
                self.batch_size, other.batch_size
            ))
        } else if self.item_count != other.item_count {
            Some(format!(
                "item count {} vs {}",
                self.item_count, other.item_count
            ))
        } else if self.fingerprint != other.fingerprint {
            Some("item list differs".to_string())
        } else {
            None
        }
    }

    /// # Errors
    ///
    /// Returns `PersistError::Read` on IO failure and `PersistError::Corrupt`
    /// for invalid JSON.
    pub fn load(dir: &Path) -> Result<Option<Self>, PersistError> {
        let path = dir.join(MANIFEST_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(PersistError::read(&path, source)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| PersistError::Corrupt {
                path,
                detail: e.to_string(),
            })
    }

    /// # Errors
    ///
    /// Returns `PersistError::Write` on any IO failure.
    pub fn save(&self, dir: &Path) -> Result<(), PersistError> {
        let path = dir.join(MANIFEST_FILE);
        write_atomically(&path, |w| {
            serde_json::to_writer_pretty(&mut *w, self)?;
            writeln!(w)
        })
        .map_err(|source| PersistError::write(&path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: u64) -> Vec<Position> {
        (1..=n)
            .map(|i| Position::new("chr1", i).with_alleles("A", "G"))
            .collect()
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::in_dir(dir.path());
        assert_eq!(checkpoint.load().unwrap(), None);
        assert_eq!(checkpoint.next_batch().unwrap(), 0);

        checkpoint.commit(0).unwrap();
        checkpoint.commit(1).unwrap();
        assert_eq!(checkpoint.load().unwrap(), Some(1));
        assert_eq!(checkpoint.next_batch().unwrap(), 2);
        assert_eq!(std::fs::read_to_string(checkpoint.path()).unwrap(), "1\n");
    }

    #[test]
    fn test_corrupt_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CHECKPOINT_FILE), "three").unwrap();
        assert!(matches!(
            Checkpoint::in_dir(dir.path()).load(),
            Err(PersistError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_manifest_roundtrip_and_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = RunManifest::new(&items(10), 3);
        manifest.save(dir.path()).unwrap();
        let loaded = RunManifest::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.mismatch(&RunManifest::new(&items(10), 3)), None);

        assert!(manifest
            .mismatch(&RunManifest::new(&items(10), 4))
            .unwrap()
            .contains("batch size"));
        assert!(manifest.mismatch(&RunManifest::new(&items(9), 3)).is_some());

        let mut reordered = items(10);
        reordered.swap(0, 1);
        assert_eq!(
            manifest.mismatch(&RunManifest::new(&reordered, 3)).as_deref(),
            Some("item list differs")
        );
    }
}
