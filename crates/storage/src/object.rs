//! Object-store chunk storage
//!
//! A filesystem-backed object store: each chunk is one object under a
//! pre-provisioned bucket directory, addressed by the key
//!
//! ```text
//! tmp/builds/<owner>/chunks/<index>.log
//! ```
//!
//! Owner ids are opaque, so the `<owner>` segment is their lowercase hex
//! encoding. It is safe on any filesystem, including case-insensitive ones.
//!
//! Objects are immutable from a reader's point of view. Every write lands in
//! a temporary file next to the object and is renamed into place, so a reader
//! observes either the old or the new payload, never a torn one.
//!
//! The store never creates the bucket. If the bucket directory is missing the
//! backend reports itself unavailable and persist falls back to another
//! durable medium.

use crate::payload;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracestore_core::{BackendKind, ChunkKey, ChunkStore, Error, OwnerId, Result};
use tracing::{debug, warn};
use uuid::Uuid;

const OBJECT_EXT: &str = "log";

fn storage_err(err: io::Error) -> Error {
    Error::storage(BackendKind::Object, err)
}

/// Path segment for an owner: lowercase hex of its UTF-8 bytes
fn owner_segment(owner: &OwnerId) -> String {
    let bytes = owner.as_str().as_bytes();
    let mut segment = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(segment, "{:02x}", byte);
    }
    segment
}

/// Filesystem-backed object store
#[derive(Debug, Clone)]
pub struct ObjectStore {
    bucket: PathBuf,
}

impl ObjectStore {
    /// Address `bucket` under `root`
    ///
    /// Nothing is created on disk; the bucket is expected to exist already.
    pub fn new(root: impl AsRef<Path>, bucket: &str) -> Self {
        Self {
            bucket: root.as_ref().join(bucket),
        }
    }

    /// Path of the bucket directory
    pub fn bucket_path(&self) -> &Path {
        &self.bucket
    }

    /// Object key of a chunk, relative to the bucket
    pub fn object_key(key: &ChunkKey) -> String {
        format!(
            "tmp/builds/{}/chunks/{}.{}",
            owner_segment(&key.owner),
            key.index,
            OBJECT_EXT
        )
    }

    fn owner_dir(&self, owner: &OwnerId) -> PathBuf {
        self.bucket
            .join("tmp")
            .join("builds")
            .join(owner_segment(owner))
            .join("chunks")
    }

    fn object_path(&self, key: &ChunkKey) -> PathBuf {
        self.bucket.join(Self::object_key(key))
    }

    fn ensure_bucket(&self) -> Result<()> {
        if self.bucket.is_dir() {
            Ok(())
        } else {
            Err(Error::BackendUnavailable(format!(
                "bucket {} does not exist",
                self.bucket.display()
            )))
        }
    }

    /// PUT: write to a temporary sibling, then rename over the object
    fn put(&self, key: &ChunkKey, data: &[u8]) -> Result<()> {
        self.ensure_bucket()?;
        let path = self.object_path(key);
        let dir = self.owner_dir(&key.owner);
        fs::create_dir_all(&dir).map_err(storage_err)?;

        let tmp = dir.join(format!("{}.{}.tmp", key.index, Uuid::new_v4()));
        let result = (|| {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(data)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        })();

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp);
            return Err(storage_err(err));
        }
        Ok(())
    }

    /// GET: `None` for an absent object
    fn get(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>> {
        self.ensure_bucket()?;
        match fs::read(self.object_path(key)) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(storage_err(err)),
        }
    }

    /// Remove leftover temporary files, then the owner's directories once
    /// they hold no objects
    fn prune_owner(&self, owner: &OwnerId) {
        let chunks = self.owner_dir(owner);
        if let Ok(entries) = fs::read_dir(&chunks) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().map_or(false, |ext| ext == "tmp") {
                    if let Err(err) = fs::remove_file(&path) {
                        debug!(
                            owner = %owner,
                            file = %path.display(),
                            error = %err,
                            "failed to remove temporary file"
                        );
                    }
                }
            }
        }

        for dir in [Some(chunks.as_path()), chunks.parent()].into_iter().flatten() {
            match fs::remove_dir(dir) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    debug!(
                        owner = %owner,
                        dir = %dir.display(),
                        error = %err,
                        "owner directory not pruned"
                    );
                    return;
                }
            }
        }
    }
}

impl ChunkStore for ObjectStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Object
    }

    fn available(&self) -> bool {
        self.bucket.is_dir()
    }

    fn read(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>> {
        self.get(key)
    }

    fn write(&self, key: &ChunkKey, data: &[u8]) -> Result<()> {
        payload::check_capacity(data.len())?;
        self.put(key, data)
    }

    fn append_at(&self, key: &ChunkKey, data: &[u8], offset: usize) -> Result<usize> {
        let mut current = self.get(key)?.unwrap_or_default();
        let new_size = payload::splice(&mut current, data, offset)?;
        self.put(key, &current)?;
        Ok(new_size)
    }

    fn size(&self, key: &ChunkKey) -> Result<Option<usize>> {
        self.ensure_bucket()?;
        match fs::metadata(self.object_path(key)) {
            Ok(meta) => Ok(Some(meta.len() as usize)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(storage_err(err)),
        }
    }

    fn delete(&self, key: &ChunkKey) -> Result<()> {
        match fs::remove_file(self.object_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_err(err)),
        }
    }

    fn list_keys(&self, owner: &OwnerId) -> Result<BTreeSet<ChunkKey>> {
        let entries = match fs::read_dir(self.owner_dir(owner)) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(err) => return Err(storage_err(err)),
        };

        let mut keys = BTreeSet::new();
        for entry in entries {
            let name = entry.map_err(storage_err)?.file_name();
            let name = name.to_string_lossy();
            // Leftover temporary files do not parse and are skipped
            let index = name
                .strip_suffix(".log")
                .and_then(|stem| stem.parse::<u64>().ok());
            match index {
                Some(index) => {
                    keys.insert(ChunkKey::new(owner.clone(), index));
                }
                None => debug!(owner = %owner, file = %name, "skipping non-object file"),
            }
        }
        Ok(keys)
    }

    fn delete_keys(&self, keys: &[ChunkKey]) -> Result<()> {
        let mut owners = BTreeSet::new();
        let mut first_err = None;
        for key in keys {
            match self.delete(key) {
                Ok(()) => {
                    owners.insert(&key.owner);
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "failed to delete object");
                    first_err.get_or_insert(err);
                }
            }
        }
        for owner in owners {
            self.prune_owner(owner);
        }
        first_err.map_or(Ok(()), Err)
    }
}
