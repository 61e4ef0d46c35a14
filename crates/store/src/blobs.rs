//! Raw ciphertext storage backends.

use crate::errors::*;
use filechain_types::ContentId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Where sealed blobs live, keyed by content id.
pub trait BlobBackend: Send + Sync {
    fn put(&self, cid: &ContentId, sealed: Vec<u8>) -> Result<()>;

    fn get(&self, cid: &ContentId) -> Result<Option<Vec<u8>>>;

    fn remove(&self, cid: &ContentId) -> Result<()>;

    fn contains(&self, cid: &ContentId) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct MemoryBlobs {
    blobs: RwLock<HashMap<ContentId, Vec<u8>>>,
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobBackend for MemoryBlobs {
    fn put(&self, cid: &ContentId, sealed: Vec<u8>) -> Result<()> {
        self.blobs.write().insert(cid.clone(), sealed);
        Ok(())
    }

    fn get(&self, cid: &ContentId) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(cid).cloned())
    }

    fn remove(&self, cid: &ContentId) -> Result<()> {
        self.blobs.write().remove(cid);
        Ok(())
    }

    fn contains(&self, cid: &ContentId) -> Result<bool> {
        Ok(self.blobs.read().contains_key(cid))
    }
}

/// One file per blob under `<root>/objects/`.
#[derive(Debug, Clone)]
pub struct DiskBlobs {
    objects_dir: PathBuf,
}

impl DiskBlobs {
    pub fn open(root: &Path) -> Result<Self> {
        let objects_dir = root.join("objects");
        fs::create_dir_all(&objects_dir)?;
        Ok(Self { objects_dir })
    }

    fn path_for(&self, cid: &ContentId) -> PathBuf {
        // content ids are opaque; hex keeps arbitrary ids filesystem safe
        self.objects_dir
            .join(format!("{}.bin", hex::encode(cid.as_str().as_bytes())))
    }
}

impl BlobBackend for DiskBlobs {
    fn put(&self, cid: &ContentId, sealed: Vec<u8>) -> Result<()> {
        let path = self.path_for(cid);
        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, sealed)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn get(&self, cid: &ContentId) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(cid);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    fn remove(&self, cid: &ContentId) -> Result<()> {
        let path = self.path_for(cid);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn contains(&self, cid: &ContentId) -> Result<bool> {
        Ok(self.path_for(cid).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exercise(backend: &dyn BlobBackend) {
        let cid = ContentId::for_content(b"x");
        assert!(!backend.contains(&cid).unwrap());
        backend.put(&cid, vec![1, 2, 3]).unwrap();
        assert_eq!(backend.get(&cid).unwrap(), Some(vec![1, 2, 3]));
        backend.remove(&cid).unwrap();
        assert_eq!(backend.get(&cid).unwrap(), None);
        backend.remove(&cid).unwrap();
    }

    #[test]
    fn memory_backend() {
        exercise(&MemoryBlobs::new());
    }

    #[test]
    fn disk_backend() {
        let dir = tempdir().unwrap();
        exercise(&DiskBlobs::open(dir.path()).unwrap());
    }
}
