//! Key/value persistence for recorded responses.
//!
//! # Responsibilities
//! - Existence check, read, write, delete and ordered key listing
//! - Paging over keys and decoded entries for administration
//!
//! # Design Decisions
//! - Stores deal in opaque blobs; `CacheEntry` owns the format
//! - Filesystem writes go through a temp file and a rename, so a reader
//!   never sees a partially written entry
//! - Keys are restricted to `[A-Za-z0-9_-]` so they cannot escape the root

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::cache::entry::CacheEntry;
use crate::cache::CacheError;

/// Subdirectory of the cache root holding entry files.
pub const ENTRY_DIR: &str = "cache";

/// Persistence contract used by the request engine.
pub trait CacheStore: Send + Sync {
    fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Stored blob for `key`; `CacheError::NotFound` when absent.
    fn get(&self, key: &str) -> Result<Vec<u8>, CacheError>;

    /// Write the whole blob, replacing any previous value.
    fn put(&self, key: &str, blob: &[u8]) -> Result<(), CacheError>;

    /// Remove `key`. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// All keys in lexicographic order.
    fn list_keys(&self) -> Result<Vec<String>, CacheError>;

    fn count(&self) -> Result<usize, CacheError> {
        Ok(self.list_keys()?.len())
    }

    /// Keys on 1-based `page` of `per_page` keys each.
    fn page_of_keys(&self, page: usize, per_page: usize) -> Result<Vec<String>, CacheError> {
        if page == 0 || per_page == 0 {
            return Ok(Vec::new());
        }
        let start = (page - 1).saturating_mul(per_page);
        Ok(self
            .list_keys()?
            .into_iter()
            .skip(start)
            .take(per_page)
            .collect())
    }

    /// Decoded entries for the keys on `page`.
    fn page_of_entries(&self, page: usize, per_page: usize) -> Result<Vec<CacheEntry>, CacheError> {
        self.page_of_keys(page, per_page)?
            .iter()
            .map(|key| CacheEntry::decode(&self.get(key)?))
            .collect()
    }
}

/// Reject keys that could address anything outside the entry directory.
pub fn validate_key(key: &str) -> Result<(), CacheError> {
    let ok = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if ok {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}

/// One file per entry under `<root>/cache/`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = root.as_ref().join(ENTRY_DIR);
        fs::create_dir_all(&dir)?;
        tracing::debug!(path = %dir.display(), "File cache opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        validate_key(key)?;
        Ok(self.dir.join(key))
    }
}

impl CacheStore for FileStore {
    fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.path_for(key)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(blob) => Ok(blob),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CacheError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, blob: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        let tmp = self.dir.join(format!(".{}.{}.tmp", key, uuid::Uuid::new_v4().simple()));

        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(blob)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|_| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_keys(&self) -> Result<Vec<String>, CacheError> {
        let mut keys = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = dir_entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_key(&name).is_ok() {
                keys.push(name);
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }
}

/// Process-local store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.inner.contains_key(key))
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        self.inner
            .get(key)
            .map(|r| r.value().clone())
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    fn put(&self, key: &str, blob: &[u8]) -> Result<(), CacheError> {
        validate_key(key)?;
        self.inner.insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.remove(key);
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>, CacheError> {
        let mut keys: Vec<String> = self.inner.iter().map(|r| r.key().clone()).collect();
        keys.sort_unstable();
        Ok(keys)
    }

    fn count(&self) -> Result<usize, CacheError> {
        Ok(self.inner.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("replay-proxy-store-{}", uuid::Uuid::new_v4()))
    }

    fn exercise_contract(store: &dyn CacheStore) {
        assert!(!store.exists("k1").unwrap());
        assert!(matches!(store.get("k1"), Err(CacheError::NotFound(_))));

        store.put("k1", b"one").unwrap();
        assert!(store.exists("k1").unwrap());
        assert_eq!(store.get("k1").unwrap(), b"one");

        store.put("k1", b"uno").unwrap();
        assert_eq!(store.get("k1").unwrap(), b"uno");

        store.put("k0", b"zero").unwrap();
        assert_eq!(store.list_keys().unwrap(), vec!["k0", "k1"]);
        assert_eq!(store.count().unwrap(), 2);

        store.delete("k1").unwrap();
        store.delete("k1").unwrap();
        assert!(!store.exists("k1").unwrap());
        assert_eq!(store.list_keys().unwrap(), vec!["k0"]);
    }

    #[test]
    fn file_store_contract() {
        let root = temp_root();
        let store = FileStore::open(&root).unwrap();
        exercise_contract(&store);
        assert!(root.join(ENTRY_DIR).join("k0").is_file());
        fs::remove_dir_all(&root).unwrap_or_default();
    }

    #[test]
    fn memory_store_contract() {
        exercise_contract(&MemoryStore::new());
    }

    #[test]
    fn rejects_path_traversal_keys() {
        let root = temp_root();
        let store = FileStore::open(&root).unwrap();
        assert!(matches!(store.put("../escape", b"x"), Err(CacheError::InvalidKey(_))));
        assert!(matches!(store.get("a/b"), Err(CacheError::InvalidKey(_))));
        assert!(matches!(store.exists(""), Err(CacheError::InvalidKey(_))));
        fs::remove_dir_all(&root).unwrap_or_default();
    }

    #[test]
    fn listing_skips_temp_files() {
        let root = temp_root();
        let store = FileStore::open(&root).unwrap();
        store.put("abc", b"x").unwrap();
        fs::write(store.dir().join(".abc.123.tmp"), b"partial").unwrap();
        assert_eq!(store.list_keys().unwrap(), vec!["abc"]);
        fs::remove_dir_all(&root).unwrap_or_default();
    }

    #[test]
    fn pagination() {
        let store = MemoryStore::new();
        for k in 1..=7 {
            store.put(&k.to_string(), b"x").unwrap();
        }
        assert_eq!(store.page_of_keys(1, 3).unwrap(), vec!["1", "2", "3"]);
        assert_eq!(store.page_of_keys(2, 3).unwrap(), vec!["4", "5", "6"]);
        assert_eq!(store.page_of_keys(3, 3).unwrap(), vec!["7"]);
        assert!(store.page_of_keys(4, 3).unwrap().is_empty());
        assert!(store.page_of_keys(0, 3).unwrap().is_empty());
        assert_eq!(store.page_of_keys(1, 10).unwrap().len(), 7);
    }

    #[test]
    fn page_of_entries_decodes() {
        let store = MemoryStore::new();
        for key in ["a", "b", "c"] {
            let entry = CacheEntry::new(format!("http://x/{}", key), "GET", key, b"HTTP/1.1 200 OK\r\n\r\n".to_vec());
            store.put(key, &entry.encode().unwrap()).unwrap();
        }
        let entries = store.page_of_entries(1, 2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "http://x/a");
        assert_eq!(entries[1].key, "b");
    }
}
