//! Durable key -> JSON document storage.
//!
//! Each logical database is one JSON file `<root>/<name>.json` holding a
//! top-level object. Every write rewrites the whole file through a temp file
//! and a rename, so a crash mid-write leaves the previous version intact.

mod swaps;

pub use swaps::{RegistryEntry, SwapsRegistry, DEFAULT_ACCOUNT_INDEX, SWAPS_DB};

use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

type Document = Map<String, Value>;

/// File-backed JSON documents with an in-memory cache per database name.
///
/// The cache lock is held across the read-modify-write of a document and the
/// file rewrite, so concurrent writers never lose each other's updates.
pub struct RawJsonDb {
    root: PathBuf,
    cache: Mutex<HashMap<String, Document>>,
}

impl RawJsonDb {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            Error::Registry(format!(
                "Failed to create registry directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self {
            root,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, db: &str) -> Result<PathBuf> {
        validate_db_name(db)?;
        Ok(self.root.join(format!("{}.json", db)))
    }

    pub fn get(&self, db: &str, key: &str) -> Result<Option<Value>> {
        let mut cache = self.cache.lock();
        let doc = self.loaded(&mut cache, db)?;
        Ok(doc.get(key).cloned())
    }

    pub fn keys(&self, db: &str) -> Result<Vec<String>> {
        let mut cache = self.cache.lock();
        let doc = self.loaded(&mut cache, db)?;
        Ok(doc.keys().cloned().collect())
    }

    /// Replace the value under `key` with whatever `f` returns, then persist.
    pub fn update<F>(&self, db: &str, key: &str, f: F) -> Result<Value>
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let mut cache = self.cache.lock();
        let path = self.path_for(db)?;
        let doc = self.loaded(&mut cache, db)?;

        let next = f(doc.get(key));
        let mut updated = doc.clone();
        updated.insert(key.to_string(), next.clone());
        write_document(&path, &updated)?;

        cache.insert(db.to_string(), updated);
        Ok(next)
    }

    pub fn remove(&self, db: &str, key: &str) -> Result<bool> {
        let mut cache = self.cache.lock();
        let path = self.path_for(db)?;
        let doc = self.loaded(&mut cache, db)?;
        if !doc.contains_key(key) {
            return Ok(false);
        }

        let mut updated = doc.clone();
        updated.remove(key);
        write_document(&path, &updated)?;

        cache.insert(db.to_string(), updated);
        Ok(true)
    }

    /// Drop cached documents so the next access re-reads the files.
    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }

    fn loaded<'a>(
        &self,
        cache: &'a mut HashMap<String, Document>,
        db: &str,
    ) -> Result<&'a Document> {
        if !cache.contains_key(db) {
            let doc = read_document(&self.path_for(db)?)?;
            cache.insert(db.to_string(), doc);
        }
        cache
            .get(db)
            .ok_or_else(|| Error::Registry(format!("Database '{}' vanished from cache", db)))
    }
}

fn validate_db_name(db: &str) -> Result<()> {
    if db.is_empty()
        || db.starts_with('.')
        || !db
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::Registry(format!("Invalid database name '{}'", db)));
    }
    Ok(())
}

fn read_document(path: &Path) -> Result<Document> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => {
            return Err(Error::Registry(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };
    if contents.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(Error::Registry(format!(
            "{} does not hold a JSON object",
            path.display()
        ))),
        Err(e) => Err(Error::Registry(format!(
            "Failed to parse {}: {}",
            path.display(),
            e
        ))),
    }
}

fn write_document(path: &Path, doc: &Document) -> Result<()> {
    let contents = serde_json::to_string_pretty(doc)
        .map_err(|e| Error::Registry(format!("Failed to serialize registry: {}", e)))?;
    atomic_write(path, &contents)
}

/// Atomic file write using write-then-rename.
pub(crate) fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    use std::io::Write;

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)
        .map_err(|e| Error::Registry(format!("Failed to create temp file: {}", e)))?;

    file.write_all(contents.as_bytes())
        .map_err(|e| Error::Registry(format!("Failed to write temp file: {}", e)))?;

    file.sync_all()
        .map_err(|e| Error::Registry(format!("Failed to sync temp file: {}", e)))?;
    drop(file);

    fs::rename(&temp_path, path)
        .map_err(|e| Error::Registry(format!("Failed to rename temp file: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_persists_full_document() {
        let dir = tempfile::tempdir().unwrap();
        let db = RawJsonDb::open(dir.path()).unwrap();

        db.update("swaps", "swap_a", |_| json!({"swaps_account": 1}))
            .unwrap();
        db.update("swaps", "swap_b", |_| json!({"swaps_account": 2}))
            .unwrap();

        let on_disk: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("swaps.json")).unwrap())
                .unwrap();
        assert_eq!(on_disk["swap_a"]["swaps_account"], 1);
        assert_eq!(on_disk["swap_b"]["swaps_account"], 2);
        assert!(!dir.path().join("swaps.tmp").exists());
    }

    #[test]
    fn test_reopen_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = RawJsonDb::open(dir.path()).unwrap();
            db.update("swaps", "swap_a", |_| json!({"x": true})).unwrap();
        }
        let db = RawJsonDb::open(dir.path()).unwrap();
        assert_eq!(db.get("swaps", "swap_a").unwrap(), Some(json!({"x": true})));
        assert_eq!(db.get("swaps", "swap_missing").unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_an_error_not_a_reset() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("swaps.json"), "{not json").unwrap();
        let db = RawJsonDb::open(dir.path()).unwrap();
        assert!(db.get("swaps", "swap_a").is_err());
        assert!(db.update("swaps", "swap_a", |_| json!(1)).is_err());
        assert_eq!(
            fs::read_to_string(dir.path().join("swaps.json")).unwrap(),
            "{not json"
        );
    }

    #[test]
    fn test_db_names_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let db = RawJsonDb::open(dir.path()).unwrap();
        assert!(db.get("../etc", "k").is_err());
        assert!(db.get(".hidden", "k").is_err());
        assert!(db.get("", "k").is_err());
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let db = RawJsonDb::open(dir.path()).unwrap();
        db.update("swaps", "swap_a", |_| json!(1)).unwrap();
        assert!(db.remove("swaps", "swap_a").unwrap());
        assert!(!db.remove("swaps", "swap_a").unwrap());
        assert!(db.keys("swaps").unwrap().is_empty());
    }
}
