use super::ProcessRole;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted process-id table, one entry per [`ProcessRole`].
///
/// A recorded pid outlives the orchestrator so that the next run can kill a
/// process left behind by a crash before starting a replacement.
///
/// # Implementations
///
/// - [`PropertiesPidStore`] - `key=value` file, rewritten atomically
/// - [`MemoryPidStore`] - in-process table for tests
pub trait PidStore: Send + Sync {
    fn load(&self, role: ProcessRole) -> Result<Option<u32>>;

    fn store(&self, role: ProcessRole, pid: u32) -> Result<()>;

    fn clear(&self, role: ProcessRole) -> Result<()>;

    /// Clear the entry only if it still holds `pid`. Returns true if cleared.
    fn clear_if(&self, role: ProcessRole, pid: u32) -> Result<bool> {
        if self.load(role)? == Some(pid) {
            self.clear(role)?;
            return Ok(true);
        }
        Ok(false)
    }
}

/// Pid table stored as a Java-style properties file (`asb_pid=4242`).
///
/// Unknown keys in the file are preserved. All writes go through one lock,
/// which serializes updates to the same role.
pub struct PropertiesPidStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PropertiesPidStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, String>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(Error::Process(format!(
                    "Failed to read pid table {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        Ok(parse_properties(&contents))
    }

    fn write(&self, props: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut contents = String::new();
        for (key, value) in props {
            contents.push_str(key);
            contents.push('=');
            contents.push_str(value);
            contents.push('\n');
        }
        crate::registry::atomic_write(&self.path, &contents)
    }
}

fn parse_properties(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=').or_else(|| line.split_once(':'))?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

impl PidStore for PropertiesPidStore {
    fn load(&self, role: ProcessRole) -> Result<Option<u32>> {
        let _guard = self.lock.lock();
        let props = self.read()?;
        match props.get(role.pid_key()) {
            None => Ok(None),
            Some(raw) if raw.is_empty() => Ok(None),
            Some(raw) => match raw.parse::<u32>() {
                Ok(pid) => Ok(Some(pid)),
                Err(_) => {
                    tracing::warn!(
                        "Ignoring unparseable {} '{}' in {}",
                        role.pid_key(),
                        raw,
                        self.path.display()
                    );
                    Ok(None)
                }
            },
        }
    }

    fn store(&self, role: ProcessRole, pid: u32) -> Result<()> {
        let _guard = self.lock.lock();
        let mut props = self.read()?;
        props.insert(role.pid_key().to_string(), pid.to_string());
        self.write(&props)
    }

    fn clear(&self, role: ProcessRole) -> Result<()> {
        let _guard = self.lock.lock();
        let mut props = self.read()?;
        if props.remove(role.pid_key()).is_some() {
            self.write(&props)?;
        }
        Ok(())
    }

    fn clear_if(&self, role: ProcessRole, pid: u32) -> Result<bool> {
        let _guard = self.lock.lock();
        let mut props = self.read()?;
        if props.get(role.pid_key()).map(String::as_str) != Some(pid.to_string().as_str()) {
            return Ok(false);
        }
        props.remove(role.pid_key());
        self.write(&props)?;
        Ok(true)
    }
}

/// In-memory pid table. Nothing survives the process.
#[derive(Default)]
pub struct MemoryPidStore {
    pids: Mutex<HashMap<ProcessRole, u32>>,
}

impl MemoryPidStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PidStore for MemoryPidStore {
    fn load(&self, role: ProcessRole) -> Result<Option<u32>> {
        Ok(self.pids.lock().get(&role).copied())
    }

    fn store(&self, role: ProcessRole, pid: u32) -> Result<()> {
        self.pids.lock().insert(role, pid);
        Ok(())
    }

    fn clear(&self, role: ProcessRole) -> Result<()> {
        self.pids.lock().remove(&role);
        Ok(())
    }

    fn clear_if(&self, role: ProcessRole, pid: u32) -> Result<bool> {
        let mut pids = self.pids.lock();
        if pids.get(&role) == Some(&pid) {
            pids.remove(&role);
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atomic-swaps.properties");
        let store = PropertiesPidStore::new(&path);

        assert_eq!(store.load(ProcessRole::MakerEngine).unwrap(), None);
        store.store(ProcessRole::MakerEngine, 4242).unwrap();
        store.store(ProcessRole::PriceFeed, 77).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("asb_pid=4242"));
        assert!(raw.contains("price_ticker_pid=77"));

        let reopened = PropertiesPidStore::new(&path);
        assert_eq!(reopened.load(ProcessRole::MakerEngine).unwrap(), Some(4242));

        reopened.clear(ProcessRole::MakerEngine).unwrap();
        assert_eq!(reopened.load(ProcessRole::MakerEngine).unwrap(), None);
        assert_eq!(reopened.load(ProcessRole::PriceFeed).unwrap(), Some(77));
    }

    #[test]
    fn test_properties_store_keeps_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atomic-swaps.properties");
        fs::write(&path, "# written by hand\nlast_tab=swaps\nrpc_asb_pid = 900\n").unwrap();

        let store = PropertiesPidStore::new(&path);
        assert_eq!(store.load(ProcessRole::MakerWalletRpc).unwrap(), Some(900));
        store.store(ProcessRole::BuyerWalletRpc, 901).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("last_tab=swaps"));
        assert!(raw.contains("rpc_swapclient_pid=901"));
    }

    #[test]
    fn test_clear_if_only_matching_pid() {
        let store = MemoryPidStore::new();
        store.store(ProcessRole::BuyerWalletRpc, 10).unwrap();
        assert!(!store.clear_if(ProcessRole::BuyerWalletRpc, 11).unwrap());
        assert!(store.clear_if(ProcessRole::BuyerWalletRpc, 10).unwrap());
        assert_eq!(store.load(ProcessRole::BuyerWalletRpc).unwrap(), None);
    }
}
