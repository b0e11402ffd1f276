//! Layered preference store with an optional JSON file behind the user layer.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::{PrefError, PrefResult, PreferenceStore, PREF_BRANCH_DEFAULT_BRIDGE};

/// Preferences with a read-only default layer and a writable user layer.
///
/// Reads consult the user layer first. `clear` only removes user values, so
/// defaults (the builtin bridge table) survive a reset. When opened from a
/// path, every mutation rewrites the file through a temp file + rename.
#[derive(Debug, Default)]
pub struct Preferences {
    defaults: BTreeMap<String, String>,
    user: RwLock<BTreeMap<String, String>>,
    path: Option<PathBuf>,
}

impl Preferences {
    /// Create an empty store that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or create on first write) a JSON-backed store.
    pub fn open(path: impl AsRef<Path>) -> PrefResult<Self> {
        let path = path.as_ref().to_path_buf();
        let user = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| PrefError::Malformed(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(PrefError::Io {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };
        debug!(
            "Loaded {} preference(s) from {}",
            user.len(),
            path.display()
        );

        Ok(Self {
            defaults: BTreeMap::new(),
            user: RwLock::new(user),
            path: Some(path),
        })
    }

    /// Install the builtin bridge table as defaults (`default_bridge.<type>.<n>`).
    pub fn with_builtin_bridges(mut self, table: &HashMap<String, Vec<String>>) -> Self {
        for (bridge_type, lines) in table {
            for (index, line) in lines.iter().enumerate() {
                self.defaults.insert(
                    format!("{}{}.{}", PREF_BRANCH_DEFAULT_BRIDGE, bridge_type, index),
                    line.clone(),
                );
            }
        }
        self
    }

    /// Set a default value directly.
    pub fn with_default(mut self, key: &str, value: &str) -> Self {
        self.defaults.insert(key.to_string(), value.to_string());
        self
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read_user(&self) -> PrefResult<RwLockReadGuard<'_, BTreeMap<String, String>>> {
        self.user
            .read()
            .map_err(|_| PrefError::Unavailable("preference lock poisoned".into()))
    }

    fn write_user(&self) -> PrefResult<RwLockWriteGuard<'_, BTreeMap<String, String>>> {
        self.user
            .write()
            .map_err(|_| PrefError::Unavailable("preference lock poisoned".into()))
    }

    fn persist(&self, user: &BTreeMap<String, String>) -> PrefResult<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let io_err = |source: std::io::Error| PrefError::Io {
            path: path.display().to_string(),
            source,
        };

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(io_err)?;

        let data = serde_json::to_vec_pretty(user)
            .map_err(|e| PrefError::Malformed(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&data).map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl PreferenceStore for Preferences {
    fn get_string(&self, key: &str) -> PrefResult<Option<String>> {
        let user = self.read_user()?;
        Ok(user
            .get(key)
            .or_else(|| self.defaults.get(key))
            .cloned())
    }

    fn set_string(&self, key: &str, value: &str) -> PrefResult<()> {
        let mut user = self.write_user()?;
        user.insert(key.to_string(), value.to_string());
        self.persist(&user)
    }

    fn clear(&self, key: &str) -> PrefResult<()> {
        let mut user = self.write_user()?;
        if user.remove(key).is_some() {
            self.persist(&user)?;
        }
        Ok(())
    }

    fn child_keys(&self, prefix: &str) -> PrefResult<Vec<String>> {
        let user = self.read_user()?;
        let keys: BTreeSet<String> = user
            .keys()
            .chain(self.defaults.keys())
            .filter_map(|k| k.strip_prefix(prefix))
            .map(str::to_string)
            .collect();
        Ok(keys.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_value_shadows_default() {
        let prefs = Preferences::in_memory().with_default("a.b", "default");
        assert_eq!(prefs.get_string("a.b").unwrap().as_deref(), Some("default"));

        prefs.set_string("a.b", "user").unwrap();
        assert_eq!(prefs.get_string("a.b").unwrap().as_deref(), Some("user"));

        prefs.clear("a.b").unwrap();
        assert_eq!(prefs.get_string("a.b").unwrap().as_deref(), Some("default"));
    }

    #[test]
    fn test_clear_missing_key_is_ok() {
        let prefs = Preferences::in_memory();
        assert!(prefs.clear("nope").is_ok());
        assert_eq!(prefs.get_string("nope").unwrap(), None);
    }

    #[test]
    fn test_child_keys_merges_layers() {
        let mut table = HashMap::new();
        table.insert("obfs4".to_string(), vec!["x".to_string(), "y".to_string()]);
        let prefs = Preferences::in_memory().with_builtin_bridges(&table);
        prefs
            .set_string(&format!("{}snowflake.0", PREF_BRANCH_DEFAULT_BRIDGE), "z")
            .unwrap();

        let keys = prefs.child_keys(PREF_BRANCH_DEFAULT_BRIDGE).unwrap();
        assert_eq!(keys, vec!["obfs4.0", "obfs4.1", "snowflake.0"]);
    }

    #[test]
    fn test_file_store_persists_user_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");

        let prefs = Preferences::open(&path).unwrap();
        prefs.set_string("k", "v").unwrap();
        assert!(path.exists());

        let reopened = Preferences::open(&path).unwrap();
        assert_eq!(reopened.get_string("k").unwrap().as_deref(), Some("v"));

        reopened.clear("k").unwrap();
        let again = Preferences::open(&path).unwrap();
        assert_eq!(again.get_string("k").unwrap(), None);
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "not json").unwrap();

        let err = Preferences::open(&path).unwrap_err();
        assert!(matches!(err, PrefError::Malformed(_)));
    }
}
