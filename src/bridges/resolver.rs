//! Bridge source inference and write-back.
//!
//! Nothing records which source is active. It is reconstructed from three
//! stores, in this order:
//!
//! 1. A non-empty `default_bridge_type` preference means builtin bridges.
//! 2. No `Bridge` lines in the daemon means no bridges.
//! 3. Daemon lines identical (same length, same order, same bytes) to the
//!    cached BridgeDB list mean the bridges came from BridgeDB.
//! 4. Anything else was typed in by the user.
//!
//! Step 3 is order-sensitive: if tor ever hands back the BridgeDB lines in
//! another order they are reported as user-provided. That is the behavior
//! older clients rely on when reading configurations they wrote.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use super::parse::{compare_index_keys, split_indexed_key};
use super::{BridgeConfiguration, BridgeSource};
use crate::control::{keys, ConfSetting, TorDaemon};
use crate::error::{BridgeError, BridgeResult};
use crate::prefs::{
    PreferenceStore, PREF_BRANCH_BRIDGEDB_BRIDGE, PREF_BRANCH_DEFAULT_BRIDGE,
    PREF_DEFAULT_BRIDGE_TYPE,
};

/// Reads and writes the bridge configuration across the preference store
/// and the tor daemon.
///
/// The builtin type list is computed on the first [`builtin_types`] call and
/// kept for the lifetime of the resolver, which is expected to live as long
/// as the process; the builtin table does not change while running.
///
/// Writes are not coordinated: callers must not run two
/// [`write_settings`] concurrently.
///
/// [`builtin_types`]: Self::builtin_types
/// [`write_settings`]: Self::write_settings
pub struct BridgeConfigResolver {
    prefs: Arc<dyn PreferenceStore>,
    daemon: Arc<dyn TorDaemon>,
    builtin_types: OnceLock<Vec<String>>,
}

impl BridgeConfigResolver {
    pub fn new(prefs: Arc<dyn PreferenceStore>, daemon: Arc<dyn TorDaemon>) -> Self {
        Self {
            prefs,
            daemon,
            builtin_types: OnceLock::new(),
        }
    }

    /// Distinct builtin bridge types, sorted.
    pub fn builtin_types(&self) -> BridgeResult<&[String]> {
        if let Some(types) = self.builtin_types.get() {
            return Ok(types.as_slice());
        }

        let keys = self
            .prefs
            .child_keys(PREF_BRANCH_DEFAULT_BRIDGE)
            .map_err(BridgeError::read)?;
        let mut types: Vec<String> = keys
            .iter()
            .filter_map(|key| split_indexed_key(key))
            .map(|(bridge_type, _)| bridge_type.to_string())
            .collect();
        types.sort();
        types.dedup();
        debug!("Found {} builtin bridge type(s)", types.len());

        Ok(self.builtin_types.get_or_init(|| types).as_slice())
    }

    /// Builtin bridge lines for `bridge_type`, in table order. Empty if unknown.
    pub fn builtin_bridges(&self, bridge_type: &str) -> BridgeResult<Vec<String>> {
        let keys = self
            .prefs
            .child_keys(PREF_BRANCH_DEFAULT_BRIDGE)
            .map_err(BridgeError::read)?;
        let mut indexed: Vec<(u64, &String)> = keys
            .iter()
            .filter_map(|key| match split_indexed_key(key) {
                Some((prefix, index)) if prefix == bridge_type => Some((index, key)),
                _ => None,
            })
            .collect();
        indexed.sort();

        let mut lines = Vec::with_capacity(indexed.len());
        for (_, key) in indexed {
            let full_key = format!("{}{}", PREF_BRANCH_DEFAULT_BRIDGE, key);
            if let Some(line) = self.prefs.get_string(&full_key).map_err(BridgeError::read)? {
                lines.push(line);
            }
        }
        Ok(lines)
    }

    /// A builtin configuration for `bridge_type`, lines read from the table.
    pub fn builtin(&self, bridge_type: &str) -> BridgeResult<BridgeConfiguration> {
        Ok(BridgeConfiguration::builtin(
            bridge_type,
            self.builtin_bridges(bridge_type)?,
        ))
    }

    /// Like [`builtin`](Self::builtin), but rejects types missing from the
    /// builtin table.
    pub fn select_builtin(&self, bridge_type: &str) -> BridgeResult<BridgeConfiguration> {
        let types = self.builtin_types()?;
        if !types.iter().any(|t| t == bridge_type) {
            return Err(BridgeError::InvalidInput(format!(
                "unknown bridge type '{}'; known types: {}",
                bridge_type,
                types.join(", ")
            )));
        }
        self.builtin(bridge_type)
    }

    /// Selected builtin type, if one is set.
    pub fn selected_builtin_type(&self) -> BridgeResult<Option<String>> {
        Ok(self
            .prefs
            .get_string(PREF_DEFAULT_BRIDGE_TYPE)
            .map_err(BridgeError::read)?
            .filter(|t| !t.is_empty()))
    }

    /// Bridge lines the daemon is configured with.
    pub async fn daemon_bridges(&self) -> BridgeResult<Vec<String>> {
        let values = self
            .daemon
            .get_conf(keys::BRIDGE)
            .await
            .map_err(BridgeError::read)?;
        Ok(values
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Bridges cached from the last BridgeDB request, in index order.
    pub fn distribution_cache(&self) -> BridgeResult<Vec<String>> {
        let mut keys = self
            .prefs
            .child_keys(PREF_BRANCH_BRIDGEDB_BRIDGE)
            .map_err(BridgeError::read)?;
        keys.sort_by(|a, b| compare_index_keys(a, b));

        let mut lines = Vec::with_capacity(keys.len());
        for key in keys {
            let full_key = format!("{}{}", PREF_BRANCH_BRIDGEDB_BRIDGE, key);
            if let Some(line) = self.prefs.get_string(&full_key).map_err(BridgeError::read)? {
                lines.push(line.trim().to_string());
            }
        }
        Ok(lines)
    }

    /// Infer the current configuration.
    pub async fn read_settings(&self) -> BridgeResult<BridgeConfiguration> {
        if let Some(bridge_type) = self.selected_builtin_type()? {
            debug!("Builtin bridge type selected: {}", bridge_type);
            return self.builtin(&bridge_type);
        }

        let daemon_lines = self.daemon_bridges().await?;
        if daemon_lines.is_empty() {
            return Ok(BridgeConfiguration::none());
        }

        let cached = self.distribution_cache()?;
        let config = if daemon_lines == cached {
            BridgeConfiguration::from_distribution_service(daemon_lines)
        } else {
            BridgeConfiguration::user_provided(daemon_lines)
        };
        debug!(
            "Inferred bridge source {} ({} line(s))",
            config.source(),
            config.bridge_lines().len()
        );
        Ok(config)
    }

    /// Apply `config` to the preference store and the daemon.
    ///
    /// Preferences are reset and rewritten first, then the daemon is updated
    /// with a single SETCONF. A failure part way leaves the earlier steps
    /// applied; there is no rollback.
    pub async fn write_settings(&self, config: &BridgeConfiguration) -> BridgeResult<()> {
        self.reset_bridge_prefs()?;

        let daemon_settings = match config.source() {
            BridgeSource::None => vec![
                ConfSetting::reset(keys::USE_BRIDGES),
                ConfSetting::reset(keys::BRIDGE),
            ],
            BridgeSource::Builtin => {
                let bridge_type = config.builtin_type().ok_or_else(|| {
                    BridgeError::ConfigWrite("builtin configuration without a type".into())
                })?;
                self.prefs
                    .set_string(PREF_DEFAULT_BRIDGE_TYPE, bridge_type)
                    .map_err(BridgeError::write)?;
                use_bridges(config.bridge_lines())
            }
            BridgeSource::FromDistributionService => {
                for (index, line) in config.bridge_lines().iter().enumerate() {
                    self.prefs
                        .set_string(&format!("{}{}", PREF_BRANCH_BRIDGEDB_BRIDGE, index), line)
                        .map_err(BridgeError::write)?;
                }
                use_bridges(config.bridge_lines())
            }
            BridgeSource::UserProvided => use_bridges(config.bridge_lines()),
        };

        self.daemon
            .set_conf(&daemon_settings)
            .await
            .map_err(BridgeError::write)?;

        info!(
            "Bridge settings written: source={} ({} line(s))",
            config.source(),
            config.bridge_lines().len()
        );
        Ok(())
    }

    /// Clear the selected builtin type and the whole BridgeDB cache.
    fn reset_bridge_prefs(&self) -> BridgeResult<()> {
        self.prefs
            .clear(PREF_DEFAULT_BRIDGE_TYPE)
            .map_err(BridgeError::write)?;
        let cached = self
            .prefs
            .child_keys(PREF_BRANCH_BRIDGEDB_BRIDGE)
            .map_err(BridgeError::write)?;
        for key in cached {
            self.prefs
                .clear(&format!("{}{}", PREF_BRANCH_BRIDGEDB_BRIDGE, key))
                .map_err(BridgeError::write)?;
        }
        Ok(())
    }
}

fn use_bridges(lines: &[String]) -> Vec<ConfSetting> {
    vec![
        ConfSetting::value(keys::USE_BRIDGES, "1"),
        ConfSetting::values(keys::BRIDGE, lines),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::control::InMemoryTorDaemon;
    use crate::prefs::{PrefError, PrefResult, Preferences};

    const A: &str = "obfs4 192.0.2.10:443 AAAA cert=aaa iat-mode=0";
    const B: &str = "obfs4 192.0.2.11:443 BBBB cert=bbb iat-mode=0";

    fn builtin_table() -> HashMap<String, Vec<String>> {
        let mut table = HashMap::new();
        table.insert(
            "obfs4".to_string(),
            vec!["obfs4 builtin-1".to_string(), "obfs4 builtin-2".to_string()],
        );
        table.insert(
            "snowflake".to_string(),
            vec!["snowflake 192.0.2.3:1".to_string()],
        );
        table
    }

    fn setup() -> (BridgeConfigResolver, Arc<Preferences>, InMemoryTorDaemon) {
        let prefs = Arc::new(Preferences::in_memory().with_builtin_bridges(&builtin_table()));
        let daemon = InMemoryTorDaemon::new();
        let resolver = BridgeConfigResolver::new(prefs.clone(), Arc::new(daemon.clone()));
        (resolver, prefs, daemon)
    }

    /// Store whose every operation fails.
    struct FailingPrefs;

    impl PreferenceStore for FailingPrefs {
        fn get_string(&self, _key: &str) -> PrefResult<Option<String>> {
            Err(PrefError::Unavailable("profile locked".into()))
        }

        fn set_string(&self, _key: &str, _value: &str) -> PrefResult<()> {
            Err(PrefError::Unavailable("profile locked".into()))
        }

        fn clear(&self, _key: &str) -> PrefResult<()> {
            Err(PrefError::Unavailable("profile locked".into()))
        }

        fn child_keys(&self, _prefix: &str) -> PrefResult<Vec<String>> {
            Err(PrefError::Unavailable("profile locked".into()))
        }
    }

    fn cache(prefs: &Preferences, lines: &[&str]) {
        for (i, line) in lines.iter().enumerate() {
            prefs
                .set_string(&format!("{}{}", PREF_BRANCH_BRIDGEDB_BRIDGE, i), line)
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_no_bridges() {
        let (resolver, _, _) = setup();
        let config = resolver.read_settings().await.unwrap();
        assert_eq!(config, BridgeConfiguration::none());
    }

    #[tokio::test]
    async fn test_matching_cache_is_bridgedb() {
        let (resolver, prefs, daemon) = setup();
        daemon.insert("Bridge", &[A, B]).await;
        cache(&prefs, &[A, B]);

        let config = resolver.read_settings().await.unwrap();
        assert_eq!(config.source(), BridgeSource::FromDistributionService);
        assert_eq!(config.bridge_lines(), [A, B]);
        assert!(config.builtin_type().is_none());
    }

    #[tokio::test]
    async fn test_reordered_cache_is_user_provided() {
        let (resolver, prefs, daemon) = setup();
        daemon.insert("Bridge", &[A, B]).await;
        cache(&prefs, &[B, A]);

        let config = resolver.read_settings().await.unwrap();
        assert_eq!(config.source(), BridgeSource::UserProvided);
        assert_eq!(config.bridge_lines(), [A, B]);
    }

    #[tokio::test]
    async fn test_shorter_cache_is_user_provided() {
        let (resolver, prefs, daemon) = setup();
        daemon.insert("Bridge", &[A, B]).await;
        cache(&prefs, &[A]);

        let config = resolver.read_settings().await.unwrap();
        assert_eq!(config.source(), BridgeSource::UserProvided);
    }

    #[tokio::test]
    async fn test_case_difference_is_user_provided() {
        let (resolver, prefs, daemon) = setup();
        daemon.insert("Bridge", &[A]).await;
        let upper = A.to_uppercase();
        cache(&prefs, &[upper.as_str()]);

        let config = resolver.read_settings().await.unwrap();
        assert_eq!(config.source(), BridgeSource::UserProvided);
    }

    #[tokio::test]
    async fn test_selected_type_ignores_daemon() {
        let (resolver, prefs, daemon) = setup();
        daemon.insert("Bridge", &[A, B]).await;
        daemon.fail_get(Some("daemon must not be consulted")).await;
        prefs.set_string(PREF_DEFAULT_BRIDGE_TYPE, "obfs4").unwrap();

        let config = resolver.read_settings().await.unwrap();
        assert_eq!(config.source(), BridgeSource::Builtin);
        assert_eq!(config.builtin_type(), Some("obfs4"));
        assert_eq!(config.bridge_lines(), ["obfs4 builtin-1", "obfs4 builtin-2"]);
    }

    #[tokio::test]
    async fn test_unknown_builtin_type_has_no_lines() {
        let (resolver, prefs, _) = setup();
        prefs.set_string(PREF_DEFAULT_BRIDGE_TYPE, "meek-azure").unwrap();

        let config = resolver.read_settings().await.unwrap();
        assert_eq!(config.source(), BridgeSource::Builtin);
        assert_eq!(config.builtin_type(), Some("meek-azure"));
        assert!(config.bridge_lines().is_empty());
    }

    #[tokio::test]
    async fn test_daemon_failure_is_read_error() {
        let (resolver, _, daemon) = setup();
        daemon.fail_get(Some("control port gone")).await;

        let err = resolver.read_settings().await.unwrap_err();
        assert!(matches!(err, BridgeError::ConfigRead(ref m) if m.contains("control port gone")));
    }

    #[test]
    fn test_builtin_types_sorted_and_cached() {
        let (resolver, prefs, _) = setup();
        assert_eq!(resolver.builtin_types().unwrap(), ["obfs4", "snowflake"]);

        // later additions are not picked up; the list is fixed per run
        prefs
            .set_string(&format!("{}meek-azure.0", PREF_BRANCH_DEFAULT_BRIDGE), "x")
            .unwrap();
        assert_eq!(resolver.builtin_types().unwrap(), ["obfs4", "snowflake"]);
    }

    #[test]
    fn test_builtin_bridges_numeric_order() {
        let prefs = Arc::new(Preferences::in_memory());
        for i in [10, 2, 0, 1] {
            prefs
                .set_string(
                    &format!("{}obfs4.{}", PREF_BRANCH_DEFAULT_BRIDGE, i),
                    &format!("line {}", i),
                )
                .unwrap();
        }
        prefs
            .set_string(&format!("{}obfs4-extra.0", PREF_BRANCH_DEFAULT_BRIDGE), "other")
            .unwrap();
        let resolver = BridgeConfigResolver::new(prefs, Arc::new(InMemoryTorDaemon::new()));

        assert_eq!(
            resolver.builtin_bridges("obfs4").unwrap(),
            ["line 0", "line 1", "line 2", "line 10"]
        );
    }

    #[tokio::test]
    async fn test_write_none_clears_everything() {
        let (resolver, prefs, daemon) = setup();
        prefs.set_string(PREF_DEFAULT_BRIDGE_TYPE, "obfs4").unwrap();
        cache(&prefs, &[A, B]);
        daemon.insert("UseBridges", &["1"]).await;
        daemon.insert("Bridge", &[A]).await;

        resolver
            .write_settings(&BridgeConfiguration::none())
            .await
            .unwrap();

        assert_eq!(prefs.get_string(PREF_DEFAULT_BRIDGE_TYPE).unwrap(), None);
        assert!(resolver.distribution_cache().unwrap().is_empty());
        assert!(!daemon.use_bridges().await);
        assert!(daemon.values("Bridge").await.is_empty());
    }

    #[tokio::test]
    async fn test_write_bridgedb_populates_cache() {
        let (resolver, _, daemon) = setup();
        let config = BridgeConfiguration::from_distribution_service(vec![A.into(), B.into()]);

        resolver.write_settings(&config).await.unwrap();

        assert_eq!(resolver.distribution_cache().unwrap(), [A, B]);
        assert!(daemon.use_bridges().await);
        assert_eq!(daemon.values("Bridge").await, [A, B]);
        assert_eq!(resolver.read_settings().await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_write_shorter_bridgedb_list_drops_stale_entries() {
        let (resolver, _, _) = setup();
        let long = BridgeConfiguration::from_distribution_service(vec![A.into(), B.into()]);
        resolver.write_settings(&long).await.unwrap();

        let short = BridgeConfiguration::from_distribution_service(vec![B.into()]);
        resolver.write_settings(&short).await.unwrap();

        assert_eq!(resolver.distribution_cache().unwrap(), [B]);
        assert_eq!(resolver.read_settings().await.unwrap(), short);
    }

    #[tokio::test]
    async fn test_write_user_provided_leaves_cache_empty() {
        let (resolver, prefs, daemon) = setup();
        cache(&prefs, &[A]);
        let config = BridgeConfiguration::user_provided(vec![B.into()]);

        resolver.write_settings(&config).await.unwrap();

        assert!(resolver.distribution_cache().unwrap().is_empty());
        assert_eq!(daemon.values("Bridge").await, [B]);
        assert_eq!(resolver.read_settings().await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_write_builtin_persists_type() {
        let (resolver, prefs, daemon) = setup();
        let config = resolver.builtin("snowflake").unwrap();

        resolver.write_settings(&config).await.unwrap();

        assert_eq!(
            prefs.get_string(PREF_DEFAULT_BRIDGE_TYPE).unwrap().as_deref(),
            Some("snowflake")
        );
        assert_eq!(daemon.values("Bridge").await, ["snowflake 192.0.2.3:1"]);
        assert_eq!(resolver.read_settings().await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_write_failure_surfaces_detail_after_prefs_reset() {
        let (resolver, prefs, daemon) = setup();
        prefs.set_string(PREF_DEFAULT_BRIDGE_TYPE, "obfs4").unwrap();
        daemon.fail_set(Some("Bridge line did not parse")).await;

        let err = resolver
            .write_settings(&BridgeConfiguration::user_provided(vec!["garbage".into()]))
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::ConfigWrite(ref m) if m.contains("Bridge line did not parse")));
        // partial write: the preference reset already happened
        assert_eq!(prefs.get_string(PREF_DEFAULT_BRIDGE_TYPE).unwrap(), None);
    }

    #[tokio::test]
    async fn test_select_builtin_rejects_unknown_type() {
        let (resolver, prefs, daemon) = setup();

        let err = resolver.select_builtin("obfs44").unwrap_err();
        assert!(
            matches!(err, BridgeError::InvalidInput(ref m) if m.contains("obfs44") && m.contains("obfs4, snowflake"))
        );
        assert_eq!(daemon.set_calls().await, 0);
        assert_eq!(prefs.get_string(PREF_DEFAULT_BRIDGE_TYPE).unwrap(), None);

        let config = resolver.select_builtin("snowflake").unwrap();
        assert_eq!(config.builtin_type(), Some("snowflake"));
        assert_eq!(config.bridge_lines(), ["snowflake 192.0.2.3:1"]);
    }

    #[tokio::test]
    async fn test_store_failure_on_write_is_config_write() {
        let daemon = InMemoryTorDaemon::new();
        let resolver = BridgeConfigResolver::new(Arc::new(FailingPrefs), Arc::new(daemon.clone()));

        let err = resolver
            .write_settings(&BridgeConfiguration::user_provided(vec![A.into()]))
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::ConfigWrite(ref m) if m.contains("profile locked")));
        assert_eq!(daemon.set_calls().await, 0);
    }

    #[tokio::test]
    async fn test_store_failure_on_read_is_config_read() {
        let daemon = InMemoryTorDaemon::new();
        daemon.insert("Bridge", &[A]).await;
        let resolver = BridgeConfigResolver::new(Arc::new(FailingPrefs), Arc::new(daemon));

        let err = resolver.read_settings().await.unwrap_err();
        assert!(matches!(err, BridgeError::ConfigRead(ref m) if m.contains("profile locked")));
        assert!(matches!(resolver.builtin_types(), Err(BridgeError::ConfigRead(_))));
    }
}
