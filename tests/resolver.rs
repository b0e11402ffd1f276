//! End-to-end bridge configuration scenarios against in-memory stores.

use std::collections::HashMap;
use std::sync::Arc;

use torbridge::control::InMemoryTorDaemon;
use torbridge::prefs::{PreferenceStore, Preferences};
use torbridge::{BridgeConfigResolver, BridgeConfiguration, BridgeSource};

const OBFS4_A: &str = "obfs4 192.0.2.10:443 0123456789ABCDEF cert=aaa iat-mode=0";
const OBFS4_B: &str = "obfs4 192.0.2.11:9001 FEDCBA9876543210 cert=bbb iat-mode=0";
const SNOWFLAKE: &str = "snowflake 192.0.2.3:80 2B280B23E1107BB62ABFC40DDCC8824814F80A72";

struct Fixture {
    prefs: Arc<Preferences>,
    daemon: InMemoryTorDaemon,
    resolver: BridgeConfigResolver,
}

fn fixture() -> Fixture {
    let mut table = HashMap::new();
    table.insert(
        "obfs4".to_string(),
        vec![OBFS4_A.to_string(), OBFS4_B.to_string()],
    );
    table.insert("snowflake".to_string(), vec![SNOWFLAKE.to_string()]);

    let prefs = Arc::new(Preferences::in_memory().with_builtin_bridges(&table));
    let daemon = InMemoryTorDaemon::new();
    let resolver = BridgeConfigResolver::new(prefs.clone(), Arc::new(daemon.clone()));
    Fixture {
        prefs,
        daemon,
        resolver,
    }
}

fn lines(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

async fn cache_distribution(f: &Fixture, values: &[&str]) {
    for (i, value) in values.iter().enumerate() {
        f.prefs
            .set_string(&format!("extensions.torlauncher.bridgedb_bridge.{}", i), value)
            .unwrap();
    }
}

#[tokio::test]
async fn test_matching_cache_is_distribution_service() {
    let f = fixture();
    f.daemon.insert("Bridge", &["bridge A", "bridge B"]).await;
    cache_distribution(&f, &["bridge A", "bridge B"]).await;

    let config = f.resolver.read_settings().await.unwrap();
    assert_eq!(config.source(), BridgeSource::FromDistributionService);
    assert_eq!(config.bridge_lines(), ["bridge A", "bridge B"]);
}

#[tokio::test]
async fn test_reordered_cache_is_user_provided() {
    let f = fixture();
    f.daemon.insert("Bridge", &["bridge A", "bridge B"]).await;
    cache_distribution(&f, &["bridge B", "bridge A"]).await;

    let config = f.resolver.read_settings().await.unwrap();
    assert_eq!(config.source(), BridgeSource::UserProvided);
    assert_eq!(config.bridge_lines(), ["bridge A", "bridge B"]);
}

#[tokio::test]
async fn test_selected_type_ignores_daemon_and_cache() {
    let f = fixture();
    f.daemon.insert("Bridge", &["bridge A"]).await;
    cache_distribution(&f, &["bridge A"]).await;
    f.prefs
        .set_string("extensions.torlauncher.default_bridge_type", "snowflake")
        .unwrap();

    let config = f.resolver.read_settings().await.unwrap();
    assert_eq!(config.source(), BridgeSource::Builtin);
    assert_eq!(config.builtin_type(), Some("snowflake"));
    assert_eq!(config.bridge_lines(), [SNOWFLAKE]);
}

#[tokio::test]
async fn test_builtin_types_from_table() {
    let f = fixture();
    assert_eq!(f.resolver.builtin_types().unwrap(), ["obfs4", "snowflake"]);
}

#[tokio::test]
async fn test_round_trip_is_idempotent_for_every_source() {
    let f = fixture();
    let configs = vec![
        BridgeConfiguration::none(),
        f.resolver.builtin("obfs4").unwrap(),
        BridgeConfiguration::from_distribution_service(lines(&["bridge A", "bridge B"])),
        BridgeConfiguration::user_provided(lines(&["bridge C"])),
    ];

    for config in configs {
        f.resolver.write_settings(&config).await.unwrap();
        let first = f.resolver.read_settings().await.unwrap();
        assert_eq!(first, config);
        let first_bridges = f.daemon.values("Bridge").await;
        let first_use = f.daemon.use_bridges().await;

        f.resolver.write_settings(&first).await.unwrap();
        let second = f.resolver.read_settings().await.unwrap();
        assert_eq!(second, first);
        assert_eq!(f.daemon.values("Bridge").await, first_bridges);
        assert_eq!(f.daemon.use_bridges().await, first_use);
    }
}

#[tokio::test]
async fn test_switching_sources_clears_previous_state() {
    let f = fixture();
    f.resolver
        .write_settings(&BridgeConfiguration::from_distribution_service(lines(&[
            "bridge A",
        ])))
        .await
        .unwrap();
    f.resolver
        .write_settings(&f.resolver.builtin("obfs4").unwrap())
        .await
        .unwrap();

    assert!(f.resolver.distribution_cache().unwrap().is_empty());
    assert_eq!(f.daemon.values("Bridge").await, [OBFS4_A, OBFS4_B]);

    f.resolver
        .write_settings(&BridgeConfiguration::none())
        .await
        .unwrap();
    assert_eq!(f.resolver.selected_builtin_type().unwrap(), None);
    assert!(!f.daemon.use_bridges().await);
    assert_eq!(
        f.resolver.read_settings().await.unwrap(),
        BridgeConfiguration::none()
    );
}

#[tokio::test]
async fn test_prefs_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.json");
    let daemon = InMemoryTorDaemon::new();

    {
        let prefs = Arc::new(Preferences::open(&path).unwrap());
        let resolver = BridgeConfigResolver::new(prefs, Arc::new(daemon.clone()));
        resolver
            .write_settings(&BridgeConfiguration::from_distribution_service(lines(&[
                "bridge A", "bridge B",
            ])))
            .await
            .unwrap();
    }

    let prefs = Arc::new(Preferences::open(&path).unwrap());
    let resolver = BridgeConfigResolver::new(prefs, Arc::new(daemon));
    let config = resolver.read_settings().await.unwrap();
    assert_eq!(config.source(), BridgeSource::FromDistributionService);
}
