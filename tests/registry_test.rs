//! Swap registry persistence: concurrent writers, fields written by other
//! tools, and recovery of the account index after a restart.

use std::sync::Arc;
use swap_orchestrator::registry::{RawJsonDb, SwapsRegistry, DEFAULT_ACCOUNT_INDEX, SWAPS_DB};
use swap_orchestrator::swap::{Coin, LockTxid};

fn open(dir: &tempfile::TempDir) -> SwapsRegistry {
    SwapsRegistry::new(Arc::new(
        RawJsonDb::open(dir.path()).expect("Failed to open registry"),
    ))
}

#[test]
fn test_concurrent_writers_do_not_lose_updates() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(open(&dir));

    let handles: Vec<_> = (0..8u32)
        .map(|i| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                let id = format!("swap{}", i);
                registry.set_account_index(&id, i).unwrap();
                registry
                    .append_lock_txid(&id, &LockTxid::btc(format!("btc{}", i)))
                    .unwrap();
                registry
                    .append_lock_txid(&id, &LockTxid::xmr(format!("xmr{}", i)))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let reopened = open(&dir);
    let mut ids = reopened.swap_ids().unwrap();
    ids.sort();
    assert_eq!(ids.len(), 8);
    for i in 0..8u32 {
        let id = format!("swap{}", i);
        assert_eq!(reopened.account_index(&id).unwrap(), i);
        let txids = reopened.lock_txids(&id).unwrap();
        assert_eq!(txids[&Coin::Btc], format!("btc{}", i));
        assert_eq!(txids[&Coin::Xmr], format!("xmr{}", i));
    }
}

#[test]
fn test_lock_txid_is_never_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(&dir);

    assert!(registry
        .append_lock_txid("a1b2", &LockTxid::btc("deadbeef"))
        .unwrap());
    assert!(!registry
        .append_lock_txid("a1b2", &LockTxid::btc("cafebabe"))
        .unwrap());

    let reopened = open(&dir);
    assert_eq!(
        reopened.entry("a1b2").unwrap().unwrap().btc_lock_txid.as_deref(),
        Some("deadbeef")
    );
}

#[test]
fn test_foreign_fields_survive_updates() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(format!("{}.json", SWAPS_DB)),
        r#"{"swap_a1b2":{"swaps_account":5,"note":"written by another tool"},"unrelated":42}"#,
    )
    .unwrap();

    let registry = open(&dir);
    assert_eq!(registry.account_index("a1b2").unwrap(), 5);
    registry
        .append_lock_txid("a1b2", &LockTxid::xmr("f00d"))
        .unwrap();

    let raw: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join(format!("{}.json", SWAPS_DB))).unwrap(),
    )
    .unwrap();
    assert_eq!(raw["swap_a1b2"]["note"], "written by another tool");
    assert_eq!(raw["swap_a1b2"]["xmr_lock_txid"], "f00d");
    assert_eq!(raw["unrelated"], 42);
    assert_eq!(registry.swap_ids().unwrap(), vec!["a1b2".to_string()]);
}

#[test]
fn test_unknown_swap_uses_default_account() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(&dir);

    assert_eq!(registry.account_index("nope").unwrap(), DEFAULT_ACCOUNT_INDEX);
    assert!(registry.lock_txids("nope").unwrap().is_empty());
    assert!(registry.entry("nope").unwrap().is_none());
}
