//! Property-based tests for the cleanup ledger.
//!
//! After one drain the ledger is empty, every scheduled file that existed is
//! gone, and paths that never existed are reported as missing, not failed.

use std::collections::BTreeSet;

use proptest::prelude::*;
use reco_core::ledger::CleanupLedger;
use tempfile::TempDir;

// ── Strategies ──────────────────────────────────────────────────────────────

/// (file name, materialize on disk?) pairs; names repeat to exercise dedup.
fn arb_entries() -> impl Strategy<Value = Vec<(String, bool)>> {
    proptest::collection::vec(("[a-e]{1,3}", any::<bool>()), 0..24)
}

// ── Drain ───────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn drain_empties_ledger_and_removes_files(entries in arb_entries()) {
        let tmp = TempDir::new().unwrap();
        let mut ledger = CleanupLedger::new();
        let mut distinct = BTreeSet::new();

        for (name, materialize) in &entries {
            let path = tmp.path().join(name);
            if *materialize {
                std::fs::write(&path, name).unwrap();
            }
            ledger.append(&path);
            distinct.insert(path);
        }
        prop_assert_eq!(ledger.len(), distinct.len());

        let existed: BTreeSet<_> = distinct.iter().filter(|p| p.exists()).cloned().collect();
        let report = ledger.remove_all();

        prop_assert!(ledger.is_empty());
        prop_assert!(report.failed.is_empty());
        prop_assert_eq!(report.removed.len(), existed.len());
        prop_assert_eq!(report.removed.len() + report.missing.len(), distinct.len());
        for path in &distinct {
            prop_assert!(!path.exists(), "{} survived cleanup", path.display());
        }
    }

    #[test]
    fn append_is_set_like(names in proptest::collection::vec("[a-c]{1,2}", 0..32)) {
        let mut ledger = CleanupLedger::new();
        let mut expected = BTreeSet::new();
        for name in &names {
            let fresh = expected.insert(name.clone());
            prop_assert_eq!(ledger.append(format!("/nonexistent/reco/{name}")), fresh);
        }
        prop_assert_eq!(ledger.len(), expected.len());
    }

    /// Each path is removed at most once: a second drain finds nothing.
    #[test]
    fn second_drain_is_empty(entries in arb_entries()) {
        let tmp = TempDir::new().unwrap();
        let mut ledger = CleanupLedger::new();
        for (name, materialize) in &entries {
            let path = tmp.path().join(name);
            if *materialize {
                std::fs::write(&path, name).unwrap();
            }
            ledger.append(path);
        }
        let _ = ledger.remove_all();
        let again = ledger.remove_all();
        prop_assert!(again.removed.is_empty());
        prop_assert!(again.missing.is_empty());
    }
}
