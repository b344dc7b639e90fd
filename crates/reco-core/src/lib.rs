//! reco-core: crash recovery and session backups for an editor's buffers
//!
//! This crate keeps unsaved editor work recoverable across abnormal exits. It
//! mirrors the window layout to a session descriptor, ties scratch buffers to
//! their swap files through process-id-carrying names, replays those swaps
//! after a crash, and removes every backup artifact once a clean exit makes
//! them unnecessary.
//!
//! # Architecture
//!
//! ```text
//! editor events → RecoverySession ─┬─► SessionBackupController → write_layout
//!                                  ├─► SwapCorrelator ─► BackupStore (copy/remove)
//!                                  ├─► NamingScheme / NameAllocator
//!                                  └─► CleanupLedger ─► remove_all on clean exit
//! ```
//!
//! # Modules
//!
//! - `naming`: generated buffer names and session descriptor names
//! - `ledger`: paths scheduled for removal on a clean exit
//! - `store`: backup directory layout, artifact names and inventory
//! - `swap`: swap file lookup and relocation
//! - `session`: session descriptor lifecycle and crash resumption detection
//! - `recovery`: the per-process recovery session and its event handlers
//! - `host`: the editor seam
//! - `simulation`: an in-process editor for tests and dry runs
//! - `diff`: pre-recovery snapshot diffs
//! - `config`: Configuration management
//! - `logging`: tracing subscriber setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod config;
pub mod diff;
pub mod error;
pub mod host;
pub mod ledger;
pub mod logging;
pub mod naming;
pub mod recovery;
pub mod session;
pub mod simulation;
pub mod store;
pub mod swap;

pub use error::{Error, Result};

/// Version of the reco-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
