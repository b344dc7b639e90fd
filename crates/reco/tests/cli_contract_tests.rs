//! CLI command contract tests
//!
//! Runs the `reco` binary against a temp backup directory populated with
//! artifacts laid out the way reco-core writes them.
//!
//! Contract guarantees tested:
//! - Deterministic exit codes
//! - Stable JSON schema in `--format json` mode
//! - No ANSI escapes in `--format plain` stdout
//! - Actionable error messages for failure paths
//! - Cleanup never touches files outside the recognised artifact grammar

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use reco_core::naming::NamingScheme;
use reco_core::store::BackupStore;
use tempfile::TempDir;

/// Pid that is never running on a test host.
const DEAD_PID: u32 = 4_100_001;

// =============================================================================
// Test fixture helpers
// =============================================================================

struct Workspace {
    _dir: TempDir,
    config: PathBuf,
    backups: PathBuf,
    work: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let backups = dir.path().join("backups");
        let work = dir.path().join("work");
        std::fs::create_dir_all(&backups).expect("create backup dir");
        std::fs::create_dir_all(&work).expect("create work dir");

        let config = dir.path().join("reco.toml");
        std::fs::write(
            &config,
            format!(
                "[backup]\ndirectory = \"{}\"\n\n[logging]\nlevel = \"warn\"\n",
                backups.display()
            ),
        )
        .expect("write config");

        Self {
            _dir: dir,
            config,
            backups,
            work,
        }
    }

    fn store(&self) -> BackupStore {
        BackupStore::open(&self.backups.to_string_lossy()).expect("open store")
    }

    fn scheme() -> NamingScheme {
        NamingScheme::new("tmp_buf", "reco_backup").expect("default scheme")
    }

    fn add_session(&self, pid: u32) -> PathBuf {
        let path = self.store().session_path(&Self::scheme(), pid);
        std::fs::write(&path, "\" reco simulated layout\nnotes.txt\n").expect("write descriptor");
        path
    }

    /// A recovered file plus the snapshot taken before recovery.
    fn add_recovered_file(&self, name: &str, before: &str, after: &str) -> (PathBuf, PathBuf) {
        let file = self.work.join(name);
        std::fs::write(&file, after).expect("write file");
        let snapshot = self.store().file_snapshot_path(&file);
        std::fs::write(&snapshot, before).expect("write snapshot");
        (file, snapshot)
    }

    fn add_swap_copy(&self, name: &str) -> PathBuf {
        let swap = self.work.join(format!(".{name}.swp"));
        let path = self.store().relocated_swap_path(&swap);
        std::fs::write(&path, b"b0VIM 9.1").expect("write swap copy");
        path
    }
}

#[allow(deprecated)]
fn reco_cmd_for(ws: &Workspace) -> Command {
    let mut cmd = Command::cargo_bin("reco").expect("reco binary");
    cmd.env("RECO_CONFIG", &ws.config)
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().expect("run reco");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf8 stdout")
}

fn json_of(cmd: &mut Command) -> serde_json::Value {
    let stdout = stdout_of(cmd);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid JSON ({e}):\n{stdout}"))
}

fn assert_no_ansi(output: &str, context: &str) {
    assert!(
        !output.contains("\x1b["),
        "{context}: output should not contain ANSI escapes, got:\n{output}"
    );
}

fn exists(path: &Path) -> bool {
    path.try_exists().expect("stat")
}

// =============================================================================
// reco status contract tests
// =============================================================================

#[test]
fn contract_status_empty_plain() {
    let ws = Workspace::new();
    let stdout = stdout_of(reco_cmd_for(&ws).arg("status"));
    assert_no_ansi(&stdout, "status plain");
    assert!(stdout.contains("No backup artifacts."), "got:\n{stdout}");
}

#[test]
fn contract_status_lists_every_kind_json() {
    let ws = Workspace::new();
    ws.add_session(DEAD_PID);
    ws.add_recovered_file("notes.txt", "old\n", "new\n");
    ws.add_swap_copy("notes.txt");
    std::fs::write(ws.backups.join("unrelated.txt"), "keep").expect("write stray");

    let json = json_of(reco_cmd_for(&ws).args(["status", "--format", "json"]));
    assert_eq!(json["count"], 3);

    let kinds: Vec<&str> = json["artifacts"]
        .as_array()
        .expect("artifacts array")
        .iter()
        .map(|a| a["kind"].as_str().expect("kind"))
        .collect();
    assert!(kinds.contains(&"session_snapshot"));
    assert!(kinds.contains(&"file_snapshot"));
    assert!(kinds.contains(&"swap_copy"));

    let session = json["artifacts"]
        .as_array()
        .expect("artifacts array")
        .iter()
        .find(|a| a["kind"] == "session_snapshot")
        .expect("session row");
    assert_eq!(session["owner_pid"], DEAD_PID);
    assert_eq!(session["owner_alive"], false);
}

#[test]
fn contract_status_plain_shows_origin() {
    let ws = Workspace::new();
    let (file, _) = ws.add_recovered_file("notes.txt", "old\n", "new\n");
    let stdout = stdout_of(reco_cmd_for(&ws).args(["status", "--format", "plain"]));
    assert_no_ansi(&stdout, "status plain");
    assert!(stdout.contains("snapshot"), "got:\n{stdout}");
    assert!(stdout.contains(&file.display().to_string()), "got:\n{stdout}");
}

// =============================================================================
// reco sessions contract tests
// =============================================================================

#[test]
fn contract_sessions_only_lists_dead_owners() {
    let ws = Workspace::new();
    let dead = ws.add_session(DEAD_PID);
    ws.add_session(std::process::id());

    let json = json_of(reco_cmd_for(&ws).args(["sessions", "--format", "json"]));
    assert_eq!(json["count"], 1);
    assert_eq!(
        json["sessions"][0]["path"].as_str(),
        Some(&*dead.to_string_lossy())
    );
}

#[test]
fn contract_sessions_empty_plain() {
    let ws = Workspace::new();
    reco_cmd_for(&ws)
        .arg("sessions")
        .assert()
        .success()
        .stdout(predicate::str::contains("No crashed sessions"));
}

// =============================================================================
// reco diff / restore contract tests
// =============================================================================

#[test]
fn contract_diff_prints_unified_diff() {
    let ws = Workspace::new();
    let (file, _) = ws.add_recovered_file("notes.txt", "alpha\nbeta\n", "alpha\ngamma\n");

    let stdout = stdout_of(reco_cmd_for(&ws).arg("diff").arg(&file));
    assert_no_ansi(&stdout, "diff plain");
    assert!(stdout.contains("-beta"), "got:\n{stdout}");
    assert!(stdout.contains("+gamma"), "got:\n{stdout}");
}

#[test]
fn contract_diff_json_counts_changes() {
    let ws = Workspace::new();
    let (file, snapshot) =
        ws.add_recovered_file("notes.txt", "alpha\nbeta\n", "alpha\ngamma\ndelta\n");

    let json = json_of(reco_cmd_for(&ws).arg("diff").arg(&file).args(["--format", "json"]));
    assert_eq!(json["inserted"], 2);
    assert_eq!(json["deleted"], 1);
    assert_eq!(json["snapshot"].as_str(), Some(&*snapshot.to_string_lossy()));
}

#[test]
fn contract_diff_without_snapshot_fails_with_remediation() {
    let ws = Workspace::new();
    let file = ws.work.join("never-recovered.txt");
    std::fs::write(&file, "text\n").expect("write file");

    reco_cmd_for(&ws)
        .arg("diff")
        .arg(&file)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no pre-recovery snapshot"))
        .stderr(predicate::str::contains("To fix:"));
}

#[test]
fn contract_restore_prints_snapshot() {
    let ws = Workspace::new();
    let (file, _) = ws.add_recovered_file("notes.txt", "before recovery\n", "after\n");

    reco_cmd_for(&ws)
        .arg("restore")
        .arg(&file)
        .assert()
        .success()
        .stdout("before recovery\n");
}

#[test]
fn contract_restore_writes_output_file() {
    let ws = Workspace::new();
    let (file, _) = ws.add_recovered_file("notes.txt", "before recovery\n", "after\n");
    let out = ws.work.join("restored.txt");

    reco_cmd_for(&ws)
        .arg("restore")
        .arg(&file)
        .arg("--output")
        .arg(&out)
        .assert()
        .success();

    assert_eq!(std::fs::read_to_string(&out).expect("read"), "before recovery\n");
    assert_eq!(std::fs::read_to_string(&file).expect("read"), "after\n");
}

// =============================================================================
// reco clean contract tests
// =============================================================================

#[test]
fn contract_clean_dry_run_removes_nothing() {
    let ws = Workspace::new();
    let session = ws.add_session(DEAD_PID);
    let (_, snapshot) = ws.add_recovered_file("notes.txt", "a\n", "b\n");

    let json = json_of(reco_cmd_for(&ws).args(["clean", "--dry-run", "--format", "json"]));
    assert_eq!(json["dry_run"], true);
    assert_eq!(json["removed"].as_array().map(Vec::len), Some(2));
    assert!(exists(&session));
    assert!(exists(&snapshot));
}

#[test]
fn contract_clean_removes_artifacts_but_not_strays() {
    let ws = Workspace::new();
    let session = ws.add_session(DEAD_PID);
    let swap = ws.add_swap_copy("notes.txt");
    let stray = ws.backups.join("unrelated.txt");
    std::fs::write(&stray, "keep").expect("write stray");

    let stdout = stdout_of(reco_cmd_for(&ws).arg("clean"));
    assert_no_ansi(&stdout, "clean plain");
    assert!(stdout.contains("Removed 2 artifact(s)."), "got:\n{stdout}");
    assert!(!exists(&session));
    assert!(!exists(&swap));
    assert!(exists(&stray));
}

#[test]
fn contract_clean_refuses_while_owner_runs() {
    let ws = Workspace::new();
    let live = ws.add_session(std::process::id());

    reco_cmd_for(&ws)
        .arg("clean")
        .assert()
        .failure()
        .stderr(predicate::str::contains("refusing to clean"));
    assert!(exists(&live));

    reco_cmd_for(&ws).args(["clean", "--force"]).assert().success();
    assert!(!exists(&live));
}

// =============================================================================
// Global options
// =============================================================================

#[test]
fn contract_missing_config_file_is_actionable() {
    let ws = Workspace::new();
    reco_cmd_for(&ws)
        .env("RECO_CONFIG", ws.work.join("absent.toml"))
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("To fix:"));
}

#[test]
fn contract_invalid_config_is_rejected() {
    let ws = Workspace::new();
    std::fs::write(
        &ws.config,
        "[backup]\nbackup_prefix = \"same\"\nbuffer_prefix = \"same\"\n",
    )
    .expect("rewrite config");
    reco_cmd_for(&ws).arg("status").assert().failure().code(1);
}

#[test]
fn contract_json_errors_are_json() {
    let ws = Workspace::new();
    let file = ws.work.join("never-recovered.txt");
    let output = reco_cmd_for(&ws)
        .arg("diff")
        .arg(&file)
        .args(["--format", "json"])
        .output()
        .expect("run reco");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr.lines().last().expect("stderr line");
    let value: serde_json::Value = serde_json::from_str(line).expect("json error");
    assert_eq!(value["ok"], false);
}

#[test]
fn contract_unknown_subcommand_should_not_panic() {
    let ws = Workspace::new();
    reco_cmd_for(&ws)
        .arg("resurrect")
        .assert()
        .failure()
        .stderr(predicate::str::contains("panicked").not());
}
