//! ---
//! ws_section: "05-operator-interface"
//! ws_subsection: "tests"
//! ws_type: "source"
//! ws_scope: "test"
//! ws_description: "End-to-end checks of the worldshiftctl binary."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use assert_cmd::Command;

fn worldshiftctl(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("worldshiftctl").unwrap();
    cmd.current_dir(workdir)
        .env_remove("WORLDSHIFT_CONFIG")
        .env_remove("WORLDSHIFT_LIVE_DIR")
        .env_remove("WORLDSHIFT_BACKUP_DIR")
        .env("WORLDSHIFT_LOG", "warn");
    cmd
}

#[test]
fn plan_lists_combined_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let assert = worldshiftctl(dir.path())
        .args([
            "plan",
            "--strategy",
            "combined",
            "--current",
            "1",
            "--replicas",
            "0",
            "--output",
            "json",
        ])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("\"strategy\": \"combined\""));
    assert!(stdout.contains("\"target_count\": 0"));
    let backup = stdout.find("SyncToBackup(instance-0)").unwrap();
    let delete = stdout.find("DeleteInstance(instance-0)").unwrap();
    let redirect_back = stdout.find("RedirectAll(instance-0)").unwrap();
    assert!(backup < delete && delete < redirect_back);
    assert!(stdout.contains("SetReplicaCount(0)"));
}

#[test]
fn plan_for_stopped_workload_is_plain() {
    let dir = tempfile::tempdir().unwrap();
    let assert = worldshiftctl(dir.path())
        .args(["plan", "--strategy", "world-sync", "--current", "0"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("strategy: plain"));
    assert!(!stdout.contains("SyncToBackup"));
}

#[test]
fn malformed_override_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    worldshiftctl(dir.path())
        .args(["plan", "--current", "1", "--set", "image.tag"])
        .assert()
        .failure();
}

#[test]
fn sync_mirrors_live_world_into_backup() {
    let dir = tempfile::tempdir().unwrap();
    let live = dir.path().join("world");
    let backup = dir.path().join("world-backup");
    fs::create_dir_all(live.join("region")).unwrap();
    fs::write(live.join("level.dat"), b"seed=42").unwrap();
    fs::write(live.join("region/r.0.0.mca"), [1u8; 512]).unwrap();

    worldshiftctl(dir.path())
        .args(["sync", "to-backup", "--live"])
        .arg(&live)
        .arg("--backup")
        .arg(&backup)
        .assert()
        .success();

    assert_eq!(fs::read(backup.join("level.dat")).unwrap(), b"seed=42");
    assert_eq!(fs::read(backup.join("region/r.0.0.mca")).unwrap().len(), 512);
}

#[test]
fn sync_from_missing_backup_fails() {
    let dir = tempfile::tempdir().unwrap();
    let live = dir.path().join("world");
    fs::create_dir_all(&live).unwrap();
    fs::write(live.join("level.dat"), b"seed=42").unwrap();

    worldshiftctl(dir.path())
        .args(["sync", "from-backup", "--live"])
        .arg(&live)
        .arg("--backup")
        .arg(dir.path().join("absent"))
        .assert()
        .failure();
    assert_eq!(fs::read(live.join("level.dat")).unwrap(), b"seed=42");
}

#[cfg(unix)]
#[test]
fn status_of_stopped_server_exits_zero() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let kubectl = dir.path().join("kubectl");
    fs::write(&kubectl, "#!/bin/sh\nif [ \"$1\" = get ]; then echo 0; fi\n").unwrap();
    fs::set_permissions(&kubectl, fs::Permissions::from_mode(0o755)).unwrap();
    fs::write(
        dir.path().join("worldshift.toml"),
        format!(
            "[workload]\nkubectl = \"{}\"\n\n[logging]\nfile = false\n",
            kubectl.display()
        ),
    )
    .unwrap();

    let assert = worldshiftctl(dir.path())
        .args(["status", "--output", "json"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("\"replica_count\": 0"));
    assert!(stdout.contains("\"instances\": []"));
}
