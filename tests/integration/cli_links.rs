use assert_cmd::Command;
use tempfile::TempDir;

fn doubletdb(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("doubletdb").expect("binary");
    cmd.arg("--db")
        .arg(dir.path().join("db.links"))
        .arg("--log-level")
        .arg("warn");
    cmd
}

#[test]
fn links_mode_creates_and_searches() {
    let dir = TempDir::new().expect("temp dir");
    let output = doubletdb(&dir)
        .arg("links")
        .write_stdin("hello\nhello?\n")
        .output()
        .expect("run links");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("utf8");
    let lines: Vec<&str> = stdout.lines().collect();
    assert!(lines[0].starts_with("Sequence with balanced variant at "));
    assert_eq!(lines[1], "1 sequences matched fully.");
    assert!(lines[2].ends_with(": hello"));
    assert_eq!(lines[3], "1 sequences matched partially.");
}

#[test]
fn sequences_survive_between_runs() {
    let dir = TempDir::new().expect("temp dir");
    doubletdb(&dir)
        .arg("links")
        .write_stdin("persistent\n")
        .assert()
        .success();

    let output = doubletdb(&dir)
        .arg("links")
        .write_stdin("persist*?\n")
        .output()
        .expect("second run");
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.starts_with("1 sequences matched pattern."));
    assert!(stdout.contains(": persistent"));
}

#[test]
fn dump_lists_sequence_roots() {
    let dir = TempDir::new().expect("temp dir");
    doubletdb(&dir)
        .arg("links")
        .write_stdin("dumped\n")
        .assert()
        .success();
    let output = doubletdb(&dir).arg("dump").output().expect("dump");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.contains("\"dumped\""));
}

#[test]
fn config_save_writes_the_effective_settings() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("conf").join("doubletdb.toml");
    doubletdb(&dir)
        .arg("--config")
        .arg(&config_path)
        .arg("config")
        .arg("--save")
        .assert()
        .success();

    let saved = doubletdb::Config::load(Some(&config_path)).expect("saved config");
    assert_eq!(saved.store.path, dir.path().join("db.links"));
    assert_eq!(saved.log.level, "warn");

    let output = doubletdb(&dir)
        .arg("--config")
        .arg(&config_path)
        .arg("config")
        .output()
        .expect("print config");
    let printed = String::from_utf8(output.stdout).expect("utf8");
    assert!(printed.contains("[store]"));
    assert!(printed.contains("db.links"));
}
