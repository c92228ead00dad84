use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

fn create_test_files(dir: &TempDir, files: &[(&str, &str)]) -> Result<()> {
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
    }
    Ok(())
}

fn rustfind(dir: &Path) -> Result<Command> {
    let mut cmd = Command::cargo_bin("rustfind")?;
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .arg("--unattended")
        .arg("--no-progress");
    Ok(cmd)
}

#[test]
fn test_find_by_name() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(&dir, &[("src/main.rs", ""), ("src/util/mod.rs", ""), ("notes.md", "")])?;

    rustfind(dir.path())?
        .arg("*.rs")
        .assert()
        .success()
        .stdout(predicate::str::contains("src/main.rs"))
        .stdout(predicate::str::contains("src/util/mod.rs"))
        .stdout(predicate::str::contains("notes.md").not());
    Ok(())
}

#[test]
fn test_content_search() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(
        &dir,
        &[
            ("file1.txt", "Hello world\nTODO: Fix this\nGoodbye\n"),
            ("file2.txt", "Nothing to see\n"),
        ],
    )?;

    rustfind(dir.path())?
        .args(["*.txt", "-c", "TODO"])
        .assert()
        .success()
        .stdout(predicate::str::contains("file1.txt:2:TODO: Fix this"))
        .stdout(predicate::str::contains("file2.txt").not());
    Ok(())
}

#[test]
fn test_context_lines() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(&dir, &[("log.txt", "L1\nL2\nL3 hit\nL4\nL5\n")])?;

    rustfind(dir.path())?
        .args(["*.txt", "-c", "hit", "-B", "2", "-A", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("log.txt-1-L1"))
        .stdout(predicate::str::contains("log.txt-2-L2"))
        .stdout(predicate::str::contains("log.txt:3:L3 hit"))
        .stdout(predicate::str::contains("log.txt-4-L4"))
        .stdout(predicate::str::contains("L5").not());
    Ok(())
}

#[test]
fn test_raw_and_quiet() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(&dir, &[("a.txt", "first needle\nsecond needle\n")])?;

    rustfind(dir.path())?
        .args(["*.txt", "-c", "needle", "--raw"])
        .assert()
        .success()
        .stdout("first needle\nsecond needle\n");

    rustfind(dir.path())?
        .args(["*.txt", "-c", "needle", "--quiet"])
        .assert()
        .success()
        .stdout("a.txt\n");
    Ok(())
}

#[test]
fn test_json_output() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(&dir, &[("a.txt", "needle\n")])?;

    let output = rustfind(dir.path())?
        .args(["*.txt", "-c", "needle", "--json"])
        .output()?;
    assert!(output.status.success());
    let line = String::from_utf8(output.stdout)?;
    let value: serde_json::Value = serde_json::from_str(line.trim())?;
    assert_eq!(value["type"], "match");
    assert_eq!(value["value"]["line_number"], 1);
    assert_eq!(value["value"]["offsets"][0], 0);
    Ok(())
}

#[test]
fn test_stats_and_size_filter() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(&dir, &[("big.txt", &"x".repeat(200)), ("small.txt", "x")])?;

    rustfind(dir.path())?
        .args(["*.txt", "--max-size", "100", "--stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("small.txt"))
        .stdout(predicate::str::contains("big.txt").not())
        .stdout(predicate::str::contains("Found 1 results"));
    Ok(())
}

#[test]
fn test_invalid_pattern_fails() -> Result<()> {
    let dir = tempdir()?;
    rustfind(dir.path())?
        .args(["*", "-c", "(unclosed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid pattern"));
    Ok(())
}

#[test]
fn test_config_file() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(
        &dir,
        &[
            ("keep.log", "x"),
            ("skip.log", "x"),
            ("custom.yaml", "exclude: [\"skip.*\"]\n"),
        ],
    )?;

    rustfind(dir.path())?
        .args(["*.log", "--config", "custom.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("keep.log"))
        .stdout(predicate::str::contains("skip.log").not());
    Ok(())
}
