use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("deckgen")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("segment"));
}

#[test]
fn test_serve_help_shows_overrides() {
    cargo_bin_cmd!("deckgen")
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--host"))
        .stdout(predicate::str::contains("--port"))
        .stdout(predicate::str::contains("--storage-dir"));
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("deckgen")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1"));
}

#[test]
fn test_segment_splits_outline_into_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let outline_path = dir.path().join("outline.md");
    std::fs::write(
        &outline_path,
        "# Presentation Outline\n\n## Slide 1: Intro\n- hook\n\n## Slide 2: Details\n- depth\n",
    )
    .unwrap();

    cargo_bin_cmd!("deckgen")
        .args(["segment", outline_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("--- slide 1 ---"))
        .stdout(predicate::str::contains("## Slide 1: Intro"))
        .stdout(predicate::str::contains("--- slide 2 ---"))
        .stdout(predicate::str::contains("- depth"))
        .stdout(predicate::str::contains("--- slide 3 ---").not());
}

#[test]
fn test_segment_without_headings_prints_single_block() {
    let dir = tempfile::tempdir().unwrap();
    let outline_path = dir.path().join("outline.md");
    std::fs::write(&outline_path, "freeform notes without headings\n").unwrap();

    cargo_bin_cmd!("deckgen")
        .args(["segment", outline_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("--- slide 1 ---"))
        .stdout(predicate::str::contains("freeform notes without headings"))
        .stdout(predicate::str::contains("--- slide 2 ---").not());
}

#[test]
fn test_segment_missing_file_fails() {
    cargo_bin_cmd!("deckgen")
        .args(["segment", "no-such-outline.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("read outline file"));
}
