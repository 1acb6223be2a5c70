// End-to-end tests for the `cohort` binary: exit codes, --json stdout
// contract, and file outputs.
//
// Run with: cargo test -p cohort-cli --test cli_tests -- --nocapture

use std::path::PathBuf;
use std::process::{Command, Output};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture(name: &str) -> String {
    fixtures_dir().join(name).to_string_lossy().into_owned()
}

/// Run the binary inside `dir` so default outputs never land in the crate.
fn cohort(dir: &std::path::Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cohort"))
        .current_dir(dir)
        .env_remove("COHORT_LOG")
        .env_remove("COHORT_SEED")
        .args(args)
        .output()
        .expect("failed to run cohort")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ===========================================================================
// cohort run
// ===========================================================================

#[test]
fn run_json_is_single_value_on_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let out = cohort(
        dir.path(),
        &["run", &fixture("sections.toml"), &fixture("sections.csv"), "--json"],
    );
    assert!(out.status.success(), "stderr: {}", stderr(&out));

    let stdout = String::from_utf8(out.stdout).unwrap();
    let val: serde_json::Value = serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("stdout must be one JSON value: {e}\n{stdout}"));

    assert_eq!(val["meta"]["config_name"], "Lab Sections");
    assert_eq!(val["meta"]["seed"], 11);
    assert_eq!(val["summary"]["total_items"], 12);
    assert_eq!(val["summary"]["matches"], 4);
    assert_eq!(val["summary"]["in_range"], 4);

    for m in val["matches"].as_array().unwrap() {
        assert_eq!(m["source"], "path");
        assert_eq!(m["item"]["weight"], 3);
    }
}

#[test]
fn run_writes_default_csv_without_overwriting() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture("sections.toml");
    let roster = fixture("sections.csv");
    let args = ["run", config.as_str(), roster.as_str()];

    assert!(cohort(dir.path(), &args).status.success());
    assert!(cohort(dir.path(), &args).status.success());

    let first = std::fs::read_to_string(dir.path().join("out-private.csv")).unwrap();
    assert!(dir.path().join("out-private-2.csv").exists());

    let lines: Vec<&str> = first.lines().collect();
    assert_eq!(lines[0], "group_num,email,track,slot");
    assert_eq!(lines.len(), 13);
}

#[test]
fn run_writes_requested_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("groups.csv");
    let json = dir.path().join("result.json");
    let out = cohort(
        dir.path(),
        &[
            "run",
            &fixture("sections.toml"),
            &fixture("sections.csv"),
            "--csv",
            csv.to_str().unwrap(),
            "--output",
            json.to_str().unwrap(),
        ],
    );
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(out.stdout.is_empty(), "no --json means nothing on stdout");

    let result: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(result["summary"]["total_weight"], 12);
    assert!(std::fs::read_to_string(&csv).unwrap().starts_with("group_num,"));
    assert!(stderr(&out).contains("12 people (weight 12) in 4 groups"));
}

#[test]
fn seed_override_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let out = cohort(
        dir.path(),
        &["run", &fixture("sections.toml"), &fixture("sections.csv"), "--json", "--seed", "99"],
    );
    assert!(out.status.success());
    let val: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(val["meta"]["seed"], 99);
}

#[test]
fn seed_read_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture("sections.toml");
    let roster = fixture("sections.csv");
    let out = Command::new(env!("CARGO_BIN_EXE_cohort"))
        .current_dir(dir.path())
        .env_remove("COHORT_LOG")
        .env("COHORT_SEED", "42")
        .args(["run", config.as_str(), roster.as_str(), "--json"])
        .output()
        .expect("failed to run cohort");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let val: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(val["meta"]["seed"], 42);
}

// ===========================================================================
// Exit codes
// ===========================================================================

#[test]
fn infeasible_split_exits_5_with_hint() {
    let dir = tempfile::tempdir().unwrap();
    let out = cohort(
        dir.path(),
        &["run", &fixture("impossible.toml"), &fixture("sections.csv")],
    );
    assert_eq!(out.status.code(), Some(5));
    let err = stderr(&out);
    assert!(err.contains("unable to split a group of size 6 comprised of 6 items"), "{err}");
    assert!(err.contains("[4, 4]"), "{err}");
    assert!(err.contains("hint:"), "{err}");
    assert!(err.contains("--seed"), "{err}");
}

#[test]
fn invalid_config_exits_3() {
    let dir = tempfile::tempdir().unwrap();
    let out = cohort(dir.path(), &["validate", &fixture("bad-bounds.toml")]);
    assert_eq!(out.status.code(), Some(3));
    assert!(stderr(&out).contains("max_group_size (2)"));
}

#[test]
fn missing_roster_exits_7() {
    let dir = tempfile::tempdir().unwrap();
    let out = cohort(
        dir.path(),
        &["run", &fixture("sections.toml"), &fixture("no-such-roster.csv")],
    );
    assert_eq!(out.status.code(), Some(7));
}

#[test]
fn roster_schema_mismatch_exits_4() {
    let dir = tempfile::tempdir().unwrap();
    let roster = dir.path().join("other.csv");
    std::fs::write(&roster, "Name,Team\nann,red\n").unwrap();
    let out = cohort(
        dir.path(),
        &["run", &fixture("sections.toml"), roster.to_str().unwrap()],
    );
    assert_eq!(out.status.code(), Some(4));
    assert!(stderr(&out).contains("'Email'"));
}

#[test]
fn unknown_flag_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let out = cohort(dir.path(), &["run", "--bogus"]);
    assert_eq!(out.status.code(), Some(2));
}

// ===========================================================================
// cohort validate
// ===========================================================================

#[test]
fn validate_reports_shape() {
    let dir = tempfile::tempdir().unwrap();
    let out = cohort(dir.path(), &["validate", &fixture("sections.toml")]);
    assert!(out.status.success());
    let err = stderr(&out);
    assert!(err.contains("valid: 'Lab Sections' groups of 3-4 partitioned on [track, slot]"), "{err}");
}
