use assert_cmd::Command;
use predicates::prelude::*;

fn bs() -> Command {
    let mut cmd = Command::cargo_bin("bs").expect("bs binary");
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_missing_target_exits_with_usage() {
    bs().assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Expected target to be provided."))
        .stderr(predicate::str::contains("Valid targets: ["))
        .stderr(predicate::str::contains("mergegate"));
}

#[test]
fn test_unknown_target_is_rejected() {
    bs().arg("definitely-not-a-target")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("An invalid target was provided"))
        .stderr(predicate::str::contains(
            "Consider: Re-running with a valid target",
        ));
}

#[test]
fn test_help_lists_targets_and_fails() {
    bs().arg("--help")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Runs a named build target"))
        .stderr(predicate::str::contains("updateDeps"));
}

#[test]
fn test_version_succeeds() {
    bs().arg("--version").assert().success();
}
