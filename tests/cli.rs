use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("metascribe")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("transcribe"))
        .stdout(predicate::str::contains("keys"))
        .stdout(predicate::str::contains("platforms"));
}

#[test]
fn test_platforms_lists_supported_sources() {
    Command::cargo_bin("metascribe")
        .unwrap()
        .arg("platforms")
        .assert()
        .success()
        .stdout(predicate::str::contains("Facebook Ads Library"))
        .stdout(predicate::str::contains("Instagram"))
        .stdout(predicate::str::contains("YouTube"));
}

#[test]
fn test_transcribe_requires_url() {
    Command::cargo_bin("metascribe")
        .unwrap()
        .arg("transcribe")
        .assert()
        .failure()
        .stderr(predicate::str::contains("URL"));
}

#[test]
fn test_keys_remove_requires_index() {
    Command::cargo_bin("metascribe")
        .unwrap()
        .args(["keys", "remove"])
        .assert()
        .failure();
}
