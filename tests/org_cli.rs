mod support;

use std::fs;

use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;

use support::TestHome;

#[test]
fn use_creates_layout_and_switches() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;

    home.cmd()
        .args(["use", "simplecasual"])
        .assert()
        .success()
        .stdout(contains("Using organization simplecasual"));

    let org = home.org_dir("simplecasual");
    for log in ["current.log", "archived.log", "deleted.log"] {
        assert_eq!(fs::read_to_string(org.join(log))?, "");
    }
    assert_eq!(home.counter("simplecasual"), "0");
    assert_eq!(fs::read_to_string(home.root().join("org"))?.trim(), "simplecasual");

    home.cmd().args(["add", "first here"]).assert().success();
    assert_eq!(home.log_lines("simplecasual", "current").len(), 1);
    assert!(home.log_lines("default", "current").is_empty());
    Ok(())
}

#[test]
fn use_existing_org_keeps_its_tasks() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    home.cmd().args(["use", "work"]).assert().success();
    home.cmd().args(["add", "ship it"]).assert().success();
    home.cmd().args(["use", "home"]).assert().success();

    let output = home.cmd().args(["use", "work", "--json"]).output()?;
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["data"]["created"], false);
    assert_eq!(value["data"]["previous"], "home");

    assert_eq!(home.log_lines("work", "current").len(), 1);
    assert_eq!(home.counter("work"), "1");
    Ok(())
}

#[test]
fn org_flag_overrides_pointer_for_one_run() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    home.cmd().args(["use", "work"]).assert().success();

    home.cmd()
        .args(["--org", "side", "add", "side project"])
        .assert()
        .success();
    home.cmd()
        .env("TASKS_ORG", "side")
        .args(["add", "another"])
        .assert()
        .success();

    assert_eq!(home.log_lines("side", "current").len(), 2);
    assert!(home.log_lines("work", "current").is_empty());
    assert_eq!(fs::read_to_string(home.root().join("org"))?.trim(), "work");
    Ok(())
}

#[test]
fn orgs_lists_and_marks_active() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    home.cmd()
        .args(["orgs"])
        .assert()
        .success()
        .stdout(contains("No organizations yet"));

    home.cmd().args(["use", "beta"]).assert().success();
    home.cmd().args(["use", "alpha"]).assert().success();

    home.cmd()
        .args(["orgs"])
        .assert()
        .success()
        .stdout(contains("* alpha"))
        .stdout(contains("  beta"));

    let output = home.cmd().args(["orgs", "--json"]).output()?;
    let value: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["data"]["active"], "alpha");
    let names: Vec<&str> = value["data"]["organizations"]
        .as_array()
        .expect("organizations")
        .iter()
        .filter_map(|org| org["name"].as_str())
        .collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    Ok(())
}

#[test]
fn invalid_org_names_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    for name in [".hidden", "a/b", "../up"] {
        home.cmd()
            .args(["use", name])
            .assert()
            .code(2)
            .stderr(contains("organization name"));
    }
    assert!(!home.root().join("org").exists());
    Ok(())
}

#[test]
fn configured_default_organization() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    home.write_config("default_organization = \"inbox\"\n")?;

    home.cmd().args(["add", "from config"]).assert().success();
    assert_eq!(home.log_lines("inbox", "current").len(), 1);

    home.write_config("lock_timeout_ms = 0\n")?;
    home.cmd()
        .args(["ls"])
        .assert()
        .code(2)
        .stderr(contains("lock_timeout_ms").and(contains("config.toml")));
    Ok(())
}
