mod support;

use predicates::str::contains;

#[test]
fn tasks_help_works() {
    support::tasks_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("plain-text task tracker"));
}

#[test]
fn subcommand_help_works() {
    let subcommands = [
        "add",
        "list",
        "show",
        "complete",
        "uncomplete",
        "cancel",
        "remove",
        "edit",
        "priority",
        "block",
        "unblock",
        "delay",
        "undelay",
        "archive",
        "clean",
        "summary",
        "use",
        "orgs",
    ];

    for cmd in subcommands {
        support::tasks_cmd().arg(cmd).arg("--help").assert().success();
    }
}

#[test]
fn aliases_are_accepted() {
    for alias in ["a", "ls", "c", "u", "C", "rm", "e", "p", "b", "B", "d", "D", "s"] {
        support::tasks_cmd().arg(alias).arg("--help").assert().success();
    }
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    support::tasks_cmd().arg("frobnicate").assert().code(2);
}
