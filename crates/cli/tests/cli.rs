use assert_cmd::Command;
use predicates::str::contains;

fn cfn_validate() -> Command {
    Command::cargo_bin("cfn-validate").unwrap()
}

#[test]
fn invalid_target_exits_one_before_any_check() {
    cfn_validate()
        .arg("/nonexistent/templates")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("not a valid file or directory"));
}

#[test]
fn missing_argument_exits_one() {
    cfn_validate().assert().failure().code(1);
}

#[test]
fn help_exits_zero() {
    cfn_validate().arg("--help").assert().success().stdout(contains("cfn-validate"));
}
