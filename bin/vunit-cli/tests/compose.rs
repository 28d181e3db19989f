//! Offline composition through the `compose` command.

use std::io::Write;

use clap::Parser;
use rstest::rstest;
use tempfile::NamedTempFile;
use vunit::{test_utils::slotted_template, ComposeError};
use vunit_cli::{common::CliError, MainCmd};

fn structure_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

fn compose(args: &[&str]) -> Result<String, CliError> {
    let MainCmd::Compose(cmd) = MainCmd::parse_from(std::iter::once("vunit").chain(args.iter().copied()))
    else {
        panic!("not a compose command");
    };
    cmd.compose().map(|input| input.to_string())
}

#[test]
fn test_compose_from_file() {
    let file = structure_file(&serde_json::to_string(&slotted_template(0x10, 2)).unwrap());
    let path = file.path().to_str().unwrap();

    let composed = compose(&["compose", "--structure", path, "--args", "[5, \"0x09\"]"]).unwrap();
    let template = slotted_template(0x10, 2).bytecode;
    assert_eq!(composed.len(), template.len());
    assert!(composed.starts_with("0x60806040"));
    assert!(composed.contains(&format!("{:064x}", 5)));
    assert!(composed.contains(&format!("{:064x}", 9)));
    assert!(!composed.contains(&format!("{:064x}", 0x10)));
}

#[test]
fn test_numeric_key() {
    // 0x60 0x80 | slot 0 marker (key 7) | 0x00
    let json = format!(r#"{{"bytecode":"6080{:064x}00","key":7,"nargs":1}}"#, 7);
    let file = structure_file(&json);
    let composed =
        compose(&["compose", "--structure", file.path().to_str().unwrap(), "--args", "[255]"])
            .unwrap();
    assert_eq!(composed, format!("0x6080{:064x}00", 255));
}

#[rstest]
#[case("[1]", "expected 2 arguments")]
#[case("[1, 2, 3]", "expected 2 arguments")]
#[case("[\"nope\", 2]", "invalid value for estimate")]
fn test_rejects_bad_arguments(#[case] args: &str, #[case] message: &str) {
    let file = structure_file(&serde_json::to_string(&slotted_template(0x10, 2)).unwrap());
    let err =
        compose(&["compose", "--structure", file.path().to_str().unwrap(), "--args", args])
            .unwrap_err();
    assert!(err.to_string().contains(message), "{err}");
}

#[test]
fn test_missing_marker() {
    let file = structure_file(r#"{"bytecode":"0x60806040","key":"0x10","nargs":1}"#);
    let err = compose(&["compose", "--structure", file.path().to_str().unwrap(), "--args", "[1]"])
        .unwrap_err();
    assert!(matches!(err, CliError::Compose(ComposeError::PatchTargetNotFound { index: 0, .. })));
}
