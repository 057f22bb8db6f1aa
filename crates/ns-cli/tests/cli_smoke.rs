use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

fn demo_bundle() -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("demos")
        .join("guide.bundle.json")
        .to_string_lossy()
        .to_string()
}

#[test]
fn check_accepts_the_demo_bundle() {
    let code = ns_cli::run_cli_from_args(["ns-cli", "check", "--bundle", &demo_bundle()]);
    assert_eq!(code, 0);
}

#[test]
fn run_without_player_needs_no_stdin() {
    let bundle = demo_bundle();
    let code = ns_cli::run_cli_from_args([
        "ns-cli", "run", "--bundle", &bundle, "--npc", "Guide", "--label", "OnNap", "--player",
        "0",
    ]);
    assert_eq!(code, 0);
}

#[test]
fn missing_bundle_is_reported_as_error() {
    let code = ns_cli::run_cli_from_args([
        "ns-cli",
        "check",
        "--bundle",
        "/definitely/not/here.json",
    ]);
    assert_eq!(code, 1);
}

#[test]
fn unknown_subcommand_fails_argument_parsing() {
    assert_eq!(ns_cli::run_cli_from_args(["ns-cli", "play"]), 2);
}

#[test]
fn binary_drives_a_dialogue_from_stdin() {
    let bin = env!("CARGO_BIN_EXE_ns-cli");
    let mut child = Command::new(bin)
        .args(["run", "--bundle", &demo_bundle(), "--npc", "20", "--player", "1"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("cli should execute");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(b"\n1\n\n")
        .expect("replies should be written");
    let output = child.wait_with_output().expect("cli should finish");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("The inn is north of the fountain."));
    assert!(stdout.ends_with("[END]\n"));
}
