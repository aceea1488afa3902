//! End-to-end tests for the `natty` binary using its stdio as signaling.

use std::io::Write;
use std::process::{Command, Stdio};

use natty::FiveTuple;

use super::test_helpers::{script_engine, UDP_RESULT};

fn natty_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_natty"))
}

#[test]
fn offer_relays_signaling_and_prints_result() {
    let engine = script_engine(&format!(
        "echo 'offer-sdp'\nread answer\necho \"ack:$answer\"\necho '{UDP_RESULT}'"
    ));
    let binary = engine.file("engine.sh");

    let mut child = natty_bin()
        .arg("offer")
        .arg("--binary")
        .arg(&binary)
        .arg("--timeout-secs")
        .arg("10")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn natty");

    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"answer-sdp\n")
        .expect("write answer");

    let output = child.wait_with_output().expect("natty output");
    assert!(output.status.success(), "natty failed: {output:?}");

    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3, "unexpected output: {stdout}");
    assert_eq!(lines[0], "offer-sdp");
    assert_eq!(lines[1], "ack:answer-sdp");

    let tuple: FiveTuple = serde_json::from_str(lines[2]).expect("result JSON");
    assert_eq!(tuple.local, "10.0.0.1:5000");
}

#[test]
fn failing_engine_exits_non_zero() {
    let engine = script_engine("exit 2");

    let output = natty_bin()
        .arg("answer")
        .arg("--binary")
        .arg(engine.file("engine.sh"))
        .stdin(Stdio::null())
        .output()
        .expect("run natty");

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn missing_engine_selection_is_config_error() {
    let output = natty_bin()
        .arg("offer")
        .stdin(Stdio::null())
        .output()
        .expect("run natty");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--config or --binary"), "stderr: {stderr}");
}

#[test]
fn config_file_selects_engine() {
    let engine = script_engine(&format!("echo '{UDP_RESULT}'"));
    let config_path = engine.file("natty.toml");
    std::fs::write(
        &config_path,
        format!(
            "binary = '{}'\nshutdown_grace_ms = 200\n",
            engine.file("engine.sh").display()
        ),
    )
    .expect("write config");

    let output = natty_bin()
        .arg("answer")
        .arg("--config")
        .arg(&config_path)
        .stdin(Stdio::null())
        .output()
        .expect("run natty");

    assert!(output.status.success(), "natty failed: {output:?}");
    let tuple: FiveTuple =
        serde_json::from_str(String::from_utf8_lossy(&output.stdout).trim()).expect("result JSON");
    assert_eq!(tuple.remote, "203.0.113.9:6000");
}
