use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn config_path(file_name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("config")
        .join(file_name)
}

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hspi"))
        .args(args)
        .output()
        .expect("should run hspi binary")
}

fn report(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "CLI should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("CLI stdout should be valid JSON")
}

#[test]
fn loopback_config_echoes_every_frame() {
    let path = config_path("hspi_loopback.toml");
    let output = run_cli(&[
        path.to_str().expect("utf-8 path"),
        "--frames",
        "3",
        "--words",
        "16",
    ]);
    let report = report(&output);

    assert_eq!(report["mode"], "loopback");
    assert_eq!(report["completed"], true);
    assert_eq!(report["payload_match"], true);
    assert_eq!(report["crc_errors"], 0);
    assert_eq!(report["acks"], 3);

    let device_frames = report["device_frames"].as_array().expect("device frames");
    assert_eq!(device_frames.len(), 3);
    for frame in device_frames {
        assert_eq!(frame["num_words"], 16);
        assert_eq!(frame["crc_error"], false);
    }
    let echoes = report["echo_frames"].as_array().expect("echo frames");
    let sequence: Vec<_> = echoes.iter().map(|f| f["sequence_nr"].clone()).collect();
    let sent: Vec<_> = device_frames
        .iter()
        .map(|f| f["sequence_nr"].clone())
        .collect();
    assert_eq!(sequence, sent, "echoes keep the sequence numbers");

    let wire = report["wire"]["host"].as_array().expect("host wire log");
    assert!(wire.iter().all(|f| f["kind"] == "frame"));
    assert_eq!(wire[0]["header"]["tag"], 3);
}

#[test]
fn sink_config_runs_with_defaults() {
    let path = config_path("hspi_sink.toml");
    let report = report(&run_cli(&[path.to_str().expect("utf-8 path")]));

    assert_eq!(report["mode"], "sink");
    assert_eq!(report["messages_sent"], 4);
    assert_eq!(report["words_per_message"], 128);
    assert_eq!(
        report["packet_lengths"],
        serde_json::json!([128, 128, 128, 128])
    );
    assert!(report["echo_frames"].as_array().expect("echo frames").is_empty());
}

#[test]
fn oversized_message_is_split_on_the_wire() {
    let path = config_path("hspi_sink.toml");
    let report = report(&run_cli(&[
        path.to_str().expect("utf-8 path"),
        "--frames",
        "1",
        "--words",
        "4100",
    ]));

    let lengths: Vec<_> = report["device_frames"]
        .as_array()
        .expect("device frames")
        .iter()
        .map(|f| f["num_words"].as_u64().expect("num_words"))
        .collect();
    assert_eq!(lengths, vec![4096, 4]);
    assert_eq!(report["payload_match"], true);
}

#[test]
fn missing_arguments_print_usage() {
    let output = run_cli(&[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage:"), "stderr: {stderr}");
}

#[test]
fn unknown_mode_is_reported() {
    let dir = std::env::temp_dir().join(format!("hspi-cli-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join("bad.toml");
    fs::write(&path, "[mode]\ntype = \"mirror\"\n").expect("write config");

    let output = run_cli(&[path.to_str().expect("utf-8 path")]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown mode type: mirror"), "stderr: {stderr}");
    assert!(output.stdout.is_empty());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn bad_count_is_a_usage_error() {
    let path = config_path("hspi_sink.toml");
    let output = run_cli(&[path.to_str().expect("utf-8 path"), "--frames", "many"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--frames expects a number"));
}
