use std::process::Command;

fn run(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "--quiet", "--"])
        .args(args)
        .output()
        .expect("failed to execute")
}

#[test]
fn test_help_flag() {
    let output = run(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("logweave"));
    assert!(stdout.contains("parse"));
    assert!(stdout.contains("correlate"));
}

#[test]
fn test_parse_missing_file_fails() {
    let output = run(&["parse", "nonexistent_file.log"]);
    assert_ne!(output.status.code(), Some(0));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nonexistent_file.log"));
}

#[test]
fn test_grep_redos_pattern_rejected() {
    let output = run(&["parse", "tests/testdata/sample_plain.log", "-g", "(a+)+b"]);
    assert_ne!(output.status.code(), Some(0));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nested quantifiers"));
    // No records are rendered.
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("Application starting up"));
}

#[test]
fn test_parse_json_output() {
    let output = run(&[
        "-q",
        "parse",
        "tests/testdata/sample_json.log",
        "-o",
        "json",
    ]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON output");
    let entries = parsed.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["format_detected"], "json_structured");
    assert_eq!(entries[0]["correlation"]["request_id"], "r1");
}

#[test]
fn test_parse_level_filter() {
    let output = run(&[
        "-q",
        "parse",
        "tests/testdata/sample_json.log",
        "-o",
        "json",
        "-l",
        "ERROR",
    ]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 1);
    assert_eq!(parsed[0]["level"], "ERROR");
}

#[test]
fn test_parse_csv_output_escapes_cells() {
    let output = run(&[
        "-q",
        "parse",
        "tests/testdata/sample_json.log",
        "-o",
        "csv",
        "-n",
        "1",
    ]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    assert_eq!(
        lines.next().unwrap(),
        "timestamp,level,message,source_file,line_number,service,format"
    );
    assert_eq!(lines.count(), 1);
}

#[test]
fn test_correlate_requires_two_files() {
    let output = run(&["correlate", "tests/testdata/correlate_a.log"]);
    assert_ne!(output.status.code(), Some(0));
}

#[test]
fn test_correlate_json_output() {
    let output = run(&[
        "-q",
        "correlate",
        "tests/testdata/correlate_a.log",
        "tests/testdata/correlate_b.log",
        "-s",
        "request_id",
        "-o",
        "json",
    ]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["groups"].as_array().unwrap().len(), 1);
    assert_eq!(parsed["groups"][0]["correlation_key"], "X");
    assert_eq!(parsed["orphan_count"], 1);
}

#[test]
fn test_correlate_unknown_strategy_rejected() {
    let output = run(&[
        "correlate",
        "tests/testdata/correlate_a.log",
        "tests/testdata/correlate_b.log",
        "-s",
        "vibes",
    ]);
    assert_ne!(output.status.code(), Some(0));
}

#[test]
fn test_stream_requires_format() {
    let output = run(&["stream", "tests/testdata/sample_json.log"]);
    assert_ne!(output.status.code(), Some(0));
}

#[test]
fn test_stream_compact_output() {
    let output = run(&[
        "-q",
        "stream",
        "tests/testdata/sample_json.log",
        "-f",
        "json",
        "--no-progress",
    ]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 3);
    assert!(stdout.contains("db down"));
}

#[test]
fn test_stream_unknown_format_fails() {
    let output = run(&[
        "stream",
        "tests/testdata/sample_json.log",
        "-f",
        "made_up_format",
    ]);
    assert_ne!(output.status.code(), Some(0));
}

#[test]
fn test_detect_reports_format() {
    let output = run(&["detect", "tests/testdata/sample_combined.log"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("apache_combined"));
}

#[test]
fn test_detect_all_shows_ranked_list() {
    let output = run(&["detect", "-a", "tests/testdata/sample_combined.log"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("apache_combined"));
    assert!(stdout.contains("nginx_access"));
}

#[test]
fn test_detect_missing_file_fails() {
    let output = run(&["detect", "no_such.log"]);
    assert_ne!(output.status.code(), Some(0));
}

#[test]
fn test_formats_lists_parsers() {
    let output = run(&["formats"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("json"));
    assert!(stdout.contains("syslog_rfc3164"));
    assert!(stdout.contains("kubernetes_audit"));
}

#[test]
fn test_version_flag() {
    let output = run(&["--version"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("logweave"));
}
