use logweave::parser::{self, LogParser};
use logweave::parsers::{
    ApacheCombinedParser, ApacheCommonParser, DockerDaemonParser, DockerJsonParser, GenericParser,
    JsonParser, KubernetesAuditParser, KubernetesComponentParser, KubernetesContainerParser,
    KubernetesEventParser, NginxAccessParser, NginxErrorParser, PythonLoggingParser,
    Syslog3164Parser, Syslog5424Parser,
};
use logweave::record::{LogLevel, TimestampPrecision};

use test_helpers::lines;

// ---------------------------------------------------------------------------
// Failure contract: parse_line never panics, errors mark the record
// ---------------------------------------------------------------------------

#[test]
fn test_error_records_carry_raw_line_and_zero_confidence() {
    let garbage = "@@@ not a log line @@@";
    let parsers: Vec<Box<dyn LogParser>> = vec![
        Box::new(JsonParser),
        Box::new(ApacheCommonParser),
        Box::new(ApacheCombinedParser),
        Box::new(NginxAccessParser),
        Box::new(NginxErrorParser),
        Box::new(Syslog3164Parser),
        Box::new(Syslog5424Parser),
        Box::new(PythonLoggingParser),
        Box::new(KubernetesAuditParser),
    ];
    for p in parsers {
        let record = p.parse_line(garbage);
        assert_eq!(record.raw, garbage, "parser {}", p.name());
        assert!(!record.parse_errors.is_empty(), "parser {}", p.name());
        assert_eq!(record.parser_confidence, 0.0, "parser {}", p.name());
        assert_eq!(record.parser_name, p.name());
    }
}

#[test]
fn test_successful_records_have_positive_confidence() {
    let samples: Vec<(Box<dyn LogParser>, &str)> = vec![
        (
            Box::new(JsonParser),
            r#"{"level":"info","message":"ok"}"#,
        ),
        (
            Box::new(ApacheCommonParser),
            r#"127.0.0.1 - - [10/Oct/2000:13:55:36 -0700] "GET / HTTP/1.0" 200 2326"#,
        ),
        (Box::new(GenericParser), "anything at all"),
    ];
    for (p, line) in samples {
        let record = p.parse_line(line);
        assert!(record.parse_errors.is_empty(), "parser {}", p.name());
        assert!(record.parser_confidence > 0.0, "parser {}", p.name());
    }
}

#[test]
fn test_parse_stream_skips_empty_lines() {
    let parser = GenericParser;
    let input = vec![
        "one".to_string(),
        "".to_string(),
        "   ".to_string(),
        "two".to_string(),
    ];
    let records: Vec<_> = parser.parse_stream(Box::new(input.into_iter())).collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].raw, "one");
    assert_eq!(records[1].raw, "two");
}

// ---------------------------------------------------------------------------
// JSON parser
// ---------------------------------------------------------------------------

#[test]
fn test_json_stream_parse_scenario() {
    let parser = JsonParser;
    let first = parser
        .parse_line(r#"{"timestamp":"2026-01-27T10:15:32.123Z","level":"INFO","message":"up","request_id":"r1"}"#);
    let second = parser
        .parse_line(r#"{"timestamp":"2026-01-27T10:15:33.456Z","level":"ERROR","message":"db down","request_id":"r1"}"#);

    assert_eq!(first.format_detected, "json_structured");
    assert_eq!(second.format_detected, "json_structured");
    assert_eq!(first.level, LogLevel::Info);
    assert_eq!(second.level, LogLevel::Error);
    assert!(!first.is_error());
    assert!(second.is_error());
    assert_eq!(first.correlation.request_id.as_deref(), Some("r1"));
    assert_eq!(second.correlation.request_id.as_deref(), Some("r1"));
    assert_eq!(first.timestamp_precision, TimestampPrecision::Millis);
    assert_eq!(second.timestamp_precision, TimestampPrecision::Millis);
    assert_eq!(first.message, "up");
}

#[test]
fn test_json_field_alias_probing() {
    let parser = JsonParser;
    let record = parser.parse_line(r#"{"@timestamp":"2026-01-27T10:15:32Z","severity":"warn","msg":"cache miss"}"#);
    assert!(record.timestamp.is_some());
    assert_eq!(record.level, LogLevel::Warning);
    assert_eq!(record.message, "cache miss");
}

#[test]
fn test_json_message_synthesized_when_absent() {
    let parser = JsonParser;
    let record = parser.parse_line(r#"{"event":"login","status":"ok"}"#);
    assert!(record.message.contains("event=login"));
    assert!(record.message.contains("status=ok"));
}

#[test]
fn test_json_non_object_is_error_marked() {
    let parser = JsonParser;
    let record = parser.parse_line("[1, 2, 3]");
    assert!(!record.parse_errors.is_empty());
    assert_eq!(record.parser_confidence, 0.0);
}

#[test]
fn test_json_depth_cap_truncates_message() {
    // Sixty levels of nesting blows the depth cap.
    let mut line = String::new();
    for _ in 0..60 {
        line.push_str(r#"{"a":"#);
    }
    line.push('1');
    for _ in 0..60 {
        line.push('}');
    }

    let parser = JsonParser;
    let record = parser.parse_line(&line);
    assert!(record.parse_errors.iter().any(|e| e.contains("deep")));
    assert_eq!(record.parser_confidence, 0.0);
    assert!(record.message.chars().count() <= 204);
    assert!(record.message.ends_with("..."));
}

#[test]
fn test_json_can_parse_prefers_log_shaped_objects() {
    let parser = JsonParser;
    let logs = lines(&[
        r#"{"level":"info","message":"a"}"#,
        r#"{"level":"warn","message":"b"}"#,
    ]);
    let not_logs = lines(&[r#"{"x":1}"#, r#"{"y":2}"#]);
    assert!(parser.can_parse(&logs) > parser.can_parse(&not_logs));
    assert_eq!(parser.can_parse(&lines(&["plain text"])), 0.0);
}

// ---------------------------------------------------------------------------
// Apache / nginx access logs
// ---------------------------------------------------------------------------

#[test]
fn test_apache_common_fields() {
    let parser = ApacheCommonParser;
    let record = parser.parse_line(
        r#"127.0.0.1 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif?x=1 HTTP/1.0" 200 2326"#,
    );
    assert_eq!(record.format_detected, "apache_common");
    let http = record.http.as_ref().unwrap();
    assert_eq!(http.method.as_deref(), Some("GET"));
    assert_eq!(http.path.as_deref(), Some("/apache_pb.gif"));
    assert_eq!(http.query.as_deref(), Some("x=1"));
    assert_eq!(http.status, Some(200));
    assert_eq!(http.response_size, Some(2326));
    assert_eq!(http.http_version.as_deref(), Some("HTTP/1.0"));
    assert_eq!(
        record.network.as_ref().unwrap().source_ip.as_deref(),
        Some("127.0.0.1")
    );
    assert_eq!(record.correlation.user_id.as_deref(), Some("frank"));
    assert_eq!(record.level, LogLevel::Info);
    assert_eq!(record.message, "GET /apache_pb.gif -> 200");
    assert!(record.timestamp.is_some());
}

#[test]
fn test_apache_combined_referer_and_agent() {
    let parser = ApacheCombinedParser;
    let record = parser.parse_line(
        r#"10.0.0.1 - - [27/Jan/2026:10:15:32 +0000] "GET /a HTTP/1.1" 200 10 "http://ref" "curl/8.0""#,
    );
    let network = record.network.as_ref().unwrap();
    assert_eq!(network.referer.as_deref(), Some("http://ref"));
    assert_eq!(network.user_agent.as_deref(), Some("curl/8.0"));
    // A dash referer is elided.
    let record = parser.parse_line(
        r#"10.0.0.1 - - [27/Jan/2026:10:15:32 +0000] "GET /a HTTP/1.1" 200 10 "-" "curl/8.0""#,
    );
    assert!(record.network.as_ref().unwrap().referer.is_none());
}

#[test]
fn test_http_status_maps_to_level() {
    assert_eq!(parser::level_from_status(200), LogLevel::Info);
    assert_eq!(parser::level_from_status(301), LogLevel::Info);
    assert_eq!(parser::level_from_status(404), LogLevel::Warning);
    assert_eq!(parser::level_from_status(500), LogLevel::Error);

    let parser = NginxAccessParser;
    for (status, level) in [
        (200, LogLevel::Info),
        (404, LogLevel::Warning),
        (500, LogLevel::Error),
    ] {
        let line = format!(
            r#"192.168.1.1 - - [27/Jan/2026:10:15:32 +0000] "GET /x HTTP/1.1" {status} 612 "-" "Mozilla/5.0""#
        );
        assert_eq!(parser.parse_line(&line).level, level, "status {status}");
    }
}

#[test]
fn test_nginx_access_optional_trailing_pair() {
    let parser = NginxAccessParser;
    // No referer/user-agent at all still parses.
    let record =
        parser.parse_line(r#"192.168.1.1 - - [27/Jan/2026:10:15:32 +0000] "GET /x HTTP/1.1" 200 612"#);
    assert!(record.parse_errors.is_empty());
    assert!(record.network.as_ref().unwrap().user_agent.is_none());
}

#[test]
fn test_nginx_error_format() {
    let parser = NginxErrorParser;
    let record = parser.parse_line(
        r#"2026/01/27 10:15:32 [error] 1234#5678: *9 open() "/path/file" failed (2: No such file or directory)"#,
    );
    assert_eq!(record.format_detected, "nginx_error");
    assert_eq!(record.level, LogLevel::Error);
    assert!(record.message.starts_with("open()"));
    assert_eq!(record.extra["pid"], 1234);
    assert_eq!(record.extra["tid"], 5678);
    assert_eq!(record.extra["connection_id"], 9);
    assert_eq!(record.source.service.as_deref(), Some("nginx"));
    assert!(record.timestamp.is_some());
}

// ---------------------------------------------------------------------------
// Syslog
// ---------------------------------------------------------------------------

#[test]
fn test_syslog_3164_pri_decoding() {
    let parser = Syslog3164Parser;
    let record = parser.parse_line("<34>Oct 11 22:14:15 mymachine su: 'su root' failed for lonvick");
    // 34 = facility 4, severity 2 (critical).
    assert_eq!(record.extra["facility"], 4);
    assert_eq!(record.extra["severity"], 2);
    assert_eq!(record.level, LogLevel::Critical);
    assert_eq!(record.source.hostname.as_deref(), Some("mymachine"));
    assert_eq!(record.source.service.as_deref(), Some("su"));
    assert!(record.message.contains("failed for lonvick"));
}

#[test]
fn test_syslog_3164_without_pri_infers_level() {
    let parser = Syslog3164Parser;
    let record = parser.parse_line("Jan 27 10:15:32 server sshd[1234]: Accepted publickey for deploy");
    assert_eq!(record.level, LogLevel::Info);
    assert_eq!(record.extra["pid"], 1234);
    assert_eq!(record.source.service.as_deref(), Some("sshd"));
    assert!(record.timestamp.is_some());
}

#[test]
fn test_syslog_5424_nilvalues_elided() {
    let parser = Syslog5424Parser;
    let record = parser.parse_line(
        "<165>1 2003-08-24T05:14:15.000003-07:00 192.0.2.1 myproc 8710 - - %% It's time to make the do-nuts.",
    );
    // 165 = facility 20, severity 5 (notice).
    assert_eq!(record.level, LogLevel::Notice);
    assert_eq!(record.source.hostname.as_deref(), Some("192.0.2.1"));
    assert_eq!(record.source.service.as_deref(), Some("myproc"));
    assert_eq!(record.extra["procid"], "8710");
    assert!(!record.extra.contains_key("msgid"));
    assert_eq!(record.timestamp_precision, TimestampPrecision::Micros);
    assert!(record.message.starts_with("%%"));
}

#[test]
fn test_syslog_5424_structured_data() {
    let parser = Syslog5424Parser;
    let record = parser.parse_line(
        r#"<34>1 2003-10-11T22:14:15.003Z mymachine.example.com su - ID47 [exampleSDID@32473 iut="3" eventSource="Application"] 'su root' failed"#,
    );
    let sd = record.structured_data["exampleSDID@32473"].as_object().unwrap();
    assert_eq!(sd["iut"], "3");
    assert_eq!(sd["eventSource"], "Application");
    assert_eq!(record.extra["msgid"], "ID47");
}

// ---------------------------------------------------------------------------
// Python logging
// ---------------------------------------------------------------------------

#[test]
fn test_python_logging_full_format() {
    let parser = PythonLoggingParser;
    let record = parser.parse_line("2026-01-27 10:15:32,123 - myapp.module - INFO - Message here");
    assert_eq!(record.level, LogLevel::Info);
    assert_eq!(record.source.service.as_deref(), Some("myapp.module"));
    assert_eq!(record.message, "Message here");
    assert_eq!(record.timestamp_precision, TimestampPrecision::Millis);
    assert!(record.timestamp.is_some());
}

#[test]
fn test_python_logging_dot_milliseconds() {
    let parser = PythonLoggingParser;
    let record = parser.parse_line("2026-01-27 10:15:32.123 - myapp - ERROR - boom");
    assert_eq!(record.level, LogLevel::Error);
    assert!(record.timestamp.is_some());
}

#[test]
fn test_python_logging_alternate_order() {
    let parser = PythonLoggingParser;
    let record = parser.parse_line("2026-01-27 10:15:32,123 WARNING myapp slow request");
    assert_eq!(record.level, LogLevel::Warning);
    assert_eq!(record.source.service.as_deref(), Some("myapp"));
    assert_eq!(record.message, "slow request");
}

#[test]
fn test_python_logging_simple_format() {
    let parser = PythonLoggingParser;
    let record = parser.parse_line("ERROR:django.request:Internal Server Error: /users/");
    assert_eq!(record.level, LogLevel::Error);
    assert_eq!(record.source.service.as_deref(), Some("django.request"));
    assert_eq!(record.message, "Internal Server Error: /users/");
}

#[test]
fn test_python_logging_threaded_format() {
    let parser = PythonLoggingParser;
    let record = parser
        .parse_line("2026-01-27 10:15:32,123 - myapp - INFO - [worker-3] - task complete");
    assert_eq!(record.extra["thread"], "worker-3");
    assert_eq!(record.message, "task complete");
}

// ---------------------------------------------------------------------------
// Docker
// ---------------------------------------------------------------------------

#[test]
fn test_docker_json_container_log() {
    let parser = DockerJsonParser;
    let record = parser.parse_line(
        r#"{"log":"Starting application...\n","stream":"stdout","time":"2024-01-15T10:30:00.123456789Z"}"#,
    );
    assert_eq!(record.format_detected, "docker_json");
    assert_eq!(record.message, "Starting application...");
    assert_eq!(record.timestamp_precision, TimestampPrecision::Nanos);
    assert_eq!(record.structured_data["stream"], "stdout");
    assert_eq!(record.level, LogLevel::Info);
}

#[test]
fn test_docker_json_stderr_lifts_info_to_warning() {
    let parser = DockerJsonParser;
    let record = parser.parse_line(
        r#"{"log":"something happened\n","stream":"stderr","time":"2024-01-15T10:30:00Z"}"#,
    );
    assert_eq!(record.level, LogLevel::Warning);
    // An explicit error keyword still wins.
    let record = parser.parse_line(
        r#"{"log":"error: oom\n","stream":"stderr","time":"2024-01-15T10:30:00Z"}"#,
    );
    assert_eq!(record.level, LogLevel::Error);
}

#[test]
fn test_docker_daemon_logfmt() {
    let parser = DockerDaemonParser;
    let record = parser.parse_line(
        r#"time="2024-01-15T10:30:01Z" level=warning msg="Container unhealthy" container=abc123"#,
    );
    assert_eq!(record.format_detected, "docker_daemon");
    assert_eq!(record.level, LogLevel::Warning);
    assert_eq!(record.message, "Container unhealthy");
    assert_eq!(record.source.container_id.as_deref(), Some("abc123"));
    assert_eq!(record.source.service.as_deref(), Some("dockerd"));
}

#[test]
fn test_docker_daemon_systemd_form() {
    let parser = DockerDaemonParser;
    let record =
        parser.parse_line("Jan 15 10:30:00 host1 dockerd[512]: Loading containers: done.");
    assert_eq!(record.format_detected, "docker_daemon_systemd");
    assert_eq!(record.source.hostname.as_deref(), Some("host1"));
    assert_eq!(record.structured_data["pid"], "512");
}

#[test]
fn test_docker_daemon_keyvalue_fallback() {
    let parser = DockerDaemonParser;
    let record = parser.parse_line("level=info msg=ready port=8080");
    assert_eq!(record.parser_confidence, 0.5);
    assert_eq!(record.level, LogLevel::Info);
    assert_eq!(record.message, "ready");
    assert_eq!(record.structured_data["port"], "8080");
}

// ---------------------------------------------------------------------------
// Kubernetes
// ---------------------------------------------------------------------------

#[test]
fn test_kubernetes_container_timestamp_prefix() {
    let parser = KubernetesContainerParser::new();
    let record = parser.parse_line("2024-01-15T10:30:00.123456789Z Starting application...");
    assert_eq!(record.format_detected, "kubernetes_container");
    assert_eq!(record.timestamp_precision, TimestampPrecision::Nanos);
    assert_eq!(record.parser_confidence, 0.8);
    assert_eq!(record.message, "Starting application...");
}

#[test]
fn test_kubernetes_container_delegates_json_payload() {
    let parser = KubernetesContainerParser::new();
    let record = parser.parse_line(
        r#"2024-01-15T10:30:01.000000000Z {"level":"info","msg":"Ready","request_id":"abc"}"#,
    );
    assert_eq!(record.format_detected, "kubernetes_container_json");
    assert_eq!(record.level, LogLevel::Info);
    assert_eq!(record.message, "Ready");
    assert_eq!(record.correlation.request_id.as_deref(), Some("abc"));
    assert!(record.timestamp.is_some());
}

#[test]
fn test_klog_component_format() {
    let parser = KubernetesComponentParser;
    let record = parser.parse_line("E0115 10:30:01.234567   12345 handler.go:456] Error processing request");
    assert_eq!(record.format_detected, "klog");
    assert_eq!(record.level, LogLevel::Error);
    assert_eq!(record.message, "Error processing request");
    assert_eq!(record.structured_data["pid"], "12345");
    assert_eq!(record.structured_data["source_file"], "handler.go");
    assert_eq!(record.structured_data["source_line"], "456");
    assert_eq!(record.timestamp_precision, TimestampPrecision::Micros);

    let fatal = parser.parse_line("F0115 10:30:02.000001   12345 main.go:1] unable to start");
    assert_eq!(fatal.level, LogLevel::Critical);
}

#[test]
fn test_kubernetes_audit_log() {
    let parser = KubernetesAuditParser;
    let record = parser.parse_line(
        r#"{"kind":"Event","apiVersion":"audit.k8s.io/v1","auditID":"abc-123","verb":"list","requestURI":"/api/v1/pods","responseStatus":{"code":403},"user":{"username":"system:admin","groups":["system:masters"]},"sourceIPs":["10.0.0.9"]}"#,
    );
    assert_eq!(record.format_detected, "kubernetes_audit");
    assert_eq!(record.message, "LIST /api/v1/pods");
    assert_eq!(record.level, LogLevel::Warning);
    assert_eq!(record.correlation.request_id.as_deref(), Some("abc-123"));
    assert_eq!(record.correlation.user_id.as_deref(), Some("system:admin"));
    assert_eq!(record.structured_data["source_ip"], "10.0.0.9");
}

#[test]
fn test_kubernetes_audit_rejects_other_json() {
    let parser = KubernetesAuditParser;
    let record = parser.parse_line(r#"{"apiVersion":"v1","kind":"Pod"}"#);
    assert!(!record.parse_errors.is_empty());
    assert_eq!(record.parser_confidence, 0.0);
}

#[test]
fn test_kubernetes_event_json() {
    let parser = KubernetesEventParser;
    let record = parser.parse_line(
        r#"{"kind":"Event","type":"Warning","reason":"Failed","message":"Error: ImagePullBackOff","involvedObject":{"kind":"Pod","name":"nginx-xxx","namespace":"default"}}"#,
    );
    assert_eq!(record.format_detected, "kubernetes_event_json");
    assert_eq!(record.level, LogLevel::Warning);
    assert_eq!(record.message, "[Failed] Pod/nginx-xxx: Error: ImagePullBackOff");
    assert_eq!(record.source.pod_name.as_deref(), Some("nginx-xxx"));
    assert_eq!(record.source.namespace.as_deref(), Some("default"));
}

#[test]
fn test_kubernetes_event_table_and_header() {
    let parser = KubernetesEventParser;
    let record =
        parser.parse_line("5m          Normal    Scheduled  pod/nginx-xxx   Successfully assigned");
    assert_eq!(record.format_detected, "kubernetes_event_table");
    assert_eq!(record.level, LogLevel::Info);
    assert_eq!(record.structured_data["object_kind"], "pod");
    assert_eq!(record.structured_data["object_name"], "nginx-xxx");

    let header = parser.parse_line("LAST SEEN   TYPE      REASON     OBJECT          MESSAGE");
    assert_eq!(header.level, LogLevel::Unknown);
    assert_eq!(header.parser_confidence, 0.3);
    assert!(header.parse_errors.is_empty());
}

// ---------------------------------------------------------------------------
// Generic fallback
// ---------------------------------------------------------------------------

#[test]
fn test_generic_extracts_timestamp_and_level() {
    let parser = GenericParser;
    let record = parser.parse_line("2026-01-27 10:15:32 ERROR something went wrong");
    assert!(record.timestamp.is_some());
    assert_eq!(record.level, LogLevel::Error);
    assert_eq!(record.message, "ERROR something went wrong");
    assert!((record.parser_confidence - 0.7).abs() < 1e-9);
}

#[test]
fn test_generic_confidence_tiers() {
    let parser = GenericParser;
    // Bare text: base confidence only.
    let plain = parser.parse_line("hello world");
    assert!((plain.parser_confidence - 0.3).abs() < 1e-9);
    assert_eq!(plain.level, LogLevel::Info);

    // Timestamp but no level token.
    let timed = parser.parse_line("2026-01-27 10:15:32 all systems nominal");
    assert!((timed.parser_confidence - 0.5).abs() < 1e-9);

    // Confidence never exceeds the fallback cap.
    let both = parser.parse_line("2026-01-27 10:15:32 WARN disk filling");
    assert!(both.parser_confidence <= 0.7);
}

#[test]
fn test_generic_can_parse_is_capped() {
    let parser = GenericParser;
    let sample = lines(&[
        "2026-01-27 10:15:32 ERROR a",
        "2026-01-27 10:15:33 ERROR b",
        "2026-01-27 10:15:34 ERROR c",
    ]);
    let confidence = parser.can_parse(&sample);
    assert!(confidence <= 0.6);
    assert!(confidence > 0.3);
}

// ---------------------------------------------------------------------------
// Shared timestamp helpers
// ---------------------------------------------------------------------------

#[test]
fn test_timestamp_parsing_formats() {
    for value in [
        "2026-01-27T10:15:32.123Z",
        "2026-01-27T10:15:32+02:00",
        "2026-01-27 10:15:32.123",
        "2026-01-27 10:15:32,123",
        "2026-01-27 10:15:32",
        "27/Jan/2026:10:15:32 +0000",
        "2026/01/27 10:15:32",
        "1769508932",
        "1769508932123",
    ] {
        assert!(
            parser::parse_timestamp(value).is_some(),
            "failed to parse {value:?}"
        );
    }
    assert!(parser::parse_timestamp("not a time").is_none());
    assert!(parser::parse_timestamp("").is_none());
}

#[test]
fn test_precision_detection() {
    assert_eq!(
        parser::detect_precision("2026-01-27T10:15:32Z"),
        TimestampPrecision::Seconds
    );
    assert_eq!(
        parser::detect_precision("2026-01-27T10:15:32.123Z"),
        TimestampPrecision::Millis
    );
    assert_eq!(
        parser::detect_precision("2026-01-27T10:15:32.123456Z"),
        TimestampPrecision::Micros
    );
    assert_eq!(
        parser::detect_precision("2026-01-27T10:15:32.123456789Z"),
        TimestampPrecision::Nanos
    );
}

#[test]
fn test_level_inference_keywords() {
    assert_eq!(
        parser::infer_level_from_message("connection failed"),
        LogLevel::Error
    );
    assert_eq!(
        parser::infer_level_from_message("deprecated API in use"),
        LogLevel::Warning
    );
    assert_eq!(
        parser::infer_level_from_message("verbose output enabled"),
        LogLevel::Debug
    );
    assert_eq!(
        parser::infer_level_from_message("all good"),
        LogLevel::Info
    );
}
