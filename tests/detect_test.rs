use logweave::detect::FormatDetector;

use test_helpers::lines;

const COMBINED_LINES: &[&str] = &[
    r#"127.0.0.1 - frank [27/Jan/2026:10:15:32 +0000] "GET /index.html HTTP/1.1" 200 2326 "http://example.com/" "Mozilla/5.0""#,
    r#"192.168.1.5 - - [27/Jan/2026:10:15:33 +0000] "POST /api/login HTTP/1.1" 401 512 "-" "curl/8.0""#,
    r#"10.0.0.9 - alice [27/Jan/2026:10:15:34 +0000] "GET /dashboard HTTP/1.1" 200 10240 "-" "Mozilla/5.0""#,
    r#"172.16.0.2 - - [27/Jan/2026:10:15:35 +0000] "GET /missing HTTP/1.1" 404 196 "-" "Mozilla/5.0""#,
    r#"127.0.0.1 - - [27/Jan/2026:10:15:36 +0000] "GET /health HTTP/1.1" 500 87 "-" "kube-probe/1.29""#,
];

#[test]
fn test_combined_sample_wins_with_full_confidence() {
    let detector = FormatDetector::new();
    let (format, confidence) = detector.detect(&lines(COMBINED_LINES));
    assert_eq!(format, "apache_combined");
    assert!((confidence - 1.0).abs() < 1e-9);
}

#[test]
fn test_combined_sample_scores_other_signatures_too() {
    let detector = FormatDetector::new();
    let ranked = detector.detect_all(&lines(COMBINED_LINES));
    assert!(ranked.len() > 1, "expected competing signatures: {ranked:?}");
    assert_eq!(ranked[0].0, "apache_combined");
    assert!(ranked.iter().any(|(name, conf)| name == "nginx_access" && *conf > 0.0));
    // Ranked descending.
    for pair in ranked.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
    }
}

#[test]
fn test_confidence_bounds() {
    let detector = FormatDetector::new();
    for (_, confidence) in detector.detect_all(&lines(COMBINED_LINES)) {
        assert!((0.0..=1.0).contains(&confidence));
    }
}

#[test]
fn test_json_sample_detected() {
    let detector = FormatDetector::new();
    let sample = lines(&[
        r#"{"timestamp":"2026-01-27T10:15:32Z","level":"info","message":"a"}"#,
        r#"{"timestamp":"2026-01-27T10:15:33Z","level":"debug","message":"b"}"#,
    ]);
    let (format, confidence) = detector.detect(&sample);
    assert_eq!(format, "json_structured");
    assert!((confidence - 1.0).abs() < 1e-9);
}

#[test]
fn test_python_logging_sample_detected() {
    let detector = FormatDetector::new();
    let sample = lines(&[
        "2026-01-27 10:15:32,123 - myapp - INFO - up",
        "2026-01-27 10:15:33,456 - myapp - ERROR - down",
    ]);
    let (format, _) = detector.detect(&sample);
    assert_eq!(format, "python_logging");
}

#[test]
fn test_syslog_5424_sample_detected() {
    let detector = FormatDetector::new();
    let sample = lines(&[
        "<34>1 2026-01-27T10:15:32.000Z host app - - - started",
        "<34>1 2026-01-27T10:15:33.000Z host app - - - stopped",
    ]);
    let (format, _) = detector.detect(&sample);
    assert_eq!(format, "syslog_rfc5424");
}

#[test]
fn test_empty_input_is_unknown() {
    let detector = FormatDetector::new();
    assert_eq!(detector.detect(&[]), ("unknown".to_string(), 0.0));
    assert_eq!(
        detector.detect(&lines(&["", "   "])),
        ("unknown".to_string(), 0.0)
    );
}

#[test]
fn test_unmatched_input_falls_back_to_generic() {
    let detector = FormatDetector::new();
    let sample = lines(&["just some words", "more words here"]);
    assert_eq!(detector.detect(&sample), ("generic".to_string(), 0.3));
}

#[test]
fn test_detect_file() {
    let detector = FormatDetector::new();
    let (format, confidence) = detector.detect_file("tests/testdata/sample_json.log");
    assert_eq!(format, "json_structured");
    assert!((confidence - 1.0).abs() < 1e-9);
}

#[test]
fn test_detect_file_missing_is_unknown() {
    let detector = FormatDetector::new();
    assert_eq!(
        detector.detect_file("no_such_file.log"),
        ("unknown".to_string(), 0.0)
    );
}

#[test]
fn test_detect_format_convenience() {
    let (format, confidence) = logweave::detect_format("tests/testdata/sample_combined.log");
    assert_eq!(format, "apache_combined");
    assert!(confidence > 0.9);
}
