//! Request-line and CLF-timestamp helpers shared by the Apache and nginx
//! access-log parsers.

use chrono::{DateTime, FixedOffset};

use crate::parser;

#[derive(Debug, Default)]
pub struct RequestLine {
    pub method: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
    pub version: Option<String>,
}

/// Split an HTTP request line (`GET /path?query HTTP/1.1`) into its parts.
pub fn parse_request_line(request: &str) -> RequestLine {
    let mut parts = request.split_whitespace();
    let mut result = RequestLine::default();

    if let Some(method) = parts.next() {
        result.method = Some(method.to_string());
    }
    if let Some(target) = parts.next() {
        match target.split_once('?') {
            Some((path, query)) => {
                result.path = Some(path.to_string());
                result.query = Some(query.to_string());
            }
            None => result.path = Some(target.to_string()),
        }
    }
    if let Some(version) = parts.next() {
        result.version = Some(version.to_string());
    }

    result
}

/// Parse a Common Log Format timestamp (`10/Oct/2000:13:55:36 -0700`),
/// tolerating a missing zone offset.
pub fn parse_clf_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_str(value, "%d/%b/%Y:%H:%M:%S %z") {
        return Some(dt);
    }
    let bare = value.split_whitespace().next()?;
    parser::parse_timestamp(bare)
}
