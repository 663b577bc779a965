//! RPC response classification.
//!
//! A response is a success when the first matching rule says so:
//!
//! | # | Rule |
//! |---|---|
//! | 1 | the method is the `SayHello` health check |
//! | 2 | top-level `message` reports OK |
//! | 3 | top-level `code` equals `0` |
//! | 4 | `status` object whose `message` reports OK or whose `code` equals `0` |
//! | 5 | `code` object whose `message` reports OK |
//!
//! Anything else is a failure.  A string reports OK when it contains `OK`
//! and none of the negated markers (`NOT OK`, `NOT_OK`).  Only one level of
//! nesting is inspected.

use serde_json::Value;
use tracing::debug;

/// Health-check method that always counts as a success.
pub const HEALTH_CHECK_METHOD: &str = "SayHello";

const OK_MARKER: &str = "OK";
const NEGATED_MARKERS: [&str; 2] = ["NOT OK", "NOT_OK"];

type Matcher = fn(&Value) -> bool;

const MATCHERS: [(&str, Matcher); 4] = [
    ("message", top_level_message),
    ("code", top_level_code),
    ("status", status_object),
    ("code.message", code_object),
];

/// Classify `response` of `method_name`.
pub fn is_success(method_name: &str, response: &Value) -> bool {
    if method_name == HEALTH_CHECK_METHOD {
        return true;
    }
    match MATCHERS.iter().find(|(_, matcher)| matcher(response)) {
        Some((rule, _)) => {
            debug!(method = method_name, rule, "response classified as success");
            true
        }
        None => false,
    }
}

/// `true` when `text` carries the OK marker and no negated form of it.
pub fn reports_ok(text: &str) -> bool {
    text.contains(OK_MARKER) && !NEGATED_MARKERS.iter().any(|m| text.contains(m))
}

fn message_reports_ok(value: Option<&Value>) -> bool {
    value.and_then(Value::as_str).is_some_and(reports_ok)
}

fn code_is_zero(value: Option<&Value>) -> bool {
    value.and_then(Value::as_i64) == Some(0)
}

fn top_level_message(response: &Value) -> bool {
    message_reports_ok(response.get("message"))
}

fn top_level_code(response: &Value) -> bool {
    code_is_zero(response.get("code"))
}

fn status_object(response: &Value) -> bool {
    match response.get("status") {
        Some(status @ Value::Object(_)) => {
            message_reports_ok(status.get("message")) || code_is_zero(status.get("code"))
        }
        _ => false,
    }
}

fn code_object(response: &Value) -> bool {
    match response.get("code") {
        Some(code @ Value::Object(_)) => message_reports_ok(code.get("message")),
        _ => false,
    }
}
