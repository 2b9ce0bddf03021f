//! Canonical request records and the sinks they are written to.
//!
//! Test suites assert on the request log by diffing it, so two requests that only
//! differ in header order, hex-digit casing or transport noise must render to the
//! same bytes. Records are rendered with sorted keys and a fixed indent.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use tracing::error;

const INDENT: &str = "  ";

/// What the server received, after normalization and header filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestRecord {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub content: String,
}

impl RequestRecord {
    /// Key-sorted, indented rendering used for the request log.
    pub fn to_canonical_string(&self) -> String {
        match serde_json::to_value(self) {
            Ok(value) => render_canonical(&value),
            // Every field is a string or a string map
            Err(e) => format!("\"[unrenderable request record: {e}]\""),
        }
    }
}

/// Receives one record per completed request.
pub trait RequestSink: Send + Sync {
    fn log(&self, record: &RequestRecord);
}

/// Writes each record to stdout as a single locked write.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl RequestSink for StdoutSink {
    fn log(&self, record: &RequestRecord) {
        let mut line = record.to_canonical_string();
        line.push('\n');

        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        if let Err(e) = handle.write_all(line.as_bytes()).and_then(|_| handle.flush()) {
            error!("Failed to write request record: {}", e);
        }
    }
}

/// Keeps rendered records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl RequestSink for MemorySink {
    fn log(&self, record: &RequestRecord) {
        self.lines.lock().push(record.to_canonical_string());
    }
}

/// Render a JSON value with sorted object keys and two-space indentation.
///
/// Strings only have their double quotes escaped; everything else is kept
/// byte-for-byte so logged bodies stay readable.
pub fn render_canonical(value: &Value) -> String {
    let mut out = String::new();
    render_into(&mut out, value, "");
    out
}

fn render_into(out: &mut String, value: &Value, pad: &str) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => push_quoted(out, s),
        Value::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            let inner = format!("{pad}{INDENT}");
            out.push_str("[\n");
            for (i, item) in items.iter().enumerate() {
                out.push_str(&inner);
                render_into(out, item, &inner);
                out.push_str(if i + 1 == items.len() { "\n" } else { ",\n" });
            }
            out.push_str(pad);
            out.push(']');
        }
        Value::Object(map) => {
            if map.is_empty() {
                out.push_str("{}");
                return;
            }
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            let inner = format!("{pad}{INDENT}");
            out.push_str("{\n");
            for (i, key) in keys.iter().enumerate() {
                out.push_str(&inner);
                push_quoted(out, key);
                out.push_str(": ");
                render_into(out, &map[key.as_str()], &inner);
                out.push_str(if i + 1 == keys.len() { "\n" } else { ",\n" });
            }
            out.push_str(pad);
            out.push('}');
        }
    }
}

fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    out.push_str(&s.replace('"', "\\\""));
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(headers: &[(&str, &str)]) -> RequestRecord {
        RequestRecord {
            method: "POST".to_string(),
            url: "/orders?id=(1)".to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            content: r#"{"qty":2}"#.to_string(),
        }
    }

    #[test]
    fn test_canonical_layout() {
        let rendered = record(&[("user-agent", "tests"), ("accept", "*/*")]).to_canonical_string();
        let expected = [
            "{",
            r#"  "content": "{\"qty\":2}","#,
            r#"  "headers": {"#,
            r#"    "accept": "*/*","#,
            r#"    "user-agent": "tests""#,
            "  },",
            r#"  "method": "POST","#,
            r#"  "url": "/orders?id=(1)""#,
            "}",
        ]
        .join("\n");
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_empty_headers_render_as_braces() {
        let rendered = record(&[]).to_canonical_string();
        assert!(rendered.contains("\"headers\": {},"));
    }

    #[test]
    fn test_header_insertion_order_does_not_matter() {
        let a = record(&[("b", "2"), ("a", "1")]);
        let b = record(&[("a", "1"), ("b", "2")]);
        assert_eq!(a.to_canonical_string(), b.to_canonical_string());
    }

    #[test]
    fn test_render_scalars_and_arrays() {
        assert_eq!(render_canonical(&json!(null)), "null");
        assert_eq!(render_canonical(&json!(12)), "12");
        assert_eq!(render_canonical(&json!([])), "[]");
        assert_eq!(render_canonical(&json!([1, "a"])), "[\n  1,\n  \"a\"\n]");
        assert_eq!(
            render_canonical(&json!({"z": {"y": true}})),
            "{\n  \"z\": {\n    \"y\": true\n  }\n}"
        );
    }

    #[test]
    fn test_memory_sink_collects_records() {
        let sink = MemorySink::new();
        sink.log(&record(&[]));
        sink.log(&record(&[("a", "1")]));
        assert_eq!(sink.lines().len(), 2);
        sink.clear();
        assert!(sink.lines().is_empty());
    }
}
