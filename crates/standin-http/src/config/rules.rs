//! Rule model and normalization of raw rule configuration.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Body of the built-in rule returned when nothing else matches.
pub const NO_MATCH_RESPONSE: &str = "No rule was matched.";

/// Headers left out of the logged request view unless a rule says otherwise.
pub const DEFAULT_IGNORED_HEADERS: &[&str] = &["accept-encoding"];

const DEFAULT_STATUS: u16 = 200;

/// One normalized match-and-respond rule.
///
/// Built through [`Rule::normalize`], so every field already holds its default and
/// `response` is always text.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub status: u16,
    /// Empty matches any method.
    pub method: String,
    /// Regex fragment, anchored as `^/?<url_filter>$` by the matcher.
    pub url_filter: String,
    pub headers_filter: Option<HashMap<String, String>>,
    pub response: String,
    /// Charset the body is transcoded into. Empty means content negotiation.
    pub encoding: String,
    pub ignored_headers: Vec<String>,
    pub headers: HashMap<String, String>,
}

/// Raw rule as it appears in the configuration file.
///
/// Every field is kept as an untyped JSON value so that normalization never fails on
/// malformed input; odd values fall back to their defaults instead.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRule {
    #[serde(default)]
    status: Value,
    #[serde(default)]
    method: Value,
    #[serde(default)]
    url_filter: Value,
    #[serde(default)]
    headers_filter: Value,
    #[serde(default)]
    response: Value,
    #[serde(default)]
    encoding: Value,
    #[serde(default)]
    ignored_headers: Value,
    #[serde(default)]
    headers: Value,
}

impl Rule {
    /// Normalize one raw configuration entry into a rule.
    ///
    /// Total over any JSON value: a non-object entry yields an all-defaults rule.
    pub fn normalize(raw: &Value) -> Self {
        let raw: RawRule = serde_json::from_value(raw.clone()).unwrap_or_default();
        raw.into()
    }

    /// The rule used when no configured rule matches a request.
    pub fn default_rule() -> Self {
        Rule::normalize(&serde_json::json!({
            "status": DEFAULT_STATUS,
            "response": NO_MATCH_RESPONSE,
            "urlFilter": "",
        }))
    }

    /// Whether `header_name` is excluded from the logged view while this rule applies.
    pub fn ignores_header(&self, header_name: &str) -> bool {
        self.ignored_headers.iter().any(|h| h == header_name)
    }
}

impl From<RawRule> for Rule {
    fn from(raw: RawRule) -> Self {
        Rule {
            status: parse_status(&raw.status),
            method: string_or_empty(&raw.method),
            url_filter: string_or_empty(&raw.url_filter),
            headers_filter: match raw.headers_filter {
                Value::Object(_) => Some(string_map(&raw.headers_filter)),
                _ => None,
            },
            response: response_text(&raw.response),
            encoding: string_or_empty(&raw.encoding),
            ignored_headers: match raw.ignored_headers {
                Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
                _ => DEFAULT_IGNORED_HEADERS
                    .iter()
                    .map(|h| h.to_string())
                    .collect(),
            },
            headers: string_map(&raw.headers),
        }
    }
}

/// Falsy-aware truthiness for configuration values: `null`, `false`, `0` and `""`
/// count as "not configured".
fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Status from a number or a leading-digits string; anything else is 200.
fn parse_status(value: &Value) -> u16 {
    if is_unset(value) {
        return DEFAULT_STATUS;
    }
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.trunc() as u64))
            .and_then(|n| u16::try_from(n).ok())
            .unwrap_or(DEFAULT_STATUS),
        Value::String(s) => {
            let digits: String = s
                .trim_start()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse::<u16>().unwrap_or(DEFAULT_STATUS)
        }
        _ => DEFAULT_STATUS,
    }
}

fn string_or_empty(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

/// Body text: strings verbatim, unset values empty, everything else as compact JSON
/// text with object keys in configured order.
fn response_text(value: &Value) -> String {
    if is_unset(value) {
        return String::new();
    }
    match value {
        Value::String(s) => s.clone(),
        other => integral_numbers(other).to_string(),
    }
}

/// Whole floats written as integers, so `10.0` is sent as `10`.
fn integral_numbers(value: &Value) -> Value {
    match value {
        Value::Number(n) => integral_number(n)
            .map(Value::from)
            .unwrap_or_else(|| value.clone()),
        Value::Array(items) => Value::Array(items.iter().map(integral_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), integral_numbers(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn integral_number(n: &serde_json::Number) -> Option<i64> {
    if !n.is_f64() {
        return None;
    }
    n.as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(
            integral_number(n)
                .map(|i| i.to_string())
                .unwrap_or_else(|| n.to_string()),
        ),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn string_map(value: &Value) -> HashMap<String, String> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter_map(|(k, v)| scalar_text(v).map(|v| (k.clone(), v)))
            .collect(),
        _ => HashMap::new(),
    }
}
