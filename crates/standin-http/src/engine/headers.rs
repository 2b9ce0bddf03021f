//! Header filtering for the logged request view.
//!
//! Filtering never influences matching. It only keeps transport noise and
//! rule-specific volatile headers out of the request log.

use super::matcher::RuleSet;
use std::collections::{BTreeMap, HashMap};

/// Headers that never appear in the log.
pub const ALWAYS_FILTERED: &[&str] = &["host", "connection", "expect"];

/// Whether `header_name` is left out of the log for this request.
///
/// The applicable rule is re-derived from the raw url, method and headers on every
/// call; the matcher is pure, so this needs no per-request state.
pub fn should_filter_header(
    rules: &RuleSet,
    header_name: &str,
    header_value: &str,
    request_url: &str,
    request_method: &str,
    headers: &HashMap<String, String>,
) -> bool {
    if ALWAYS_FILTERED.contains(&header_name) {
        return true;
    }
    if header_name == "content-length" && header_value == "0" {
        return true;
    }

    rules
        .find_matching_rule(request_url, request_method, headers)
        .ignores_header(header_name)
}

/// The headers worth logging, keyed and valued exactly as received.
pub fn filter_headers(
    rules: &RuleSet,
    headers: &HashMap<String, String>,
    request_url: &str,
    request_method: &str,
) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, value)| {
            !should_filter_header(rules, name, value, request_url, request_method, headers)
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
