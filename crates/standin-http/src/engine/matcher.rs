//! First-match rule lookup.
//!
//! Rules are tried in declaration order. A rule applies when its method, its anchored
//! `urlFilter` and every `headersFilter` entry agree with the request.

use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

use crate::config::{ConfigError, Rule};

/// A rule with its `urlFilter` compiled into an anchored regex.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub index: usize,
    pub url_pattern: Regex,
    pub rule: Rule,
}

impl CompiledRule {
    /// An empty `urlFilter` accepts every path.
    pub fn compile(index: usize, rule: Rule) -> Result<Self, ConfigError> {
        let pattern = if rule.url_filter.is_empty() {
            "^.*$".to_string()
        } else {
            format!("^/?{}$", rule.url_filter)
        };
        let url_pattern = Regex::new(&pattern)
            .map_err(|source| ConfigError::InvalidUrlFilter { index, source })?;
        Ok(CompiledRule {
            index,
            url_pattern,
            rule,
        })
    }

    /// Method, path and header predicates; `path` must already have its query stripped.
    pub fn matches(&self, path: &str, method: &str, headers: &HashMap<String, String>) -> bool {
        let method_match = self.rule.method.is_empty() || self.rule.method == method;
        if !method_match || !self.url_pattern.is_match(path) {
            return false;
        }

        match &self.rule.headers_filter {
            None => true,
            Some(filter) => filter
                .iter()
                .all(|(name, expected)| headers.get(name) == Some(expected)),
        }
    }
}

/// Ordered, read-only rule list plus the built-in fallback rule.
///
/// Built once at startup; lookups are pure and may run any number of times per
/// request.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
    default_rule: Rule,
}

impl RuleSet {
    pub fn compile(rules: Vec<Rule>) -> Result<Self, ConfigError> {
        let rules = rules
            .into_iter()
            .enumerate()
            .map(|(i, rule)| CompiledRule::compile(i, rule))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RuleSet {
            rules,
            default_rule: Rule::default_rule(),
        })
    }

    pub fn empty() -> Self {
        RuleSet {
            rules: Vec::new(),
            default_rule: Rule::default_rule(),
        }
    }

    /// First rule in declaration order accepting the request, or the default rule.
    pub fn find_matching_rule(
        &self,
        url: &str,
        method: &str,
        headers: &HashMap<String, String>,
    ) -> &Rule {
        self.find_configured_rule(url, method, headers)
            .map(|compiled| &compiled.rule)
            .unwrap_or(&self.default_rule)
    }

    fn find_configured_rule(
        &self,
        url: &str,
        method: &str,
        headers: &HashMap<String, String>,
    ) -> Option<&CompiledRule> {
        let path = strip_query(url);
        let found = self
            .rules
            .iter()
            .find(|compiled| compiled.matches(path, method, headers));

        match found {
            Some(compiled) => debug!("{} {} matched rule {}", method, url, compiled.index),
            None => debug!("{} {} matched no rule", method, url),
        }
        found
    }

    pub fn default_rule(&self) -> &Rule {
        &self.default_rule
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(rules: serde_json::Value) -> RuleSet {
        let rules = crate::config::rules_from_value(&rules).unwrap();
        RuleSet::compile(rules).unwrap()
    }

    fn no_headers() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_strip_query() {
        assert_eq!(strip_query("/api?x=1"), "/api");
        assert_eq!(strip_query("/api"), "/api");
        assert_eq!(strip_query("?only"), "");
    }

    #[test]
    fn test_url_filter_is_anchored() {
        let set = compile(json!([{"urlFilter": "api", "response": "hit"}]));
        assert_eq!(set.find_matching_rule("/api", "GET", &no_headers()).response, "hit");
        assert_eq!(set.find_matching_rule("api", "GET", &no_headers()).response, "hit");
        assert_eq!(
            set.find_matching_rule("/api/v1", "GET", &no_headers()).response,
            "No rule was matched."
        );
        assert_eq!(
            set.find_matching_rule("/xapi", "GET", &no_headers()).response,
            "No rule was matched."
        );
    }

    #[test]
    fn test_query_string_ignored_for_matching() {
        let set = compile(json!([{"urlFilter": "search", "response": "hit"}]));
        assert_eq!(
            set.find_matching_rule("/search?q=rust", "GET", &no_headers()).response,
            "hit"
        );
    }

    #[test]
    fn test_regex_url_filter() {
        let set = compile(json!([{"urlFilter": r"users/\d+", "response": "user"}]));
        assert_eq!(
            set.find_matching_rule("/users/42", "GET", &no_headers()).response,
            "user"
        );
        assert_eq!(
            set.find_matching_rule("/users/abc", "GET", &no_headers()).response,
            "No rule was matched."
        );
    }

    #[test]
    fn test_method_is_exact_and_case_sensitive() {
        let set = compile(json!([{"method": "POST", "response": "posted"}]));
        assert_eq!(set.find_matching_rule("/", "POST", &no_headers()).response, "posted");
        assert_eq!(
            set.find_matching_rule("/", "post", &no_headers()).response,
            "No rule was matched."
        );
        assert_eq!(
            set.find_matching_rule("/", "GET", &no_headers()).response,
            "No rule was matched."
        );
    }

    #[test]
    fn test_first_declared_rule_wins() {
        let set = compile(json!([
            {"response": "catch-all"},
            {"urlFilter": "specific", "response": "specific"}
        ]));
        assert_eq!(
            set.find_matching_rule("/specific", "GET", &no_headers()).response,
            "catch-all"
        );
        assert_eq!(
            set.find_matching_rule("/anything/else", "DELETE", &no_headers()).response,
            "catch-all"
        );
    }

    #[test]
    fn test_headers_filter_requires_every_entry() {
        let set = compile(json!([{
            "headersFilter": {"x-env": "staging", "x-team": "core"},
            "response": "filtered"
        }]));

        let mut headers = HashMap::new();
        headers.insert("x-env".to_string(), "staging".to_string());
        assert_eq!(
            set.find_matching_rule("/", "GET", &headers).response,
            "No rule was matched."
        );

        headers.insert("x-team".to_string(), "core".to_string());
        assert_eq!(set.find_matching_rule("/", "GET", &headers).response, "filtered");

        headers.insert("x-team".to_string(), "other".to_string());
        assert_eq!(
            set.find_matching_rule("/", "GET", &headers).response,
            "No rule was matched."
        );
    }

    #[test]
    fn test_headers_filter_falls_through_to_next_rule() {
        let set = compile(json!([
            {"headersFilter": {"x-env": "staging"}, "response": "staging"},
            {"response": "fallback"}
        ]));

        let mut headers = HashMap::new();
        headers.insert("x-env".to_string(), "prod".to_string());
        assert_eq!(set.find_matching_rule("/", "GET", &headers).response, "fallback");
        assert_eq!(
            set.find_matching_rule("/", "GET", &no_headers()).response,
            "fallback"
        );
    }

    #[test]
    fn test_empty_url_filter_matches_any_path() {
        let set = compile(json!([{"response": "any"}]));
        for url in ["/", "", "/users", "/x/y?z=1", "/a%2Fb"] {
            assert_eq!(
                set.find_matching_rule(url, "GET", &no_headers()).response,
                "any",
                "{}",
                url
            );
        }
    }

    #[test]
    fn test_empty_headers_filter_matches() {
        let set = compile(json!([{"headersFilter": {}, "response": "open"}]));
        assert_eq!(set.find_matching_rule("/", "GET", &no_headers()).response, "open");
    }

    #[test]
    fn test_invalid_url_filter_is_reported() {
        let rules = crate::config::rules_from_value(&json!([
            {"urlFilter": "ok"},
            {"urlFilter": "broken("}
        ]))
        .unwrap();
        let err = RuleSet::compile(rules).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrlFilter { index: 1, .. }));
    }

    #[test]
    fn test_empty_rule_set_uses_default() {
        let set = RuleSet::empty();
        assert!(set.is_empty());
        let rule = set.find_matching_rule("/whatever", "GET", &no_headers());
        assert_eq!(rule, set.default_rule());
        assert_eq!(rule.status, 200);
    }
}
