//! Request handling independent of the transport.

use super::headers::filter_headers;
use super::matcher::RuleSet;
use super::normalize::{normalize_content, normalize_url};
use super::record::{RequestRecord, RequestSink, StdoutSink};
use crate::response::{synthesize, SynthesisError, SynthesizedResponse};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A completed request as handed over by the transport.
///
/// Header names are lower-case; repeated headers are joined with `", "`.
#[derive(Debug, Clone, Default)]
pub struct IncomingRequest {
    pub method: String,
    /// Path and query string as sent by the client.
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl IncomingRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Declared `Accept-Encoding`, or empty.
    pub fn accept_encoding(&self) -> &str {
        self.headers
            .get("accept-encoding")
            .or_else(|| self.headers.get("Accept-Encoding"))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// The rule engine: logs each request and turns the matching rule into a response.
pub struct Engine {
    rules: RuleSet,
    sink: Arc<dyn RequestSink>,
}

impl Engine {
    pub fn new(rules: RuleSet, sink: Arc<dyn RequestSink>) -> Self {
        Self { rules, sink }
    }

    /// Engine logging to stdout.
    pub fn with_stdout(rules: RuleSet) -> Self {
        Self::new(rules, Arc::new(StdoutSink))
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Normalized URL and body with the loggable subset of headers.
    pub fn describe(&self, request: &IncomingRequest) -> RequestRecord {
        RequestRecord {
            method: request.method.clone(),
            url: normalize_url(&request.url),
            headers: filter_headers(&self.rules, &request.headers, &request.url, &request.method),
            content: normalize_content(&request.body),
        }
    }

    /// Log the request, then answer it from the first matching rule.
    ///
    /// Matching sees the raw url, method and headers, never the normalized ones.
    pub fn handle(
        &self,
        request: &IncomingRequest,
    ) -> Result<SynthesizedResponse, SynthesisError> {
        self.sink.log(&self.describe(request));

        let rule = self
            .rules
            .find_matching_rule(&request.url, &request.method, &request.headers);
        debug!("Response rule: {:?}", rule);

        synthesize(rule, request.accept_encoding())
    }
}
