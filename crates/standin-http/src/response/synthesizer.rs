//! Turning a matched rule into the bytes sent back.

use super::charset::transcode;
use super::SynthesisError;
use crate::config::Rule;
use bytes::Bytes;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::io::Write;

static GZIP_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bgzip\b").unwrap_or_else(|e| panic!("invalid built-in regex: {e}")));
static DEFLATE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bdeflate\b").unwrap_or_else(|e| panic!("invalid built-in regex: {e}"))
});

/// Compression picked from the request's `Accept-Encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    Gzip,
    Deflate,
}

impl ContentCoding {
    /// gzip wins over deflate whenever both are offered; quality values are ignored.
    pub fn negotiate(accept_encoding: &str) -> Option<Self> {
        if GZIP_TOKEN.is_match(accept_encoding) {
            Some(ContentCoding::Gzip)
        } else if DEFLATE_TOKEN.is_match(accept_encoding) {
            Some(ContentCoding::Deflate)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCoding::Gzip => "gzip",
            ContentCoding::Deflate => "deflate",
        }
    }

    /// `deflate` is the zlib-wrapped format, as browsers expect.
    pub fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            ContentCoding::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            ContentCoding::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
        }
    }
}

/// Status, headers and body ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl SynthesizedResponse {
    /// Header lookup ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Build the response for `rule`.
///
/// Body policy, first applicable wins: transcode into `rule.encoding`, gzip, deflate,
/// plain UTF-8. An empty `rule.response` skips all of them. Any failure leaves nothing
/// half-built; the caller must abort the request.
pub fn synthesize(
    rule: &Rule,
    accept_encoding: &str,
) -> Result<SynthesizedResponse, SynthesisError> {
    let mut headers = rule.headers.clone();

    if rule.response.is_empty() {
        return Ok(SynthesizedResponse {
            status: rule.status,
            headers,
            body: Bytes::new(),
        });
    }

    let body = if !rule.encoding.is_empty() {
        transcode(&rule.response, &rule.encoding)?
    } else if let Some(coding) = ContentCoding::negotiate(accept_encoding) {
        set_content_encoding(&mut headers, coding);
        coding
            .compress(rule.response.as_bytes())
            .map_err(SynthesisError::Compression)?
    } else {
        rule.response.clone().into_bytes()
    };

    Ok(SynthesizedResponse {
        status: rule.status,
        headers,
        body: Bytes::from(body),
    })
}

/// The configured length no longer holds once the body is compressed.
fn set_content_encoding(headers: &mut HashMap<String, String>, coding: ContentCoding) {
    headers.retain(|name, _| {
        !name.eq_ignore_ascii_case("content-length")
            && !name.eq_ignore_ascii_case("content-encoding")
    });
    headers.insert("Content-Encoding".to_string(), coding.as_str().to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::{GzDecoder, ZlibDecoder};
    use serde_json::json;
    use std::io::Read;

    fn rule(value: serde_json::Value) -> Rule {
        Rule::normalize(&value)
    }

    fn gunzip(data: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(data).read_to_string(&mut out).unwrap();
        out
    }

    fn inflate(data: &[u8]) -> String {
        let mut out = String::new();
        ZlibDecoder::new(data).read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_negotiate() {
        assert_eq!(ContentCoding::negotiate("gzip"), Some(ContentCoding::Gzip));
        assert_eq!(
            ContentCoding::negotiate("gzip, deflate"),
            Some(ContentCoding::Gzip)
        );
        assert_eq!(
            ContentCoding::negotiate("deflate, gzip;q=0.1"),
            Some(ContentCoding::Gzip)
        );
        assert_eq!(ContentCoding::negotiate("deflate"), Some(ContentCoding::Deflate));
        assert_eq!(ContentCoding::negotiate("x-gzipped, br"), None);
        assert_eq!(ContentCoding::negotiate(""), None);
    }

    #[test]
    fn test_plain_body() {
        let response = synthesize(&rule(json!({"status": 201, "response": "hello"})), "").unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.body, Bytes::from("hello"));
        assert!(response.header("Content-Encoding").is_none());
    }

    #[test]
    fn test_gzip_preferred_over_deflate() {
        let r = rule(json!({
            "response": "compressed body",
            "headers": {"Content-Length": "15", "X-Kept": "yes"}
        }));
        let response = synthesize(&r, "gzip, deflate").unwrap();

        assert_eq!(response.header("Content-Encoding"), Some("gzip"));
        assert!(response.header("Content-Length").is_none());
        assert_eq!(response.header("X-Kept"), Some("yes"));
        assert_eq!(gunzip(&response.body), "compressed body");
    }

    #[test]
    fn test_deflate() {
        let response = synthesize(&rule(json!({"response": "deflated"})), "deflate").unwrap();
        assert_eq!(response.header("Content-Encoding"), Some("deflate"));
        assert_eq!(inflate(&response.body), "deflated");
    }

    #[test]
    fn test_explicit_encoding_bypasses_compression() {
        let r = rule(json!({"response": "café", "encoding": "latin1"}));
        let response = synthesize(&r, "gzip").unwrap();

        assert!(response.header("Content-Encoding").is_none());
        assert_eq!(response.body.as_ref(), &[b'c', b'a', b'f', 0xE9]);
    }

    #[test]
    fn test_empty_response_skips_encoding() {
        let r = rule(json!({
            "status": 204,
            "encoding": "not-a-charset",
            "headers": {"Content-Length": "0"}
        }));
        let response = synthesize(&r, "gzip").unwrap();

        assert_eq!(response.status, 204);
        assert!(response.body.is_empty());
        assert_eq!(response.header("content-length"), Some("0"));
        assert!(response.header("Content-Encoding").is_none());
    }

    #[test]
    fn test_rule_headers_not_mutated() {
        let r = rule(json!({"response": "x", "headers": {"Content-Length": "1"}}));
        let _ = synthesize(&r, "gzip").unwrap();
        assert_eq!(r.headers.get("Content-Length"), Some(&"1".to_string()));
        assert!(!r.headers.contains_key("Content-Encoding"));
    }

    #[test]
    fn test_unknown_charset_fails() {
        let r = rule(json!({"response": "x", "encoding": "not-a-charset"}));
        assert!(matches!(
            synthesize(&r, ""),
            Err(SynthesisError::UnknownCharset(_))
        ));
    }
}
