use bytes::Bytes;
use http_body_util::Full;
use hyper::http::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Response, StatusCode};
use std::str::FromStr;
use tracing::warn;

use super::SynthesizedResponse;

/// Converts a synthesized response into a hyper response.
///
/// Header names or values hyper refuses are skipped with a warning rather than
/// failing the whole response.
pub struct ResponseBuilder {
    status: StatusCode,
    body: Bytes,
    headers: HeaderMap,
}

impl ResponseBuilder {
    pub fn new(status_code: u16) -> Self {
        let status = StatusCode::from_u16(status_code).unwrap_or_else(|_| {
            warn!("Invalid status code {}, answering 500", status_code);
            StatusCode::INTERNAL_SERVER_ERROR
        });
        ResponseBuilder {
            status,
            body: Bytes::new(),
            headers: HeaderMap::new(),
        }
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!("Skipping invalid response header {:?}: {:?}", name, value),
        }
        self
    }

    pub fn merge_headers<'a, H>(mut self, headers: H) -> Self
    where
        H: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (name, value) in headers {
            self = self.header(name, value);
        }
        self
    }

    pub fn build_full(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        response.headers_mut().extend(self.headers);
        response
    }
}

impl From<SynthesizedResponse> for Response<Full<Bytes>> {
    fn from(synthesized: SynthesizedResponse) -> Self {
        ResponseBuilder::new(synthesized.status)
            .merge_headers(&synthesized.headers)
            .body(synthesized.body)
            .build_full()
    }
}
