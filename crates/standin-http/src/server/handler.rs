//! hyper glue: turns a hyper request into an [`IncomingRequest`] and back.

use crate::engine::{Engine, IncomingRequest};
use crate::response::SynthesisError;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{HeaderMap, Request, Response};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Failed to read request body: {0}")]
    Body(#[from] hyper::Error),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

/// Handle one request.
///
/// An error is returned to hyper as-is, which drops the connection without writing
/// a partial response.
pub async fn handle_request(
    req: Request<Incoming>,
    engine: Arc<Engine>,
) -> Result<Response<Full<Bytes>>, HandlerError> {
    let (parts, body) = req.into_parts();
    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    debug!("Handling request: {}", url);

    let body = body.collect().await?.to_bytes();

    let request = IncomingRequest {
        method: parts.method.as_str().to_string(),
        url,
        headers: header_map_to_hashmap(&parts.headers),
        body,
    };

    match engine.handle(&request) {
        Ok(synthesized) => Ok(synthesized.into()),
        Err(e) => {
            error!("Aborting {} {}: {}", request.method, request.url, e);
            Err(e.into())
        }
    }
}

/// Lower-case names; repeated headers joined with `", "`.
pub fn header_map_to_hashmap(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = HashMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    map
}
