//! Rule resolution for incoming requests.
//!
//! This module provides:
//! - `RuleSet`: the ordered, read-only rule list and first-match lookup
//! - `Engine`: logs each request and answers it from the matching rule
//! - `RequestRecord` / `RequestSink`: the canonical request log
//!
//! ## Module Structure
//!
//! - `normalize`: percent-encoding normalization for URLs and bodies
//! - `matcher`: compiled rules and the first-match lookup
//! - `headers`: which headers are left out of the request log
//! - `record`: canonical rendering and log sinks
//! - `core`: the transport-independent request handler

mod core;
mod headers;
mod matcher;
mod normalize;
mod record;


pub use self::core::{Engine, IncomingRequest};
pub use headers::{filter_headers, should_filter_header, ALWAYS_FILTERED};
pub use matcher::{CompiledRule, RuleSet};
pub use normalize::{normalize_content, normalize_text, normalize_url};
pub use record::{render_canonical, MemorySink, RequestRecord, RequestSink, StdoutSink};
