//! Response synthesis: charset transcoding, content negotiation and compression.

mod builder;
mod charset;
mod synthesizer;

use thiserror::Error;

pub use builder::ResponseBuilder;
pub use charset::transcode;
pub use synthesizer::{synthesize, ContentCoding, SynthesizedResponse};

/// A response that cannot be produced. Never recovered from: the request is aborted.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Encoding not recognized: '{0}'")]
    UnknownCharset(String),
    #[error("Compression failed: {0}")]
    Compression(#[source] std::io::Error),
}
