//! Standin: a rule-driven HTTP stand-in for test suites.
//!
//! Incoming requests are matched against an ordered list of rules loaded once at
//! startup. The first matching rule decides the scripted response, and every request
//! is logged as a normalized, key-sorted record so test suites can diff what the
//! server received.

// ===== Rule model and configuration =====
pub mod config;

// ===== Matching, normalization and request logging =====
pub mod engine;

// ===== Response synthesis (charset transcoding, compression) =====
pub mod response;

// ===== HTTP transport =====
pub mod server;

pub use config::{load_rules, ConfigError, Rule, ServerConfig};
pub use engine::{Engine, IncomingRequest, RequestRecord, RequestSink, RuleSet};
pub use response::{synthesize, SynthesisError, SynthesizedResponse};
pub use server::StandinServer;
