//! Transcode service abstraction.
//!
//! This module provides a `JobClient` trait for the external transcoding
//! service. It is the only component that speaks the service's protocol.

mod http;
mod types;

pub use http::HttpJobClient;
pub use types::*;
