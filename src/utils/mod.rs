//! Utility modules.
//!
//! - [`HttpClient`]: shared reqwest client with timeouts and default headers
//! - [`args`]: typed accessors for JSON tool and prompt arguments

pub mod args;
mod http;

pub use http::{HttpClient, USER_AGENT};
