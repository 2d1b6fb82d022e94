//! wikichat-api: Wire types and HTTP client for the wikichat backend
//!
//! This crate covers everything that crosses the network boundary: the
//! session-creation call, the server-push reply stream, and the simpler
//! non-streaming query endpoint.

pub mod client;
pub mod error;
pub mod stream;
pub mod types;

pub use client::{ChatBackend, ChatClient, Endpoints};
pub use error::{Error, Result};
pub use stream::{EventStream, decode_event};
pub use types::*;
