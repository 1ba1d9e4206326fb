//! HTTP proxy server module.
//!
//! This module provides the frontend-facing API that validates requests,
//! forwards them to a provider and normalizes the reply.

mod handlers;
pub mod normalize;
pub mod retry;
mod server;
pub mod tools;
pub mod types;

pub use handlers::{
    GEMINI_KEY_HEADER, REPLICATE_TOKEN_HEADER, SENSAY_KEY_HEADER, SENSAY_USER_HEADER,
};
pub use server::{create_router, run_server, AppState, RequestId, REQUEST_ID_HEADER};
pub use types::{Envelope, EnvelopeOutput, EnvelopeStatus, FunctionCallOutput};
