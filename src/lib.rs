//! llm-relay - a frontend-facing proxy for hosted and local AI models
//!
//! This library provides the core functionality for the relay: configuration,
//! provider clients for Replicate, Gemini and Ollama, and the HTTP endpoints
//! that translate between them and a single response envelope.

pub mod config;
pub mod error;
pub mod providers;
pub mod proxy;

pub use config::Config;
pub use error::Error;
