//! friday-rs: voice assistant relay server.
//!
//! Browser speech arrives as text, Gemini answers, and the reply is spoken
//! back with a voice chosen from the reply's detected emotion.

pub mod api;
pub mod config;
pub mod emotion;
pub mod error;
pub mod gemini;
pub mod history;
pub mod pipeline;
pub mod sanitize;
pub mod session;
pub mod speech;

pub use error::{Error, Result};
