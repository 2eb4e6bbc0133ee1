//! # pillbox-vision
//!
//! Client for the external vision chat-completion API plus the reply
//! extractor that turns its free-form output into structured fields.
//!
//! Works with any OpenAI-compatible chat-completions endpoint that accepts
//! inline base64 images, including:
//!
//! - OpenAI cloud API
//! - Doubao / ark-style gateways
//! - Ollama (in OpenAI compatibility mode)
//! - vLLM, LocalAI, LM Studio
//!
//! # Example
//!
//! ```rust,no_run
//! use pillbox_vision::{extract, VisionClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = VisionClient::from_env().unwrap();
//!     let images = vec![std::fs::read("front.jpg").unwrap()];
//!     let reply = client.analyze(&images).await.unwrap();
//!     let analysis = extract(&reply);
//!     println!("{:?}", analysis.expiry_date);
//! }
//! ```

mod client;
mod extract;
mod sse;
mod types;

pub use client::{VisionClient, VisionConfig};
pub use extract::extract;
pub use sse::assemble_sse_reply;
pub use types::*;
