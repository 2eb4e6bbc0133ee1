//! SSE reassembly for event-stream replies from the vision endpoint.
//!
//! Some upstreams answer a non-streaming chat-completion request with a
//! `text/event-stream` body anyway. The client buffers the whole body and
//! this module folds the `data:` chunks back into one logical reply string.

use tracing::debug;

use crate::types::ChatCompletionChunk;

/// Reassemble an SSE body into the concatenated reply content.
///
/// Malformed chunks are skipped, never fatal: a partial transcript still
/// gives the extractor something to work with.
pub fn assemble_sse_reply(body: &str) -> String {
    let mut content = String::new();

    for line in body.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };

        // End of stream marker
        if data == "[DONE]" {
            continue;
        }

        match serde_json::from_str::<ChatCompletionChunk>(data) {
            Ok(chunk) => {
                for choice in chunk.choices {
                    if let Some(c) = choice.delta.content {
                        content.push_str(&c);
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "skipping malformed SSE chunk");
            }
        }
    }

    content
}
