//! SSE response body -> token stream adapter.
//!
//! `eventsource-stream` handles the transport framing: buffering partial
//! frames across packet boundaries, stripping the `data:` prefix, joining
//! multi-line data, and ignoring comments and unknown fields. This module
//! layers the completion-API semantics on top: the `[DONE]` sentinel,
//! `finish_reason` end-of-stream, skip-and-log for unparsable payloads, and
//! cooperative cancellation checked at every frame.

use async_stream::stream;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Response;
use tokio_util::sync::CancellationToken;

use chat_core::PartialTranscript;

use crate::error::LlmError;
use crate::protocol::{StreamChunk, StreamEvent, TokenStream};

pub(crate) fn token_stream(
    response: Response,
    cancel: CancellationToken,
    transcript: PartialTranscript,
) -> TokenStream {
    let stream = stream! {
        let mut events = response.bytes_stream().eventsource();

        loop {
            // Checked before each frame; triggering it aborts the transport
            // read rather than waiting for more data.
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                event = events.next() => Some(event),
            };

            let Some(event) = next else {
                yield Err(LlmError::Cancelled {
                    partial: transcript.snapshot(),
                });
                break;
            };

            let Some(event) = event else {
                log::debug!("stream closed by server without [DONE]");
                break;
            };

            let event = match event {
                Ok(event) => event,
                Err(error) => {
                    yield Err(LlmError::Stream {
                        message: error.to_string(),
                        partial: transcript.snapshot(),
                    });
                    break;
                }
            };

            let data = event.data.trim().to_string();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                yield Ok(StreamEvent::Done {
                    finish_reason: None,
                    usage: None,
                });
                break;
            }

            let chunk: StreamChunk = match serde_json::from_str(&data) {
                Ok(chunk) => chunk,
                Err(error) => {
                    log::warn!("skipping unparsable stream payload: {error}");
                    continue;
                }
            };

            let usage = chunk.usage;
            let (delta, finish_reason) = match chunk.choices.into_iter().next() {
                Some(choice) => (
                    choice.delta.content.unwrap_or_default(),
                    choice.finish_reason,
                ),
                None => (String::new(), None),
            };

            if !delta.is_empty() {
                // Append before emitting so a cancellation observed by the
                // consumer can always recover everything it was handed.
                transcript.append(&delta);
                yield Ok(StreamEvent::Token(delta));
            }

            // finish_reason ends the stream even without a [DONE] frame.
            if finish_reason.is_some() {
                yield Ok(StreamEvent::Done { finish_reason, usage });
                break;
            }
        }
    };

    Box::pin(stream)
}
