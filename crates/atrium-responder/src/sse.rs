// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE parser for the responder streaming protocol.
//!
//! Events: `delta` (`{"text"}`), `source` (any JSON), `fallback`,
//! `handoff` (`{"reason"}`, optional), `error` (`{"message"}`) and `done`.
//! Unknown event names and `ping` are skipped.

use atrium_core::AtriumError;
use atrium_core::traits::responder::{ResponderEvent, ResponderStream};
use eventsource_stream::Eventsource;
use futures::stream::StreamExt;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct DeltaData {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct HandoffData {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    message: String,
}

fn unavailable(message: String, source: Option<serde_json::Error>) -> AtriumError {
    AtriumError::ResponderUnavailable {
        message,
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    }
}

/// Maps one SSE event to a responder event. `None` skips it.
fn parse_event(event: &str, data: &str) -> Option<Result<ResponderEvent, AtriumError>> {
    let parsed = match event {
        "delta" => serde_json::from_str::<DeltaData>(data)
            .map(|d| ResponderEvent::Delta(d.text))
            .map_err(|e| unavailable(format!("malformed delta event: {e}"), Some(e))),
        "source" => serde_json::from_str::<serde_json::Value>(data)
            .map(ResponderEvent::Source)
            .map_err(|e| unavailable(format!("malformed source event: {e}"), Some(e))),
        "fallback" => Ok(ResponderEvent::Fallback),
        "handoff" => {
            let handoff = if data.trim().is_empty() {
                HandoffData::default()
            } else {
                serde_json::from_str::<HandoffData>(data).unwrap_or_default()
            };
            Ok(ResponderEvent::Handoff {
                reason: handoff.reason,
            })
        }
        "error" => {
            let message = serde_json::from_str::<ErrorData>(data)
                .map(|e| e.message)
                .unwrap_or_else(|_| data.to_string());
            Err(unavailable(format!("responder reported: {message}"), None))
        }
        _ => return None,
    };
    Some(parsed)
}

/// Parses a streaming response into responder events, ending at `done`.
pub fn parse_reply_stream(response: reqwest::Response) -> ResponderStream {
    let events = response
        .bytes_stream()
        .eventsource()
        .take_while(|result| {
            let done = matches!(result, Ok(event) if event.event == "done");
            futures::future::ready(!done)
        })
        .filter_map(|result| async move {
            match result {
                Ok(event) => parse_event(&event.event, &event.data),
                Err(e) => Some(Err(unavailable(format!("SSE stream error: {e}"), None))),
            }
        });
    Box::pin(events)
}
