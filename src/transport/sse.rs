//! Server-sent event decoding for streamed model responses (Bytes -> text deltas).

use crate::error_code::ProviderErrorKind;
use crate::{BoxStream, Error, Result};
use bytes::Bytes;
use futures::{stream, StreamExt};
use serde_json::Value;

const DONE_SIGNAL: &str = "[DONE]";

/// What a single SSE frame means for the text stream.
#[derive(Debug, PartialEq)]
pub(crate) enum Frame {
    Text(String),
    Skip,
    Stop,
}

/// Interpret one frame (the text between blank-line delimiters).
pub(crate) fn parse_frame(frame: &str) -> Result<Frame> {
    let data: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect();
    if data.is_empty() {
        return Ok(Frame::Skip);
    }
    let payload = data.join("\n");
    let payload = payload.trim();
    if payload == DONE_SIGNAL {
        return Ok(Frame::Stop);
    }

    // Ignore non-JSON keep-alives.
    let Ok(event) = serde_json::from_str::<Value>(payload) else {
        return Ok(Frame::Skip);
    };

    match event.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => {
            let text = event
                .pointer("/delta/text")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if text.is_empty() {
                Ok(Frame::Skip)
            } else {
                Ok(Frame::Text(text.to_string()))
            }
        }
        Some("message_stop") => Ok(Frame::Stop),
        Some("error") => Err(stream_error(&event)),
        _ => Ok(Frame::Skip),
    }
}

fn stream_error(event: &Value) -> Error {
    let code = event
        .pointer("/error/type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let message = event
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or("stream error")
        .to_string();
    let kind = ProviderErrorKind::from_provider_code(code).unwrap_or(ProviderErrorKind::StreamError);
    Error::provider(kind, message)
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

fn strip_carriage_returns(buf: &mut Vec<u8>) {
    let mut out = Vec::with_capacity(buf.len());
    let mut iter = buf.iter().copied().peekable();
    while let Some(b) = iter.next() {
        if b == b'\r' && iter.peek() == Some(&b'\n') {
            continue;
        }
        out.push(b);
    }
    *buf = out;
}

/// Turn a raw byte stream into a stream of text deltas.
///
/// Frames are split on blank lines; the stream ends at `message_stop`, at
/// `[DONE]`, or at EOF. An `error` event yields one `Err` and ends the stream.
/// Bytes are buffered until a frame is complete, so multi-byte characters
/// split across network chunks decode intact.
pub fn decode_text_deltas(input: BoxStream<'static, Bytes>) -> BoxStream<'static, String> {
    let stream = stream::unfold(
        Some((input, Vec::<u8>::new())),
        |state| async move {
            let (mut input, mut buf) = state?;
            loop {
                if let Some(idx) = find_delimiter(&buf) {
                    let frame: Vec<u8> = buf.drain(..idx + 2).take(idx).collect();
                    match parse_frame(&String::from_utf8_lossy(&frame)) {
                        Ok(Frame::Text(text)) => return Some((Ok(text), Some((input, buf)))),
                        Ok(Frame::Skip) => continue,
                        Ok(Frame::Stop) => return None,
                        Err(e) => return Some((Err(e), None)),
                    }
                }

                match input.next().await {
                    Some(Ok(bytes)) => {
                        buf.extend_from_slice(&bytes);
                        if buf.contains(&b'\r') {
                            strip_carriage_returns(&mut buf);
                        }
                    }
                    Some(Err(e)) => return Some((Err(e), None)),
                    None => {
                        // EOF: a trailing frame may lack its delimiter.
                        return match parse_frame(&String::from_utf8_lossy(&buf)) {
                            Ok(Frame::Text(text)) => Some((Ok(text), None)),
                            Ok(_) => None,
                            Err(e) => Some((Err(e), None)),
                        };
                    }
                }
            }
        },
    );
    Box::pin(stream)
}
