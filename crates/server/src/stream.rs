//! Streaming Envelope (C10): maps [`StreamEvent`]s from a channel onto
//! OpenAI chat-completion-chunk SSE frames.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use ragsvc_core::domain::{StreamEvent, StreamEventKind};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::Stream;

fn content_frame(text: &str) -> Event {
    let payload = json!({
        "choices": [{"delta": {"content": text}}]
    });
    Event::default().data(payload.to_string())
}

fn progress_frame(text: &str) -> Event {
    let payload = json!({
        "choices": [{"delta": {"role": "assistant", "reasoning_content": text}}]
    });
    Event::default().data(payload.to_string())
}

fn done_frame() -> Event {
    let payload = json!({
        "choices": [{"delta": {}, "finish_reason": "stop"}]
    });
    Event::default().data(payload.to_string())
}

fn terminator_frame() -> Event {
    Event::default().data("[DONE]")
}

/// Converts a channel of domain stream events into an SSE event stream.
/// Exactly one `done` frame is emitted (followed by the `[DONE]`
/// terminator), after which the stream ends — satisfied both on the
/// happy path and when an error arrives mid-stream, so the connection
/// is never left half-open.
pub fn to_sse_stream(
    mut rx: mpsc::Receiver<ragsvc_core::Result<StreamEvent>>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        while let Some(item) = rx.recv().await {
            match item {
                Ok(event) => {
                    let is_done = event.kind == StreamEventKind::Done;
                    let frame = match event.kind {
                        StreamEventKind::Content => content_frame(&event.text),
                        StreamEventKind::Progress => progress_frame(&event.text),
                        StreamEventKind::Done => done_frame(),
                    };
                    yield Ok(frame);
                    if is_done {
                        yield Ok(terminator_frame());
                        break;
                    }
                }
                Err(e) => {
                    yield Ok(content_frame(&format!("\n\n_Error: {e}_")));
                    yield Ok(done_frame());
                    yield Ok(terminator_frame());
                    break;
                }
            }
        }
    }
}

/// Wraps `to_sse_stream` into a full Axum response with the headers a
/// reverse proxy needs to avoid buffering the stream.
pub fn sse_response(rx: mpsc::Receiver<ragsvc_core::Result<StreamEvent>>) -> Response {
    let stream = to_sse_stream(rx);
    let sse = Sse::new(stream).keep_alive(KeepAlive::new().text(""));
    let mut response = sse.into_response();

    let headers = response.headers_mut();
    headers.insert(
        axum::http::header::CACHE_CONTROL,
        axum::http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        axum::http::header::CONNECTION,
        axum::http::HeaderValue::from_static("keep-alive"),
    );
    headers.insert(
        "X-Accel-Buffering",
        axum::http::HeaderValue::from_static("no"),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn emits_exactly_one_done_then_terminator_then_ends() {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let _ = tx.send(Ok(StreamEvent::content("hello "))).await;
            let _ = tx.send(Ok(StreamEvent::content("world"))).await;
            let _ = tx.send(Ok(StreamEvent::done())).await;
        });

        let stream = to_sse_stream(rx);
        tokio::pin!(stream);
        let mut frames = Vec::new();
        while let Some(Ok(event)) = stream.next().await {
            frames.push(event);
        }

        assert_eq!(frames.len(), 4);
        let last = format!("{:?}", frames[3]);
        assert!(last.contains("[DONE]"));
    }

    #[tokio::test]
    async fn mid_stream_error_ends_in_band_without_half_open_stream() {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let _ = tx.send(Ok(StreamEvent::content("partial"))).await;
            let _ = tx
                .send(Err(ragsvc_core::Error::RetrievalUnavailable(
                    "both backends down".into(),
                )))
                .await;
        });

        let stream = to_sse_stream(rx);
        tokio::pin!(stream);
        let mut frames = Vec::new();
        while let Some(Ok(event)) = stream.next().await {
            frames.push(event);
        }

        assert_eq!(frames.len(), 4);
        let last = format!("{:?}", frames[3]);
        assert!(last.contains("[DONE]"));
    }
}
