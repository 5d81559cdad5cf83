//! NDJSON streaming responses for `_changes?feed=continuous` and
//! `_active_tasks?feed=continuous` (§6).

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use futures::Stream;
use futures::StreamExt;
use serde_json::Value;

/// Wraps a stream of JSON values as a chunked `application/json` NDJSON
/// response body, one object + `\n` per item. The connection stays open for
/// as long as the stream yields items; dropping the stream (client
/// disconnect, or the handler's subscription ending) closes it.
pub fn stream_response<S>(stream: S) -> Response<Body>
where
    S: Stream<Item = Value> + Send + 'static,
{
    let bytes_stream = stream.map(|value| {
        let mut line = serde_json::to_vec(&value).unwrap_or_default();
        line.push(b'\n');
        Ok::<_, std::convert::Infallible>(line)
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        )
        .header(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"))
        .body(Body::from_stream(bytes_stream))
        .expect("static headers always build a valid response")
}
