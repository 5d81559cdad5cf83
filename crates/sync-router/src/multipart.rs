//! CouchDB 1.2-style `multipart/related` encode/decode (§6, §4.9 GET with
//! `Accept: multipart/*`, PUT with a multipart body). This is a distinct wire
//! format from `multipart/form-data` — axum's built-in `Multipart` extractor
//! only understands the latter, so attachment-bearing documents are encoded
//! and parsed by hand here.
//!
//! Wire shape: a JSON root part (with `_attachments` entries carrying
//! `"follows": true` in place of inline `data`) followed by one binary part
//! per attachment, in the same order the root lists them.

use serde_json::Value;
use sync_core::SyncError;

pub struct MultipartAttachment {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Encodes `root` (already carrying `"follows": true` markers for the
/// attachments being inlined) followed by one part per attachment, and
/// returns `(content_type_header, body)`.
pub fn encode(root: &Value, attachments: &[MultipartAttachment]) -> (String, Vec<u8>) {
    let boundary = format!("sync-boundary-{}", uuid::Uuid::new_v4().simple());
    let mut body = Vec::new();

    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json\r\n\r\n");
    body.extend_from_slice(serde_json::to_vec(root).unwrap_or_default().as_slice());
    body.extend_from_slice(b"\r\n");

    for att in attachments {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n", att.content_type).as_bytes());
        body.extend_from_slice(format!("Content-Length: {}\r\n\r\n", att.data.len()).as_bytes());
        body.extend_from_slice(&att.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--").as_bytes());

    (format!("multipart/related; boundary=\"{boundary}\""), body)
}

/// Parses a `Content-Type: multipart/related; boundary=...` body into the
/// JSON root plus any binary parts, in wire order.
pub fn decode(content_type: &str, body: &[u8]) -> Result<(Value, Vec<Vec<u8>>), SyncError> {
    let boundary = content_type
        .split(';')
        .find_map(|seg| seg.trim().strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_string())
        .ok_or_else(|| SyncError::BadRequest("multipart body missing boundary".to_string()))?;

    let delimiter = format!("--{boundary}").into_bytes();
    let parts = split_parts(body, &delimiter);
    if parts.is_empty() {
        return Err(SyncError::BadRequest("empty multipart body".to_string()));
    }

    let (root_headers, root_data) = split_headers(&parts[0])?;
    let _ = root_headers;
    let root: Value = serde_json::from_slice(root_data)
        .map_err(|e| SyncError::BadJson(format!("multipart JSON root: {e}")))?;

    let mut attachments = Vec::new();
    for part in &parts[1..] {
        let (_, data) = split_headers(part)?;
        attachments.push(data.to_vec());
    }
    Ok((root, attachments))
}

fn split_parts<'a>(body: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut rest = body;
    loop {
        let Some(pos) = find(rest, delimiter) else { break };
        rest = &rest[pos + delimiter.len()..];
        // Closing delimiter is `--boundary--`.
        if rest.starts_with(b"--") {
            break;
        }
        let end = find(rest, delimiter).unwrap_or(rest.len());
        let mut chunk = &rest[..end];
        chunk = trim_crlf(chunk);
        if !chunk.is_empty() {
            parts.push(chunk);
        }
    }
    parts
}

fn split_headers(part: &[u8]) -> Result<(&[u8], &[u8]), SyncError> {
    let sep = b"\r\n\r\n";
    match find(part, sep) {
        Some(pos) => Ok((&part[..pos], &part[pos + sep.len()..])),
        None => Err(SyncError::BadRequest("malformed multipart part".to_string())),
    }
}

fn trim_crlf(mut data: &[u8]) -> &[u8] {
    if data.starts_with(b"\r\n") {
        data = &data[2..];
    }
    while data.ends_with(b"\r\n") {
        data = &data[..data.len() - 2];
    }
    data
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len().max(1))
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_root_and_attachments() {
        let root = json!({"_id": "doc1", "_attachments": {"a.txt": {"follows": true}}});
        let atts = vec![MultipartAttachment {
            name: "a.txt".to_string(),
            content_type: "text/plain".to_string(),
            data: b"hello world".to_vec(),
        }];
        let (content_type, body) = encode(&root, &atts);
        let (decoded_root, decoded_atts) = decode(&content_type, &body).unwrap();
        assert_eq!(decoded_root["_id"], json!("doc1"));
        assert_eq!(decoded_atts.len(), 1);
        assert_eq!(decoded_atts[0], b"hello world");
    }
}
