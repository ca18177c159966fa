//! `multipart/related` body splitting for WADO-RS frame responses.
//!
//! ```text
//! --boundary\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! <frame bytes>\r\n
//! --boundary\r\n
//! ...
//! --boundary--
//! ```
//!
//! Parts are returned as zero-copy slices of the response body.

use bytes::Bytes;

use crate::error::IoError;

/// Extract the `boundary` parameter of a `Content-Type` header value.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|p| p + from)
}

/// Split a multipart body into the payloads of its parts.
///
/// # Errors
/// Returns `InvalidResponse` if the body does not contain well-formed parts
/// for the given boundary.
pub fn split_multipart(body: &Bytes, boundary: &str) -> Result<Vec<Bytes>, IoError> {
    let invalid = |message: &str| IoError::InvalidResponse(format!("multipart body: {}", message));

    let delimiter = format!("--{}", boundary).into_bytes();
    let mut next_delimiter = b"\r\n".to_vec();
    next_delimiter.extend_from_slice(&delimiter);

    let mut pos = find(body, &delimiter, 0).ok_or_else(|| invalid("boundary not found"))?;
    let mut parts = Vec::new();

    loop {
        let after = pos + delimiter.len();
        if body[after..].starts_with(b"--") {
            break;
        }
        let line_end = find(body, b"\r\n", after).ok_or_else(|| invalid("unterminated delimiter"))?;
        // An empty header block puts the blank line right at `line_end`
        let headers_end =
            find(body, b"\r\n\r\n", line_end).ok_or_else(|| invalid("unterminated headers"))?;
        let start = headers_end + 4;
        let end = find(body, &next_delimiter, start).ok_or_else(|| invalid("missing closing boundary"))?;
        parts.push(body.slice(start..end));
        pos = end + 2;
    }

    Ok(parts)
}
