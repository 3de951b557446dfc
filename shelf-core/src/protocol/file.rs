//! Whole-file payloads.
//!
//! A `GET` reply carries the complete file as a single message, so the
//! content must not contain a raw newline. Bytes are decoded as UTF-8
//! (lossy), one trailing line terminator is dropped, and the remaining
//! `\`, `\n` and `\r` are written as two-character escapes.

/// Turn file bytes into a single-line payload.
pub fn encode_payload(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let body = text
        .strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(&text);

    let mut out = String::with_capacity(body.len());
    for ch in body.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`encode_payload`]. Unknown escapes are kept verbatim.
pub fn decode_payload(payload: &str) -> String {
    let payload = payload.strip_suffix('\n').unwrap_or(payload);
    let mut out = String::with_capacity(payload.len());
    let mut chars = payload.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
