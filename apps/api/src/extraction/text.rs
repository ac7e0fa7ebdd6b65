const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Best-effort UTF-8 decode. Invalid sequences become U+FFFD rather than failing.
pub fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
