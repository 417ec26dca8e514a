use chrono::{DateTime, SecondsFormat, Utc};

/// Derive the object key for a recording started at `started_at`.
///
/// The key is `{prefix}{ISO-8601 timestamp}` with everything outside
/// `[A-Za-z0-9]` removed, followed by `.{extension}`. Millisecond
/// resolution keeps keys of back-to-back sessions distinct.
pub fn object_key_for(prefix: &str, started_at: DateTime<Utc>, extension: &str) -> String {
    let stamped = format!(
        "{}{}",
        prefix,
        started_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    );

    let mut key = strip_non_alphanumeric(&stamped);
    if !extension.is_empty() {
        key.push('.');
        key.push_str(extension.trim_start_matches('.'));
    }
    key
}

fn strip_non_alphanumeric(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Content type recorded on the multipart upload
pub fn content_type_for(mime_type: &str, extension: &str) -> String {
    if !mime_type.is_empty() {
        return mime_type.to_string();
    }

    match extension.to_lowercase().as_str() {
        "webm" => "video/webm".to_string(),
        "mp4" => "video/mp4".to_string(),
        "mkv" => "video/x-matroska".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}
