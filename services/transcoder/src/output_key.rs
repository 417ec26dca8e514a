/// Whether `key` ends in `.{extension}` on its final path segment
pub fn has_extension(key: &str, extension: &str) -> bool {
    file_name(key)
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && ext == extension)
}

/// Derive the transcoded object's key by swapping the trailing extension.
///
/// Only the extension of the final path segment is replaced; a key without
/// one gets `.{output_extension}` appended.
pub fn derive_output_key(key: &str, output_extension: &str) -> String {
    let name = file_name(key);
    let stem_len = match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => key.len() - name.len() + stem.len(),
        _ => key.len(),
    };
    format!("{}.{}", &key[..stem_len], output_extension)
}

fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
