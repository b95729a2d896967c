//! Reclassifies raw file-path chunks as status hints.
//!
//! Some transports emit a bare local image path as a content chunk while a
//! tool is reading the file. Those chunks become a "Processing ..." status
//! instead of message text.

const LOCAL_PATH_PREFIXES: [&str; 2] = ["/Users/", "~/"];
const IMAGE_EXTENSIONS: [&str; 6] = [".png", ".jpg", ".jpeg", ".gif", ".heic", ".webp"];
const QUOTES: [char; 3] = ['"', '\'', '`'];

/// Derives a status phrase from a raw chunk, or `None` when the chunk is not a
/// single-line local image path.
pub fn infer_status(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }
    let candidate = strip_one_quote_layer(raw.trim());
    if candidate.contains('\n') {
        return None;
    }
    if !LOCAL_PATH_PREFIXES
        .iter()
        .any(|prefix| candidate.starts_with(prefix))
    {
        return None;
    }
    let lower = candidate.to_ascii_lowercase();
    if !IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return None;
    }
    let basename = candidate.split('/').rev().find(|segment| !segment.is_empty())?;
    Some(format!("Processing {basename}"))
}

fn strip_one_quote_layer(value: &str) -> &str {
    let value = value
        .strip_prefix(|c: char| QUOTES.contains(&c))
        .unwrap_or(value);
    value
        .strip_suffix(|c: char| QUOTES.contains(&c))
        .unwrap_or(value)
}
