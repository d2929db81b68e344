//! Media type and extension detection.
//!
//! Content is sniffed by magic bytes first; the location's extension is the
//! fallback for formats without a signature (text, JSON, CSV and friends).

use crate::location::Location;

/// Mime type the storage backends report for directories.
pub const DIRECTORY: &str = "directory";
pub const OCTET_STREAM: &str = "application/octet-stream";
pub const TEXT_PLAIN: &str = "text/plain";
pub const EMPTY: &str = "application/x-empty";

/// Bytes of a file that are enough to sniff its type.
pub const SNIFF_LEN: usize = 8192;

pub fn detect(location: &Location, content: &[u8]) -> String {
    if let Some(kind) = infer::get(content) {
        return kind.mime_type().to_string();
    }
    if let Some(guess) = mime_guess::from_path(location.as_str()).first_raw() {
        return guess.to_string();
    }
    from_content(content).to_string()
}

/// Type of bare content with no location to fall back on.
pub fn from_content(content: &[u8]) -> &'static str {
    if let Some(kind) = infer::get(content) {
        return kind.mime_type();
    }
    if content.is_empty() {
        EMPTY
    } else if std::str::from_utf8(content).is_ok() {
        TEXT_PLAIN
    } else {
        OCTET_STREAM
    }
}

/// Extension implied by the content's magic bytes.
pub fn sniff_extension(content: &[u8]) -> Option<&'static str> {
    infer::get(content).map(|kind| kind.extension())
}

/// Extension for content, falling back to `txt` for UTF-8 and `bin` for the rest.
pub fn extension_for_content(content: &[u8]) -> &'static str {
    sniff_extension(content).unwrap_or_else(|| {
        if std::str::from_utf8(content).is_ok() {
            "txt"
        } else {
            "bin"
        }
    })
}

/// Preferred extension registered for a mime type.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    if let Some(ext) = preferred_extension(mime) {
        return Some(ext);
    }
    mime_guess::get_mime_extensions_str(mime).and_then(|exts| exts.first().copied())
}

fn preferred_extension(mime: &str) -> Option<&'static str> {
    match mime {
        "image/jpeg" => Some("jpg"),
        "text/plain" => Some("txt"),
        "application/octet-stream" => Some("bin"),
        _ => None,
    }
}

pub fn is_image(mime: &str) -> bool {
    mime.to_ascii_lowercase().contains("image")
}
