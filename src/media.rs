// Image media types accepted at the upload boundary

use std::path::Path;

/// MIME types an upload may carry
pub const ACCEPTED_MIME_TYPES: &[&str] = &["image/png", "image/jpeg"];

pub fn is_accepted(mime_type: &str) -> bool {
    ACCEPTED_MIME_TYPES.contains(&mime_type)
}

/// Detect the image MIME type from a file extension
pub fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" | "jpe" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

pub fn mime_from_path(path: &Path) -> Option<&'static str> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(mime_from_extension)
}

/// File extension to use when writing an image of the given type
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        _ => "bin",
    }
}
