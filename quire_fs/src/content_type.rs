//! Best-effort MIME type resolution from a file name and a content sample.

use std::path::Path;

/// MIME type used when nothing more specific is known.
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

const BINARY_MIME_TYPE: &str = "application/octet-stream";

/// Bytes of content inspected by [`guess_mime_type`].
pub const SNIFF_LEN: usize = 4096;

const EXTENSIONS: &[(&str, &str)] = &[
    ("c", "text/x-csrc"),
    ("h", "text/x-chdr"),
    ("cc", "text/x-c++src"),
    ("cpp", "text/x-c++src"),
    ("hpp", "text/x-c++hdr"),
    ("rs", "text/rust"),
    ("py", "text/x-python"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("toml", "application/toml"),
    ("xml", "application/xml"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("md", "text/markdown"),
    ("sh", "application/x-shellscript"),
    ("yml", "application/x-yaml"),
    ("yaml", "application/x-yaml"),
    ("txt", "text/plain"),
    ("log", "text/x-log"),
    ("csv", "text/csv"),
];

/// Guess the MIME type of a file.
///
/// The extension wins when it is known. Otherwise the content decides between
/// plain text and binary data, with a `#!` line marking a script.
pub fn guess_mime_type(path: Option<&Path>, sample: &[u8]) -> String {
    if let Some(mime) = path.and_then(mime_from_extension) {
        return mime.to_string();
    }

    let sample = &sample[..sample.len().min(SNIFF_LEN)];
    if sample.starts_with(b"#!") {
        return "application/x-shellscript".to_string();
    }
    if is_binary_content(sample) {
        return BINARY_MIME_TYPE.to_string();
    }
    DEFAULT_MIME_TYPE.to_string()
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

/// Check if content appears to be binary based on null bytes and control characters.
pub fn is_binary_content(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return false;
    }

    let mut null_count = 0usize;
    let mut control_count = 0usize;

    for &byte in sample {
        if byte == 0 {
            null_count += 1;
        } else if byte < 32 && !matches!(byte, b'\t' | b'\n' | b'\r' | 0x0C) {
            control_count += 1;
        }
    }

    // Binary if >10% null bytes or >30% control characters
    null_count * 10 > sample.len() || control_count * 10 > sample.len() * 3
}
