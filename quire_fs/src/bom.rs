use crate::encoding::Encoding;

/// A byte order mark found at the start of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bom {
    pub encoding: Encoding,
    pub length: usize,
}

/// Detect a Byte Order Mark (BOM) in the given byte slice.
///
/// UTF-32LE is checked before UTF-16LE since their marks share a prefix.
pub fn detect_bom(bytes: &[u8]) -> Option<Bom> {
    let found = |encoding: Encoding| Bom {
        encoding,
        length: encoding.bom().len(),
    };

    match bytes {
        [0xFF, 0xFE, 0x00, 0x00, ..] => Some(found(Encoding::Utf32Le)),
        [0x00, 0x00, 0xFE, 0xFF, ..] => Some(found(Encoding::Utf32Be)),
        [0xEF, 0xBB, 0xBF, ..] => Some(found(Encoding::Utf8)),
        [0xFF, 0xFE, ..] => Some(found(Encoding::Utf16Le)),
        [0xFE, 0xFF, ..] => Some(found(Encoding::Utf16Be)),
        _ => None,
    }
}

/// Strip the BOM of `encoding` from the front of `bytes`, if present.
pub fn strip_bom(bytes: &[u8], encoding: Encoding) -> Option<&[u8]> {
    let bom = encoding.bom();
    if bom.is_empty() {
        return None;
    }
    bytes.strip_prefix(bom)
}
