use std::fmt;

use thiserror::Error;

pub mod detect;
pub mod locale;
pub mod utf16;
pub mod utf32;

pub use detect::{Decoded, DetectionHints, guess_encoding, resolve_encoding};
pub use locale::{locale_encoding, locale_encoding_from};

/// A character encoding the pipeline can decode from and encode to.
///
/// UTF-8 and the Unicode transformation formats are handled directly; every
/// other charset is delegated to `encoding_rs`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
    Legacy(&'static encoding_rs::Encoding),
}

/// Failure converting between bytes and UTF-8 text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("invalid {encoding} byte sequence")]
    IllegalSequence { encoding: &'static str },
    #[error("text cannot be represented in {encoding}")]
    Unrepresentable { encoding: &'static str },
    #[error("unsupported charset '{label}'")]
    Unsupported { label: String },
}

impl Encoding {
    /// Resolve a charset label such as `"UTF-8"`, `"latin1"` or `"CURRENT"`.
    pub fn for_label(label: &str) -> Result<Self, ConversionError> {
        let trimmed = label.trim();
        let lower = trimmed.to_ascii_lowercase();

        match lower.as_str() {
            "current" => return Ok(locale_encoding()),
            "utf-32le" | "utf32le" => return Ok(Encoding::Utf32Le),
            "utf-32be" | "utf32be" | "utf-32" | "utf32" => return Ok(Encoding::Utf32Be),
            "utf8" => return Ok(Encoding::Utf8),
            _ => {}
        }

        match encoding_rs::Encoding::for_label_no_replacement(lower.as_bytes()) {
            Some(enc) if enc == encoding_rs::UTF_8 => Ok(Encoding::Utf8),
            Some(enc) if enc == encoding_rs::UTF_16LE => Ok(Encoding::Utf16Le),
            Some(enc) if enc == encoding_rs::UTF_16BE => Ok(Encoding::Utf16Be),
            Some(enc) => Ok(Encoding::Legacy(enc)),
            None => Err(ConversionError::Unsupported {
                label: trimmed.to_string(),
            }),
        }
    }

    /// Canonical charset name, suitable for storing in metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16Le => "UTF-16LE",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::Utf32Le => "UTF-32LE",
            Encoding::Utf32Be => "UTF-32BE",
            Encoding::Legacy(enc) => enc.name(),
        }
    }

    pub fn is_utf8(&self) -> bool {
        matches!(self, Encoding::Utf8)
    }

    /// Byte order mark for this encoding, empty for encodings without one.
    pub fn bom(&self) -> &'static [u8] {
        match self {
            Encoding::Utf8 => &[0xEF, 0xBB, 0xBF],
            Encoding::Utf16Le => &[0xFF, 0xFE],
            Encoding::Utf16Be => &[0xFE, 0xFF],
            Encoding::Utf32Le => &[0xFF, 0xFE, 0x00, 0x00],
            Encoding::Utf32Be => &[0x00, 0x00, 0xFE, 0xFF],
            Encoding::Legacy(_) => &[],
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decode `bytes` in `encoding` to UTF-8, failing on any malformed sequence.
///
/// No BOM handling happens here; callers strip a BOM before decoding.
pub fn decode(bytes: &[u8], encoding: Encoding) -> Result<String, ConversionError> {
    let illegal = || ConversionError::IllegalSequence {
        encoding: encoding.name(),
    };

    match encoding {
        Encoding::Utf8 => std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| illegal()),
        Encoding::Utf16Le => utf16::decode_le(bytes).ok_or_else(illegal),
        Encoding::Utf16Be => utf16::decode_be(bytes).ok_or_else(illegal),
        Encoding::Utf32Le => utf32::decode_le(bytes).ok_or_else(illegal),
        Encoding::Utf32Be => utf32::decode_be(bytes).ok_or_else(illegal),
        Encoding::Legacy(enc) => enc
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned())
            .ok_or_else(illegal),
    }
}

/// Encode UTF-8 `text` into `encoding`.
///
/// Characters the target charset cannot represent are an error rather than
/// being replaced.
pub fn encode(text: &str, encoding: Encoding) -> Result<Vec<u8>, ConversionError> {
    match encoding {
        Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
        Encoding::Utf16Le => Ok(utf16::encode_le(text)),
        Encoding::Utf16Be => Ok(utf16::encode_be(text)),
        Encoding::Utf32Le => Ok(utf32::encode_le(text)),
        Encoding::Utf32Be => Ok(utf32::encode_be(text)),
        Encoding::Legacy(enc) => {
            let (bytes, _, had_errors) = enc.encode(text);
            if had_errors {
                Err(ConversionError::Unrepresentable {
                    encoding: enc.name(),
                })
            } else {
                Ok(bytes.into_owned())
            }
        }
    }
}
