//! Encoding negotiation for loaded content.
//!
//! Order of attempts when no encoding was requested:
//! 1) byte order mark
//! 2) UTF-8 validation (fast path, no conversion pass), for NUL-free content
//! 3) UTF-16 byte order from the position of NUL bytes
//! 4) the encoding remembered for this file in the metadata store
//! 5) the configured candidate list, in order
//! 6) a statistical guess from `chardetng`

use super::{ConversionError, Encoding, decode, locale_encoding, utf16};
use crate::bom::{detect_bom, strip_bom};

/// Inputs to auto-detection besides the bytes themselves.
#[derive(Debug, Clone, Default)]
pub struct DetectionHints {
    /// Encoding previously recorded for this file.
    pub remembered: Option<Encoding>,
    /// Encodings tried in order after UTF-8 and the remembered one.
    pub candidates: Vec<Encoding>,
    /// Whether to fall back to `chardetng` once the candidates are exhausted.
    pub use_guess: bool,
}

/// Decoded content and how it was decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub encoding: Encoding,
    /// A byte order mark was present and has been stripped.
    pub bom: bool,
}

/// Decode `bytes`, honoring `requested` when given and detecting otherwise.
pub fn resolve_encoding(
    bytes: &[u8],
    requested: Option<Encoding>,
    hints: &DetectionHints,
) -> Result<Decoded, ConversionError> {
    if bytes.is_empty() {
        return Ok(Decoded {
            text: String::new(),
            encoding: requested.unwrap_or_else(locale_encoding),
            bom: false,
        });
    }

    match requested {
        Some(encoding) => decode_explicit(bytes, encoding),
        None => detect(bytes, hints),
    }
}

fn decode_explicit(bytes: &[u8], encoding: Encoding) -> Result<Decoded, ConversionError> {
    let (content, bom) = match strip_bom(bytes, encoding) {
        Some(rest) => (rest, true),
        None => (bytes, false),
    };
    Ok(Decoded {
        text: decode(content, encoding)?,
        encoding,
        bom,
    })
}

fn detect(bytes: &[u8], hints: &DetectionHints) -> Result<Decoded, ConversionError> {
    if let Some(bom) = detect_bom(bytes) {
        match decode(&bytes[bom.length..], bom.encoding) {
            Ok(text) => {
                return Ok(Decoded {
                    text,
                    encoding: bom.encoding,
                    bom: true,
                });
            }
            Err(err) => log::debug!("BOM suggested {} but {err}", bom.encoding),
        }
    }

    let has_nul = bytes.contains(&0);
    if !has_nul && let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(Decoded {
            text: text.to_owned(),
            encoding: Encoding::Utf8,
            bom: false,
        });
    }

    if has_nul && let Some(encoding) = utf16::detect_pattern(bytes) {
        match decode(bytes, encoding) {
            Ok(text) => {
                return Ok(Decoded {
                    text,
                    encoding,
                    bom: false,
                });
            }
            Err(err) => log::debug!("NUL layout suggested {encoding} but {err}"),
        }
    }

    let mut attempts = Vec::with_capacity(hints.candidates.len() + 2);
    attempts.extend(hints.remembered);
    attempts.extend(hints.candidates.iter().copied());
    if hints.use_guess {
        attempts.push(guess_encoding(bytes));
    }

    let mut last_tried = Encoding::Utf8;
    for encoding in attempts {
        if encoding.is_utf8() {
            continue;
        }
        last_tried = encoding;
        match decode(bytes, encoding) {
            Ok(text) => {
                return Ok(Decoded {
                    text,
                    encoding,
                    bom: false,
                });
            }
            Err(err) => log::debug!("auto-detection: {err}"),
        }
    }

    Err(ConversionError::IllegalSequence {
        encoding: last_tried.name(),
    })
}

/// Statistical guess of the charset of `bytes`.
pub fn guess_encoding(bytes: &[u8]) -> Encoding {
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let guessed = detector.guess(None, true);

    if guessed == encoding_rs::UTF_8 {
        Encoding::Utf8
    } else if guessed == encoding_rs::UTF_16LE {
        Encoding::Utf16Le
    } else if guessed == encoding_rs::UTF_16BE {
        Encoding::Utf16Be
    } else {
        Encoding::Legacy(guessed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latin9() -> Encoding {
        Encoding::Legacy(encoding_rs::ISO_8859_15)
    }

    #[test]
    fn test_utf8_fast_path() {
        let decoded = resolve_encoding("héllo\n".as_bytes(), None, &DetectionHints::default())
            .unwrap();
        assert_eq!(decoded.text, "héllo\n");
        assert_eq!(decoded.encoding, Encoding::Utf8);
        assert!(!decoded.bom);
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        let bytes = [0xEF, 0xBB, 0xBF, b'h', b'i'];
        let decoded = resolve_encoding(&bytes, None, &DetectionHints::default()).unwrap();
        assert_eq!(decoded.text, "hi");
        assert_eq!(decoded.encoding, Encoding::Utf8);
        assert!(decoded.bom);
    }

    #[test]
    fn test_utf16_bom_detected() {
        let bytes = [0xFF, 0xFE, b'o', 0x00, b'k', 0x00];
        let decoded = resolve_encoding(&bytes, None, &DetectionHints::default()).unwrap();
        assert_eq!(decoded.text, "ok");
        assert_eq!(decoded.encoding, Encoding::Utf16Le);
    }

    #[test]
    fn test_utf16_without_bom() {
        let hints = DetectionHints {
            remembered: None,
            candidates: vec![Encoding::Utf8, latin9()],
            use_guess: false,
        };
        let decoded = resolve_encoding(&utf16::encode_le("plain text\n"), None, &hints).unwrap();
        assert_eq!(decoded.encoding, Encoding::Utf16Le);
        assert_eq!(decoded.text, "plain text\n");
        assert!(!decoded.bom);

        let decoded = resolve_encoding(&utf16::encode_be("plain text\n"), None, &hints).unwrap();
        assert_eq!(decoded.encoding, Encoding::Utf16Be);
        assert_eq!(decoded.text, "plain text\n");
    }

    #[test]
    fn test_nul_bytes_skip_utf8_fast_path() {
        let hints = DetectionHints {
            remembered: None,
            candidates: vec![Encoding::Utf8, latin9()],
            use_guess: false,
        };
        let decoded = resolve_encoding(b"ab\0cd\n", None, &hints).unwrap();
        assert_eq!(decoded.encoding, latin9());
        assert_eq!(decoded.text, "ab\0cd\n");
    }

    #[test]
    fn test_remembered_encoding_wins_over_candidates() {
        let koi8 = Encoding::for_label("KOI8-R").unwrap();
        let hints = DetectionHints {
            remembered: Some(koi8),
            candidates: vec![latin9()],
            use_guess: false,
        };
        let decoded = resolve_encoding(&[0xC1, 0xC2], None, &hints).unwrap();
        assert_eq!(decoded.encoding, koi8);
        assert_eq!(decoded.text, "аб");
    }

    #[test]
    fn test_candidates_in_order() {
        let hints = DetectionHints {
            remembered: None,
            candidates: vec![Encoding::Utf8, latin9()],
            use_guess: false,
        };
        let decoded = resolve_encoding(&[b'h', 0xE9], None, &hints).unwrap();
        assert_eq!(decoded.encoding, latin9());
        assert_eq!(decoded.text, "hé");
    }

    #[test]
    fn test_all_attempts_fail() {
        let hints = DetectionHints {
            remembered: None,
            candidates: vec![Encoding::Utf8],
            use_guess: false,
        };
        let err = resolve_encoding(&[b'h', 0xE9], None, &hints).unwrap_err();
        assert!(matches!(err, ConversionError::IllegalSequence { .. }));
    }

    #[test]
    fn test_explicit_encoding_is_strict() {
        let err = resolve_encoding(&[b'h', 0xE9], Some(Encoding::Utf8), &DetectionHints::default())
            .unwrap_err();
        assert_eq!(err, ConversionError::IllegalSequence { encoding: "UTF-8" });
    }

    #[test]
    fn test_empty_content_uses_requested_encoding() {
        let decoded = resolve_encoding(&[], Some(latin9()), &DetectionHints::default()).unwrap();
        assert_eq!(decoded.encoding, latin9());
        assert!(decoded.text.is_empty());
    }

    #[test]
    fn test_guess_fallback() {
        let hints = DetectionHints {
            remembered: None,
            candidates: Vec::new(),
            use_guess: true,
        };
        let bytes = b"Der B\xe4r hat gro\xdfen Hunger und m\xf6chte \xfcberall essen.";
        let decoded = resolve_encoding(bytes, None, &hints).unwrap();
        assert!(!decoded.encoding.is_utf8());
        assert!(decoded.text.contains("Bär"));
    }
}
