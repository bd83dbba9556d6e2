//! UTF-16 without BOM handling. `encoding_rs` only decodes UTF-16, so the
//! encoder side lives here.

use super::Encoding;

/// Guess the byte order of BOM-less UTF-16 from where the NUL bytes fall.
///
/// Mostly-ASCII UTF-16 has a NUL in one half of every code unit and none in
/// the other. Text without that shape returns `None`.
pub fn detect_pattern(bytes: &[u8]) -> Option<Encoding> {
    if bytes.len() < 4 || bytes.len() % 2 != 0 {
        return None;
    }

    let (mut even_null, mut odd_null) = (0usize, 0usize);
    for pair in bytes.chunks_exact(2) {
        even_null += usize::from(pair[0] == 0);
        odd_null += usize::from(pair[1] == 0);
    }

    let units = bytes.len() / 2;
    if even_null == 0 && odd_null * 2 > units {
        Some(Encoding::Utf16Le)
    } else if odd_null == 0 && even_null * 2 > units {
        Some(Encoding::Utf16Be)
    } else {
        None
    }
}

pub fn decode_le(bytes: &[u8]) -> Option<String> {
    decode_with(bytes, u16::from_le_bytes)
}

pub fn decode_be(bytes: &[u8]) -> Option<String> {
    decode_with(bytes, u16::from_be_bytes)
}

fn decode_with(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }

    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .ok()
}

pub fn encode_le(text: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(text.len() * 2);
    for code_unit in text.encode_utf16() {
        result.extend_from_slice(&code_unit.to_le_bytes());
    }
    result
}

pub fn encode_be(text: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(text.len() * 2);
    for code_unit in text.encode_utf16() {
        result.extend_from_slice(&code_unit.to_be_bytes());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_pattern() {
        assert_eq!(detect_pattern(&encode_le("hello\n")), Some(Encoding::Utf16Le));
        assert_eq!(detect_pattern(&encode_be("hello\n")), Some(Encoding::Utf16Be));
        assert_eq!(detect_pattern(b"hello\n\0\0"), None);
        assert_eq!(detect_pattern(&encode_le("hello")[..9]), None);
        assert_eq!(detect_pattern(&[0, 0, 0, 0]), None);
    }

    #[test]
    fn test_encode_le_ascii() {
        assert_eq!(encode_le("Hi"), vec![0x48, 0x00, 0x69, 0x00]);
    }

    #[test]
    fn test_surrogate_pair() {
        let bytes = encode_be("🌍");
        assert_eq!(bytes, vec![0xD8, 0x3C, 0xDF, 0x0D]);
        assert_eq!(decode_be(&bytes).as_deref(), Some("🌍"));
    }

    #[test]
    fn test_odd_length_rejected() {
        assert_eq!(decode_le(&[0x48, 0x00, 0x69]), None);
    }

    #[test]
    fn test_lone_surrogate_rejected() {
        assert_eq!(decode_le(&[0x00, 0xD8, 0x41, 0x00]), None);
    }
}
