//! UTF-32, which `encoding_rs` does not support at all.

pub fn decode_le(bytes: &[u8]) -> Option<String> {
    decode_with(bytes, u32::from_le_bytes)
}

pub fn decode_be(bytes: &[u8]) -> Option<String> {
    decode_with(bytes, u32::from_be_bytes)
}

fn decode_with(bytes: &[u8], unit: fn([u8; 4]) -> u32) -> Option<String> {
    if bytes.len() % 4 != 0 {
        return None;
    }

    let mut result = String::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        let code = unit([chunk[0], chunk[1], chunk[2], chunk[3]]);
        result.push(char::from_u32(code)?);
    }
    Some(result)
}

pub fn encode_le(text: &str) -> Vec<u8> {
    text.chars().flat_map(|ch| (ch as u32).to_le_bytes()).collect()
}

pub fn encode_be(text: &str) -> Vec<u8> {
    text.chars().flat_map(|ch| (ch as u32).to_be_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_le() {
        let bytes = [0x41, 0x00, 0x00, 0x00, 0xE9, 0x00, 0x00, 0x00];
        assert_eq!(decode_le(&bytes).as_deref(), Some("Aé"));
    }

    #[test]
    fn test_encode_be() {
        assert_eq!(encode_be("A"), vec![0x00, 0x00, 0x00, 0x41]);
    }

    #[test]
    fn test_invalid_scalar_rejected() {
        // 0x110000 is past the last Unicode scalar value.
        assert_eq!(decode_be(&[0x00, 0x11, 0x00, 0x00]), None);
        assert_eq!(decode_le(&[0x41, 0x00, 0x00]), None);
    }
}
