//! Compact encodings for posting values stored in the index.
//!
//! Offset lists are ascending, so they are stored as varint-encoded deltas.
//! File ids inside posting keys are fixed-width big-endian so that keys for
//! one n-gram sort by file id.

/// Encode a u32 as a variable-length integer
pub fn encode_varint(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        if value < 0x80 {
            buf.push(value as u8);
            break;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
}

/// Decode a variable-length integer from a slice
/// Returns (value, bytes_consumed)
pub fn decode_varint(buf: &[u8]) -> Option<(u32, usize)> {
    let mut result: u32 = 0;
    let mut shift = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 32 {
            return None; // Overflow
        }

        result |= ((byte & 0x7F) as u32) << shift;

        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }

        shift += 7;
    }

    None // Incomplete
}

/// Delta-encode an ascending list of offsets
pub fn delta_encode(values: &[u32], buf: &mut Vec<u8>) {
    let mut prev = 0u32;
    for &value in values {
        debug_assert!(value >= prev, "offsets must be ascending");
        encode_varint(value - prev, buf);
        prev = value;
    }
}

/// Decode a delta-encoded offset list.
///
/// Returns `None` if the buffer ends in the middle of a varint.
pub fn delta_decode(buf: &[u8]) -> Option<Vec<u32>> {
    let mut result = Vec::new();
    let mut prev = 0u32;
    let mut pos = 0;

    while pos < buf.len() {
        let (delta, consumed) = decode_varint(&buf[pos..])?;
        prev = prev.checked_add(delta)?;
        result.push(prev);
        pos += consumed;
    }

    Some(result)
}

/// Build the key of one posting: the n-gram followed by the file id.
pub fn posting_key(gram: &[u8], file_id: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(gram.len() + 4);
    key.extend_from_slice(gram);
    key.extend_from_slice(&file_id.to_be_bytes());
    key
}

/// Split a posting key back into its n-gram and file id.
pub fn split_posting_key(key: &[u8]) -> Option<(&[u8], u32)> {
    if key.len() < 4 {
        return None;
    }
    let (gram, id) = key.split_at(key.len() - 4);
    let id: [u8; 4] = id.try_into().ok()?;
    Some((gram, u32::from_be_bytes(id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_roundtrip() {
        let values = [0, 1, 127, 128, 16383, 16384, u32::MAX];
        for value in values {
            let mut buf = Vec::new();
            encode_varint(value, &mut buf);
            let (decoded, _) = decode_varint(&buf).unwrap();
            assert_eq!(value, decoded);
        }
    }

    #[test]
    fn test_delta_encoding() {
        let values = vec![1, 5, 10, 15, 100, 1000];
        let mut buf = Vec::new();
        delta_encode(&values, &mut buf);
        assert_eq!(delta_decode(&buf), Some(values));
    }

    #[test]
    fn test_delta_decode_truncated() {
        // 0x80 promises a continuation byte that never comes
        assert_eq!(delta_decode(&[0x05, 0x80]), None);
        assert_eq!(delta_decode(&[]), Some(Vec::new()));
    }

    #[test]
    fn test_posting_key_layout() {
        let key = posting_key(b"fun", 258);
        assert_eq!(key, vec![b'f', b'u', b'n', 0, 0, 1, 2]);
        assert_eq!(split_posting_key(&key), Some((&b"fun"[..], 258)));
        assert_eq!(split_posting_key(b"ab"), None);
    }

    #[test]
    fn test_posting_keys_sort_by_file_id() {
        assert!(posting_key(b"abc", 2) < posting_key(b"abc", 256));
        assert!(posting_key(b"abc", u32::MAX) < posting_key(b"abd", 0));
    }
}
