// Variable-length-quantity round-trip coverage.
use midilog::binutil::{EncodeError, VARINT_MAX, decode_varint, encode_varint};

#[test]
fn test_round_trip_dense_low_range() {
    // Every one- and two-byte encoding.
    for value in 0u32..=0x4000 {
        let (bytes, len) = encode_varint(value).unwrap();
        let (decoded, consumed) = decode_varint(&bytes[..len], 0).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, len);
    }
}

#[test]
fn test_round_trip_sampled_full_range() {
    // Stride through the remaining 28-bit range, hitting both sides of
    // every group boundary on the way.
    let mut value = 0x4000u32;
    while value <= VARINT_MAX {
        for probe in [value - 1, value, value + 1] {
            if probe > VARINT_MAX {
                continue;
            }
            let (bytes, len) = encode_varint(probe).unwrap();
            let (decoded, consumed) = decode_varint(&bytes[..len], 0).unwrap();
            assert_eq!(decoded, probe);
            assert_eq!(consumed, len);
        }
        value = value.saturating_mul(2);
        if value == 0 {
            break;
        }
    }
    let (bytes, len) = encode_varint(VARINT_MAX).unwrap();
    assert_eq!(&bytes[..len], &[0xFF, 0xFF, 0xFF, 0x7F]);
}

#[test]
fn test_encoded_length_matches_group_count() {
    assert_eq!(encode_varint(0x7F).unwrap().1, 1);
    assert_eq!(encode_varint(0x80).unwrap().1, 2);
    assert_eq!(encode_varint(0x3FFF).unwrap().1, 2);
    assert_eq!(encode_varint(0x4000).unwrap().1, 3);
    assert_eq!(encode_varint(0x1F_FFFF).unwrap().1, 3);
    assert_eq!(encode_varint(0x20_0000).unwrap().1, 4);
    assert_eq!(encode_varint(VARINT_MAX).unwrap().1, 4);
}

#[test]
fn test_all_but_last_byte_carry_continuation_bit() {
    for value in [0x80u32, 0x4000, 0x20_0000, 0x0123_4567, VARINT_MAX] {
        let (bytes, len) = encode_varint(value).unwrap();
        for byte in &bytes[..len - 1] {
            assert_eq!(byte & 0x80, 0x80);
        }
        assert_eq!(bytes[len - 1] & 0x80, 0x00);
    }
}

#[test]
fn test_values_beyond_four_groups_are_errors() {
    for value in [VARINT_MAX + 1, 0x2000_0000, u32::MAX] {
        assert!(matches!(
            encode_varint(value),
            Err(EncodeError::VarintOverflow(_))
        ));
    }
}

#[test]
fn test_decode_reports_offset_consumption() {
    // Two quantities back to back at a non-zero offset.
    let bytes = [0xAA, 0x81, 0x00, 0x05];
    let (first, consumed) = decode_varint(&bytes, 1).unwrap();
    assert_eq!((first, consumed), (0x80, 2));
    let (second, consumed) = decode_varint(&bytes, 3).unwrap();
    assert_eq!((second, consumed), (0x05, 1));
}
