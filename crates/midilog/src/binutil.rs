//! Utilities shared by the encoder and parser: error types, MIDI
//! variable-length quantities and big-endian byte readers.
use std::fmt;

/// Error type returned by the parsing helpers in this module and by the
/// SMF parser.
#[derive(Debug, Clone)]
pub enum ParseError {
    /// Input ended unexpectedly while the parser was expecting more bytes.
    UnexpectedEof,

    /// An attempted read was outside the available buffer range.
    ///
    /// - `offset` is the index that was attempted to be accessed.
    /// - `needed` is the number of bytes required for the operation.
    /// - `available` is the current buffer length.
    /// - `context` is an optional string describing the logical location
    ///   (for example `"header_length"` or `"track_body"`) where the access
    ///   was attempted.
    OffsetOutOfRange {
        offset: usize,
        needed: usize,
        available: usize,
        context: Option<String>,
    },

    /// A four-byte chunk identifier (typically ASCII) did not match an
    /// expected value.
    ///
    /// The contained array is the raw 4 bytes that were read.
    InvalidIdent([u8; 4]),

    /// A header was shorter than the minimum required length.
    ///
    /// The contained `String` identifies which header or field was too short
    /// (for example: "MThd" or "MTrk").
    HeaderTooShort(String),

    /// A status byte was not recognized by the parser, or a data byte was
    /// found where a status byte was required and no running status was
    /// active.
    ///
    /// - `status` is the raw byte that was invalid.
    /// - `offset` is the position in the input where it was found.
    UnknownStatus { status: u8, offset: usize },

    /// A variable-length quantity did not terminate within its maximum
    /// four-byte length.
    VarintTooLong { offset: usize },

    /// A generic error with a human-readable message.
    Other(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedEof => write!(f, "unexpected end of input"),
            ParseError::OffsetOutOfRange {
                offset,
                needed,
                available,
                context,
            } => {
                if let Some(ctx) = context {
                    write!(
                        f,
                        "offset out of range at {}: 0x{:X} (needed {} bytes, available {})",
                        ctx, offset, needed, available
                    )
                } else {
                    write!(
                        f,
                        "offset out of range: 0x{:X} (needed {} bytes, available {})",
                        offset, needed, available
                    )
                }
            }
            ParseError::InvalidIdent(id) => write!(f, "invalid ident: {:?}", id),
            ParseError::HeaderTooShort(name) => write!(f, "header too short: {}", name),
            ParseError::UnknownStatus { status, offset } => {
                write!(f, "unknown status 0x{:02X} at offset 0x{:X}", status, offset)
            }
            ParseError::VarintTooLong { offset } => {
                write!(f, "variable-length quantity too long at offset 0x{:X}", offset)
            }
            ParseError::Other(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for ParseError {}

/// Error type returned by the track encoder and file container.
#[derive(Debug)]
pub enum EncodeError {
    /// A value was about to be encoded as a variable-length quantity but
    /// does not fit in the four 7-bit groups the format allows (28 bits).
    ///
    /// Tick deltas at 480 ticks per beat never approach this bound during
    /// a normal capture, so this indicates a logic error upstream.
    VarintOverflow(u64),

    /// A track was asked to emit an event at a tick earlier than its last
    /// emitted event. The tick counter is monotonic, so this is a logic
    /// error; the capture must be aborted rather than emit corrupt timing.
    TickReversal { now: u64, last: u64 },

    /// More tracks were created than the 16-bit header field can declare.
    TrackCountOverflow(usize),

    /// The underlying output could not be written, patched or flushed.
    Io(std::io::Error),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::VarintOverflow(v) => {
                write!(f, "value 0x{:X} does not fit a variable-length quantity", v)
            }
            EncodeError::TickReversal { now, last } => {
                write!(
                    f,
                    "tick counter went backward: now {} but track last emitted at {}",
                    now, last
                )
            }
            EncodeError::TrackCountOverflow(n) => {
                write!(f, "track count {} does not fit the MThd track-count field", n)
            }
            EncodeError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EncodeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(e: std::io::Error) -> Self {
        EncodeError::Io(e)
    }
}

/// Largest value a MIDI variable-length quantity can hold (four 7-bit groups).
pub const VARINT_MAX: u32 = 0x0FFF_FFFF;

/// Encode `value` as a MIDI variable-length quantity.
///
/// The encoding uses up to 4 groups of 7 bits, most-significant group first;
/// every group except the last has its high bit set. Returns the encoded
/// bytes in a fixed array together with the number of bytes used.
///
/// Values above [`VARINT_MAX`] are rejected with
/// `EncodeError::VarintOverflow` rather than silently truncated.
///
/// # Examples
///
/// ```
/// use midilog::binutil::encode_varint;
///
/// let (bytes, len) = encode_varint(0x2000).unwrap();
/// assert_eq!(&bytes[..len], &[0xC0, 0x00]);
/// ```
pub fn encode_varint(value: u32) -> Result<([u8; 4], usize), EncodeError> {
    if value > VARINT_MAX {
        return Err(EncodeError::VarintOverflow(u64::from(value)));
    }

    // Collect 7-bit groups least-significant first, then reverse on output.
    let mut groups = [0u8; 4];
    let mut count = 0;
    let mut v = value;
    loop {
        groups[count] = (v & 0x7F) as u8;
        count += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }

    let mut out = [0u8; 4];
    let mut len = 0;
    for i in (0..count).rev() {
        let mut byte = groups[i];
        if i != 0 {
            byte |= 0x80;
        }
        out[len] = byte;
        len += 1;
    }

    Ok((out, len))
}

/// Decode a MIDI variable-length quantity from `bytes` at `off`.
///
/// Returns the decoded value together with the number of bytes consumed.
/// A quantity that does not terminate within four bytes yields
/// `ParseError::VarintTooLong`; running off the end of the buffer yields
/// `ParseError::OffsetOutOfRange`.
pub fn decode_varint(bytes: &[u8], off: usize) -> Result<(u32, usize), ParseError> {
    let mut value: u32 = 0;
    for i in 0..4 {
        let byte = read_u8_at(bytes, off + i)?;
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(ParseError::VarintTooLong { offset: off })
}

/// Read a single byte from `bytes` at `off`.
///
/// Returns `Ok(u8)` when `off` is a valid index into `bytes`. Returns
/// `Err(ParseError::OffsetOutOfRange)` when `off` is out of bounds.
pub fn read_u8_at(bytes: &[u8], off: usize) -> Result<u8, ParseError> {
    if bytes.len() <= off {
        return Err(ParseError::OffsetOutOfRange {
            offset: off,
            needed: 1,
            available: bytes.len(),
            context: None,
        });
    }
    Ok(bytes[off])
}

/// Read a 16-bit big-endian unsigned integer from `bytes` at `off`.
///
/// Returns `Err(ParseError::OffsetOutOfRange)` when the buffer is too short.
pub fn read_u16_be_at(bytes: &[u8], off: usize) -> Result<u16, ParseError> {
    if bytes.len() < off + 2 {
        return Err(ParseError::OffsetOutOfRange {
            offset: off,
            needed: 2,
            available: bytes.len(),
            context: None,
        });
    }
    let mut tmp: [u8; 2] = [0; 2];
    tmp.copy_from_slice(&bytes[off..off + 2]);
    Ok(u16::from_be_bytes(tmp))
}

/// Read a 32-bit big-endian unsigned integer from `bytes` at `off`.
///
/// Returns `Err(ParseError::OffsetOutOfRange)` when the buffer is too short.
pub fn read_u32_be_at(bytes: &[u8], off: usize) -> Result<u32, ParseError> {
    if bytes.len() < off + 4 {
        return Err(ParseError::OffsetOutOfRange {
            offset: off,
            needed: 4,
            available: bytes.len(),
            context: None,
        });
    }
    let mut tmp: [u8; 4] = [0; 4];
    tmp.copy_from_slice(&bytes[off..off + 4]);
    Ok(u32::from_be_bytes(tmp))
}

/// Return a borrowed slice of length `len` starting at `off` from `bytes`.
///
/// Returns `Ok(&[u8])` that borrows from the input slice when the requested
/// range is within bounds. Returns `Err(ParseError::OffsetOutOfRange)` when
/// the requested range exceeds the available buffer.
pub fn read_slice(bytes: &[u8], off: usize, len: usize) -> Result<&[u8], ParseError> {
    if bytes.len() < off + len {
        return Err(ParseError::OffsetOutOfRange {
            offset: off,
            needed: len,
            // Report the remaining number of bytes from `off` to the end of the buffer.
            available: bytes.len().saturating_sub(off),
            context: Some("read_slice".into()),
        });
    }
    Ok(&bytes[off..off + len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_single_byte() {
        let (bytes, len) = encode_varint(0x00).unwrap();
        assert_eq!(&bytes[..len], &[0x00]);
        let (bytes, len) = encode_varint(0x40).unwrap();
        assert_eq!(&bytes[..len], &[0x40]);
        let (bytes, len) = encode_varint(0x7F).unwrap();
        assert_eq!(&bytes[..len], &[0x7F]);
    }

    #[test]
    fn test_varint_known_vectors() {
        // Reference vectors from the SMF specification.
        let cases: &[(u32, &[u8])] = &[
            (0x80, &[0x81, 0x00]),
            (0x2000, &[0xC0, 0x00]),
            (0x3FFF, &[0xFF, 0x7F]),
            (0x4000, &[0x81, 0x80, 0x00]),
            (0x1F_FFFF, &[0xFF, 0xFF, 0x7F]),
            (0x20_0000, &[0x81, 0x80, 0x80, 0x00]),
            (0x0FFF_FFFF, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];
        for (value, expected) in cases {
            let (bytes, len) = encode_varint(*value).unwrap();
            assert_eq!(&bytes[..len], *expected, "value 0x{:X}", value);
        }
    }

    #[test]
    fn test_varint_rejects_fifth_group() {
        assert!(matches!(
            encode_varint(VARINT_MAX + 1),
            Err(EncodeError::VarintOverflow(_))
        ));
        assert!(matches!(
            encode_varint(u32::MAX),
            Err(EncodeError::VarintOverflow(_))
        ));
    }

    #[test]
    fn test_varint_round_trip_boundaries() {
        for value in [
            0u32, 1, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1F_FFFF, 0x20_0000, VARINT_MAX,
        ] {
            let (bytes, len) = encode_varint(value).unwrap();
            let (decoded, consumed) = decode_varint(&bytes[..len], 0).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(consumed, len);
        }
    }

    #[test]
    fn test_decode_varint_unterminated() {
        // Four continuation bytes with no terminator.
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0x00];
        assert!(matches!(
            decode_varint(&bytes, 0),
            Err(ParseError::VarintTooLong { offset: 0 })
        ));
    }

    #[test]
    fn test_decode_varint_truncated() {
        let bytes = [0x81];
        assert!(matches!(
            decode_varint(&bytes, 0),
            Err(ParseError::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn test_be_readers() {
        let bytes = [0x4D, 0x54, 0x68, 0x64, 0x00, 0x00, 0x00, 0x06];
        assert_eq!(read_u16_be_at(&bytes, 0).unwrap(), 0x4D54);
        assert_eq!(read_u32_be_at(&bytes, 4).unwrap(), 6);
        assert!(read_u32_be_at(&bytes, 6).is_err());
        assert_eq!(read_slice(&bytes, 0, 4).unwrap(), b"MThd");
    }
}
