//! Utilities used by format decoders: parse error type and byte readers.
//!
//! Every read is bounds-checked. A read past the end of the buffer returns
//! `ParseError::OffsetOutOfRange` instead of panicking, which lets the
//! sequence driver treat truncated input as "this track ends here".
use thiserror::Error;

/// Error type returned by the reading helpers in this module and by
/// format decoders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// An attempted read was outside the available buffer range.
    ///
    /// - `offset` is the index that was attempted to be accessed.
    /// - `needed` is the number of bytes required for the operation.
    /// - `available` is the current buffer length.
    /// - `context` optionally names the logical location of the access
    ///   (for example `"track_pointer"`).
    #[error(
        "offset out of range{}: 0x{offset:X} (needed {needed} bytes, available {available})",
        context_suffix(.context)
    )]
    OffsetOutOfRange {
        offset: usize,
        needed: usize,
        available: usize,
        context: Option<String>,
    },

    /// A four-byte identifier did not match the expected magic.
    #[error("invalid ident: {0:?}")]
    InvalidIdent([u8; 4]),

    /// The data uses a format version the decoder does not support.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// A header was shorter than the minimum required length.
    #[error("header too short: {0}")]
    HeaderTooShort(String),

    /// An opcode byte was not recognized by the decoder.
    #[error("unknown opcode 0x{opcode:02X} at offset 0x{offset:X}")]
    UnknownOpcode { opcode: u8, offset: usize },

    /// A generic error with a human-readable message.
    #[error("{0}")]
    Other(String),
}

impl ParseError {
    /// Attach a context label to an `OffsetOutOfRange` error.
    ///
    /// Other variants are returned unchanged.
    pub fn with_context(self, label: &str) -> Self {
        match self {
            ParseError::OffsetOutOfRange {
                offset,
                needed,
                available,
                ..
            } => ParseError::OffsetOutOfRange {
                offset,
                needed,
                available,
                context: Some(label.to_string()),
            },
            other => other,
        }
    }
}

fn context_suffix(context: &Option<String>) -> String {
    context
        .as_ref()
        .map(|c| format!(" at {c}"))
        .unwrap_or_default()
}

fn check_range(bytes: &[u8], off: usize, needed: usize) -> Result<(), ParseError> {
    match off.checked_add(needed) {
        Some(end) if end <= bytes.len() => Ok(()),
        _ => Err(ParseError::OffsetOutOfRange {
            offset: off,
            needed,
            available: bytes.len(),
            context: None,
        }),
    }
}

/// Read a single byte from `bytes` at `off`.
pub fn read_u8_at(bytes: &[u8], off: usize) -> Result<u8, ParseError> {
    check_range(bytes, off, 1)?;
    Ok(bytes[off])
}

/// Read a 16-bit little-endian unsigned integer from `bytes` at `off`.
pub fn read_u16_le_at(bytes: &[u8], off: usize) -> Result<u16, ParseError> {
    check_range(bytes, off, 2)?;
    Ok(u16::from_le_bytes([bytes[off], bytes[off + 1]]))
}

/// Read a 16-bit big-endian unsigned integer from `bytes` at `off`.
pub fn read_u16_be_at(bytes: &[u8], off: usize) -> Result<u16, ParseError> {
    check_range(bytes, off, 2)?;
    Ok(u16::from_be_bytes([bytes[off], bytes[off + 1]]))
}

/// Read a 32-bit little-endian unsigned integer from `bytes` at `off`.
///
/// Returns `Err(ParseError::OffsetOutOfRange)` when the buffer is too short.
pub fn read_u32_le_at(bytes: &[u8], off: usize) -> Result<u32, ParseError> {
    check_range(bytes, off, 4)?;
    let mut tmp: [u8; 4] = [0; 4];
    tmp.copy_from_slice(&bytes[off..off + 4]);
    Ok(u32::from_le_bytes(tmp))
}

/// Read a 32-bit big-endian unsigned integer from `bytes` at `off`.
pub fn read_u32_be_at(bytes: &[u8], off: usize) -> Result<u32, ParseError> {
    check_range(bytes, off, 4)?;
    let mut tmp: [u8; 4] = [0; 4];
    tmp.copy_from_slice(&bytes[off..off + 4]);
    Ok(u32::from_be_bytes(tmp))
}

/// Return a borrowed slice of length `len` starting at `off` from `bytes`.
///
/// On failure the reported `available` count is the number of bytes left
/// from `off` to the end of the buffer.
pub fn read_slice(bytes: &[u8], off: usize, len: usize) -> Result<&[u8], ParseError> {
    if check_range(bytes, off, len).is_err() {
        return Err(ParseError::OffsetOutOfRange {
            offset: off,
            needed: len,
            available: bytes.len().saturating_sub(off),
            context: Some("read_slice".into()),
        });
    }
    Ok(&bytes[off..off + len])
}

/// Random-access, bounds-checked reads over a format's byte range.
///
/// Implemented for `[u8]`, so `Vec<u8>` and `&[u8]` can be used anywhere
/// a `ByteSource` is expected.
pub trait ByteSource {
    /// The full byte range visible to the decoder.
    fn bytes(&self) -> &[u8];

    /// Number of readable bytes.
    fn len(&self) -> usize {
        self.bytes().len()
    }

    /// True when the source holds no bytes.
    fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    fn read_byte(&self, off: u32) -> Result<u8, ParseError> {
        read_u8_at(self.bytes(), off as usize)
    }

    fn read_short(&self, off: u32) -> Result<u16, ParseError> {
        read_u16_le_at(self.bytes(), off as usize)
    }

    fn read_short_be(&self, off: u32) -> Result<u16, ParseError> {
        read_u16_be_at(self.bytes(), off as usize)
    }

    fn read_word(&self, off: u32) -> Result<u32, ParseError> {
        read_u32_le_at(self.bytes(), off as usize)
    }

    fn read_word_be(&self, off: u32) -> Result<u32, ParseError> {
        read_u32_be_at(self.bytes(), off as usize)
    }
}

impl ByteSource for [u8] {
    fn bytes(&self) -> &[u8] {
        self
    }
}

impl ByteSource for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_in_both_byte_orders() {
        let data = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(read_u16_le_at(&data, 0).unwrap(), 0x3412);
        assert_eq!(read_u16_be_at(&data, 0).unwrap(), 0x1234);
        assert_eq!(read_u32_le_at(&data, 0).unwrap(), 0x7856_3412);
        assert_eq!(read_u32_be_at(&data, 0).unwrap(), 0x1234_5678);
        assert_eq!(data.as_slice().read_short_be(2).unwrap(), 0x5678);
    }

    #[test]
    fn test_read_past_end_is_an_error() {
        let data = [0u8; 3];
        assert!(matches!(
            read_u32_le_at(&data, 0),
            Err(ParseError::OffsetOutOfRange {
                offset: 0,
                needed: 4,
                available: 3,
                ..
            })
        ));
        assert!(read_u8_at(&data, 3).is_err());
        assert!(read_u16_le_at(&data, usize::MAX).is_err());
    }

    #[test]
    fn test_read_slice_reports_remaining_bytes() {
        let data = [1u8, 2, 3, 4, 5];
        assert_eq!(read_slice(&data, 1, 3).unwrap(), &[2, 3, 4]);
        match read_slice(&data, 3, 4) {
            Err(ParseError::OffsetOutOfRange { available, .. }) => assert_eq!(available, 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_context_is_rendered() {
        let err = read_u8_at(&[], 7).unwrap_err().with_context("track_pointer");
        assert_eq!(
            err.to_string(),
            "offset out of range at track_pointer: 0x7 (needed 1 bytes, available 0)"
        );
    }
}
