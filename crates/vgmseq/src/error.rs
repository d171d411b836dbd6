//! Crate-level error type.
//!
//! Data errors met while interpreting a track never surface here: they end
//! the affected track and the pass carries on. `SeqError` covers the
//! structural failures that prevent a sequence from being interpreted at all.
use thiserror::Error;

use crate::binutil::ParseError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeqError {
    /// The header or track pointer table could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The format reported zero tracks.
    #[error("sequence has no tracks")]
    NoTracks,

    /// A track start offset lies outside the byte source.
    #[error("track {track} starts at 0x{offset:X}, outside of {len} bytes")]
    TrackPointerOutOfRange { track: usize, offset: u32, len: usize },

    /// More tracks than the MIDI output can address.
    #[error("too many tracks: {0}")]
    TooManyTracks(usize),
}
