#![doc = include_str!("../README.md")]
//! vgmseq: sequence interpretation and timeline engine
//!
//! Module overview, leaves first:
//!
//! - [`event`]: what a decoded instruction means (`Event`, `EventKind`)
//!   and the arena that owns every event of a sequence.
//! - [`timeline`]: events placed at ticks, with revisable durations and
//!   sweep-line "active at tick" queries.
//! - [`transpose`]: global and per-track transpose in effect at any tick,
//!   derived from the timeline.
//! - [`slider`]: linear controller ramps.
//! - [`track`]: the per-channel interpreter, its loop guard, and the
//!   `TrackSink` interface decoders write into.
//! - [`sequence`]: the three-pass driver over all tracks.
//! - [`midi`]: the MIDI-equivalent output buffer.
//! - [`format`]: the RefSeq reference format and its assembler.
//!
//! Example: counting loop repeats
//!
//! ```rust
//! use vgmseq::format::{RefSeqBuilder, RefSeqFormat};
//! use vgmseq::{Pass, Sequence};
//!
//! let mut b = RefSeqBuilder::new();
//! b.add_track(0).label("top").note_on(60, 100).jump_to("top");
//!
//! let mut seq = Sequence::new(b.build(), RefSeqFormat).unwrap();
//! seq.set_loop_count(1);
//! seq.run_pass(Pass::FindDeltaLength, 0);
//!
//! let note_ons = seq
//!     .timeline()
//!     .entries()
//!     .iter()
//!     .filter(|t| seq.events()[t.event].name() == "Note On")
//!     .count();
//! assert_eq!(note_ons, 3);
//! assert_eq!(seq.track(0).infinite_loops(), 2);
//! ```
pub mod binutil;
pub mod error;
pub mod event;
pub mod format;
pub mod midi;
pub mod sequence;
pub mod slider;
pub mod timeline;
pub mod track;
pub mod transpose;

pub use binutil::{ByteSource, ParseError};
pub use error::SeqError;
pub use event::{Event, EventArena, EventId, EventKind, TransposeScope};
pub use sequence::{
    Pass, SeqFormat, SeqHeader, SeqOptions, SeqSummary, Sequence, TrackDecoder, TrackPointer,
};
pub use timeline::{TimedEvent, TimelineCursor, TimelineIndex};
pub use track::{TrackSink, TrackState};
pub use transpose::TransposeTimeline;
