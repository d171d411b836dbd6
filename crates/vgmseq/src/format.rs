//! Sequence formats.
//!
//! A format provides a [`SeqFormat`] for the header and track table and a
//! [`TrackDecoder`] per track that turns opcodes into [`TrackSink`] calls.
//! [`refseq`] is a small self-describing format used to exercise the
//! interpreter and as a template for real decoders.
//!
//! [`SeqFormat`]: crate::sequence::SeqFormat
//! [`TrackDecoder`]: crate::sequence::TrackDecoder
//! [`TrackSink`]: crate::track::TrackSink
pub mod refseq;

pub use refseq::{RefSeqBuilder, RefSeqDecoder, RefSeqFormat};
