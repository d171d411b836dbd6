//! RefSeq: a compact reference sequence format.
//!
//! # Layout
//!
//! All multi-byte values are little-endian.
//!
//! ```text
//! 0x00  "RSEQ"
//! 0x04  version (1)
//! 0x05  flags (bit 0: tick-synchronized)
//! 0x06  ppqn (u16)
//! 0x08  initial tempo in BPM (u16)
//! 0x0A  track count (u8)
//! 0x0B  per track: channel (u8), start offset (u16)
//! ```
//!
//! Each track is a stream of one-byte opcodes followed by their operands;
//! see [`op`] for the opcode table. Only rests and holds advance time.
use std::collections::HashMap;

use crate::binutil::{ParseError, read_slice, read_u8_at, read_u16_le_at};
use crate::sequence::{SeqFormat, SeqHeader, TrackDecoder, TrackPointer};
use crate::track::TrackSink;

pub const MAGIC: &[u8; 4] = b"RSEQ";
pub const VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 0x0B;
pub const TRACK_ENTRY_SIZE: usize = 3;
pub const FLAG_TICK_SYNC: u8 = 0x01;

/// Opcode values.
pub mod op {
    pub const END: u8 = 0x00;
    /// rest (u16 ticks)
    pub const REST: u8 = 0x01;
    /// tie (u16 ticks)
    pub const HOLD: u8 = 0x02;
    /// key, velocity
    pub const NOTE_ON: u8 = 0x10;
    /// key
    pub const NOTE_OFF: u8 = 0x11;
    /// key, velocity, u16 duration
    pub const NOTE: u8 = 0x12;
    /// semitone in the current octave, velocity, u16 duration
    pub const OCTAVE_NOTE: u8 = 0x13;
    pub const OCTAVE: u8 = 0x14;
    /// i8 semitones
    pub const KEY_CORRECTION: u8 = 0x15;
    /// key, or 0xFF to stop
    pub const DRUM_NOTE: u8 = 0x16;
    /// end the previous notes now
    pub const CUT: u8 = 0x17;
    pub const VOLUME: u8 = 0x20;
    /// u16 duration, target
    pub const VOLUME_SLIDE: u8 = 0x21;
    pub const PAN: u8 = 0x22;
    pub const PAN_SLIDE: u8 = 0x23;
    pub const EXPRESSION: u8 = 0x24;
    pub const EXPRESSION_SLIDE: u8 = 0x25;
    pub const MASTER_VOLUME: u8 = 0x26;
    pub const MASTER_VOLUME_SLIDE: u8 = 0x27;
    pub const PROGRAM: u8 = 0x30;
    /// u16 bank
    pub const BANK: u8 = 0x31;
    /// i16 bend
    pub const PITCH_BEND: u8 = 0x32;
    pub const TRANSPOSE: u8 = 0x33;
    pub const GLOBAL_TRANSPOSE: u8 = 0x34;
    /// controller, value
    pub const CONTROLLER: u8 = 0x35;
    pub const PITCH_BEND_RANGE: u8 = 0x36;
    pub const SUSTAIN: u8 = 0x37;
    /// u16 BPM
    pub const TEMPO: u8 = 0x40;
    /// u16 duration, u16 BPM
    pub const TEMPO_SLIDE: u8 = 0x41;
    /// numerator, denominator
    pub const TIME_SIGNATURE: u8 = 0x42;
    /// length, bytes
    pub const MARKER: u8 = 0x43;
    /// u16 destination
    pub const JUMP: u8 = 0x50;
    /// u16 destination
    pub const CALL: u8 = 0x51;
    pub const RETURN: u8 = 0x52;
    /// count (0 = forever)
    pub const LOOP_START: u8 = 0x53;
    pub const LOOP_END: u8 = 0x54;
    /// u16 destination
    pub const LOOP_FOREVER: u8 = 0x55;
}

/// The RefSeq format hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefSeqFormat;

impl SeqFormat for RefSeqFormat {
    fn name(&self) -> &str {
        "RefSeq"
    }

    fn parse_header(&mut self, bytes: &[u8], header: &mut SeqHeader) -> Result<(), ParseError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ParseError::HeaderTooShort(format!(
                "{} bytes, need {HEADER_SIZE}",
                bytes.len()
            )));
        }
        let ident = read_slice(bytes, 0, 4)?;
        if ident != MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(ident);
            return Err(ParseError::InvalidIdent(found));
        }
        let version = read_u8_at(bytes, 4)?;
        if version != VERSION {
            return Err(ParseError::UnsupportedVersion(version));
        }
        let flags = read_u8_at(bytes, 5)?;
        header.tick_sync = flags & FLAG_TICK_SYNC != 0;
        let ppqn = read_u16_le_at(bytes, 6)?;
        if ppqn != 0 {
            header.ppqn = ppqn;
        }
        let tempo = read_u16_le_at(bytes, 8)?;
        if tempo != 0 {
            header.initial_tempo_bpm = tempo as f64;
        }
        Ok(())
    }

    fn parse_track_pointers(&mut self, bytes: &[u8]) -> Result<Vec<TrackPointer>, ParseError> {
        let count = read_u8_at(bytes, 0x0A)? as usize;
        (0..count)
            .map(|i| {
                let entry = HEADER_SIZE + i * TRACK_ENTRY_SIZE;
                let channel = read_u8_at(bytes, entry).map_err(|e| e.with_context("track_pointer"))?;
                let offset = read_u16_le_at(bytes, entry + 1)
                    .map_err(|e| e.with_context("track_pointer"))?;
                Ok(TrackPointer {
                    offset: offset as u32,
                    channel,
                })
            })
            .collect()
    }

    fn new_decoder(&self, _track: usize) -> Box<dyn TrackDecoder> {
        Box::new(RefSeqDecoder)
    }
}

/// Decodes RefSeq opcodes into a [`TrackSink`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RefSeqDecoder;

fn span(sink: &dyn TrackSink, start: u32) -> u32 {
    sink.offset().saturating_sub(start)
}

impl TrackDecoder for RefSeqDecoder {
    fn read_event(&mut self, sink: &mut dyn TrackSink) -> Result<bool, ParseError> {
        let start = sink.offset();
        let opcode = sink.read_u8()?;
        match opcode {
            op::END => {
                return Ok(sink.add_end_of_track(start, 1));
            }
            op::REST => {
                let ticks = sink.read_u16_le()? as u32;
                let len = span(sink, start);
                sink.add_rest(start, len, ticks);
            }
            op::HOLD => {
                let ticks = sink.read_u16_le()? as u32;
                let len = span(sink, start);
                sink.add_hold(start, len, ticks);
            }
            op::NOTE_ON => {
                let key = sink.read_u8()?;
                let velocity = sink.read_u8()?;
                let len = span(sink, start);
                sink.add_note_on(start, len, key, velocity);
            }
            op::NOTE_OFF => {
                let key = sink.read_u8()?;
                let len = span(sink, start);
                sink.add_note_off(start, len, key);
            }
            op::NOTE => {
                let key = sink.read_u8()?;
                let velocity = sink.read_u8()?;
                let duration = sink.read_u16_le()? as u32;
                let len = span(sink, start);
                sink.add_note_by_dur(start, len, key, velocity, duration);
            }
            op::OCTAVE_NOTE => {
                let semitone = sink.read_u8()?;
                let velocity = sink.read_u8()?;
                let duration = sink.read_u16_le()? as u32;
                let key = sink.key_from_octave(semitone);
                let len = span(sink, start);
                sink.add_note_by_dur(start, len, key, velocity, duration);
            }
            op::OCTAVE => {
                let octave = sink.read_u8()?;
                sink.add_octave(start, 2, octave);
            }
            op::KEY_CORRECTION => {
                let semitones = sink.read_i8()?;
                sink.add_key_correction(start, 2, semitones);
            }
            op::DRUM_NOTE => {
                let key = sink.read_u8()?;
                sink.add_drum_note(start, 2, (key != 0xFF).then_some(key));
            }
            op::CUT => {
                let now = sink.time();
                sink.limit_prev_dur_note_end(now);
            }
            op::VOLUME => {
                let volume = sink.read_u8()?;
                sink.add_volume(start, 2, volume);
            }
            op::VOLUME_SLIDE => {
                let (duration, target) = read_slide(sink)?;
                sink.add_vol_slide(start, 4, duration, target);
            }
            op::PAN => {
                let pan = sink.read_u8()?;
                sink.add_pan(start, 2, pan);
            }
            op::PAN_SLIDE => {
                let (duration, target) = read_slide(sink)?;
                sink.add_pan_slide(start, 4, duration, target);
            }
            op::EXPRESSION => {
                let expression = sink.read_u8()?;
                sink.add_expression(start, 2, expression);
            }
            op::EXPRESSION_SLIDE => {
                let (duration, target) = read_slide(sink)?;
                sink.add_expression_slide(start, 4, duration, target);
            }
            op::MASTER_VOLUME => {
                let volume = sink.read_u8()?;
                sink.add_master_vol(start, 2, volume);
            }
            op::MASTER_VOLUME_SLIDE => {
                let (duration, target) = read_slide(sink)?;
                sink.add_master_vol_slide(start, 4, duration, target);
            }
            op::PROGRAM => {
                let program = sink.read_u8()?;
                sink.add_program_change(start, 2, program);
            }
            op::BANK => {
                let bank = sink.read_u16_le()?;
                sink.add_bank_select(start, 3, bank);
            }
            op::PITCH_BEND => {
                let bend = sink.read_u16_le()? as i16;
                sink.add_pitch_bend(start, 3, bend);
            }
            op::TRANSPOSE => {
                let semitones = sink.read_i8()?;
                sink.add_transpose(start, 2, semitones);
            }
            op::GLOBAL_TRANSPOSE => {
                let semitones = sink.read_i8()?;
                sink.add_global_transpose(start, 2, semitones);
            }
            op::CONTROLLER => {
                let controller = sink.read_u8()?;
                let value = sink.read_u8()?;
                sink.add_controller(start, 3, controller, value);
            }
            op::PITCH_BEND_RANGE => {
                let semitones = sink.read_u8()?;
                sink.add_pitch_bend_range(start, 2, semitones, 0);
            }
            op::SUSTAIN => {
                let on = sink.read_u8()? != 0;
                sink.add_sustain(start, 2, on);
            }
            op::TEMPO => {
                let bpm = sink.read_u16_le()?;
                sink.add_tempo_bpm(start, 3, bpm as f64);
            }
            op::TEMPO_SLIDE => {
                let duration = sink.read_u16_le()? as u32;
                let bpm = sink.read_u16_le()?;
                sink.add_tempo_slide(start, 5, duration, bpm as f64);
            }
            op::TIME_SIGNATURE => {
                let numerator = sink.read_u8()?;
                let denominator = sink.read_u8()?;
                let ppqn = read_u16_le_at(sink.bytes(), 6)?;
                sink.add_time_signature(start, 3, numerator, denominator, ppqn);
            }
            op::MARKER => {
                let count = sink.read_u8()?;
                let text_start = sink.offset();
                let text = read_slice(sink.bytes(), text_start as usize, count as usize)?;
                let text = String::from_utf8_lossy(text).into_owned();
                sink.set_offset(text_start + count as u32);
                sink.add_marker(start, 2 + count as u32, &text);
            }
            op::JUMP => {
                let destination = sink.read_u16_le()? as u32;
                return Ok(sink.add_jump(start, 3, destination));
            }
            op::CALL => {
                let destination = sink.read_u16_le()? as u32;
                let return_offset = sink.offset();
                return Ok(sink.add_call(start, 3, destination, return_offset));
            }
            op::RETURN => {
                return Ok(sink.add_return(start, 1));
            }
            op::LOOP_START => {
                let count = sink.read_u8()?;
                return Ok(sink.add_loop_start(start, 2, count as u32));
            }
            op::LOOP_END => {
                return Ok(sink.add_loop_end(start, 1));
            }
            op::LOOP_FOREVER => {
                let destination = sink.read_u16_le()? as u32;
                return Ok(sink.add_loop_forever(start, 3, destination));
            }
            _ => {
                sink.add_unknown(start, 1, &format!("opcode 0x{opcode:02X}"));
                return Err(ParseError::UnknownOpcode {
                    opcode,
                    offset: start as usize,
                });
            }
        }
        Ok(true)
    }
}

fn read_slide(sink: &mut dyn TrackSink) -> Result<(u32, u8), ParseError> {
    let duration = sink.read_u16_le()? as u32;
    let target = sink.read_u8()?;
    Ok((duration, target))
}

#[derive(Debug, Clone, Default)]
struct TrackBody {
    channel: u8,
    code: Vec<u8>,
}

/// Assembles RefSeq bytes, with labels for jump and call targets.
///
/// Labels are shared by all tracks, so a track may call a subroutine
/// written in another track's body.
///
/// ```
/// use vgmseq::format::RefSeqBuilder;
///
/// let mut builder = RefSeqBuilder::new();
/// builder
///     .add_track(0)
///     .call_to("phrase")
///     .end()
///     .label("phrase")
///     .note(64, 90, 12)
///     .rest(12)
///     .ret();
/// let (bytes, labels) = builder.build_with_labels();
/// assert_eq!(&bytes[0..4], b"RSEQ");
/// assert_eq!(labels["phrase"], 0x0B + 3 + 4);
/// ```
#[derive(Debug, Clone)]
pub struct RefSeqBuilder {
    flags: u8,
    ppqn: u16,
    tempo: u16,
    tracks: Vec<TrackBody>,
    // label -> (track, position in body)
    labels: HashMap<String, (usize, usize)>,
    // (track, position in body, label) of u16 operands to patch
    fixups: Vec<(usize, usize, String)>,
}

impl RefSeqBuilder {
    pub fn new() -> Self {
        Self {
            flags: 0,
            ppqn: 48,
            tempo: 120,
            tracks: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
        }
    }

    pub fn set_ppqn(&mut self, ppqn: u16) -> &mut Self {
        self.ppqn = ppqn;
        self
    }

    pub fn set_tempo(&mut self, bpm: u16) -> &mut Self {
        self.tempo = bpm;
        self
    }

    pub fn set_tick_sync(&mut self, tick_sync: bool) -> &mut Self {
        if tick_sync {
            self.flags |= FLAG_TICK_SYNC;
        } else {
            self.flags &= !FLAG_TICK_SYNC;
        }
        self
    }

    /// Start a new track. Following instructions are appended to it.
    pub fn add_track(&mut self, channel: u8) -> &mut Self {
        self.tracks.push(TrackBody {
            channel,
            code: Vec::new(),
        });
        self
    }

    /// Name the position of the next instruction.
    ///
    /// # Panics
    ///
    /// Panics if the label is already defined.
    pub fn label(&mut self, name: &str) -> &mut Self {
        let track = self.current_track();
        let position = self.tracks[track].code.len();
        let previous = self.labels.insert(name.to_string(), (track, position));
        assert!(previous.is_none(), "label {name:?} defined twice");
        self
    }

    /// Append raw bytes to the current track.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        let track = self.current_track();
        self.tracks[track].code.extend_from_slice(bytes);
        self
    }

    pub fn end(&mut self) -> &mut Self {
        self.raw(&[op::END])
    }

    pub fn rest(&mut self, ticks: u16) -> &mut Self {
        self.op_u16(op::REST, ticks)
    }

    pub fn hold(&mut self, ticks: u16) -> &mut Self {
        self.op_u16(op::HOLD, ticks)
    }

    pub fn note_on(&mut self, key: u8, velocity: u8) -> &mut Self {
        self.raw(&[op::NOTE_ON, key, velocity])
    }

    pub fn note_off(&mut self, key: u8) -> &mut Self {
        self.raw(&[op::NOTE_OFF, key])
    }

    /// Note with a duration. Does not advance time.
    pub fn note(&mut self, key: u8, velocity: u8, duration: u16) -> &mut Self {
        let [lo, hi] = duration.to_le_bytes();
        self.raw(&[op::NOTE, key, velocity, lo, hi])
    }

    pub fn octave_note(&mut self, semitone: u8, velocity: u8, duration: u16) -> &mut Self {
        let [lo, hi] = duration.to_le_bytes();
        self.raw(&[op::OCTAVE_NOTE, semitone, velocity, lo, hi])
    }

    pub fn octave(&mut self, octave: u8) -> &mut Self {
        self.raw(&[op::OCTAVE, octave])
    }

    pub fn key_correction(&mut self, semitones: i8) -> &mut Self {
        self.raw(&[op::KEY_CORRECTION, semitones as u8])
    }

    pub fn drum_note(&mut self, key: Option<u8>) -> &mut Self {
        self.raw(&[op::DRUM_NOTE, key.unwrap_or(0xFF)])
    }

    pub fn cut(&mut self) -> &mut Self {
        self.raw(&[op::CUT])
    }

    pub fn volume(&mut self, volume: u8) -> &mut Self {
        self.raw(&[op::VOLUME, volume])
    }

    pub fn volume_slide(&mut self, duration: u16, target: u8) -> &mut Self {
        self.slide(op::VOLUME_SLIDE, duration, target)
    }

    pub fn pan(&mut self, pan: u8) -> &mut Self {
        self.raw(&[op::PAN, pan])
    }

    pub fn pan_slide(&mut self, duration: u16, target: u8) -> &mut Self {
        self.slide(op::PAN_SLIDE, duration, target)
    }

    pub fn expression(&mut self, expression: u8) -> &mut Self {
        self.raw(&[op::EXPRESSION, expression])
    }

    pub fn expression_slide(&mut self, duration: u16, target: u8) -> &mut Self {
        self.slide(op::EXPRESSION_SLIDE, duration, target)
    }

    pub fn master_volume(&mut self, volume: u8) -> &mut Self {
        self.raw(&[op::MASTER_VOLUME, volume])
    }

    pub fn master_volume_slide(&mut self, duration: u16, target: u8) -> &mut Self {
        self.slide(op::MASTER_VOLUME_SLIDE, duration, target)
    }

    pub fn program(&mut self, program: u8) -> &mut Self {
        self.raw(&[op::PROGRAM, program])
    }

    pub fn bank(&mut self, bank: u16) -> &mut Self {
        self.op_u16(op::BANK, bank)
    }

    pub fn pitch_bend(&mut self, bend: i16) -> &mut Self {
        self.op_u16(op::PITCH_BEND, bend as u16)
    }

    pub fn transpose(&mut self, semitones: i8) -> &mut Self {
        self.raw(&[op::TRANSPOSE, semitones as u8])
    }

    pub fn global_transpose(&mut self, semitones: i8) -> &mut Self {
        self.raw(&[op::GLOBAL_TRANSPOSE, semitones as u8])
    }

    pub fn controller(&mut self, controller: u8, value: u8) -> &mut Self {
        self.raw(&[op::CONTROLLER, controller, value])
    }

    pub fn pitch_bend_range(&mut self, semitones: u8) -> &mut Self {
        self.raw(&[op::PITCH_BEND_RANGE, semitones])
    }

    pub fn sustain(&mut self, on: bool) -> &mut Self {
        self.raw(&[op::SUSTAIN, on as u8])
    }

    pub fn tempo(&mut self, bpm: u16) -> &mut Self {
        self.op_u16(op::TEMPO, bpm)
    }

    pub fn tempo_slide(&mut self, duration: u16, bpm: u16) -> &mut Self {
        let [d0, d1] = duration.to_le_bytes();
        let [b0, b1] = bpm.to_le_bytes();
        self.raw(&[op::TEMPO_SLIDE, d0, d1, b0, b1])
    }

    pub fn time_signature(&mut self, numerator: u8, denominator: u8) -> &mut Self {
        self.raw(&[op::TIME_SIGNATURE, numerator, denominator])
    }

    /// # Panics
    ///
    /// Panics if `text` is longer than 255 bytes.
    pub fn marker(&mut self, text: &str) -> &mut Self {
        let Ok(len) = u8::try_from(text.len()) else {
            panic!("marker text longer than 255 bytes: {}", text.len());
        };
        self.raw(&[op::MARKER, len]).raw(text.as_bytes())
    }

    /// Jump to an absolute offset.
    pub fn jump(&mut self, destination: u16) -> &mut Self {
        self.op_u16(op::JUMP, destination)
    }

    pub fn jump_to(&mut self, label: &str) -> &mut Self {
        self.op_label(op::JUMP, label)
    }

    pub fn call_to(&mut self, label: &str) -> &mut Self {
        self.op_label(op::CALL, label)
    }

    pub fn ret(&mut self) -> &mut Self {
        self.raw(&[op::RETURN])
    }

    pub fn loop_start(&mut self, count: u8) -> &mut Self {
        self.raw(&[op::LOOP_START, count])
    }

    pub fn loop_end(&mut self) -> &mut Self {
        self.raw(&[op::LOOP_END])
    }

    pub fn loop_forever_to(&mut self, label: &str) -> &mut Self {
        self.op_label(op::LOOP_FOREVER, label)
    }

    /// Assemble the sequence.
    ///
    /// # Panics
    ///
    /// Panics if a referenced label is undefined or the data does not fit
    /// 16-bit offsets.
    pub fn build(&self) -> Vec<u8> {
        self.build_with_labels().0
    }

    /// Assemble the sequence and return the absolute offset of every label.
    pub fn build_with_labels(&self) -> (Vec<u8>, HashMap<String, u32>) {
        let table_end = HEADER_SIZE + self.tracks.len() * TRACK_ENTRY_SIZE;
        let mut bases = Vec::with_capacity(self.tracks.len());
        let mut next = table_end;
        for track in &self.tracks {
            bases.push(next);
            next += track.code.len();
        }
        assert!(next <= u16::MAX as usize + 1, "sequence exceeds 64 KiB");
        let labels: HashMap<String, u32> = self
            .labels
            .iter()
            .map(|(name, &(track, position))| (name.clone(), (bases[track] + position) as u32))
            .collect();

        let mut bytes = Vec::with_capacity(next);
        bytes.extend_from_slice(MAGIC);
        bytes.push(VERSION);
        bytes.push(self.flags);
        bytes.extend_from_slice(&self.ppqn.to_le_bytes());
        bytes.extend_from_slice(&self.tempo.to_le_bytes());
        bytes.push(self.tracks.len() as u8);
        for (track, base) in self.tracks.iter().zip(&bases) {
            bytes.push(track.channel);
            bytes.extend_from_slice(&(*base as u16).to_le_bytes());
        }
        for track in &self.tracks {
            bytes.extend_from_slice(&track.code);
        }
        for (track, position, label) in &self.fixups {
            let target = match labels.get(label) {
                Some(&target) => target as u16,
                None => panic!("undefined label {label:?}"),
            };
            let at = bases[*track] + position;
            bytes[at..at + 2].copy_from_slice(&target.to_le_bytes());
        }
        (bytes, labels)
    }

    fn current_track(&mut self) -> usize {
        if self.tracks.is_empty() {
            self.add_track(0);
        }
        self.tracks.len() - 1
    }

    fn op_u16(&mut self, opcode: u8, value: u16) -> &mut Self {
        let [lo, hi] = value.to_le_bytes();
        self.raw(&[opcode, lo, hi])
    }

    fn slide(&mut self, opcode: u8, duration: u16, target: u8) -> &mut Self {
        let [lo, hi] = duration.to_le_bytes();
        self.raw(&[opcode, lo, hi, target])
    }

    fn op_label(&mut self, opcode: u8, label: &str) -> &mut Self {
        let track = self.current_track();
        let position = self.tracks[track].code.len() + 1;
        self.fixups.push((track, position, label.to_string()));
        self.raw(&[opcode, 0, 0])
    }
}

impl Default for RefSeqBuilder {
    fn default() -> Self {
        Self::new()
    }
}
