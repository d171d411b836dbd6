//! MIDI-equivalent output buffer.
//!
//! The ConvertToMidi pass writes `(tick, message)` pairs into one
//! `MidiTrack` per sequence track plus a shared conductor track for tempo,
//! time signature, and master volume. Writing a Standard MIDI File from
//! this is left to the caller.
use std::fmt;

/// A MIDI-style message without a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8 },
    ControlChange { controller: u8, value: u8 },
    ProgramChange(u8),
    /// Signed bend centred on 0, range -8192..=8191.
    PitchBend(i16),
    /// 14-bit device master volume.
    MasterVolume(u16),
    /// Microseconds per quarter note.
    Tempo(u32),
    TimeSignature {
        numerator: u8,
        denominator_pow2: u8,
        clocks_per_click: u8,
        thirty_seconds_per_quarter: u8,
    },
    Marker(String),
    EndOfTrack,
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiMessage::NoteOn { key, velocity } => write!(f, "NoteOn {key} vel {velocity}"),
            MidiMessage::NoteOff { key } => write!(f, "NoteOff {key}"),
            MidiMessage::ControlChange { controller, value } => {
                write!(f, "CC{controller} {value}")
            }
            MidiMessage::ProgramChange(p) => write!(f, "Program {p}"),
            MidiMessage::PitchBend(b) => write!(f, "PitchBend {b}"),
            MidiMessage::MasterVolume(v) => write!(f, "MasterVolume {v}"),
            MidiMessage::Tempo(us) => write!(f, "Tempo {us}us"),
            MidiMessage::TimeSignature {
                numerator,
                denominator_pow2,
                ..
            } => write!(f, "TimeSignature {numerator}/{}", 1u32 << denominator_pow2),
            MidiMessage::Marker(text) => write!(f, "Marker {text:?}"),
            MidiMessage::EndOfTrack => write!(f, "EndOfTrack"),
        }
    }
}

/// One timed message.
///
/// `transpose_tick` is set on note messages that follow the global
/// transpose: it holds the note-on tick, so a note-on and its note-off are
/// shifted by the same amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiEvent {
    pub tick: u32,
    pub channel: u8,
    pub message: MidiMessage,
    pub transpose_tick: Option<u32>,
}

#[derive(Debug, Default, Clone)]
pub struct MidiTrack {
    events: Vec<MidiEvent>,
}

impl MidiTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return its position.
    pub fn push(&mut self, tick: u32, channel: u8, message: MidiMessage) -> usize {
        self.push_event(MidiEvent {
            tick,
            channel,
            message,
            transpose_tick: None,
        })
    }

    pub fn push_event(&mut self, event: MidiEvent) -> usize {
        self.events.push(event);
        self.events.len() - 1
    }

    /// Move a previously pushed message (e.g. a revised note-off).
    ///
    /// # Panics
    ///
    /// Panics if `index` was not returned by `push` on this track.
    pub fn set_tick(&mut self, index: usize, tick: u32) {
        self.events[index].tick = tick;
    }

    pub fn events(&self) -> &[MidiEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Shift note keys by the global transpose in effect at each note's
    /// `transpose_tick`. Keys are clamped to 0..=127.
    pub fn apply_transpose(&mut self, transpose_at: impl Fn(u32) -> i32) {
        for event in &mut self.events {
            let Some(tick) = event.transpose_tick else {
                continue;
            };
            let shift = transpose_at(tick);
            if shift == 0 {
                continue;
            }
            match &mut event.message {
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key } => {
                    *key = clamp_key(*key as i32 + shift);
                }
                _ => {}
            }
        }
    }

    /// Sort stably by tick and keep a single end-of-track at the last tick.
    pub fn finalize(&mut self) {
        let end = self
            .events
            .iter()
            .find(|e| e.message == MidiMessage::EndOfTrack)
            .map(|e| (e.tick, e.channel));
        self.events.retain(|e| e.message != MidiMessage::EndOfTrack);
        self.events.sort_by_key(|e| e.tick);
        let last = self.events.last().map_or(0, |e| e.tick);
        let (tick, channel) = end.unwrap_or((last, 0));
        self.push(tick.max(last), channel, MidiMessage::EndOfTrack);
    }

    /// Last tick of the track.
    pub fn length(&self) -> u32 {
        self.events.iter().map(|e| e.tick).max().unwrap_or(0)
    }
}

/// Output of the ConvertToMidi pass.
#[derive(Debug, Default, Clone)]
pub struct MidiOutput {
    pub ppqn: u16,
    pub conductor: MidiTrack,
    pub tracks: Vec<MidiTrack>,
}

impl MidiOutput {
    /// Total message count over all tracks, conductor included.
    pub fn event_count(&self) -> usize {
        self.conductor.len() + self.tracks.iter().map(MidiTrack::len).sum::<usize>()
    }
}

// Controller numbers written by the interpreter.
pub const CC_BANK_MSB: u8 = 0;
pub const CC_MODULATION: u8 = 1;
pub const CC_BREATH: u8 = 2;
pub const CC_PORTAMENTO_TIME: u8 = 5;
pub const CC_DATA_ENTRY_MSB: u8 = 6;
pub const CC_VOLUME: u8 = 7;
pub const CC_PAN: u8 = 10;
pub const CC_EXPRESSION: u8 = 11;
pub const CC_BANK_LSB: u8 = 32;
pub const CC_DATA_ENTRY_LSB: u8 = 38;
pub const CC_SUSTAIN: u8 = 64;
pub const CC_PORTAMENTO: u8 = 65;
pub const CC_REVERB: u8 = 91;
pub const CC_CHORUS: u8 = 93;
pub const CC_RPN_LSB: u8 = 100;
pub const CC_RPN_MSB: u8 = 101;

pub fn clamp_key(key: i32) -> u8 {
    key.clamp(0, 127) as u8
}

/// Scale a 7-bit master volume to the 14-bit value of the universal SysEx.
pub fn master_volume_14bit(volume: u8) -> u16 {
    ((volume.min(127) as u32 * 0x3FFF) / 127) as u16
}
