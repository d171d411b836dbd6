//! Per-track interpreter state.
use std::collections::HashSet;

use crate::midi::MidiTrack;
use crate::sequence::SeqHeader;
use crate::slider::{ExpressionSlider, PanSlider, VolSlider};

/// A counted loop in progress.
///
/// `remaining` counts body iterations still to play, including the current
/// one. A loop started with count 0 keeps `remaining == 0` and repeats
/// until the loop guard stops it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopFrame {
    pub start: u32,
    pub remaining: u32,
}

/// Resumable read position of a track.
///
/// This is all a scheduler needs to suspend a track between ticks and
/// resume it later.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackCursor {
    /// Offset of the next instruction.
    pub offset: u32,
    /// Ticks left before the next instruction (tick-synchronized mode).
    pub delta_time: u32,
    /// Return offsets of active calls, innermost last.
    pub call_stack: Vec<u32>,
    pub loop_stack: Vec<LoopFrame>,
}

impl TrackCursor {
    pub fn new(offset: u32) -> Self {
        Self {
            offset,
            ..Default::default()
        }
    }
}

/// A control-flow state: where control goes and in what context.
///
/// Reaching the same key twice within a pass means the track is cycling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct GuardKey {
    pub destination: u32,
    pub call_stack: Vec<u32>,
    pub loop_stack: Vec<LoopFrame>,
}

/// A note started with a duration that may still be revised.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DurNote {
    pub key: u8,
    pub start: u32,
    pub end: u32,
    pub timeline: Option<usize>,
    pub midi_off: Option<usize>,
    /// Member of the set that ties and cuts act on.
    pub tracked: bool,
}

/// A note started by an explicit note-on, waiting for its note-off.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OpenNote {
    pub key: u8,
    pub midi_key: u8,
    pub start: u32,
    pub timeline: Option<usize>,
    pub transpose_tick: Option<u32>,
}

/// Everything one track interpreter owns.
///
/// Built once per sequence. [`TrackState::reset_vars`] returns it to the
/// start of the track before each pass; only the start offset and the
/// track's channel assignment survive.
#[derive(Debug, Clone)]
pub struct TrackState {
    pub(crate) index: usize,
    pub(crate) start_offset: u32,
    pub(crate) start_channel: u8,
    pub(crate) channel: u8,

    pub(crate) cursor: TrackCursor,
    pub(crate) time: u32,
    pub(crate) active: bool,
    pub(crate) steps: u32,
    pub(crate) total_ticks: u32,

    pub(crate) infinite_loops: u32,
    pub(crate) measured_loops: u32,
    pub(crate) measured_ticks: u32,
    pub(crate) visited: HashSet<GuardKey>,
    pub(crate) loop_anchor: Option<GuardKey>,
    pub(crate) last_revisit_time: Option<u32>,

    pub(crate) volume: u8,
    pub(crate) expression: u8,
    pub(crate) pan: u8,
    pub(crate) octave: u8,
    pub(crate) transpose: i8,
    pub(crate) key_correction: i8,
    pub(crate) drum_note: Option<u8>,

    pub(crate) dur_notes: Vec<DurNote>,
    pub(crate) open_notes: Vec<OpenNote>,

    pub(crate) vol_slider: Option<VolSlider>,
    pub(crate) expression_slider: Option<ExpressionSlider>,
    pub(crate) pan_slider: Option<PanSlider>,

    pub(crate) midi: MidiTrack,
}

impl TrackState {
    pub fn new(index: usize, start_offset: u32, channel: u8) -> Self {
        Self {
            index,
            start_offset,
            start_channel: channel,
            channel,
            cursor: TrackCursor::new(start_offset),
            time: 0,
            active: true,
            steps: 0,
            total_ticks: 0,
            infinite_loops: 0,
            measured_loops: 0,
            measured_ticks: 0,
            visited: HashSet::new(),
            loop_anchor: None,
            last_revisit_time: None,
            volume: 100,
            expression: 127,
            pan: 64,
            octave: 4,
            transpose: 0,
            key_correction: 0,
            drum_note: None,
            dur_notes: Vec::new(),
            open_notes: Vec::new(),
            vol_slider: None,
            expression_slider: None,
            pan_slider: None,
            midi: MidiTrack::new(),
        }
    }

    /// Clear everything a pass mutates. The start offset and the figures
    /// measured by the last length pass are kept.
    pub fn reset_vars(&mut self, header: &SeqHeader) {
        *self = Self {
            measured_loops: self.measured_loops,
            measured_ticks: self.measured_ticks,
            volume: header.initial_volume,
            expression: header.initial_expression,
            pan: header.initial_pan,
            ..Self::new(self.index, self.start_offset, self.start_channel)
        };
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn start_offset(&self) -> u32 {
        self.start_offset
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn cursor(&self) -> &TrackCursor {
        &self.cursor
    }

    /// Tick of the next instruction.
    pub fn time(&self) -> u32 {
        self.time
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Tick at which the track stopped in the last pass.
    pub fn total_ticks(&self) -> u32 {
        self.total_ticks
    }

    /// Loop guard trips in the last pass.
    pub fn infinite_loops(&self) -> u32 {
        self.infinite_loops
    }

    /// Loop guard trips counted by the last FindDeltaLength pass.
    pub fn measured_loops(&self) -> u32 {
        self.measured_loops
    }

    /// Length in ticks, loop repeats included, from the last
    /// FindDeltaLength pass.
    pub fn measured_ticks(&self) -> u32 {
        self.measured_ticks
    }

    /// Decode steps taken in the last pass.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn expression(&self) -> u8 {
        self.expression
    }

    pub fn pan(&self) -> u8 {
        self.pan
    }

    pub fn octave(&self) -> u8 {
        self.octave
    }

    pub fn transpose(&self) -> i8 {
        self.transpose
    }

    /// Earliest tick after `tick` at which one of the sliders emits.
    pub(crate) fn next_slider_tick(&self, tick: u32) -> Option<u32> {
        [
            self.vol_slider.and_then(|s| s.next_change(tick)),
            self.expression_slider.and_then(|s| s.next_change(tick)),
            self.pan_slider.and_then(|s| s.next_change(tick)),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}
