//! Sequence root: tracks, format hooks, and the three-pass driver.
//!
//! A [`Sequence`] is built once per source buffer. It asks a [`SeqFormat`]
//! for the header and the track start offsets, creates one
//! [`TrackDecoder`] per track, and then interprets every track in three
//! passes:
//!
//! | Pass | Produces | Stops a track on |
//! |---|---|---|
//! | [`Pass::AddToUi`] | the event list, at source offsets | first loop, or end |
//! | [`Pass::FindDeltaLength`] | the length with the configured loop repeats | loop budget, or end |
//! | [`Pass::ConvertToMidi`] | the MIDI-equivalent output | the measured length |
//!
//! Tracks are normally interpreted one after another. Formats whose
//! drivers share state between channels mid-tick set
//! [`SeqHeader::tick_sync`], and every track then advances one tick per
//! round against a common clock.
//!
//! # Examples
//!
//! ```
//! use vgmseq::format::{RefSeqBuilder, RefSeqFormat};
//! use vgmseq::sequence::Sequence;
//!
//! let mut builder = RefSeqBuilder::new();
//! builder
//!     .add_track(0)
//!     .label("top")
//!     .note(60, 100, 24)
//!     .rest(24)
//!     .jump_to("top");
//! let bytes = builder.build();
//!
//! let mut seq = Sequence::new(bytes, RefSeqFormat).unwrap();
//! seq.set_loop_count(1);
//! seq.load();
//!
//! // played once, then repeated until the second guard trip
//! assert_eq!(seq.delta_length(), 24 * 3);
//! assert_eq!(seq.track(0).measured_loops(), 2);
//! assert!(seq.midi().is_some());
//! assert_eq!(seq.ui_events(0).len(), 3);
//! ```
use tracing::{debug, warn};

use crate::binutil::ParseError;
use crate::error::SeqError;
use crate::event::{Event, EventArena, note_name};
use crate::midi::{
    CC_EXPRESSION, CC_PAN, CC_VOLUME, MidiMessage, MidiOutput, MidiTrack, master_volume_14bit,
};
use crate::slider::{MasterVolSlider, bpm_to_micros};
use crate::timeline::TimelineIndex;
use crate::track::{PassContext, TrackInterpreter, TrackSink, TrackState};
use crate::transpose::TransposeTimeline;

/// Upper bound on the number of tracks a sequence may declare.
pub const MAX_TRACKS: usize = 256;

/// The three interpretation passes, in the order `load()` runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Build the inspectable event list.
    AddToUi,
    /// Measure each track's length including loop repeats.
    FindDeltaLength,
    /// Emit MIDI-equivalent output up to the measured length.
    ConvertToMidi,
}

/// Sequence-wide settings read from the format header.
#[derive(Debug, Clone, PartialEq)]
pub struct SeqHeader {
    /// Ticks per quarter note.
    pub ppqn: u16,
    pub initial_tempo_bpm: f64,
    /// Interpret all tracks against one clock, one tick at a time.
    pub tick_sync: bool,
    pub initial_volume: u8,
    pub initial_expression: u8,
    pub initial_pan: u8,
    pub initial_program: Option<u8>,
    pub name: String,
}

impl Default for SeqHeader {
    fn default() -> Self {
        Self {
            ppqn: 48,
            initial_tempo_bpm: 120.0,
            tick_sync: false,
            initial_volume: 100,
            initial_expression: 127,
            initial_pan: 64,
            initial_program: None,
            name: String::new(),
        }
    }
}

/// Interpretation limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqOptions {
    /// Loop guard trips the length pass plays through. It stops a track
    /// at the trip that exceeds this count.
    pub loop_count: u32,
    /// Decode steps allowed per track per pass.
    pub max_steps_per_track: u32,
    /// Deepest call or loop nesting accepted.
    pub max_stack_depth: usize,
    /// Write the header's tempo and channel state at tick 0 of the MIDI
    /// output.
    pub write_initial_state: bool,
}

impl Default for SeqOptions {
    fn default() -> Self {
        Self {
            loop_count: 1,
            max_steps_per_track: 1 << 20,
            max_stack_depth: 64,
            write_initial_state: true,
        }
    }
}

/// Where a track's instruction stream starts, and its MIDI channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackPointer {
    pub offset: u32,
    pub channel: u8,
}

/// Decodes one track's instructions.
pub trait TrackDecoder {
    /// Decode the instruction at the sink's cursor and report it.
    ///
    /// Returns `Ok(false)` when the track ends (including a refused
    /// control transfer) and `Err` for malformed data. Either way the
    /// track stops; other tracks are unaffected.
    fn read_event(&mut self, sink: &mut dyn TrackSink) -> Result<bool, ParseError>;

    /// Clear format-private state before a pass.
    fn reset_vars(&mut self) {}
}

/// Hooks a sequence format provides. Called once, from `Sequence::new`.
pub trait SeqFormat {
    fn name(&self) -> &str;

    fn parse_header(&mut self, bytes: &[u8], header: &mut SeqHeader) -> Result<(), ParseError>;

    fn parse_track_pointers(&mut self, bytes: &[u8]) -> Result<Vec<TrackPointer>, ParseError>;

    fn new_decoder(&self, track: usize) -> Box<dyn TrackDecoder>;
}

/// State shared by all tracks of a sequence.
#[derive(Debug, Default)]
pub(crate) struct SeqState {
    pub arena: EventArena,
    pub timeline: TimelineIndex,
    pub conductor: MidiTrack,
    pub tempo_bpm: f64,
    pub master_volume: u8,
    pub master_vol_slider: Option<MasterVolSlider>,
    pub global_transpose: i8,
}

impl SeqState {
    fn reset(&mut self, header: &SeqHeader) {
        self.timeline.clear();
        self.conductor = MidiTrack::new();
        self.tempo_bpm = header.initial_tempo_bpm;
        self.master_volume = 127;
        self.master_vol_slider = None;
        self.global_transpose = 0;
    }
}

/// Per-track figures after `load()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSummary {
    pub index: usize,
    pub channel: u8,
    pub start_offset: u32,
    pub event_count: usize,
    pub total_ticks: u32,
    pub infinite_loops: u32,
    pub midi_events: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeqSummary {
    pub format: String,
    pub name: String,
    pub ppqn: u16,
    pub initial_tempo_bpm: f64,
    pub tick_sync: bool,
    pub delta_length: u32,
    pub event_count: usize,
    pub tracks: Vec<TrackSummary>,
}

/// A sequence and everything its passes produce.
pub struct Sequence {
    bytes: Vec<u8>,
    format_name: String,
    header: SeqHeader,
    options: SeqOptions,
    tracks: Vec<TrackState>,
    decoders: Vec<Box<dyn TrackDecoder>>,
    state: SeqState,
    transpose: Option<TransposeTimeline>,
    delta_length: u32,
    midi: Option<MidiOutput>,
    last_pass: Option<Pass>,
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("format", &self.format_name)
            .field("header", &self.header)
            .field("tracks", &self.tracks.len())
            .field("events", &self.state.arena.len())
            .field("delta_length", &self.delta_length)
            .field("last_pass", &self.last_pass)
            .finish()
    }
}

impl Sequence {
    /// Parse the header and track table of `bytes` with `format`.
    ///
    /// No pass runs yet; call [`Sequence::load`] or [`Sequence::run_pass`].
    pub fn new<F: SeqFormat>(bytes: impl Into<Vec<u8>>, mut format: F) -> Result<Self, SeqError> {
        let bytes = bytes.into();
        let mut header = SeqHeader::default();
        format.parse_header(&bytes, &mut header)?;
        let pointers = format.parse_track_pointers(&bytes)?;
        if pointers.is_empty() {
            return Err(SeqError::NoTracks);
        }
        if pointers.len() > MAX_TRACKS {
            return Err(SeqError::TooManyTracks(pointers.len()));
        }
        for (track, pointer) in pointers.iter().enumerate() {
            if pointer.offset as usize >= bytes.len() {
                return Err(SeqError::TrackPointerOutOfRange {
                    track,
                    offset: pointer.offset,
                    len: bytes.len(),
                });
            }
        }

        let tracks = pointers
            .iter()
            .enumerate()
            .map(|(i, p)| TrackState::new(i, p.offset, p.channel & 0x0F))
            .collect();
        let decoders = (0..pointers.len()).map(|i| format.new_decoder(i)).collect();
        debug!(
            format = format.name(),
            tracks = pointers.len(),
            ppqn = header.ppqn,
            tick_sync = header.tick_sync,
            "sequence parsed"
        );
        Ok(Self {
            bytes,
            format_name: format.name().to_string(),
            header,
            options: SeqOptions::default(),
            tracks,
            decoders,
            state: SeqState::default(),
            transpose: None,
            delta_length: 0,
            midi: None,
            last_pass: None,
        })
    }

    /// Set the number of loop repeats the length pass measures.
    pub fn set_loop_count(&mut self, loop_count: u32) {
        self.options.loop_count = loop_count;
    }

    pub fn set_options(&mut self, options: SeqOptions) {
        self.options = options;
    }

    pub fn options(&self) -> &SeqOptions {
        &self.options
    }

    /// Run AddToUi, FindDeltaLength, and ConvertToMidi in order.
    pub fn load(&mut self) {
        self.run_pass(Pass::AddToUi, 0);
        self.run_pass(Pass::FindDeltaLength, 0);
        self.run_pass(Pass::ConvertToMidi, self.delta_length);
    }

    /// Run a single pass over every track.
    ///
    /// `stop_time` ends each track once its clock reaches it; 0 means no
    /// limit. All track state is reset first, and the timeline is rebuilt.
    pub fn run_pass(&mut self, pass: Pass, stop_time: u32) {
        debug!(?pass, tracks = self.tracks.len(), stop_time, "pass start");
        self.begin_pass(pass);
        let ctx = PassContext {
            pass,
            tick_sync: self.header.tick_sync,
            loop_count: self.options.loop_count,
            max_stack_depth: self.options.max_stack_depth,
        };
        if self.header.tick_sync {
            self.run_tick_sync(ctx, stop_time);
        } else {
            self.run_sequential(ctx, stop_time);
        }
        self.end_pass(pass);
        debug!(
            ?pass,
            events = self.state.timeline.len(),
            delta_length = self.delta_length,
            "pass end"
        );
    }

    fn begin_pass(&mut self, pass: Pass) {
        for track in &mut self.tracks {
            track.reset_vars(&self.header);
        }
        for decoder in &mut self.decoders {
            decoder.reset_vars();
        }
        self.state.reset(&self.header);
        self.transpose = None;
        if pass != Pass::ConvertToMidi {
            return;
        }
        self.midi = None;
        if !self.options.write_initial_state {
            return;
        }
        let micros = bpm_to_micros(self.header.initial_tempo_bpm);
        self.state.conductor.push(0, 0, MidiMessage::Tempo(micros));
        for track in &mut self.tracks {
            let channel = track.channel;
            let initial = [
                (CC_VOLUME, self.header.initial_volume),
                (CC_EXPRESSION, self.header.initial_expression),
                (CC_PAN, self.header.initial_pan),
            ];
            if let Some(program) = self.header.initial_program {
                track
                    .midi
                    .push(0, channel, MidiMessage::ProgramChange(program & 0x7F));
            }
            for (controller, value) in initial {
                track.midi.push(
                    0,
                    channel,
                    MidiMessage::ControlChange {
                        controller,
                        value: value & 0x7F,
                    },
                );
            }
        }
    }

    fn run_sequential(&mut self, ctx: PassContext, stop_time: u32) {
        let max_steps = self.options.max_steps_per_track;
        let bytes = self.bytes.as_slice();
        let tracks = &mut self.tracks;
        let decoders = &mut self.decoders;
        let state = &mut self.state;
        for (track, decoder) in tracks.iter_mut().zip(decoders.iter_mut()) {
            while step_track(track, decoder.as_mut(), state, bytes, ctx, max_steps, stop_time) {
                track.cursor.delta_time = 0;
            }
            TrackInterpreter::new(track, state, bytes, ctx).finish();
        }
    }

    fn run_tick_sync(&mut self, ctx: PassContext, stop_time: u32) {
        let max_steps = self.options.max_steps_per_track;
        let midi = ctx.pass == Pass::ConvertToMidi;
        let bytes = self.bytes.as_slice();
        let tracks = &mut self.tracks;
        let decoders = &mut self.decoders;
        let state = &mut self.state;
        let mut tick: u32 = 0;
        loop {
            // every instruction due at this tick, track by track
            for (track, decoder) in tracks.iter_mut().zip(decoders.iter_mut()) {
                while track.active && track.cursor.delta_time == 0 {
                    if !step_track(track, decoder.as_mut(), state, bytes, ctx, max_steps, stop_time) {
                        TrackInterpreter::new(track, state, bytes, ctx).finish();
                    }
                }
            }
            // then the ramps, once per tick
            for track in tracks.iter_mut().filter(|t| t.active) {
                TrackInterpreter::new(track, state, bytes, ctx).update_sliders(tick);
            }
            update_master_slider(state, tick, midi);

            let active: Vec<&mut TrackState> = tracks.iter_mut().filter(|t| t.active).collect();
            if active.is_empty() {
                break;
            }
            let next_step = active
                .iter()
                .map(|t| t.cursor.delta_time)
                .min()
                .unwrap_or(1)
                .max(1);
            // ticks where no slider emits and no track decodes are skipped
            let next_ramp = active
                .iter()
                .filter_map(|t| t.next_slider_tick(tick))
                .chain(state.master_vol_slider.and_then(|s| s.next_change(tick)))
                .min();
            let advance = match next_ramp {
                Some(at) => next_step.min(at.saturating_sub(tick).max(1)),
                None => next_step,
            };
            let Some(next) = tick.checked_add(advance) else {
                warn!(tick, "tick counter overflow, ending pass");
                for track in active {
                    TrackInterpreter::new(track, state, bytes, ctx).finish();
                }
                break;
            };
            for track in active {
                track.cursor.delta_time = track.cursor.delta_time.saturating_sub(advance);
            }
            tick = next;
        }
    }

    fn end_pass(&mut self, pass: Pass) {
        self.state.timeline.finalize();
        let transpose = TransposeTimeline::build(&self.state.timeline, &self.state.arena);
        match pass {
            Pass::AddToUi => {}
            Pass::FindDeltaLength => {
                for track in &mut self.tracks {
                    track.measured_loops = track.infinite_loops;
                    track.measured_ticks = track.total_ticks;
                }
                self.delta_length = self
                    .tracks
                    .iter()
                    .map(TrackState::total_ticks)
                    .max()
                    .unwrap_or(0);
            }
            Pass::ConvertToMidi => {
                let mut tracks: Vec<MidiTrack> = self
                    .tracks
                    .iter_mut()
                    .map(|t| std::mem::take(&mut t.midi))
                    .collect();
                for track in &mut tracks {
                    track.apply_transpose(|tick| transpose.global_at_tick(tick));
                    track.finalize();
                }
                let mut conductor = std::mem::take(&mut self.state.conductor);
                conductor.finalize();
                self.midi = Some(MidiOutput {
                    ppqn: self.header.ppqn,
                    conductor,
                    tracks,
                });
            }
        }
        self.transpose = Some(transpose);
        self.last_pass = Some(pass);
    }

    pub fn format_name(&self) -> &str {
        &self.format_name
    }

    pub fn header(&self) -> &SeqHeader {
        &self.header
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// # Panics
    ///
    /// Panics if `index >= track_count()`.
    pub fn track(&self, index: usize) -> &TrackState {
        &self.tracks[index]
    }

    pub fn tracks(&self) -> &[TrackState] {
        &self.tracks
    }

    /// Every event recorded so far, over all passes.
    pub fn events(&self) -> &EventArena {
        &self.state.arena
    }

    /// Events of one track in source order.
    pub fn ui_events(&self, track: usize) -> Vec<&Event> {
        self.state
            .arena
            .track_events(track)
            .into_iter()
            .map(|(_, event)| event)
            .collect()
    }

    /// Timeline of the most recent pass.
    pub fn timeline(&self) -> &TimelineIndex {
        &self.state.timeline
    }

    /// Transpose timeline of the most recent pass.
    ///
    /// # Panics
    ///
    /// Panics if no pass has completed yet.
    pub fn transpose(&self) -> &TransposeTimeline {
        match &self.transpose {
            Some(transpose) => transpose,
            None => panic!("transpose timeline queried before any pass built it"),
        }
    }

    /// Longest track length measured by the FindDeltaLength pass.
    pub fn delta_length(&self) -> u32 {
        self.delta_length
    }

    /// Output of the last ConvertToMidi pass.
    pub fn midi(&self) -> Option<&MidiOutput> {
        self.midi.as_ref()
    }

    pub fn last_pass(&self) -> Option<Pass> {
        self.last_pass
    }

    /// Name of the sounding key of a note entry, transpose included.
    ///
    /// The global part is the transpose in effect at the note's start tick,
    /// counting every change at that tick whichever track made it, as the
    /// MIDI output does. The track part is the track's own value when the
    /// note was decoded. Returns `None` for entries that are not notes.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or no pass has completed.
    pub fn note_label(&self, index: usize) -> Option<String> {
        let timed = self.state.timeline.get(index);
        let key = self.state.arena.get(timed.event).kind.key()?;
        let transpose = self.transpose();
        let total = transpose.global_at_tick(timed.start) + transpose.track_at_index(index);
        Some(note_name(key as i32 + total))
    }

    /// Per-track figures. Lengths and loop counts are the ones the last
    /// FindDeltaLength pass measured.
    pub fn summary(&self) -> SeqSummary {
        let tracks = self
            .tracks
            .iter()
            .map(|t| TrackSummary {
                index: t.index(),
                channel: t.channel(),
                start_offset: t.start_offset(),
                event_count: self.state.arena.track_events(t.index()).len(),
                total_ticks: t.measured_ticks(),
                infinite_loops: t.measured_loops(),
                midi_events: self
                    .midi
                    .as_ref()
                    .and_then(|m| m.tracks.get(t.index()))
                    .map_or(0, MidiTrack::len),
            })
            .collect();
        SeqSummary {
            format: self.format_name.clone(),
            name: self.header.name.clone(),
            ppqn: self.header.ppqn,
            initial_tempo_bpm: self.header.initial_tempo_bpm,
            tick_sync: self.header.tick_sync,
            delta_length: self.delta_length,
            event_count: self.state.arena.len(),
            tracks,
        }
    }
}

/// Decode one instruction. Returns whether the track keeps going.
fn step_track(
    track: &mut TrackState,
    decoder: &mut dyn TrackDecoder,
    state: &mut SeqState,
    bytes: &[u8],
    ctx: PassContext,
    max_steps: u32,
    stop_time: u32,
) -> bool {
    if stop_time != 0 && track.time >= stop_time {
        return false;
    }
    if track.steps >= max_steps {
        warn!(
            track = track.index,
            steps = track.steps,
            pass = ?ctx.pass,
            "step budget exhausted, ending track"
        );
        return false;
    }
    track.steps += 1;
    let index = track.index;
    let offset = track.cursor.offset;
    let mut sink = TrackInterpreter::new(track, state, bytes, ctx);
    match decoder.read_event(&mut sink) {
        Ok(more) => more,
        Err(err) => {
            warn!(track = index, offset, %err, "decode error, ending track");
            false
        }
    }
}

fn update_master_slider(state: &mut SeqState, tick: u32, midi: bool) {
    let Some(slider) = state.master_vol_slider else {
        return;
    };
    if slider.changes_at(tick) {
        let value = slider.value_at(tick);
        state.master_volume = value;
        if midi {
            state
                .conductor
                .push(tick, 0, MidiMessage::MasterVolume(master_volume_14bit(value)));
        }
    }
    if tick as u64 >= slider.end() {
        state.master_vol_slider = None;
    }
}
