//! Track interpreter.
//!
//! One [`TrackState`] exists per musical channel. During a pass the
//! sequence wraps it in a [`TrackInterpreter`], which implements
//! [`TrackSink`], and hands that to the format's [`TrackDecoder`]. The
//! decoder reads one instruction per call and reports it through the sink;
//! the interpreter records the event, advances time, updates the channel
//! state, and writes MIDI output when the pass asks for it.
//!
//! # Loop guard
//!
//! Every control transfer (jump, call, return, loop) is keyed by its
//! destination together with the current call and loop stacks. Reaching a
//! key twice in one pass means the track is cycling. The first key seen
//! twice becomes the loop anchor, and each later arrival at the anchor
//! counts one infinite loop. What happens next depends on the pass: the
//! UI pass stops, the length pass continues until the configured number of
//! repeats has been played, and the MIDI pass continues until its stop
//! time unless the loop makes no progress in time.
//!
//! [`TrackDecoder`]: crate::sequence::TrackDecoder
mod sink;
mod state;

pub use sink::TrackSink;
pub use state::{LoopFrame, TrackCursor, TrackState};

use tracing::{debug, trace, warn};

use crate::binutil::{ByteSource, ParseError};
use crate::event::{Event, EventKind, TransposeScope};
use crate::midi::{
    CC_BANK_LSB, CC_BANK_MSB, CC_BREATH, CC_CHORUS, CC_DATA_ENTRY_LSB, CC_DATA_ENTRY_MSB,
    CC_EXPRESSION, CC_MODULATION, CC_PAN, CC_PORTAMENTO, CC_PORTAMENTO_TIME, CC_REVERB,
    CC_RPN_LSB, CC_RPN_MSB, CC_SUSTAIN, CC_VOLUME, MidiEvent, MidiMessage, clamp_key,
    master_volume_14bit,
};
use crate::sequence::{Pass, SeqState};
use crate::slider::{
    ExpressionSlider, MasterVolSlider, PanSlider, TempoSlider, VolSlider, bpm_to_micros,
};
use state::{DurNote, GuardKey, OpenNote};

/// Per-pass parameters shared by every track.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PassContext {
    pub pass: Pass,
    pub tick_sync: bool,
    pub loop_count: u32,
    pub max_stack_depth: usize,
}

/// The [`TrackSink`] implementation: one track's state plus the sequence
/// state it writes into, for the duration of one decode step.
pub struct TrackInterpreter<'a> {
    track: &'a mut TrackState,
    seq: &'a mut SeqState,
    bytes: &'a [u8],
    ctx: PassContext,
}

impl<'a> TrackInterpreter<'a> {
    pub(crate) fn new(
        track: &'a mut TrackState,
        seq: &'a mut SeqState,
        bytes: &'a [u8],
        ctx: PassContext,
    ) -> Self {
        Self {
            track,
            seq,
            bytes,
            ctx,
        }
    }

    /// Stop the track: close sounding notes and write the end of track.
    pub(crate) fn finish(&mut self) {
        let now = self.track.time;
        let open = std::mem::take(&mut self.track.open_notes);
        for note in open {
            self.close_open_note(note, now);
        }
        self.emit_at(now, MidiMessage::EndOfTrack);
        self.track.active = false;
        self.track.total_ticks = now;
        self.track.vol_slider = None;
        self.track.expression_slider = None;
        self.track.pan_slider = None;
    }

    /// Evaluate this track's sliders at `tick` (tick-synchronized mode).
    pub(crate) fn update_sliders(&mut self, tick: u32) {
        if let Some(slider) = self.track.vol_slider {
            if slider.changes_at(tick) {
                let value = slider.value_at(tick);
                self.track.volume = value;
                self.emit_cc_at(tick, CC_VOLUME, value);
            }
            if tick as u64 >= slider.end() {
                self.track.vol_slider = None;
            }
        }
        if let Some(slider) = self.track.expression_slider {
            if slider.changes_at(tick) {
                let value = slider.value_at(tick);
                self.track.expression = value;
                self.emit_cc_at(tick, CC_EXPRESSION, value);
            }
            if tick as u64 >= slider.end() {
                self.track.expression_slider = None;
            }
        }
        if let Some(slider) = self.track.pan_slider {
            if slider.changes_at(tick) {
                let value = slider.value_at(tick);
                self.track.pan = value;
                self.emit_cc_at(tick, CC_PAN, value);
            }
            if tick as u64 >= slider.end() {
                self.track.pan_slider = None;
            }
        }
    }

    fn is_midi(&self) -> bool {
        self.ctx.pass == Pass::ConvertToMidi
    }

    /// Record the event for these bytes and place it at the current tick.
    fn record(&mut self, offset: u32, len: u32, kind: EventKind, duration: u32) -> usize {
        let event = Event::new(kind, self.track.index, offset, len);
        let (id, _) = self.seq.arena.insert(event);
        self.seq.timeline.add_event(id, self.track.time, duration)
    }

    fn emit_at(&mut self, tick: u32, message: MidiMessage) -> Option<usize> {
        if !self.is_midi() {
            return None;
        }
        Some(self.track.midi.push(tick, self.track.channel, message))
    }

    fn emit(&mut self, message: MidiMessage) {
        self.emit_at(self.track.time, message);
    }

    fn emit_cc_at(&mut self, tick: u32, controller: u8, value: u8) {
        self.emit_at(tick, MidiMessage::ControlChange { controller, value });
    }

    fn emit_cc(&mut self, controller: u8, value: u8) {
        self.emit_cc_at(self.track.time, controller, value);
    }

    fn emit_conductor_at(&mut self, tick: u32, message: MidiMessage) {
        if self.is_midi() {
            self.seq.conductor.push(tick, 0, message);
        }
    }

    fn emit_note(
        &mut self,
        tick: u32,
        message: MidiMessage,
        transpose_tick: Option<u32>,
    ) -> Option<usize> {
        if !self.is_midi() {
            return None;
        }
        Some(self.track.midi.push_event(MidiEvent {
            tick,
            channel: self.track.channel,
            message,
            transpose_tick,
        }))
    }

    /// Output key for a decoded key, and the tick whose global transpose
    /// applies to it. Drum notes ignore every transpose.
    fn midi_key(&self, key: u8) -> (u8, Option<u32>) {
        match self.track.drum_note {
            Some(drum) => (drum.min(127), None),
            None => {
                let shifted =
                    key as i32 + self.track.transpose as i32 + self.track.key_correction as i32;
                (clamp_key(shifted), Some(self.track.time))
            }
        }
    }

    fn note_on(&mut self, key: u8, velocity: u8, timeline: Option<usize>) {
        self.cut_same_key(key);
        let now = self.track.time;
        let (midi_key, transpose_tick) = self.midi_key(key);
        self.emit_note(
            now,
            MidiMessage::NoteOn {
                key: midi_key,
                velocity,
            },
            transpose_tick,
        );
        self.track.open_notes.push(OpenNote {
            key,
            midi_key,
            start: now,
            timeline,
            transpose_tick,
        });
    }

    fn note_off(&mut self, key: u8) {
        let Some(pos) = self.track.open_notes.iter().position(|n| n.key == key) else {
            return;
        };
        let note = self.track.open_notes.remove(pos);
        self.close_open_note(note, self.track.time);
    }

    fn close_open_note(&mut self, note: OpenNote, tick: u32) {
        if let Some(index) = note.timeline {
            self.seq
                .timeline
                .set_duration(index, tick.saturating_sub(note.start));
        }
        self.emit_note(
            tick,
            MidiMessage::NoteOff { key: note.midi_key },
            note.transpose_tick,
        );
    }

    fn note_by_dur(&mut self, key: u8, velocity: u8, duration: u32, timeline: Option<usize>) {
        self.cut_same_key(key);
        let now = self.track.time;
        let notes = &mut self.track.dur_notes;
        if notes.iter().any(|n| n.tracked && n.start != now) {
            for note in notes.iter_mut() {
                note.tracked = false;
            }
        }
        notes.retain(|n| n.tracked || n.end > now);

        let end = now.saturating_add(duration);
        let (midi_key, transpose_tick) = self.midi_key(key);
        let midi_off = if self.is_midi() {
            self.emit_note(
                now,
                MidiMessage::NoteOn {
                    key: midi_key,
                    velocity,
                },
                transpose_tick,
            );
            self.emit_note(end, MidiMessage::NoteOff { key: midi_key }, transpose_tick)
        } else {
            None
        };
        self.track.dur_notes.push(DurNote {
            key,
            start: now,
            end,
            timeline,
            midi_off,
            tracked: true,
        });
    }

    /// End every note of `key` that is still sounding now.
    fn cut_same_key(&mut self, key: u8) {
        let now = self.track.time;
        let (same, others): (Vec<OpenNote>, Vec<OpenNote>) =
            std::mem::take(&mut self.track.open_notes)
                .into_iter()
                .partition(|n| n.key == key);
        self.track.open_notes = others;
        for note in same {
            self.close_open_note(note, now);
        }
        for i in 0..self.track.dur_notes.len() {
            let note = self.track.dur_notes[i];
            if note.key == key && note.start < now && note.end > now {
                self.set_dur_note_end(i, now);
            }
        }
    }

    fn set_dur_note_end(&mut self, i: usize, end: u32) {
        let note = &mut self.track.dur_notes[i];
        note.end = end.max(note.start);
        let note = *note;
        if let Some(index) = note.timeline {
            self.seq.timeline.set_duration(index, note.end - note.start);
        }
        if let Some(off) = note.midi_off {
            self.track.midi.set_tick(off, note.end);
        }
    }

    fn set_volume(&mut self, volume: u8) {
        self.track.volume = volume;
        self.track.vol_slider = None;
        self.emit_cc(CC_VOLUME, volume);
    }

    fn set_expression(&mut self, expression: u8) {
        self.track.expression = expression;
        self.track.expression_slider = None;
        self.emit_cc(CC_EXPRESSION, expression);
    }

    fn set_pan(&mut self, pan: u8) {
        self.track.pan = pan;
        self.track.pan_slider = None;
        self.emit_cc(CC_PAN, pan);
    }

    fn set_master_volume(&mut self, volume: u8) {
        self.seq.master_volume = volume;
        self.seq.master_vol_slider = None;
        let now = self.track.time;
        self.emit_conductor_at(now, MidiMessage::MasterVolume(master_volume_14bit(volume)));
    }

    fn set_tempo(&mut self, bpm: f64, micros: u32) {
        self.seq.tempo_bpm = bpm;
        let now = self.track.time;
        self.emit_conductor_at(now, MidiMessage::Tempo(micros));
    }

    /// Move the cursor to `destination` unless the loop guard says stop.
    fn transfer(&mut self, destination: u32) -> bool {
        let key = GuardKey {
            destination,
            call_stack: self.track.cursor.call_stack.clone(),
            loop_stack: self.track.cursor.loop_stack.clone(),
        };
        if self.track.visited.contains(&key) {
            if !self.revisit(key) {
                return false;
            }
        } else {
            self.track.visited.insert(key);
        }
        trace!(
            track = self.track.index,
            from = self.track.cursor.offset,
            to = destination,
            tick = self.track.time,
            "control transfer"
        );
        self.track.cursor.offset = destination;
        true
    }

    /// Handle a repeated control-flow state. Returns whether to continue.
    fn revisit(&mut self, key: GuardKey) -> bool {
        let anchor = self.track.loop_anchor.get_or_insert_with(|| key.clone());
        if *anchor != key {
            // part of a cycle already counted at its anchor
            return self.ctx.pass != Pass::AddToUi;
        }
        let track = &mut *self.track;
        track.infinite_loops += 1;
        track.total_ticks = track.time;
        let proceed = match self.ctx.pass {
            Pass::AddToUi => false,
            Pass::FindDeltaLength => track.infinite_loops <= self.ctx.loop_count,
            Pass::ConvertToMidi => track.time != 0 && track.last_revisit_time != Some(track.time),
        };
        track.last_revisit_time = Some(track.time);
        debug!(
            track = track.index,
            offset = key.destination,
            infinite_loops = track.infinite_loops,
            tick = track.time,
            pass = ?self.ctx.pass,
            proceed,
            "loop guard tripped"
        );
        proceed
    }

    fn stack_limit_reached(&self, depth: usize, what: &str) -> bool {
        if depth >= self.ctx.max_stack_depth {
            warn!(
                track = self.track.index,
                offset = self.track.cursor.offset,
                depth,
                "{what} nesting too deep, ending track"
            );
            return true;
        }
        false
    }
}

impl TrackSink for TrackInterpreter<'_> {
    fn offset(&self) -> u32 {
        self.track.cursor.offset
    }

    fn set_offset(&mut self, offset: u32) {
        self.track.cursor.offset = offset;
    }

    fn read_u8(&mut self) -> Result<u8, ParseError> {
        let value = self.bytes.read_byte(self.track.cursor.offset)?;
        self.track.cursor.offset = self.track.cursor.offset.saturating_add(1);
        Ok(value)
    }

    fn read_u16_le(&mut self) -> Result<u16, ParseError> {
        let value = self.bytes.read_short(self.track.cursor.offset)?;
        self.track.cursor.offset = self.track.cursor.offset.saturating_add(2);
        Ok(value)
    }

    fn read_u16_be(&mut self) -> Result<u16, ParseError> {
        let value = self.bytes.read_short_be(self.track.cursor.offset)?;
        self.track.cursor.offset = self.track.cursor.offset.saturating_add(2);
        Ok(value)
    }

    fn read_u32_le(&mut self) -> Result<u32, ParseError> {
        let value = self.bytes.read_word(self.track.cursor.offset)?;
        self.track.cursor.offset = self.track.cursor.offset.saturating_add(4);
        Ok(value)
    }

    fn read_u32_be(&mut self) -> Result<u32, ParseError> {
        let value = self.bytes.read_word_be(self.track.cursor.offset)?;
        self.track.cursor.offset = self.track.cursor.offset.saturating_add(4);
        Ok(value)
    }

    fn peek_u8(&self, offset: u32) -> Result<u8, ParseError> {
        self.bytes.read_byte(offset)
    }

    fn bytes(&self) -> &[u8] {
        self.bytes
    }

    fn time(&self) -> u32 {
        self.track.time
    }

    fn pass(&self) -> Pass {
        self.ctx.pass
    }

    fn track_index(&self) -> usize {
        self.track.index
    }

    fn channel(&self) -> u8 {
        self.track.channel
    }

    fn set_channel(&mut self, channel: u8) {
        self.track.channel = channel & 0x0F;
    }

    fn volume(&self) -> u8 {
        self.track.volume
    }

    fn pan(&self) -> u8 {
        self.track.pan
    }

    fn expression(&self) -> u8 {
        self.track.expression
    }

    fn octave(&self) -> u8 {
        self.track.octave
    }

    fn transpose(&self) -> i8 {
        self.track.transpose
    }

    fn is_offset_used(&self, offset: u32) -> bool {
        self.seq.arena.is_offset_used(self.track.index, offset)
    }

    fn infinite_loops(&self) -> u32 {
        self.track.infinite_loops
    }

    fn add_time(&mut self, delta: u32) {
        self.track.time = self.track.time.saturating_add(delta);
        self.track.cursor.delta_time = self.track.cursor.delta_time.saturating_add(delta);
    }

    fn add_rest(&mut self, offset: u32, len: u32, ticks: u32) {
        self.record(offset, len, EventKind::Rest { ticks }, ticks);
        self.add_time(ticks);
    }

    fn add_hold(&mut self, offset: u32, len: u32, ticks: u32) {
        self.record(offset, len, EventKind::Hold { ticks }, ticks);
        let end = self.track.time.saturating_add(ticks);
        self.make_prev_dur_note_end(end);
        self.add_time(ticks);
    }

    fn add_note_on(&mut self, offset: u32, len: u32, key: u8, velocity: u8) {
        let index = self.record(offset, len, EventKind::NoteOn { key, velocity }, 0);
        self.note_on(key, velocity, Some(index));
    }

    fn add_note_on_no_item(&mut self, key: u8, velocity: u8) {
        self.note_on(key, velocity, None);
    }

    fn add_note_off(&mut self, offset: u32, len: u32, key: u8) {
        self.record(offset, len, EventKind::NoteOff { key }, 0);
        self.note_off(key);
    }

    fn add_note_off_no_item(&mut self, key: u8) {
        self.note_off(key);
    }

    fn add_note_by_dur(&mut self, offset: u32, len: u32, key: u8, velocity: u8, duration: u32) {
        let kind = EventKind::DurationNote {
            key,
            velocity,
            duration,
        };
        let index = self.record(offset, len, kind, duration);
        self.note_by_dur(key, velocity, duration, Some(index));
    }

    fn add_note_by_dur_no_item(&mut self, key: u8, velocity: u8, duration: u32) {
        self.note_by_dur(key, velocity, duration, None);
    }

    fn make_prev_dur_note_end(&mut self, tick: u32) {
        for i in 0..self.track.dur_notes.len() {
            if self.track.dur_notes[i].tracked {
                self.set_dur_note_end(i, tick);
            }
        }
    }

    fn limit_prev_dur_note_end(&mut self, tick: u32) {
        for i in 0..self.track.dur_notes.len() {
            let note = self.track.dur_notes[i];
            if note.tracked && note.end > tick {
                self.set_dur_note_end(i, tick);
            }
        }
        for note in &mut self.track.dur_notes {
            note.tracked = false;
        }
    }

    fn add_octave(&mut self, offset: u32, len: u32, octave: u8) {
        self.record(offset, len, EventKind::Octave(octave), 0);
        self.track.octave = octave;
    }

    fn inc_octave(&mut self, offset: u32, len: u32) {
        let octave = self.track.octave.saturating_add(1);
        self.add_octave(offset, len, octave);
    }

    fn dec_octave(&mut self, offset: u32, len: u32) {
        let octave = self.track.octave.saturating_sub(1);
        self.add_octave(offset, len, octave);
    }

    fn key_from_octave(&self, semitone: u8) -> u8 {
        clamp_key((self.track.octave as i32 + 1) * 12 + semitone as i32)
    }

    fn add_key_correction(&mut self, offset: u32, len: u32, semitones: i8) {
        self.record(offset, len, EventKind::KeyCorrection(semitones), 0);
        self.track.key_correction = semitones;
    }

    fn add_drum_note(&mut self, offset: u32, len: u32, key: Option<u8>) {
        self.record(offset, len, EventKind::DrumNote(key), 0);
        self.track.drum_note = key;
    }

    fn add_volume(&mut self, offset: u32, len: u32, volume: u8) {
        self.record(offset, len, EventKind::Volume(volume), 0);
        self.set_volume(volume);
    }

    fn add_volume_no_item(&mut self, volume: u8) {
        self.set_volume(volume);
    }

    fn add_vol_slide(&mut self, offset: u32, len: u32, duration: u32, target: u8) {
        self.record(offset, len, EventKind::VolumeSlide { target, duration }, duration);
        let slider = VolSlider::new(self.track.time, duration, self.track.volume, target);
        if self.ctx.tick_sync {
            self.track.vol_slider = Some(slider);
            return;
        }
        if self.is_midi() {
            for (tick, value) in slider.changes() {
                self.emit_cc_at(tick, CC_VOLUME, value);
            }
        }
        self.track.volume = target;
    }

    fn add_master_vol(&mut self, offset: u32, len: u32, volume: u8) {
        self.record(offset, len, EventKind::MasterVolume(volume), 0);
        self.set_master_volume(volume);
    }

    fn add_master_vol_slide(&mut self, offset: u32, len: u32, duration: u32, target: u8) {
        let kind = EventKind::MasterVolumeSlide { target, duration };
        self.record(offset, len, kind, duration);
        let slider =
            MasterVolSlider::new(self.track.time, duration, self.seq.master_volume, target);
        if self.ctx.tick_sync {
            self.seq.master_vol_slider = Some(slider);
            return;
        }
        if self.is_midi() {
            for (tick, value) in slider.changes() {
                let volume = master_volume_14bit(value);
                self.emit_conductor_at(tick, MidiMessage::MasterVolume(volume));
            }
        }
        self.seq.master_volume = target;
    }

    fn add_expression(&mut self, offset: u32, len: u32, expression: u8) {
        self.record(offset, len, EventKind::Expression(expression), 0);
        self.set_expression(expression);
    }

    fn add_expression_no_item(&mut self, expression: u8) {
        self.set_expression(expression);
    }

    fn add_expression_slide(&mut self, offset: u32, len: u32, duration: u32, target: u8) {
        let kind = EventKind::ExpressionSlide { target, duration };
        self.record(offset, len, kind, duration);
        let slider =
            ExpressionSlider::new(self.track.time, duration, self.track.expression, target);
        if self.ctx.tick_sync {
            self.track.expression_slider = Some(slider);
            return;
        }
        if self.is_midi() {
            for (tick, value) in slider.changes() {
                self.emit_cc_at(tick, CC_EXPRESSION, value);
            }
        }
        self.track.expression = target;
    }

    fn add_pan(&mut self, offset: u32, len: u32, pan: u8) {
        self.record(offset, len, EventKind::Pan(pan), 0);
        self.set_pan(pan);
    }

    fn add_pan_no_item(&mut self, pan: u8) {
        self.set_pan(pan);
    }

    fn add_pan_slide(&mut self, offset: u32, len: u32, duration: u32, target: u8) {
        self.record(offset, len, EventKind::PanSlide { target, duration }, duration);
        let slider = PanSlider::new(self.track.time, duration, self.track.pan, target);
        if self.ctx.tick_sync {
            self.track.pan_slider = Some(slider);
            return;
        }
        if self.is_midi() {
            for (tick, value) in slider.changes() {
                self.emit_cc_at(tick, CC_PAN, value);
            }
        }
        self.track.pan = target;
    }

    fn add_program_change(&mut self, offset: u32, len: u32, program: u8) {
        self.record(offset, len, EventKind::ProgramChange(program), 0);
        self.add_program_change_no_item(program);
    }

    fn add_program_change_no_item(&mut self, program: u8) {
        self.emit(MidiMessage::ProgramChange(program & 0x7F));
    }

    fn add_bank_select(&mut self, offset: u32, len: u32, bank: u16) {
        self.record(offset, len, EventKind::BankSelect(bank), 0);
        self.emit_cc(CC_BANK_MSB, ((bank >> 7) & 0x7F) as u8);
        self.emit_cc(CC_BANK_LSB, (bank & 0x7F) as u8);
    }

    fn add_pitch_bend(&mut self, offset: u32, len: u32, bend: i16) {
        self.record(offset, len, EventKind::PitchBend(bend), 0);
        self.emit(MidiMessage::PitchBend(bend.clamp(-8192, 8191)));
    }

    fn add_pitch_bend_range(&mut self, offset: u32, len: u32, semitones: u8, cents: u8) {
        self.record(offset, len, EventKind::PitchBendRange { semitones, cents }, 0);
        self.emit_cc(CC_RPN_MSB, 0);
        self.emit_cc(CC_RPN_LSB, 0);
        self.emit_cc(CC_DATA_ENTRY_MSB, semitones & 0x7F);
        self.emit_cc(CC_DATA_ENTRY_LSB, cents & 0x7F);
    }

    fn add_modulation(&mut self, offset: u32, len: u32, depth: u8) {
        self.record(offset, len, EventKind::Modulation(depth), 0);
        self.emit_cc(CC_MODULATION, depth & 0x7F);
    }

    fn add_breath(&mut self, offset: u32, len: u32, value: u8) {
        self.record(offset, len, EventKind::Breath(value), 0);
        self.emit_cc(CC_BREATH, value & 0x7F);
    }

    fn add_sustain(&mut self, offset: u32, len: u32, on: bool) {
        self.record(offset, len, EventKind::Sustain(on), 0);
        self.emit_cc(CC_SUSTAIN, if on { 127 } else { 0 });
    }

    fn add_portamento(&mut self, offset: u32, len: u32, on: bool) {
        self.record(offset, len, EventKind::Portamento(on), 0);
        self.emit_cc(CC_PORTAMENTO, if on { 127 } else { 0 });
    }

    fn add_portamento_time(&mut self, offset: u32, len: u32, time: u8) {
        self.record(offset, len, EventKind::PortamentoTime(time), 0);
        self.emit_cc(CC_PORTAMENTO_TIME, time & 0x7F);
    }

    fn add_reverb(&mut self, offset: u32, len: u32, level: u8) {
        self.record(offset, len, EventKind::Reverb(level), 0);
        self.emit_cc(CC_REVERB, level & 0x7F);
    }

    fn add_chorus(&mut self, offset: u32, len: u32, level: u8) {
        self.record(offset, len, EventKind::Chorus(level), 0);
        self.emit_cc(CC_CHORUS, level & 0x7F);
    }

    fn add_controller(&mut self, offset: u32, len: u32, controller: u8, value: u8) {
        self.record(offset, len, EventKind::ControllerChange { controller, value }, 0);
        self.emit_cc(controller & 0x7F, value & 0x7F);
    }

    fn add_transpose(&mut self, offset: u32, len: u32, semitones: i8) {
        let kind = EventKind::Transpose {
            scope: TransposeScope::Track,
            semitones,
        };
        self.record(offset, len, kind, 0);
        self.track.transpose = semitones;
    }

    fn add_global_transpose(&mut self, offset: u32, len: u32, semitones: i8) {
        let kind = EventKind::Transpose {
            scope: TransposeScope::Global,
            semitones,
        };
        self.record(offset, len, kind, 0);
        self.seq.global_transpose = semitones;
    }

    fn add_tempo(&mut self, offset: u32, len: u32, micros_per_quarter: u32) {
        let micros = micros_per_quarter.clamp(1, 0xFF_FFFF);
        let bpm = 60_000_000.0 / micros as f64;
        self.record(offset, len, EventKind::Tempo { bpm }, 0);
        self.set_tempo(bpm, micros);
    }

    fn add_tempo_bpm(&mut self, offset: u32, len: u32, bpm: f64) {
        self.record(offset, len, EventKind::Tempo { bpm }, 0);
        self.set_tempo(bpm, bpm_to_micros(bpm));
    }

    fn add_tempo_slide(&mut self, offset: u32, len: u32, duration: u32, target_bpm: f64) {
        let kind = EventKind::TempoSlide {
            target_bpm,
            duration,
        };
        self.record(offset, len, kind, duration);
        let slider =
            TempoSlider::from_f64(self.track.time, duration, self.seq.tempo_bpm, target_bpm);
        if self.is_midi() {
            for (tick, micros) in slider.changes() {
                self.emit_conductor_at(tick, MidiMessage::Tempo(micros));
            }
        }
        self.seq.tempo_bpm = target_bpm;
    }

    fn add_time_signature(
        &mut self,
        offset: u32,
        len: u32,
        numerator: u8,
        denominator: u8,
        ticks_per_quarter: u16,
    ) {
        let kind = EventKind::TimeSignature {
            numerator,
            denominator,
            ticks_per_quarter,
        };
        self.record(offset, len, kind, 0);
        let denominator_pow2 = if denominator.is_power_of_two() {
            denominator.trailing_zeros() as u8
        } else {
            2
        };
        let now = self.track.time;
        self.emit_conductor_at(
            now,
            MidiMessage::TimeSignature {
                numerator,
                denominator_pow2,
                clocks_per_click: (96 >> denominator_pow2).max(1),
                thirty_seconds_per_quarter: 8,
            },
        );
    }

    fn add_marker(&mut self, offset: u32, len: u32, text: &str) {
        self.record(offset, len, EventKind::Marker(text.to_string()), 0);
        self.emit(MidiMessage::Marker(text.to_string()));
    }

    fn add_jump(&mut self, offset: u32, len: u32, destination: u32) -> bool {
        self.record(offset, len, EventKind::Jump { destination }, 0);
        self.transfer(destination)
    }

    fn add_call(&mut self, offset: u32, len: u32, destination: u32, return_offset: u32) -> bool {
        let kind = EventKind::Call {
            destination,
            return_offset,
        };
        self.record(offset, len, kind, 0);
        if self.stack_limit_reached(self.track.cursor.call_stack.len(), "call") {
            return false;
        }
        self.track.cursor.call_stack.push(return_offset);
        self.transfer(destination)
    }

    fn add_return(&mut self, offset: u32, len: u32) -> bool {
        self.record(offset, len, EventKind::Return, 0);
        match self.track.cursor.call_stack.pop() {
            Some(return_offset) => self.transfer(return_offset),
            None => {
                debug!(
                    track = self.track.index,
                    offset, "return with empty call stack, ending track"
                );
                false
            }
        }
    }

    fn add_loop_start(&mut self, offset: u32, len: u32, count: u32) -> bool {
        self.record(offset, len, EventKind::LoopStart { count }, 0);
        if self.stack_limit_reached(self.track.cursor.loop_stack.len(), "loop") {
            return false;
        }
        let start = self.track.cursor.offset;
        self.track.cursor.loop_stack.push(LoopFrame {
            start,
            remaining: count,
        });
        true
    }

    fn add_loop_end(&mut self, offset: u32, len: u32) -> bool {
        self.record(offset, len, EventKind::LoopEnd, 0);
        let Some(frame) = self.track.cursor.loop_stack.last_mut() else {
            debug!(track = self.track.index, offset, "loop end without loop start");
            return true;
        };
        let start = frame.start;
        let remaining = frame.remaining;
        match remaining {
            0 => self.transfer(start),
            1 => {
                self.track.cursor.loop_stack.pop();
                true
            }
            _ => {
                frame.remaining = remaining - 1;
                self.transfer(start)
            }
        }
    }

    fn add_loop_forever(&mut self, offset: u32, len: u32, destination: u32) -> bool {
        self.record(offset, len, EventKind::LoopForever { destination }, 0);
        self.transfer(destination)
    }

    fn add_end_of_track(&mut self, offset: u32, len: u32) -> bool {
        self.record(offset, len, EventKind::TrackEnd, 0);
        false
    }

    fn add_unknown(&mut self, offset: u32, len: u32, label: &str) {
        self.record(offset, len, EventKind::Unknown(label.to_string()), 0);
    }
}
