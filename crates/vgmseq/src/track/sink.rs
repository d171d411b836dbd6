//! The capability interface format decoders write into.
use crate::binutil::ParseError;
use crate::sequence::Pass;

/// Operations a format decoder uses to record events and drive a track.
///
/// Every `add_*` taking `offset` and `len` records an event for those
/// source bytes (once per offset), places it on the timeline at the
/// track's current tick, then applies the state change and, during the
/// ConvertToMidi pass, the MIDI output. The `*_no_item` variants apply
/// only the state change and output.
///
/// Control-flow operations return `false` when the transfer is refused
/// (loop guard, empty call stack, nesting limit). The decoder must then
/// return `Ok(false)` from `read_event`.
pub trait TrackSink {
    // Cursor and byte access

    /// Offset of the next byte to read.
    fn offset(&self) -> u32;
    fn set_offset(&mut self, offset: u32);
    /// Read one byte at the cursor and advance.
    fn read_u8(&mut self) -> Result<u8, ParseError>;
    fn read_i8(&mut self) -> Result<i8, ParseError> {
        self.read_u8().map(|b| b as i8)
    }
    fn read_u16_le(&mut self) -> Result<u16, ParseError>;
    fn read_u16_be(&mut self) -> Result<u16, ParseError>;
    fn read_u32_le(&mut self) -> Result<u32, ParseError>;
    fn read_u32_be(&mut self) -> Result<u32, ParseError>;
    /// Read a byte anywhere without moving the cursor.
    fn peek_u8(&self, offset: u32) -> Result<u8, ParseError>;
    fn bytes(&self) -> &[u8];

    // Queries

    /// Current tick of the track.
    fn time(&self) -> u32;
    fn pass(&self) -> Pass;
    fn track_index(&self) -> usize;
    fn channel(&self) -> u8;
    fn set_channel(&mut self, channel: u8);
    fn volume(&self) -> u8;
    fn pan(&self) -> u8;
    fn expression(&self) -> u8;
    fn octave(&self) -> u8;
    fn transpose(&self) -> i8;
    /// Whether an event was already recorded at `offset` for this track.
    fn is_offset_used(&self, offset: u32) -> bool;
    fn infinite_loops(&self) -> u32;

    // Timing

    /// Advance the track clock without recording anything.
    fn add_time(&mut self, delta: u32);
    fn add_rest(&mut self, offset: u32, len: u32, ticks: u32);
    /// Tie: extend the tracked duration notes by `ticks` and advance.
    fn add_hold(&mut self, offset: u32, len: u32, ticks: u32);

    // Notes

    fn add_note_on(&mut self, offset: u32, len: u32, key: u8, velocity: u8);
    fn add_note_on_no_item(&mut self, key: u8, velocity: u8);
    fn add_note_off(&mut self, offset: u32, len: u32, key: u8);
    fn add_note_off_no_item(&mut self, key: u8);
    fn add_note_by_dur(&mut self, offset: u32, len: u32, key: u8, velocity: u8, duration: u32);
    fn add_note_by_dur_no_item(&mut self, key: u8, velocity: u8, duration: u32);
    /// End every tracked duration note at `tick`, keeping them tracked.
    fn make_prev_dur_note_end(&mut self, tick: u32);
    /// Shorten tracked duration notes that sound past `tick`, then stop
    /// tracking them.
    fn limit_prev_dur_note_end(&mut self, tick: u32);
    fn add_octave(&mut self, offset: u32, len: u32, octave: u8);
    fn inc_octave(&mut self, offset: u32, len: u32);
    fn dec_octave(&mut self, offset: u32, len: u32);
    /// Key of `semitone` in the current octave (octave 4 starts at 60).
    fn key_from_octave(&self, semitone: u8) -> u8;
    fn add_key_correction(&mut self, offset: u32, len: u32, semitones: i8);
    /// Force every following note to `key`, or `None` to stop.
    fn add_drum_note(&mut self, offset: u32, len: u32, key: Option<u8>);

    // Controllers

    fn add_volume(&mut self, offset: u32, len: u32, volume: u8);
    fn add_volume_no_item(&mut self, volume: u8);
    fn add_vol_slide(&mut self, offset: u32, len: u32, duration: u32, target: u8);
    fn add_master_vol(&mut self, offset: u32, len: u32, volume: u8);
    fn add_master_vol_slide(&mut self, offset: u32, len: u32, duration: u32, target: u8);
    fn add_expression(&mut self, offset: u32, len: u32, expression: u8);
    fn add_expression_no_item(&mut self, expression: u8);
    fn add_expression_slide(&mut self, offset: u32, len: u32, duration: u32, target: u8);
    fn add_pan(&mut self, offset: u32, len: u32, pan: u8);
    fn add_pan_no_item(&mut self, pan: u8);
    fn add_pan_slide(&mut self, offset: u32, len: u32, duration: u32, target: u8);
    fn add_program_change(&mut self, offset: u32, len: u32, program: u8);
    fn add_program_change_no_item(&mut self, program: u8);
    fn add_bank_select(&mut self, offset: u32, len: u32, bank: u16);
    fn add_pitch_bend(&mut self, offset: u32, len: u32, bend: i16);
    fn add_pitch_bend_range(&mut self, offset: u32, len: u32, semitones: u8, cents: u8);
    fn add_modulation(&mut self, offset: u32, len: u32, depth: u8);
    fn add_breath(&mut self, offset: u32, len: u32, value: u8);
    fn add_sustain(&mut self, offset: u32, len: u32, on: bool);
    fn add_portamento(&mut self, offset: u32, len: u32, on: bool);
    fn add_portamento_time(&mut self, offset: u32, len: u32, time: u8);
    fn add_reverb(&mut self, offset: u32, len: u32, level: u8);
    fn add_chorus(&mut self, offset: u32, len: u32, level: u8);
    fn add_controller(&mut self, offset: u32, len: u32, controller: u8, value: u8);
    fn add_transpose(&mut self, offset: u32, len: u32, semitones: i8);
    fn add_global_transpose(&mut self, offset: u32, len: u32, semitones: i8);

    // Conductor

    fn add_tempo(&mut self, offset: u32, len: u32, micros_per_quarter: u32);
    fn add_tempo_bpm(&mut self, offset: u32, len: u32, bpm: f64);
    fn add_tempo_slide(&mut self, offset: u32, len: u32, duration: u32, target_bpm: f64);
    fn add_time_signature(
        &mut self,
        offset: u32,
        len: u32,
        numerator: u8,
        denominator: u8,
        ticks_per_quarter: u16,
    );
    fn add_marker(&mut self, offset: u32, len: u32, text: &str);

    // Control flow

    fn add_jump(&mut self, offset: u32, len: u32, destination: u32) -> bool;
    fn add_call(&mut self, offset: u32, len: u32, destination: u32, return_offset: u32) -> bool;
    fn add_return(&mut self, offset: u32, len: u32) -> bool;
    /// Open a counted loop whose body starts at the cursor. Count 0 loops
    /// forever.
    fn add_loop_start(&mut self, offset: u32, len: u32, count: u32) -> bool;
    fn add_loop_end(&mut self, offset: u32, len: u32) -> bool;
    fn add_loop_forever(&mut self, offset: u32, len: u32, destination: u32) -> bool;
    /// Record the end of the track. Always returns `false`.
    fn add_end_of_track(&mut self, offset: u32, len: u32) -> bool;

    /// Record bytes the decoder does not understand, for inspection only.
    fn add_unknown(&mut self, offset: u32, len: u32, label: &str);
}
