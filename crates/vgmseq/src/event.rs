//! Sequence events and the event arena.
//!
//! An `Event` describes one decoded instruction: what it does (`EventKind`),
//! which track it belongs to and which source bytes it was decoded from.
//! Events are write-once. Timing lives elsewhere: the timeline index wraps
//! an `EventId` together with a start tick and a (revisable) duration.
//!
//! All events of a sequence are owned by one `EventArena` and referenced by
//! `EventId`. The arena deduplicates by `(track, offset)`, so replaying the
//! same bytes in a later loop iteration or a later pass resolves to the
//! event created on the first visit.
use std::collections::HashMap;
use std::fmt;

/// Index of an event inside an `EventArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub usize);

/// Which transpose register a `Transpose` event writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransposeScope {
    /// Applies to every track of the sequence.
    Global,
    /// Applies to the owning track only.
    Track,
}

/// What an event does, with its kind-specific payload.
///
/// Slide durations and note durations are in ticks. Values such as volume,
/// pan, and expression are MIDI-range (0..=127) controller values.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8 },
    DurationNote { key: u8, velocity: u8, duration: u32 },
    Rest { ticks: u32 },
    /// Tie: extends the previous duration notes by `ticks`.
    Hold { ticks: u32 },
    Volume(u8),
    VolumeSlide { target: u8, duration: u32 },
    MasterVolume(u8),
    MasterVolumeSlide { target: u8, duration: u32 },
    Expression(u8),
    ExpressionSlide { target: u8, duration: u32 },
    Pan(u8),
    PanSlide { target: u8, duration: u32 },
    Tempo { bpm: f64 },
    TempoSlide { target_bpm: f64, duration: u32 },
    TimeSignature { numerator: u8, denominator: u8, ticks_per_quarter: u16 },
    ProgramChange(u8),
    BankSelect(u16),
    PitchBend(i16),
    PitchBendRange { semitones: u8, cents: u8 },
    Modulation(u8),
    Breath(u8),
    Sustain(bool),
    Portamento(bool),
    PortamentoTime(u8),
    Reverb(u8),
    Chorus(u8),
    ControllerChange { controller: u8, value: u8 },
    Transpose { scope: TransposeScope, semitones: i8 },
    Octave(u8),
    KeyCorrection(i8),
    DrumNote(Option<u8>),
    Marker(String),
    Jump { destination: u32 },
    Call { destination: u32, return_offset: u32 },
    Return,
    LoopStart { count: u32 },
    LoopEnd,
    LoopForever { destination: u32 },
    TrackEnd,
    Unknown(String),
}

impl EventKind {
    /// True for kinds that transfer control (jump, call, return, loops).
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            EventKind::Jump { .. }
                | EventKind::Call { .. }
                | EventKind::Return
                | EventKind::LoopStart { .. }
                | EventKind::LoopEnd
                | EventKind::LoopForever { .. }
                | EventKind::TrackEnd
        )
    }

    /// The untransposed key of note-like kinds.
    pub fn key(&self) -> Option<u8> {
        match self {
            EventKind::NoteOn { key, .. }
            | EventKind::NoteOff { key }
            | EventKind::DurationNote { key, .. } => Some(*key),
            _ => None,
        }
    }
}

/// A decoded instruction, traceable to its source bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    /// Index of the owning track in the sequence.
    pub track: usize,
    /// Source byte offset of the instruction.
    pub offset: u32,
    /// Source byte length of the instruction.
    pub length: u32,
}

impl Event {
    pub fn new(kind: EventKind, track: usize, offset: u32, length: u32) -> Self {
        Self {
            kind,
            track,
            offset,
            length,
        }
    }

    /// Short label for listings, e.g. `"Note On"`.
    pub fn name(&self) -> &'static str {
        match &self.kind {
            EventKind::NoteOn { .. } => "Note On",
            EventKind::NoteOff { .. } => "Note Off",
            EventKind::DurationNote { .. } => "Note",
            EventKind::Rest { .. } => "Rest",
            EventKind::Hold { .. } => "Hold",
            EventKind::Volume(_) => "Volume",
            EventKind::VolumeSlide { .. } => "Volume Slide",
            EventKind::MasterVolume(_) => "Master Volume",
            EventKind::MasterVolumeSlide { .. } => "Master Volume Slide",
            EventKind::Expression(_) => "Expression",
            EventKind::ExpressionSlide { .. } => "Expression Slide",
            EventKind::Pan(_) => "Pan",
            EventKind::PanSlide { .. } => "Pan Slide",
            EventKind::Tempo { .. } => "Tempo",
            EventKind::TempoSlide { .. } => "Tempo Slide",
            EventKind::TimeSignature { .. } => "Time Signature",
            EventKind::ProgramChange(_) => "Program Change",
            EventKind::BankSelect(_) => "Bank Select",
            EventKind::PitchBend(_) => "Pitch Bend",
            EventKind::PitchBendRange { .. } => "Pitch Bend Range",
            EventKind::Modulation(_) => "Modulation",
            EventKind::Breath(_) => "Breath",
            EventKind::Sustain(_) => "Sustain",
            EventKind::Portamento(_) => "Portamento",
            EventKind::PortamentoTime(_) => "Portamento Time",
            EventKind::Reverb(_) => "Reverb",
            EventKind::Chorus(_) => "Chorus",
            EventKind::ControllerChange { .. } => "Controller",
            EventKind::Transpose {
                scope: TransposeScope::Global,
                ..
            } => "Global Transpose",
            EventKind::Transpose { .. } => "Transpose",
            EventKind::Octave(_) => "Octave",
            EventKind::KeyCorrection(_) => "Key Correction",
            EventKind::DrumNote(_) => "Drum Note",
            EventKind::Marker(_) => "Marker",
            EventKind::Jump { .. } => "Jump",
            EventKind::Call { .. } => "Call",
            EventKind::Return => "Return",
            EventKind::LoopStart { .. } => "Loop Start",
            EventKind::LoopEnd => "Loop End",
            EventKind::LoopForever { .. } => "Loop Forever",
            EventKind::TrackEnd => "Track End",
            EventKind::Unknown(_) => "Unknown",
        }
    }

    /// Human-readable description of the event and its payload.
    pub fn description(&self) -> String {
        match &self.kind {
            EventKind::NoteOn { key, velocity } => {
                format!("{} ({key}), velocity {velocity}", note_name(*key as i32))
            }
            EventKind::NoteOff { key } => format!("{} ({key})", note_name(*key as i32)),
            EventKind::DurationNote {
                key,
                velocity,
                duration,
            } => format!(
                "{} ({key}), velocity {velocity}, duration {duration}",
                note_name(*key as i32)
            ),
            EventKind::Rest { ticks } | EventKind::Hold { ticks } => format!("{ticks} ticks"),
            EventKind::Volume(v)
            | EventKind::MasterVolume(v)
            | EventKind::Expression(v)
            | EventKind::Modulation(v)
            | EventKind::Breath(v)
            | EventKind::PortamentoTime(v)
            | EventKind::Reverb(v)
            | EventKind::Chorus(v) => format!("{v}"),
            EventKind::VolumeSlide { target, duration }
            | EventKind::MasterVolumeSlide { target, duration }
            | EventKind::ExpressionSlide { target, duration } => {
                format!("to {target} over {duration} ticks")
            }
            EventKind::Pan(p) => format!("{} ({p})", pan_label(*p)),
            EventKind::PanSlide { target, duration } => {
                format!("to {} over {duration} ticks", pan_label(*target))
            }
            EventKind::Tempo { bpm } => format!("{bpm:.2} BPM"),
            EventKind::TempoSlide {
                target_bpm,
                duration,
            } => format!("to {target_bpm:.2} BPM over {duration} ticks"),
            EventKind::TimeSignature {
                numerator,
                denominator,
                ticks_per_quarter,
            } => format!("{numerator}/{denominator} ({ticks_per_quarter} ticks per quarter)"),
            EventKind::ProgramChange(p) => format!("program {p}"),
            EventKind::BankSelect(b) => format!("bank {b}"),
            EventKind::PitchBend(b) => format!("{b:+}"),
            EventKind::PitchBendRange { semitones, cents } => {
                format!("{semitones} semitones, {cents} cents")
            }
            EventKind::Sustain(on) | EventKind::Portamento(on) => {
                if *on { "on".into() } else { "off".into() }
            }
            EventKind::ControllerChange { controller, value } => {
                format!("CC{controller} = {value}")
            }
            EventKind::Transpose { semitones, .. } => format!("{semitones:+} semitones"),
            EventKind::Octave(o) => format!("octave {o}"),
            EventKind::KeyCorrection(k) => format!("{k:+} semitones"),
            EventKind::DrumNote(Some(key)) => format!("all notes as {}", note_name(*key as i32)),
            EventKind::DrumNote(None) => "off".into(),
            EventKind::Marker(text) => text.clone(),
            EventKind::Jump { destination } => format!("to 0x{destination:X}"),
            EventKind::Call {
                destination,
                return_offset,
            } => format!("to 0x{destination:X}, return to 0x{return_offset:X}"),
            EventKind::LoopStart { count: 0 } => "forever".into(),
            EventKind::LoopStart { count } => format!("{count} times"),
            EventKind::LoopForever { destination } => format!("to 0x{destination:X}"),
            EventKind::Return | EventKind::LoopEnd | EventKind::TrackEnd => String::new(),
            EventKind::Unknown(label) => label.clone(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let desc = self.description();
        if desc.is_empty() {
            write!(f, "{}", self.name())
        } else {
            write!(f, "{}: {}", self.name(), desc)
        }
    }
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Name of a MIDI key, with middle C (60) as `C4`.
///
/// Keys outside 0..=127 are still named (e.g. after an extreme transpose),
/// which keeps listings readable for malformed data.
///
/// ```
/// use vgmseq::event::note_name;
/// assert_eq!(note_name(60), "C4");
/// assert_eq!(note_name(61), "C#4");
/// assert_eq!(note_name(0), "C-1");
/// ```
pub fn note_name(key: i32) -> String {
    let octave = key.div_euclid(12) - 1;
    let name = NOTE_NAMES[key.rem_euclid(12) as usize];
    format!("{name}{octave}")
}

fn pan_label(pan: u8) -> String {
    match pan.cmp(&64) {
        std::cmp::Ordering::Equal => "center".into(),
        std::cmp::Ordering::Less => format!("L{}", 64 - pan),
        std::cmp::Ordering::Greater => format!("R{}", pan - 64),
    }
}

/// Owner of every event of a sequence.
///
/// Events are appended once per `(track, offset)` and never mutated.
#[derive(Debug, Default, Clone)]
pub struct EventArena {
    events: Vec<Event>,
    by_offset: HashMap<(usize, u32), EventId>,
}

impl EventArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `event` unless an event from the same track and offset exists.
    ///
    /// Returns the id of the stored event and whether it was newly created.
    pub fn insert(&mut self, event: Event) -> (EventId, bool) {
        let key = (event.track, event.offset);
        if let Some(id) = self.by_offset.get(&key) {
            return (*id, false);
        }
        let id = EventId(self.events.len());
        self.events.push(event);
        self.by_offset.insert(key, id);
        (id, true)
    }

    /// Look up the event recorded for a track at a source offset.
    pub fn find(&self, track: usize, offset: u32) -> Option<EventId> {
        self.by_offset.get(&(track, offset)).copied()
    }

    /// Whether an event has been recorded for this track at this offset.
    pub fn is_offset_used(&self, track: usize, offset: u32) -> bool {
        self.by_offset.contains_key(&(track, offset))
    }

    /// # Panics
    ///
    /// Panics if `id` was not produced by this arena.
    pub fn get(&self, id: EventId) -> &Event {
        &self.events[id.0]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventId, &Event)> {
        self.events.iter().enumerate().map(|(i, e)| (EventId(i), e))
    }

    /// Events of one track ordered by source offset.
    pub fn track_events(&self, track: usize) -> Vec<(EventId, &Event)> {
        let mut list: Vec<(EventId, &Event)> =
            self.iter().filter(|(_, e)| e.track == track).collect();
        list.sort_by_key(|(_, e)| e.offset);
        list
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.by_offset.clear();
    }
}

impl std::ops::Index<EventId> for EventArena {
    type Output = Event;

    fn index(&self, id: EventId) -> &Event {
        self.get(id)
    }
}
