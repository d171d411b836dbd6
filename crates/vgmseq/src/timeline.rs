//! Timeline index: timed events with sweep-line "active at tick" queries.
//!
//! Events are appended during a pass in whatever order interpretation
//! produces them, which across tracks is not tick order. `finalize()`
//! builds two permutations of the entries, one ordered by start tick and
//! one by exclusive end tick. A [`TimelineCursor`] walks both permutations
//! forward to maintain the set of events sounding at the current tick.
//!
//! # Examples
//!
//! ```
//! use vgmseq::event::EventId;
//! use vgmseq::timeline::TimelineIndex;
//!
//! let mut timeline = TimelineIndex::new();
//! let a = timeline.add_event(EventId(0), 0, 10);
//! let b = timeline.add_event(EventId(1), 5, 10);
//! timeline.finalize();
//!
//! let mut cursor = timeline.cursor();
//! assert_eq!(cursor.seek(7), vec![a, b]);
//! assert_eq!(cursor.seek(12), vec![b]);
//! ```
use crate::event::EventId;

const NOT_ACTIVE: usize = usize::MAX;

/// An event placed on the timeline.
///
/// `duration` may be revised after creation (see
/// [`TimelineIndex::set_duration`]); the referenced event never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    pub start: u32,
    pub duration: u32,
    pub event: EventId,
}

impl TimedEvent {
    /// Exclusive end tick. Zero-length events still occupy their start tick.
    pub fn end_exclusive(&self) -> u64 {
        self.start as u64 + self.duration.max(1) as u64
    }

    /// True when the event sounds at `tick`.
    pub fn is_active_at(&self, tick: u32) -> bool {
        self.start <= tick && (tick as u64) < self.end_exclusive()
    }
}

/// Append-then-finalize interval index over timed events.
#[derive(Debug, Default, Clone)]
pub struct TimelineIndex {
    entries: Vec<TimedEvent>,
    by_start: Vec<usize>,
    by_end: Vec<usize>,
    finalized: bool,
}

impl TimelineIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a timed event and return its index.
    ///
    /// Invalidates a previous `finalize()`.
    pub fn add_event(&mut self, event: EventId, start: u32, duration: u32) -> usize {
        self.entries.push(TimedEvent {
            start,
            duration,
            event,
        });
        self.finalized = false;
        self.entries.len() - 1
    }

    /// Revise the duration of an entry.
    ///
    /// End order may change, so finalization is invalidated.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn set_duration(&mut self, index: usize, duration: u32) {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .unwrap_or_else(|| panic!("timeline index {index} out of range (len {len})"));
        if entry.duration != duration {
            entry.duration = duration;
            self.finalized = false;
        }
    }

    /// Build the start-ordered and end-ordered permutations.
    ///
    /// Both sorts are stable, so entries with equal ticks keep insertion
    /// order.
    pub fn finalize(&mut self) {
        let entries = &self.entries;
        self.by_start = (0..entries.len()).collect();
        self.by_start.sort_by_key(|&i| entries[i].start);
        self.by_end = (0..entries.len()).collect();
        self.by_end.sort_by_key(|&i| entries[i].end_exclusive());
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn get(&self, index: usize) -> &TimedEvent {
        match self.entries.get(index) {
            Some(entry) => entry,
            None => panic!(
                "timeline index {index} out of range (len {})",
                self.entries.len()
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[TimedEvent] {
        &self.entries
    }

    /// Entry indices ordered by start tick.
    ///
    /// # Panics
    ///
    /// Panics if the index is not finalized.
    pub fn start_order(&self) -> &[usize] {
        self.assert_finalized();
        &self.by_start
    }

    /// Create a sweep cursor positioned before tick 0.
    ///
    /// # Panics
    ///
    /// Panics if the index is not finalized.
    pub fn cursor(&self) -> TimelineCursor<'_> {
        self.assert_finalized();
        TimelineCursor::new(self)
    }

    /// Indices of entries active at `tick`, in ascending index order.
    pub fn active_at(&self, tick: u32) -> Vec<usize> {
        self.cursor().seek(tick)
    }

    /// Indices of entries overlapping `[start, end)`, in ascending index
    /// order.
    pub fn active_in_range(&self, start: u32, end: u32) -> Vec<usize> {
        if end <= start {
            return Vec::new();
        }
        let mut cursor = self.cursor();
        cursor.seek(start);
        let mut found: Vec<usize> = cursor.active.clone();
        found.extend(
            self.by_start[cursor.next_start..]
                .iter()
                .copied()
                .take_while(|&i| self.entries[i].start < end),
        );
        found.sort_unstable();
        found
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_start.clear();
        self.by_end.clear();
        self.finalized = false;
    }

    fn assert_finalized(&self) {
        assert!(
            self.finalized,
            "timeline index used before finalize() ({} entries)",
            self.entries.len()
        );
    }
}

/// Incremental sweep over a finalized [`TimelineIndex`].
///
/// Forward seeks cost only the entries crossed since the previous seek.
/// Seeking backward resets the cursor and replays from the beginning.
#[derive(Debug)]
pub struct TimelineCursor<'a> {
    timeline: &'a TimelineIndex,
    next_start: usize,
    next_end: usize,
    current_tick: Option<u32>,
    active: Vec<usize>,
    // position of each entry inside `active`, or NOT_ACTIVE
    position: Vec<usize>,
}

impl<'a> TimelineCursor<'a> {
    fn new(timeline: &'a TimelineIndex) -> Self {
        Self {
            timeline,
            next_start: 0,
            next_end: 0,
            current_tick: None,
            active: Vec::new(),
            position: vec![NOT_ACTIVE; timeline.len()],
        }
    }

    /// Forget all sweep progress.
    pub fn reset(&mut self) {
        self.next_start = 0;
        self.next_end = 0;
        self.current_tick = None;
        self.active.clear();
        self.position.fill(NOT_ACTIVE);
    }

    /// Tick of the last seek, if any.
    pub fn current_tick(&self) -> Option<u32> {
        self.current_tick
    }

    /// Advance to `tick` and return the active entries in ascending index
    /// order.
    pub fn seek(&mut self, tick: u32) -> Vec<usize> {
        self.advance(tick);
        let mut active = self.active.clone();
        active.sort_unstable();
        active
    }

    /// Advance to `tick` without collecting the active set.
    pub fn advance(&mut self, tick: u32) {
        if matches!(self.current_tick, Some(current) if tick < current) {
            self.reset();
        }
        let timeline = self.timeline;
        let entries = &timeline.entries;
        let by_start = &timeline.by_start;
        let by_end = &timeline.by_end;

        while self.next_start < by_start.len() && entries[by_start[self.next_start]].start <= tick
        {
            let index = by_start[self.next_start];
            if (tick as u64) < entries[index].end_exclusive() {
                self.insert(index);
            }
            self.next_start += 1;
        }
        while self.next_end < by_end.len()
            && entries[by_end[self.next_end]].end_exclusive() <= tick as u64
        {
            self.remove(by_end[self.next_end]);
            self.next_end += 1;
        }
        self.current_tick = Some(tick);
    }

    /// Active entries in unspecified order.
    pub fn active(&self) -> &[usize] {
        &self.active
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.position.get(index).is_some_and(|&p| p != NOT_ACTIVE)
    }

    fn insert(&mut self, index: usize) {
        if self.position[index] == NOT_ACTIVE {
            self.position[index] = self.active.len();
            self.active.push(index);
        }
    }

    fn remove(&mut self, index: usize) {
        let pos = self.position[index];
        if pos == NOT_ACTIVE {
            return;
        }
        self.active.swap_remove(pos);
        if let Some(&moved) = self.active.get(pos) {
            self.position[moved] = pos;
        }
        self.position[index] = NOT_ACTIVE;
    }
}
