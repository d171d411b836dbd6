//! Transpose timeline.
//!
//! Derived from a finalized [`TimelineIndex`] in one sweep over its
//! start-ordered permutation. Keeps the global and per-track transpose
//! change points, and the track transpose in effect for every timeline
//! entry, so that note names and MIDI keys can be resolved without walking
//! the events again.
use crate::event::{EventArena, EventKind, TransposeScope};
use crate::timeline::TimelineIndex;

/// A transpose value taking effect at `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransposeChange {
    pub tick: u32,
    pub semitones: i32,
}

#[derive(Debug, Default, Clone)]
pub struct TransposeTimeline {
    global: Vec<TransposeChange>,
    tracks: Vec<Vec<TransposeChange>>,
    track_by_index: Vec<i32>,
}

impl TransposeTimeline {
    /// Sweep `timeline` in start order and collect transpose changes.
    ///
    /// # Panics
    ///
    /// Panics if `timeline` is not finalized.
    pub fn build(timeline: &TimelineIndex, events: &EventArena) -> Self {
        let mut built = TransposeTimeline {
            track_by_index: vec![0; timeline.len()],
            ..Default::default()
        };
        let mut per_track: Vec<i32> = Vec::new();

        for &index in timeline.start_order() {
            let timed = timeline.get(index);
            let event = events.get(timed.event);
            if per_track.len() <= event.track {
                per_track.resize(event.track + 1, 0);
                built.tracks.resize_with(event.track + 1, Vec::new);
            }
            if let EventKind::Transpose { scope, semitones } = event.kind {
                let change = TransposeChange {
                    tick: timed.start,
                    semitones: semitones as i32,
                };
                match scope {
                    TransposeScope::Global => built.global.push(change),
                    TransposeScope::Track => {
                        per_track[event.track] = change.semitones;
                        built.tracks[event.track].push(change);
                    }
                }
            }
            built.track_by_index[index] = per_track[event.track];
        }
        built
    }

    /// Global plus track transpose in effect for `track` at `tick`.
    pub fn total_at_tick(&self, track: usize, tick: u32) -> i32 {
        self.global_at_tick(tick) + self.track_at_tick(track, tick)
    }

    pub fn global_at_tick(&self, tick: u32) -> i32 {
        value_at(&self.global, tick)
    }

    pub fn track_at_tick(&self, track: usize, tick: u32) -> i32 {
        self.tracks
            .get(track)
            .map_or(0, |changes| value_at(changes, tick))
    }

    /// Track transpose recorded for a timeline entry when it was swept.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not an entry of the timeline this was built from.
    pub fn track_at_index(&self, index: usize) -> i32 {
        match self.track_by_index.get(index) {
            Some(&value) => value,
            None => panic!(
                "timeline index {index} out of range for transpose timeline (len {})",
                self.track_by_index.len()
            ),
        }
    }

    pub fn global_changes(&self) -> &[TransposeChange] {
        &self.global
    }

    pub fn track_changes(&self, track: usize) -> &[TransposeChange] {
        self.tracks.get(track).map(Vec::as_slice).unwrap_or(&[])
    }
}

// last change with tick <= query
fn value_at(changes: &[TransposeChange], tick: u32) -> i32 {
    let upper = changes.partition_point(|c| c.tick <= tick);
    if upper == 0 {
        0
    } else {
        changes[upper - 1].semitones
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_at_uses_last_change_at_tick() {
        let changes = [
            TransposeChange {
                tick: 4,
                semitones: 1,
            },
            TransposeChange {
                tick: 4,
                semitones: 5,
            },
            TransposeChange {
                tick: 9,
                semitones: -2,
            },
        ];
        assert_eq!(value_at(&changes, 3), 0);
        assert_eq!(value_at(&changes, 4), 5);
        assert_eq!(value_at(&changes, 8), 5);
        assert_eq!(value_at(&changes, 100), -2);
        assert_eq!(value_at(&[], 100), 0);
    }
}
