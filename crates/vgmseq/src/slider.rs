//! Linear controller ramps.
//!
//! A `Slider` interpolates between an initial and a target value over a
//! tick range. It holds no mutable state: the interpreter asks for the
//! value at a tick and whether that value differs from the previous tick,
//! and only then emits a discrete controller message.
//!
//! A ramp is monotonic, so the ticks where the rounded value moves are
//! found by bisection. Expanding a ramp costs one step per distinct value,
//! not one per tick of its duration.
//!
//! ```
//! use vgmseq::slider::VolSlider;
//!
//! let slider = VolSlider::new(0, 10, 0, 100);
//! assert_eq!(slider.get(5), 50.0);
//! assert_eq!(slider.value_at(10), 100);
//! assert!(slider.changes_at(0));
//! ```
use std::marker::PhantomData;

/// The controller a slider drives and how its value is rounded.
pub trait SliderTarget {
    type Value: Copy + PartialEq + std::fmt::Debug;

    /// Convert an interpolated value to the controller's value type.
    fn from_f64(value: f64) -> Self::Value;

    fn to_f64(value: Self::Value) -> f64;
}

macro_rules! midi_range_target {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;

        impl SliderTarget for $name {
            type Value = u8;

            fn from_f64(value: f64) -> u8 {
                value.round().clamp(0.0, 127.0) as u8
            }

            fn to_f64(value: u8) -> f64 {
                value as f64
            }
        }
    };
}

midi_range_target!(Volume);
midi_range_target!(MasterVolume);
midi_range_target!(Expression);
midi_range_target!(Pan);

/// Tempo ramps interpolate beats per minute and resolve to whole
/// microseconds per quarter note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tempo;

impl SliderTarget for Tempo {
    type Value = u32;

    fn from_f64(bpm: f64) -> u32 {
        bpm_to_micros(bpm)
    }

    fn to_f64(micros: u32) -> f64 {
        60_000_000.0 / micros.max(1) as f64
    }
}

/// Microseconds per quarter note for a BPM value, clamped to the 24-bit
/// range a MIDI tempo meta event can carry.
pub fn bpm_to_micros(bpm: f64) -> u32 {
    if bpm <= 0.0 || !bpm.is_finite() {
        return 0xFF_FFFF;
    }
    (60_000_000.0 / bpm).round().clamp(1.0, 16_777_215.0) as u32
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slider<K: SliderTarget> {
    pub start: u32,
    pub duration: u32,
    pub initial: f64,
    pub target: f64,
    _target: PhantomData<K>,
}

pub type VolSlider = Slider<Volume>;
pub type MasterVolSlider = Slider<MasterVolume>;
pub type ExpressionSlider = Slider<Expression>;
pub type PanSlider = Slider<Pan>;
pub type TempoSlider = Slider<Tempo>;

impl<K: SliderTarget> Slider<K> {
    pub fn new(start: u32, duration: u32, initial: K::Value, target: K::Value) -> Self {
        Self::from_f64(start, duration, K::to_f64(initial), K::to_f64(target))
    }

    /// Build a slider from raw endpoints (e.g. BPM for tempo).
    pub fn from_f64(start: u32, duration: u32, initial: f64, target: f64) -> Self {
        Self {
            start,
            duration,
            initial,
            target,
            _target: PhantomData,
        }
    }

    /// Last tick of the ramp (inclusive).
    pub fn end(&self) -> u64 {
        self.start as u64 + self.duration as u64
    }

    pub fn contains(&self, tick: u32) -> bool {
        tick >= self.start && (tick as u64) <= self.end()
    }

    /// Interpolated value at `tick`, or 0 outside the ramp.
    pub fn get(&self, tick: u32) -> f64 {
        if !self.contains(tick) {
            return 0.0;
        }
        if self.duration == 0 || tick as u64 == self.end() {
            return self.target;
        }
        let alpha = (tick - self.start) as f64 / self.duration as f64;
        // same as initial * (1 - alpha) + target * alpha, but monotonic in
        // alpha under floating-point rounding
        self.initial + (self.target - self.initial) * alpha
    }

    /// Value at `tick` in the controller's value type.
    pub fn value_at(&self, tick: u32) -> K::Value {
        K::from_f64(self.get(tick))
    }

    /// True when a message must be emitted at `tick`: at the first tick of
    /// the ramp, and afterwards whenever the rounded value moves.
    pub fn changes_at(&self, tick: u32) -> bool {
        if !self.contains(tick) {
            return false;
        }
        tick == self.start || self.value_at(tick) != self.value_at(tick - 1)
    }

    /// First tick after `tick` at which [`Slider::changes_at`] holds.
    pub fn next_change(&self, tick: u32) -> Option<u32> {
        if tick < self.start {
            return Some(self.start);
        }
        let last = self.last_tick();
        if tick >= last {
            return None;
        }
        let value = self.value_at(tick);
        if self.value_at(last) == value {
            return None;
        }
        // value_at(same) == value, value_at(moved) != value
        let (mut same, mut moved) = (tick, last);
        while moved - same > 1 {
            let mid = same + (moved - same) / 2;
            if self.value_at(mid) == value {
                same = mid;
            } else {
                moved = mid;
            }
        }
        Some(moved)
    }

    /// Ticks at which a message must be emitted, with their values.
    pub fn changes(&self) -> impl Iterator<Item = (u32, K::Value)> + '_ {
        std::iter::successors(Some(self.start), move |&tick| self.next_change(tick))
            .map(move |tick| (tick, self.value_at(tick)))
    }

    fn last_tick(&self) -> u32 {
        self.end().min(u32::MAX as u64) as u32
    }
}
