use vgmseq::slider::{PanSlider, TempoSlider, VolSlider, bpm_to_micros};

#[test]
fn test_vol_slider_is_monotonic() {
    let slider = VolSlider::new(0, 10, 0, 100);
    let values: Vec<u8> = (0..=10).map(|t| slider.value_at(t)).collect();
    assert_eq!(values.first(), Some(&0));
    assert_eq!(values.last(), Some(&100));
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
}

#[test]
fn test_changes_at_only_when_value_moves() {
    // 4 steps over 40 ticks: the value moves every 10 ticks
    let slider = VolSlider::new(100, 40, 0, 4);
    let changes: Vec<(u32, u8)> = slider.changes().collect();
    assert_eq!(changes.first(), Some(&(100, 0)));
    assert_eq!(changes.last().map(|c| c.1), Some(4));
    assert_eq!(changes.len(), 5);
    for tick in 101..=140 {
        let moved = slider.value_at(tick) != slider.value_at(tick - 1);
        assert_eq!(slider.changes_at(tick), moved, "tick {tick}");
    }
    assert!(!slider.changes_at(99));
    assert!(!slider.changes_at(141));
}

#[test]
fn test_descending_ramp() {
    let slider = PanSlider::new(0, 64, 127, 0);
    let values: Vec<u8> = slider.changes().map(|(_, v)| v).collect();
    assert!(values.windows(2).all(|w| w[0] > w[1]), "{values:?}");
    assert_eq!(values.last(), Some(&0));
}

#[test]
fn test_zero_duration_jumps_to_target() {
    let slider = VolSlider::new(20, 0, 10, 90);
    assert_eq!(slider.get(20), 90.0);
    assert_eq!(slider.changes().collect::<Vec<_>>(), vec![(20, 90)]);
}

#[test]
fn test_tempo_slider_interpolates_bpm() {
    let slider = TempoSlider::from_f64(0, 4, 120.0, 60.0);
    assert_eq!(slider.value_at(0), 500_000);
    assert_eq!(slider.value_at(2), bpm_to_micros(90.0));
    assert_eq!(slider.value_at(4), 1_000_000);
}

#[test]
fn test_bpm_to_micros_clamps() {
    assert_eq!(bpm_to_micros(120.0), 500_000);
    assert_eq!(bpm_to_micros(0.0), 0xFF_FFFF);
    assert_eq!(bpm_to_micros(f64::NAN), 0xFF_FFFF);
    assert_eq!(bpm_to_micros(1.0), 0xFF_FFFF);
    assert_eq!(bpm_to_micros(1e12), 1);
}

#[test]
fn test_long_ramp_emits_once_per_value() {
    let slider = VolSlider::new(0, u32::MAX, 0, 127);
    let changes: Vec<(u32, u8)> = slider.changes().collect();
    assert_eq!(changes.len(), 128);
    assert_eq!(changes.first(), Some(&(0, 0)));
    assert_eq!(changes.last().map(|c| c.1), Some(127));
    assert!(changes.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 + 1 == w[1].1));
}

#[test]
fn test_changes_match_tick_by_tick_scan() {
    let sliders = [
        VolSlider::new(0, 8, 0, 2),
        VolSlider::new(5, 300, 3, 120),
        VolSlider::new(7, 13, 127, 0),
        VolSlider::new(2, 50, 64, 64),
        VolSlider::new(0, 1, 0, 127),
    ];
    for slider in sliders {
        let scanned: Vec<(u32, u8)> = (slider.start..=slider.end() as u32)
            .filter(|&tick| slider.changes_at(tick))
            .map(|tick| (tick, slider.value_at(tick)))
            .collect();
        assert_eq!(slider.changes().collect::<Vec<_>>(), scanned, "{slider:?}");
    }
}

#[test]
fn test_next_change() {
    let slider = VolSlider::new(10, 8, 0, 2);
    assert_eq!(slider.next_change(0), Some(10));
    assert_eq!(slider.next_change(10), Some(12));
    assert_eq!(slider.next_change(13), Some(16));
    assert_eq!(slider.next_change(16), None);
    assert_eq!(slider.next_change(30), None);
}
