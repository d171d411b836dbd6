use vgmseq::format::{RefSeqBuilder, RefSeqFormat};
use vgmseq::midi::{CC_EXPRESSION, CC_PAN, CC_VOLUME, MidiMessage, MidiTrack};
use vgmseq::{EventKind, Pass, SeqOptions, Sequence};

fn count_note_ons(track: &MidiTrack) -> usize {
    track
        .events()
        .iter()
        .filter(|e| matches!(e.message, MidiMessage::NoteOn { .. }))
        .count()
}

/// (tick, value) of every change of one controller.
fn controller(track: &MidiTrack, number: u8) -> Vec<(u32, u8)> {
    track
        .events()
        .iter()
        .filter_map(|e| match e.message {
            MidiMessage::ControlChange { controller, value } if controller == number => {
                Some((e.tick, value))
            }
            _ => None,
        })
        .collect()
}

fn looping_phrase() -> RefSeqBuilder {
    let mut builder = RefSeqBuilder::new();
    builder
        .add_track(0)
        .label("top")
        .note(60, 100, 12)
        .rest(12)
        .jump_to("top");
    builder
}

#[test]
fn test_loop_with_budget_plays_three_times() {
    let mut builder = RefSeqBuilder::new();
    builder.add_track(0).label("a").note_on(60, 100).jump_to("a");
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.set_loop_count(1);
    seq.run_pass(Pass::FindDeltaLength, 0);

    let note_ons = seq
        .timeline()
        .entries()
        .iter()
        .filter(|t| matches!(seq.events()[t.event].kind, EventKind::NoteOn { .. }))
        .count();
    assert_eq!(note_ons, 3);
    assert_eq!(seq.track(0).infinite_loops(), 2);
}

#[test]
fn test_zero_time_self_jump_terminates() {
    let mut builder = RefSeqBuilder::new();
    builder.add_track(0).label("x").jump_to("x");
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.set_loop_count(2);

    seq.run_pass(Pass::AddToUi, 0);
    assert_eq!(seq.track(0).infinite_loops(), 1);

    seq.run_pass(Pass::FindDeltaLength, 0);
    assert_eq!(seq.track(0).infinite_loops(), 3);
    assert_eq!(seq.delta_length(), 0);

    seq.run_pass(Pass::ConvertToMidi, seq.delta_length());
    assert_eq!(seq.track(0).infinite_loops(), 1);
    assert!(seq.track(0).steps() < 10);
    let midi = seq.midi().unwrap();
    assert_eq!(count_note_ons(&midi.tracks[0]), 0);
    assert_eq!(
        midi.tracks[0].events().last().map(|e| &e.message),
        Some(&MidiMessage::EndOfTrack)
    );
}

#[test]
fn test_two_jump_cycle_counts_once_per_cycle() {
    let mut builder = RefSeqBuilder::new();
    builder
        .add_track(0)
        .label("a")
        .note(60, 100, 4)
        .rest(4)
        .jump_to("b")
        .label("b")
        .note(64, 100, 4)
        .rest(4)
        .jump_to("a");
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.set_loop_count(3);
    seq.run_pass(Pass::FindDeltaLength, 0);

    // the first repeated arrival is at "b", so "b" is where loops are counted
    assert_eq!(seq.track(0).infinite_loops(), 4);
    assert_eq!(seq.delta_length(), 36);
}

#[test]
fn test_loop_count_bounds_length() {
    for loop_count in 0..4u32 {
        let mut seq = Sequence::new(looping_phrase().build(), RefSeqFormat).unwrap();
        seq.set_loop_count(loop_count);
        seq.run_pass(Pass::FindDeltaLength, 0);
        assert_eq!(seq.track(0).infinite_loops(), loop_count + 1);
        assert_eq!(seq.delta_length(), 12 * (loop_count + 2));
    }
}

#[test]
fn test_ui_pass_lists_each_offset_once() {
    let mut seq = Sequence::new(looping_phrase().build(), RefSeqFormat).unwrap();
    seq.load();

    let names: Vec<&str> = seq.ui_events(0).iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["Note", "Rest", "Jump"]);
    let offsets: Vec<u32> = seq.ui_events(0).iter().map(|e| e.offset).collect();
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_midi_pass_matches_measured_length() {
    let mut builder = looping_phrase();
    builder.add_track(1).rest(96).end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.load();

    assert_eq!(seq.delta_length(), 96);
    let longest = seq.tracks().iter().map(|t| t.total_ticks()).max();
    assert_eq!(longest, Some(seq.delta_length()));

    // the looping track keeps playing until the other one ends
    let midi = seq.midi().unwrap();
    assert_eq!(count_note_ons(&midi.tracks[0]), 8);
    assert_eq!(midi.tracks[0].length(), 96);
    assert_eq!(midi.tracks[1].length(), 96);
}

#[test]
fn test_single_looping_track_midi_length() {
    let mut seq = Sequence::new(looping_phrase().build(), RefSeqFormat).unwrap();
    seq.load();

    assert_eq!(seq.delta_length(), 36);
    assert_eq!(seq.track(0).total_ticks(), 36);
    assert_eq!(count_note_ons(&seq.midi().unwrap().tracks[0]), 3);
}

#[test]
fn test_tracks_are_independent() {
    let mut builder = RefSeqBuilder::new();
    builder.add_track(0).rest(10).raw(&[0xEE]).rest(50).end();
    builder.add_track(1).rest(40).end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.load();

    assert_eq!(seq.track(0).total_ticks(), 10);
    assert_eq!(seq.track(1).total_ticks(), 40);
    assert_eq!(seq.delta_length(), 40);
}

#[test]
fn test_initial_state_written_to_midi() {
    let mut builder = RefSeqBuilder::new();
    builder.set_tempo(150).set_ppqn(96);
    builder.add_track(3).note(60, 100, 4).rest(4).end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.load();

    let midi = seq.midi().unwrap();
    assert_eq!(midi.ppqn, 96);
    assert_eq!(midi.conductor.events()[0].message, MidiMessage::Tempo(400_000));
    let track = &midi.tracks[0];
    assert_eq!(controller(track, CC_VOLUME), vec![(0, 100)]);
    assert_eq!(controller(track, CC_EXPRESSION), vec![(0, 127)]);
    assert_eq!(controller(track, CC_PAN), vec![(0, 64)]);
    assert!(track.events().iter().all(|e| e.channel == 3));

    seq.set_options(SeqOptions {
        write_initial_state: false,
        ..SeqOptions::default()
    });
    seq.run_pass(Pass::ConvertToMidi, seq.delta_length());
    let midi = seq.midi().unwrap();
    assert!(controller(&midi.tracks[0], CC_VOLUME).is_empty());
    assert!(!midi
        .conductor
        .events()
        .iter()
        .any(|e| matches!(e.message, MidiMessage::Tempo(_))));
}

#[test]
fn test_conductor_events() {
    let mut builder = RefSeqBuilder::new();
    builder
        .add_track(0)
        .time_signature(3, 4)
        .master_volume(127)
        .rest(8)
        .tempo(100)
        .tempo_slide(4, 200)
        .rest(8)
        .end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.load();

    let conductor = &seq.midi().unwrap().conductor;
    let messages: Vec<&MidiMessage> = conductor.events().iter().map(|e| &e.message).collect();
    assert!(messages.contains(&&MidiMessage::TimeSignature {
        numerator: 3,
        denominator_pow2: 2,
        clocks_per_click: 24,
        thirty_seconds_per_quarter: 8,
    }));
    assert!(messages.contains(&&MidiMessage::MasterVolume(0x3FFF)));

    let tempos: Vec<(u32, u32)> = conductor
        .events()
        .iter()
        .filter_map(|e| match e.message {
            MidiMessage::Tempo(us) => Some((e.tick, us)),
            _ => None,
        })
        .collect();
    assert_eq!(tempos.first(), Some(&(0, 500_000)));
    assert!(tempos.contains(&(8, 600_000)));
    assert_eq!(tempos.last(), Some(&(12, 300_000)));
    assert_eq!(
        conductor.events().last().map(|e| &e.message),
        Some(&MidiMessage::EndOfTrack)
    );
}

#[test]
fn test_channel_messages() {
    let mut builder = RefSeqBuilder::new();
    builder
        .add_track(0)
        .program(12)
        .bank(130)
        .pitch_bend(-100)
        .pitch_bend_range(12)
        .sustain(true)
        .controller(91, 40)
        .marker("intro")
        .rest(4)
        .end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.load();

    let track = &seq.midi().unwrap().tracks[0];
    let messages: Vec<&MidiMessage> = track.events().iter().map(|e| &e.message).collect();
    assert!(messages.contains(&&MidiMessage::ProgramChange(12)));
    assert!(messages.contains(&&MidiMessage::PitchBend(-100)));
    assert!(messages.contains(&&MidiMessage::Marker("intro".into())));
    assert_eq!(controller(track, 0), vec![(0, 1)]);
    assert_eq!(controller(track, 32), vec![(0, 2)]);
    assert_eq!(controller(track, 6), vec![(0, 12)]);
    assert_eq!(controller(track, 64), vec![(0, 127)]);
    assert_eq!(controller(track, 91), vec![(0, 40)]);
}

fn ramp_sequence(tick_sync: bool) -> Sequence {
    let mut builder = RefSeqBuilder::new();
    builder.set_tick_sync(tick_sync);
    builder.add_track(0).volume_slide(10, 0).rest(20).end();
    builder
        .add_track(1)
        .note(60, 100, 5)
        .rest(5)
        .note(62, 100, 5)
        .rest(5)
        .end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.load();
    seq
}

#[test]
fn test_tick_sync_ramp_emits_every_changed_tick() {
    let seq = ramp_sequence(true);
    assert!(seq.header().tick_sync);

    let volume = controller(&seq.midi().unwrap().tracks[0], CC_VOLUME);
    // initial state, then one message per tick of the ramp
    assert_eq!(volume.len(), 12);
    assert_eq!(volume.last(), Some(&(10, 0)));
    let ramp: Vec<u8> = volume[1..].iter().map(|v| v.1).collect();
    assert!(ramp.windows(2).all(|w| w[0] > w[1]), "{ramp:?}");
    assert_eq!(seq.track(0).volume(), 0);
}

#[test]
fn test_tick_sync_matches_sequential_output() {
    let synced = ramp_sequence(true);
    let sequential = ramp_sequence(false);

    assert_eq!(synced.delta_length(), 20);
    assert_eq!(sequential.delta_length(), 20);
    for track in 0..2 {
        let a = &synced.midi().unwrap().tracks[track];
        let b = &sequential.midi().unwrap().tracks[track];
        let mut a: Vec<_> = a.events().iter().map(|e| (e.tick, e.message.clone())).collect();
        let mut b: Vec<_> = b.events().iter().map(|e| (e.tick, e.message.clone())).collect();
        a.sort_by_key(|e| e.0);
        b.sort_by_key(|e| e.0);
        assert_eq!(a, b, "track {track}");
    }
}

#[test]
fn test_tick_sync_notes_land_on_their_ticks() {
    let seq = ramp_sequence(true);
    let notes: Vec<(u32, u8)> = seq.midi().unwrap().tracks[1]
        .events()
        .iter()
        .filter_map(|e| match e.message {
            MidiMessage::NoteOn { key, .. } => Some((e.tick, key)),
            _ => None,
        })
        .collect();
    assert_eq!(notes, vec![(0, 60), (5, 62)]);
    assert_eq!(seq.track(1).total_ticks(), 10);
    assert_eq!(seq.track(0).total_ticks(), 20);
}

#[test]
fn test_tick_sync_master_volume_ramp() {
    let mut builder = RefSeqBuilder::new();
    builder.set_tick_sync(true);
    builder
        .add_track(0)
        .master_volume(0)
        .master_volume_slide(4, 127)
        .rest(8)
        .end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.load();

    let masters: Vec<(u32, u16)> = seq
        .midi()
        .unwrap()
        .conductor
        .events()
        .iter()
        .filter_map(|e| match e.message {
            MidiMessage::MasterVolume(v) => Some((e.tick, v)),
            _ => None,
        })
        .collect();
    assert_eq!(masters.first(), Some(&(0, 0)));
    assert_eq!(masters.last(), Some(&(4, 0x3FFF)));
    assert!(masters.iter().all(|m| m.0 <= 4));
}

#[test]
fn test_passes_can_rerun() {
    let mut seq = Sequence::new(looping_phrase().build(), RefSeqFormat).unwrap();
    seq.load();
    let first = seq.midi().unwrap().event_count();
    let events = seq.events().len();
    seq.load();

    assert_eq!(seq.midi().unwrap().event_count(), first);
    assert_eq!(seq.events().len(), events);
    assert_eq!(seq.last_pass(), Some(Pass::ConvertToMidi));
}

#[test]
fn test_summary() {
    let mut builder = looping_phrase();
    builder.add_track(5).rest(48).end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.load();

    let summary = seq.summary();
    assert_eq!(summary.format, "RefSeq");
    assert_eq!(summary.ppqn, 48);
    assert_eq!(summary.delta_length, 48);
    assert_eq!(summary.tracks.len(), 2);
    assert_eq!(summary.tracks[0].event_count, 3);
    assert_eq!(summary.tracks[0].infinite_loops, 2);
    assert_eq!(summary.tracks[0].total_ticks, 36);
    assert_eq!(summary.tracks[1].channel, 5);
    assert_eq!(summary.tracks[1].infinite_loops, 0);
    assert_eq!(summary.tracks[1].total_ticks, 48);
    assert_eq!(summary.event_count, 5);
}

#[test]
fn test_measured_loops_survive_midi_pass() {
    let mut seq = Sequence::new(looping_phrase().build(), RefSeqFormat).unwrap();
    seq.load();

    let track = seq.track(0);
    assert_eq!(track.measured_loops(), 2);
    assert_eq!(track.measured_ticks(), 36);
    // the MIDI pass stops at the measured length, one revisit short
    assert_eq!(track.infinite_loops(), 1);
    assert_eq!(seq.summary().tracks[0].infinite_loops, 2);

    // a UI pass after load keeps the measured figures
    seq.run_pass(Pass::AddToUi, 0);
    assert_eq!(seq.track(0).measured_loops(), 2);
    assert_eq!(seq.summary().tracks[0].total_ticks, 36);
}

#[test]
fn test_long_ramp_tick_sync_matches_sequential() {
    let volume = |tick_sync: bool| {
        let mut builder = RefSeqBuilder::new();
        builder.set_tick_sync(tick_sync);
        builder.add_track(0).volume_slide(60_000, 0).rest(65_000).end();
        let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
        seq.load();
        controller(&seq.midi().unwrap().tracks[0], CC_VOLUME)
    };
    let synced = volume(true);
    // initial state, then one message per distinct value 100..=0
    assert_eq!(synced.len(), 102);
    assert_eq!(synced.last().map(|v| v.1), Some(0));
    assert_eq!(synced, volume(false));
}
