use vgmseq::format::{RefSeqBuilder, RefSeqFormat};
use vgmseq::midi::MidiMessage;
use vgmseq::{Pass, Sequence};

fn transposed_sequence() -> Sequence {
    let mut builder = RefSeqBuilder::new();
    builder
        .add_track(0)
        .global_transpose(2)
        .rest(5)
        .transpose(1)
        .note(60, 100, 10)
        .rest(10)
        .end();
    Sequence::new(builder.build(), RefSeqFormat).unwrap()
}

#[test]
fn test_global_and_track_transpose_combine() {
    let mut seq = transposed_sequence();
    seq.run_pass(Pass::AddToUi, 0);

    let transpose = seq.transpose();
    assert_eq!(transpose.total_at_tick(0, 0), 2);
    assert_eq!(transpose.total_at_tick(0, 4), 2);
    assert_eq!(transpose.total_at_tick(0, 5), 3);
    assert_eq!(transpose.global_at_tick(100), 2);
    assert_eq!(transpose.track_at_tick(0, 4), 0);
    assert_eq!(transpose.track_at_tick(0, 5), 1);
    // tracks without changes read as zero
    assert_eq!(transpose.track_at_tick(7, 5), 0);
    assert!(transpose.track_changes(7).is_empty());
}

#[test]
fn test_note_label_includes_transpose() {
    let mut seq = transposed_sequence();
    seq.run_pass(Pass::AddToUi, 0);

    let timeline = seq.timeline();
    let labels: Vec<String> = (0..timeline.len())
        .filter_map(|i| seq.note_label(i))
        .collect();
    // 60 + 2 global + 1 track
    assert_eq!(labels, vec!["D#4".to_string()]);
}

#[test]
fn test_midi_keys_follow_transpose() {
    let mut seq = transposed_sequence();
    seq.load();

    let midi = seq.midi().unwrap();
    let keys: Vec<(u32, u8)> = midi.tracks[0]
        .events()
        .iter()
        .filter_map(|e| match e.message {
            MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key } => Some((e.tick, key)),
            _ => None,
        })
        .collect();
    assert_eq!(keys, vec![(5, 63), (15, 63)]);
}

#[test]
fn test_global_transpose_after_note_on_does_not_split_note() {
    let mut builder = RefSeqBuilder::new();
    builder
        .add_track(0)
        .note_on(60, 100)
        .rest(4)
        .global_transpose(12)
        .rest(4)
        .note_off(60)
        .end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.load();

    let midi = seq.midi().unwrap();
    let keys: Vec<u8> = midi.tracks[0]
        .events()
        .iter()
        .filter_map(|e| match e.message {
            MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key } => Some(key),
            _ => None,
        })
        .collect();
    assert_eq!(keys, vec![60, 60]);
}

#[test]
fn test_transpose_changes_are_listed_in_tick_order() {
    let mut builder = RefSeqBuilder::new();
    builder.add_track(0).transpose(-3).rest(8).transpose(4).rest(8).end();
    builder.add_track(1).rest(2).global_transpose(-1).rest(2).end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.run_pass(Pass::AddToUi, 0);

    let transpose = seq.transpose();
    let track0: Vec<(u32, i32)> = transpose
        .track_changes(0)
        .iter()
        .map(|c| (c.tick, c.semitones))
        .collect();
    assert_eq!(track0, vec![(0, -3), (8, 4)]);
    assert_eq!(transpose.global_changes().len(), 1);
    assert_eq!(transpose.global_changes()[0].tick, 2);
    // the global change reaches track 0 too
    assert_eq!(transpose.total_at_tick(0, 9), 3);
    assert_eq!(transpose.total_at_tick(0, 1), -3);
}

#[test]
fn test_note_label_agrees_with_midi_key_on_tick_ties() {
    // the global change lands on the note's start tick but is decoded later
    let mut builder = RefSeqBuilder::new();
    builder.add_track(0).note(60, 100, 10).rest(10).end();
    builder.add_track(1).global_transpose(3).rest(10).end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.load();

    let timeline = seq.timeline();
    let labels: Vec<String> = (0..timeline.len())
        .filter_map(|i| seq.note_label(i))
        .collect();
    assert_eq!(labels, vec!["D#4".to_string()]);

    let midi = seq.midi().unwrap();
    let keys: Vec<u8> = midi.tracks[0]
        .events()
        .iter()
        .filter_map(|e| match e.message {
            MidiMessage::NoteOn { key, .. } => Some(key),
            _ => None,
        })
        .collect();
    assert_eq!(keys, vec![63]);
}
