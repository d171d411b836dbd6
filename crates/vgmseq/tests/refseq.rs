use vgmseq::format::refseq::{HEADER_SIZE, TRACK_ENTRY_SIZE};
use vgmseq::format::{RefSeqBuilder, RefSeqFormat};
use vgmseq::{EventKind, Pass, Sequence, TransposeScope};

fn ui_kinds(seq: &Sequence, track: usize) -> Vec<(u32, u32, EventKind)> {
    seq.ui_events(track)
        .into_iter()
        .map(|e| (e.offset, e.length, e.kind.clone()))
        .collect()
}

#[test]
fn test_header_fields() {
    let mut builder = RefSeqBuilder::new();
    builder.set_ppqn(24).set_tempo(90).set_tick_sync(true);
    builder.add_track(2).end();
    builder.add_track(15).end();
    let seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();

    assert_eq!(seq.format_name(), "RefSeq");
    assert_eq!(seq.header().ppqn, 24);
    assert_eq!(seq.header().initial_tempo_bpm, 90.0);
    assert!(seq.header().tick_sync);
    assert_eq!(seq.track_count(), 2);
    assert_eq!(seq.track(1).channel(), 15);
    let first = (HEADER_SIZE + 2 * TRACK_ENTRY_SIZE) as u32;
    assert_eq!(seq.track(0).start_offset(), first);
    assert_eq!(seq.track(1).start_offset(), first + 1);
}

#[test]
fn test_zero_ppqn_and_tempo_keep_defaults() {
    let mut builder = RefSeqBuilder::new();
    builder.set_ppqn(0).set_tempo(0);
    builder.add_track(0).end();
    let seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();

    assert_eq!(seq.header().ppqn, 48);
    assert_eq!(seq.header().initial_tempo_bpm, 120.0);
}

#[test]
fn test_opcodes_decode_to_events() {
    let mut builder = RefSeqBuilder::new();
    builder
        .add_track(0)
        .volume(80)
        .pan_slide(6, 0)
        .expression(90)
        .program(5)
        .transpose(-2)
        .global_transpose(3)
        .drum_note(Some(38))
        .drum_note(None)
        .tempo(140)
        .time_signature(6, 8)
        .marker("A")
        .note_on(60, 64)
        .rest(3)
        .note_off(60)
        .end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.run_pass(Pass::AddToUi, 0);

    let base = (HEADER_SIZE + TRACK_ENTRY_SIZE) as u32;
    let kinds: Vec<(u32, u32, EventKind)> = ui_kinds(&seq, 0)
        .into_iter()
        .map(|(offset, length, kind)| (offset - base, length, kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (0, 2, EventKind::Volume(80)),
            (2, 4, EventKind::PanSlide { target: 0, duration: 6 }),
            (6, 2, EventKind::Expression(90)),
            (8, 2, EventKind::ProgramChange(5)),
            (
                10,
                2,
                EventKind::Transpose {
                    scope: TransposeScope::Track,
                    semitones: -2
                }
            ),
            (
                12,
                2,
                EventKind::Transpose {
                    scope: TransposeScope::Global,
                    semitones: 3
                }
            ),
            (14, 2, EventKind::DrumNote(Some(38))),
            (16, 2, EventKind::DrumNote(None)),
            (18, 3, EventKind::Tempo { bpm: 140.0 }),
            (
                21,
                3,
                EventKind::TimeSignature {
                    numerator: 6,
                    denominator: 8,
                    ticks_per_quarter: 48
                }
            ),
            (24, 3, EventKind::Marker("A".into())),
            (27, 3, EventKind::NoteOn { key: 60, velocity: 64 }),
            (30, 3, EventKind::Rest { ticks: 3 }),
            (33, 2, EventKind::NoteOff { key: 60 }),
            (35, 1, EventKind::TrackEnd),
        ]
    );
}

#[test]
fn test_event_text() {
    let mut builder = RefSeqBuilder::new();
    builder
        .add_track(0)
        .note(61, 100, 12)
        .pan(40)
        .loop_start(0)
        .loop_end()
        .end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.run_pass(Pass::AddToUi, 0);

    let text: Vec<String> = seq.ui_events(0).iter().map(|e| e.to_string()).collect();
    assert_eq!(text[0], "Note: C#4 (61), velocity 100, duration 12");
    assert_eq!(text[1], "Pan: L24 (40)");
    assert_eq!(text[2], "Loop Start: forever");
    assert_eq!(text[3], "Loop End");
}

#[test]
fn test_label_in_another_track_is_callable() {
    let mut builder = RefSeqBuilder::new();
    builder.add_track(0).call_to("shared").rest(2).end();
    builder
        .add_track(1)
        .rest(1)
        .end()
        .label("shared")
        .note(70, 100, 4)
        .rest(4)
        .ret();
    let (bytes, labels) = builder.build_with_labels();
    let mut seq = Sequence::new(bytes, RefSeqFormat).unwrap();
    seq.load();

    assert_eq!(seq.track(0).total_ticks(), 6);
    assert_eq!(seq.track(1).total_ticks(), 1);
    // the shared body is recorded as part of the calling track
    let shared = labels["shared"];
    assert!(seq.ui_events(0).iter().any(|e| e.offset == shared));
    assert!(!seq.ui_events(1).iter().any(|e| e.offset == shared));
}

#[test]
fn test_cut_records_no_event() {
    let mut builder = RefSeqBuilder::new();
    builder.add_track(0).note(60, 100, 10).cut().rest(10).end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.run_pass(Pass::AddToUi, 0);

    let names: Vec<&str> = seq.ui_events(0).iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["Note", "Rest", "Track End"]);
}

#[test]
fn test_unknown_opcode_is_listed() {
    let mut builder = RefSeqBuilder::new();
    builder.add_track(0).rest(1).raw(&[0x7F, 0x00]);
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.run_pass(Pass::AddToUi, 0);

    let last = seq.ui_events(0).last().map(|e| e.to_string());
    assert_eq!(last.as_deref(), Some("Unknown: opcode 0x7F"));
    assert!(!seq.track(0).is_active());
}
