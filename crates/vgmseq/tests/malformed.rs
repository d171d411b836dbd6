use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vgmseq::binutil::ParseError;
use vgmseq::format::refseq::op;
use vgmseq::format::{RefSeqBuilder, RefSeqFormat};
use vgmseq::{Pass, SeqError, SeqOptions, Sequence};

#[test]
fn test_truncated_operand_ends_track() {
    let mut builder = RefSeqBuilder::new();
    // a rest missing its second operand byte
    builder.add_track(0).rest(6).raw(&[op::REST, 0x10]);
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.load();

    assert_eq!(seq.track(0).total_ticks(), 6);
    assert_eq!(seq.ui_events(0).len(), 1);
    assert!(seq.midi().is_some());
}

#[test]
fn test_running_off_the_end_ends_track() {
    let mut builder = RefSeqBuilder::new();
    builder.add_track(0).note(60, 100, 4).rest(4);
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.load();

    assert_eq!(seq.track(0).total_ticks(), 4);
}

#[test]
fn test_jump_out_of_range_ends_track() {
    let mut builder = RefSeqBuilder::new();
    builder.add_track(0).rest(2).jump(0xFFF0);
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.load();

    assert_eq!(seq.track(0).total_ticks(), 2);
    assert_eq!(seq.ui_events(0).len(), 2);
}

#[test]
fn test_unknown_opcode_keeps_other_tracks() {
    let mut builder = RefSeqBuilder::new();
    builder.add_track(0).raw(&[0xAB]);
    builder.add_track(1).note(60, 100, 8).rest(8).end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.load();

    assert_eq!(seq.track(0).total_ticks(), 0);
    assert_eq!(seq.track(1).total_ticks(), 8);
    assert_eq!(seq.delta_length(), 8);
}

#[test]
fn test_marker_past_end() {
    let mut builder = RefSeqBuilder::new();
    builder.add_track(0).rest(1).raw(&[op::MARKER, 200, b'x']);
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.run_pass(Pass::AddToUi, 0);

    assert_eq!(seq.track(0).total_ticks(), 1);
}

#[test]
fn test_step_budget_ends_runaway_track() {
    let mut builder = RefSeqBuilder::new();
    // a long straight run of zero-time instructions
    let track = builder.add_track(0);
    for _ in 0..50 {
        track.volume(10);
    }
    track.end();
    let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
    seq.set_options(SeqOptions {
        max_steps_per_track: 20,
        ..SeqOptions::default()
    });
    seq.run_pass(Pass::AddToUi, 0);

    assert_eq!(seq.track(0).steps(), 20);
    assert_eq!(seq.ui_events(0).len(), 20);
}

#[test]
fn test_bad_headers() {
    assert!(matches!(
        Sequence::new(b"RSEQ".to_vec(), RefSeqFormat),
        Err(SeqError::Parse(ParseError::HeaderTooShort(_)))
    ));

    let mut bytes = {
        let mut builder = RefSeqBuilder::new();
        builder.add_track(0).end();
        builder.build()
    };
    bytes[0] = b'M';
    assert_eq!(
        Sequence::new(bytes, RefSeqFormat).unwrap_err(),
        SeqError::Parse(ParseError::InvalidIdent(*b"MSEQ"))
    );
}

#[test]
fn test_no_tracks() {
    let bytes = RefSeqBuilder::new().build();
    assert_eq!(
        Sequence::new(bytes, RefSeqFormat).unwrap_err(),
        SeqError::NoTracks
    );
}

#[test]
fn test_track_table_truncated() {
    let mut bytes = {
        let mut builder = RefSeqBuilder::new();
        builder.add_track(0).end();
        builder.build()
    };
    // claim three tracks with room for one
    bytes[0x0A] = 3;
    bytes.truncate(0x0B + 3 + 1);
    let err = Sequence::new(bytes, RefSeqFormat).unwrap_err();
    assert!(
        matches!(
            err,
            SeqError::Parse(ParseError::OffsetOutOfRange {
                context: Some(ref c),
                ..
            }) if c == "track_pointer"
        ),
        "{err}"
    );
}

#[test]
fn test_track_pointer_out_of_range() {
    let mut bytes = {
        let mut builder = RefSeqBuilder::new();
        builder.add_track(0).end();
        builder.build()
    };
    bytes[0x0C] = 0x00;
    bytes[0x0D] = 0x10;
    assert_eq!(
        Sequence::new(bytes.clone(), RefSeqFormat).unwrap_err(),
        SeqError::TrackPointerOutOfRange {
            track: 0,
            offset: 0x1000,
            len: bytes.len(),
        }
    );
}

#[test]
fn test_random_bodies_never_panic() {
    let mut rng = StdRng::seed_from_u64(0x5eed_00ff);
    for round in 0..100 {
        let mut builder = RefSeqBuilder::new();
        builder.set_tick_sync(round % 2 == 1);
        for channel in 0..rng.gen_range(1..4u8) {
            let body: Vec<u8> = (0..rng.gen_range(1..64)).map(|_| rng.r#gen()).collect();
            builder.add_track(channel).raw(&body);
        }
        let mut seq = Sequence::new(builder.build(), RefSeqFormat).unwrap();
        seq.set_options(SeqOptions {
            max_steps_per_track: 2_000,
            ..SeqOptions::default()
        });
        seq.load();

        let midi = seq.midi().unwrap();
        assert_eq!(midi.tracks.len(), seq.track_count());
        assert!(seq.tracks().iter().all(|t| !t.is_active()));
    }
}

#[test]
fn test_random_files_never_panic() {
    let mut rng = StdRng::seed_from_u64(0x5eed_0100);
    for _ in 0..500 {
        let mut bytes: Vec<u8> = (0..rng.gen_range(0..96)).map(|_| rng.r#gen()).collect();
        if bytes.len() >= 5 && rng.gen_bool(0.5) {
            bytes[..5].copy_from_slice(b"RSEQ\x01");
        }
        if let Ok(mut seq) = Sequence::new(bytes, RefSeqFormat) {
            seq.set_options(SeqOptions {
                max_steps_per_track: 2_000,
                ..SeqOptions::default()
            });
            seq.load();
        }
    }
}
