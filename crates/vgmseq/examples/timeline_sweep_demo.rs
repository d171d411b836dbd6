//! Example walking a converted sequence tick by tick
//!
//! Builds a two-track RefSeq file in memory, runs all three passes, and
//! sweeps a timeline cursor over the result, printing each note as it
//! starts sounding.

use vgmseq::format::{RefSeqBuilder, RefSeqFormat};
use vgmseq::Sequence;

fn main() {
    println!("Timeline Sweep Demo\n");

    let mut builder = RefSeqBuilder::new();
    builder.set_ppqn(48).set_tempo(140);
    builder
        .add_track(0)
        .program(33)
        .label("bass")
        .note(36, 110, 24)
        .rest(24)
        .note(43, 100, 24)
        .rest(24)
        .jump_to("bass");
    builder
        .add_track(1)
        .marker("melody")
        .global_transpose(2)
        .note(60, 100, 12)
        .rest(12)
        .note(64, 100, 12)
        .rest(12)
        .note(67, 100, 24)
        .rest(24)
        .end();

    let mut seq = match Sequence::new(builder.build(), RefSeqFormat) {
        Ok(seq) => seq,
        Err(e) => {
            eprintln!("failed to open sequence: {e}");
            return;
        }
    };
    seq.set_loop_count(1);
    seq.load();

    println!(
        "{} ppqn, {} ticks measured, {} events decoded\n",
        seq.header().ppqn,
        seq.delta_length(),
        seq.events().len()
    );

    let timeline = seq.timeline();
    let mut cursor = timeline.cursor();
    let mut sounding: Vec<usize> = Vec::new();
    for tick in 0..seq.delta_length() {
        let active = cursor.seek(tick);
        for &index in active.iter().filter(|i| !sounding.contains(i)) {
            let timed = timeline.get(index);
            let event = &seq.events()[timed.event];
            if let Some(label) = seq.note_label(index) {
                println!(
                    "  tick {:>4}  track {}  {:<4} for {} ticks",
                    tick, event.track, label, timed.duration
                );
            }
        }
        sounding = active;
    }

    if let Some(midi) = seq.midi() {
        println!("\n{} MIDI messages over {} tracks", midi.event_count(), midi.tracks.len() + 1);
    }
}
