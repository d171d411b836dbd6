use anyhow::{Result, bail};

use vgmseq::Sequence;

use super::pad_to_width;

/// Print the entries active at `tick`, or with `until` sweep one cursor
/// forward and print the active set every time it changes.
pub fn print_timeline(seq: &Sequence, tick: u32, until: Option<u32>) -> Result<()> {
    let timeline = seq.timeline();
    if !timeline.is_finalized() {
        bail!("timeline is not finalized");
    }
    let until = until.unwrap_or(tick);
    if until < tick {
        bail!("--until {until} is before --tick {tick}");
    }

    let mut cursor = timeline.cursor();
    let mut previous: Option<Vec<usize>> = None;
    for t in tick..=until {
        let active = cursor.seek(t);
        if previous.as_ref() == Some(&active) {
            continue;
        }
        println!("Tick {t}: {} active", active.len());
        for &index in &active {
            print_entry(seq, index);
        }
        previous = Some(active);
    }
    Ok(())
}

fn print_entry(seq: &Sequence, index: usize) {
    let timed = seq.timeline().get(index);
    let event = seq.events().get(timed.event);
    let label = seq
        .note_label(index)
        .unwrap_or_else(|| event.description());
    println!(
        "  trk {:<2} {:>6}+{:<6} {} {}",
        event.track,
        timed.start,
        timed.duration,
        pad_to_width(event.name(), 16),
        label
    );
}
