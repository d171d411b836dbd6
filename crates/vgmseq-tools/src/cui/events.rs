use anyhow::{Result, bail};

use vgmseq::Sequence;

use super::pad_to_width;

/// Print the UI event list, one block per track.
pub fn print_events(seq: &Sequence, track: Option<usize>) -> Result<()> {
    let tracks: Vec<usize> = match track {
        Some(t) if t >= seq.track_count() => {
            bail!("track {t} out of range ({} tracks)", seq.track_count())
        }
        Some(t) => vec![t],
        None => (0..seq.track_count()).collect(),
    };

    for index in tracks {
        let state = seq.track(index);
        println!(
            "Track {index} (channel {}, start 0x{:04X})",
            state.channel(),
            state.start_offset()
        );
        println!("{:<8} {:<6} {} Description", "Offset", "Length", pad_to_width("Event", 20));
        println!("{}", "-".repeat(72));
        for event in seq.ui_events(index) {
            println!(
                "0x{:06X} {:<6} {} {}",
                event.offset,
                event.length,
                pad_to_width(event.name(), 20),
                event.description()
            );
        }
        println!();
    }
    Ok(())
}
