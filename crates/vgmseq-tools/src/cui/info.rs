use std::path::Path;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};

use vgmseq::Sequence;

/// Print the header and a per-track summary after all three passes.
pub fn print_info(path: &Path, seq: &Sequence) {
    let summary = seq.summary();

    let mut header = Table::new();
    header.load_preset(NOTHING);
    header.set_content_arrangement(ContentArrangement::Dynamic);
    let name = if summary.name.is_empty() {
        "(none)".to_string()
    } else {
        summary.name.clone()
    };
    let rows = [
        ("File", path.display().to_string()),
        ("Format", summary.format.clone()),
        ("Name", name),
        ("PPQN", summary.ppqn.to_string()),
        ("Tempo", format!("{:.2} BPM", summary.initial_tempo_bpm)),
        (
            "Scheduling",
            if summary.tick_sync {
                "tick-synchronized".to_string()
            } else {
                "sequential".to_string()
            },
        ),
        ("Loops", seq.options().loop_count.to_string()),
        ("Length", format!("{} ticks", summary.delta_length)),
        ("Events", summary.event_count.to_string()),
    ];
    for (key, value) in rows {
        header.add_row(vec![Cell::new(key), Cell::new(value)]);
    }
    println!("{header}");
    println!();

    let mut tracks = Table::new();
    tracks.load_preset(NOTHING);
    tracks.set_content_arrangement(ContentArrangement::Dynamic);
    tracks.set_header(vec![
        Cell::new("Track"),
        Cell::new("Ch"),
        Cell::new("Start"),
        Cell::new("Events"),
        Cell::new("Ticks"),
        Cell::new("Loops"),
        Cell::new("MIDI"),
    ]);
    for t in &summary.tracks {
        tracks.add_row(vec![
            Cell::new(t.index).set_alignment(CellAlignment::Right),
            Cell::new(t.channel).set_alignment(CellAlignment::Right),
            Cell::new(format!("0x{:04X}", t.start_offset)),
            Cell::new(t.event_count).set_alignment(CellAlignment::Right),
            Cell::new(t.total_ticks).set_alignment(CellAlignment::Right),
            Cell::new(t.infinite_loops).set_alignment(CellAlignment::Right),
            Cell::new(t.midi_events).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{tracks}");
}
