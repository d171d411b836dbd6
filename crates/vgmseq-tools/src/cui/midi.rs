//! Standard MIDI File export.
//!
//! The conductor track goes first, followed by one track per sequence
//! track. Master volume becomes a universal SysEx message.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, PitchBend, Smf, Timing, TrackEvent, TrackEventKind};
use tracing::{debug, info};

use vgmseq::Sequence;
use vgmseq::midi::{MidiMessage, MidiTrack};

/// Universal realtime SysEx body for device master volume, minus the
/// leading 0xF0.
fn master_volume_sysex(volume: u16) -> [u8; 7] {
    [
        0x7F,
        0x7F,
        0x04,
        0x01,
        (volume & 0x7F) as u8,
        ((volume >> 7) & 0x7F) as u8,
        0xF7,
    ]
}

/// Bytes borrowed by a track's events.
struct TrackPayload {
    name: Vec<u8>,
    sysex: Vec<[u8; 7]>,
    markers: Vec<Vec<u8>>,
}

impl TrackPayload {
    fn new(name: String, track: &MidiTrack) -> Self {
        let mut sysex = Vec::new();
        let mut markers = Vec::new();
        for event in track.events() {
            match &event.message {
                MidiMessage::MasterVolume(v) => sysex.push(master_volume_sysex(*v)),
                MidiMessage::Marker(text) => markers.push(text.as_bytes().to_vec()),
                _ => {}
            }
        }
        Self {
            name: name.into_bytes(),
            sysex,
            markers,
        }
    }
}

fn convert_track<'a>(track: &'a MidiTrack, payload: &'a TrackPayload) -> Vec<TrackEvent<'a>> {
    let mut out = Vec::with_capacity(track.len() + 1);
    out.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(&payload.name)),
    });

    let mut sysex = payload.sysex.iter();
    let mut markers = payload.markers.iter();
    let mut last_tick = 0u32;
    let mut ended = false;
    for event in track.events() {
        let channel = u4::from_int_lossy(event.channel);
        let midi = |message| TrackEventKind::Midi { channel, message };
        let kind = match &event.message {
            MidiMessage::NoteOn { key, velocity } => midi(midly::MidiMessage::NoteOn {
                key: u7::from_int_lossy(*key),
                vel: u7::from_int_lossy(*velocity),
            }),
            MidiMessage::NoteOff { key } => midi(midly::MidiMessage::NoteOff {
                key: u7::from_int_lossy(*key),
                vel: u7::from_int_lossy(0),
            }),
            MidiMessage::ControlChange { controller, value } => {
                midi(midly::MidiMessage::Controller {
                    controller: u7::from_int_lossy(*controller),
                    value: u7::from_int_lossy(*value),
                })
            }
            MidiMessage::ProgramChange(program) => midi(midly::MidiMessage::ProgramChange {
                program: u7::from_int_lossy(*program),
            }),
            MidiMessage::PitchBend(bend) => midi(midly::MidiMessage::PitchBend {
                bend: PitchBend::from_int(*bend),
            }),
            MidiMessage::MasterVolume(_) => {
                let Some(data) = sysex.next() else { continue };
                TrackEventKind::SysEx(data)
            }
            MidiMessage::Tempo(us) => {
                TrackEventKind::Meta(MetaMessage::Tempo(u24::from_int_lossy(*us)))
            }
            MidiMessage::TimeSignature {
                numerator,
                denominator_pow2,
                clocks_per_click,
                thirty_seconds_per_quarter,
            } => TrackEventKind::Meta(MetaMessage::TimeSignature(
                *numerator,
                *denominator_pow2,
                *clocks_per_click,
                *thirty_seconds_per_quarter,
            )),
            MidiMessage::Marker(_) => {
                let Some(text) = markers.next() else { continue };
                TrackEventKind::Meta(MetaMessage::Marker(text))
            }
            MidiMessage::EndOfTrack => {
                ended = true;
                TrackEventKind::Meta(MetaMessage::EndOfTrack)
            }
        };
        let delta = event.tick.saturating_sub(last_tick);
        last_tick = last_tick.max(event.tick);
        out.push(TrackEvent {
            delta: u28::from_int_lossy(delta),
            kind,
        });
    }
    if !ended {
        out.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
    }
    out
}

/// Write the ConvertToMidi output as a format 1 SMF. `-` writes to stdout.
pub fn write_midi(seq: &Sequence, output: &Path) -> Result<()> {
    let Some(midi) = seq.midi() else {
        bail!("no MIDI output, the conversion pass has not run");
    };

    let mut payloads = Vec::with_capacity(midi.tracks.len() + 1);
    let conductor_name = if seq.header().name.is_empty() {
        "Conductor".to_string()
    } else {
        seq.header().name.clone()
    };
    payloads.push(TrackPayload::new(conductor_name, &midi.conductor));
    for (i, track) in midi.tracks.iter().enumerate() {
        payloads.push(TrackPayload::new(format!("Track {i}"), track));
    }

    let mut tracks = Vec::with_capacity(payloads.len());
    tracks.push(convert_track(&midi.conductor, &payloads[0]));
    for (track, payload) in midi.tracks.iter().zip(&payloads[1..]) {
        tracks.push(convert_track(track, payload));
    }

    let smf = Smf {
        header: Header::new(
            Format::Parallel,
            Timing::Metrical(u15::from_int_lossy(midi.ppqn)),
        ),
        tracks,
    };
    debug!(
        tracks = smf.tracks.len(),
        ppqn = midi.ppqn,
        "built standard MIDI file"
    );

    if output.as_os_str() == "-" {
        let stdout = std::io::stdout();
        let mut writer = BufWriter::new(stdout.lock());
        smf.write_std(&mut writer)
            .context("failed to write MIDI to stdout")?;
        writer.flush().context("failed to flush stdout")?;
    } else {
        let file = File::create(output)
            .with_context(|| format!("failed to create file: {}", output.display()))?;
        let mut writer = BufWriter::new(file);
        smf.write_std(&mut writer)
            .with_context(|| format!("failed to write MIDI: {}", output.display()))?;
        writer
            .flush()
            .with_context(|| format!("failed to write MIDI: {}", output.display()))?;
        info!(
            path = %output.display(),
            events = midi.event_count(),
            "wrote MIDI file"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_volume_sysex_splits_14_bits() {
        assert_eq!(
            master_volume_sysex(0x3FFF),
            [0x7F, 0x7F, 0x04, 0x01, 0x7F, 0x7F, 0xF7]
        );
        assert_eq!(
            master_volume_sysex(0x2001),
            [0x7F, 0x7F, 0x04, 0x01, 0x01, 0x40, 0xF7]
        );
    }

    #[test]
    fn test_convert_adds_name_and_end_of_track() {
        let mut track = MidiTrack::new();
        track.push(0, 2, MidiMessage::NoteOn { key: 60, velocity: 100 });
        track.push(12, 2, MidiMessage::NoteOff { key: 60 });
        track.finalize();
        let payload = TrackPayload::new("Track 0".to_string(), &track);
        let events = convert_track(&track, &payload);

        assert!(matches!(
            events[0].kind,
            TrackEventKind::Meta(MetaMessage::TrackName(b"Track 0"))
        ));
        let deltas: Vec<u32> = events.iter().map(|e| e.delta.as_int()).collect();
        assert_eq!(deltas, vec![0, 0, 12, 0]);
        assert!(matches!(
            events.last().map(|e| e.kind),
            Some(TrackEventKind::Meta(MetaMessage::EndOfTrack))
        ));
    }
}
