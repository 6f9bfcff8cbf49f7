// Standard MIDI File export of a generation result
//
// SMF format 1: a tempo track, then one track per voice. Beats become ticks
// here and nowhere else. Logical channels above 15 go to the second port,
// announced with a MIDI port meta event.

use midly::{
    num::{u15, u24, u28, u4, u7},
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
};
use std::path::Path;

use crate::store::GenerationResult;

fn beats_to_ticks(beats: f64, ticks_per_beat: u16) -> u32 {
    (beats * ticks_per_beat as f64).round().max(0.0) as u32
}

/// Build an in-memory SMF from `result`
pub fn result_to_smf(result: &GenerationResult, ticks_per_beat: u16, tempo_bpm: f64) -> Smf<'_> {
    let ticks_per_beat = ticks_per_beat.clamp(1, 0x7fff);
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(ticks_per_beat)),
    ));

    let tempo_us = (60_000_000.0 / tempo_bpm.max(1.0)).round() as u32;
    smf.tracks.push(vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_us.min(0xff_ffff)))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]);

    for (voice, phrase) in &result.phrases {
        let channel = u4::new(phrase.channel() % 16);
        let mut track: Track<'_> = vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::TrackName(voice.as_str().as_bytes())),
            },
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::MidiPort(u7::new(phrase.channel() / 16))),
            },
        ];

        // (tick, note-offs first, message)
        let mut events: Vec<(u32, u8, MidiMessage)> = Vec::with_capacity(phrase.len() * 2);
        for note in phrase {
            let key = u7::new(note.pitch());
            let on = beats_to_ticks(note.start(), ticks_per_beat);
            let off = beats_to_ticks(note.end(), ticks_per_beat).max(on + 1);
            events.push((on, 1, MidiMessage::NoteOn { key, vel: u7::new(note.velocity()) }));
            events.push((off, 0, MidiMessage::NoteOff { key, vel: u7::new(0) }));
        }
        events.sort_by_key(|(tick, order, _)| (*tick, *order));

        let mut last_tick = 0;
        for (tick, _, message) in events {
            track.push(TrackEvent {
                delta: u28::new(tick - last_tick),
                kind: TrackEventKind::Midi { channel, message },
            });
            last_tick = tick;
        }
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
    }

    smf
}

/// Encode `result` as SMF bytes
pub fn encode(result: &GenerationResult, ticks_per_beat: u16, tempo_bpm: f64) -> anyhow::Result<Vec<u8>> {
    let smf = result_to_smf(result, ticks_per_beat, tempo_bpm);
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    Ok(buf)
}

/// Write `result` to a `.mid` file
pub fn write_midi(result: &GenerationResult, path: &Path, ticks_per_beat: u16, tempo_bpm: f64) -> anyhow::Result<()> {
    let buf = encode(result, ticks_per_beat, tempo_bpm)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &buf)?;
    log::info!("Wrote {} ({} bytes)", path.display(), buf.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompositionId, VoiceId};
    use crate::phrase::{NoteEvent, Phrase};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn result() -> GenerationResult {
        let mut phrases = BTreeMap::new();
        phrases.insert(
            VoiceId::new("Bass"),
            Phrase::from_notes(1, [
                NoteEvent::new(1, 36, 100, 0.0, 1.0),
                NoteEvent::new(1, 38, 90, 1.0, 0.5),
            ]),
        );
        phrases.insert(
            VoiceId::new("Drums"),
            Phrase::from_notes(16, [NoteEvent::new(16, 36, 110, 0.5, 0.25)]),
        );
        GenerationResult {
            composition_id: CompositionId::new(),
            snapshot_version: 1,
            phrases,
            errors: BTreeMap::new(),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_tracks_and_timing() {
        let bytes = encode(&result(), 480, 120.0).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 3);
        assert!(matches!(smf.tracks[0][0].kind, TrackEventKind::Meta(MetaMessage::Tempo(t)) if t.as_int() == 500_000));

        // Bass: on@0, off@480, on@480, off@720
        let bass: Vec<(u32, bool)> = smf.tracks[1]
            .iter()
            .scan(0u32, |tick, e| {
                *tick += e.delta.as_int();
                Some((*tick, e.kind))
            })
            .filter_map(|(tick, kind)| match kind {
                TrackEventKind::Midi { message: MidiMessage::NoteOn { .. }, .. } => Some((tick, true)),
                TrackEventKind::Midi { message: MidiMessage::NoteOff { .. }, .. } => Some((tick, false)),
                _ => None,
            })
            .collect();
        assert_eq!(bass, vec![(0, true), (480, false), (480, true), (720, false)]);
    }

    #[test]
    fn test_second_port_channels() {
        let bytes = encode(&result(), 96, 90.0).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        let drums = &smf.tracks[2];
        assert!(drums
            .iter()
            .any(|e| matches!(e.kind, TrackEventKind::Meta(MetaMessage::MidiPort(p)) if p.as_int() == 1)));
        assert!(drums.iter().all(|e| match e.kind {
            TrackEventKind::Midi { channel, .. } => channel.as_int() == 0,
            _ => true,
        }));
    }

    #[test]
    fn test_write_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("song.mid");
        write_midi(&result(), &path, 480, 120.0).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
