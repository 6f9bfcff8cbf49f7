// The individual post-processing passes, in pipeline order

use super::VoiceContext;
use crate::model::{FillAtEnd, VoiceKind};
use crate::phrase::{NoteEvent, Phrase};

fn scale_velocity(note: &NoteEvent, factor: f32) -> NoteEvent {
    let velocity = (note.velocity() as f32 * factor).round().clamp(1.0, 127.0) as u8;
    note.with_velocity(velocity)
}

/// Replace each segment's range with the segment's custom phrase for this voice
pub fn substitute_custom_phrases(mut phrase: Phrase, ctx: &VoiceContext<'_>) -> Phrase {
    for segment in ctx.timeline.segments() {
        let Some(custom) = segment.params.custom_phrases.get(ctx.voice) else {
            continue;
        };
        let range = ctx.timeline.segment_beats(segment);
        phrase.remove_range(range);
        for note in custom {
            let placed = note.shifted(range.from);
            if range.contains(placed.start()) {
                phrase.add(placed);
            }
        }
    }
    phrase
}

/// Mix mute empties the phrase; segment mutes empty the segment's range
pub fn apply_mutes(mut phrase: Phrase, ctx: &VoiceContext<'_>) -> Phrase {
    if ctx.binding.muted {
        phrase.retain(|_| false);
        return phrase;
    }
    for segment in ctx.timeline.segments() {
        if segment.params.is_muted(ctx.voice) {
            phrase.remove_range(ctx.timeline.segment_beats(segment));
        }
    }
    phrase
}

/// Scale drum velocities by the segment's drums mix. A zero multiplier
/// silences the group.
pub fn apply_drums_mix(mut phrase: Phrase, ctx: &VoiceContext<'_>) -> Phrase {
    if ctx.binding.kind != VoiceKind::Drums {
        return phrase;
    }
    let multiplier = |note: &NoteEvent| {
        ctx.timeline
            .segment_at_beat(note.start())
            .map(|s| s.params.drums_mix.multiplier_for_pitch(note.pitch()))
            .unwrap_or(1.0)
    };
    phrase.retain(|n| multiplier(n) > 0.0);
    phrase.map_notes(|n| scale_velocity(n, multiplier(n)))
}

/// Linear velocity taper over segments ending with a fade out
pub fn apply_fade_out(phrase: Phrase, ctx: &VoiceContext<'_>) -> Phrase {
    let floor = ctx.fade_out_floor.clamp(0.0, 1.0);
    phrase.map_notes(|n| {
        let Some(segment) = ctx.timeline.segment_at_beat(n.start()) else {
            return *n;
        };
        if segment.params.fill_at_end != FillAtEnd::FadeOut {
            return *n;
        }
        let range = ctx.timeline.segment_beats(segment);
        let progress = ((n.start() - range.from) / range.len()) as f32;
        scale_velocity(n, 1.0 - (1.0 - floor) * progress)
    })
}

pub fn apply_velocity_shift(phrase: Phrase, ctx: &VoiceContext<'_>) -> Phrase {
    let shift = ctx.binding.velocity_shift as i16;
    if shift == 0 {
        return phrase;
    }
    phrase.map_notes(|n| n.with_velocity((n.velocity() as i16 + shift).clamp(1, 127) as u8))
}

/// Transpose pitched voices, folding out-of-range pitches back by octaves
pub fn apply_transpose(phrase: Phrase, ctx: &VoiceContext<'_>) -> Phrase {
    let transpose = ctx.binding.transpose as i16;
    if transpose == 0 || ctx.binding.kind == VoiceKind::Drums {
        return phrase;
    }
    phrase.map_notes(|n| {
        let mut pitch = n.pitch() as i16 + transpose;
        while pitch > 127 {
            pitch -= 12;
        }
        while pitch < 0 {
            pitch += 12;
        }
        n.with_pitch(pitch as u8)
    })
}

pub fn reroute_drums(phrase: Phrase, ctx: &VoiceContext<'_>) -> Phrase {
    match ctx.binding.drums_reroute {
        Some(target) if ctx.binding.kind == VoiceKind::Drums => phrase.with_channel(target),
        _ => phrase,
    }
}

/// Silence pitched voices under "no chord": notes starting in an NC range are
/// removed, notes ringing into one are cut at its start
pub fn suppress_no_chord(mut phrase: Phrase, ctx: &VoiceContext<'_>) -> Phrase {
    if ctx.binding.kind.is_percussive() || ctx.no_chord.is_empty() {
        return phrase;
    }
    phrase.retain(|n| !ctx.no_chord.iter().any(|r| r.contains(n.start())));
    phrase.map_notes(|n| {
        ctx.no_chord
            .iter()
            .find(|r| r.from > n.start() && r.from < n.end())
            .map(|r| n.with_duration(r.from - n.start()))
            .unwrap_or(*n)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{gm, DrumGroup, DrumsMix, Timeline, VoiceBinding, VoiceId};
    use crate::phrase::BeatRange;

    fn timeline() -> Timeline {
        let mut t = Timeline::new();
        t.add_segment("A", 2, "pop".into(), 4).unwrap();
        t.add_segment("B", 2, "pop".into(), 4).unwrap();
        t
    }

    fn ctx<'a>(
        voice: &'a VoiceId,
        binding: &'a VoiceBinding,
        timeline: &'a Timeline,
        no_chord: &'a [BeatRange],
    ) -> VoiceContext<'a> {
        VoiceContext {
            voice,
            binding,
            timeline,
            no_chord,
            fade_out_floor: 0.5,
        }
    }

    fn quarters(channel: u8, pitch: u8, count: usize) -> Phrase {
        Phrase::from_notes(channel, (0..count).map(|i| NoteEvent::new(channel, pitch, 100, i as f64, 1.0)))
    }

    #[test]
    fn test_custom_phrase_replaces_segment() {
        let mut t = timeline();
        let b = t.segments()[1].id();
        let voice = VoiceId::new("Bass");
        let custom = Phrase::from_notes(0, [
            NoteEvent::new(0, 50, 90, 0.0, 1.0),
            NoteEvent::new(0, 52, 90, 9.0, 1.0),
        ]);
        t.segment_mut(b).unwrap().params.custom_phrases.insert(voice.clone(), custom);

        let binding = VoiceBinding::new(2, VoiceKind::Bass);
        let out = substitute_custom_phrases(quarters(2, 40, 16), &ctx(&voice, &binding, &t, &[]));
        let tail: Vec<_> = out.iter().filter(|n| n.start() >= 8.0).collect();
        assert_eq!(tail.len(), 1);
        assert_eq!((tail[0].pitch(), tail[0].start(), tail[0].channel()), (50, 8.0, 2));
        assert_eq!(out.iter().filter(|n| n.start() < 8.0).count(), 8);
    }

    #[test]
    fn test_drums_mix_scales_and_silences() {
        let mut t = timeline();
        let a = t.segments()[0].id();
        t.segment_mut(a).unwrap().params.drums_mix =
            DrumsMix::new().with(DrumGroup::Snare, 0.5).with(DrumGroup::HiHat, 0.0);

        let voice = VoiceId::new("Drums");
        let binding = VoiceBinding::new(9, VoiceKind::Drums);
        let drums = Phrase::from_notes(9, [
            NoteEvent::new(9, gm::SNARE, 100, 1.0, 0.25),
            NoteEvent::new(9, gm::CLOSED_HIHAT, 100, 1.5, 0.25),
            NoteEvent::new(9, gm::SNARE, 100, 9.0, 0.25),
        ]);
        let out = apply_drums_mix(drums, &ctx(&voice, &binding, &t, &[]));
        let velocities: Vec<u8> = out.iter().map(|n| n.velocity()).collect();
        assert_eq!(velocities, vec![50, 100]);
    }

    #[test]
    fn test_fade_out_is_linear_to_floor() {
        let mut t = timeline();
        let a = t.segments()[0].id();
        t.segment_mut(a).unwrap().params.fill_at_end = FillAtEnd::FadeOut;

        let voice = VoiceId::new("Bass");
        let binding = VoiceBinding::new(1, VoiceKind::Bass);
        let out = apply_fade_out(quarters(1, 40, 10), &ctx(&voice, &binding, &t, &[]));
        let v: Vec<u8> = out.iter().map(|n| n.velocity()).collect();
        assert_eq!(v[0], 100);
        assert_eq!(v[4], 75);
        assert_eq!(v[8], 100);
        assert!(v.windows(2).take(7).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_velocity_shift_clamps() {
        let t = timeline();
        let voice = VoiceId::new("Bass");
        let binding = VoiceBinding::new(1, VoiceKind::Bass).with_velocity_shift(100);
        let out = apply_velocity_shift(quarters(1, 40, 2), &ctx(&voice, &binding, &t, &[]));
        assert!(out.iter().all(|n| n.velocity() == 127));

        let binding = VoiceBinding::new(1, VoiceKind::Bass).with_velocity_shift(-120);
        let out = apply_velocity_shift(quarters(1, 40, 2), &ctx(&voice, &binding, &t, &[]));
        assert!(out.iter().all(|n| n.velocity() == 1));
    }

    #[test]
    fn test_transpose_folds_by_octave_and_skips_drums() {
        let t = timeline();
        let voice = VoiceId::new("Lead");
        let binding = VoiceBinding::new(1, VoiceKind::Melody).with_transpose(12);
        let out = apply_transpose(quarters(1, 120, 1), &ctx(&voice, &binding, &t, &[]));
        assert_eq!(out.notes()[0].pitch(), 120);

        let binding = VoiceBinding::new(1, VoiceKind::Melody).with_transpose(-7);
        let out = apply_transpose(quarters(1, 3, 1), &ctx(&voice, &binding, &t, &[]));
        assert_eq!(out.notes()[0].pitch(), 8);

        let binding = VoiceBinding::new(9, VoiceKind::Drums).with_transpose(5);
        let out = apply_transpose(quarters(9, 36, 1), &ctx(&voice, &binding, &t, &[]));
        assert_eq!(out.notes()[0].pitch(), 36);
    }

    #[test]
    fn test_no_chord_removes_and_cuts() {
        let t = timeline();
        let voice = VoiceId::new("Piano");
        let binding = VoiceBinding::new(2, VoiceKind::Chords);
        let nc = [BeatRange::new(4.0, 8.0)];
        let phrase = Phrase::from_notes(2, [
            NoteEvent::new(2, 60, 90, 2.0, 4.0),
            NoteEvent::new(2, 64, 90, 5.0, 1.0),
            NoteEvent::new(2, 67, 90, 8.0, 1.0),
        ]);
        let out = suppress_no_chord(phrase.clone(), &ctx(&voice, &binding, &t, &nc));
        assert_eq!(out.len(), 2);
        assert_eq!(out.notes()[0].end(), 4.0);
        assert_eq!(out.notes()[1].start(), 8.0);

        let drums = VoiceBinding::new(9, VoiceKind::Drums);
        let out = suppress_no_chord(phrase.clone(), &ctx(&voice, &drums, &t, &nc));
        assert_eq!(out, phrase);
    }
}
