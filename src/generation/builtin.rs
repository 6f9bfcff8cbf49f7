// Built-in reference generator: drum groove, root bass and piano comping
//
// Reads the optional segment value "velocity" (1..=127) as the base velocity.

use super::{CancelToken, GeneratorOutput, PhraseGenerator, SegmentContext, VoiceSpec};
use crate::model::{gm, FillAtEnd, VoiceKind};
use crate::phrase::{NoteEvent, Phrase, GM_DRUMS_CHANNEL};

const BASS_OCTAVE: u8 = 36;
const PIANO_OCTAVE: u8 = 60;

pub struct BasicGenerator {
    name: &'static str,
    velocity: u8,
    /// Hi-hat spacing in beats
    hihat_step: f64,
    /// Piano comping spacing in beats
    comp_step: f64,
}

impl BasicGenerator {
    pub fn pop() -> Self {
        Self {
            name: "pop",
            velocity: 100,
            hihat_step: 0.5,
            comp_step: 2.0,
        }
    }

    pub fn ballad() -> Self {
        Self {
            name: "ballad",
            velocity: 80,
            hihat_step: 1.0,
            comp_step: 4.0,
        }
    }

    fn base_velocity(&self, ctx: &SegmentContext<'_>) -> u8 {
        ctx.segment
            .params
            .value("velocity")
            .and_then(|v| v.parse::<u8>().ok())
            .map(|v| v.clamp(1, 127))
            .unwrap_or(self.velocity)
    }

    fn drums(&self, ctx: &SegmentContext<'_>, channel: u8, cancel: &CancelToken) -> anyhow::Result<Phrase> {
        let mut phrase = Phrase::new(channel);
        let velocity = self.base_velocity(ctx);
        let bars = ctx.segment.bars();
        let bpb = ctx.segment.beats_per_bar() as f64;
        let fill = ctx.segment.params.fill_at_end == FillAtEnd::Fill;

        for bar in bars.from..=bars.to {
            if cancel.is_cancelled() {
                anyhow::bail!("generation cancelled");
            }
            let bar_start = ctx.beats.from + (bar - bars.from) as f64 * bpb;

            if fill && bar == bars.to {
                let mut pos = 0.0;
                while pos < bpb {
                    let tom = if (pos * 2.0) as u32 % 2 == 0 { gm::HIGH_TOM } else { gm::LOW_TOM };
                    phrase.add(NoteEvent::new(channel, tom, velocity, bar_start + pos, 0.25));
                    pos += 0.5;
                }
                continue;
            }

            for beat in 0..ctx.segment.beats_per_bar() {
                let pitch = if beat % 2 == 0 { gm::KICK } else { gm::SNARE };
                phrase.add(NoteEvent::new(channel, pitch, velocity, bar_start + beat as f64, 0.25));
            }
            let mut pos = 0.0;
            while pos < bpb {
                let accent = if pos.fract() == 0.0 { 0 } else { 20 };
                phrase.add(NoteEvent::new(
                    channel,
                    gm::CLOSED_HIHAT,
                    velocity.saturating_sub(accent),
                    bar_start + pos,
                    0.25,
                ));
                pos += self.hihat_step;
            }
        }
        Ok(phrase)
    }

    fn bass(&self, ctx: &SegmentContext<'_>, channel: u8) -> Phrase {
        let mut phrase = Phrase::new(channel);
        let velocity = self.base_velocity(ctx);
        for chord in &ctx.chords {
            let Some(root) = chord.symbol.root_pitch(BASS_OCTAVE) else {
                continue;
            };
            let mut pos = chord.range.from;
            while pos < chord.range.to {
                let len = (chord.range.to - pos).min(1.0);
                phrase.add(NoteEvent::new(channel, root, velocity, pos, len * 0.9));
                pos += 1.0;
            }
        }
        phrase
    }

    fn piano(&self, ctx: &SegmentContext<'_>, channel: u8) -> Phrase {
        let mut phrase = Phrase::new(channel);
        let velocity = self.base_velocity(ctx).saturating_sub(10).max(1);
        for chord in &ctx.chords {
            let pitches = chord.symbol.pitches(PIANO_OCTAVE);
            let mut pos = chord.range.from;
            while !pitches.is_empty() && pos < chord.range.to {
                let len = (chord.range.to - pos).min(self.comp_step);
                for pitch in &pitches {
                    phrase.add(NoteEvent::new(channel, *pitch, velocity, pos, len));
                }
                pos += self.comp_step;
            }
        }
        phrase
    }
}

impl PhraseGenerator for BasicGenerator {
    fn name(&self) -> &str {
        self.name
    }

    fn voices(&self) -> Vec<VoiceSpec> {
        vec![
            VoiceSpec::new("Drums", VoiceKind::Drums),
            VoiceSpec::new("Bass", VoiceKind::Bass),
            VoiceSpec::new("Piano", VoiceKind::Chords),
        ]
    }

    fn generate(&self, ctx: &SegmentContext<'_>, cancel: &CancelToken) -> anyhow::Result<GeneratorOutput> {
        let mut output = GeneratorOutput::default();
        for spec in self.voices() {
            let channel = ctx.channel_of(&spec.id).unwrap_or(match spec.kind {
                VoiceKind::Drums => GM_DRUMS_CHANNEL,
                _ => 0,
            });
            let phrase = match spec.kind {
                VoiceKind::Drums => self.drums(ctx, channel, cancel)?,
                VoiceKind::Bass => self.bass(ctx, channel),
                _ => self.piano(ctx, channel),
            };
            output.phrases.insert(spec.id, phrase);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChannelBinding, ChordSymbol, Timeline, VoiceBinding, VoiceId};

    fn context_parts() -> (Timeline, ChannelBinding) {
        let mut timeline = Timeline::new();
        timeline.add_segment("A", 2, "pop".into(), 4).unwrap();
        timeline.set_chord(0, 0.0, "C".parse().unwrap()).unwrap();
        timeline.set_chord(1, 0.0, ChordSymbol::NoChord).unwrap();

        let mut mix = ChannelBinding::new();
        mix.bind(VoiceId::new("Drums"), VoiceBinding::new(9, VoiceKind::Drums));
        mix.bind(VoiceId::new("Bass"), VoiceBinding::new(1, VoiceKind::Bass));
        mix.bind(VoiceId::new("Piano"), VoiceBinding::new(2, VoiceKind::Chords));
        (timeline, mix)
    }

    #[test]
    fn test_pitched_voices_follow_chords() {
        let (timeline, mix) = context_parts();
        let segment = &timeline.segments()[0];
        let ctx = SegmentContext {
            segment,
            beats: timeline.segment_beats(segment),
            chords: timeline.chords_in(timeline.segment_beats(segment)),
            binding: &mix,
        };
        let out = BasicGenerator::pop().generate(&ctx, &CancelToken::new()).unwrap();

        let bass = &out.phrases[&VoiceId::new("Bass")];
        assert_eq!(bass.channel(), 1);
        assert_eq!(bass.len(), 4);
        assert!(bass.iter().all(|n| n.pitch() == 36 && n.start() < 4.0));

        let piano = &out.phrases[&VoiceId::new("Piano")];
        assert_eq!(piano.len(), 6);

        let drums = &out.phrases[&VoiceId::new("Drums")];
        assert_eq!(drums.channel(), 9);
        assert!(drums.iter().any(|n| n.start() >= 4.0));
    }

    #[test]
    fn test_fill_and_cancel() {
        let (mut timeline, mix) = context_parts();
        let id = timeline.segments()[0].id();
        timeline.segment_mut(id).unwrap().params.fill_at_end = FillAtEnd::Fill;
        let segment = &timeline.segments()[0];
        let ctx = SegmentContext {
            segment,
            beats: timeline.segment_beats(segment),
            chords: Vec::new(),
            binding: &mix,
        };

        let out = BasicGenerator::ballad().generate(&ctx, &CancelToken::new()).unwrap();
        let drums = &out.phrases[&VoiceId::new("Drums")];
        assert!(drums
            .iter()
            .filter(|n| n.start() >= 4.0)
            .all(|n| n.pitch() == gm::HIGH_TOM || n.pitch() == gm::LOW_TOM));

        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(BasicGenerator::pop().generate(&ctx, &cancel).is_err());
    }
}
