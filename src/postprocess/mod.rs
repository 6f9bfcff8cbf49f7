// Post-processing pipeline
//
// A fixed, ordered chain of transforms applied to every voice's phrase,
// whatever generator produced it. Each pass marks the phrases it has
// processed and skips marked phrases, so running the pipeline again on
// its own output changes nothing.

pub mod passes;

use std::collections::BTreeMap;

use crate::model::{ChannelBinding, Timeline, VoiceBinding, VoiceId};
use crate::phrase::{BeatRange, Phrase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    CustomPhrase,
    Mute,
    DrumsMix,
    FillAtEnd,
    VelocityShift,
    Transpose,
    DrumsReroute,
    NoChord,
}

impl PassKind {
    /// Application order
    pub const ORDER: [PassKind; 8] = [
        PassKind::CustomPhrase,
        PassKind::Mute,
        PassKind::DrumsMix,
        PassKind::FillAtEnd,
        PassKind::VelocityShift,
        PassKind::Transpose,
        PassKind::DrumsReroute,
        PassKind::NoChord,
    ];

    fn mark(self) -> u16 {
        1 << (self as u16)
    }

    fn run(self, phrase: Phrase, ctx: &VoiceContext<'_>) -> Phrase {
        match self {
            PassKind::CustomPhrase => passes::substitute_custom_phrases(phrase, ctx),
            PassKind::Mute => passes::apply_mutes(phrase, ctx),
            PassKind::DrumsMix => passes::apply_drums_mix(phrase, ctx),
            PassKind::FillAtEnd => passes::apply_fade_out(phrase, ctx),
            PassKind::VelocityShift => passes::apply_velocity_shift(phrase, ctx),
            PassKind::Transpose => passes::apply_transpose(phrase, ctx),
            PassKind::DrumsReroute => passes::reroute_drums(phrase, ctx),
            PassKind::NoChord => passes::suppress_no_chord(phrase, ctx),
        }
    }
}

/// What a pass may look at for one voice
pub struct VoiceContext<'a> {
    pub voice: &'a VoiceId,
    pub binding: &'a VoiceBinding,
    pub timeline: &'a Timeline,
    /// Precomputed "no chord" ranges of the timeline
    pub no_chord: &'a [BeatRange],
    pub fade_out_floor: f32,
}

#[derive(Debug, Clone)]
pub struct PostProcessingPipeline {
    fade_out_floor: f32,
}

impl PostProcessingPipeline {
    pub fn new(fade_out_floor: f32) -> Self {
        Self {
            fade_out_floor: fade_out_floor.clamp(0.0, 1.0),
        }
    }

    /// Run every pass not yet applied to `phrase`
    pub fn apply_voice(&self, mut phrase: Phrase, ctx: &VoiceContext<'_>) -> Phrase {
        for pass in PassKind::ORDER {
            let mark = pass.mark();
            if phrase.is_marked(mark) {
                continue;
            }
            phrase = pass.run(phrase, ctx);
            phrase.mark(mark);
        }
        phrase
    }

    /// Process all voices. Voices without a binding in `mix` pass through.
    pub fn apply(
        &self,
        phrases: BTreeMap<VoiceId, Phrase>,
        timeline: &Timeline,
        mix: &ChannelBinding,
    ) -> BTreeMap<VoiceId, Phrase> {
        let no_chord = timeline.no_chord_ranges();
        phrases
            .into_iter()
            .map(|(voice, phrase)| {
                let Some(binding) = mix.get(&voice) else {
                    return (voice, phrase);
                };
                let ctx = VoiceContext {
                    voice: &voice,
                    binding,
                    timeline,
                    no_chord: &no_chord,
                    fade_out_floor: self.fade_out_floor,
                };
                let phrase = self.apply_voice(phrase, &ctx);
                (voice, phrase)
            })
            .collect()
    }
}

impl Default for PostProcessingPipeline {
    fn default() -> Self {
        Self::new(0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChordSymbol, FillAtEnd, VoiceKind};
    use crate::phrase::NoteEvent;

    fn setup() -> (Timeline, ChannelBinding, BTreeMap<VoiceId, Phrase>) {
        let mut timeline = Timeline::new();
        let a = timeline.add_segment("A", 2, "pop".into(), 4).unwrap();
        timeline.add_segment("B", 2, "pop".into(), 4).unwrap();
        timeline.set_chord(0, 0.0, "C".parse().unwrap()).unwrap();
        timeline.set_chord(3, 0.0, ChordSymbol::NoChord).unwrap();
        timeline.segment_mut(a).unwrap().params.fill_at_end = FillAtEnd::FadeOut;

        let mut mix = ChannelBinding::new();
        mix.bind(
            VoiceId::new("Bass"),
            VoiceBinding::new(1, VoiceKind::Bass).with_velocity_shift(-10).with_transpose(-12),
        );
        mix.bind(
            VoiceId::new("Drums"),
            VoiceBinding::new(9, VoiceKind::Drums).with_drums_reroute(Some(16)),
        );

        let mut phrases = BTreeMap::new();
        phrases.insert(
            VoiceId::new("Bass"),
            Phrase::from_notes(1, (0..16).map(|i| NoteEvent::new(1, 40, 100, i as f64, 1.5))),
        );
        phrases.insert(
            VoiceId::new("Drums"),
            Phrase::from_notes(9, (0..16).map(|i| NoteEvent::new(9, 36, 100, i as f64, 0.25))),
        );
        (timeline, mix, phrases)
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let (timeline, mix, phrases) = setup();
        let pipeline = PostProcessingPipeline::default();
        let once = pipeline.apply(phrases, &timeline, &mix);
        let twice = pipeline.apply(once.clone(), &timeline, &mix);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_mix_mute_overrides_everything() {
        let (mut timeline, mut mix, phrases) = setup();
        let b = timeline.segments()[1].id();
        timeline
            .segment_mut(b)
            .unwrap()
            .params
            .custom_phrases
            .insert(VoiceId::new("Bass"), Phrase::from_notes(0, [NoteEvent::new(0, 45, 100, 0.0, 1.0)]));
        if let Some(bass) = mix.get_mut(&VoiceId::new("Bass")) {
            bass.muted = true;
            bass.velocity_shift = 20;
        }

        let out = PostProcessingPipeline::default().apply(phrases, &timeline, &mix);
        assert!(out[&VoiceId::new("Bass")].is_empty());
        assert!(!out[&VoiceId::new("Drums")].is_empty());
    }

    #[test]
    fn test_reroute_preserves_timing_and_pitch() {
        let (timeline, mix, phrases) = setup();
        let before = phrases[&VoiceId::new("Drums")].clone();
        let out = PostProcessingPipeline::default().apply(phrases, &timeline, &mix);
        let after = &out[&VoiceId::new("Drums")];

        assert_eq!(after.channel(), 16);
        assert_eq!(after.len(), before.len());
        for (a, b) in after.iter().zip(before.iter()) {
            assert_eq!(a.channel(), 16);
            assert_eq!((a.start(), a.duration(), a.pitch()), (b.start(), b.duration(), b.pitch()));
        }
    }

    #[test]
    fn test_no_chord_and_order_of_passes() {
        let (timeline, mix, phrases) = setup();
        let out = PostProcessingPipeline::default().apply(phrases, &timeline, &mix);
        let bass = &out[&VoiceId::new("Bass")];

        // NC covers bar 3 (beats 12..16)
        assert!(bass.iter().all(|n| n.start() < 12.0));
        assert_eq!(bass.iter().last().map(|n| n.end()), Some(12.0));
        // transposed down an octave, shifted after the fade
        assert!(bass.iter().all(|n| n.pitch() == 28));
        assert_eq!(bass.notes()[0].velocity(), 90);
        assert_eq!(bass.notes()[8].velocity(), 90);
        assert!(bass.notes()[7].velocity() < 90);
        // drums are not suppressed
        assert_eq!(out[&VoiceId::new("Drums")].len(), 16);
    }
}
