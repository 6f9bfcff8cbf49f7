// Runs the resolved generator of every segment and merges the outputs
// into one phrase per voice spanning the whole timeline

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use super::{CancelToken, GeneratorRegistry, SegmentContext};
use crate::error::GenerationError;
use crate::model::{CompositionSnapshot, VoiceId};
use crate::phrase::Phrase;

/// Merged generator output before post-processing
#[derive(Debug, Default)]
pub struct RawGeneration {
    pub phrases: BTreeMap<VoiceId, Phrase>,
    pub errors: BTreeMap<VoiceId, Vec<GenerationError>>,
}

impl RawGeneration {
    fn record(&mut self, voice: VoiceId, error: GenerationError) {
        let errors = self.errors.entry(voice).or_default();
        if !errors.contains(&error) {
            errors.push(error);
        }
    }
}

pub struct VoiceGenerationDispatcher<'a> {
    registry: &'a GeneratorRegistry,
}

impl<'a> VoiceGenerationDispatcher<'a> {
    pub fn new(registry: &'a GeneratorRegistry) -> Self {
        Self { registry }
    }

    /// Generate every segment of `snapshot`. Only voices in `voices` are kept
    /// when a subset is given. Segment failures are recorded, never fatal.
    pub fn dispatch(
        &self,
        snapshot: &CompositionSnapshot,
        voices: Option<&BTreeSet<VoiceId>>,
        cancel: &CancelToken,
    ) -> RawGeneration {
        let started = Instant::now();
        let wanted = |voice: &VoiceId| voices.map_or(true, |v| v.contains(voice));
        let mut raw = RawGeneration::default();

        for (voice, binding) in snapshot.mix.iter() {
            if wanted(voice) {
                raw.phrases.insert(voice.clone(), Phrase::new(binding.channel));
            }
        }

        for segment in snapshot.timeline.segments() {
            let bars = segment.bars();
            let beats = snapshot.timeline.segment_beats(segment);

            let Some(generator) = self.registry.resolve(segment) else {
                log::warn!("No generator '{}' for segment '{}'", segment.generator, segment.name);
                for voice in snapshot.mix.voice_ids().filter(|v| wanted(v)) {
                    raw.record(
                        voice.clone(),
                        GenerationError::NoGeneratorAvailable {
                            generator: segment.generator.clone(),
                            bars,
                        },
                    );
                }
                continue;
            };

            let ctx = SegmentContext {
                segment,
                beats,
                chords: snapshot.timeline.chords_in(beats),
                binding: &snapshot.mix,
            };

            let output = match generator.generate(&ctx, cancel) {
                Ok(output) => output,
                Err(e) => {
                    for spec in generator.voices().into_iter().filter(|s| wanted(&s.id)) {
                        raw.record(
                            spec.id,
                            GenerationError::SegmentGeneration {
                                generator: segment.generator.clone(),
                                bars,
                                message: format!("{:#}", e),
                            },
                        );
                    }
                    continue;
                }
            };

            for (voice, phrase) in output.phrases {
                if !wanted(&voice) {
                    continue;
                }
                if !snapshot.mix.contains(&voice) {
                    raw.phrases.entry(voice.clone()).or_insert_with(|| Phrase::new(0));
                    raw.record(voice.clone(), GenerationError::ResourceExhaustion { voice });
                    continue;
                }
                if let Some(target) = raw.phrases.get_mut(&voice) {
                    let rejected = target.merge(&phrase.slice(beats));
                    if rejected > 0 {
                        log::debug!("{} duplicate notes dropped for {}", rejected, voice);
                    }
                }
            }

            for (voice, message) in output.errors {
                if wanted(&voice) {
                    raw.record(
                        voice,
                        GenerationError::SegmentGeneration {
                            generator: segment.generator.clone(),
                            bars,
                            message,
                        },
                    );
                }
            }
        }

        log::debug!(
            "Dispatched {} segments for v{} in {:?}",
            snapshot.timeline.segments().len(),
            snapshot.version,
            started.elapsed()
        );
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GeneratorOutput, PhraseGenerator, VoiceSpec};
    use crate::model::{Composition, SharedComposition, VoiceBinding, VoiceKind};
    use crate::phrase::NoteEvent;
    use std::sync::Arc;

    struct Failing;

    impl PhraseGenerator for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn voices(&self) -> Vec<VoiceSpec> {
            vec![VoiceSpec::new("Bass", VoiceKind::Bass)]
        }

        fn generate(&self, _: &SegmentContext<'_>, _: &CancelToken) -> anyhow::Result<GeneratorOutput> {
            anyhow::bail!("out of ideas")
        }
    }

    /// Emits a Bass note at every segment start plus an unbound "Strings" voice
    struct Extra;

    impl PhraseGenerator for Extra {
        fn name(&self) -> &str {
            "extra"
        }

        fn voices(&self) -> Vec<VoiceSpec> {
            vec![
                VoiceSpec::new("Bass", VoiceKind::Bass),
                VoiceSpec::new("Strings", VoiceKind::Pad),
            ]
        }

        fn generate(&self, ctx: &SegmentContext<'_>, _: &CancelToken) -> anyhow::Result<GeneratorOutput> {
            let mut out = GeneratorOutput::default();
            let note = NoteEvent::new(0, 40, 90, ctx.beats.from, 1.0);
            out.phrases.insert(VoiceId::new("Bass"), Phrase::from_notes(0, [note]));
            out.phrases.insert(VoiceId::new("Strings"), Phrase::from_notes(0, [note]));
            Ok(out)
        }
    }

    fn registry() -> GeneratorRegistry {
        let mut registry = GeneratorRegistry::new();
        registry.register("failing".into(), Arc::new(Failing));
        registry.register("extra".into(), Arc::new(Extra));
        registry
    }

    fn snapshot(generators: &[&str]) -> CompositionSnapshot {
        let mut c = Composition::new("dispatch");
        for (i, g) in generators.iter().enumerate() {
            c.timeline.add_segment(format!("S{}", i), 2, (*g).into(), 4).unwrap();
        }
        c.mix.bind(VoiceId::new("Bass"), VoiceBinding::new(3, VoiceKind::Bass));
        c.mix.bind(VoiceId::new("Drums"), VoiceBinding::new(9, VoiceKind::Drums));
        SharedComposition::new(c).snapshot()
    }

    #[test]
    fn test_failing_segment_is_degraded_not_fatal() {
        let registry = registry();
        let raw = VoiceGenerationDispatcher::new(&registry).dispatch(
            &snapshot(&["extra", "failing", "extra"]),
            None,
            &CancelToken::new(),
        );

        let bass = &raw.phrases[&VoiceId::new("Bass")];
        let starts: Vec<f64> = bass.iter().map(|n| n.start()).collect();
        assert_eq!(starts, vec![0.0, 16.0]);
        assert_eq!(bass.channel(), 3);

        let bass_errors = &raw.errors[&VoiceId::new("Bass")];
        assert!(bass_errors.iter().any(|e| matches!(e, GenerationError::SegmentGeneration { .. })
            && e.bars() == Some(crate::model::BarRange::new(2, 3))));
        assert!(raw.phrases[&VoiceId::new("Drums")].is_empty());
    }

    #[test]
    fn test_unbound_voice_is_resource_exhaustion() {
        let registry = registry();
        let raw = VoiceGenerationDispatcher::new(&registry).dispatch(
            &snapshot(&["extra", "extra"]),
            None,
            &CancelToken::new(),
        );

        let strings = VoiceId::new("Strings");
        assert!(raw.phrases[&strings].is_empty());
        assert_eq!(
            raw.errors[&strings],
            vec![GenerationError::ResourceExhaustion { voice: strings.clone() }]
        );
        assert_eq!(raw.phrases[&VoiceId::new("Bass")].len(), 2);
    }

    #[test]
    fn test_unknown_generator_marks_all_mix_voices() {
        let registry = registry();
        let raw = VoiceGenerationDispatcher::new(&registry).dispatch(
            &snapshot(&["bossa"]),
            None,
            &CancelToken::new(),
        );
        assert_eq!(raw.errors.len(), 2);
        assert!(raw.errors.values().flatten().all(|e| matches!(e, GenerationError::NoGeneratorAvailable { .. })));
    }

    #[test]
    fn test_requested_voice_subset() {
        let registry = registry();
        let only_drums: BTreeSet<VoiceId> = [VoiceId::new("Drums")].into_iter().collect();
        let raw = VoiceGenerationDispatcher::new(&registry).dispatch(
            &snapshot(&["extra"]),
            Some(&only_drums),
            &CancelToken::new(),
        );
        assert_eq!(raw.phrases.keys().collect::<Vec<_>>(), vec![&VoiceId::new("Drums")]);
        assert!(raw.errors.is_empty());
    }
}
