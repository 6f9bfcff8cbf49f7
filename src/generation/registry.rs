// Generator lookup by id

use std::collections::HashMap;
use std::sync::Arc;

use super::builtin::BasicGenerator;
use super::PhraseGenerator;
use crate::model::{GeneratorId, TimelineSegment};

/// Maps generator ids to generators. Filled at startup, then shared read-only.
#[derive(Default)]
pub struct GeneratorRegistry {
    generators: HashMap<GeneratorId, Arc<dyn PhraseGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in "pop" and "ballad" generators
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(GeneratorId::new("pop"), Arc::new(BasicGenerator::pop()));
        registry.register(GeneratorId::new("ballad"), Arc::new(BasicGenerator::ballad()));
        registry
    }

    /// Register a generator, replacing any previous one with the same id
    pub fn register(&mut self, id: GeneratorId, generator: Arc<dyn PhraseGenerator>) {
        log::debug!("Registered generator '{}' ({})", id, generator.name());
        self.generators.insert(id, generator);
    }

    pub fn get(&self, id: &GeneratorId) -> Option<Arc<dyn PhraseGenerator>> {
        self.generators.get(id).cloned()
    }

    /// Generator governing a segment
    pub fn resolve(&self, segment: &TimelineSegment) -> Option<Arc<dyn PhraseGenerator>> {
        self.get(&segment.generator)
    }

    pub fn ids(&self) -> Vec<GeneratorId> {
        let mut ids: Vec<GeneratorId> = self.generators.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timeline;

    #[test]
    fn test_resolve_by_segment_generator() {
        let registry = GeneratorRegistry::with_builtins();
        assert_eq!(registry.ids(), vec![GeneratorId::new("ballad"), GeneratorId::new("pop")]);

        let mut timeline = Timeline::new();
        let known = timeline.add_segment("A", 2, "pop".into(), 4).unwrap();
        let unknown = timeline.add_segment("B", 2, "bossa".into(), 4).unwrap();

        assert!(registry.resolve(timeline.segment(known).unwrap()).is_some());
        assert!(registry.resolve(timeline.segment(unknown).unwrap()).is_none());
    }
}
