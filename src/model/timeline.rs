// Segmented timeline with its chord progression
//
// Segments are contiguous and ordered; bar indexes are 0-based and global.
// Each segment has its own time signature (beats per bar), so the beat
// position of a bar is the running sum over the preceding segments.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::harmony::{ChordEvent, ChordSymbol};
use super::params::SegmentParams;
use crate::phrase::BeatRange;

/// Error type for timeline edits
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimelineError {
    #[error("Unknown segment: {0}")]
    UnknownSegment(SegmentId),

    #[error("A segment needs at least one bar")]
    EmptySegment,

    #[error("Invalid beats per bar: {0}")]
    InvalidBeatsPerBar(u8),

    #[error("Bar {bar} is outside the timeline ({bar_count} bars)")]
    BarOutOfRange { bar: u32, bar_count: u32 },
}

/// Inclusive bar range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarRange {
    pub from: u32,
    pub to: u32,
}

impl BarRange {
    pub fn new(from: u32, to: u32) -> Self {
        Self { from: from.min(to), to: from.max(to) }
    }

    pub fn contains(&self, bar: u32) -> bool {
        bar >= self.from && bar <= self.to
    }

    pub fn len(&self) -> u32 {
        self.to - self.from + 1
    }
}

impl fmt::Display for BarRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

/// Identity of a pluggable generator, e.g. "pop"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeneratorId(String);

impl GeneratorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeneratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GeneratorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentId(Uuid);

impl SegmentId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A contiguous bar range governed by one generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSegment {
    id: SegmentId,
    pub name: String,
    bars: BarRange,
    pub generator: GeneratorId,
    beats_per_bar: u8,
    pub params: SegmentParams,
}

impl TimelineSegment {
    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn bars(&self) -> BarRange {
        self.bars
    }

    pub fn beats_per_bar(&self) -> u8 {
        self.beats_per_bar
    }

    fn beats(&self) -> f64 {
        self.bars.len() as f64 * self.beats_per_bar as f64
    }
}

/// A chord with its resolved beat range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionedChord {
    pub range: BeatRange,
    pub symbol: ChordSymbol,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Timeline {
    segments: Vec<TimelineSegment>,
    chords: Vec<ChordEvent>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Segments
    // ========================================================================

    /// Append a segment after the last one
    pub fn add_segment(
        &mut self,
        name: impl Into<String>,
        bar_count: u32,
        generator: GeneratorId,
        beats_per_bar: u8,
    ) -> Result<SegmentId, TimelineError> {
        if bar_count == 0 {
            return Err(TimelineError::EmptySegment);
        }
        if beats_per_bar == 0 {
            return Err(TimelineError::InvalidBeatsPerBar(beats_per_bar));
        }

        let from = self.bar_count();
        let id = SegmentId::new();
        self.segments.push(TimelineSegment {
            id,
            name: name.into(),
            bars: BarRange::new(from, from + bar_count - 1),
            generator,
            beats_per_bar,
            params: SegmentParams::default(),
        });
        Ok(id)
    }

    /// Change the length of a segment; following segments move accordingly
    pub fn resize_segment(&mut self, id: SegmentId, bar_count: u32) -> Result<(), TimelineError> {
        if bar_count == 0 {
            return Err(TimelineError::EmptySegment);
        }
        let segment = self.segment_mut(id)?;
        segment.bars = BarRange::new(segment.bars.from, segment.bars.from + bar_count - 1);
        self.relayout();
        Ok(())
    }

    pub fn remove_segment(&mut self, id: SegmentId) -> Result<TimelineSegment, TimelineError> {
        let idx = self
            .segments
            .iter()
            .position(|s| s.id == id)
            .ok_or(TimelineError::UnknownSegment(id))?;
        let removed = self.segments.remove(idx);
        self.relayout();
        Ok(removed)
    }

    /// Recompute bar ranges so segments stay contiguous from bar 0
    fn relayout(&mut self) {
        let mut next = 0;
        for segment in self.segments.iter_mut() {
            let len = segment.bars.len();
            segment.bars = BarRange::new(next, next + len - 1);
            next += len;
        }
    }

    pub fn segments(&self) -> &[TimelineSegment] {
        &self.segments
    }

    pub fn segment(&self, id: SegmentId) -> Result<&TimelineSegment, TimelineError> {
        self.segments
            .iter()
            .find(|s| s.id == id)
            .ok_or(TimelineError::UnknownSegment(id))
    }

    pub fn segment_mut(&mut self, id: SegmentId) -> Result<&mut TimelineSegment, TimelineError> {
        self.segments
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(TimelineError::UnknownSegment(id))
    }

    pub fn segment_at_bar(&self, bar: u32) -> Option<&TimelineSegment> {
        self.segments.iter().find(|s| s.bars.contains(bar))
    }

    pub fn segment_at_beat(&self, pos: f64) -> Option<&TimelineSegment> {
        let mut start = 0.0;
        for segment in &self.segments {
            let end = start + segment.beats();
            if pos >= start && pos < end {
                return Some(segment);
            }
            start = end;
        }
        None
    }

    pub fn bar_count(&self) -> u32 {
        self.segments.last().map(|s| s.bars.to + 1).unwrap_or(0)
    }

    pub fn total_beats(&self) -> f64 {
        self.segments.iter().map(|s| s.beats()).sum()
    }

    /// Beat position of the start of `bar`. Bars past the end map to the
    /// end of the timeline.
    pub fn bar_start(&self, bar: u32) -> f64 {
        let mut start = 0.0;
        for segment in &self.segments {
            if segment.bars.contains(bar) {
                return start + (bar - segment.bars.from) as f64 * segment.beats_per_bar as f64;
            }
            start += segment.beats();
        }
        start
    }

    pub fn beat_range(&self, bars: BarRange) -> BeatRange {
        BeatRange::new(self.bar_start(bars.from), self.bar_start(bars.to + 1))
    }

    pub fn segment_beats(&self, segment: &TimelineSegment) -> BeatRange {
        self.beat_range(segment.bars)
    }

    // ========================================================================
    // Chords
    // ========================================================================

    /// Place a chord, replacing any chord at the same position
    pub fn set_chord(&mut self, bar: u32, beat: f64, symbol: ChordSymbol) -> Result<(), TimelineError> {
        let bar_count = self.bar_count();
        if bar >= bar_count {
            return Err(TimelineError::BarOutOfRange { bar, bar_count });
        }
        self.chords.retain(|c| !(c.bar == bar && c.beat == beat));
        self.chords.push(ChordEvent::new(bar, beat, symbol));
        self.chords
            .sort_by(|a, b| a.bar.cmp(&b.bar).then(a.beat.total_cmp(&b.beat)));
        Ok(())
    }

    pub fn remove_chord(&mut self, bar: u32, beat: f64) -> bool {
        let before = self.chords.len();
        self.chords.retain(|c| !(c.bar == bar && c.beat == beat));
        before != self.chords.len()
    }

    pub fn chords(&self) -> &[ChordEvent] {
        &self.chords
    }

    /// Every chord with its beat range. A chord lasts until the next one or
    /// the end of the timeline; chords placed past the end are ignored.
    pub fn harmony(&self) -> Vec<PositionedChord> {
        let total = self.total_beats();
        let starts: Vec<(f64, ChordSymbol)> = self
            .chords
            .iter()
            .filter(|c| c.bar < self.bar_count())
            .map(|c| (self.bar_start(c.bar) + c.beat, c.symbol))
            .filter(|(start, _)| *start < total)
            .collect();

        starts
            .iter()
            .enumerate()
            .map(|(i, (start, symbol))| {
                let end = starts.get(i + 1).map(|(next, _)| *next).unwrap_or(total);
                PositionedChord {
                    range: BeatRange::new(*start, end),
                    symbol: *symbol,
                }
            })
            .filter(|c| !c.range.is_empty())
            .collect()
    }

    /// Chords overlapping `range`, clipped to it
    pub fn chords_in(&self, range: BeatRange) -> Vec<PositionedChord> {
        self.harmony()
            .into_iter()
            .filter(|c| c.range.from < range.to && c.range.to > range.from)
            .map(|c| PositionedChord {
                range: BeatRange::new(c.range.from.max(range.from), c.range.to.min(range.to)),
                symbol: c.symbol,
            })
            .collect()
    }

    /// Beat ranges where the harmony is explicitly "no chord"
    pub fn no_chord_ranges(&self) -> Vec<BeatRange> {
        let mut ranges: Vec<BeatRange> = Vec::new();
        for chord in self.harmony().into_iter().filter(|c| c.symbol.is_no_chord()) {
            match ranges.last_mut() {
                Some(last) if last.to == chord.range.from => last.to = chord.range.to,
                _ => ranges.push(chord.range),
            }
        }
        ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_segment_timeline() -> (Timeline, SegmentId, SegmentId) {
        let mut t = Timeline::new();
        let a = t.add_segment("A", 4, "pop".into(), 4).unwrap();
        let b = t.add_segment("B", 2, "waltz".into(), 3).unwrap();
        (t, a, b)
    }

    #[test]
    fn test_segments_are_contiguous() {
        let (mut t, a, b) = two_segment_timeline();
        assert_eq!(t.segment(a).unwrap().bars(), BarRange::new(0, 3));
        assert_eq!(t.segment(b).unwrap().bars(), BarRange::new(4, 5));
        assert_eq!(t.bar_count(), 6);

        t.resize_segment(a, 2).unwrap();
        assert_eq!(t.segment(b).unwrap().bars(), BarRange::new(2, 3));

        t.remove_segment(a).unwrap();
        assert_eq!(t.segment(b).unwrap().bars(), BarRange::new(0, 1));
        assert_eq!(t.resize_segment(a, 1), Err(TimelineError::UnknownSegment(a)));
    }

    #[test]
    fn test_bar_positions_follow_time_signatures() {
        let (t, _, b) = two_segment_timeline();
        assert_eq!(t.bar_start(0), 0.0);
        assert_eq!(t.bar_start(4), 16.0);
        assert_eq!(t.bar_start(5), 19.0);
        assert_eq!(t.total_beats(), 22.0);
        assert_eq!(t.segment_beats(t.segment(b).unwrap()), BeatRange::new(16.0, 22.0));
        assert_eq!(t.segment_at_beat(16.5).unwrap().id(), b);
        assert!(t.segment_at_beat(22.0).is_none());
    }

    #[test]
    fn test_harmony_and_no_chord_ranges() {
        let (mut t, _, _) = two_segment_timeline();
        t.set_chord(0, 0.0, "C".parse().unwrap()).unwrap();
        t.set_chord(1, 0.0, ChordSymbol::NoChord).unwrap();
        t.set_chord(1, 2.0, ChordSymbol::NoChord).unwrap();
        t.set_chord(2, 0.0, "G7".parse().unwrap()).unwrap();

        let harmony = t.harmony();
        assert_eq!(harmony.len(), 4);
        assert_eq!(harmony[3].range, BeatRange::new(8.0, 22.0));
        assert_eq!(t.no_chord_ranges(), vec![BeatRange::new(4.0, 8.0)]);

        let clipped = t.chords_in(BeatRange::new(2.0, 6.0));
        assert_eq!(clipped.len(), 2);
        assert_eq!(clipped[0].range, BeatRange::new(2.0, 4.0));
    }

    #[test]
    fn test_set_chord_replaces_and_validates() {
        let (mut t, _, _) = two_segment_timeline();
        t.set_chord(0, 0.0, "C".parse().unwrap()).unwrap();
        t.set_chord(0, 0.0, "Dm".parse().unwrap()).unwrap();
        assert_eq!(t.chords().len(), 1);
        assert_eq!(t.chords()[0].symbol, "Dm".parse().unwrap());
        assert!(matches!(
            t.set_chord(6, 0.0, ChordSymbol::NoChord),
            Err(TimelineError::BarOutOfRange { bar: 6, bar_count: 6 })
        ));
        assert!(t.remove_chord(0, 0.0));
        assert!(!t.remove_chord(0, 0.0));
    }
}
