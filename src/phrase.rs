// Note events and per-channel phrases
//
// Positions are quarter-note beats counted from the start of the timeline.
// Ticks only appear at the MIDI export boundary (see export.rs).

use serde::{Deserialize, Serialize};

/// Highest logical channel (two 16-channel output ports)
pub const MAX_CHANNEL: u8 = 31;

/// GM drums channel (channel 10 in 1-based numbering)
pub const GM_DRUMS_CHANNEL: u8 = 9;

/// Half-open beat range `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatRange {
    pub from: f64,
    pub to: f64,
}

impl BeatRange {
    pub fn new(from: f64, to: f64) -> Self {
        Self { from, to: to.max(from) }
    }

    pub fn contains(&self, pos: f64) -> bool {
        pos >= self.from && pos < self.to
    }

    pub fn len(&self) -> f64 {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.to <= self.from
    }
}

/// A single timed note. Immutable: the `with_*` methods return a new event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    channel: u8,
    pitch: u8,
    velocity: u8,
    start: f64,
    duration: f64,
}

impl NoteEvent {
    /// Create a note, clamping pitch to 0..=127 and velocity to 1..=127
    pub fn new(channel: u8, pitch: u8, velocity: u8, start: f64, duration: f64) -> Self {
        Self {
            channel: channel.min(MAX_CHANNEL),
            pitch: pitch.min(127),
            velocity: velocity.clamp(1, 127),
            start: start.max(0.0),
            duration: duration.max(0.0),
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn with_channel(&self, channel: u8) -> Self {
        Self::new(channel, self.pitch, self.velocity, self.start, self.duration)
    }

    pub fn with_pitch(&self, pitch: u8) -> Self {
        Self::new(self.channel, pitch, self.velocity, self.start, self.duration)
    }

    pub fn with_velocity(&self, velocity: u8) -> Self {
        Self::new(self.channel, self.pitch, velocity, self.start, self.duration)
    }

    pub fn with_duration(&self, duration: f64) -> Self {
        Self::new(self.channel, self.pitch, self.velocity, self.start, duration)
    }

    pub fn shifted(&self, offset_beats: f64) -> Self {
        Self::new(self.channel, self.pitch, self.velocity, self.start + offset_beats, self.duration)
    }
}

/// Ordered notes for exactly one channel.
///
/// Notes are kept sorted by start position; notes with equal start keep
/// their insertion order. A `(start, pitch)` pair is only admitted twice
/// through [`Phrase::add_allow_duplicate`].
///
/// `pass_marks` records which post-processing passes already ran on this
/// phrase so the pipeline can be re-applied without effect.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Phrase {
    channel: u8,
    notes: Vec<NoteEvent>,
    #[serde(default)]
    pass_marks: u16,
}

impl Phrase {
    pub fn new(channel: u8) -> Self {
        Self {
            channel: channel.min(MAX_CHANNEL),
            notes: Vec::new(),
            pass_marks: 0,
        }
    }

    /// Build a phrase from arbitrary notes, relabeled to `channel`.
    /// Duplicate `(start, pitch)` pairs are dropped.
    pub fn from_notes(channel: u8, notes: impl IntoIterator<Item = NoteEvent>) -> Self {
        let mut phrase = Self::new(channel);
        for note in notes {
            phrase.add(note);
        }
        phrase
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NoteEvent> {
        self.notes.iter()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Add a note. Returns false if a note with the same start and pitch
    /// is already present.
    pub fn add(&mut self, note: NoteEvent) -> bool {
        let exists = self
            .notes
            .iter()
            .any(|n| n.start == note.start && n.pitch == note.pitch);
        if exists {
            return false;
        }
        self.insert_sorted(note);
        true
    }

    /// Add a note even if its `(start, pitch)` pair is already present
    pub fn add_allow_duplicate(&mut self, note: NoteEvent) {
        self.insert_sorted(note);
    }

    fn insert_sorted(&mut self, note: NoteEvent) {
        let note = note.with_channel(self.channel);
        let idx = self.notes.partition_point(|n| n.start <= note.start);
        self.notes.insert(idx, note);
    }

    /// Append all notes of `other`, relabeled to this phrase's channel.
    /// Returns the number of notes rejected as duplicates.
    pub fn merge(&mut self, other: &Phrase) -> usize {
        let mut rejected = 0;
        for note in &other.notes {
            if !self.add(*note) {
                rejected += 1;
            }
        }
        rejected
    }

    /// Copy of the notes starting inside `range`
    pub fn slice(&self, range: BeatRange) -> Phrase {
        Phrase {
            channel: self.channel,
            notes: self.notes.iter().filter(|n| range.contains(n.start)).copied().collect(),
            pass_marks: self.pass_marks,
        }
    }

    /// Remove the notes starting inside `range`, returns how many were removed
    pub fn remove_range(&mut self, range: BeatRange) -> usize {
        let before = self.notes.len();
        self.notes.retain(|n| !range.contains(n.start));
        before - self.notes.len()
    }

    pub fn retain(&mut self, f: impl FnMut(&NoteEvent) -> bool) {
        self.notes.retain(f);
    }

    /// Replace every note with `f(note)`. Start positions may move, order is
    /// re-established (stable).
    pub fn map_notes(mut self, mut f: impl FnMut(&NoteEvent) -> NoteEvent) -> Phrase {
        let channel = self.channel;
        for note in self.notes.iter_mut() {
            *note = f(note).with_channel(channel);
        }
        self.notes.sort_by(|a, b| a.start.total_cmp(&b.start));
        self
    }

    /// The same phrase on another channel
    pub fn with_channel(mut self, channel: u8) -> Phrase {
        self.channel = channel.min(MAX_CHANNEL);
        let channel = self.channel;
        for note in self.notes.iter_mut() {
            *note = note.with_channel(channel);
        }
        self
    }

    /// End position of the last sounding note
    pub fn last_end(&self) -> Option<f64> {
        self.notes.iter().map(|n| n.end()).reduce(f64::max)
    }

    pub(crate) fn is_marked(&self, mark: u16) -> bool {
        self.pass_marks & mark != 0
    }

    pub(crate) fn mark(&mut self, mark: u16) {
        self.pass_marks |= mark;
    }
}

impl<'a> IntoIterator for &'a Phrase {
    type Item = &'a NoteEvent;
    type IntoIter = std::slice::Iter<'a, NoteEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.notes.iter()
    }
}
