// Shared, editable composition with change notifications
//
// Every edit bumps the snapshot version under the write lock, so a snapshot
// always pairs a version with exactly the state it was taken from.
// Listeners are called after the lock is released.

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::harmony::ChordSymbol;
use super::mix::ChannelBinding;
use super::timeline::{SegmentId, Timeline, TimelineError};
use super::voice::VoiceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositionId(Uuid);

impl CompositionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CompositionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CompositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle returned when registering a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Why a generation was asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReason {
    ChordChanged,
    SegmentChanged,
    SegmentResized,
    ParameterChanged,
    MixChanged,
    ContextSwitch,
    Enabled,
    Playback,
    Explicit(String),
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeReason::ChordChanged => f.write_str("chord changed"),
            ChangeReason::SegmentChanged => f.write_str("segment changed"),
            ChangeReason::SegmentResized => f.write_str("segment resized"),
            ChangeReason::ParameterChanged => f.write_str("parameter changed"),
            ChangeReason::MixChanged => f.write_str("mix changed"),
            ChangeReason::ContextSwitch => f.write_str("context switch"),
            ChangeReason::Enabled => f.write_str("enabled"),
            ChangeReason::Playback => f.write_str("playback"),
            ChangeReason::Explicit(why) => write!(f, "explicit: {}", why),
        }
    }
}

/// Notification sent to composition listeners after every edit
#[derive(Debug, Clone)]
pub struct CompositionChange {
    pub composition: CompositionId,
    pub version: u64,
    pub reason: ChangeReason,
}

/// Callback invoked after a composition edit
pub type CompositionCallback = Arc<dyn Fn(&CompositionChange) + Send + Sync>;

/// The editable state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Composition {
    pub name: String,
    pub timeline: Timeline,
    pub mix: ChannelBinding,
}

impl Composition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Immutable copy of a composition taken at a given version
#[derive(Debug, Clone)]
pub struct CompositionSnapshot {
    pub id: CompositionId,
    pub version: u64,
    pub name: String,
    pub timeline: Timeline,
    pub mix: ChannelBinding,
}

pub struct SharedComposition {
    id: CompositionId,
    state: RwLock<Composition>,
    version: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, CompositionCallback)>>,
}

impl SharedComposition {
    pub fn new(composition: Composition) -> Arc<Self> {
        Arc::new(Self {
            id: CompositionId::new(),
            state: RwLock::new(composition),
            version: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> CompositionId {
        self.id
    }

    /// Current snapshot version
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Bump the version without notifying listeners. Returns the new version.
    pub fn bump_version(&self) -> u64 {
        let _state = self.state.write();
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn snapshot(&self) -> CompositionSnapshot {
        let state = self.state.read();
        CompositionSnapshot {
            id: self.id,
            version: self.version.load(Ordering::SeqCst),
            name: state.name.clone(),
            timeline: state.timeline.clone(),
            mix: state.mix.clone(),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Composition> {
        self.state.read()
    }

    /// Apply an edit, bump the version and notify listeners
    pub fn edit<T>(&self, reason: ChangeReason, f: impl FnOnce(&mut Composition) -> T) -> T {
        let (out, version) = {
            let mut state = self.state.write();
            let out = f(&mut state);
            (out, self.version.fetch_add(1, Ordering::SeqCst) + 1)
        };
        self.notify(version, reason);
        out
    }

    /// Like [`edit`](Self::edit) but only bumps and notifies when `f` succeeds
    pub fn try_edit<T, E>(
        &self,
        reason: ChangeReason,
        f: impl FnOnce(&mut Composition) -> Result<T, E>,
    ) -> Result<T, E> {
        let (out, version) = {
            let mut state = self.state.write();
            let out = f(&mut state)?;
            (out, self.version.fetch_add(1, Ordering::SeqCst) + 1)
        };
        self.notify(version, reason);
        Ok(out)
    }

    pub fn edit_timeline<T>(&self, reason: ChangeReason, f: impl FnOnce(&mut Timeline) -> T) -> T {
        self.edit(reason, |c| f(&mut c.timeline))
    }

    pub fn edit_mix<T>(&self, f: impl FnOnce(&mut ChannelBinding) -> T) -> T {
        self.edit(ChangeReason::MixChanged, |c| f(&mut c.mix))
    }

    pub fn set_chord(&self, bar: u32, beat: f64, symbol: ChordSymbol) -> Result<(), TimelineError> {
        self.try_edit(ChangeReason::ChordChanged, |c| c.timeline.set_chord(bar, beat, symbol))
    }

    pub fn set_segment_value(
        &self,
        segment: SegmentId,
        key: &str,
        value: &str,
    ) -> Result<(), TimelineError> {
        self.try_edit(ChangeReason::ParameterChanged, |c| {
            c.timeline.segment_mut(segment)?.params.set_value(key, value);
            Ok(())
        })
    }

    pub fn set_voice_muted(
        &self,
        segment: SegmentId,
        voice: VoiceId,
        muted: bool,
    ) -> Result<(), TimelineError> {
        self.try_edit(ChangeReason::ParameterChanged, |c| {
            c.timeline.segment_mut(segment)?.params.set_muted(voice, muted);
            Ok(())
        })
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    pub fn add_listener(&self, callback: CompositionCallback) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.lock().push((id, callback));
        id
    }

    /// Returns false if the listener was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(l, _)| *l != id);
        before != listeners.len()
    }

    fn notify(&self, version: u64, reason: ChangeReason) {
        let callbacks: Vec<CompositionCallback> =
            self.listeners.lock().iter().map(|(_, cb)| cb.clone()).collect();
        if callbacks.is_empty() {
            return;
        }
        let change = CompositionChange {
            composition: self.id,
            version,
            reason,
        };
        for callback in callbacks {
            callback(&change);
        }
    }
}

impl fmt::Debug for SharedComposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedComposition")
            .field("id", &self.id)
            .field("version", &self.version())
            .finish()
    }
}
