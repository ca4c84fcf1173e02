//! Event patterns and their inscription onto a session.
//!
//! A pattern is a lazy sequence of note events. [`Session::inscribe`] lays
//! the events out from the active offset, one synth per event, optionally
//! inside a group that outlives the last event by a release time.

use crate::bus::ControlValue;
use crate::error::{Result, SessionError};
use crate::node::{GroupOptions, NodeId, SynthOptions};
use crate::requests::AddAction;
use crate::session::Session;
use nrtscore_dsp::{default_synthdef, SynthDef};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Release time of a pattern's wrapping group after its last event.
pub const DEFAULT_RELEASE_TIME: f64 = 0.25;

/// Zero-delta events allowed in a row before a pattern is considered stuck.
const MAX_EVENTS_PER_INSTANT: usize = 4096;

/// Accumulated deltas within this many seconds of the end reach the end.
const END_TOLERANCE: f64 = 1e-9;

/// One note produced by a pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternEvent {
    /// Seconds until the next event.
    pub delta: f64,
    /// Seconds the synth plays.
    pub duration: f64,
    /// `None` plays the builtin default definition.
    pub synthdef: Option<Arc<SynthDef>>,
    pub controls: BTreeMap<String, f32>,
}

/// A lazy, possibly infinite, sequence of events.
pub trait EventPattern {
    fn events(&self) -> Box<dyn Iterator<Item = PatternEvent> + '_>;

    /// Release time of a group wrapping every event, if one is wanted.
    fn group_release_time(&self) -> Option<f64> {
        None
    }
}

/// Values for one key of a [`Bind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Stream {
    /// The same value forever.
    Constant(f64),
    /// Each value once, then the stream ends.
    Sequence(Vec<f64>),
}

impl Stream {
    /// Value at step `index`, or `None` once the stream has ended.
    pub fn value(&self, index: usize) -> Option<f64> {
        match self {
            Stream::Constant(value) => Some(*value),
            Stream::Sequence(values) => values.get(index).copied(),
        }
    }
}

impl From<f64> for Stream {
    fn from(value: f64) -> Self {
        Stream::Constant(value)
    }
}

impl From<Vec<f64>> for Stream {
    fn from(values: Vec<f64>) -> Self {
        Stream::Sequence(values)
    }
}

/// Binds streams to event keys; ends when any stream ends.
///
/// `delta` and `duration` default to each other, and to one second when
/// neither is given.
#[derive(Debug, Clone, Default)]
pub struct Bind {
    delta: Option<Stream>,
    duration: Option<Stream>,
    synthdef: Option<Arc<SynthDef>>,
    controls: BTreeMap<String, Stream>,
    group_release: Option<f64>,
}

impl Bind {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delta(mut self, delta: impl Into<Stream>) -> Self {
        self.delta = Some(delta.into());
        self
    }

    pub fn duration(mut self, duration: impl Into<Stream>) -> Self {
        self.duration = Some(duration.into());
        self
    }

    pub fn synthdef(mut self, synthdef: Arc<SynthDef>) -> Self {
        self.synthdef = Some(synthdef);
        self
    }

    pub fn control(mut self, name: impl Into<String>, values: impl Into<Stream>) -> Self {
        self.controls.insert(name.into(), values.into());
        self
    }

    /// Wrap the events in a group released [`DEFAULT_RELEASE_TIME`] after
    /// the last one.
    pub fn with_group(self) -> Self {
        self.with_group_release(DEFAULT_RELEASE_TIME)
    }

    pub fn with_group_release(mut self, release_time: f64) -> Self {
        self.group_release = Some(release_time);
        self
    }

    fn event(&self, index: usize) -> Option<PatternEvent> {
        let delta = step(self.delta.as_ref(), index)?;
        let duration = step(self.duration.as_ref(), index)?;
        let mut controls = BTreeMap::new();
        for (name, stream) in &self.controls {
            controls.insert(name.clone(), stream.value(index)? as f32);
        }
        Some(PatternEvent {
            delta: delta.or(duration).unwrap_or(1.0),
            duration: duration.or(delta).unwrap_or(1.0),
            synthdef: self.synthdef.clone(),
            controls,
        })
    }
}

/// `Some(None)` for an unset key, `None` once a set stream has ended.
fn step(stream: Option<&Stream>, index: usize) -> Option<Option<f64>> {
    match stream {
        Some(stream) => stream.value(index).map(Some),
        None => Some(None),
    }
}

impl EventPattern for Bind {
    fn events(&self) -> Box<dyn Iterator<Item = PatternEvent> + '_> {
        Box::new((0..).map_while(move |index| self.event(index)))
    }

    fn group_release_time(&self) -> Option<f64> {
        self.group_release
    }
}

impl Session {
    /// Place `pattern`'s events from the active offset until `duration`
    /// seconds have passed.
    ///
    /// Returns the created nodes, the wrapping group first when there is one.
    pub fn inscribe<P: EventPattern + ?Sized>(
        &mut self,
        pattern: &P,
        duration: f64,
    ) -> Result<Vec<NodeId>> {
        let start = self.active_offset()?;
        if !duration.is_finite() || duration < 0.0 {
            return Err(SessionError::InvalidDuration(duration));
        }
        let end = start.advance(duration);

        let mut cursor = start;
        let mut stalled = 0;
        let mut placed = Vec::new();
        for event in pattern.events() {
            if end.as_f64() - cursor.as_f64() <= END_TOLERANCE {
                break;
            }
            if !event.delta.is_finite() || event.delta < 0.0 {
                return Err(SessionError::InvalidDelta(event.delta));
            }
            stalled = if event.delta == 0.0 { stalled + 1 } else { 0 };
            if stalled > MAX_EVENTS_PER_INSTANT {
                return Err(SessionError::InvalidDelta(event.delta));
            }
            let offset = cursor;
            cursor = cursor.advance(event.delta);
            placed.push((offset, event));
        }

        let last = if end.as_f64() - cursor.as_f64() <= END_TOLERANCE {
            end
        } else {
            cursor
        };

        let mut created = Vec::with_capacity(placed.len() + 1);
        let target = match pattern.group_release_time() {
            Some(release) => {
                let lifetime = last.as_f64() - start.as_f64() + release;
                let mut moment = self.at(start.as_f64())?;
                let group = moment.add_group(NodeId::ROOT, GroupOptions::new().duration(lifetime))?;
                created.push(group);
                group
            }
            None => NodeId::ROOT,
        };

        let mut fallback: Option<Arc<SynthDef>> = None;
        for (offset, event) in placed {
            let synthdef = match event.synthdef {
                Some(synthdef) => synthdef,
                None => match &fallback {
                    Some(synthdef) => Arc::clone(synthdef),
                    None => {
                        let synthdef = Arc::new(default_synthdef()?);
                        fallback = Some(Arc::clone(&synthdef));
                        synthdef
                    }
                },
            };
            let mut options = SynthOptions::new(synthdef)
                .add_action(AddAction::AddToTail)
                .duration(event.duration);
            options.controls = event
                .controls
                .into_iter()
                .map(|(name, value)| (name, ControlValue::Number(value)))
                .collect();
            let mut moment = self.at(offset.as_f64())?;
            created.push(moment.add_synth(target, options)?);
        }

        log::debug!(
            "[SESSION] Inscribed {} nodes from {} to {}",
            created.len(),
            start,
            last
        );
        Ok(created)
    }
}
