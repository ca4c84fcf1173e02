//! Per-attribute event history.
//!
//! An [`EventStore`] records the values one node attribute takes over the
//! node's lifetime, keyed by offsets relative to the node's start.

use crate::bus::ControlValue;
use crate::timing::RelativeOffset;

/// Offset-sorted `(offset, value)` pairs for one node attribute.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventStore {
    events: Vec<(RelativeOffset, ControlValue)>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` at `offset`, overwriting any value already there.
    ///
    /// Offsets outside `[0, duration]` fall outside the node's lifetime and
    /// are ignored; the return value tells whether the store changed.
    pub fn set(&mut self, offset: RelativeOffset, value: ControlValue, duration: f64) -> bool {
        let seconds = offset.as_f64();
        if !(0.0..=duration).contains(&seconds) {
            log::trace!(
                "[EVENTS] Ignoring value at {} outside lifetime {}",
                seconds,
                duration
            );
            return false;
        }
        match self.events.binary_search_by(|(o, _)| o.cmp(&offset)) {
            Ok(index) => self.events[index].1 = value,
            Err(index) => self.events.insert(index, (offset, value)),
        }
        true
    }

    /// Value in effect at `offset`: the latest entry at or before it.
    ///
    /// Falls back to `default` when no entry precedes `offset`.
    pub fn get(
        &self,
        offset: RelativeOffset,
        default: Option<ControlValue>,
    ) -> Option<ControlValue> {
        let index = self.events.partition_point(|(o, _)| *o <= offset);
        match index {
            0 => default,
            _ => Some(self.events[index - 1].1),
        }
    }

    /// Value recorded exactly at `offset`, if any.
    pub fn at(&self, offset: RelativeOffset) -> Option<ControlValue> {
        self.events
            .binary_search_by(|(o, _)| o.cmp(&offset))
            .ok()
            .map(|index| self.events[index].1)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate entries in offset order.
    pub fn iter(&self) -> impl Iterator<Item = (RelativeOffset, ControlValue)> + '_ {
        self.events.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(seconds: f64) -> RelativeOffset {
        RelativeOffset::new(seconds)
    }

    fn num(value: f32) -> ControlValue {
        ControlValue::Number(value)
    }

    fn store() -> EventStore {
        let mut store = EventStore::new();
        store.set(rel(10.0), num(3.0), 20.0);
        store.set(rel(0.0), num(1.0), 20.0);
        store.set(rel(5.0), num(2.0), 20.0);
        store
    }

    #[test]
    fn test_nearest_prior_lookup() {
        let store = store();
        let default = Some(num(-1.0));
        assert_eq!(store.get(rel(3.0), default), Some(num(1.0)));
        assert_eq!(store.get(rel(5.0), default), Some(num(2.0)));
        assert_eq!(store.get(rel(7.0), default), Some(num(2.0)));
        assert_eq!(store.get(rel(10.0), default), Some(num(3.0)));
        assert_eq!(store.get(rel(-1.0), default), Some(num(-1.0)));
        assert_eq!(EventStore::new().get(rel(3.0), None), None);
    }

    #[test]
    fn test_overwrite_keeps_one_entry() {
        let mut store = store();
        assert!(store.set(rel(5.0), num(4.0), 20.0));
        assert_eq!(store.len(), 3);
        assert_eq!(store.at(rel(5.0)), Some(num(4.0)));
    }

    #[test]
    fn test_out_of_range_set_is_ignored() {
        let mut store = EventStore::new();
        store.set(rel(1.0), num(0.5), 4.0);
        assert!(!store.set(rel(5.0), num(9.0), 4.0));
        assert!(!store.set(rel(-0.5), num(9.0), 4.0));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(rel(6.0), None), Some(num(0.5)));
    }

    #[test]
    fn test_set_at_duration_boundary() {
        let mut store = EventStore::new();
        assert!(store.set(rel(4.0), num(0.0), 4.0));
        assert!(store.set(rel(100.0), num(0.0), f64::INFINITY));
    }

    #[test]
    fn test_get_is_idempotent() {
        let store = store();
        let first: Vec<_> = (0..12).map(|i| store.get(rel(i as f64), None)).collect();
        let second: Vec<_> = (0..12).map(|i| store.get(rel(i as f64), None)).collect();
        assert_eq!(first, second);
        assert_eq!(store.iter().count(), 3);
    }
}
