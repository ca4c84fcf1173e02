//! Timing primitives for session scheduling.
//!
//! Two offset types keep session time and node time apart:
//!
//! - [`AbsoluteOffset`] - seconds from the start of the session
//! - [`RelativeOffset`] - seconds from the start of one node
//!
//! Both are totally ordered so they can key sorted maps.

use rosc::OscTime;
use std::cmp::Ordering;
use std::fmt;

macro_rules! offset_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default)]
        pub struct $name(f64);

        impl $name {
            /// Zero offset constant.
            pub const ZERO: $name = $name(0.0);

            /// Create an offset from seconds.
            #[inline]
            pub fn new(seconds: f64) -> Self {
                // Fold -0.0 into 0.0 so equal offsets share one map key
                Self(seconds + 0.0)
            }

            /// Get the offset in seconds.
            #[inline]
            pub fn as_f64(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.cmp(other) == Ordering::Equal
            }
        }

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.total_cmp(&other.0)
            }
        }

        impl From<f64> for $name {
            fn from(seconds: f64) -> Self {
                Self::new(seconds)
            }
        }

        impl From<$name> for f64 {
            fn from(offset: $name) -> Self {
                offset.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

offset_type!(
    /// Seconds since the start of the session.
    AbsoluteOffset
);

offset_type!(
    /// Seconds since the start of a node. Event stores are keyed by these.
    RelativeOffset
);

impl AbsoluteOffset {
    /// Offset of `self` as seen from a node starting at `start`.
    #[inline]
    pub fn relative_to(self, start: AbsoluteOffset) -> RelativeOffset {
        RelativeOffset::new(self.0 - start.0)
    }

    /// Move forward by `seconds`; infinity propagates.
    #[inline]
    pub fn advance(self, seconds: f64) -> Self {
        Self::new(self.0 + seconds)
    }
}

/// Convert session seconds to an OSC NTP timetag.
///
/// Score files carry times relative to the start of the render, so the
/// timetag's seconds field counts from zero.
pub fn offset_to_osc_time(offset: AbsoluteOffset) -> OscTime {
    let seconds = offset.as_f64().max(0.0);
    let whole = seconds.floor();
    let secs = whole as u32;
    let frac = ((seconds - whole) * (u32::MAX as f64)) as u32;
    OscTime::from((secs, frac))
}
