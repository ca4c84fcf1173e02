//! nrtscore-core - Non-realtime session scheduling for SuperCollider scores.
//!
//! This crate turns a declarative timeline of nodes into the timestamped
//! command bundles scsynth replays in non-realtime mode:
//!
//! - **Timing** - session-absolute and node-relative offsets
//! - **Bus** - session buses and bus-mapped control values
//! - **Events** - per-attribute value history of a node
//! - **Node** - groups and synths with a start and a lifetime
//! - **State** - per-offset start/stop sets and the lazily built node graph
//! - **Session** - the timeline, `at()` moments and node operations
//! - **Render** - per-offset command lists and plain-data output
//! - **Dot** - Graphviz view of the node tree at one offset
//! - **Score** - length-prefixed OSC score files and archives
//! - **Pattern** - event patterns inscribed onto a session
//!
//! # Architecture
//!
//! Structural changes are recorded as actions on the [`State`] of the
//! offset they happen at. A state's node graph is only rebuilt
//! ("desparsified") from the nearest earlier materialized state when
//! something asks for it, and rendering replays every state in order.

pub mod bus;
pub mod config;
pub mod dot;
pub mod error;
pub mod events;
pub mod node;
pub mod pattern;
pub mod render;
pub mod requests;
pub mod score;
pub mod session;
pub mod state;
pub mod timing;

pub use bus::{Bus, BusAllocator, BusGroup, BusRate, ControlValue};
pub use config::SessionOptions;
pub use error::{Result, SessionError};
pub use events::EventStore;
pub use node::{GroupOptions, Node, NodeId, NodeKind, SynthOptions};
pub use pattern::{Bind, EventPattern, PatternEvent, Stream, DEFAULT_RELEASE_TIME};
pub use render::Timeline;
pub use requests::{AddAction, Controls, Request};
pub use score::Score;
pub use session::{Moment, Session};
pub use state::{NodeAction, NodeGraph, State, Topology};
pub use timing::{offset_to_osc_time, AbsoluteOffset, RelativeOffset};

pub use nrtscore_dsp::{dc_synthdef, default_synthdef, SynthDef};
