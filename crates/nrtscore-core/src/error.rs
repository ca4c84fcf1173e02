//! Error types for session building and rendering.
//!
//! Every variant except the wrapped external failures is a usage error:
//! the caller asked for something the session cannot represent. None of
//! them are retried.

use crate::node::NodeId;
use crate::requests::AddAction;
use nrtscore_dsp::SynthDefError;
use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that can occur while building or rendering a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A node or attribute operation ran outside of `Session::at`.
    #[error("No active moment: node operations must run inside Session::at")]
    NoActiveMoment,

    /// Offsets must be finite and non-negative.
    #[error("Invalid offset: {0}")]
    InvalidOffset(f64),

    /// Durations must be non-negative (infinity allowed).
    #[error("Invalid duration: {0}")]
    InvalidDuration(f64),

    /// The session holds no state at this offset.
    #[error("Offset {0} is not tracked by this session")]
    UntrackedOffset(f64),

    /// The node id was never issued by this session.
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    /// The node exists but is not part of the node tree at this offset.
    #[error("Node {node} is not present at offset {offset}")]
    NodeNotPresent { node: NodeId, offset: f64 },

    /// Moving a node below itself or one of its descendants.
    #[error("Can't add {node} to {target} at offset {offset}: {node} is an ancestor of {target}")]
    Cycle {
        node: NodeId,
        target: NodeId,
        offset: f64,
    },

    /// The target can't receive nodes with this add action.
    #[error("Invalid target {target} for {add_action:?}")]
    InvalidTarget {
        target: NodeId,
        add_action: AddAction,
    },

    /// The synth's definition declares no such control.
    #[error("Node {node} has no parameter '{name}'")]
    UnknownParameter { node: NodeId, name: String },

    /// Bus groups hold at least one bus.
    #[error("Invalid bus count: {0}")]
    InvalidBusCount(usize),

    /// A pattern produced a negative or non-finite delta.
    #[error("Invalid pattern delta: {0}")]
    InvalidDelta(f64),

    /// SynthDef construction or decoding failed.
    #[error("SynthDef error: {0}")]
    SynthDef(#[from] SynthDefError),

    /// OSC encoding failed.
    #[error("OSC encoding error: {0}")]
    Encoding(#[from] rosc::OscError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
