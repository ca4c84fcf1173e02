//! nrtscore-dsp - SynthDef construction and binary encoding.
//!
//! This crate covers everything the scheduler needs to know about synth
//! definitions:
//!
//! - **Graph** - a small UGen graph IR and its builder
//! - **Encoder** - SynthDef v2 (`SCgf`) binary encoding
//! - **Decoder** - name and parameter schema of compiled definitions
//! - **SynthDef** - the immutable compiled value shared by synth nodes
//! - **Builtins** - the gated `default` voice and a gate-less DC source

pub mod builtins;
pub mod decoder;
pub mod encoder;
pub mod errors;
pub mod graph;
pub mod synthdef;

pub use builtins::{dc_synthdef, default_synthdef};
pub use decoder::{decode_header, SynthDefHeader};
pub use encoder::encode_synthdef;
pub use errors::{Result, SynthDefError};
pub use graph::{GraphBuilder, GraphIR, Input, ParamSpec, Rate, UGenNode, UGenRef};
pub use synthdef::{Parameter, SynthDef, GATE};
