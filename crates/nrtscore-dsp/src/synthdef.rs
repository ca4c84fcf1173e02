//! Compiled SynthDef values.
//!
//! A [`SynthDef`] is the immutable end product of graph construction: a name,
//! an ordered parameter schema and the compiled bytes sent with `/d_recv`.
//! Many synth nodes share one definition through an `Arc`.

use crate::decoder::decode_header;
use crate::encoder::encode_synthdef;
use crate::errors::*;
use crate::graph::GraphIR;
use md5::{Digest, Md5};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

/// Name of the control that triggers a release envelope when set to zero.
pub const GATE: &str = "gate";

/// A named control and its default value.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default: f32,
}

/// A compiled synth definition.
///
/// Equality and hashing use the compiled bytes, so two definitions built
/// from identical graphs under the same name are interchangeable.
#[derive(Clone)]
pub struct SynthDef {
    name: String,
    parameters: Vec<Parameter>,
    bytes: Arc<[u8]>,
}

impl SynthDef {
    /// Compile a graph under its own name.
    pub fn compile(ir: &GraphIR) -> Result<Self> {
        let bytes = encode_synthdef(ir)?;
        Ok(Self::from_parts(ir, ir.name.clone(), bytes))
    }

    /// Compile a graph under a name derived from its content.
    ///
    /// The name is the hex digest of the graph compiled with an empty name,
    /// so structurally identical graphs always share a name.
    pub fn compile_anonymous(ir: &GraphIR) -> Result<Self> {
        let unnamed = encode_synthdef(&ir.renamed(""))?;
        let name = content_digest(&unnamed);
        let named = ir.renamed(name.clone());
        let bytes = encode_synthdef(&named)?;
        log::debug!("[SYNTHDEF] Compiled anonymous definition {}", name);
        Ok(Self::from_parts(&named, name, bytes))
    }

    /// Wrap already compiled bytes, reading name and schema from them.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let header = decode_header(&bytes)?;
        Ok(Self {
            name: header.name,
            parameters: header
                .parameters
                .into_iter()
                .map(|(name, default)| Parameter { name, default })
                .collect(),
            bytes: bytes.into(),
        })
    }

    /// Load a `.scsyndef` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    fn from_parts(ir: &GraphIR, name: String, bytes: Vec<u8>) -> Self {
        Self {
            name,
            parameters: ir
                .params
                .iter()
                .map(|p| Parameter {
                    name: p.name.clone(),
                    default: p.default,
                })
                .collect(),
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters in slot order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Default value of a parameter, if the definition declares it.
    pub fn parameter(&self, name: &str) -> Option<f32> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.default)
    }

    /// Whether the definition declares a `gate` control.
    pub fn has_gate(&self) -> bool {
        self.parameter(GATE).is_some()
    }

    /// The compiled SCgf bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for SynthDef {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for SynthDef {}

impl Hash for SynthDef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Debug for SynthDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthDef")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// MD5 digest rendered as 32 lowercase hex characters.
fn content_digest(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}
