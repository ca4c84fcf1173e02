//! UGen graphs as plain data.
//!
//! A [`GraphBuilder`] collects parameters, constants and UGens in
//! evaluation order and produces a [`GraphIR`], the frozen form the
//! encoder and the content hash work on.

use super::errors::*;
use std::collections::HashMap;

/// How often a UGen computes. Ordered slowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rate {
    /// Once, when the synth starts.
    Scalar = 0,
    /// Once per control block.
    Control = 1,
    /// Every sample.
    Audio = 2,
}

impl Rate {
    /// Rate byte as written in a compiled definition.
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Rate::Scalar),
            1 => Some(Rate::Control),
            2 => Some(Rate::Audio),
            _ => None,
        }
    }
}

/// One UGen input slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Input {
    Constant(f32),
    /// Output `output_index` of the UGen at `node_id`.
    Node { node_id: u32, output_index: u32 },
}

impl From<f32> for Input {
    fn from(value: f32) -> Self {
        Input::Constant(value)
    }
}

/// Handle to a UGen added to a [`GraphBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UGenRef(pub u32);

impl UGenRef {
    /// Reference a specific output of a multi-output UGen.
    pub fn output(self, index: u32) -> Input {
        Input::Node {
            node_id: self.0,
            output_index: index,
        }
    }
}

impl From<UGenRef> for Input {
    fn from(node: UGenRef) -> Self {
        node.output(0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UGenNode {
    /// Server-side class name, e.g. `SinOsc`.
    pub name: String,
    pub rate: Rate,
    pub inputs: Vec<Input>,
    pub num_outputs: u32,
    /// Operator selector for the operator UGens, 0 elsewhere.
    pub special_index: i16,
}

/// A named control and its initial value.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub default: f32,
    /// Output slot of the `Control` UGen.
    pub index: usize,
}

/// Incremental graph construction.
///
/// Parameters must be declared before the first UGen is added; the
/// `Control` UGen that exposes them always sits at index 0.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<UGenNode>,
    constants: Vec<f32>,
    params: Vec<ParamSpec>,
    param_map: HashMap<String, usize>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `value` in the constant table, adding it if new.
    pub fn add_constant(&mut self, value: f32) -> usize {
        if let Some(index) = self.constants.iter().position(|&c| c == value) {
            return index;
        }
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Declare a control parameter and return an input reading it.
    pub fn add_param(&mut self, name: impl Into<String>, default: f32) -> Result<Input> {
        let name = name.into();
        if !self.nodes.is_empty() {
            return Err(SynthDefError::LateParam(name));
        }
        if self.param_map.contains_key(&name) {
            return Err(SynthDefError::DuplicateParam(name));
        }
        let index = self.params.len();
        self.params.push(ParamSpec {
            name: name.clone(),
            default,
            index,
        });
        self.param_map.insert(name, index);
        Ok(Input::Node {
            node_id: 0,
            output_index: index as u32,
        })
    }

    /// Look up an input reading a previously declared parameter.
    pub fn param(&self, name: &str) -> Result<Input> {
        self.param_map
            .get(name)
            .map(|&index| Input::Node {
                node_id: 0,
                output_index: index as u32,
            })
            .ok_or_else(|| SynthDefError::UnknownParam(name.to_string()))
    }

    /// Append a UGen; constant inputs land in the constant table.
    pub fn add_ugen(
        &mut self,
        name: impl Into<String>,
        rate: Rate,
        inputs: Vec<Input>,
        num_outputs: u32,
        special_index: i16,
    ) -> UGenRef {
        self.ensure_control_ugen();
        for input in &inputs {
            if let Input::Constant(value) = input {
                self.add_constant(*value);
            }
        }
        let id = self.nodes.len() as u32;
        self.nodes.push(UGenNode {
            name: name.into(),
            rate,
            inputs,
            num_outputs,
            special_index,
        });
        UGenRef(id)
    }

    /// Fastest rate among `inputs`; operator UGens run at this rate.
    pub fn max_rate_from_inputs(&self, inputs: &[Input]) -> Rate {
        inputs
            .iter()
            .map(|input| match input {
                Input::Constant(_) => Rate::Scalar,
                Input::Node { node_id, .. } => self
                    .nodes
                    .get(*node_id as usize)
                    .map(|n| n.rate)
                    .unwrap_or(Rate::Scalar),
            })
            .max()
            .unwrap_or(Rate::Scalar)
    }

    /// Finish the graph under the given name.
    pub fn build(mut self, name: impl Into<String>) -> Result<GraphIR> {
        self.ensure_control_ugen();
        let ir = GraphIR {
            name: name.into(),
            constants: self.constants,
            params: self.params,
            nodes: self.nodes,
        };
        ir.validate()?;
        Ok(ir)
    }

    fn ensure_control_ugen(&mut self) {
        if self.params.is_empty() || !self.nodes.is_empty() {
            return;
        }
        self.nodes.push(UGenNode {
            name: "Control".to_string(),
            rate: Rate::Control,
            inputs: Vec::new(),
            num_outputs: self.params.len() as u32,
            special_index: 0,
        });
    }
}

/// A finished graph.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphIR {
    pub name: String,
    pub constants: Vec<f32>,
    pub params: Vec<ParamSpec>,
    /// UGens in evaluation order; inputs only point backwards.
    pub nodes: Vec<UGenNode>,
}

impl GraphIR {
    /// Return a copy of this graph under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Check the control layout and that every input resolves.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(SynthDefError::ValidationError(message));
        if !self.params.is_empty() {
            match self.nodes.first() {
                Some(control) if control.name == "Control" && control.rate == Rate::Control => {
                    if control.num_outputs as usize != self.params.len() {
                        return invalid(format!(
                            "{} parameters but Control has {} outputs",
                            self.params.len(),
                            control.num_outputs
                        ));
                    }
                }
                _ => return invalid(format!("'{}' has parameters but no leading Control", self.name)),
            }
        }

        for (position, node) in self.nodes.iter().enumerate() {
            for input in &node.inputs {
                let problem = match *input {
                    Input::Constant(value) if !self.constants.contains(&value) => {
                        Some(format!("constant {} is not in the table", value))
                    }
                    Input::Node { node_id, .. } if node_id as usize >= position => {
                        Some(format!("input from later UGen {}", node_id))
                    }
                    Input::Node {
                        node_id,
                        output_index,
                    } if output_index >= self.nodes[node_id as usize].num_outputs => {
                        Some(format!("UGen {} has no output {}", node_id, output_index))
                    }
                    _ => None,
                };
                if let Some(problem) = problem {
                    return invalid(format!("{} #{}: {}", node.name, position, problem));
                }
            }
        }
        Ok(())
    }
}
