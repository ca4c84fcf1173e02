//! Builtin synth definitions.
//!
//! [`default_synthdef`] mirrors SuperCollider's `default` instrument: a sine
//! tone with an ASR envelope released by setting `gate` to zero.
//! [`dc_synthdef`] has no gate and runs until it is freed.

use crate::errors::*;
use crate::graph::{GraphBuilder, Input, Rate};
use crate::synthdef::SynthDef;

/// BinaryOpUGen operator code for multiplication.
const MUL: i16 = 2;

/// Envelope curve shape number for numeric curves.
const CURVE_SHAPE: f32 = 5.0;

/// Loop node value meaning "no loop".
const NO_LOOP: f32 = -99.0;

/// Free the enclosing synth when the envelope finishes.
const DONE_FREE_SELF: f32 = 2.0;

/// Gated sine voice with `amplitude`, `frequency`, `gate`, `out` and `pan`.
pub fn default_synthdef() -> Result<SynthDef> {
    let mut builder = GraphBuilder::new();
    let amplitude = builder.add_param("amplitude", 0.1)?;
    let frequency = builder.add_param("frequency", 440.0)?;
    let gate = builder.add_param("gate", 1.0)?;
    let out = builder.add_param("out", 0.0)?;
    let pan = builder.add_param("pan", 0.5)?;

    // ASR: 10ms attack to full level, 1s release, curve -4
    let mut env_inputs = vec![
        gate,
        amplitude,
        Input::Constant(0.0),
        Input::Constant(1.0),
        Input::Constant(DONE_FREE_SELF),
    ];
    env_inputs.extend(
        [
            0.0, 2.0, 1.0, NO_LOOP, // init level, segments, release node, loop node
            1.0, 0.01, CURVE_SHAPE, -4.0, // attack
            0.0, 1.0, CURVE_SHAPE, -4.0, // release
        ]
        .into_iter()
        .map(Input::Constant),
    );
    let envelope = builder.add_ugen("EnvGen", Rate::Control, env_inputs, 1, 0);

    let sine = builder.add_ugen(
        "SinOsc",
        Rate::Audio,
        vec![frequency, Input::Constant(0.0)],
        1,
        0,
    );
    let mul_inputs = vec![sine.into(), envelope.into()];
    let mul_rate = builder.max_rate_from_inputs(&mul_inputs);
    let voice = builder.add_ugen("BinaryOpUGen", mul_rate, mul_inputs, 1, MUL);
    let panner = builder.add_ugen(
        "Pan2",
        Rate::Audio,
        vec![voice.into(), pan, Input::Constant(1.0)],
        2,
        0,
    );
    builder.add_ugen(
        "Out",
        Rate::Audio,
        vec![out, panner.output(0), panner.output(1)],
        0,
        0,
    );

    SynthDef::compile_anonymous(&builder.build("")?)
}

/// Constant signal on bus 0, without any controls.
pub fn dc_synthdef() -> Result<SynthDef> {
    let mut builder = GraphBuilder::new();
    let dc = builder.add_ugen("DC", Rate::Audio, vec![Input::Constant(1.0)], 1, 0);
    builder.add_ugen(
        "Out",
        Rate::Audio,
        vec![Input::Constant(0.0), dc.into()],
        0,
        0,
    );
    SynthDef::compile_anonymous(&builder.build("")?)
}
