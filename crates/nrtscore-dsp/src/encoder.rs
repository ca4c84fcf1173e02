//! `SCgf` version 2 writer.
//!
//! Layout of one file holding one definition: magic, version, definition
//! count, then name, constants, parameter defaults, parameter names,
//! UGens and an empty variant table. All integers are big-endian.

use super::errors::*;
use super::graph::*;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

/// Compile `ir` into the bytes a `/d_recv` request carries.
pub fn encode_synthdef(ir: &GraphIR) -> Result<Vec<u8>> {
    ir.validate()?;

    let mut buf = Vec::new();
    buf.write_all(b"SCgf").map_err(encoding("header"))?;
    buf.write_i32::<BigEndian>(2).map_err(encoding("version"))?;
    buf.write_i16::<BigEndian>(1).map_err(encoding("def count"))?;

    encode_graph(&mut buf, ir)?;

    Ok(buf)
}

fn encoding(what: &'static str) -> impl Fn(std::io::Error) -> SynthDefError {
    move |e| SynthDefError::EncodingError(format!("Failed to write {}: {}", what, e))
}

fn encode_graph(buf: &mut Vec<u8>, ir: &GraphIR) -> Result<()> {
    write_pstring(buf, &ir.name)?;

    buf.write_i32::<BigEndian>(ir.constants.len() as i32)
        .map_err(encoding("constant count"))?;
    for &c in &ir.constants {
        buf.write_f32::<BigEndian>(c).map_err(encoding("constant"))?;
    }

    // Parameter defaults, then names with their slot index
    buf.write_i32::<BigEndian>(ir.params.len() as i32)
        .map_err(encoding("param count"))?;
    for param in &ir.params {
        buf.write_f32::<BigEndian>(param.default)
            .map_err(encoding("param default"))?;
    }
    buf.write_i32::<BigEndian>(ir.params.len() as i32)
        .map_err(encoding("param name count"))?;
    for param in &ir.params {
        write_pstring(buf, &param.name)?;
        buf.write_i32::<BigEndian>(param.index as i32)
            .map_err(encoding("param name index"))?;
    }

    buf.write_i32::<BigEndian>(ir.nodes.len() as i32)
        .map_err(encoding("ugen count"))?;
    for node in &ir.nodes {
        encode_ugen(buf, node, &ir.constants)?;
    }

    // Variants
    buf.write_i16::<BigEndian>(0).map_err(encoding("variant count"))?;

    Ok(())
}

fn encode_ugen(buf: &mut Vec<u8>, node: &UGenNode, constants: &[f32]) -> Result<()> {
    write_pstring(buf, &node.name)?;
    buf.write_i8(node.rate.as_byte() as i8)
        .map_err(encoding("ugen rate"))?;
    buf.write_i32::<BigEndian>(node.inputs.len() as i32)
        .map_err(encoding("input count"))?;
    buf.write_i32::<BigEndian>(node.num_outputs as i32)
        .map_err(encoding("output count"))?;
    buf.write_i16::<BigEndian>(node.special_index)
        .map_err(encoding("special index"))?;

    // Constants are addressed as source -1
    for input in &node.inputs {
        let (source, index) = match input {
            Input::Constant(value) => {
                let slot = constants.iter().position(|c| c == value).ok_or_else(|| {
                    SynthDefError::EncodingError(format!("no table slot for constant {}", value))
                })?;
                (-1, slot as i32)
            }
            Input::Node {
                node_id,
                output_index,
            } => (*node_id as i32, *output_index as i32),
        };
        buf.write_i32::<BigEndian>(source)
            .map_err(encoding("input source"))?;
        buf.write_i32::<BigEndian>(index)
            .map_err(encoding("input index"))?;
    }

    for _ in 0..node.num_outputs {
        buf.write_i8(node.rate.as_byte() as i8)
            .map_err(encoding("output rate"))?;
    }

    Ok(())
}

/// Length-prefixed string, at most 255 bytes.
fn write_pstring(buf: &mut Vec<u8>, text: &str) -> Result<()> {
    let bytes = text.as_bytes();
    let len = u8::try_from(bytes.len()).map_err(|_| {
        SynthDefError::EncodingError(format!("'{}' exceeds 255 bytes", text))
    })?;
    buf.write_u8(len).map_err(encoding("string length"))?;
    buf.write_all(bytes).map_err(encoding("string"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let ir = GraphBuilder::new().build("empty").unwrap();
        let bytes = encode_synthdef(&ir).unwrap();

        assert_eq!(&bytes[0..4], b"SCgf");
        assert_eq!(bytes[4..8], [0, 0, 0, 2]);
        assert_eq!(bytes[8..10], [0, 1]);
        assert_eq!(bytes[10], 5);
        assert_eq!(&bytes[11..16], b"empty");
    }

    #[test]
    fn test_pstring_limits() {
        let mut buf = Vec::new();
        write_pstring(&mut buf, "gate").unwrap();
        assert_eq!(buf, b"\x04gate");
        assert!(write_pstring(&mut buf, &"x".repeat(255)).is_ok());
        assert!(write_pstring(&mut buf, &"x".repeat(256)).is_err());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let build = || {
            let mut builder = GraphBuilder::new();
            let dc = builder.add_ugen("DC", Rate::Audio, vec![Input::Constant(1.0)], 1, 0);
            builder.add_ugen("Out", Rate::Audio, vec![Input::Constant(0.0), dc.into()], 0, 0);
            encode_synthdef(&builder.build("dc").unwrap()).unwrap()
        };
        assert_eq!(build(), build());
    }
}
