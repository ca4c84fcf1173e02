//! Reader for compiled SynthDef v2 files.
//!
//! Only the parts the scheduler needs are decoded: the definition name and
//! its parameter schema. The UGen section is left untouched.

use super::errors::*;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

/// Name and parameter schema read from a compiled SynthDef.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthDefHeader {
    /// SynthDef name.
    pub name: String,
    /// Parameter names and defaults, ordered by slot index.
    pub parameters: Vec<(String, f32)>,
}

/// Decode the name and parameters of the first definition in `bytes`.
pub fn decode_header(bytes: &[u8]) -> Result<SynthDefHeader> {
    let mut cursor = Cursor::new(bytes);

    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic).map_err(decoding("header"))?;
    if &magic != b"SCgf" {
        return Err(SynthDefError::DecodingError(
            "Missing SCgf magic".to_string(),
        ));
    }
    let version = cursor
        .read_i32::<BigEndian>()
        .map_err(decoding("version"))?;
    if version != 2 {
        return Err(SynthDefError::DecodingError(format!(
            "Unsupported SynthDef version {}",
            version
        )));
    }
    let count = cursor
        .read_i16::<BigEndian>()
        .map_err(decoding("def count"))?;
    if count < 1 {
        return Err(SynthDefError::DecodingError(
            "File contains no definitions".to_string(),
        ));
    }

    let name = read_pstring(&mut cursor)?;

    let constant_count = read_count(&mut cursor, "constant count")?;
    for _ in 0..constant_count {
        cursor
            .read_f32::<BigEndian>()
            .map_err(decoding("constant"))?;
    }

    let slot_count = read_count(&mut cursor, "param count")?;
    let mut defaults = Vec::new();
    for _ in 0..slot_count {
        defaults.push(
            cursor
                .read_f32::<BigEndian>()
                .map_err(decoding("param default"))?,
        );
    }

    let name_count = read_count(&mut cursor, "param name count")?;
    let mut named = Vec::new();
    for _ in 0..name_count {
        let param_name = read_pstring(&mut cursor)?;
        let index = read_count(&mut cursor, "param index")?;
        let default = *defaults.get(index).ok_or_else(|| {
            SynthDefError::DecodingError(format!(
                "Parameter '{}' points at missing slot {}",
                param_name, index
            ))
        })?;
        named.push((index, param_name, default));
    }
    named.sort_by_key(|(index, _, _)| *index);

    Ok(SynthDefHeader {
        name,
        parameters: named
            .into_iter()
            .map(|(_, name, default)| (name, default))
            .collect(),
    })
}

fn decoding(what: &'static str) -> impl Fn(std::io::Error) -> SynthDefError {
    move |e| SynthDefError::DecodingError(format!("Failed to read {}: {}", what, e))
}

fn read_count(cursor: &mut Cursor<&[u8]>, what: &'static str) -> Result<usize> {
    let value = cursor.read_i32::<BigEndian>().map_err(decoding(what))?;
    usize::try_from(value)
        .map_err(|_| SynthDefError::DecodingError(format!("Negative {}: {}", what, value)))
}

fn read_pstring(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cursor.read_u8().map_err(decoding("string length"))? as usize;
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes).map_err(decoding("string"))?;
    String::from_utf8(bytes)
        .map_err(|e| SynthDefError::DecodingError(format!("Invalid UTF-8 in string: {}", e)))
}
