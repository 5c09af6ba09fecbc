//! # Script Model
//!
//! Tapscripts are [`elements::Script`] values assembled with
//! [`elements::script::Builder`]. This module adds the space separated ASM
//! dialect the command line speaks, minimal data pushes and script numbers.
//!
//! ## ASM format
//!
//! ```text
//! OP_1 OP_ROLL ac OP_CAT OP_SWAP
//! ```
//!
//! Tokens starting with `OP_` are opcodes; anything else must be hex and is
//! pushed as data with the smallest encoding, so `ac` becomes `01ac` and `01`
//! becomes `OP_1`.
//!
//! Parsed bytes are kept verbatim: a script decoded with
//! [`ScriptExt::from_bytes`] serializes back to exactly the bytes it came
//! from, non-minimal pushes included.

use crate::error::{CovenantError, CovenantResult};
use elements::opcodes::{self, All};
use elements::script::Instruction;
use lazy_static::lazy_static;
use std::collections::HashMap;

pub use elements::opcodes::all;
pub use elements::script::Builder;
pub use elements::Script;

lazy_static! {
    /// Opcode names accepted in ASM, including the common aliases
    static ref OPCODES_BY_NAME: HashMap<String, All> = {
        let mut names = HashMap::new();
        for code in all::OP_PUSHDATA1.into_u8()..=u8::MAX {
            let opcode = All::from(code);
            let name = format!("{opcode:?}");
            // undefined bytes render as OP_RETURN_<n>
            if !name.starts_with("OP_RETURN_") {
                names.insert(name, opcode);
            }
        }
        names.insert("OP_0".to_string(), opcodes::OP_FALSE);
        names.insert("OP_FALSE".to_string(), opcodes::OP_FALSE);
        names.insert("OP_TRUE".to_string(), opcodes::OP_TRUE);
        names.insert("OP_1NEGATE".to_string(), all::OP_PUSHNUM_NEG1);
        for n in 1..=16u8 {
            names.insert(format!("OP_{n}"), small_int(n));
        }
        names.insert("OP_CHECKLOCKTIMEVERIFY".to_string(), all::OP_CLTV);
        names.insert("OP_CHECKSEQUENCEVERIFY".to_string(), all::OP_CSV);
        names
    };
}

/// `OP_1`..`OP_16` for `n` in 1..=16
fn small_int(n: u8) -> All {
    All::from(all::OP_PUSHNUM_1.into_u8() + n - 1)
}

fn is_pushdata(opcode: All) -> bool {
    opcode == all::OP_PUSHDATA1 || opcode == all::OP_PUSHDATA2 || opcode == all::OP_PUSHDATA4
}

/// Look up an opcode by its ASM name
pub fn opcode_from_name(name: &str) -> Option<All> {
    OPCODES_BY_NAME.get(name).copied()
}

/// ASM name of a non-push opcode
pub fn opcode_name(opcode: All) -> String {
    let code = opcode.into_u8();
    if code == all::OP_PUSHNUM_NEG1.into_u8() {
        "OP_1NEGATE".to_string()
    } else if (all::OP_PUSHNUM_1.into_u8()..=all::OP_PUSHNUM_16.into_u8()).contains(&code) {
        format!("OP_{}", code - all::OP_PUSHNUM_1.into_u8() + 1)
    } else {
        format!("{opcode:?}")
    }
}

/// Push data with minimal encoding.
///
/// Empty data becomes `OP_0`, a single byte 1..=16 becomes `OP_N` and
/// `0x81` becomes `OP_1NEGATE`.
pub fn push_minimal(builder: Builder, data: &[u8]) -> Builder {
    match data {
        [] => builder.push_opcode(opcodes::OP_FALSE),
        [n @ 1..=16] => builder.push_opcode(small_int(*n)),
        [0x81] => builder.push_opcode(all::OP_PUSHNUM_NEG1),
        _ => builder.push_slice(data),
    }
}

/// ASM parsing and rendering on top of [`Script`]
pub trait ScriptExt: Sized {
    /// Parse space separated ASM
    fn from_asm(asm: &str) -> CovenantResult<Self>;

    /// Take serialized script bytes as they are, rejecting truncated pushes
    fn from_bytes(bytes: &[u8]) -> CovenantResult<Self>;

    fn to_asm(&self) -> String;

    fn to_hex(&self) -> String;

    /// Whether the serialized bytes end with `suffix`'s serialized bytes
    fn ends_with(&self, suffix: &Self) -> bool;
}

impl ScriptExt for Script {
    fn from_asm(asm: &str) -> CovenantResult<Self> {
        let mut builder = Builder::new();
        for token in asm.split_whitespace() {
            if token.starts_with("OP_") {
                let opcode = opcode_from_name(token)
                    .ok_or_else(|| CovenantError::script(format!("unknown opcode {token}")))?;
                if is_pushdata(opcode) {
                    return Err(CovenantError::script(format!(
                        "{token} cannot appear without its payload"
                    )));
                }
                builder = builder.push_opcode(opcode);
            } else {
                let data = hex::decode(token).map_err(|e| {
                    CovenantError::script(format!("invalid data token {token}: {e}"))
                })?;
                builder = push_minimal(builder, &data);
            }
        }
        Ok(builder.into_script())
    }

    fn from_bytes(bytes: &[u8]) -> CovenantResult<Self> {
        let script = Script::from(bytes.to_vec());
        for (position, instruction) in script.instructions().enumerate() {
            let instruction = instruction.map_err(|e| {
                CovenantError::script(format!("instruction {position} of {}: {e}", hex::encode(bytes)))
            })?;
            if let Instruction::Op(opcode) = instruction {
                if format!("{opcode:?}").starts_with("OP_RETURN_") {
                    return Err(CovenantError::script(format!(
                        "unknown opcode byte 0x{:02x}",
                        opcode.into_u8()
                    )));
                }
            }
        }
        Ok(script)
    }

    fn to_asm(&self) -> String {
        let mut tokens = Vec::new();
        for instruction in self.instructions() {
            match instruction {
                Ok(Instruction::PushBytes([])) => tokens.push("OP_0".to_string()),
                Ok(Instruction::PushBytes(data)) => tokens.push(hex::encode(data)),
                Ok(Instruction::Op(opcode)) => tokens.push(opcode_name(opcode)),
                Err(e) => {
                    tokens.push(format!("<{e}>"));
                    break;
                }
            }
        }
        tokens.join(" ")
    }

    fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    fn ends_with(&self, suffix: &Self) -> bool {
        self.as_bytes().ends_with(suffix.as_bytes())
    }
}

/// Minimal script number encoding (little-endian, sign bit in the top byte)
pub fn encode_scriptnum(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }

    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut out = Vec::new();
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }

    // Room for the sign bit
    if let Some(last) = out.last_mut() {
        if *last & 0x80 != 0 {
            out.push(if negative { 0x80 } else { 0x00 });
        } else if negative {
            *last |= 0x80;
        }
    }
    out
}

/// Decode a script number, rejecting non-minimal encodings
pub fn decode_scriptnum(bytes: &[u8]) -> CovenantResult<i64> {
    if bytes.len() > 8 {
        return Err(CovenantError::script(format!(
            "script number of {} bytes is too long",
            bytes.len()
        )));
    }
    let Some(&last) = bytes.last() else {
        return Ok(0);
    };
    if last & 0x7f == 0 && (bytes.len() == 1 || bytes[bytes.len() - 2] & 0x80 == 0) {
        return Err(CovenantError::script(format!(
            "non-minimal script number {}",
            hex::encode(bytes)
        )));
    }

    let mut magnitude: u64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        let byte = if i == bytes.len() - 1 { byte & 0x7f } else { *byte };
        magnitude |= (byte as u64) << (8 * i);
    }
    let magnitude = magnitude as i64;
    Ok(if last & 0x80 != 0 { -magnitude } else { magnitude })
}
