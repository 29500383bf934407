use crate::debug_println;
use crate::error::*;
use crate::leb128::*;
use crate::opcode::{ArgKind, Opcode};
use crate::source::*;
use crate::types::*;

/// Static (align, offset) descriptor of a memory-access instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemArg {
    pub align: u32,
    pub offset: u32,
}

/// Immediate of a `block`/`loop`. `len` counts the nested instructions
/// spliced into the flat sequence right after this one, including the
/// closing `end`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlockArg {
    pub result: Option<ValType>,
    pub len: u32,
}

/// Immediate of an `if`. `else_at` is the body-relative index the false
/// path jumps to: one past the `else` marker when present, the closing
/// `end` otherwise.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IfArg {
    pub result: Option<ValType>,
    pub len: u32,
    pub else_at: u32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Arg {
    None,
    Byte(u8),
    I32(i32),
    I64(i64),
    U32(u32),
    F32(f32),
    F64(f64),
    Mem(MemArg),
    Block(BlockArg),
    If(IfArg),
}

/// One decoded instruction: opcode tag plus its immediate payload.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Instruction {
    pub op: Opcode,
    pub arg: Arg,
}

pub type Expression = Vec<Instruction>;

fn read_block_result<S: ByteSource>(src: &mut S) -> Result<Option<ValType>, Error> {
    let byte = read_u8(src)?;
    if byte == BLOCK_TYPE_EMPTY {
        return Ok(None);
    }
    match val_type_from_byte(byte) {
        Some(ty) => Ok(Some(ty)),
        None => Err(Error::Malformed(INVALID_BLOCK_TYPE)),
    }
}

/// Decodes one instruction sequence up to and including its closing `end`.
/// Nested blocks are decoded recursively and spliced flat into the parent,
/// with their instruction count recorded on the block instruction.
pub fn decode_expression<S: ByteSource>(src: &mut S) -> Result<Expression, Error> {
    let (expr, else_at) = decode_sequence(src)?;
    if else_at.is_some() {
        return Err(Error::Malformed(ELSE_OUTSIDE_IF));
    }
    Ok(expr)
}

/// Like [`decode_expression`] but also reports the index of a top-level
/// `else`, which only an enclosing `if` may claim.
fn decode_sequence<S: ByteSource>(src: &mut S) -> Result<(Expression, Option<usize>), Error> {
    let mut out: Expression = Vec::new();
    let mut else_at: Option<usize> = None;

    loop {
        let byte = read_u8(src)?;
        let op = Opcode::from_byte(byte).ok_or(Error::Malformed(UNKNOWN_INSTRUCTION))?;
        debug_println!("decode pc {} op {:?}", src.tell() - 1, op);

        if op == Opcode::End {
            out.push(Instruction { op, arg: Arg::None });
            return Ok((out, else_at));
        }
        if op == Opcode::Else {
            if else_at.is_some() {
                return Err(Error::Malformed(ELSE_OUTSIDE_IF));
            }
            else_at = Some(out.len());
            out.push(Instruction { op, arg: Arg::None });
            continue;
        }

        let arg = match op.arg_kind() {
            ArgKind::None => Arg::None,
            ArgKind::Byte => Arg::Byte(read_u8(src)?),
            ArgKind::VarI32 => Arg::I32(decode_varint(src, 32)?),
            ArgKind::VarI64 => Arg::I64(decode_varint(src, 64)?),
            ArgKind::VarU32 => Arg::U32(decode_varuint(src, 32)?),
            ArgKind::F32 => Arg::F32(read_f32_le(src)?),
            ArgKind::F64 => Arg::F64(read_f64_le(src)?),
            ArgKind::MemArg => {
                let align = decode_varuint(src, 32)?;
                let offset = decode_varuint(src, 32)?;
                Arg::Mem(MemArg { align, offset })
            }
            ArgKind::Block => {
                let result = read_block_result(src)?;
                let (body, body_else) = decode_sequence(src)?;
                let len = body.len() as u32;
                let arg = match op {
                    Opcode::If => {
                        // the false path falls through to `end` when no
                        // else arm exists, so the label still gets popped
                        let else_at = match body_else {
                            Some(e) => e as u32 + 1,
                            None => len - 1,
                        };
                        Arg::If(IfArg { result, len, else_at })
                    }
                    _ => {
                        if body_else.is_some() {
                            return Err(Error::Malformed(ELSE_OUTSIDE_IF));
                        }
                        Arg::Block(BlockArg { result, len })
                    }
                };
                out.push(Instruction { op, arg });
                out.extend_from_slice(&body);
                continue;
            }
        };
        out.push(Instruction { op, arg });
    }
}
