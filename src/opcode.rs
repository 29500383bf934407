/// Opcode bytes understood by the decoder and the dispatch loop.
///
/// Floating-point arithmetic, conversions, and everything newer than the
/// MVP integer subset are deliberately absent: an opcode outside this table
/// fails decoding with `UNKNOWN_INSTRUCTION`.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Opcode {
    Unreachable = 0x00,
    Nop = 0x01,
    Block = 0x02,
    Loop = 0x03,
    If = 0x04,
    Else = 0x05,
    End = 0x0b,
    Br = 0x0c,
    BrIf = 0x0d,
    Return = 0x0f,
    Call = 0x10,
    Drop = 0x1a,
    Select = 0x1b,
    LocalGet = 0x20,
    LocalSet = 0x21,
    LocalTee = 0x22,
    GlobalGet = 0x23,
    GlobalSet = 0x24,
    I32Load = 0x28,
    I64Load = 0x29,
    I32Load8S = 0x2c,
    I32Load8U = 0x2d,
    I32Store = 0x36,
    I64Store = 0x37,
    MemorySize = 0x3f,
    MemoryGrow = 0x40,
    I32Const = 0x41,
    I64Const = 0x42,
    F32Const = 0x43,
    F64Const = 0x44,
    I32Eqz = 0x45,
    I32Eq = 0x46,
    I32Ne = 0x47,
    I32LtS = 0x48,
    I32LtU = 0x49,
    I32GtS = 0x4a,
    I32GtU = 0x4b,
    I32LeS = 0x4c,
    I32LeU = 0x4d,
    I32GeS = 0x4e,
    I32GeU = 0x4f,
    I64Eqz = 0x50,
    I64Eq = 0x51,
    I64Ne = 0x52,
    I64LtS = 0x53,
    I64LtU = 0x54,
    I64GtS = 0x55,
    I64GtU = 0x56,
    I64LeS = 0x57,
    I64LeU = 0x58,
    I64GeS = 0x59,
    I64GeU = 0x5a,
    I32Clz = 0x67,
    I32Ctz = 0x68,
    I32Popcnt = 0x69,
    I32Add = 0x6a,
    I32Sub = 0x6b,
    I32Mul = 0x6c,
    I32DivS = 0x6d,
    I32DivU = 0x6e,
    I32RemS = 0x6f,
    I32RemU = 0x70,
    I32And = 0x71,
    I32Or = 0x72,
    I32Xor = 0x73,
    I32Shl = 0x74,
    I32ShrS = 0x75,
    I32ShrU = 0x76,
    I32Rotl = 0x77,
    I32Rotr = 0x78,
    I64Clz = 0x79,
    I64Ctz = 0x7a,
    I64Popcnt = 0x7b,
    I64Add = 0x7c,
    I64Sub = 0x7d,
    I64Mul = 0x7e,
    I64DivS = 0x7f,
    I64DivU = 0x80,
    I64RemS = 0x81,
    I64RemU = 0x82,
    I64And = 0x83,
    I64Or = 0x84,
    I64Xor = 0x85,
    I64Shl = 0x86,
    I64ShrS = 0x87,
    I64ShrU = 0x88,
    I64Rotl = 0x89,
    I64Rotr = 0x8a,
}

/// Shape of the immediate bytes following an opcode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArgKind {
    None,
    /// Single raw byte (the reserved zero flag of memory.size/grow).
    Byte,
    VarI32,
    VarI64,
    VarU32,
    F32,
    F64,
    /// LEB128 align followed by LEB128 offset.
    MemArg,
    /// Block result type followed by a nested instruction sequence.
    Block,
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        use Opcode::*;
        Some(match byte {
            0x00 => Unreachable,
            0x01 => Nop,
            0x02 => Block,
            0x03 => Loop,
            0x04 => If,
            0x05 => Else,
            0x0b => End,
            0x0c => Br,
            0x0d => BrIf,
            0x0f => Return,
            0x10 => Call,
            0x1a => Drop,
            0x1b => Select,
            0x20 => LocalGet,
            0x21 => LocalSet,
            0x22 => LocalTee,
            0x23 => GlobalGet,
            0x24 => GlobalSet,
            0x28 => I32Load,
            0x29 => I64Load,
            0x2c => I32Load8S,
            0x2d => I32Load8U,
            0x36 => I32Store,
            0x37 => I64Store,
            0x3f => MemorySize,
            0x40 => MemoryGrow,
            0x41 => I32Const,
            0x42 => I64Const,
            0x43 => F32Const,
            0x44 => F64Const,
            0x45 => I32Eqz,
            0x46 => I32Eq,
            0x47 => I32Ne,
            0x48 => I32LtS,
            0x49 => I32LtU,
            0x4a => I32GtS,
            0x4b => I32GtU,
            0x4c => I32LeS,
            0x4d => I32LeU,
            0x4e => I32GeS,
            0x4f => I32GeU,
            0x50 => I64Eqz,
            0x51 => I64Eq,
            0x52 => I64Ne,
            0x53 => I64LtS,
            0x54 => I64LtU,
            0x55 => I64GtS,
            0x56 => I64GtU,
            0x57 => I64LeS,
            0x58 => I64LeU,
            0x59 => I64GeS,
            0x5a => I64GeU,
            0x67 => I32Clz,
            0x68 => I32Ctz,
            0x69 => I32Popcnt,
            0x6a => I32Add,
            0x6b => I32Sub,
            0x6c => I32Mul,
            0x6d => I32DivS,
            0x6e => I32DivU,
            0x6f => I32RemS,
            0x70 => I32RemU,
            0x71 => I32And,
            0x72 => I32Or,
            0x73 => I32Xor,
            0x74 => I32Shl,
            0x75 => I32ShrS,
            0x76 => I32ShrU,
            0x77 => I32Rotl,
            0x78 => I32Rotr,
            0x79 => I64Clz,
            0x7a => I64Ctz,
            0x7b => I64Popcnt,
            0x7c => I64Add,
            0x7d => I64Sub,
            0x7e => I64Mul,
            0x7f => I64DivS,
            0x80 => I64DivU,
            0x81 => I64RemS,
            0x82 => I64RemU,
            0x83 => I64And,
            0x84 => I64Or,
            0x85 => I64Xor,
            0x86 => I64Shl,
            0x87 => I64ShrS,
            0x88 => I64ShrU,
            0x89 => I64Rotl,
            0x8a => I64Rotr,
            _ => return None,
        })
    }

    pub fn arg_kind(self) -> ArgKind {
        use Opcode::*;
        match self {
            Block | Loop | If => ArgKind::Block,
            Br | BrIf | Call | LocalGet | LocalSet | LocalTee | GlobalGet | GlobalSet => {
                ArgKind::VarU32
            }
            I32Load | I64Load | I32Load8S | I32Load8U | I32Store | I64Store => ArgKind::MemArg,
            MemorySize | MemoryGrow => ArgKind::Byte,
            I32Const => ArgKind::VarI32,
            I64Const => ArgKind::VarI64,
            F32Const => ArgKind::F32,
            F64Const => ArgKind::F64,
            _ => ArgKind::None,
        }
    }
}
