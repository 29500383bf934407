use crate::error::*;

pub const MAGIC_HEADER: &[u8; 4] = b"\0asm";
pub const BINARY_VERSION: u32 = 1;

// Section ids
pub const SECTION_CUSTOM: u8 = 0;
pub const SECTION_TYPE: u8 = 1;
pub const SECTION_IMPORT: u8 = 2;
pub const SECTION_FUNCTION: u8 = 3;
pub const SECTION_TABLE: u8 = 4;
pub const SECTION_MEMORY: u8 = 5;
pub const SECTION_GLOBAL: u8 = 6;
pub const SECTION_EXPORT: u8 = 7;
pub const SECTION_START: u8 = 8;
pub const SECTION_ELEMENT: u8 = 9;
pub const SECTION_CODE: u8 = 10;
pub const SECTION_DATA: u8 = 11;

pub const FUNC_TYPE_TAG: u8 = 0x60;
pub const TABLE_FUNCREF: u8 = 0x70;
pub const BLOCK_TYPE_EMPTY: u8 = 0x40;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ValType {
    I32 = 0x7f,
    I64 = 0x7e,
    F32 = 0x7d,
    F64 = 0x7c,
}

#[inline]
pub fn val_type_from_byte(byte: u8) -> Option<ValType> {
    match byte {
        0x7f => Some(ValType::I32),
        0x7e => Some(ValType::I64),
        0x7d => Some(ValType::F32),
        0x7c => Some(ValType::F64),
        _ => None,
    }
}

impl ValType {
    pub fn name(self) -> &'static str {
        match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
        }
    }
}

/// A runtime value. One variant per value type; no implicit coercion, every
/// consumer knows the expected tag from context (instruction, declared
/// local/global type, or signature).
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn ty(self) -> ValType {
        match self {
            Value::I32(_) => ValType::I32,
            Value::I64(_) => ValType::I64,
            Value::F32(_) => ValType::F32,
            Value::F64(_) => ValType::F64,
        }
    }

    /// The zero value of a declared type, used for local-slot initialization.
    pub fn zero(ty: ValType) -> Value {
        match ty {
            ValType::I32 => Value::I32(0),
            ValType::I64 => Value::I64(0),
            ValType::F32 => Value::F32(0.0),
            ValType::F64 => Value::F64(0.0),
        }
    }

    pub fn as_i32(self) -> Result<i32, Error> {
        match self {
            Value::I32(v) => Ok(v),
            _ => Err(Error::Trap(STACK_TYPE_MISMATCH)),
        }
    }

    pub fn as_i64(self) -> Result<i64, Error> {
        match self {
            Value::I64(v) => Ok(v),
            _ => Err(Error::Trap(STACK_TYPE_MISMATCH)),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::I32(v) => write!(f, "{} (i32)", v),
            Value::I64(v) => write!(f, "{} (i64)", v),
            Value::F32(v) => write!(f, "{} (f32)", v),
            Value::F64(v) => write!(f, "{} (f64)", v),
        }
    }
}

/// Parameter/result lists of a function type. One result at most; multi-value
/// returns are out of scope.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FunctionType {
    pub params: Vec<ValType>,
    pub result: Option<ValType>,
}

impl FunctionType {
    pub fn n_params(&self) -> usize {
        self.params.len()
    }

    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternKind {
    Func = 0,
    Table = 1,
    Mem = 2,
    Global = 3,
}

impl ExternKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ExternKind::Func),
            1 => Some(ExternKind::Table),
            2 => Some(ExternKind::Mem),
            3 => Some(ExternKind::Global),
            _ => None,
        }
    }
}
