use crate::error::*;
use crate::types::{ValType, Value};

macro_rules! impl_prim {
    ($push:ident, $pop:ident, $ty:ty, $width:literal) => {
        #[inline]
        pub fn $push(&mut self, v: $ty) {
            self.bytes.extend_from_slice(&v.to_le_bytes());
            self.widths.push($width);
        }

        #[inline]
        pub fn $pop(&mut self) -> Result<$ty, Error> {
            match self.widths.last() {
                Some(&$width) => {}
                Some(_) => return Err(Error::Trap(STACK_TYPE_MISMATCH)),
                None => return Err(Error::Trap(STACK_UNDERFLOW)),
            }
            self.widths.pop();
            let at = self.bytes.len() - $width;
            let mut buf = [0u8; $width];
            buf.copy_from_slice(&self.bytes[at..]);
            self.bytes.truncate(at);
            Ok(<$ty>::from_le_bytes(buf))
        }
    };
}

/// Byte-addressable operand stack. Values are stored as raw little-endian
/// bytes; a side record keeps the width of every pushed slot so `drop` and
/// `select` can work without knowing static types, and so a pop of the
/// wrong width is caught instead of corrupting neighbouring slots.
#[derive(Default)]
pub struct Stack {
    bytes: Vec<u8>,
    widths: Vec<u8>,
}

impl Stack {
    pub fn new() -> Self {
        Self {
            bytes: Vec::with_capacity(1024),
            widths: Vec::with_capacity(256),
        }
    }

    impl_prim!(push_u32, pop_u32, u32, 4);
    impl_prim!(push_i32, pop_i32, i32, 4);
    impl_prim!(push_f32, pop_f32, f32, 4);
    impl_prim!(push_u64, pop_u64, u64, 8);
    impl_prim!(push_i64, pop_i64, i64, 8);
    impl_prim!(push_f64, pop_f64, f64, 8);

    /// Number of values currently on the stack.
    pub fn depth(&self) -> usize {
        self.widths.len()
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    /// Discards the top value, whatever its width.
    pub fn drop_top(&mut self) -> Result<(), Error> {
        let (_, _) = self.pop_raw()?;
        Ok(())
    }

    /// Pops the top slot as raw bits plus its width.
    pub fn pop_raw(&mut self) -> Result<(u64, u8), Error> {
        let width = self.widths.pop().ok_or(Error::Trap(STACK_UNDERFLOW))? as usize;
        let at = self.bytes.len() - width;
        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(&self.bytes[at..]);
        self.bytes.truncate(at);
        Ok((u64::from_le_bytes(buf), width as u8))
    }

    pub fn push_raw(&mut self, raw: u64, width: u8) {
        let bytes = raw.to_le_bytes();
        self.bytes.extend_from_slice(&bytes[..width as usize]);
        self.widths.push(width);
    }

    /// Typed push used when only the declared value type is known.
    pub fn push_value(&mut self, value: Value) {
        match value {
            Value::I32(v) => self.push_i32(v),
            Value::I64(v) => self.push_i64(v),
            Value::F32(v) => self.push_f32(v),
            Value::F64(v) => self.push_f64(v),
        }
    }

    /// Typed pop keyed by a declared value type (locals, globals, results).
    pub fn pop_typed(&mut self, ty: ValType) -> Result<Value, Error> {
        Ok(match ty {
            ValType::I32 => Value::I32(self.pop_i32()?),
            ValType::I64 => Value::I64(self.pop_i64()?),
            ValType::F32 => Value::F32(self.pop_f32()?),
            ValType::F64 => Value::F64(self.pop_f64()?),
        })
    }
}
