#![deny(unsafe_code)]

pub mod error;
pub mod source;
pub mod leb128;
pub mod types;
pub mod opcode;
pub mod instr;
pub mod module;
pub mod stack;
pub mod memory;
pub mod interp;
pub mod vm;

pub use error::Error;
pub use source::{ByteSource, SliceSource, Whence};
pub use types::{FunctionType, ValType, Value};
pub use instr::{Arg, BlockArg, Expression, IfArg, Instruction, MemArg};
pub use module::{GlobalValue, Module};
pub use memory::MemoryInstance;
pub use interp::{FunctionInstance, FunctionKind, Interpreter, InterpreterState, NativeHandler};
pub use vm::VirtualMachine;

// Debug macro that only prints when vm_debug feature is enabled
#[cfg(feature = "vm_debug")]
macro_rules! debug_println {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

#[cfg(not(feature = "vm_debug"))]
macro_rules! debug_println {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_println;
