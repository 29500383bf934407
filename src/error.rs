use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Malformed(&'static str),
    Validation(&'static str),
    Trap(&'static str),
    Link(&'static str),
    Uninstantiable(&'static str),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Malformed(s)
            | Error::Validation(s)
            | Error::Trap(s)
            | Error::Link(s)
            | Error::Uninstantiable(s) => f.write_str(s),
        }
    }
}

impl std::error::Error for Error {}

// Malformed errors
pub const ELSE_OUTSIDE_IF: &str = "else must close an if";
pub const FUNC_CODE_INCONSISTENT: &str = "function and code section have inconsistent lengths";
pub const INT_TOO_LARGE: &str = "integer too large";
pub const INT_TOO_LONG: &str = "integer representation too long";
pub const INVALID_BLOCK_TYPE: &str = "invalid block result type";
pub const INVALID_DATA_SEG_FLAG: &str = "invalid data segment flag";
pub const INVALID_ELEM_SEG_FLAG: &str = "invalid element segment flag";
pub const INVALID_ELEM_TYPE: &str = "invalid table element type";
pub const INVALID_EXPORT_KIND: &str = "invalid export kind";
pub const INVALID_GLOBAL_TYPE: &str = "invalid global type";
pub const INVALID_IMPORT_KIND: &str = "malformed import kind";
pub const INVALID_LOCAL_TYPE: &str = "invalid local type";
pub const INVALID_MUTABILITY: &str = "invalid mutability";
pub const INVALID_RESULT_ARITY: &str = "invalid result arity";
pub const INVALID_UTF8: &str = "invalid UTF-8 encoding";
pub const INVALID_VALUE_TYPE: &str = "invalid value type";
pub const NO_MAGIC_HEADER: &str = "magic header not detected";
pub const SECTION_OUT_OF_ORDER: &str = "section out of order";
pub const SECTION_SIZE_MISMATCH: &str = "section size mismatch";
pub const TOO_MANY_LOCALS: &str = "too many locals";
pub const TYPE_TAG_EXPECTED: &str = "function type tag expected";
pub const UNEXPECTED_END: &str = "unexpected end of section or function";
pub const UNKNOWN_BINARY_VERSION: &str = "unknown binary version";
pub const UNKNOWN_INSTRUCTION: &str = "unknown instruction";
// Validation errors
pub const CONST_EXPR_REQUIRED: &str = "constant expression required";
pub const MIN_GREATER_THAN_MAX: &str = "size minimum must not be greater than maximum";
pub const MEMORY_SIZE_LIMIT: &str = "memory size must be at most 65536 pages (4GiB)";
pub const START_FUNC: &str = "start function must take no parameters and return nothing";
pub const TABLE_SIZE_LIMIT: &str = "table size must be at most 1000000 entries";
pub const UNKNOWN_FUNC: &str = "unknown function";
pub const UNKNOWN_GLOBAL: &str = "unknown global";
pub const UNKNOWN_LOCAL: &str = "unknown local";
pub const UNKNOWN_MEMORY: &str = "unknown memory";
pub const UNKNOWN_TABLE: &str = "unknown table";
pub const UNKNOWN_TYPE: &str = "unknown type";
// Trap errors
pub const CALL_STACK_EXHAUSTED: &str = "call stack exhausted";
pub const CALL_STACK_UNDERFLOW: &str = "call stack underflow";
pub const DIVIDE_BY_ZERO: &str = "integer divide by zero";
pub const FUEL_EXHAUSTED: &str = "instruction budget exhausted";
pub const GLOBAL_IS_IMMUTABLE: &str = "global is immutable";
pub const INTEGER_OVERFLOW: &str = "integer overflow";
pub const INVALID_NUM_ARGS: &str = "invalid number of arguments";
pub const LABEL_STACK_UNDERFLOW: &str = "label stack underflow";
pub const OOB_MEMORY_ACCESS: &str = "out of bounds memory access";
pub const PC_OUT_OF_BOUNDS: &str = "instruction pointer out of bounds";
pub const STACK_TYPE_MISMATCH: &str = "operand stack width mismatch";
pub const STACK_UNDERFLOW: &str = "stack underflow";
pub const UNREACHABLE: &str = "unreachable";
// Link errors
pub const DATA_SEG_DNF: &str = "data segment does not fit";
pub const ELEM_SEG_DNF: &str = "elements segment does not fit";
pub const INCOMPATIBLE_IMPORT: &str = "incompatible import type";
pub const NO_MAIN_EXPORT: &str = "no exported main function";
pub const UNKNOWN_EXPORT: &str = "unknown export";
pub const UNKNOWN_IMPORT: &str = "unknown import";
