use nohash_hasher::IntMap;

use crate::debug_println;
use crate::error::*;
use crate::instr::{decode_expression, Expression};
use crate::interp::eval_const;
use crate::leb128::*;
use crate::memory::MAX_PAGES;
use crate::source::*;
use crate::types::*;

// locals cap per function body, counting expanded run-length entries
const LOCALS_LIMIT: usize = 50_000;
// declared table size cap; bounds the decode-time element allocation
const TABLE_ENTRY_LIMIT: u32 = 1_000_000;

#[derive(Debug, Clone)]
pub struct Import {
    pub module: String,
    pub field: String,
    pub type_idx: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub kind: ExternKind,
    pub index: u32,
}

/// A funcref table. `elements` is sized to the declared minimum and filled
/// in by element segments.
#[derive(Debug, Clone)]
pub struct Table {
    pub min: u32,
    pub max: u32,
    pub elements: Vec<Option<u32>>,
}

/// A global with its initializer already evaluated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalValue {
    pub ty: ValType,
    pub mutable: bool,
    pub value: Value,
}

/// A function body: declared locals (run-lengths expanded) plus the decoded
/// instruction sequence.
#[derive(Debug, Clone)]
pub struct Code {
    pub locals: Vec<ValType>,
    pub body: Expression,
}

#[derive(Debug, Clone)]
pub struct DataSegment {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

/// A decoded module. Function index space is imports first, then the
/// functions declared in the function section; `code[i]` belongs to function
/// index `imports.len() + i`.
#[derive(Debug, Default)]
pub struct Module {
    pub types: Vec<FunctionType>,
    pub imports: Vec<Import>,
    pub functions: Vec<u32>,
    pub tables: Vec<Table>,
    pub memories: Vec<(u32, u32)>,
    pub globals: Vec<GlobalValue>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub code: Vec<Code>,
    pub data: Vec<DataSegment>,
    pub names: IntMap<u32, String>,
}

impl Module {
    pub fn from_bytes(bytes: &[u8]) -> Result<Module, Error> {
        Module::decode(&mut SliceSource::new(bytes))
    }

    pub fn decode<S: ByteSource>(src: &mut S) -> Result<Module, Error> {
        let mut module = Module::default();
        module.parse(src)?;
        Ok(module)
    }

    pub fn n_imported_funcs(&self) -> usize {
        self.imports.len()
    }

    pub fn n_funcs(&self) -> usize {
        self.imports.len() + self.functions.len()
    }

    /// Signature of a function in the combined index space.
    pub fn func_type(&self, func_idx: u32) -> Result<&FunctionType, Error> {
        let type_idx = if (func_idx as usize) < self.imports.len() {
            self.imports[func_idx as usize].type_idx
        } else {
            *self
                .functions
                .get(func_idx as usize - self.imports.len())
                .ok_or(Error::Validation(UNKNOWN_FUNC))?
        };
        self.types
            .get(type_idx as usize)
            .ok_or(Error::Validation(UNKNOWN_TYPE))
    }

    pub fn find_export(&self, name: &str, kind: ExternKind) -> Option<u32> {
        self.exports
            .iter()
            .find(|e| e.kind == kind && e.name == name)
            .map(|e| e.index)
    }

    pub fn function_name(&self, func_idx: u32) -> Option<&str> {
        self.names.get(&func_idx).map(String::as_str)
    }

    fn parse<S: ByteSource>(&mut self, src: &mut S) -> Result<(), Error> {
        let magic: [u8; 4] = read_exact(src).map_err(|_| Error::Malformed(NO_MAGIC_HEADER))?;
        if &magic != MAGIC_HEADER {
            return Err(Error::Malformed(NO_MAGIC_HEADER));
        }
        if read_u32_le(src)? != BINARY_VERSION {
            return Err(Error::Malformed(UNKNOWN_BINARY_VERSION));
        }

        let mut last_id = SECTION_CUSTOM;
        while let Some(id) = src.get() {
            let len: u32 = decode_varuint(src, 32)?;
            let begin = src.tell();
            debug_println!("section {} at {} len {}", id, begin, len);

            if id == SECTION_CUSTOM || id > SECTION_DATA {
                if id == SECTION_CUSTOM {
                    self.parse_custom_section(src, begin + len as usize);
                }
                if !src.seek((begin + len as usize) as i64, Whence::Start) {
                    return Err(Error::Malformed(UNEXPECTED_END));
                }
                continue;
            }

            if id <= last_id {
                return Err(Error::Malformed(SECTION_OUT_OF_ORDER));
            }
            last_id = id;

            match id {
                SECTION_TYPE => self.parse_type_section(src)?,
                SECTION_IMPORT => self.parse_import_section(src)?,
                SECTION_FUNCTION => self.parse_function_section(src)?,
                SECTION_TABLE => self.parse_table_section(src)?,
                SECTION_MEMORY => self.parse_memory_section(src)?,
                SECTION_GLOBAL => self.parse_global_section(src)?,
                SECTION_EXPORT => self.parse_export_section(src)?,
                SECTION_START => self.parse_start_section(src)?,
                SECTION_ELEMENT => self.parse_element_section(src)?,
                SECTION_CODE => self.parse_code_section(src)?,
                SECTION_DATA => self.parse_data_section(src)?,
                _ => unreachable!(),
            }
            if src.tell() - begin != len as usize {
                return Err(Error::Malformed(SECTION_SIZE_MISMATCH));
            }
        }

        if self.code.len() != self.functions.len() {
            return Err(Error::Malformed(FUNC_CODE_INCONSISTENT));
        }
        Ok(())
    }

    fn parse_type_section<S: ByteSource>(&mut self, src: &mut S) -> Result<(), Error> {
        let count: u32 = decode_varuint(src, 32)?;
        for _ in 0..count {
            if read_u8(src)? != FUNC_TYPE_TAG {
                return Err(Error::Malformed(TYPE_TAG_EXPECTED));
            }
            let n_params: u32 = decode_varuint(src, 32)?;
            let mut params = Vec::with_capacity(n_params as usize);
            for _ in 0..n_params {
                params.push(
                    val_type_from_byte(read_u8(src)?)
                        .ok_or(Error::Malformed(INVALID_VALUE_TYPE))?,
                );
            }
            let n_results: u32 = decode_varuint(src, 32)?;
            let result = match n_results {
                0 => None,
                1 => Some(
                    val_type_from_byte(read_u8(src)?)
                        .ok_or(Error::Malformed(INVALID_VALUE_TYPE))?,
                ),
                _ => return Err(Error::Malformed(INVALID_RESULT_ARITY)),
            };
            self.types.push(FunctionType { params, result });
        }
        Ok(())
    }

    fn parse_import_section<S: ByteSource>(&mut self, src: &mut S) -> Result<(), Error> {
        let count: u32 = decode_varuint(src, 32)?;
        for _ in 0..count {
            let module = read_string(src)?;
            let field = read_string(src)?;
            let kind =
                ExternKind::from_byte(read_u8(src)?).ok_or(Error::Malformed(INVALID_IMPORT_KIND))?;
            if kind != ExternKind::Func {
                return Err(Error::Link(INCOMPATIBLE_IMPORT));
            }
            let type_idx: u32 = decode_varuint(src, 32)?;
            if type_idx as usize >= self.types.len() {
                return Err(Error::Validation(UNKNOWN_TYPE));
            }
            self.imports.push(Import { module, field, type_idx });
        }
        Ok(())
    }

    fn parse_function_section<S: ByteSource>(&mut self, src: &mut S) -> Result<(), Error> {
        let count: u32 = decode_varuint(src, 32)?;
        for _ in 0..count {
            let type_idx: u32 = decode_varuint(src, 32)?;
            if type_idx as usize >= self.types.len() {
                return Err(Error::Validation(UNKNOWN_TYPE));
            }
            self.functions.push(type_idx);
        }
        Ok(())
    }

    fn parse_table_section<S: ByteSource>(&mut self, src: &mut S) -> Result<(), Error> {
        let count: u32 = decode_varuint(src, 32)?;
        for _ in 0..count {
            if read_u8(src)? != TABLE_FUNCREF {
                return Err(Error::Malformed(INVALID_ELEM_TYPE));
            }
            let (min, max) = decode_limit(src, TABLE_ENTRY_LIMIT)?;
            if min > TABLE_ENTRY_LIMIT || max > TABLE_ENTRY_LIMIT {
                return Err(Error::Validation(TABLE_SIZE_LIMIT));
            }
            self.tables.push(Table {
                min,
                max,
                elements: vec![None; min as usize],
            });
        }
        Ok(())
    }

    fn parse_memory_section<S: ByteSource>(&mut self, src: &mut S) -> Result<(), Error> {
        let count: u32 = decode_varuint(src, 32)?;
        for _ in 0..count {
            let (min, max) = decode_limit(src, MAX_PAGES)?;
            if min > MAX_PAGES || max > MAX_PAGES {
                return Err(Error::Validation(MEMORY_SIZE_LIMIT));
            }
            self.memories.push((min, max));
        }
        Ok(())
    }

    fn parse_global_section<S: ByteSource>(&mut self, src: &mut S) -> Result<(), Error> {
        let count: u32 = decode_varuint(src, 32)?;
        for _ in 0..count {
            let ty = val_type_from_byte(read_u8(src)?)
                .ok_or(Error::Malformed(INVALID_GLOBAL_TYPE))?;
            let mutable = match read_u8(src)? {
                0 => false,
                1 => true,
                _ => return Err(Error::Malformed(INVALID_MUTABILITY)),
            };
            let init = decode_expression(src)?;
            let value = eval_const(&init, &self.globals, ty)?;
            self.globals.push(GlobalValue { ty, mutable, value });
        }
        Ok(())
    }

    fn parse_export_section<S: ByteSource>(&mut self, src: &mut S) -> Result<(), Error> {
        let count: u32 = decode_varuint(src, 32)?;
        for _ in 0..count {
            let name = read_string(src)?;
            let kind =
                ExternKind::from_byte(read_u8(src)?).ok_or(Error::Malformed(INVALID_EXPORT_KIND))?;
            let index: u32 = decode_varuint(src, 32)?;
            let in_range = match kind {
                ExternKind::Func => (index as usize) < self.n_funcs(),
                ExternKind::Table => (index as usize) < self.tables.len(),
                ExternKind::Mem => (index as usize) < self.memories.len(),
                ExternKind::Global => (index as usize) < self.globals.len(),
            };
            if !in_range {
                let what = match kind {
                    ExternKind::Func => UNKNOWN_FUNC,
                    ExternKind::Table => UNKNOWN_TABLE,
                    ExternKind::Mem => UNKNOWN_MEMORY,
                    ExternKind::Global => UNKNOWN_GLOBAL,
                };
                return Err(Error::Validation(what));
            }
            self.exports.push(Export { name, kind, index });
        }
        Ok(())
    }

    fn parse_start_section<S: ByteSource>(&mut self, src: &mut S) -> Result<(), Error> {
        let func_idx: u32 = decode_varuint(src, 32)?;
        if func_idx as usize >= self.n_funcs() {
            return Err(Error::Validation(UNKNOWN_FUNC));
        }
        let sig = self.func_type(func_idx)?;
        if !sig.params.is_empty() || sig.has_result() {
            return Err(Error::Validation(START_FUNC));
        }
        self.start = Some(func_idx);
        Ok(())
    }

    fn parse_element_section<S: ByteSource>(&mut self, src: &mut S) -> Result<(), Error> {
        let count: u32 = decode_varuint(src, 32)?;
        for _ in 0..count {
            let flag: u32 = decode_varuint(src, 32)?;
            if flag != 0 {
                return Err(Error::Malformed(INVALID_ELEM_SEG_FLAG));
            }
            let offset_expr = decode_expression(src)?;
            let offset = eval_const(&offset_expr, &self.globals, ValType::I32)?.as_i32()? as u32;
            let n: u32 = decode_varuint(src, 32)?;
            // the function section precedes this one, so indices are known
            let n_funcs = self.n_funcs();
            let table = self.tables.first_mut().ok_or(Error::Validation(UNKNOWN_TABLE))?;
            for i in 0..n {
                let func_idx: u32 = decode_varuint(src, 32)?;
                if func_idx as usize >= n_funcs {
                    return Err(Error::Validation(UNKNOWN_FUNC));
                }
                let slot = table
                    .elements
                    .get_mut(offset as usize + i as usize)
                    .ok_or(Error::Link(ELEM_SEG_DNF))?;
                *slot = Some(func_idx);
            }
        }
        Ok(())
    }

    fn parse_code_section<S: ByteSource>(&mut self, src: &mut S) -> Result<(), Error> {
        let count: u32 = decode_varuint(src, 32)?;
        if count as usize != self.functions.len() {
            return Err(Error::Malformed(FUNC_CODE_INCONSISTENT));
        }
        for _ in 0..count {
            let size: u32 = decode_varuint(src, 32)?;
            let begin = src.tell();

            let n_runs: u32 = decode_varuint(src, 32)?;
            let mut locals = Vec::new();
            for _ in 0..n_runs {
                let n: u32 = decode_varuint(src, 32)?;
                let ty = val_type_from_byte(read_u8(src)?)
                    .ok_or(Error::Malformed(INVALID_LOCAL_TYPE))?;
                if locals.len() + n as usize > LOCALS_LIMIT {
                    return Err(Error::Malformed(TOO_MANY_LOCALS));
                }
                locals.extend(std::iter::repeat(ty).take(n as usize));
            }

            let body = decode_expression(src)?;
            if src.tell() - begin != size as usize {
                return Err(Error::Malformed(SECTION_SIZE_MISMATCH));
            }
            self.code.push(Code { locals, body });
        }
        Ok(())
    }

    fn parse_data_section<S: ByteSource>(&mut self, src: &mut S) -> Result<(), Error> {
        let count: u32 = decode_varuint(src, 32)?;
        for _ in 0..count {
            let flag: u32 = decode_varuint(src, 32)?;
            if flag != 0 {
                return Err(Error::Malformed(INVALID_DATA_SEG_FLAG));
            }
            if self.memories.is_empty() {
                return Err(Error::Validation(UNKNOWN_MEMORY));
            }
            let offset_expr = decode_expression(src)?;
            let offset = eval_const(&offset_expr, &self.globals, ValType::I32)?.as_i32()? as u32;
            let len: u32 = decode_varuint(src, 32)?;
            let mut bytes = vec![0u8; len as usize];
            if !src.read(&mut bytes) {
                return Err(Error::Malformed(UNEXPECTED_END));
            }
            self.data.push(DataSegment { offset, bytes });
        }
        Ok(())
    }

    /// Custom sections carry no semantics we depend on, so any parse issue
    /// inside one is swallowed and the section skipped. The "name" section
    /// is mined for function names when well formed.
    fn parse_custom_section<S: ByteSource>(&mut self, src: &mut S, end: usize) {
        let _ = self.try_parse_custom(src, end);
    }

    fn try_parse_custom<S: ByteSource>(&mut self, src: &mut S, end: usize) -> Result<(), Error> {
        if read_string(src)? != "name" {
            return Ok(());
        }
        while src.tell() < end {
            let sub_id = read_u8(src)?;
            let sub_len: u32 = decode_varuint(src, 32)?;
            let sub_end = src.tell() + sub_len as usize;
            if sub_end > end {
                return Err(Error::Malformed(UNEXPECTED_END));
            }
            // subsection 1 holds the function name map
            if sub_id == 1 {
                let count: u32 = decode_varuint(src, 32)?;
                for _ in 0..count {
                    let func_idx: u32 = decode_varuint(src, 32)?;
                    let name = read_string(src)?;
                    self.names.insert(func_idx, name);
                }
            }
            if !src.seek(sub_end as i64, Whence::Start) {
                return Err(Error::Malformed(UNEXPECTED_END));
            }
        }
        Ok(())
    }
}
