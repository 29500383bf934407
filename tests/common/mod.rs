//! Hand-rolled binary module builder shared by the integration tests.

pub fn leb_u(mut v: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (v & 0x7f) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if v == 0 {
            return out;
        }
    }
}

pub fn leb_s(mut v: i64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
        out.push(if done { byte } else { byte | 0x80 });
        if done {
            return out;
        }
    }
}

fn string(s: &str) -> Vec<u8> {
    let mut out = leb_u(s.len() as u64);
    out.extend_from_slice(s.as_bytes());
    out
}

fn limits(min: u32, max: Option<u32>) -> Vec<u8> {
    let mut out = Vec::new();
    match max {
        Some(max) => {
            out.push(1);
            out.extend(leb_u(min as u64));
            out.extend(leb_u(max as u64));
        }
        None => {
            out.push(0);
            out.extend(leb_u(min as u64));
        }
    }
    out
}

#[derive(Default)]
pub struct ModuleBuilder {
    types: Vec<Vec<u8>>,
    imports: Vec<Vec<u8>>,
    functions: Vec<Vec<u8>>,
    tables: Vec<Vec<u8>>,
    memories: Vec<Vec<u8>>,
    globals: Vec<Vec<u8>>,
    exports: Vec<Vec<u8>>,
    start: Option<u32>,
    elements: Vec<Vec<u8>>,
    code: Vec<Vec<u8>>,
    data: Vec<Vec<u8>>,
    customs: Vec<Vec<u8>>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a function type; `params`/`result` are raw value type bytes
    /// (0x7f = i32, 0x7e = i64, 0x7d = f32, 0x7c = f64).
    pub fn add_type(&mut self, params: &[u8], result: Option<u8>) -> u32 {
        let mut entry = vec![0x60];
        entry.extend(leb_u(params.len() as u64));
        entry.extend_from_slice(params);
        match result {
            Some(r) => entry.extend_from_slice(&[0x01, r]),
            None => entry.push(0x00),
        }
        self.types.push(entry);
        self.types.len() as u32 - 1
    }

    pub fn import_func(&mut self, module: &str, field: &str, type_idx: u32) -> u32 {
        let mut entry = string(module);
        entry.extend(string(field));
        entry.push(0x00);
        entry.extend(leb_u(type_idx as u64));
        self.imports.push(entry);
        self.imports.len() as u32 - 1
    }

    /// Adds a function. `locals` is (count, raw value type byte) runs; the
    /// body must include its closing `end`. Returns the index in the
    /// combined space, assuming all imports were added first.
    pub fn add_function(&mut self, type_idx: u32, locals: &[(u32, u8)], body: &[u8]) -> u32 {
        self.functions.push(leb_u(type_idx as u64));

        let mut inner = leb_u(locals.len() as u64);
        for (n, ty) in locals {
            inner.extend(leb_u(*n as u64));
            inner.push(*ty);
        }
        inner.extend_from_slice(body);
        let mut entry = leb_u(inner.len() as u64);
        entry.extend(inner);
        self.code.push(entry);

        (self.imports.len() + self.functions.len()) as u32 - 1
    }

    pub fn add_table(&mut self, min: u32, max: Option<u32>) {
        let mut entry = vec![0x70];
        entry.extend(limits(min, max));
        self.tables.push(entry);
    }

    pub fn add_memory(&mut self, min: u32, max: Option<u32>) {
        self.memories.push(limits(min, max));
    }

    /// `init` is a constant expression including its `end`.
    pub fn add_global(&mut self, ty: u8, mutable: bool, init: &[u8]) -> u32 {
        let mut entry = vec![ty, mutable as u8];
        entry.extend_from_slice(init);
        self.globals.push(entry);
        self.globals.len() as u32 - 1
    }

    pub fn export_func(&mut self, name: &str, func_idx: u32) {
        let mut entry = string(name);
        entry.push(0x00);
        entry.extend(leb_u(func_idx as u64));
        self.exports.push(entry);
    }

    pub fn set_start(&mut self, func_idx: u32) {
        self.start = Some(func_idx);
    }

    pub fn add_element(&mut self, offset: i32, funcs: &[u32]) {
        let mut entry = vec![0x00, 0x41];
        entry.extend(leb_s(offset as i64));
        entry.push(0x0b);
        entry.extend(leb_u(funcs.len() as u64));
        for f in funcs {
            entry.extend(leb_u(*f as u64));
        }
        self.elements.push(entry);
    }

    pub fn add_data(&mut self, offset: i32, bytes: &[u8]) {
        let mut entry = vec![0x00, 0x41];
        entry.extend(leb_s(offset as i64));
        entry.push(0x0b);
        entry.extend(leb_u(bytes.len() as u64));
        entry.extend_from_slice(bytes);
        self.data.push(entry);
    }

    pub fn add_custom(&mut self, name: &str, payload: &[u8]) {
        let mut entry = string(name);
        entry.extend_from_slice(payload);
        self.customs.push(entry);
    }

    pub fn build(&self) -> Vec<u8> {
        fn section(out: &mut Vec<u8>, id: u8, entries: &[Vec<u8>]) {
            if entries.is_empty() {
                return;
            }
            let mut payload = leb_u(entries.len() as u64);
            for e in entries {
                payload.extend_from_slice(e);
            }
            out.push(id);
            out.extend(leb_u(payload.len() as u64));
            out.extend(payload);
        }

        let mut out = b"\0asm\x01\0\0\0".to_vec();
        section(&mut out, 1, &self.types);
        section(&mut out, 2, &self.imports);
        section(&mut out, 3, &self.functions);
        section(&mut out, 4, &self.tables);
        section(&mut out, 5, &self.memories);
        section(&mut out, 6, &self.globals);
        section(&mut out, 7, &self.exports);
        if let Some(idx) = self.start {
            let payload = leb_u(idx as u64);
            out.push(8);
            out.extend(leb_u(payload.len() as u64));
            out.extend(payload);
        }
        section(&mut out, 9, &self.elements);
        section(&mut out, 10, &self.code);
        section(&mut out, 11, &self.data);
        for custom in &self.customs {
            out.push(0);
            out.extend(leb_u(custom.len() as u64));
            out.extend_from_slice(custom);
        }
        out
    }
}
