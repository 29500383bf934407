use std::collections::HashMap;
use std::rc::Rc;

use crate::debug_println;
use crate::error::*;
use crate::interp::{FunctionInstance, FunctionKind, Interpreter, InterpreterState, NativeHandler};
use crate::memory::MemoryInstance;
use crate::module::{Export, Module};
use crate::types::*;

/// Byte offset where [`VirtualMachine::execute`] places the argv pointer
/// table; the strings are packed right behind it.
pub const ARGV_BASE: u32 = 16;

/// Owns a decoded module together with the mutable state needed to run it.
///
/// Host functions are registered by import path before the first call; the
/// lazy `init` resolves imports, materializes memories and globals, applies
/// data segments, and runs the start function.
pub struct VirtualMachine {
    pub state: InterpreterState,
    module: Option<Module>,
    exports: Vec<Export>,
    handlers: HashMap<String, NativeHandler>,
}

impl VirtualMachine {
    pub fn new(module: Module) -> Self {
        Self {
            state: InterpreterState::new(),
            exports: module.exports.clone(),
            module: Some(module),
            handlers: HashMap::new(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Self::new(Module::from_bytes(bytes)?))
    }

    /// Registers a host function under `module.field`. Must happen before
    /// the first call into the instance.
    pub fn register_handler(&mut self, module: &str, field: &str, handler: NativeHandler) {
        self.handlers.insert(format!("{}.{}", module, field), handler);
    }

    /// Resolves imports, builds the runtime instances, applies data
    /// segments, and runs the start function. Idempotent; called lazily by
    /// [`invoke`](Self::invoke) and [`execute`](Self::execute).
    pub fn init(&mut self) -> Result<(), Error> {
        let Some(module) = self.module.take() else {
            return Ok(());
        };

        // imported functions come first in the index space
        for import in &module.imports {
            let key = format!("{}.{}", import.module, import.field);
            let handler = self
                .handlers
                .get(&key)
                .cloned()
                .ok_or(Error::Link(UNKNOWN_IMPORT))?;
            let signature = module
                .types
                .get(import.type_idx as usize)
                .ok_or(Error::Validation(UNKNOWN_TYPE))?
                .clone();
            debug_println!("import {} resolved", key);
            self.state.functions.push(FunctionInstance {
                signature,
                name: Some(import.field.clone()),
                kind: FunctionKind::Native(handler),
            });
        }

        let n_imports = module.imports.len();
        for (i, (type_idx, code)) in module
            .functions
            .iter()
            .zip(module.code.into_iter())
            .enumerate()
        {
            let signature = module
                .types
                .get(*type_idx as usize)
                .ok_or(Error::Validation(UNKNOWN_TYPE))?
                .clone();
            self.state.functions.push(FunctionInstance {
                signature,
                name: module.names.get(&((n_imports + i) as u32)).cloned(),
                kind: FunctionKind::Wasm {
                    expression: Rc::new(code.body),
                    locals: code.locals,
                },
            });
        }

        for (min, max) in &module.memories {
            self.state.memories.push(MemoryInstance::new(*min, *max));
        }
        self.state.globals = module.globals;

        for segment in &module.data {
            let memory = self
                .state
                .memories
                .first_mut()
                .ok_or(Error::Validation(UNKNOWN_MEMORY))?;
            memory
                .write_bytes(segment.offset, &segment.bytes)
                .map_err(|_| Error::Link(DATA_SEG_DNF))?;
        }

        if let Some(func_idx) = module.start {
            debug_println!("running start function {}", func_idx);
            match Interpreter::invoke(&mut self.state, func_idx) {
                Ok(_) => {}
                Err(Error::Trap(msg)) => return Err(Error::Uninstantiable(msg)),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Calls an exported function by name.
    pub fn invoke(&mut self, name: &str, args: &[Value]) -> Result<Option<Value>, Error> {
        self.init()?;
        let func_idx = self
            .exports
            .iter()
            .find(|e| e.kind == ExternKind::Func && e.name == name)
            .map(|e| e.index)
            .ok_or(Error::Link(UNKNOWN_EXPORT))?;

        let signature = self
            .state
            .functions
            .get(func_idx as usize)
            .ok_or(Error::Validation(UNKNOWN_FUNC))?
            .signature
            .clone();
        if args.len() != signature.n_params() {
            return Err(Error::Trap(INVALID_NUM_ARGS));
        }
        for (arg, ty) in args.iter().zip(signature.params.iter()) {
            if arg.ty() != *ty {
                return Err(Error::Trap(STACK_TYPE_MISMATCH));
            }
            self.state.stack.push_value(*arg);
        }
        Interpreter::invoke(&mut self.state, func_idx)
    }

    /// Runs the exported `main` in the C convention: the command line is
    /// copied into linear memory and passed as `(argc, argv)` when the
    /// signature asks for it. A missing result counts as exit code 0.
    pub fn execute(&mut self, args: &[String]) -> Result<i32, Error> {
        self.init()?;
        let func_idx = self
            .exports
            .iter()
            .find(|e| e.kind == ExternKind::Func && e.name == "main")
            .map(|e| e.index)
            .ok_or(Error::Link(NO_MAIN_EXPORT))?;
        let signature = self
            .state
            .functions
            .get(func_idx as usize)
            .ok_or(Error::Validation(UNKNOWN_FUNC))?
            .signature
            .clone();

        match signature.params.as_slice() {
            [] => {}
            [ValType::I32, ValType::I32] => {
                let argv = self.write_argv(args)?;
                self.state.stack.push_i32(args.len() as i32);
                self.state.stack.push_i32(argv as i32);
            }
            _ => return Err(Error::Trap(INVALID_NUM_ARGS)),
        }

        match Interpreter::invoke(&mut self.state, func_idx)? {
            Some(value) => value.as_i32(),
            None => Ok(0),
        }
    }

    /// Lays out the argv pointer table at [`ARGV_BASE`] with NUL-terminated
    /// strings packed behind it, returning the table address.
    fn write_argv(&mut self, args: &[String]) -> Result<u32, Error> {
        let memory = self
            .state
            .memories
            .first_mut()
            .ok_or(Error::Validation(UNKNOWN_MEMORY))?;
        let mut str_base = ARGV_BASE + 4 * args.len() as u32;
        for (i, arg) in args.iter().enumerate() {
            memory.store_u32(ARGV_BASE + 4 * i as u32, 0, str_base)?;
            memory.write_bytes(str_base, arg.as_bytes())?;
            memory.store_u8(str_base + arg.len() as u32, 0, 0)?;
            str_base += arg.len() as u32 + 1;
        }
        Ok(ARGV_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: u8, payload: &[u8]) -> Vec<u8> {
        assert!(payload.len() < 128);
        let mut out = vec![id, payload.len() as u8];
        out.extend_from_slice(payload);
        out
    }

    fn module_bytes(sections: &[Vec<u8>]) -> Vec<u8> {
        let mut out = b"\0asm\x01\0\0\0".to_vec();
        for s in sections {
            out.extend_from_slice(s);
        }
        out
    }

    #[test]
    fn invoke_exported_function() {
        let bytes = module_bytes(&[
            section(1, &[0x01, 0x60, 0x00, 0x01, 0x7f]),
            section(3, &[0x01, 0x00]),
            section(7, &[0x01, 0x04, b'm', b'a', b'i', b'n', 0x00, 0x00]),
            section(10, &[0x01, 0x04, 0x00, 0x41, 0x2a, 0x0b]),
        ]);
        let mut vm = VirtualMachine::from_bytes(&bytes).unwrap();
        assert_eq!(vm.invoke("main", &[]), Ok(Some(Value::I32(42))));
        assert_eq!(vm.invoke("nope", &[]), Err(Error::Link(UNKNOWN_EXPORT)));
        assert_eq!(
            vm.invoke("main", &[Value::I32(1)]),
            Err(Error::Trap(INVALID_NUM_ARGS))
        );
    }

    #[test]
    fn imports_resolve_to_registered_handlers() {
        let bytes = module_bytes(&[
            section(
                1,
                &[0x02, 0x60, 0x01, 0x7f, 0x01, 0x7f, 0x60, 0x00, 0x01, 0x7f],
            ),
            section(
                2,
                &[0x01, 0x03, b'e', b'n', b'v', 0x04, b'a', b'd', b'd', b'1', 0x00, 0x00],
            ),
            section(3, &[0x01, 0x01]),
            section(7, &[0x01, 0x04, b'm', b'a', b'i', b'n', 0x00, 0x01]),
            section(10, &[0x01, 0x06, 0x00, 0x41, 0x29, 0x10, 0x00, 0x0b]),
        ]);

        let mut vm = VirtualMachine::from_bytes(&bytes).unwrap();
        assert_eq!(vm.invoke("main", &[]), Err(Error::Link(UNKNOWN_IMPORT)));

        let mut vm = VirtualMachine::from_bytes(&bytes).unwrap();
        vm.register_handler(
            "env",
            "add1",
            Rc::new(|state: &mut InterpreterState| {
                let v = state.stack.pop_i32()?;
                Ok(Some(Value::I32(v + 1)))
            }),
        );
        assert_eq!(vm.invoke("main", &[]), Ok(Some(Value::I32(42))));
    }

    #[test]
    fn data_segments_are_applied_at_init() {
        let bytes = module_bytes(&[
            section(1, &[0x01, 0x60, 0x00, 0x01, 0x7f]),
            section(3, &[0x01, 0x00]),
            section(5, &[0x01, 0x00, 0x01]),
            section(7, &[0x01, 0x04, b'm', b'a', b'i', b'n', 0x00, 0x00]),
            // i32.load8_u at address 4
            section(10, &[0x01, 0x07, 0x00, 0x41, 0x04, 0x2d, 0x00, 0x00, 0x0b]),
            section(11, &[0x01, 0x00, 0x41, 0x04, 0x0b, 0x02, b'o', b'k']),
        ]);
        let mut vm = VirtualMachine::from_bytes(&bytes).unwrap();
        assert_eq!(vm.invoke("main", &[]), Ok(Some(Value::I32(b'o' as i32))));
    }

    #[test]
    fn oversized_data_segment_fails_to_link() {
        let bytes = module_bytes(&[
            section(5, &[0x01, 0x00, 0x01]),
            section(
                11,
                &[0x01, 0x00, 0x41, 0xff, 0xff, 0x03, 0x0b, 0x03, b'a', b'b', b'c'],
            ),
        ]);
        let mut vm = VirtualMachine::from_bytes(&bytes).unwrap();
        assert_eq!(vm.init(), Err(Error::Link(DATA_SEG_DNF)));
    }

    #[test]
    fn trapping_start_function_poisons_instantiation() {
        let bytes = module_bytes(&[
            section(1, &[0x01, 0x60, 0x00, 0x00]),
            section(3, &[0x01, 0x00]),
            section(8, &[0x00]),
            section(10, &[0x01, 0x03, 0x00, 0x00, 0x0b]),
        ]);
        let mut vm = VirtualMachine::from_bytes(&bytes).unwrap();
        assert_eq!(vm.init(), Err(Error::Uninstantiable(UNREACHABLE)));
    }

    #[test]
    fn start_function_runs_once() {
        // start sets global 0 to 9; main returns it
        let bytes = module_bytes(&[
            section(1, &[0x02, 0x60, 0x00, 0x00, 0x60, 0x00, 0x01, 0x7f]),
            section(3, &[0x02, 0x00, 0x01]),
            section(6, &[0x01, 0x7f, 0x01, 0x41, 0x00, 0x0b]),
            section(7, &[0x01, 0x04, b'm', b'a', b'i', b'n', 0x00, 0x01]),
            section(8, &[0x00]),
            section(
                10,
                &[
                    0x02, //
                    0x06, 0x00, 0x41, 0x09, 0x24, 0x00, 0x0b, // global0 = 9
                    0x04, 0x00, 0x23, 0x00, 0x0b, // return global0
                ],
            ),
        ]);
        let mut vm = VirtualMachine::from_bytes(&bytes).unwrap();
        assert_eq!(vm.invoke("main", &[]), Ok(Some(Value::I32(9))));
    }

    #[test]
    fn execute_passes_argc_and_argv() {
        let bytes = module_bytes(&[
            section(1, &[0x01, 0x60, 0x02, 0x7f, 0x7f, 0x01, 0x7f]),
            section(3, &[0x01, 0x00]),
            section(5, &[0x01, 0x00, 0x01]),
            section(7, &[0x01, 0x04, b'm', b'a', b'i', b'n', 0x00, 0x00]),
            section(10, &[0x01, 0x04, 0x00, 0x20, 0x00, 0x0b]),
        ]);
        let mut vm = VirtualMachine::from_bytes(&bytes).unwrap();
        let args = vec!["prog".to_string(), "x".to_string()];
        assert_eq!(vm.execute(&args), Ok(2));

        // pointer table at the base, strings packed behind it
        let mem = vm.state.memories.first().unwrap();
        assert_eq!(mem.load_u32(ARGV_BASE, 0).unwrap(), ARGV_BASE + 8);
        assert_eq!(mem.read_bytes(ARGV_BASE + 8, 5).unwrap(), b"prog\0");
        assert_eq!(mem.load_u32(ARGV_BASE, 4).unwrap(), ARGV_BASE + 13);
        assert_eq!(mem.read_bytes(ARGV_BASE + 13, 2).unwrap(), b"x\0");
    }

    #[test]
    fn execute_requires_a_main_export() {
        let mut vm = VirtualMachine::from_bytes(b"\0asm\x01\0\0\0").unwrap();
        assert_eq!(vm.execute(&[]), Err(Error::Link(NO_MAIN_EXPORT)));
    }

    #[test]
    fn execute_without_result_exits_zero() {
        let bytes = module_bytes(&[
            section(1, &[0x01, 0x60, 0x00, 0x00]),
            section(3, &[0x01, 0x00]),
            section(7, &[0x01, 0x04, b'm', b'a', b'i', b'n', 0x00, 0x00]),
            section(10, &[0x01, 0x02, 0x00, 0x0b]),
        ]);
        let mut vm = VirtualMachine::from_bytes(&bytes).unwrap();
        assert_eq!(vm.execute(&[]), Ok(0));
    }
}
