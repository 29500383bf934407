use std::rc::Rc;

use paste::paste;

use crate::debug_println;
use crate::error::*;
use crate::instr::{Arg, Expression, Instruction};
use crate::memory::MemoryInstance;
use crate::module::GlobalValue;
use crate::opcode::Opcode;
use crate::stack::Stack;
use crate::types::*;

/// Sentinel return address marking the outermost frame; popping it ends
/// execution instead of resuming a caller.
pub const PC_END: usize = usize::MAX;

pub const DEFAULT_CALL_DEPTH: usize = 1000;

/// Host function plugged into the function index space. Arguments stay on
/// the operand stack for the handler to pop; a returned value is pushed for
/// the caller when the signature declares one.
pub type NativeHandler = Rc<dyn Fn(&mut InterpreterState) -> Result<Option<Value>, Error>>;

pub enum FunctionKind {
    Wasm {
        expression: Rc<Expression>,
        /// Declared (non-parameter) local types.
        locals: Vec<ValType>,
    },
    Native(NativeHandler),
}

pub struct FunctionInstance {
    pub signature: FunctionType,
    pub name: Option<String>,
    pub kind: FunctionKind,
}

/// Saved caller context. `label_depth` is the label stack height at call
/// time, which doubles as the callee's private label floor.
struct Frame {
    ret_pc: usize,
    function: usize,
    label_depth: usize,
    locals: Vec<Value>,
}

/// One entry of the label stack: where a branch to this label lands.
struct Label {
    cont: usize,
}

pub struct InterpreterState {
    pub functions: Vec<FunctionInstance>,
    pub memories: Vec<MemoryInstance>,
    pub globals: Vec<GlobalValue>,
    pub stack: Stack,
    pub call_depth_limit: usize,
    /// Remaining instruction budget; `None` runs unmetered.
    pub fuel: Option<u64>,
    callstack: Vec<Frame>,
    labelstack: Vec<Label>,
    locals: Vec<Value>,
    current_function: usize,
    pc: usize,
}

impl Default for InterpreterState {
    fn default() -> Self {
        Self::new()
    }
}

impl InterpreterState {
    pub fn new() -> Self {
        Self {
            functions: Vec::new(),
            memories: Vec::new(),
            globals: Vec::new(),
            stack: Stack::new(),
            call_depth_limit: DEFAULT_CALL_DEPTH,
            fuel: None,
            callstack: Vec::new(),
            labelstack: Vec::new(),
            locals: Vec::new(),
            current_function: 0,
            pc: PC_END,
        }
    }

    pub fn call_depth(&self) -> usize {
        self.callstack.len()
    }

    fn label_floor(&self) -> usize {
        self.callstack.last().map_or(0, |f| f.label_depth)
    }
}

macro_rules! binary {
    ($state:expr, $ty:ident, $op:ident) => {{
        paste! {
            let rhs = $state.stack.[<pop_ $ty>]()?;
            let lhs = $state.stack.[<pop_ $ty>]()?;
            $state.stack.[<push_ $ty>](lhs.[<wrapping_ $op>](rhs));
        }
    }};
}

macro_rules! bitop {
    ($state:expr, $ty:ident, $op:tt) => {{
        paste! {
            let rhs = $state.stack.[<pop_ $ty>]()?;
            let lhs = $state.stack.[<pop_ $ty>]()?;
            $state.stack.[<push_ $ty>](lhs $op rhs);
        }
    }};
}

macro_rules! compare {
    ($state:expr, $ty:ident, $op:tt) => {{
        paste! {
            let rhs = $state.stack.[<pop_ $ty>]()?;
            let lhs = $state.stack.[<pop_ $ty>]()?;
            $state.stack.push_i32((lhs $op rhs) as i32);
        }
    }};
}

macro_rules! div_s {
    ($state:expr, $ty:ident) => {{
        paste! {
            let rhs = $state.stack.[<pop_ $ty>]()?;
            let lhs = $state.stack.[<pop_ $ty>]()?;
            if rhs == 0 {
                return Err(Error::Trap(DIVIDE_BY_ZERO));
            }
            let (quot, overflow) = lhs.overflowing_div(rhs);
            if overflow {
                return Err(Error::Trap(INTEGER_OVERFLOW));
            }
            $state.stack.[<push_ $ty>](quot);
        }
    }};
}

macro_rules! div_u {
    ($state:expr, $ty:ident) => {{
        paste! {
            let rhs = $state.stack.[<pop_ $ty>]()?;
            let lhs = $state.stack.[<pop_ $ty>]()?;
            if rhs == 0 {
                return Err(Error::Trap(DIVIDE_BY_ZERO));
            }
            $state.stack.[<push_ $ty>](lhs / rhs);
        }
    }};
}

// MIN % -1 is defined as 0, so the wrapping remainder is exactly right
macro_rules! rem {
    ($state:expr, $ty:ident) => {{
        paste! {
            let rhs = $state.stack.[<pop_ $ty>]()?;
            let lhs = $state.stack.[<pop_ $ty>]()?;
            if rhs == 0 {
                return Err(Error::Trap(DIVIDE_BY_ZERO));
            }
            $state.stack.[<push_ $ty>](lhs.wrapping_rem(rhs));
        }
    }};
}

// wrapping_shl/shr mask the shift amount to the operand width
macro_rules! shift {
    ($state:expr, $ty:ident, $fn:ident) => {{
        paste! {
            let rhs = $state.stack.[<pop_ $ty>]()?;
            let lhs = $state.stack.[<pop_ $ty>]()?;
            $state.stack.[<push_ $ty>](lhs.$fn(rhs as u32));
        }
    }};
}

macro_rules! unop {
    ($state:expr, $ty:ident, $fn:ident) => {{
        paste! {
            let v = $state.stack.[<pop_ $ty>]()?;
            $state.stack.[<push_ $ty>](v.$fn() as $ty);
        }
    }};
}

macro_rules! eqz {
    ($state:expr, $ty:ident) => {{
        paste! {
            let v = $state.stack.[<pop_ $ty>]()?;
            $state.stack.push_i32((v == 0) as i32);
        }
    }};
}

macro_rules! load {
    ($state:expr, $load:ident, $push:ident, $as:ty, $offset:expr) => {{
        let ptr = $state.stack.pop_i32()? as u32;
        let v = $state
            .memories
            .first()
            .ok_or(Error::Validation(UNKNOWN_MEMORY))?
            .$load(ptr, $offset)? as $as;
        $state.stack.$push(v);
    }};
}

macro_rules! store {
    ($state:expr, $pop:ident, $store:ident, $as:ty, $offset:expr) => {{
        let v = $state.stack.$pop()?;
        let ptr = $state.stack.pop_i32()? as u32;
        $state
            .memories
            .first_mut()
            .ok_or(Error::Validation(UNKNOWN_MEMORY))?
            .$store(ptr, $offset, v as $as)?;
    }};
}

pub struct Interpreter;

impl Interpreter {
    /// Calls function `func_idx` with its arguments already pushed on the
    /// operand stack and runs it to completion, returning the popped result
    /// when the signature declares one.
    pub fn invoke(state: &mut InterpreterState, func_idx: u32) -> Result<Option<Value>, Error> {
        let func = state
            .functions
            .get(func_idx as usize)
            .ok_or(Error::Validation(UNKNOWN_FUNC))?;
        let result_ty = func.signature.result;
        let native = match &func.kind {
            FunctionKind::Native(handler) => Some(handler.clone()),
            FunctionKind::Wasm { .. } => None,
        };

        match native {
            Some(handler) => {
                let value = handler(state)?;
                check_native_result(result_ty, value)
            }
            None => {
                // the caller may be mid-dispatch (a reentrant host handler);
                // its position must survive the nested run
                let saved_pc = state.pc;
                let saved_function = state.current_function;
                setup_call(state, func_idx as usize, PC_END)?;
                let outcome = Self::run(state);
                state.pc = saved_pc;
                state.current_function = saved_function;
                outcome?;
                match result_ty {
                    Some(ty) => Ok(Some(state.stack.pop_typed(ty)?)),
                    None => Ok(None),
                }
            }
        }
    }

    /// The dispatch loop. Runs until the outermost frame returns.
    pub fn run(state: &mut InterpreterState) -> Result<(), Error> {
        let mut expr = wasm_expression(state, state.current_function)?;

        loop {
            if let Some(fuel) = state.fuel.as_mut() {
                if *fuel == 0 {
                    return Err(Error::Trap(FUEL_EXHAUSTED));
                }
                *fuel -= 1;
            }

            let pc = state.pc;
            let instr: Instruction = *expr
                .get(pc)
                .ok_or(Error::Trap(PC_OUT_OF_BOUNDS))?;
            state.pc = pc + 1;
            debug_println!(
                "fn {} pc {} op {:?} stack {}",
                state.current_function,
                pc,
                instr.op,
                state.stack.depth()
            );

            match (instr.op, instr.arg) {
                (Opcode::Unreachable, _) => return Err(Error::Trap(UNREACHABLE)),
                (Opcode::Nop, _) => {}

                (Opcode::Block, Arg::Block(b)) => {
                    state.labelstack.push(Label { cont: pc + b.len as usize + 1 });
                }
                (Opcode::Loop, Arg::Block(_)) => {
                    // a back-branch lands on the loop itself, re-pushing the label
                    state.labelstack.push(Label { cont: pc });
                }
                (Opcode::If, Arg::If(b)) => {
                    let cond = state.stack.pop_i32()?;
                    state.labelstack.push(Label { cont: pc + b.len as usize + 1 });
                    if cond == 0 {
                        state.pc = pc + 1 + b.else_at as usize;
                    }
                }
                // reached only when the true arm runs into it: exit the if
                (Opcode::Else, _) => branch(state, 0)?,
                (Opcode::End, _) => {
                    if state.labelstack.len() > state.label_floor() {
                        state.labelstack.pop();
                    } else {
                        match do_return(state)? {
                            Some(caller) => expr = caller,
                            None => return Ok(()),
                        }
                    }
                }
                (Opcode::Br, Arg::U32(depth)) => branch(state, depth)?,
                (Opcode::BrIf, Arg::U32(depth)) => {
                    if state.stack.pop_i32()? != 0 {
                        branch(state, depth)?;
                    }
                }
                (Opcode::Return, _) => match do_return(state)? {
                    Some(caller) => expr = caller,
                    None => return Ok(()),
                },
                (Opcode::Call, Arg::U32(idx)) => {
                    let func = state
                        .functions
                        .get(idx as usize)
                        .ok_or(Error::Validation(UNKNOWN_FUNC))?;
                    let result_ty = func.signature.result;
                    let native = match &func.kind {
                        FunctionKind::Native(handler) => Some(handler.clone()),
                        FunctionKind::Wasm { .. } => None,
                    };
                    match native {
                        Some(handler) => {
                            let value = handler(state)?;
                            if let Some(v) = check_native_result(result_ty, value)? {
                                state.stack.push_value(v);
                            }
                        }
                        None => {
                            setup_call(state, idx as usize, state.pc)?;
                            expr = wasm_expression(state, idx as usize)?;
                        }
                    }
                }

                (Opcode::Drop, _) => state.stack.drop_top()?,
                (Opcode::Select, _) => {
                    let cond = state.stack.pop_i32()?;
                    let (on_zero, wb) = state.stack.pop_raw()?;
                    let (on_nonzero, wa) = state.stack.pop_raw()?;
                    if wa != wb {
                        return Err(Error::Trap(STACK_TYPE_MISMATCH));
                    }
                    state
                        .stack
                        .push_raw(if cond != 0 { on_nonzero } else { on_zero }, wa);
                }

                (Opcode::LocalGet, Arg::U32(idx)) => {
                    let v = *state
                        .locals
                        .get(idx as usize)
                        .ok_or(Error::Validation(UNKNOWN_LOCAL))?;
                    state.stack.push_value(v);
                }
                (Opcode::LocalSet, Arg::U32(idx)) => {
                    let slot = state
                        .locals
                        .get_mut(idx as usize)
                        .ok_or(Error::Validation(UNKNOWN_LOCAL))?;
                    *slot = state.stack.pop_typed(slot.ty())?;
                }
                (Opcode::LocalTee, Arg::U32(idx)) => {
                    let slot = state
                        .locals
                        .get_mut(idx as usize)
                        .ok_or(Error::Validation(UNKNOWN_LOCAL))?;
                    let v = state.stack.pop_typed(slot.ty())?;
                    state.stack.push_value(v);
                    *slot = v;
                }
                (Opcode::GlobalGet, Arg::U32(idx)) => {
                    let v = state
                        .globals
                        .get(idx as usize)
                        .ok_or(Error::Validation(UNKNOWN_GLOBAL))?
                        .value;
                    state.stack.push_value(v);
                }
                (Opcode::GlobalSet, Arg::U32(idx)) => {
                    let global = state
                        .globals
                        .get_mut(idx as usize)
                        .ok_or(Error::Validation(UNKNOWN_GLOBAL))?;
                    if !global.mutable {
                        return Err(Error::Trap(GLOBAL_IS_IMMUTABLE));
                    }
                    global.value = state.stack.pop_typed(global.ty)?;
                }

                (Opcode::I32Load, Arg::Mem(m)) => load!(state, load_i32, push_i32, i32, m.offset),
                (Opcode::I64Load, Arg::Mem(m)) => load!(state, load_i64, push_i64, i64, m.offset),
                (Opcode::I32Load8S, Arg::Mem(m)) => load!(state, load_i8, push_i32, i32, m.offset),
                (Opcode::I32Load8U, Arg::Mem(m)) => load!(state, load_u8, push_i32, i32, m.offset),
                (Opcode::I32Store, Arg::Mem(m)) => store!(state, pop_i32, store_u32, u32, m.offset),
                (Opcode::I64Store, Arg::Mem(m)) => store!(state, pop_i64, store_u64, u64, m.offset),
                (Opcode::MemorySize, _) => {
                    let pages = state
                        .memories
                        .first()
                        .ok_or(Error::Validation(UNKNOWN_MEMORY))?
                        .size();
                    state.stack.push_i32(pages as i32);
                }
                (Opcode::MemoryGrow, _) => {
                    let delta = state.stack.pop_i32()? as u32;
                    let old = state
                        .memories
                        .first_mut()
                        .ok_or(Error::Validation(UNKNOWN_MEMORY))?
                        .grow(delta);
                    state.stack.push_i32(old as i32);
                }

                (Opcode::I32Const, Arg::I32(v)) => state.stack.push_i32(v),
                (Opcode::I64Const, Arg::I64(v)) => state.stack.push_i64(v),
                (Opcode::F32Const, Arg::F32(v)) => state.stack.push_f32(v),
                (Opcode::F64Const, Arg::F64(v)) => state.stack.push_f64(v),

                (Opcode::I32Eqz, _) => eqz!(state, i32),
                (Opcode::I32Eq, _) => compare!(state, i32, ==),
                (Opcode::I32Ne, _) => compare!(state, i32, !=),
                (Opcode::I32LtS, _) => compare!(state, i32, <),
                (Opcode::I32LtU, _) => compare!(state, u32, <),
                (Opcode::I32GtS, _) => compare!(state, i32, >),
                (Opcode::I32GtU, _) => compare!(state, u32, >),
                (Opcode::I32LeS, _) => compare!(state, i32, <=),
                (Opcode::I32LeU, _) => compare!(state, u32, <=),
                (Opcode::I32GeS, _) => compare!(state, i32, >=),
                (Opcode::I32GeU, _) => compare!(state, u32, >=),
                (Opcode::I64Eqz, _) => eqz!(state, i64),
                (Opcode::I64Eq, _) => compare!(state, i64, ==),
                (Opcode::I64Ne, _) => compare!(state, i64, !=),
                (Opcode::I64LtS, _) => compare!(state, i64, <),
                (Opcode::I64LtU, _) => compare!(state, u64, <),
                (Opcode::I64GtS, _) => compare!(state, i64, >),
                (Opcode::I64GtU, _) => compare!(state, u64, >),
                (Opcode::I64LeS, _) => compare!(state, i64, <=),
                (Opcode::I64LeU, _) => compare!(state, u64, <=),
                (Opcode::I64GeS, _) => compare!(state, i64, >=),
                (Opcode::I64GeU, _) => compare!(state, u64, >=),

                (Opcode::I32Clz, _) => unop!(state, u32, leading_zeros),
                (Opcode::I32Ctz, _) => unop!(state, u32, trailing_zeros),
                (Opcode::I32Popcnt, _) => unop!(state, u32, count_ones),
                (Opcode::I32Add, _) => binary!(state, i32, add),
                (Opcode::I32Sub, _) => binary!(state, i32, sub),
                (Opcode::I32Mul, _) => binary!(state, i32, mul),
                (Opcode::I32DivS, _) => div_s!(state, i32),
                (Opcode::I32DivU, _) => div_u!(state, u32),
                (Opcode::I32RemS, _) => rem!(state, i32),
                (Opcode::I32RemU, _) => rem!(state, u32),
                (Opcode::I32And, _) => bitop!(state, i32, &),
                (Opcode::I32Or, _) => bitop!(state, i32, |),
                (Opcode::I32Xor, _) => bitop!(state, i32, ^),
                (Opcode::I32Shl, _) => shift!(state, i32, wrapping_shl),
                (Opcode::I32ShrS, _) => shift!(state, i32, wrapping_shr),
                (Opcode::I32ShrU, _) => shift!(state, u32, wrapping_shr),
                (Opcode::I32Rotl, _) => shift!(state, u32, rotate_left),
                (Opcode::I32Rotr, _) => shift!(state, u32, rotate_right),
                (Opcode::I64Clz, _) => unop!(state, u64, leading_zeros),
                (Opcode::I64Ctz, _) => unop!(state, u64, trailing_zeros),
                (Opcode::I64Popcnt, _) => unop!(state, u64, count_ones),
                (Opcode::I64Add, _) => binary!(state, i64, add),
                (Opcode::I64Sub, _) => binary!(state, i64, sub),
                (Opcode::I64Mul, _) => binary!(state, i64, mul),
                (Opcode::I64DivS, _) => div_s!(state, i64),
                (Opcode::I64DivU, _) => div_u!(state, u64),
                (Opcode::I64RemS, _) => rem!(state, i64),
                (Opcode::I64RemU, _) => rem!(state, u64),
                (Opcode::I64And, _) => bitop!(state, i64, &),
                (Opcode::I64Or, _) => bitop!(state, i64, |),
                (Opcode::I64Xor, _) => bitop!(state, i64, ^),
                (Opcode::I64Shl, _) => shift!(state, i64, wrapping_shl),
                (Opcode::I64ShrS, _) => shift!(state, i64, wrapping_shr),
                (Opcode::I64ShrU, _) => shift!(state, u64, wrapping_shr),
                (Opcode::I64Rotl, _) => shift!(state, u64, rotate_left),
                (Opcode::I64Rotr, _) => shift!(state, u64, rotate_right),

                _ => return Err(Error::Malformed(UNKNOWN_INSTRUCTION)),
            }
        }
    }
}

fn wasm_expression(state: &InterpreterState, func_idx: usize) -> Result<Rc<Expression>, Error> {
    match &state
        .functions
        .get(func_idx)
        .ok_or(Error::Validation(UNKNOWN_FUNC))?
        .kind
    {
        FunctionKind::Wasm { expression, .. } => Ok(expression.clone()),
        FunctionKind::Native(_) => Err(Error::Validation(UNKNOWN_FUNC)),
    }
}

/// Pops the callee's arguments, saves the caller frame, and repositions the
/// interpreter at the callee's first instruction.
fn setup_call(state: &mut InterpreterState, func_idx: usize, ret_pc: usize) -> Result<(), Error> {
    if state.callstack.len() >= state.call_depth_limit {
        return Err(Error::Trap(CALL_STACK_EXHAUSTED));
    }
    let func = state
        .functions
        .get(func_idx)
        .ok_or(Error::Validation(UNKNOWN_FUNC))?;
    let FunctionKind::Wasm { locals: declared, .. } = &func.kind else {
        return Err(Error::Validation(UNKNOWN_FUNC));
    };

    let n_params = func.signature.n_params();
    let mut locals = Vec::with_capacity(n_params + declared.len());
    for ty in &func.signature.params {
        locals.push(Value::zero(*ty));
    }
    for ty in declared {
        locals.push(Value::zero(*ty));
    }
    for i in (0..n_params).rev() {
        locals[i] = state.stack.pop_typed(func.signature.params[i])?;
    }

    state.callstack.push(Frame {
        ret_pc,
        function: state.current_function,
        label_depth: state.labelstack.len(),
        locals: std::mem::replace(&mut state.locals, locals),
    });
    state.current_function = func_idx;
    state.pc = 0;
    Ok(())
}

/// Unwinds the current frame. `None` means the outermost frame finished.
fn do_return(state: &mut InterpreterState) -> Result<Option<Rc<Expression>>, Error> {
    let frame = state
        .callstack
        .pop()
        .ok_or(Error::Trap(CALL_STACK_UNDERFLOW))?;
    state.labelstack.truncate(frame.label_depth);
    state.locals = frame.locals;
    if frame.ret_pc == PC_END {
        return Ok(None);
    }
    state.current_function = frame.function;
    state.pc = frame.ret_pc;
    Ok(Some(wasm_expression(state, frame.function)?))
}

/// Pops `depth + 1` labels and jumps to the innermost popped label's
/// continuation. Depths reaching below the current frame's label floor trap.
fn branch(state: &mut InterpreterState, depth: u32) -> Result<(), Error> {
    let available = state.labelstack.len() - state.label_floor();
    if depth as usize >= available {
        return Err(Error::Trap(LABEL_STACK_UNDERFLOW));
    }
    for _ in 0..depth {
        state.labelstack.pop();
    }
    let label = state
        .labelstack
        .pop()
        .ok_or(Error::Trap(LABEL_STACK_UNDERFLOW))?;
    state.pc = label.cont;
    Ok(())
}

fn check_native_result(
    expected: Option<ValType>,
    got: Option<Value>,
) -> Result<Option<Value>, Error> {
    match (expected, got) {
        (None, None) => Ok(None),
        (Some(ty), Some(v)) if v.ty() == ty => Ok(Some(v)),
        _ => Err(Error::Trap(STACK_TYPE_MISMATCH)),
    }
}

/// Evaluates an initializer expression. Only constants and reads of already
/// initialized globals are constant; anything else is rejected.
pub fn eval_const(
    expr: &Expression,
    globals: &[GlobalValue],
    expect: ValType,
) -> Result<Value, Error> {
    let mut result: Option<Value> = None;
    for instr in expr {
        let v = match (instr.op, instr.arg) {
            (Opcode::End, _) => break,
            (Opcode::I32Const, Arg::I32(v)) => Value::I32(v),
            (Opcode::I64Const, Arg::I64(v)) => Value::I64(v),
            (Opcode::F32Const, Arg::F32(v)) => Value::F32(v),
            (Opcode::F64Const, Arg::F64(v)) => Value::F64(v),
            (Opcode::GlobalGet, Arg::U32(idx)) => {
                globals
                    .get(idx as usize)
                    .ok_or(Error::Validation(UNKNOWN_GLOBAL))?
                    .value
            }
            _ => return Err(Error::Validation(CONST_EXPR_REQUIRED)),
        };
        if result.is_some() {
            return Err(Error::Validation(CONST_EXPR_REQUIRED));
        }
        result = Some(v);
    }
    let value = result.ok_or(Error::Validation(CONST_EXPR_REQUIRED))?;
    if value.ty() != expect {
        return Err(Error::Validation(INVALID_VALUE_TYPE));
    }
    Ok(value)
}
