//! Native code generation for IR programs, via Cranelift.
//!
//! Scalars become Cranelift variables and each array gets its own explicit
//! stack slot. `u8` values are `i8`, `u64` values `i64` and `f64` values
//! `f64`. The function is compiled for the host ISA and must not need any
//! relocation, so its bytes can be copied anywhere and called.
//!
//! Indexed accesses are bounds-checked against the array's static length:
//! an out-of-range read yields 0 and an out-of-range store is skipped, so
//! generated code never touches memory outside its own frame.

use std::collections::HashMap;

use cranelift_codegen::control::ControlPlane;
use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::immediates::Ieee64;
use cranelift_codegen::ir::{
    types, AbiParam, Function, InstBuilder, MemFlags, Signature, StackSlot, StackSlotData,
    StackSlotKind, Type, UserFuncName, Value,
};
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_codegen::Context;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext, Variable};
use tracing::{debug, instrument};

use super::{Backend, MachineCode};
use crate::error::{Error, Result};
use crate::ir::{BinOp, Expr, Program, Stmt};
use crate::types::{ScalarType, Val, ValType};

/// Largest frame the backend will lay out, in bytes.
pub const DEFAULT_MAX_FRAME: usize = 64 * 1024;

/// Code generator for the host ISA. The entry point takes no arguments and
/// returns a `u8` in the platform's C calling convention.
#[derive(Debug, Clone)]
pub struct CraneliftBackend {
    max_frame: usize,
    opt_level: &'static str,
}

impl CraneliftBackend {
    pub fn new() -> Self {
        CraneliftBackend {
            max_frame: DEFAULT_MAX_FRAME,
            opt_level: "speed",
        }
    }

    /// Cap the frame size. Values past `u32::MAX` are clamped, since stack
    /// slots are sized with 32 bits.
    pub fn with_max_frame(max_frame: usize) -> Self {
        CraneliftBackend {
            max_frame: max_frame.min(u32::MAX as usize),
            ..Self::new()
        }
    }

    /// Cranelift `opt_level`: `"none"`, `"speed"` or `"speed_and_size"`.
    pub fn with_opt_level(mut self, opt_level: &'static str) -> Self {
        self.opt_level = opt_level;
        self
    }

    fn isa(&self) -> Result<OwnedTargetIsa> {
        let mut flags = settings::builder();
        flags
            .set("opt_level", self.opt_level)
            .map_err(|e| Error::Compile(format!("failed to set opt_level: {e}")))?;
        let isa_builder = cranelift_native::builder()
            .map_err(|e| Error::Compile(format!("no native ISA for this host: {e}")))?;
        isa_builder
            .finish(settings::Flags::new(flags))
            .map_err(|e| Error::Compile(format!("failed to create ISA: {e}")))
    }
}

impl Default for CraneliftBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CraneliftBackend {
    fn target(&self) -> &'static str {
        std::env::consts::ARCH
    }

    #[instrument(level = "debug", skip_all, fields(stmts = program.stmts.len()))]
    fn compile(&self, program: &Program) -> Result<MachineCode> {
        let mut frame = Frame::new(self.max_frame);
        frame.check_block(&program.stmts)?;
        if !ends_with_return(&program.stmts) {
            return Err(Error::Compile("program does not end with a return".into()));
        }
        debug!(frame_bytes = frame.size, bindings = frame.slots.len(), "laid out frame");

        let isa = self.isa()?;
        let mut sig = Signature::new(isa.default_call_conv());
        sig.returns.push(AbiParam::new(types::I8));
        let mut func = Function::with_name_signature(UserFuncName::user(0, 0), sig);
        let mut fctx = FunctionBuilderContext::new();
        {
            let builder = FunctionBuilder::new(&mut func, &mut fctx);
            let mut lower = Lowering::new(builder, &frame);
            for s in &program.stmts {
                lower.stmt(s)?;
            }
            lower.finish();
        }

        let mut ctx = Context::for_function(func);
        let compiled = ctx
            .compile(&*isa, &mut ControlPlane::default())
            .map_err(|e| Error::Compile(format!("cranelift: {}", e.inner)))?;
        if !compiled.buffer.relocs().is_empty() {
            return Err(Error::Compile(format!(
                "generated code needs {} relocation(s)",
                compiled.buffer.relocs().len()
            )));
        }
        let code = compiled.code_buffer().to_vec();
        debug!(bytes = code.len(), isa = isa.name(), "emitted machine code");
        Ok(MachineCode::new(code))
    }
}

fn ends_with_return(stmts: &[Stmt]) -> bool {
    match stmts.last() {
        Some(Stmt::Return(_)) => true,
        Some(Stmt::Block(inner)) => ends_with_return(inner),
        _ => false,
    }
}

fn clif_type(ty: ScalarType) -> Type {
    match ty {
        ScalarType::U8 => types::I8,
        ScalarType::U64 => types::I64,
        ScalarType::F64 => types::F64,
    }
}

/// Bytes an array of `len` elements takes, padded to 8.
fn array_bytes(elem: ScalarType, len: usize) -> Option<usize> {
    len.checked_mul(elem.size())
        .and_then(|raw| raw.checked_add(7))
        .map(|raw| raw & !7)
}

// ── Type checking and layout ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Slot {
    /// Binding number, in order of first assignment.
    index: u32,
    ty: ValType,
}

struct Frame {
    slots: HashMap<String, Slot>,
    size: usize,
    max: usize,
}

impl Frame {
    fn new(max: usize) -> Self {
        Frame {
            slots: HashMap::new(),
            size: 0,
            max,
        }
    }

    fn slot(&self, name: &str) -> Result<Slot> {
        self.slots
            .get(name)
            .copied()
            .ok_or_else(|| Error::Compile(format!("undefined name `{name}`")))
    }

    fn array(&self, name: &str) -> Result<(ScalarType, usize, u32)> {
        match self.slot(name)? {
            Slot {
                index,
                ty: ValType::Array(elem, len),
            } => Ok((elem, len, index)),
            _ => Err(Error::Compile(format!("`{name}` is not an array"))),
        }
    }

    fn allocate(&mut self, name: &str, ty: ValType) -> Result<()> {
        let bytes = match ty {
            ValType::Scalar(_) => 8,
            ValType::Array(elem, len) => array_bytes(elem, len)
                .ok_or_else(|| Error::Compile(format!("array `{name}` is too large")))?,
        };
        let size = self.size + bytes;
        if size > self.max {
            return Err(Error::Compile(format!(
                "frame of {size} bytes exceeds the {} byte limit",
                self.max
            )));
        }
        self.size = size;
        let index = self.slots.len() as u32;
        self.slots.insert(name.to_string(), Slot { index, ty });
        Ok(())
    }

    /// Type of a scalar-valued expression.
    fn expr_type(&self, e: &Expr) -> Result<ScalarType> {
        match e {
            Expr::Lit(v) => Ok(v.ty()),
            Expr::Var(name) => self.slot(name)?.ty.scalar().ok_or_else(|| {
                Error::Compile(format!("array `{name}` used as a scalar"))
            }),
            Expr::StaticArray(..) => Err(Error::Compile(
                "a static array can only be bound directly to a name".into(),
            )),
            Expr::Index { array, index } => {
                let (elem, _, _) = self.array(array)?;
                if !self.expr_type(index)?.is_integer() {
                    return Err(Error::Compile(format!("index into `{array}` is not an integer")));
                }
                Ok(elem)
            }
            Expr::Binary { op, lhs, rhs } => {
                let operand = ScalarType::promote(self.expr_type(lhs)?, self.expr_type(rhs)?);
                if op.is_comparison() {
                    Ok(ScalarType::U64)
                } else if *op == BinOp::Div && operand.is_integer() {
                    Err(Error::Compile("integer division is not supported".into()))
                } else {
                    Ok(operand)
                }
            }
        }
    }

    fn check_block(&mut self, stmts: &[Stmt]) -> Result<()> {
        stmts.iter().try_for_each(|s| self.check_stmt(s))
    }

    fn check_stmt(&mut self, s: &Stmt) -> Result<()> {
        match s {
            Stmt::Assign {
                name,
                value: Expr::StaticArray(elem, vals),
            } => {
                if self.slots.contains_key(name) {
                    return Err(Error::Compile(format!("array `{name}` is bound twice")));
                }
                if let Some(v) = vals.iter().find(|v| v.ty() != *elem) {
                    return Err(Error::Compile(format!(
                        "array `{name}` of {elem} holds a {} literal",
                        v.ty()
                    )));
                }
                self.allocate(name, ValType::Array(*elem, vals.len()))
            }
            Stmt::Assign { name, value } => {
                let ty = self.expr_type(value)?;
                match self.slots.get(name).map(|slot| slot.ty) {
                    Some(ValType::Array(..)) => Err(Error::Compile(format!(
                        "cannot assign a scalar to array `{name}`"
                    ))),
                    Some(ValType::Scalar(_)) => Ok(()),
                    None => self.allocate(name, ValType::Scalar(ty)),
                }
            }
            Stmt::Store {
                array,
                index,
                value,
            } => {
                self.array(array)?;
                if !self.expr_type(index)?.is_integer() {
                    return Err(Error::Compile(format!("index into `{array}` is not an integer")));
                }
                self.expr_type(value).map(|_| ())
            }
            Stmt::While { cond, body } => {
                if !self.expr_type(cond)?.is_integer() {
                    return Err(Error::Compile("loop condition is not an integer".into()));
                }
                self.check_block(body)
            }
            Stmt::Block(body) => self.check_block(body),
            Stmt::Return(e) => self.expr_type(e).map(|_| ()),
        }
    }
}

// ── Lowering ─────────────────────────────────────────────────────────────────

struct Lowering<'a, 'f> {
    b: FunctionBuilder<'f>,
    frame: &'a Frame,
    arrays: HashMap<u32, StackSlot>,
    /// The current block already ends in a `return`.
    terminated: bool,
}

impl<'a, 'f> Lowering<'a, 'f> {
    fn new(mut b: FunctionBuilder<'f>, frame: &'a Frame) -> Self {
        let entry = b.create_block();
        b.switch_to_block(entry);

        let mut arrays = HashMap::new();
        for slot in frame.slots.values() {
            match slot.ty {
                ValType::Scalar(ty) => b.declare_var(Variable::from_u32(slot.index), clif_type(ty)),
                ValType::Array(elem, len) => {
                    // The frame check has already bounded the size.
                    let bytes = array_bytes(elem, len).unwrap_or(0).max(8) as u32;
                    let ss = b.create_sized_stack_slot(StackSlotData::new(
                        StackSlotKind::ExplicitSlot,
                        bytes,
                        3,
                    ));
                    arrays.insert(slot.index, ss);
                }
            }
        }

        Lowering {
            b,
            frame,
            arrays,
            terminated: false,
        }
    }

    fn finish(mut self) {
        self.b.seal_all_blocks();
        self.b.finalize();
    }

    fn stack_slot(&self, index: u32) -> Result<StackSlot> {
        self.arrays
            .get(&index)
            .copied()
            .ok_or_else(|| Error::Compile(format!("binding #{index} has no stack slot")))
    }

    /// Statements after a `return` go into a fresh, unreachable block.
    fn reopen(&mut self) {
        if self.terminated {
            let block = self.b.create_block();
            self.b.switch_to_block(block);
            self.terminated = false;
        }
    }

    fn stmt(&mut self, s: &Stmt) -> Result<()> {
        self.reopen();
        match s {
            Stmt::Assign {
                name,
                value: Expr::StaticArray(elem, vals),
            } => {
                let ss = self.stack_slot(self.frame.slot(name)?.index)?;
                self.array_init(ss, *elem, vals);
            }
            Stmt::Assign { name, value } => {
                let slot = self.frame.slot(name)?;
                let target = slot
                    .ty
                    .scalar()
                    .ok_or_else(|| Error::Compile(format!("`{name}` is an array")))?;
                let (v, ty) = self.expr(value)?;
                let v = self.convert(v, ty, target);
                self.b.def_var(Variable::from_u32(slot.index), v);
            }
            Stmt::Store {
                array,
                index,
                value,
            } => {
                let (elem, len, id) = self.frame.array(array)?;
                let ss = self.stack_slot(id)?;
                let (v, ty) = self.expr(value)?;
                let v = self.convert(v, ty, elem);
                let (i, ity) = self.expr(index)?;
                let i = self.convert(i, ity, ScalarType::U64);

                let store = self.b.create_block();
                let done = self.b.create_block();
                let in_range = self.b.ins().icmp_imm(IntCC::UnsignedLessThan, i, len as i64);
                self.b.ins().brif(in_range, store, &[], done, &[]);
                self.b.switch_to_block(store);
                let addr = self.element_addr(ss, elem, i);
                self.b.ins().store(MemFlags::trusted(), v, addr, 0);
                self.b.ins().jump(done, &[]);
                self.b.switch_to_block(done);
            }
            Stmt::While { cond, body } => {
                let header = self.b.create_block();
                let body_block = self.b.create_block();
                let exit = self.b.create_block();
                self.b.ins().jump(header, &[]);

                self.b.switch_to_block(header);
                let (c, _) = self.expr(cond)?;
                self.b.ins().brif(c, body_block, &[], exit, &[]);

                self.b.switch_to_block(body_block);
                for s in body {
                    self.stmt(s)?;
                }
                if !self.terminated {
                    self.b.ins().jump(header, &[]);
                }
                self.b.switch_to_block(exit);
                self.terminated = false;
            }
            Stmt::Block(body) => {
                for s in body {
                    self.stmt(s)?;
                }
            }
            Stmt::Return(e) => {
                let (v, ty) = self.expr(e)?;
                let v = self.convert(v, ty, ScalarType::U8);
                self.b.ins().return_(&[v]);
                self.terminated = true;
            }
        }
        Ok(())
    }

    /// Write a static array's literal contents into its slot.
    fn array_init(&mut self, ss: StackSlot, elem: ScalarType, vals: &[Val]) {
        let words: Vec<u64> = if elem == ScalarType::U8 {
            // Eight bytes per store; slot padding absorbs the tail.
            vals.chunks(8)
                .map(|chunk| {
                    let mut bytes = [0u8; 8];
                    for (b, v) in bytes.iter_mut().zip(chunk) {
                        *b = v.bits() as u8;
                    }
                    u64::from_le_bytes(bytes)
                })
                .collect()
        } else {
            vals.iter().map(|v| v.bits()).collect()
        };
        let mut loaded: Option<(u64, Value)> = None;
        for (i, word) in words.into_iter().enumerate() {
            let v = match loaded {
                Some((w, v)) if w == word => v,
                _ => {
                    let v = self.b.ins().iconst(types::I64, word as i64);
                    loaded = Some((word, v));
                    v
                }
            };
            self.b.ins().stack_store(v, ss, 8 * i as i32);
        }
    }

    /// Address of element `index` (already known to be in range).
    fn element_addr(&mut self, ss: StackSlot, elem: ScalarType, index: Value) -> Value {
        let base = self.b.ins().stack_addr(types::I64, ss, 0);
        let offset = match elem.size() {
            1 => index,
            size => self.b.ins().imul_imm(index, size as i64),
        };
        self.b.ins().iadd(base, offset)
    }

    fn constant(&mut self, v: Val) -> Value {
        match v {
            Val::U8(b) => self.b.ins().iconst(types::I8, i64::from(b)),
            Val::U64(n) => self.b.ins().iconst(types::I64, n as i64),
            Val::F64(f) => self.b.ins().f64const(Ieee64::with_float(f)),
        }
    }

    /// Lower `e`, returning its value and type.
    fn expr(&mut self, e: &Expr) -> Result<(Value, ScalarType)> {
        match e {
            Expr::Lit(v) => Ok((self.constant(*v), v.ty())),
            Expr::Var(name) => {
                let ty = self.frame.expr_type(e)?;
                let var = Variable::from_u32(self.frame.slot(name)?.index);
                Ok((self.b.use_var(var), ty))
            }
            Expr::StaticArray(..) => {
                let ty = self.frame.expr_type(e)?;
                Ok((self.constant(Val::default_for(ty)), ty))
            }
            Expr::Index { array, index } => {
                let (elem, len, id) = self.frame.array(array)?;
                let ss = self.stack_slot(id)?;
                let (i, ity) = self.expr(index)?;
                let i = self.convert(i, ity, ScalarType::U64);
                let zero = self.constant(Val::default_for(elem));
                if len == 0 {
                    return Ok((zero, elem));
                }
                // Clamp the address to element 0 so the load itself stays in
                // the slot, then discard it when out of range.
                let in_range = self.b.ins().icmp_imm(IntCC::UnsignedLessThan, i, len as i64);
                let first = self.b.ins().iconst(types::I64, 0);
                let safe = self.b.ins().select(in_range, i, first);
                let addr = self.element_addr(ss, elem, safe);
                let loaded = self.b.ins().load(clif_type(elem), MemFlags::trusted(), addr, 0);
                Ok((self.b.ins().select(in_range, loaded, zero), elem))
            }
            Expr::Binary { op, lhs, rhs } => {
                let result = self.frame.expr_type(e)?;
                let (l, lt) = self.expr(lhs)?;
                let (r, rt) = self.expr(rhs)?;
                let operand = ScalarType::promote(lt, rt);
                let l = self.convert(l, lt, operand);
                let r = self.convert(r, rt, operand);

                if op.is_comparison() {
                    let flag = if operand.is_float() {
                        self.b.ins().fcmp(float_cc(*op), l, r)
                    } else {
                        self.b.ins().icmp(int_cc(*op), l, r)
                    };
                    return Ok((self.b.ins().uextend(types::I64, flag), result));
                }

                let v = match (op, operand.is_float()) {
                    (BinOp::Add, true) => self.b.ins().fadd(l, r),
                    (BinOp::Sub, true) => self.b.ins().fsub(l, r),
                    (BinOp::Mul, true) => self.b.ins().fmul(l, r),
                    (BinOp::Div, true) => self.b.ins().fdiv(l, r),
                    (BinOp::Add, false) => self.b.ins().iadd(l, r),
                    (BinOp::Sub, false) => self.b.ins().isub(l, r),
                    (BinOp::Mul, false) => self.b.ins().imul(l, r),
                    _ => return Err(Error::Compile("integer division is not supported".into())),
                };
                Ok((v, result))
            }
        }
    }

    /// Convert `v` between scalar representations. Floats truncate toward
    /// zero when stored into integers; narrowing to `u8` keeps the low byte.
    fn convert(&mut self, v: Value, from: ScalarType, to: ScalarType) -> Value {
        use ScalarType::*;
        match (from, to) {
            (a, b) if a == b => v,
            (U8, U64) => self.b.ins().uextend(types::I64, v),
            (U64, U8) => self.b.ins().ireduce(types::I8, v),
            (U8, F64) => {
                let wide = self.b.ins().uextend(types::I64, v);
                self.b.ins().fcvt_from_uint(types::F64, wide)
            }
            (U64, F64) => self.b.ins().fcvt_from_uint(types::F64, v),
            (F64, U64) => self.b.ins().fcvt_to_sint_sat(types::I64, v),
            (F64, U8) => {
                let wide = self.b.ins().fcvt_to_sint_sat(types::I64, v);
                self.b.ins().ireduce(types::I8, wide)
            }
            _ => v,
        }
    }
}

fn int_cc(op: BinOp) -> IntCC {
    match op {
        BinOp::Eq => IntCC::Equal,
        BinOp::Ne => IntCC::NotEqual,
        BinOp::Lt => IntCC::UnsignedLessThan,
        BinOp::Gt => IntCC::UnsignedGreaterThan,
        BinOp::Le => IntCC::UnsignedLessThanOrEqual,
        _ => IntCC::UnsignedGreaterThanOrEqual,
    }
}

/// IEEE-754 predicates: every ordered comparison with a NaN is false and
/// `!=` is true.
fn float_cc(op: BinOp) -> FloatCC {
    match op {
        BinOp::Eq => FloatCC::Equal,
        BinOp::Ne => FloatCC::NotEqual,
        BinOp::Lt => FloatCC::LessThan,
        BinOp::Gt => FloatCC::GreaterThan,
        BinOp::Le => FloatCC::LessThanOrEqual,
        _ => FloatCC::GreaterThanOrEqual,
    }
}
