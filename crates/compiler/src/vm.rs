//! The virtual machine: a dispatch loop over tagged values.
//!
//! Registers: the accumulator, the instruction pointer, the base pointer,
//! a value stack, and a frame stack of saved records. The top frame (the
//! process-wide globals holding builtins and `define`d names) is a separate
//! vector addressed by GRef/GSet and persists across top-level forms.
//!
//! Builtins are closure values whose code word has the high bit set; they
//! are applied through the ordinary Frame/Push/Call path, with the return
//! performed inline.

use crate::bytecode::{CodeGraph, Instr, InstrId};
use crate::error::{Error, Result};
use skein_core::{TaggedValue, alloc_closure, cons, display_string, make_box, make_vector};

/// Marks a closure's code word as a builtin ordinal.
pub const BUILTIN_BIT: u64 = 1 << 63;

struct FrameRec {
    bp: usize,
    ret: InstrId,
    /// Stack height when the frame was saved; the argument count at Call
    /// is measured against it.
    height: usize,
}

pub struct Vm {
    acc: TaggedValue,
    bp: usize,
    stack: Vec<TaggedValue>,
    frames: Vec<FrameRec>,
    globals: Vec<TaggedValue>,
}

impl Vm {
    /// A VM whose top frame is preloaded with the builtin procedures, in
    /// the compiler's slot order.
    pub fn new() -> Self {
        let globals = BUILTINS
            .iter()
            .enumerate()
            .map(|(i, b)| alloc_closure(BUILTIN_BIT | i as u64, b.min_args as i64, &[]))
            .collect();
        Vm {
            acc: TaggedValue::VOID,
            bp: 0,
            stack: Vec::new(),
            frames: Vec::new(),
            globals,
        }
    }

    /// Grow the top frame to `len` slots (new slots start uninitialized).
    pub fn sync_globals(&mut self, len: usize) {
        while self.globals.len() < len {
            self.globals.push(TaggedValue::UNDEF);
        }
    }

    /// Run from `entry` until Halt; the result is the accumulator.
    /// On error the stacks are cleared (the top frame persists), so a REPL
    /// session continues with installed definitions intact.
    pub fn execute(
        &mut self,
        graph: &CodeGraph,
        entry: InstrId,
        global_names: &[String],
    ) -> Result<TaggedValue> {
        let result = self.run(graph, entry, global_names);
        if result.is_err() {
            self.stack.clear();
            self.frames.clear();
            self.bp = 0;
        }
        result
    }

    fn run(
        &mut self,
        graph: &CodeGraph,
        entry: InstrId,
        global_names: &[String],
    ) -> Result<TaggedValue> {
        let mut ip = Some(entry);
        while let Some(at) = ip {
            match &graph[at] {
                Instr::Halt => ip = None,
                Instr::Imm(value, next) => {
                    self.acc = *value;
                    ip = Some(*next);
                }
                Instr::Prim(op, next) => {
                    let len = self.stack.len();
                    if len < 2 {
                        return Err(Error::Internal("primitive on a short stack".into()));
                    }
                    let a = self.stack[len - 2];
                    let b = self.stack[len - 1];
                    if !a.is_fixnum() || !b.is_fixnum() {
                        let got = if a.is_fixnum() { b } else { a };
                        return Err(Error::Type {
                            expected: "number",
                            got: display_string(got),
                        });
                    }
                    self.acc = op.apply(a.as_fixnum(), b.as_fixnum())?;
                    ip = Some(*next);
                }
                Instr::MemRef(offset, next) => {
                    self.acc = self.local(*offset)?;
                    ip = Some(*next);
                }
                Instr::MemSet(offset, next) => {
                    let idx = self.bp + *offset;
                    if idx >= self.stack.len() {
                        return Err(Error::Internal("store outside the frame".into()));
                    }
                    self.stack[idx] = self.acc;
                    ip = Some(*next);
                }
                Instr::GRef(slot, next) => {
                    let value = self.globals.get(*slot).copied().unwrap_or(TaggedValue::UNDEF);
                    if value.is_undef() {
                        let name = global_names
                            .get(*slot)
                            .cloned()
                            .unwrap_or_else(|| format!("<global {}>", slot));
                        return Err(Error::Unbound(name));
                    }
                    self.acc = value;
                    ip = Some(*next);
                }
                Instr::GSet(slot, next) => {
                    if *slot >= self.globals.len() {
                        self.sync_globals(*slot + 1);
                    }
                    self.globals[*slot] = self.acc;
                    ip = Some(*next);
                }
                Instr::Branch(then, els) => {
                    ip = Some(if self.acc.is_truthy() { *then } else { *els });
                }
                Instr::Push(next) => {
                    self.stack.push(self.acc);
                    ip = Some(*next);
                }
                Instr::Pop(n, next) => {
                    let len = self.stack.len();
                    if len < *n {
                        return Err(Error::Internal("pop on a short stack".into()));
                    }
                    self.stack.truncate(len - n);
                    ip = Some(*next);
                }
                Instr::Closure { code, arity, captures, next } => {
                    let mut captured = Vec::with_capacity(captures.len());
                    for &offset in captures {
                        captured.push(self.local(offset)?);
                    }
                    self.acc = alloc_closure(*code as u64, *arity as i64, &captured);
                    ip = Some(*next);
                }
                Instr::Frame(ret, next) => {
                    self.frames.push(FrameRec {
                        bp: self.bp,
                        ret: *ret,
                        height: self.stack.len(),
                    });
                    ip = Some(*next);
                }
                Instr::Call => {
                    let clos = self.acc.as_closure().ok_or_else(|| Error::Type {
                        expected: "procedure",
                        got: display_string(self.acc),
                    })?;
                    let frame = self
                        .frames
                        .last()
                        .ok_or_else(|| Error::Internal("call without a frame".into()))?;
                    let argc = self.stack.len() - frame.height;

                    if clos.code & BUILTIN_BIT != 0 {
                        let builtin = &BUILTINS[(clos.code & !BUILTIN_BIT) as usize];
                        builtin.check_arity(argc)?;
                        let args = &self.stack[self.stack.len() - argc..];
                        let result = (builtin.func)(args)?;
                        // inline Ret(argc)
                        let height = self.stack.len() - argc;
                        self.stack.truncate(height);
                        let frame = self.frames.pop().expect("frame checked above");
                        self.bp = frame.bp;
                        self.acc = result;
                        ip = Some(frame.ret);
                    } else {
                        if clos.arity as usize != argc {
                            return Err(Error::Arity {
                                expected: clos.arity as usize,
                                got: argc,
                            });
                        }
                        self.bp = self.stack.len() - argc;
                        self.stack.extend_from_slice(clos.free_vars());
                        ip = Some(clos.code as InstrId);
                    }
                }
                Instr::Ret(n) => {
                    let len = self.stack.len();
                    if len < *n {
                        return Err(Error::Internal("return on a short stack".into()));
                    }
                    self.stack.truncate(len - n);
                    let frame = self
                        .frames
                        .pop()
                        .ok_or_else(|| Error::Internal("return without a frame".into()))?;
                    self.bp = frame.bp;
                    ip = Some(frame.ret);
                }
            }
        }
        Ok(self.acc)
    }

    fn local(&self, offset: usize) -> Result<TaggedValue> {
        self.stack
            .get(self.bp + offset)
            .copied()
            .ok_or_else(|| Error::Internal("read outside the frame".into()))
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Builtin procedures
// =============================================================================

struct Builtin {
    name: &'static str,
    min_args: usize,
    variadic: bool,
    func: fn(&[TaggedValue]) -> Result<TaggedValue>,
}

impl Builtin {
    fn check_arity(&self, argc: usize) -> Result<()> {
        if self.variadic {
            if argc < self.min_args {
                return Err(Error::ArityAtLeast { expected: self.min_args, got: argc });
            }
        } else if argc != self.min_args {
            return Err(Error::Arity { expected: self.min_args, got: argc });
        }
        Ok(())
    }
}

fn expect_fixnum(v: TaggedValue) -> Result<i64> {
    if v.is_fixnum() {
        Ok(v.as_fixnum())
    } else {
        Err(Error::Type { expected: "number", got: display_string(v) })
    }
}

fn nonzero(n: i64) -> Result<i64> {
    if n == 0 {
        Err(Error::Type { expected: "nonzero divisor", got: "0".into() })
    } else {
        Ok(n)
    }
}

fn fold_arith(args: &[TaggedValue], op: fn(i64, i64) -> Result<i64>) -> Result<TaggedValue> {
    let mut acc = expect_fixnum(args[0])?;
    for &v in &args[1..] {
        acc = op(acc, expect_fixnum(v)?)?;
    }
    Ok(TaggedValue::fixnum(acc))
}

fn bi_add(args: &[TaggedValue]) -> Result<TaggedValue> {
    fold_arith(args, |a, b| Ok(a.wrapping_add(b)))
}

fn bi_sub(args: &[TaggedValue]) -> Result<TaggedValue> {
    fold_arith(args, |a, b| Ok(a.wrapping_sub(b)))
}

fn bi_mul(args: &[TaggedValue]) -> Result<TaggedValue> {
    fold_arith(args, |a, b| Ok(a.wrapping_mul(b)))
}

fn bi_div(args: &[TaggedValue]) -> Result<TaggedValue> {
    fold_arith(args, |a, b| Ok(a / nonzero(b)?))
}

fn bi_mod(args: &[TaggedValue]) -> Result<TaggedValue> {
    let a = expect_fixnum(args[0])?;
    let b = nonzero(expect_fixnum(args[1])?)?;
    Ok(TaggedValue::fixnum(a % b))
}

fn compare(args: &[TaggedValue], op: fn(i64, i64) -> bool) -> Result<TaggedValue> {
    Ok(TaggedValue::boolean(op(
        expect_fixnum(args[0])?,
        expect_fixnum(args[1])?,
    )))
}

fn bi_lt(args: &[TaggedValue]) -> Result<TaggedValue> {
    compare(args, |a, b| a < b)
}

fn bi_le(args: &[TaggedValue]) -> Result<TaggedValue> {
    compare(args, |a, b| a <= b)
}

fn bi_num_eq(args: &[TaggedValue]) -> Result<TaggedValue> {
    compare(args, |a, b| a == b)
}

fn bi_gt(args: &[TaggedValue]) -> Result<TaggedValue> {
    compare(args, |a, b| a > b)
}

fn bi_ge(args: &[TaggedValue]) -> Result<TaggedValue> {
    compare(args, |a, b| a >= b)
}

fn bi_num_ne(args: &[TaggedValue]) -> Result<TaggedValue> {
    compare(args, |a, b| a != b)
}

fn bi_cons(args: &[TaggedValue]) -> Result<TaggedValue> {
    Ok(cons(args[0], args[1]))
}

fn bi_car(args: &[TaggedValue]) -> Result<TaggedValue> {
    args[0]
        .as_pair()
        .map(|p| p.car)
        .ok_or_else(|| Error::Type { expected: "cons cell", got: display_string(args[0]) })
}

fn bi_cdr(args: &[TaggedValue]) -> Result<TaggedValue> {
    args[0]
        .as_pair()
        .map(|p| p.cdr)
        .ok_or_else(|| Error::Type { expected: "cons cell", got: display_string(args[0]) })
}

fn bi_box(args: &[TaggedValue]) -> Result<TaggedValue> {
    Ok(make_box(args[0]))
}

fn bi_unbox(args: &[TaggedValue]) -> Result<TaggedValue> {
    let cell = args[0]
        .as_box()
        .ok_or_else(|| Error::Type { expected: "box", got: display_string(args[0]) })?;
    if cell.value.is_undef() {
        // a letrec slot read before its initializer ran
        return Err(Error::Unbound("<uninitialized letrec binding>".into()));
    }
    Ok(cell.value)
}

fn bi_set_box(args: &[TaggedValue]) -> Result<TaggedValue> {
    if !args[0].set_box(args[1]) {
        return Err(Error::Type { expected: "box", got: display_string(args[0]) });
    }
    Ok(TaggedValue::VOID)
}

fn bi_make_vector(args: &[TaggedValue]) -> Result<TaggedValue> {
    Ok(make_vector(expect_fixnum(args[0])?, args[1]))
}

fn vector_index(v: TaggedValue, idx: TaggedValue) -> Result<(TaggedValue, i64)> {
    let vec = v
        .as_vector()
        .ok_or_else(|| Error::Type { expected: "vector", got: display_string(v) })?;
    let i = expect_fixnum(idx)?;
    if i < 0 || i >= vec.len {
        return Err(Error::Type {
            expected: "vector index in range",
            got: i.to_string(),
        });
    }
    Ok((v, i))
}

fn bi_vector_ref(args: &[TaggedValue]) -> Result<TaggedValue> {
    let (v, i) = vector_index(args[0], args[1])?;
    Ok(v.vector_get(i).expect("index checked"))
}

fn bi_vector_set(args: &[TaggedValue]) -> Result<TaggedValue> {
    let (v, i) = vector_index(args[0], args[1])?;
    v.vector_set(i, args[2]);
    Ok(TaggedValue::VOID)
}

fn bi_vector_length(args: &[TaggedValue]) -> Result<TaggedValue> {
    let vec = args[0]
        .as_vector()
        .ok_or_else(|| Error::Type { expected: "vector", got: display_string(args[0]) })?;
    Ok(TaggedValue::fixnum(vec.len))
}

fn bi_null_q(args: &[TaggedValue]) -> Result<TaggedValue> {
    Ok(TaggedValue::boolean(args[0].is_nil()))
}

fn bi_pair_q(args: &[TaggedValue]) -> Result<TaggedValue> {
    Ok(TaggedValue::boolean(args[0].is_pair()))
}

fn bi_symbol_q(args: &[TaggedValue]) -> Result<TaggedValue> {
    Ok(TaggedValue::boolean(args[0].is_symbol()))
}

fn bi_number_q(args: &[TaggedValue]) -> Result<TaggedValue> {
    Ok(TaggedValue::boolean(args[0].is_fixnum()))
}

fn bi_boolean_q(args: &[TaggedValue]) -> Result<TaggedValue> {
    Ok(TaggedValue::boolean(args[0].is_bool()))
}

fn bi_void_q(args: &[TaggedValue]) -> Result<TaggedValue> {
    Ok(TaggedValue::boolean(args[0].is_void()))
}

fn bi_box_q(args: &[TaggedValue]) -> Result<TaggedValue> {
    Ok(TaggedValue::boolean(args[0].is_box()))
}

fn bi_vector_q(args: &[TaggedValue]) -> Result<TaggedValue> {
    Ok(TaggedValue::boolean(args[0].is_vector()))
}

fn bi_eq_q(args: &[TaggedValue]) -> Result<TaggedValue> {
    Ok(TaggedValue::boolean(args[0] == args[1]))
}

fn bi_display(args: &[TaggedValue]) -> Result<TaggedValue> {
    println!("{}", args[0]);
    Ok(TaggedValue::VOID)
}

/// The builtin table, in `PRIMITIVE_NAMES` order: the ordinal of each entry
/// is its top-frame slot.
static BUILTINS: &[Builtin] = &[
    Builtin { name: "+", min_args: 2, variadic: true, func: bi_add },
    Builtin { name: "-", min_args: 2, variadic: true, func: bi_sub },
    Builtin { name: "*", min_args: 2, variadic: true, func: bi_mul },
    Builtin { name: "/", min_args: 2, variadic: true, func: bi_div },
    Builtin { name: "%", min_args: 2, variadic: false, func: bi_mod },
    Builtin { name: "<", min_args: 2, variadic: false, func: bi_lt },
    Builtin { name: "<=", min_args: 2, variadic: false, func: bi_le },
    Builtin { name: "=", min_args: 2, variadic: false, func: bi_num_eq },
    Builtin { name: ">", min_args: 2, variadic: false, func: bi_gt },
    Builtin { name: ">=", min_args: 2, variadic: false, func: bi_ge },
    Builtin { name: "!=", min_args: 2, variadic: false, func: bi_num_ne },
    Builtin { name: "cons", min_args: 2, variadic: false, func: bi_cons },
    Builtin { name: "car", min_args: 1, variadic: false, func: bi_car },
    Builtin { name: "cdr", min_args: 1, variadic: false, func: bi_cdr },
    Builtin { name: "box", min_args: 1, variadic: false, func: bi_box },
    Builtin { name: "unbox", min_args: 1, variadic: false, func: bi_unbox },
    Builtin { name: "set-box!", min_args: 2, variadic: false, func: bi_set_box },
    Builtin { name: "box?", min_args: 1, variadic: false, func: bi_box_q },
    Builtin { name: "make-vector", min_args: 2, variadic: false, func: bi_make_vector },
    Builtin { name: "vector-ref", min_args: 2, variadic: false, func: bi_vector_ref },
    Builtin { name: "vector-set!", min_args: 3, variadic: false, func: bi_vector_set },
    Builtin { name: "vector-length", min_args: 1, variadic: false, func: bi_vector_length },
    Builtin { name: "vector?", min_args: 1, variadic: false, func: bi_vector_q },
    Builtin { name: "null?", min_args: 1, variadic: false, func: bi_null_q },
    Builtin { name: "pair?", min_args: 1, variadic: false, func: bi_pair_q },
    Builtin { name: "symbol?", min_args: 1, variadic: false, func: bi_symbol_q },
    Builtin { name: "number?", min_args: 1, variadic: false, func: bi_number_q },
    Builtin { name: "boolean?", min_args: 1, variadic: false, func: bi_boolean_q },
    Builtin { name: "void?", min_args: 1, variadic: false, func: bi_void_q },
    Builtin { name: "eq?", min_args: 2, variadic: false, func: bi_eq_q },
    Builtin { name: "display", min_args: 1, variadic: false, func: bi_display },
];
