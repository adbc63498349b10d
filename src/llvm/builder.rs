// This module provides EmitBuilder, the function-scoped builder at the heart of lazyemit. It
// owns the LLVM module and IR builder for a caller-supplied context and tracks at most one
// active function (Idle -> InFunction -> Idle). Callers construct trees of deferred values
// (literals, arguments, binary operations, selects, calls) without emitting anything; code
// is produced only when a node is realized, either explicitly or when exit_function realizes
// the return expression. Realization is left-to-right and memoized per node. A select is
// lowered at realization time into success/failure/merge blocks joined by a phi whose
// incoming blocks are the blocks each branch actually ended in, which keeps nested selects
// correct. Function handles are allocated on entry, so a body may call its own function.

//! Function-scoped builder and deferred-value realization.

use super::executor::{EngineOptions, Executor};
use super::merge::MergeNode;
use crate::core::{BinaryOp, BuildError, BuildResult, BuildSession, Deferred, DeferredKind};
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{AnyTypeEnum, BasicMetadataTypeEnum, BasicTypeEnum, FunctionType, IntType};
use inkwell::values::{
    AsValueRef, BasicMetadataValueEnum, BasicValueEnum, FunctionValue, InstructionValue, IntValue,
};
use inkwell::IntPredicate;
use llvm_sys::core::{LLVMGetUndef, LLVMReplaceAllUsesWith, LLVMTypeOf};
use std::path::Path;

/// Short name of an integer type, e.g. `i64`.
pub(crate) fn int_type_name(ty: IntType<'_>) -> String {
    format!("i{}", ty.get_bit_width())
}

fn basic_type_name(ty: BasicTypeEnum<'_>) -> String {
    match ty {
        BasicTypeEnum::IntType(int) => int_type_name(int),
        _ => "non-integer".to_string(),
    }
}

pub(crate) fn function_name(function: FunctionValue<'_>) -> String {
    function.get_name().to_string_lossy().into_owned()
}

/// State of the function currently being built.
#[derive(Debug)]
struct FunctionContext<'ctx> {
    function: FunctionValue<'ctx>,
    arguments: Vec<IntValue<'ctx>>,
}

/// Builder turning deferred-value trees into LLVM IR.
///
/// Not reentrant; one function is built at a time.
pub struct EmitBuilder<'a, 'ctx> {
    context: &'ctx Context,
    module: Module<'ctx>,
    builder: Builder<'ctx>,
    session: &'a BuildSession<'a>,
    i64_type: IntType<'ctx>,
    current: Option<FunctionContext<'ctx>>,
}

impl<'a, 'ctx: 'a> EmitBuilder<'a, 'ctx> {
    /// Create a builder emitting into a fresh module named `module_name`.
    pub fn new(context: &'ctx Context, module_name: &str, session: &'a BuildSession<'a>) -> Self {
        Self {
            context,
            module: context.create_module(module_name),
            builder: context.create_builder(),
            session,
            i64_type: context.i64_type(),
            current: None,
        }
    }

    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    pub fn session(&self) -> &'a BuildSession<'a> {
        self.session
    }

    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    pub(crate) fn ir_builder(&self) -> &Builder<'ctx> {
        &self.builder
    }

    pub fn i64_type(&self) -> IntType<'ctx> {
        self.i64_type
    }

    /// Type produced by comparisons.
    pub fn bool_type(&self) -> IntType<'ctx> {
        self.context.bool_type()
    }

    pub fn is_in_function(&self) -> bool {
        self.current.is_some()
    }

    /// Handle of the function being built, if any.
    pub fn current_function(&self) -> Option<FunctionValue<'ctx>> {
        self.current.as_ref().map(|active| active.function)
    }

    /// Block at the insertion point.
    pub fn current_block(&self) -> Option<BasicBlock<'ctx>> {
        self.current.as_ref()?;
        self.builder.get_insert_block()
    }

    pub fn get_function(&self, name: &str) -> Option<FunctionValue<'ctx>> {
        self.module.get_function(name)
    }

    fn require_function(&self) -> BuildResult<&FunctionContext<'ctx>> {
        self.current.as_ref().ok_or(BuildError::NotInFunction)
    }

    pub(crate) fn require_idle(&self) -> BuildResult<()> {
        match &self.current {
            Some(active) => Err(BuildError::AlreadyInFunction {
                name: function_name(active.function),
            }),
            None => Ok(()),
        }
    }

    fn insert_block(&self) -> BuildResult<BasicBlock<'ctx>> {
        self.builder
            .get_insert_block()
            .ok_or(BuildError::NotInFunction)
    }

    /// Declare `name`, or reuse an existing declaration with the same type.
    pub(crate) fn declare(
        &self,
        name: &str,
        fn_type: FunctionType<'ctx>,
    ) -> BuildResult<FunctionValue<'ctx>> {
        match self.module.get_function(name) {
            Some(existing) if existing.get_type() == fn_type => {
                if existing.count_basic_blocks() > 0 {
                    return Err(BuildError::DuplicateDefinition {
                        name: name.to_string(),
                    });
                }
                log::debug!("Reusing declaration of '{}'", name);
                Ok(existing)
            }
            Some(existing) => Err(BuildError::SignatureMismatch {
                name: name.to_string(),
                reason: format!(
                    "already declared with {} parameter(s) and a different type",
                    existing.count_params()
                ),
            }),
            None => Ok(self.module.add_function(name, fn_type, None)),
        }
    }

    // =========================================================================
    // Function lifecycle
    // =========================================================================

    /// Start building `name`.
    ///
    /// The returned handle is valid immediately, so the body may call it.
    pub fn enter_function(
        &mut self,
        name: &str,
        result: IntType<'ctx>,
        params: &[IntType<'ctx>],
    ) -> BuildResult<FunctionValue<'ctx>> {
        self.require_idle()?;

        let param_types: Vec<BasicMetadataTypeEnum<'ctx>> =
            params.iter().map(|ty| (*ty).into()).collect();
        let function = self.declare(name, result.fn_type(&param_types, false))?;

        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);

        let arguments = function
            .get_param_iter()
            .map(|param| param.into_int_value())
            .collect();
        self.current = Some(FunctionContext {
            function,
            arguments,
        });

        log::info!("🔧 Entered function '{}' ({} params)", name, params.len());
        Ok(function)
    }

    /// Realize `ret`, return it and go back to idle.
    pub fn exit_function(&mut self, ret: Deferred<'a, 'ctx>) -> BuildResult<()> {
        let function = self.require_function()?.function;
        let value = self.realize(ret)?;

        match function.get_type().get_return_type() {
            Some(BasicTypeEnum::IntType(expected)) if expected == value.get_type() => {}
            Some(expected) => {
                return Err(BuildError::type_mismatch(
                    "return value",
                    basic_type_name(expected),
                    int_type_name(value.get_type()),
                ))
            }
            None => {
                return Err(BuildError::type_mismatch(
                    "return value",
                    "void",
                    int_type_name(value.get_type()),
                ))
            }
        }

        self.builder.build_return(Some(&value))?;
        self.session.record_instruction("ret");

        let name = function_name(function);
        let blocks = function.count_basic_blocks();
        self.session.record_function_defined(&name, blocks);
        log::info!("✅ Finished function '{}' ({} blocks)", name, blocks);

        self.current = None;
        self.builder.clear_insertion_position();
        Ok(())
    }

    /// Enter `name`, build its body with `body` and exit with the returned root.
    ///
    /// `body` receives the function's own handle for recursive calls. If the
    /// body or the exit fails, the partial body is dropped and the builder is
    /// idle again; a function declared by this call is removed entirely, so its
    /// handle and any deferred values realized in it must not be reused.
    pub fn define_function<F>(
        &mut self,
        name: &str,
        result: IntType<'ctx>,
        params: &[IntType<'ctx>],
        body: F,
    ) -> BuildResult<FunctionValue<'ctx>>
    where
        F: FnOnce(&mut Self, FunctionValue<'ctx>) -> BuildResult<Deferred<'a, 'ctx>>,
    {
        let declared_here = self.module.get_function(name).is_none();
        let function = self.enter_function(name, result, params)?;

        match body(self, function).and_then(|root| self.exit_function(root)) {
            Ok(()) => Ok(function),
            Err(err) => {
                self.abandon_function(function, declared_here);
                Err(err)
            }
        }
    }

    /// Drop the body built so far and go back to idle.
    fn abandon_function(&mut self, function: FunctionValue<'ctx>, declared_here: bool) {
        log::debug!("Discarding partial body of '{}'", function_name(function));
        self.current = None;
        self.builder.clear_insertion_position();

        if declared_here {
            // SAFETY: the function was added by define_function and only its
            // own body can refer to it.
            unsafe { function.delete() };
            return;
        }

        // Earlier declaration that other functions may call: keep it, strip the body.
        let instructions: Vec<InstructionValue<'ctx>> = function
            .get_basic_blocks()
            .iter()
            .flat_map(|block| block.get_instructions())
            .collect();
        for instruction in &instructions {
            if matches!(instruction.get_type(), AnyTypeEnum::VoidType(_)) {
                continue;
            }
            // SAFETY: the instruction is live and the undef has its own type.
            unsafe {
                let value = instruction.as_value_ref();
                LLVMReplaceAllUsesWith(value, LLVMGetUndef(LLVMTypeOf(value)));
            }
        }
        for instruction in instructions {
            instruction.erase_from_basic_block();
        }
        for block in function.get_basic_blocks() {
            // SAFETY: the block is empty and no branch targets it any more.
            let _ = unsafe { block.delete() };
        }
    }

    /// [`define_function`](Self::define_function) with `arity` i64 parameters and an i64 result.
    pub fn define<F>(&mut self, name: &str, arity: usize, body: F) -> BuildResult<FunctionValue<'ctx>>
    where
        F: FnOnce(&mut Self, FunctionValue<'ctx>) -> BuildResult<Deferred<'a, 'ctx>>,
    {
        let params = vec![self.i64_type; arity];
        self.define_function(name, self.i64_type, &params, body)
    }

    // =========================================================================
    // Deferred-value constructors
    // =========================================================================

    fn node(&self, kind: DeferredKind<'a, 'ctx>) -> Deferred<'a, 'ctx> {
        Deferred::new(self.session, kind)
    }

    pub fn literal(&self, value: i64) -> Deferred<'a, 'ctx> {
        self.node(DeferredKind::Literal(value))
    }

    /// Parameter `index` of the active function.
    pub fn argument(&self, index: usize) -> BuildResult<Deferred<'a, 'ctx>> {
        let active = self.require_function()?;
        let value = *active
            .arguments
            .get(index)
            .ok_or(BuildError::IndexOutOfRange {
                index,
                count: active.arguments.len(),
            })?;
        Ok(self.node(DeferredKind::Argument { index, value }))
    }

    pub fn argument_count(&self) -> BuildResult<usize> {
        Ok(self.require_function()?.arguments.len())
    }

    pub fn binary_op(
        &self,
        left: Deferred<'a, 'ctx>,
        right: Deferred<'a, 'ctx>,
        op: BinaryOp,
    ) -> Deferred<'a, 'ctx> {
        self.node(DeferredKind::Binary { op, left, right })
    }

    /// [`binary_op`](Self::binary_op) with the operator given by mnemonic.
    pub fn binary_op_named(
        &self,
        left: Deferred<'a, 'ctx>,
        right: Deferred<'a, 'ctx>,
        op: &str,
    ) -> BuildResult<Deferred<'a, 'ctx>> {
        Ok(self.binary_op(left, right, op.parse()?))
    }

    /// Conditional value, lowered into branches when realized.
    ///
    /// Each branch is realized in its own block. A non-constant node shared
    /// between the branches, or between a branch and code after the select,
    /// must be realized before the select; otherwise its cached value does not
    /// dominate the later use and verification fails.
    pub fn select(
        &self,
        condition: Deferred<'a, 'ctx>,
        on_true: Deferred<'a, 'ctx>,
        on_false: Deferred<'a, 'ctx>,
    ) -> Deferred<'a, 'ctx> {
        self.node(DeferredKind::Select {
            condition,
            on_true,
            on_false,
        })
    }

    pub fn call(
        &self,
        function: FunctionValue<'ctx>,
        args: &[Deferred<'a, 'ctx>],
    ) -> Deferred<'a, 'ctx> {
        let args = self.session.alloc_slice(args);
        self.node(DeferredKind::Call { function, args })
    }

    // =========================================================================
    // Realization
    // =========================================================================

    /// Emit `value` into the active function, or return its cached handle.
    pub fn realize(&self, value: Deferred<'a, 'ctx>) -> BuildResult<IntValue<'ctx>> {
        let function = self.require_function()?.function;

        if let Some(cached) = value.cached() {
            self.session.record_cache_hit();
            log::trace!("Cache hit for {} node", value.kind().name());
            return Ok(cached);
        }

        value.memo().get_or_try_init(|| {
            let produced = self.produce(value.kind(), function)?;
            self.session.record_realized();
            Ok(produced)
        })
    }

    fn produce(
        &self,
        kind: &DeferredKind<'a, 'ctx>,
        function: FunctionValue<'ctx>,
    ) -> BuildResult<IntValue<'ctx>> {
        match *kind {
            DeferredKind::Literal(value) => Ok(self.i64_type.const_int(value as u64, true)),
            DeferredKind::Argument { value, .. } => Ok(value),
            DeferredKind::Binary { op, left, right } => {
                let lhs = self.realize(left)?;
                let rhs = self.realize(right)?;
                self.emit_binary(op, lhs, rhs)
            }
            DeferredKind::Select {
                condition,
                on_true,
                on_false,
            } => self.lower_select(function, condition, on_true, on_false),
            DeferredKind::Call { function: callee, args } => {
                let realized = args
                    .iter()
                    .map(|arg| self.realize(*arg))
                    .collect::<BuildResult<Vec<_>>>()?;
                self.emit_call(callee, &realized)
            }
        }
    }

    fn emit_binary(
        &self,
        op: BinaryOp,
        lhs: IntValue<'ctx>,
        rhs: IntValue<'ctx>,
    ) -> BuildResult<IntValue<'ctx>> {
        if lhs.get_type() != rhs.get_type() {
            return Err(BuildError::type_mismatch(
                "binary operands",
                int_type_name(lhs.get_type()),
                int_type_name(rhs.get_type()),
            ));
        }

        log::trace!("Emitting {}", op);
        let (out, opcode) = match op {
            BinaryOp::Add => (self.builder.build_int_add(lhs, rhs, "add")?, "add"),
            BinaryOp::Sub => (self.builder.build_int_sub(lhs, rhs, "sub")?, "sub"),
            BinaryOp::Mul => (self.builder.build_int_mul(lhs, rhs, "mul")?, "mul"),
            BinaryOp::Mod => (self.builder.build_int_signed_rem(lhs, rhs, "rem")?, "srem"),
            BinaryOp::Lt => (
                self.builder
                    .build_int_compare(IntPredicate::SLT, lhs, rhs, "lt")?,
                "icmp",
            ),
            BinaryOp::Gt => (
                self.builder
                    .build_int_compare(IntPredicate::SGT, lhs, rhs, "gt")?,
                "icmp",
            ),
        };
        self.session.record_instruction(opcode);
        Ok(out)
    }

    /// Lower a select into success/failure/merge blocks.
    ///
    /// Blocks created here are not removed if a later step fails.
    fn lower_select(
        &self,
        function: FunctionValue<'ctx>,
        condition: Deferred<'a, 'ctx>,
        on_true: Deferred<'a, 'ctx>,
        on_false: Deferred<'a, 'ctx>,
    ) -> BuildResult<IntValue<'ctx>> {
        let cond = self.realize(condition)?;
        if cond.get_type().get_bit_width() != 1 {
            return Err(BuildError::type_mismatch(
                "select condition",
                "i1",
                int_type_name(cond.get_type()),
            ));
        }

        let success = self.context.append_basic_block(function, "success");
        let failure = self.context.append_basic_block(function, "failure");
        let merge = self.context.append_basic_block(function, "merge");
        log::debug!("Lowering select in '{}'", function_name(function));

        self.builder.build_conditional_branch(cond, success, failure)?;
        self.session.record_instruction("br");

        self.builder.position_at_end(success);
        let true_value = self.realize(on_true)?;
        let success_exit = self.insert_block()?;
        self.builder.build_unconditional_branch(merge)?;
        self.session.record_instruction("br");

        self.builder.position_at_end(failure);
        let false_value = self.realize(on_false)?;
        let failure_exit = self.insert_block()?;
        self.builder.build_unconditional_branch(merge)?;
        self.session.record_instruction("br");

        self.builder.position_at_end(merge);
        if true_value.get_type() != false_value.get_type() {
            return Err(BuildError::type_mismatch(
                "select branches",
                int_type_name(true_value.get_type()),
                int_type_name(false_value.get_type()),
            ));
        }

        let phi = MergeNode::open(self, true_value.get_type(), "select")?;
        phi.patch(self, true_value, success_exit)?;
        phi.patch(self, false_value, failure_exit)?;
        self.session.record_select_lowered();
        Ok(phi.value())
    }

    pub(crate) fn emit_call(
        &self,
        callee: FunctionValue<'ctx>,
        args: &[IntValue<'ctx>],
    ) -> BuildResult<IntValue<'ctx>> {
        let name = function_name(callee);
        let params = callee.get_params();
        if params.len() != args.len() {
            return Err(BuildError::ArityMismatch {
                name,
                expected: params.len(),
                found: args.len(),
            });
        }
        for (param, arg) in params.iter().zip(args) {
            match param {
                BasicValueEnum::IntValue(param) if param.get_type() == arg.get_type() => {}
                other => {
                    return Err(BuildError::type_mismatch(
                        "call argument",
                        basic_type_name(other.get_type()),
                        int_type_name(arg.get_type()),
                    ))
                }
            }
        }

        let call_args: Vec<BasicMetadataValueEnum<'ctx>> =
            args.iter().map(|arg| (*arg).into()).collect();
        let call = self.builder.build_call(callee, &call_args, "call")?;
        self.session.record_instruction("call");
        log::trace!("Emitted call to '{}'", name);

        match call.try_as_basic_value().left() {
            Some(BasicValueEnum::IntValue(value)) => Ok(value),
            _ => Err(BuildError::SignatureMismatch {
                name,
                reason: "callee does not return an integer".to_string(),
            }),
        }
    }

    // =========================================================================
    // Module output
    // =========================================================================

    /// Textual IR of the module.
    pub fn print_to_string(&self) -> String {
        self.module.print_to_string().to_string()
    }

    pub fn write_ir_to_file<P: AsRef<Path>>(&self, path: P) -> BuildResult<()> {
        self.module
            .print_to_file(path.as_ref())
            .map_err(|e| BuildError::Io {
                reason: e.to_string(),
            })
    }

    /// Check the module for structural errors.
    pub fn verify(&self) -> BuildResult<()> {
        self.module
            .verify()
            .map_err(|e| BuildError::BackendVerificationFailed {
                reason: e.to_string(),
            })
    }

    /// Hand the module over, e.g. to [`Executor::new`].
    pub fn into_module(self) -> Module<'ctx> {
        self.module
    }

    /// Verify the module and create an executor owning it.
    pub fn compile(self, options: &EngineOptions) -> BuildResult<Executor<'ctx>> {
        self.require_idle()?;
        self.verify()?;
        Executor::new(self.into_module(), options)
    }
}
