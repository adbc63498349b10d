// This module implements the structured loop emitter. count_predicate_matches synthesizes a
// zero-argument function that scans a fixed i64 buffer, calls a predicate on every element
// and returns how many calls produced a non-zero result. The buffer is embedded in the module
// as a private constant array, so compiled code never points into host memory. The loop
// block carries two merge nodes (running index and running count); each is opened before the
// instruction that updates it and patched with the loop's self-edge once that update exists.
// An empty buffer produces a single block returning zero.

//! Structured loop emission.

use super::builder::{function_name, EmitBuilder};
use super::merge::MergeNode;
use crate::core::{BuildError, BuildResult};
use inkwell::module::Linkage;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValueEnum, FunctionValue, IntValue, PointerValue};
use inkwell::IntPredicate;

/// Prefix of the functions produced by [`EmitBuilder::count_predicate_matches`].
pub const COUNT_PREDICATE_PREFIX: &str = "count_predicate_match_";

impl<'a, 'ctx: 'a> EmitBuilder<'a, 'ctx> {
    /// Build `count_predicate_match_<predicate>() -> i64` counting the
    /// elements of `buffer` for which `predicate` returns non-zero.
    ///
    /// Must be called while idle; the builder is idle again afterwards.
    pub fn count_predicate_matches(
        &mut self,
        predicate: FunctionValue<'ctx>,
        buffer: &[i64],
    ) -> BuildResult<FunctionValue<'ctx>> {
        self.require_idle()?;
        self.check_predicate(predicate)?;

        let name = format!("{}{}", COUNT_PREDICATE_PREFIX, function_name(predicate));
        let i64_type = self.i64_type();
        let function = self.declare(&name, i64_type.fn_type(&[], false))?;
        let zero = i64_type.const_zero();

        if buffer.is_empty() {
            let bail = self.context().append_basic_block(function, "cpm_bail");
            self.ir_builder().position_at_end(bail);
            self.ir_builder().build_return(Some(&zero))?;
            self.finish_loop_function(&name, function);
            return Ok(function);
        }

        let one = i64_type.const_int(1, false);

        let entry = self.context().append_basic_block(function, "cpm_entry");
        let loop_block = self.context().append_basic_block(function, "cpm_loop");
        let exit = self.context().append_basic_block(function, "cpm_exit");
        log::debug!("Emitting '{}' over {} element(s)", name, buffer.len());

        // Entry: base address of the embedded buffer.
        self.ir_builder().position_at_end(entry);
        let base = self.embed_buffer(&name, buffer)?;
        self.ir_builder().build_unconditional_branch(loop_block)?;
        self.session().record_instruction("br");

        // Loop header: both merge nodes take their initial values from entry.
        self.ir_builder().position_at_end(loop_block);
        let index = MergeNode::open(self, i64_type, "current_index")?;
        let prev_count = MergeNode::open(self, i64_type, "prev_count")?;
        index.patch(self, zero, entry)?;
        prev_count.patch(self, zero, entry)?;

        let next_index = self
            .ir_builder()
            .build_int_add(index.value(), one, "next_index")?;
        self.session().record_instruction("add");

        // SAFETY: `index` ranges over 0..buffer.len() and `base` points to a
        // constant array of exactly buffer.len() i64 elements.
        let element_ptr = unsafe {
            self.ir_builder().build_in_bounds_gep(
                i64_type,
                base,
                &[index.value()],
                "current_pointer",
            )?
        };
        self.session().record_instruction("getelementptr");
        let element = self
            .ir_builder()
            .build_load(i64_type, element_ptr, "current_value")?
            .into_int_value();
        self.session().record_instruction("load");

        let result = self.emit_call(predicate, &[element])?;
        let matched = self.ir_builder().build_int_compare(
            IntPredicate::NE,
            result,
            zero,
            "predicate_matched",
        )?;
        self.session().record_instruction("icmp");
        let increment = self
            .ir_builder()
            .build_select(matched, one, zero, "increment")?
            .into_int_value();
        self.session().record_instruction("select");
        let count = self
            .ir_builder()
            .build_int_add(prev_count.value(), increment, "count")?;
        self.session().record_instruction("add");

        // Self-edges: the loop block is still the block under construction.
        index.patch(self, next_index, loop_block)?;
        prev_count.patch(self, count, loop_block)?;

        let more = self.ir_builder().build_int_compare(
            IntPredicate::SLT,
            next_index,
            i64_type.const_int(buffer.len() as u64, false),
            "more",
        )?;
        self.session().record_instruction("icmp");
        self.ir_builder()
            .build_conditional_branch(more, loop_block, exit)?;
        self.session().record_instruction("br");

        self.ir_builder().position_at_end(exit);
        self.ir_builder().build_return(Some(&count))?;
        self.finish_loop_function(&name, function);
        Ok(function)
    }

    /// Predicates must be `i64 -> i64`.
    fn check_predicate(&self, predicate: FunctionValue<'ctx>) -> BuildResult<()> {
        let i64_type = self.i64_type();
        let params_ok = matches!(
            predicate.get_params().as_slice(),
            [BasicValueEnum::IntValue(param)] if param.get_type() == i64_type
        );
        let result_ok = matches!(
            predicate.get_type().get_return_type(),
            Some(BasicTypeEnum::IntType(ty)) if ty == i64_type
        );

        if params_ok && result_ok {
            Ok(())
        } else {
            Err(BuildError::SignatureMismatch {
                name: function_name(predicate),
                reason: "predicate must take one i64 and return i64".to_string(),
            })
        }
    }

    /// Copy `buffer` into a private constant global and return its address.
    fn embed_buffer(&self, name: &str, buffer: &[i64]) -> BuildResult<PointerValue<'ctx>> {
        let i64_type = self.i64_type();
        let len = u32::try_from(buffer.len())
            .map_err(|_| BuildError::BufferTooLarge { len: buffer.len() })?;
        let elements: Vec<IntValue<'ctx>> = buffer
            .iter()
            .map(|value| i64_type.const_int(*value as u64, true))
            .collect();

        let global = self
            .module()
            .add_global(i64_type.array_type(len), None, &format!("{name}.buffer"));
        global.set_initializer(&i64_type.const_array(&elements));
        global.set_constant(true);
        global.set_linkage(Linkage::Private);
        Ok(global.as_pointer_value())
    }

    fn finish_loop_function(&self, name: &str, function: FunctionValue<'ctx>) {
        self.session().record_instruction("ret");
        let blocks = function.count_basic_blocks();
        self.session().record_function_defined(name, blocks);
        self.ir_builder().clear_insertion_position();
        log::info!("✅ Finished function '{}' ({} blocks)", name, blocks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BinaryOp, BuildSession};
    use bumpalo::Bump;
    use inkwell::context::Context;
    use inkwell::values::InstructionOpcode;

    #[test]
    fn test_empty_buffer_has_no_loop() {
        let context = Context::create();
        let arena = Bump::new();
        let session = BuildSession::new(&arena);
        let mut builder = EmitBuilder::new(&context, "empty", &session);

        let is_odd = builder
            .define("is_odd", 1, |b, _| {
                Ok(b.binary_op(b.argument(0)?, b.literal(2), BinaryOp::Mod))
            })
            .unwrap();
        let counter = builder.count_predicate_matches(is_odd, &[]).unwrap();

        assert_eq!(function_name(counter), "count_predicate_match_is_odd");
        assert_eq!(counter.count_basic_blocks(), 1);
        assert!(builder.module().get_global("count_predicate_match_is_odd.buffer").is_none());
        assert!(!builder.is_in_function());
        builder.verify().unwrap();
    }

    #[test]
    fn test_loop_shape() {
        let context = Context::create();
        let arena = Bump::new();
        let session = BuildSession::new(&arena);
        let mut builder = EmitBuilder::new(&context, "loop", &session);

        let is_odd = builder
            .define("is_odd", 1, |b, _| {
                Ok(b.binary_op(b.argument(0)?, b.literal(2), BinaryOp::Mod))
            })
            .unwrap();
        let counter = builder
            .count_predicate_matches(is_odd, &[1, 3, 5, 10, 12, 15])
            .unwrap();

        let blocks = counter.get_basic_blocks();
        assert_eq!(blocks.len(), 3);
        let loop_block = blocks[1];
        let phis: Vec<_> = loop_block
            .get_instructions()
            .filter(|inst| inst.get_opcode() == InstructionOpcode::Phi)
            .collect();
        assert_eq!(phis.len(), 2);

        let stats = session.stats();
        assert_eq!(stats.merge_nodes, 2);
        assert_eq!(stats.merge_edges, 4);
        builder.verify().unwrap();
    }

    #[test]
    fn test_predicate_rules() {
        let context = Context::create();
        let arena = Bump::new();
        let session = BuildSession::new(&arena);
        let mut builder = EmitBuilder::new(&context, "rules", &session);

        let binary = builder
            .define("binary", 2, |b, _| b.argument(0))
            .unwrap();
        assert!(matches!(
            builder.count_predicate_matches(binary, &[1]),
            Err(BuildError::SignatureMismatch { .. })
        ));

        let unary = builder.define("unary", 1, |b, _| b.argument(0)).unwrap();
        builder.count_predicate_matches(unary, &[1, 2]).unwrap();
        assert!(matches!(
            builder.count_predicate_matches(unary, &[1, 2]),
            Err(BuildError::DuplicateDefinition { .. })
        ));

        let i64_type = builder.i64_type();
        builder.enter_function("open", i64_type, &[]).unwrap();
        assert!(matches!(
            builder.count_predicate_matches(unary, &[]),
            Err(BuildError::AlreadyInFunction { .. })
        ));
    }
}
