//! Two-phase merge (phi) nodes.
//!
//! A merge node is opened at the current insertion point with no incoming
//! edges and patched afterwards. Loop-carried values need this: the edge
//! coming back from the block under construction can only be added once the
//! value flowing along it has been emitted.

use super::builder::{int_type_name, EmitBuilder};
use crate::core::{BuildError, BuildResult};
use inkwell::basic_block::BasicBlock;
use inkwell::types::IntType;
use inkwell::values::{IntValue, PhiValue};

/// Phi node under construction.
#[derive(Debug, Clone, Copy)]
pub struct MergeNode<'ctx> {
    phi: PhiValue<'ctx>,
    ty: IntType<'ctx>,
}

impl<'ctx> MergeNode<'ctx> {
    /// Create an empty phi of type `ty` at the builder's insertion point.
    pub fn open(builder: &EmitBuilder<'_, 'ctx>, ty: IntType<'ctx>, name: &str) -> BuildResult<Self> {
        let phi = builder.ir_builder().build_phi(ty, name)?;
        builder.session().record_instruction("phi");
        builder.session().record_merge_opened();
        log::trace!("Opened merge node '{}' of type {}", name, int_type_name(ty));
        Ok(Self { phi, ty })
    }

    /// Append an incoming `(value, predecessor)` edge.
    pub fn patch(
        &self,
        builder: &EmitBuilder<'_, 'ctx>,
        value: IntValue<'ctx>,
        predecessor: BasicBlock<'ctx>,
    ) -> BuildResult<()> {
        if value.get_type() != self.ty {
            return Err(BuildError::type_mismatch(
                "merge edge",
                int_type_name(self.ty),
                int_type_name(value.get_type()),
            ));
        }
        self.phi.add_incoming(&[(&value, predecessor)]);
        builder.session().record_merge_patched();
        Ok(())
    }

    /// Handle of the merged value.
    pub fn value(&self) -> IntValue<'ctx> {
        self.phi.as_basic_value().into_int_value()
    }

    pub fn incoming_count(&self) -> u32 {
        self.phi.count_incoming()
    }

    pub fn phi(&self) -> PhiValue<'ctx> {
        self.phi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BuildSession;
    use bumpalo::Bump;
    use inkwell::context::Context;

    #[test]
    fn test_patch_after_open() {
        let context = Context::create();
        let arena = Bump::new();
        let session = BuildSession::new(&arena);
        let mut builder = EmitBuilder::new(&context, "merge_test", &session);
        let i64_type = builder.i64_type();

        let function = builder.enter_function("pick", i64_type, &[]).unwrap();
        let entry = function.get_first_basic_block().unwrap();
        let next = context.append_basic_block(function, "next");
        builder.ir_builder().build_unconditional_branch(next).unwrap();
        builder.ir_builder().position_at_end(next);

        let merge = MergeNode::open(&builder, i64_type, "merged").unwrap();
        assert_eq!(merge.incoming_count(), 0);

        merge
            .patch(&builder, i64_type.const_int(9, false), entry)
            .unwrap();
        assert_eq!(merge.incoming_count(), 1);
        assert_eq!(merge.phi().get_incoming(0).map(|(_, block)| block), Some(entry));

        let wrong = context.bool_type().const_int(1, false);
        let err = merge.patch(&builder, wrong, entry).unwrap_err();
        assert!(matches!(err, BuildError::TypeMismatch { .. }));
        assert_eq!(merge.incoming_count(), 1);

        let stats = session.stats();
        assert_eq!(stats.merge_nodes, 1);
        assert_eq!(stats.merge_edges, 1);
    }
}
