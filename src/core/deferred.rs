// This module defines deferred values: nodes of an expression tree that only emit backend
// code when realized. A node is a tagged variant (literal, argument, binary operation,
// select, call) paired with a Memo, a single-assignment cache holding the backend handle
// once the node has been realized. Nodes live in the session arena and are handed around as
// Copy references, so the same node may appear many times in a tree while its instructions
// are emitted exactly once. The variant data is inert; all emission happens in the builder
// that realizes the tree, which keeps the emission order explicit and testable.

//! Deferred values and their memoizing cache.

use crate::core::error::BuildError;
use crate::core::session::BuildSession;
use inkwell::values::{FunctionValue, IntValue};
use std::cell::OnceCell;
use std::fmt;
use std::str::FromStr;

/// Single-assignment cache.
///
/// The production step passed to [`Memo::get_or_try_init`] runs until it
/// succeeds once; afterwards the stored value is returned unchanged. A failed
/// production leaves the memo empty.
#[derive(Debug)]
pub struct Memo<T: Copy> {
    cell: OnceCell<T>,
}

impl<T: Copy> Memo<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Cached value, if any.
    pub fn get(&self) -> Option<T> {
        self.cell.get().copied()
    }

    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Return the cached value or run `produce` and cache its result.
    pub fn get_or_try_init<E>(&self, produce: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        if let Some(value) = self.cell.get() {
            return Ok(*value);
        }
        let value = produce()?;
        // First stored value wins.
        Ok(*self.cell.get_or_init(|| value))
    }
}

impl<T: Copy> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Binary operators understood by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Signed remainder; the sign follows the dividend.
    Mod,
    /// Signed less-than, producing a 1-bit value.
    Lt,
    /// Signed greater-than, producing a 1-bit value.
    Gt,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 6] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Mod,
        BinaryOp::Lt,
        BinaryOp::Gt,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Mod => "mod",
            BinaryOp::Lt => "lt",
            BinaryOp::Gt => "gt",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Gt)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl FromStr for BinaryOp {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BinaryOp::ALL
            .into_iter()
            .find(|op| op.mnemonic() == s)
            .ok_or_else(|| BuildError::UnsupportedOperator { op: s.to_string() })
    }
}

/// What a deferred value computes once realized.
#[derive(Debug)]
pub enum DeferredKind<'a, 'ctx> {
    /// Signed 64-bit constant.
    Literal(i64),
    /// Parameter of the function that was active at construction.
    Argument { index: usize, value: IntValue<'ctx> },
    Binary {
        op: BinaryOp,
        left: Deferred<'a, 'ctx>,
        right: Deferred<'a, 'ctx>,
    },
    /// Conditional value, lowered into blocks and a merge node.
    Select {
        condition: Deferred<'a, 'ctx>,
        on_true: Deferred<'a, 'ctx>,
        on_false: Deferred<'a, 'ctx>,
    },
    /// Call to a function handle; the callee may be the function being built.
    Call {
        function: FunctionValue<'ctx>,
        args: &'a [Deferred<'a, 'ctx>],
    },
}

impl DeferredKind<'_, '_> {
    pub fn name(&self) -> &'static str {
        match self {
            DeferredKind::Literal(_) => "literal",
            DeferredKind::Argument { .. } => "argument",
            DeferredKind::Binary { .. } => "binary",
            DeferredKind::Select { .. } => "select",
            DeferredKind::Call { .. } => "call",
        }
    }
}

#[derive(Debug)]
pub struct DeferredNode<'a, 'ctx> {
    kind: DeferredKind<'a, 'ctx>,
    memo: Memo<IntValue<'ctx>>,
}

/// A value that will exist once realized.
///
/// Copy handle to an arena-allocated node. Realization goes through
/// [`EmitBuilder::realize`](crate::llvm::EmitBuilder::realize).
#[derive(Debug, Clone, Copy)]
pub struct Deferred<'a, 'ctx> {
    node: &'a DeferredNode<'a, 'ctx>,
}

impl<'a, 'ctx> Deferred<'a, 'ctx> {
    /// Allocate a new node in the session arena.
    pub fn new(session: &BuildSession<'a>, kind: DeferredKind<'a, 'ctx>) -> Self {
        Self {
            node: session.alloc(DeferredNode {
                kind,
                memo: Memo::new(),
            }),
        }
    }

    pub fn kind(&self) -> &'a DeferredKind<'a, 'ctx> {
        &self.node.kind
    }

    pub(crate) fn memo(&self) -> &'a Memo<IntValue<'ctx>> {
        &self.node.memo
    }

    /// Backend handle, if this node has been realized.
    pub fn cached(&self) -> Option<IntValue<'ctx>> {
        self.node.memo.get()
    }

    pub fn is_realized(&self) -> bool {
        self.node.memo.is_set()
    }

    /// Whether two handles refer to the same node.
    pub fn ptr_eq(&self, other: &Deferred<'a, 'ctx>) -> bool {
        std::ptr::eq(self.node, other.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    #[test]
    fn test_memo_runs_once() {
        let memo: Memo<i64> = Memo::new();
        let mut runs = 0;

        let first: Result<i64, ()> = memo.get_or_try_init(|| {
            runs += 1;
            Ok(7)
        });
        let second: Result<i64, ()> = memo.get_or_try_init(|| {
            runs += 1;
            Ok(8)
        });

        assert_eq!(first, Ok(7));
        assert_eq!(second, Ok(7));
        assert_eq!(runs, 1);
        assert_eq!(memo.get(), Some(7));
    }

    #[test]
    fn test_memo_failure_leaves_empty() {
        let memo: Memo<i64> = Memo::new();

        let failed: Result<i64, &str> = memo.get_or_try_init(|| Err("boom"));
        assert_eq!(failed, Err("boom"));
        assert!(!memo.is_set());

        let retried: Result<i64, &str> = memo.get_or_try_init(|| Ok(3));
        assert_eq!(retried, Ok(3));
    }

    #[test]
    fn test_binary_op_parsing() {
        for op in BinaryOp::ALL {
            assert_eq!(op.mnemonic().parse::<BinaryOp>().unwrap(), op);
        }
        assert!(BinaryOp::Lt.is_comparison());
        assert!(!BinaryOp::Mod.is_comparison());

        let err = "div".parse::<BinaryOp>().unwrap_err();
        assert!(matches!(err, BuildError::UnsupportedOperator { ref op } if op == "div"));
        assert!("ADD".parse::<BinaryOp>().is_err());
    }

    #[test]
    fn test_deferred_nodes_share_arena() {
        let arena = Bump::new();
        let session = BuildSession::new(&arena);

        let lit = Deferred::new(&session, DeferredKind::Literal(5));
        let copy = lit;
        assert!(lit.ptr_eq(&copy));
        assert!(!lit.is_realized());
        assert_eq!(lit.kind().name(), "literal");

        let other = Deferred::new(&session, DeferredKind::Literal(5));
        assert!(!lit.ptr_eq(&other));
    }
}
