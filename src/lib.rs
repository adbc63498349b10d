//! lazyemit - deferred expression trees compiled through LLVM.
//!
//! Callers describe integer functions as trees of deferred values: literals,
//! arguments, arithmetic and comparisons, conditional selects and calls,
//! including calls of a function to itself. Nothing is emitted while a tree
//! is assembled; realizing it emits branch-correct IR, and the finished
//! module is executed through a JIT.
//!
//! # Primary Usage
//!
//! ```ignore
//! use bumpalo::Bump;
//! use inkwell::context::Context;
//! use lazyemit::{BinaryOp, BuildSession, EmitBuilder, EngineOptions};
//!
//! let context = Context::create();
//! let arena = Bump::new();
//! let session = BuildSession::new(&arena);
//! let mut builder = EmitBuilder::new(&context, "factorial", &session);
//!
//! builder.define("factorial", 1, |b, factorial| {
//!     let n = b.argument(0)?;
//!     let one = b.literal(1);
//!     let recurse = b.call(factorial, &[b.binary_op(n, one, BinaryOp::Sub)]);
//!     let product = b.binary_op(n, recurse, BinaryOp::Mul);
//!     Ok(b.select(b.binary_op(n, one, BinaryOp::Gt), product, one))
//! })?;
//!
//! let executor = builder.compile(&EngineOptions::default())?;
//! assert_eq!(executor.run("factorial", &[10])?, 3_628_800);
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Errors, the arena-backed build session and deferred values
//! - [`llvm`] - Builder, merge nodes, loop emission and the executor
//! - [`programs`] - Ready-made functions used by the demo binary

pub mod core;
pub mod llvm;
pub mod programs;

pub use core::{
    BinaryOp, BuildError, BuildResult, BuildSession, Deferred, DeferredKind, Memo, SessionStats,
};
pub use llvm::{EmitBuilder, EngineOptions, Executor, FunctionRef, MergeNode};
