//! LLVM-facing half of lazyemit.
//!
//! [`EmitBuilder`] realizes deferred-value trees into an inkwell module,
//! lowering selects into blocks joined by [`MergeNode`]s and synthesizing
//! predicate-counting loops. [`Executor`] owns the finished module and runs
//! its functions through MCJIT.
//!
//! # Example
//! ```ignore
//! use bumpalo::Bump;
//! use inkwell::context::Context;
//! use lazyemit::core::{BinaryOp, BuildSession};
//! use lazyemit::llvm::{EmitBuilder, EngineOptions};
//!
//! let context = Context::create();
//! let arena = Bump::new();
//! let session = BuildSession::new(&arena);
//! let mut builder = EmitBuilder::new(&context, "demo", &session);
//! builder.define("add", 2, |b, _| {
//!     Ok(b.binary_op(b.argument(0)?, b.argument(1)?, BinaryOp::Add))
//! })?;
//! let executor = builder.compile(&EngineOptions::default())?;
//! assert_eq!(executor.run("add", &[2, 3])?, 5);
//! ```

pub mod builder;
pub mod executor;
pub mod loops;
pub mod merge;

pub use builder::EmitBuilder;
pub use executor::{EngineOptions, Executor, FunctionRef};
pub use loops::COUNT_PREDICATE_PREFIX;
pub use merge::MergeNode;
