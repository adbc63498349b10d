// This module gathers the backend-independent pieces of lazyemit: the error type shared by
// every component, the arena-backed build session with its statistics, and the deferred
// value representation (tagged node variants plus the single-assignment Memo cache). The
// LLVM-facing builder, merge nodes, loop emitter and executor live in the llvm module and
// build on these types.

//! Core lazyemit infrastructure.
//!
//! # Key Components
//!
//! ## Errors (`error`)
//! - One `thiserror` enum for builder misuse, backend and execution failures
//!
//! ## Session Management (`session`)
//! - Arena allocation of deferred-value nodes using `bumpalo`
//! - Build statistics
//!
//! ## Deferred Values (`deferred`)
//! - Tagged node variants realized by the builder
//! - `Memo`, the cache that makes realization happen at most once

pub mod deferred;
pub mod error;
pub mod session;

pub use deferred::{BinaryOp, Deferred, DeferredKind, Memo};
pub use error::{BuildError, BuildResult};
pub use session::{BuildSession, SessionStats};
