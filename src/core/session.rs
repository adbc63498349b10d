// This module provides arena-based build session management using the bumpalo crate. The
// BuildSession owns a borrowed arena in which every deferred-value node and call-argument
// slice is allocated, so expression trees are assembled bottom-up from Copy handles and are
// released together when the arena goes away. The session also tracks build statistics:
// functions defined, instructions emitted per opcode, merge nodes opened and patched, select
// lowerings, and how many realizations ran versus were served from a node's cache.
// SessionStats renders these for diagnostics through its Display implementation.

//! Arena-based build session management.
//!
//! All deferred-value nodes share the session lifetime, which keeps the
//! builder free of per-node ownership bookkeeping.

use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Arena-based build session.
pub struct BuildSession<'arena> {
    /// Arena allocator for deferred-value nodes.
    arena: &'arena Bump,

    /// Session statistics for debugging.
    stats: RefCell<SessionStats>,
}

impl<'arena> BuildSession<'arena> {
    /// Create a new build session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Allocate an object in the session arena.
    pub fn alloc<T>(&self, value: T) -> &'arena T {
        self.arena.alloc(value)
    }

    /// Allocate a slice in the session arena.
    pub fn alloc_slice<T: Copy>(&self, slice: &[T]) -> &'arena [T] {
        self.arena.alloc_slice_copy(slice)
    }

    /// Record that a function body was completed.
    pub fn record_function_defined(&self, name: &str, blocks: u32) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_defined += 1;
        if stats.largest_function_blocks < blocks {
            stats.largest_function_blocks = blocks;
            stats.largest_function_name = name.to_string();
        }
    }

    /// Record an emitted instruction.
    pub fn record_instruction(&self, opcode: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.instructions_emitted += 1;
        *stats
            .instruction_counts
            .entry(opcode.to_string())
            .or_insert(0) += 1;
    }

    /// Record a merge node being opened.
    pub fn record_merge_opened(&self) {
        self.stats.borrow_mut().merge_nodes += 1;
    }

    /// Record an incoming edge appended to a merge node.
    pub fn record_merge_patched(&self) {
        self.stats.borrow_mut().merge_edges += 1;
    }

    /// Record a select lowering.
    pub fn record_select_lowered(&self) {
        self.stats.borrow_mut().selects_lowered += 1;
    }

    /// Record a deferred value running its production step.
    pub fn record_realized(&self) {
        self.stats.borrow_mut().nodes_realized += 1;
    }

    /// Record a deferred value served from its cache.
    pub fn record_cache_hit(&self) {
        self.stats.borrow_mut().cache_hits += 1;
    }

    /// Get build statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Build session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of function bodies completed.
    pub functions_defined: usize,

    /// Number of instructions emitted.
    pub instructions_emitted: usize,

    /// Count of each instruction opcode emitted.
    pub instruction_counts: HashMap<String, usize>,

    /// Block count of the largest function.
    pub largest_function_blocks: u32,

    /// Name of largest function.
    pub largest_function_name: String,

    /// Merge (phi) nodes opened.
    pub merge_nodes: usize,

    /// Incoming edges appended to merge nodes.
    pub merge_edges: usize,

    /// Select expressions lowered into blocks.
    pub selects_lowered: usize,

    /// Production steps run.
    pub nodes_realized: usize,

    /// Realizations answered from a node's cache.
    pub cache_hits: usize,
}

impl SessionStats {
    /// Number of instructions emitted with the given opcode.
    pub fn count(&self, opcode: &str) -> usize {
        self.instruction_counts.get(opcode).copied().unwrap_or(0)
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Build Session Statistics:")?;
        writeln!(f, "  Functions defined: {}", self.functions_defined)?;
        writeln!(f, "  Instructions emitted: {}", self.instructions_emitted)?;
        writeln!(f, "  Selects lowered: {}", self.selects_lowered)?;
        writeln!(
            f,
            "  Merge nodes: {} ({} edges)",
            self.merge_nodes, self.merge_edges
        )?;
        writeln!(
            f,
            "  Nodes realized: {} ({} cache hits)",
            self.nodes_realized, self.cache_hits
        )?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} blocks)",
                self.largest_function_name, self.largest_function_blocks
            )?;
        }

        if !self.instruction_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.instruction_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

            for (opcode, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", opcode, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_session_creation() {
        let arena = Bump::new();
        let session = BuildSession::new(&arena);

        let stats = session.stats();
        assert_eq!(stats.functions_defined, 0);
        assert_eq!(stats.instructions_emitted, 0);
        assert_eq!(stats.merge_nodes, 0);
    }

    #[test]
    fn test_arena_allocation() {
        let arena = Bump::new();
        let session = BuildSession::new(&arena);

        let value = session.alloc(42);
        assert_eq!(*value, 42);

        let slice = session.alloc_slice(&[1, 2, 3, 4]);
        assert_eq!(slice, &[1, 2, 3, 4]);
        assert!(std::ptr::eq(session.arena(), &arena));
        assert!(session.arena().allocated_bytes() > 0);
    }

    #[test]
    fn test_session_statistics() {
        let arena = Bump::new();
        let session = BuildSession::new(&arena);

        session.record_function_defined("min", 4);
        session.record_function_defined("add", 1);
        session.record_instruction("add");
        session.record_instruction("icmp");
        session.record_instruction("add");
        session.record_merge_opened();
        session.record_merge_patched();
        session.record_merge_patched();
        session.record_select_lowered();
        session.record_realized();
        session.record_cache_hit();

        let stats = session.stats();
        assert_eq!(stats.functions_defined, 2);
        assert_eq!(stats.instructions_emitted, 3);
        assert_eq!(stats.count("add"), 2);
        assert_eq!(stats.count("icmp"), 1);
        assert_eq!(stats.count("phi"), 0);
        assert_eq!(stats.merge_nodes, 1);
        assert_eq!(stats.merge_edges, 2);
        assert_eq!(stats.selects_lowered, 1);
        assert_eq!(stats.largest_function_name, "min");
    }

    #[test]
    fn test_statistics_display() {
        let arena = Bump::new();
        let session = BuildSession::new(&arena);

        session.record_function_defined("factorial", 4);
        session.record_instruction("mul");
        session.record_instruction("call");

        let output = format!("{}", session.stats());
        assert!(output.contains("Functions defined: 1"));
        assert!(output.contains("Instructions emitted: 2"));
        assert!(output.contains("factorial (4 blocks)"));
    }
}
