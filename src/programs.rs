//! Ready-made functions built with [`EmitBuilder`].
//!
//! Small workloads shared by the demo binary and the integration tests:
//! the recursive factorial, `min`, a three-way sum and the odd/prime
//! predicates fed to [`EmitBuilder::count_predicate_matches`].

use crate::core::{BinaryOp, BuildResult};
use crate::llvm::EmitBuilder;
use inkwell::values::FunctionValue;

/// `factorial(n) = n > 1 ? n * factorial(n - 1) : 1`
pub fn define_factorial<'a, 'ctx: 'a>(builder: &mut EmitBuilder<'a, 'ctx>) -> BuildResult<FunctionValue<'ctx>> {
    builder.define("factorial", 1, |b, factorial| {
        let n = b.argument(0)?;
        let one = b.literal(1);
        let n_minus_one = b.binary_op(n, one, BinaryOp::Sub);
        let recurse = b.call(factorial, &[n_minus_one]);
        let product = b.binary_op(n, recurse, BinaryOp::Mul);
        let condition = b.binary_op(n, one, BinaryOp::Gt);
        Ok(b.select(condition, product, one))
    })
}

/// `min(a, b) = a < b ? a : b`
pub fn define_min<'a, 'ctx: 'a>(builder: &mut EmitBuilder<'a, 'ctx>) -> BuildResult<FunctionValue<'ctx>> {
    builder.define("min", 2, |b, _| {
        let left = b.argument(0)?;
        let right = b.argument(1)?;
        let condition = b.binary_op(left, right, BinaryOp::Lt);
        Ok(b.select(condition, left, right))
    })
}

/// `add3(a, b, c) = c + (a + b)`
pub fn define_add3<'a, 'ctx: 'a>(builder: &mut EmitBuilder<'a, 'ctx>) -> BuildResult<FunctionValue<'ctx>> {
    builder.define("add3", 3, |b, _| {
        let first = b.binary_op(b.argument(0)?, b.argument(1)?, BinaryOp::Add);
        Ok(b.binary_op(b.argument(2)?, first, BinaryOp::Add))
    })
}

/// `is_odd(n) = n mod 2`, non-zero for odd `n`.
pub fn define_is_odd<'a, 'ctx: 'a>(builder: &mut EmitBuilder<'a, 'ctx>) -> BuildResult<FunctionValue<'ctx>> {
    builder.define("is_odd", 1, |b, _| {
        Ok(b.binary_op(b.argument(0)?, b.literal(2), BinaryOp::Mod))
    })
}

/// `is_prime(n)`: 1 if `n` is prime, else 0.
///
/// Trial division through the recursive helper
/// `prime_from(n, k) = k * k > n ? 1 : (n mod k > 0 ? prime_from(n, k + 1) : 0)`.
pub fn define_is_prime<'a, 'ctx: 'a>(builder: &mut EmitBuilder<'a, 'ctx>) -> BuildResult<FunctionValue<'ctx>> {
    let prime_from = builder.define("prime_from", 2, |b, prime_from| {
        let n = b.argument(0)?;
        let k = b.argument(1)?;
        let zero = b.literal(0);
        let one = b.literal(1);

        let past_root = b.binary_op(b.binary_op(k, k, BinaryOp::Mul), n, BinaryOp::Gt);
        let not_divisible = b.binary_op(b.binary_op(n, k, BinaryOp::Mod), zero, BinaryOp::Gt);
        let next = b.call(prime_from, &[n, b.binary_op(k, one, BinaryOp::Add)]);
        Ok(b.select(past_root, one, b.select(not_divisible, next, zero)))
    })?;

    builder.define("is_prime", 1, |b, _| {
        let n = b.argument(0)?;
        let search = b.call(prime_from, &[n, b.literal(2)]);
        Ok(b.select(b.binary_op(n, b.literal(1), BinaryOp::Gt), search, b.literal(0)))
    })
}
