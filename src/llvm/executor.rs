// This module provides the Executor, which takes ownership of a finished LLVM module and runs
// its functions through LLVM's MCJIT execution engine. The native target is initialized once
// per process; engine construction failures are reported as EngineInitializationFailed and
// never retried. Functions are resolved by name or by handle, their signature is checked to
// be all-i64, and the positional i64 arguments are marshaled by calling through a typed
// extern "C" function pointer matching the arity. Resolution and signature problems are
// reported before any call is attempted.

//! JIT execution of compiled modules.

use super::builder::function_name;
use crate::core::{BuildError, BuildResult};
use inkwell::execution_engine::{ExecutionEngine, JitFunction, UnsafeFunctionPointer};
use inkwell::module::Module;
use inkwell::targets::{InitializationConfig, Target};
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValueEnum, FunctionValue};
use inkwell::OptimizationLevel;
use std::sync::OnceLock;

/// Execution engine settings.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub opt_level: OptimizationLevel,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            opt_level: OptimizationLevel::None,
        }
    }
}

/// Function to execute, by name or by handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionRef<'ctx> {
    Name(String),
    Handle(FunctionValue<'ctx>),
}

impl<'ctx> From<&str> for FunctionRef<'ctx> {
    fn from(name: &str) -> Self {
        FunctionRef::Name(name.to_string())
    }
}

impl<'ctx> From<String> for FunctionRef<'ctx> {
    fn from(name: String) -> Self {
        FunctionRef::Name(name)
    }
}

impl<'ctx> From<FunctionValue<'ctx>> for FunctionRef<'ctx> {
    fn from(function: FunctionValue<'ctx>) -> Self {
        FunctionRef::Handle(function)
    }
}

fn initialize_native_target() -> BuildResult<()> {
    static NATIVE: OnceLock<Result<(), String>> = OnceLock::new();
    NATIVE
        .get_or_init(|| Target::initialize_native(&InitializationConfig::default()))
        .clone()
        .map_err(|reason| BuildError::EngineInitializationFailed { reason })
}

/// Owner of a compiled module and its JIT engine.
pub struct Executor<'ctx> {
    module: Module<'ctx>,
    engine: ExecutionEngine<'ctx>,
}

impl<'ctx> Executor<'ctx> {
    /// Largest number of arguments [`run`](Self::run) can marshal.
    pub const MAX_ARITY: usize = 6;

    /// Verify `module` and create a JIT engine for the host.
    pub fn new(module: Module<'ctx>, options: &EngineOptions) -> BuildResult<Self> {
        module
            .verify()
            .map_err(|e| BuildError::BackendVerificationFailed {
                reason: e.to_string(),
            })?;
        initialize_native_target()?;

        let engine = module
            .create_jit_execution_engine(options.opt_level)
            .map_err(|e| BuildError::EngineInitializationFailed {
                reason: e.to_string(),
            })?;
        log::debug!(
            "Created JIT engine for module '{}' at {:?}",
            module.get_name().to_string_lossy(),
            options.opt_level
        );

        Ok(Self { module, engine })
    }

    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.module.get_function(name).is_some()
    }

    /// Textual IR of the owned module.
    pub fn print_to_string(&self) -> String {
        self.module.print_to_string().to_string()
    }

    /// Find the module's function for `target`.
    pub fn resolve(&self, target: &FunctionRef<'ctx>) -> BuildResult<FunctionValue<'ctx>> {
        match target {
            FunctionRef::Name(name) => {
                self.module
                    .get_function(name)
                    .ok_or_else(|| BuildError::FunctionNotFound { name: name.clone() })
            }
            FunctionRef::Handle(function) => {
                let name = function_name(*function);
                self.module
                    .get_function(&name)
                    .filter(|found| found == function)
                    .ok_or(BuildError::FunctionNotFound { name })
            }
        }
    }

    /// Call `target` with `args` and return its result.
    pub fn run(&self, target: impl Into<FunctionRef<'ctx>>, args: &[i64]) -> BuildResult<i64> {
        let function = self.resolve(&target.into())?;
        let name = function_name(function);
        Self::check_signature(function, &name, args.len())?;

        log::trace!("Running '{}' with {:?}", name, args);
        // SAFETY: check_signature verified that the function takes exactly
        // args.len() i64 parameters and returns i64.
        let result = unsafe {
            match *args {
                [] => self.lookup::<unsafe extern "C" fn() -> i64>(&name)?.call(),
                [a] => self.lookup::<unsafe extern "C" fn(i64) -> i64>(&name)?.call(a),
                [a, b] => self
                    .lookup::<unsafe extern "C" fn(i64, i64) -> i64>(&name)?
                    .call(a, b),
                [a, b, c] => self
                    .lookup::<unsafe extern "C" fn(i64, i64, i64) -> i64>(&name)?
                    .call(a, b, c),
                [a, b, c, d] => self
                    .lookup::<unsafe extern "C" fn(i64, i64, i64, i64) -> i64>(&name)?
                    .call(a, b, c, d),
                [a, b, c, d, e] => self
                    .lookup::<unsafe extern "C" fn(i64, i64, i64, i64, i64) -> i64>(&name)?
                    .call(a, b, c, d, e),
                [a, b, c, d, e, f] => self
                    .lookup::<unsafe extern "C" fn(i64, i64, i64, i64, i64, i64) -> i64>(&name)?
                    .call(a, b, c, d, e, f),
                _ => {
                    return Err(BuildError::UnsupportedArity {
                        arity: args.len(),
                        max: Self::MAX_ARITY,
                    })
                }
            }
        };
        Ok(result)
    }

    fn check_signature(function: FunctionValue<'ctx>, name: &str, arity: usize) -> BuildResult<()> {
        let is_i64 = |ty: BasicTypeEnum<'_>| {
            matches!(ty, BasicTypeEnum::IntType(int) if int.get_bit_width() == 64)
        };

        let result_ok = function.get_type().get_return_type().is_some_and(is_i64);
        let params = function.get_params();
        let params_ok = params.iter().all(|param| {
            matches!(param, BasicValueEnum::IntValue(value) if value.get_type().get_bit_width() == 64)
        });
        if !result_ok || !params_ok {
            return Err(BuildError::SignatureMismatch {
                name: name.to_string(),
                reason: "only i64 parameters and results can be marshaled".to_string(),
            });
        }

        if params.len() != arity {
            return Err(BuildError::ArityMismatch {
                name: name.to_string(),
                expected: params.len(),
                found: arity,
            });
        }
        if arity > Self::MAX_ARITY {
            return Err(BuildError::UnsupportedArity {
                arity,
                max: Self::MAX_ARITY,
            });
        }
        Ok(())
    }

    /// # Safety
    ///
    /// `F` must match the signature of the compiled function `name`.
    unsafe fn lookup<F: UnsafeFunctionPointer>(
        &self,
        name: &str,
    ) -> BuildResult<JitFunction<'ctx, F>> {
        self.engine.get_function::<F>(name).map_err(|e| {
            log::debug!("JIT lookup of '{}' failed: {}", name, e);
            BuildError::FunctionNotFound {
                name: name.to_string(),
            }
        })
    }
}
