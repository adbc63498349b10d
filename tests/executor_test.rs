//! Executor resolution and signature checks.

use bumpalo::Bump;
use inkwell::context::Context;
use lazyemit::programs::{define_add3, define_factorial};
use lazyemit::{BuildError, BuildSession, EmitBuilder, EngineOptions, Executor, FunctionRef};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_function_not_found() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let session = BuildSession::new(&arena);
    let mut builder = EmitBuilder::new(&context, "missing", &session);

    define_factorial(&mut builder).unwrap();
    let executor = builder.compile(&EngineOptions::default()).unwrap();

    assert!(executor.has_function("factorial"));
    assert!(!executor.has_function("fib"));
    let err = executor.run("fib", &[3]).unwrap_err();
    assert!(matches!(err, BuildError::FunctionNotFound { ref name } if name == "fib"));
}

#[test]
fn test_arity_mismatch() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let session = BuildSession::new(&arena);
    let mut builder = EmitBuilder::new(&context, "arity", &session);

    define_add3(&mut builder).unwrap();
    let executor = builder.compile(&EngineOptions::default()).unwrap();

    let err = executor.run("add3", &[1, 2]).unwrap_err();
    assert!(matches!(
        err,
        BuildError::ArityMismatch { ref name, expected: 3, found: 2 } if name == "add3"
    ));
}

#[test]
fn test_unsupported_signature() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let session = BuildSession::new(&arena);
    let mut builder = EmitBuilder::new(&context, "narrow", &session);
    let i32_type = context.i32_type();
    let i64_type = builder.i64_type();

    builder
        .define_function("narrow", i32_type, &[i32_type], |b, _| b.argument(0))
        .unwrap();
    let seven = builder
        .define_function("seven", i64_type, &[i64_type; 7], |b, _| b.argument(6))
        .unwrap();
    let executor = builder.compile(&EngineOptions::default()).unwrap();

    assert!(matches!(
        executor.run("narrow", &[1]),
        Err(BuildError::SignatureMismatch { .. })
    ));
    assert!(matches!(
        executor.run(seven, &[1, 2, 3, 4, 5, 6, 7]),
        Err(BuildError::UnsupportedArity { arity: 7, max: 6 })
    ));
}

#[test]
fn test_run_by_handle_and_reference() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let session = BuildSession::new(&arena);
    let mut builder = EmitBuilder::new(&context, "handles", &session);

    let factorial = define_factorial(&mut builder).unwrap();
    let executor = builder.compile(&EngineOptions::default()).unwrap();

    assert_eq!(executor.resolve(&FunctionRef::from(factorial)).unwrap(), factorial);
    assert_eq!(executor.run(FunctionRef::Handle(factorial), &[5]).unwrap(), 120);
    assert_eq!(executor.run(String::from("factorial"), &[6]).unwrap(), 720);
    assert!(executor.print_to_string().contains("define i64 @factorial"));
}

#[test]
fn test_unverifiable_module_is_rejected() {
    init_logging();
    let context = Context::create();
    let module = context.create_module("broken");
    let i64_type = context.i64_type();

    // A body without a terminator fails verification.
    let function = module.add_function("broken", i64_type.fn_type(&[], false), None);
    context.append_basic_block(function, "entry");

    let err = Executor::new(module, &EngineOptions::default()).err().unwrap();
    assert!(matches!(err, BuildError::BackendVerificationFailed { .. }));
}

#[test]
fn test_write_ir_to_file() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let session = BuildSession::new(&arena);
    let mut builder = EmitBuilder::new(&context, "dump", &session);

    define_factorial(&mut builder).unwrap();
    let path = std::env::temp_dir().join(format!("lazyemit_dump_{}.ll", std::process::id()));
    builder.write_ir_to_file(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert!(text.contains("@factorial"));
    assert!(text.contains("phi i64"));
}
