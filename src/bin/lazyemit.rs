//! Command-line driver for the ready-made lazyemit programs.
//!
//! Builds the requested function, JIT-compiles the module and prints the
//! result. `RUST_LOG=debug` shows emission progress.

use bumpalo::Bump;
use clap::{Parser, Subcommand, ValueEnum};
use inkwell::context::Context;
use inkwell::OptimizationLevel;
use lazyemit::programs::{define_factorial, define_is_odd, define_is_prime, define_min};
use lazyemit::{BuildSession, EmitBuilder, EngineOptions};

#[derive(Parser, Debug)]
#[command(name = "lazyemit", version, about = "Build and JIT-run deferred expression programs")]
struct Cli {
    /// Print the module's IR before running
    #[arg(long, global = true)]
    print_ir: bool,

    /// Optimization level of the execution engine
    #[arg(long, value_enum, default_value_t = OptLevel::None, global = true)]
    opt_level: OptLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recursive factorial of N
    Factorial { n: i64 },
    /// Smaller of two integers
    Min { a: i64, b: i64 },
    /// Count the odd values in a list
    CountOdd {
        #[arg(required = true)]
        values: Vec<i64>,
    },
    /// Count the primes in a list
    CountPrimes {
        #[arg(required = true)]
        values: Vec<i64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OptLevel {
    None,
    Less,
    Default,
    Aggressive,
}

impl From<OptLevel> for OptimizationLevel {
    fn from(level: OptLevel) -> Self {
        match level {
            OptLevel::None => OptimizationLevel::None,
            OptLevel::Less => OptimizationLevel::Less,
            OptLevel::Default => OptimizationLevel::Default,
            OptLevel::Aggressive => OptimizationLevel::Aggressive,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let context = Context::create();
    let arena = Bump::new();
    let session = BuildSession::new(&arena);
    let mut builder = EmitBuilder::new(&context, "lazyemit", &session);

    let (entry, args) = match &cli.command {
        Command::Factorial { n } => (define_factorial(&mut builder)?, vec![*n]),
        Command::Min { a, b } => (define_min(&mut builder)?, vec![*a, *b]),
        Command::CountOdd { values } => {
            let is_odd = define_is_odd(&mut builder)?;
            (builder.count_predicate_matches(is_odd, values)?, vec![])
        }
        Command::CountPrimes { values } => {
            let is_prime = define_is_prime(&mut builder)?;
            (builder.count_predicate_matches(is_prime, values)?, vec![])
        }
    };

    if cli.print_ir {
        println!("{}", builder.print_to_string());
    }

    let options = EngineOptions {
        opt_level: cli.opt_level.into(),
    };
    let executor = builder.compile(&options)?;
    let result = executor.run(entry, &args)?;

    println!("{}", result);
    log::info!("📊 {}", session.stats());
    Ok(())
}
