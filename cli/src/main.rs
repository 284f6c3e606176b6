use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use bumpalo::Bump;
use clap::{Parser, Subcommand};
use dem::{
    CompressionMethod, Engine, EngineOptions, ExecutionOptions, Value, artifact::read_header,
    render_error,
};
use miette::{IntoDiagnostic, Result, miette};
use tracing::{debug, info};

/// Dem - a typed bytecode runtime
#[derive(Parser, Debug)]
#[command(name = "dem")]
#[command(about = "Run and inspect compiled Dem artifacts", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute an artifact and print its result
    Run {
        artifact: PathBuf,

        /// Maximum call depth
        #[arg(long, default_value_t = ExecutionOptions::default().max_depth)]
        max_depth: usize,

        /// Maximum number of value stack slots
        #[arg(long, default_value_t = ExecutionOptions::default().max_stack_size)]
        max_stack: usize,
    },
    /// Print an artifact's header and disassembly
    Inspect { artifact: PathBuf },
    /// Rewrite an artifact with another compression method
    Repack {
        input: PathBuf,
        output: PathBuf,

        /// One of: deflate, gzip, huffman, huffman-deflate
        #[arg(long, value_parser = parse_method, default_value = "huffman-deflate")]
        method: CompressionMethod,
    },
}

fn parse_method(name: &str) -> Result<CompressionMethod, String> {
    CompressionMethod::from_name(name).ok_or_else(|| {
        let known: Vec<_> = CompressionMethod::ALL.iter().map(|m| m.name()).collect();
        format!("unknown method `{name}` (expected one of: {})", known.join(", "))
    })
}

fn run(path: &Path, options: ExecutionOptions) -> Result<ExitCode> {
    let arena = Bump::new();
    let engine = Engine::new(&arena, EngineOptions::default());
    let chunk = match engine.load(path) {
        Ok(chunk) => chunk,
        Err(e) => {
            render_error(&e, None);
            return Ok(ExitCode::FAILURE);
        }
    };
    debug!(instructions = chunk.instructions.len(), "loaded chunk");

    match engine.run_with(&chunk, options, Box::new(std::io::stdout())) {
        Ok(Value::Null) => Ok(ExitCode::SUCCESS),
        Ok(value) => {
            println!("{value}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            render_error(&e, None);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn inspect(path: &Path) -> Result<ExitCode> {
    let bytes = std::fs::read(path).into_diagnostic()?;
    let (header, payload) = read_header(&bytes).map_err(|e| miette!("{e}"))?;
    println!("=== {} ===", path.display());
    println!("version:     {}", header.version);
    println!("compression: {}", header.method);
    println!("size:        {} bytes ({} payload)", bytes.len(), payload.len());
    println!();

    let arena = Bump::new();
    let engine = Engine::new(&arena, EngineOptions::default());
    match engine.decode(&bytes) {
        Ok(chunk) => {
            println!("{chunk:?}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            render_error(&e, None);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn repack(input: &Path, output: &Path, method: CompressionMethod) -> Result<ExitCode> {
    let arena = Bump::new();
    let engine = Engine::new(
        &arena,
        EngineOptions {
            compression: method,
            ..EngineOptions::default()
        },
    );
    let result = engine
        .load(input)
        .and_then(|chunk| engine.save(&chunk, output));
    match result {
        Ok(()) => {
            info!(from = %input.display(), to = %output.display(), %method, "repacked");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            render_error(&e, None);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging subscriber
    use tracing_subscriber::{EnvFilter, fmt};

    // Use DEM_LOG or RUST_LOG environment variable to control log level
    // Default to WARN if not set
    let filter = EnvFilter::try_from_env("DEM_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new("warn"))
        .into_diagnostic()?;

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match args.command {
        Command::Run {
            artifact,
            max_depth,
            max_stack,
        } => run(
            &artifact,
            ExecutionOptions {
                max_depth,
                max_stack_size: max_stack,
            },
        ),
        Command::Inspect { artifact } => inspect(&artifact),
        Command::Repack {
            input,
            output,
            method,
        } => repack(&input, &output, method),
    }
}
