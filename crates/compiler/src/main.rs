//! C+ Compiler CLI
//!
//! Command-line front end for compiling `.cp` source files to a native
//! executable (LLVM backend) or a textual assembly listing (Cat backend).

use clap::Parser as ClapParser;
use std::path::PathBuf;
use std::process;

use cplusc::config::Backend;
use cplusc::{compile_file_with_config, default_output_path, CompilerConfig};

#[derive(ClapParser)]
#[command(name = "cplusc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "C+ compiler - compile .cp programs via LLVM or the Cat backend", long_about = None)]
struct Cli {
    /// Input .cp source file
    input: PathBuf,

    /// Backend to use (overrides `--config`'s `backend`, defaults to `llvm`
    /// when neither is given)
    #[arg(long = "codegen", value_name = "llvm|cat")]
    codegen: Option<String>,

    /// Output path (defaults to the input filename without its extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep the intermediate LLVM IR (.ll) file
    #[arg(long)]
    keep_ir: bool,

    /// Additional directory to search for `#include <...>` (repeatable)
    #[arg(long = "include-dir", value_name = "PATH")]
    include_dirs: Vec<PathBuf>,

    /// Load a TOML config file (e.g. `cplusc.toml`) as the base config;
    /// flags given on the command line still override what it sets
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose pipeline-stage logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "cplusc=debug" } else { "cplusc=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                default_level
                    .parse()
                    .expect("hardcoded log directive always parses"),
            ),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    if !cli.input.exists() {
        eprintln!("error: source file '{}' not found", cli.input.display());
        process::exit(1);
    }

    let mut config = match &cli.config {
        Some(path) => match CompilerConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1);
            }
        },
        None => CompilerConfig::default(),
    };

    if let Some(codegen) = &cli.codegen {
        let Some(backend) = Backend::parse(codegen) else {
            eprintln!("error: unknown backend '{codegen}' (expected 'llvm' or 'cat')");
            process::exit(1);
        };
        config = config.with_backend(backend);
    }
    if cli.keep_ir {
        config = config.with_keep_ir(true);
    }
    for dir in cli.include_dirs {
        config = config.with_include_search_path(dir);
    }

    let output = cli
        .output
        .or_else(|| config.output.clone())
        .unwrap_or_else(|| default_output_path(&cli.input));
    let backend = config.backend;

    match compile_file_with_config(&cli.input, &output, &config) {
        Ok(()) => {
            let display_path = match backend {
                Backend::Llvm => output.clone(),
                Backend::Cat => output.with_extension("asm"),
            };
            println!("compiled {} -> {}", cli.input.display(), display_path.display());
        }
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
