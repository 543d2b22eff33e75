//! NPU reference model test driver
//!
//! Usage:
//!   npuref                               # seed 42, vectors in ./hex_out
//!   npuref --seed 7 --mode functional --json
//!   npuref compare golden.hex rtl.hex --width 32

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use tiled_npu::hexio::load_all_hex;
use tiled_npu::testgen::compare_exact;
use tiled_npu::{ExecutionMode, NpuConfig, NpuError, NpuResult, RunReport, SuiteOptions, TestSuite};

#[derive(Parser, Debug)]
#[command(name = "npuref")]
#[command(author = "FPGA Team")]
#[command(version = "0.1.0")]
#[command(about = "Generates and cross-checks reference vectors for the tiled INT8 NPU")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Seed for every generated vector
    #[arg(short = 's', long = "seed", default_value = "42")]
    seed: u64,

    /// Directory for the generated hex files
    #[arg(short = 'o', long = "out-dir", default_value = "hex_out")]
    out_dir: PathBuf,

    /// Tile executor: functional or cycle
    #[arg(short = 'm', long = "mode", default_value = "cycle", value_parser = parse_mode)]
    mode: ExecutionMode,

    /// TOML file overriding the default configuration
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(short = 'j', long = "json")]
    json_output: bool,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare two hex vector files exactly
    Compare {
        expected: PathBuf,
        actual: PathBuf,

        /// Bit width of each value
        #[arg(short = 'w', long = "width", default_value = "32", value_parser = parse_width)]
        width: u32,
    },
}

fn parse_mode(s: &str) -> Result<ExecutionMode, String> {
    s.parse()
}

fn parse_width(s: &str) -> Result<u32, String> {
    match s {
        "8" => Ok(8),
        "32" => Ok(32),
        other => Err(format!("Unsupported width: {} (expected 8 or 32)", other)),
    }
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Some(Command::Compare {
        expected,
        actual,
        width,
    }) = &args.command
    {
        match compare_files(expected, actual, *width) {
            Ok(count) => {
                println!("{} {} values match", "[PASS]".green(), count);
            }
            Err(e) => {
                eprintln!("{} {}", "[FAIL]".red(), e);
                std::process::exit(1);
            }
        }
        return;
    }

    let config = match &args.config {
        Some(path) => NpuConfig::load(path).unwrap_or_else(|e| {
            eprintln!("{}: {}", "Configuration error".red(), e);
            std::process::exit(1);
        }),
        None => NpuConfig::default(),
    };

    if !args.json_output {
        print_banner(&config, &args);
    }

    let options = SuiteOptions {
        seed: args.seed,
        out_dir: args.out_dir.clone(),
        mode: args.mode,
        config,
        echo: !args.json_output,
    };

    let report = match TestSuite::new(options).and_then(TestSuite::run) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };

    if args.json_output {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{}: Failed to serialize to JSON: {}", "Error".red(), e);
                std::process::exit(1);
            }
        }
    } else {
        print_summary(&report, &args);
    }

    std::process::exit(report.exit_code());
}

fn compare_files(expected: &Path, actual: &Path, width: u32) -> NpuResult<usize> {
    let (expected, actual): (Vec<i32>, Vec<i32>) = if width == 8 {
        let widen = |v: Vec<i8>| -> Vec<i32> { v.into_iter().map(i32::from).collect() };
        (widen(load_all_hex(expected)?), widen(load_all_hex(actual)?))
    } else {
        (load_all_hex(expected)?, load_all_hex(actual)?)
    };
    if expected.is_empty() {
        return Err(NpuError::hex(1, "expected file holds no values"));
    }
    compare_exact("compare", &actual, &expected)?;
    Ok(expected.len())
}

fn print_banner(config: &NpuConfig, args: &Args) {
    println!();
    println!("{}", "*".repeat(61).blue());
    println!("{}", "*     NPU Reference Model - Comprehensive Test Suite        *".bold().blue());
    println!("{}", "*".repeat(61).blue());
    println!();
    println!("{}", "NPU Configuration:".green());
    for line in config.to_string().lines() {
        println!("  {}", line);
    }
    println!("  {}: {}", "Seed".cyan(), args.seed);
    println!("  {}: {}", "Executor".cyan(), args.mode);
    if args.verbose {
        println!("  {}: {} cycles", "Cycles per tile".cyan(), config.cycles_per_tile());
    }
}

fn print_summary(report: &RunReport, args: &Args) {
    println!();
    println!("{}", "*".repeat(61).blue());
    println!("{}", "*                    TEST SUMMARY                           *".bold().blue());
    println!("{}", "*".repeat(61).blue());
    println!();
    println!("  Total tests:  {}", report.total);
    println!("  Passed:       {}", report.passed);
    println!("  Failed:       {}", report.failed);
    println!("  Pass rate:    {:.1}%", report.pass_rate());
    if report.engine.cycles > 0 {
        println!(
            "  Engine:       {} tiles, {} cycles",
            report.engine.tiles_issued, report.engine.cycles
        );
    }
    println!();

    if let Some(reason) = &report.aborted {
        println!("  {} {}", "*** RUN ABORTED ***".red().bold(), reason);
    } else if report.all_passed() {
        println!("  {}", "*** ALL TESTS PASSED ***".green().bold());
    } else {
        println!("  {}", "*** SOME TESTS FAILED ***".red().bold());
    }

    println!();
    println!("Generated {} hex files in {}.", report.hex_files, args.out_dir.display());
    println!("Use these files with $readmemh in RTL testbenches.");
    println!();
}
