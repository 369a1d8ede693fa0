//! callmap CLI binary entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use callmap::cli::{run, OutputFormat, RunConfig};
use callmap::options::AnalysisOptions;

/// Offline static call-graph analyzer for Python source trees.
#[derive(Parser)]
#[command(name = "callmap")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Python files or directories to analyze
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "dot")]
    format: FormatArg,

    /// Write output to a file (default: stdout)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Project root; overrides package-structure inference
    #[arg(long)]
    root: Option<PathBuf>,

    /// Leave defines edges out of the output
    #[arg(long)]
    no_defines: bool,

    /// Leave uses edges out of the output
    #[arg(long)]
    no_uses: bool,

    /// Color vertices by source file
    #[arg(long)]
    colored: bool,

    /// Annotate vertices with file:line
    #[arg(long)]
    annotated: bool,

    /// Drop vertices with no edges
    #[arg(long)]
    prune: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Dot,
    Json,
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = RunConfig {
        paths: cli.paths,
        format: match cli.format {
            FormatArg::Dot => OutputFormat::Dot,
            FormatArg::Json => OutputFormat::Json,
        },
        output: cli.output,
        options: AnalysisOptions {
            draw_defines: !cli.no_defines,
            draw_uses: !cli.no_uses,
            root: cli.root,
            color_by_file: cli.colored,
            annotate: cli.annotated,
            prune_orphans: cli.prune,
        },
    };

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("callmap: {err}");
            ExitCode::FAILURE
        }
    }
}
