//! CLI runner: resolve inputs, analyze, render, write.

use std::io::{self, Write as _};
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use callmap_core::options::AnalysisOptions;
use callmap_python::AnalyzeError;

use crate::output;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Dot,
    Json,
}

/// Everything one invocation needs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Files and directories to analyze.
    pub paths: Vec<PathBuf>,
    pub format: OutputFormat,
    /// Output file; stdout when absent.
    pub output: Option<PathBuf>,
    pub options: AnalysisOptions,
}

/// Errors surfaced to the binary.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Analyze(#[from] AnalyzeError),

    #[error("failed to serialize graph: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

/// Analyze and write the rendered graph.
pub fn run(config: &RunConfig) -> Result<(), CliError> {
    let graph = callmap_python::analyze_paths(&config.paths, &config.options)?;
    info!(
        nodes = graph.nodes.len(),
        defines = graph.defines_edges.len(),
        uses = graph.uses_edges.len(),
        "analysis complete"
    );
    let rendered = match config.format {
        OutputFormat::Dot => output::to_dot(&graph, config.options.annotate),
        OutputFormat::Json => output::to_json(&graph)?,
    };
    match &config.output {
        Some(path) => std::fs::write(path, rendered)?,
        None => io::stdout().write_all(rendered.as_bytes())?,
    }
    Ok(())
}
