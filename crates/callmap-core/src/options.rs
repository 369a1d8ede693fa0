//! Caller-facing knobs for an analysis run.

use std::path::PathBuf;

/// Options recognized by the analyzer.
///
/// The defaults produce the full graph: both edge relations retained, no
/// coloring, no annotation, orphans kept.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Retain defines edges in the export.
    pub draw_defines: bool,
    /// Retain uses edges in the export.
    pub draw_uses: bool,
    /// Explicit project root. When `None`, the root is inferred by walking
    /// upward from the inputs past package directories.
    pub root: Option<PathBuf>,
    /// Assign each vertex a hue derived from its source file.
    pub color_by_file: bool,
    /// Writers label vertices with `filename:lineno`.
    pub annotate: bool,
    /// Drop vertices with no retained incident edges from the export.
    pub prune_orphans: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            draw_defines: true,
            draw_uses: true,
            root: None,
            color_by_file: false,
            annotate: false,
            prune_orphans: false,
        }
    }
}
