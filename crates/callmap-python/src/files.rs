//! Source file collection, project-root inference, and module naming.
//!
//! The project root decides the dotted namespace prefix of every file: a file
//! `ROOT/pkg/sub/mod.py` becomes module `pkg.sub.mod`, and `pkg/__init__.py`
//! becomes `pkg`. When the caller gives no explicit root, it is inferred by
//! walking upward from the inputs past package directories (directories that
//! contain an `__init__.py`), stopping at the first non-package directory.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

// ============================================================================
// Error Types
// ============================================================================

/// Error type for file collection.
#[derive(Debug, Error)]
pub enum FileError {
    /// Input path does not exist.
    #[error("input not found: {path}")]
    NotFound { path: String },

    /// IO error while walking a directory.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for file operations.
pub type FileResult<T> = Result<T, FileError>;

// Directories never descended into when walking for sources.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    "node_modules",
];

// ============================================================================
// Collection
// ============================================================================

/// Expand a mixed list of files and directories into a sorted list of
/// `.py` files.
///
/// Files are taken as given (whatever their extension); directories are
/// walked recursively, keeping `.py` files and skipping VCS/cache/venv
/// directories. The result is sorted and deduplicated so a given input set
/// always produces the same analysis order.
pub fn collect_python_files(inputs: &[PathBuf]) -> FileResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            for entry in WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| {
                    !e.file_type().is_dir()
                        || e.file_name()
                            .to_str()
                            .map_or(true, |name| !SKIP_DIRS.contains(&name))
                })
            {
                let entry = entry.map_err(|e| {
                    FileError::Io(e.into_io_error().unwrap_or_else(|| {
                        io::Error::new(io::ErrorKind::Other, "walk error")
                    }))
                })?;
                if entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|ext| ext == "py")
                {
                    files.push(entry.into_path());
                }
            }
        } else {
            return Err(FileError::NotFound {
                path: input.display().to_string(),
            });
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

// ============================================================================
// Root Inference and Module Naming
// ============================================================================

/// Infer the project root for a set of source files.
///
/// Starts at the common ancestor directory of the inputs, then climbs past
/// every directory that declares itself a package (contains `__init__.py`).
/// The first non-package directory is the root.
pub fn infer_root(files: &[PathBuf]) -> PathBuf {
    let mut root = common_ancestor(files);
    while root.join("__init__.py").is_file() {
        match root.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => root = parent.to_path_buf(),
            _ => break,
        }
    }
    root
}

/// The deepest directory containing every input file.
fn common_ancestor(files: &[PathBuf]) -> PathBuf {
    let mut iter = files.iter();
    let first = match iter.next() {
        Some(f) => f,
        None => return PathBuf::from("."),
    };
    let mut ancestor: PathBuf = first.parent().unwrap_or(Path::new(".")).to_path_buf();
    for file in iter {
        let dir = file.parent().unwrap_or(Path::new("."));
        while !dir.starts_with(&ancestor) {
            match ancestor.parent() {
                Some(parent) => ancestor = parent.to_path_buf(),
                None => return PathBuf::from("."),
            }
        }
    }
    ancestor
}

/// Compute the dotted module name of `file` relative to `root`.
///
/// `ROOT/pkg/mod.py` -> `pkg.mod`; `ROOT/pkg/__init__.py` -> `pkg`;
/// a file outside the root falls back to its stem.
pub fn module_name(file: &Path, root: &Path) -> String {
    let rel = file.strip_prefix(root).unwrap_or(file);
    let mut parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if let Some(last) = parts.last_mut() {
        if let Some(stem) = last.strip_suffix(".py") {
            *last = stem.to_string();
        }
    }
    if parts.last().is_some_and(|p| p == "__init__") {
        parts.pop();
    }
    if parts.is_empty() {
        // The root itself was handed in as `__init__.py`.
        return root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    parts.join(".")
}

// ============================================================================
// Tests
// ============================================================================
