//! Document loading: file discovery plus Document construction.
//!
//! Directories are walked recursively, skipping hidden entries; `.md`,
//! `.markdown`, and `.txt` files become one [`Document`] each, carrying a
//! title (first markdown heading, filename fallback) and the file mtime as
//! metadata. Unreadable files are skipped with a warning; the loader's
//! failure signal is an empty batch, not an error.

use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use rayon::prelude::*;
use tracing::warn;

use crate::{
    error::{Error, Result},
    store::Document,
};

/// File extensions eligible for discovery.
const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Load documents from a file or directory.
pub fn load_path(path: &Path) -> Result<Vec<Document>> {
    if path.is_dir() {
        let files = discover_files(path)?;
        Ok(read_documents(&files))
    } else if path.is_file() {
        Ok(read_documents(&[path.to_path_buf()]))
    } else {
        Err(Error::NotFound {
            kind: "path",
            name: path.display().to_string(),
        })
    }
}

/// Recursively discover eligible files under `root`, sorted by path.
///
/// Hidden files and directories (names starting with `.`) and symlinks are
/// skipped.
pub fn discover_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut results = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }

            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() && is_supported(&entry.path()) {
                results.push(entry.path());
            }
        }
    }

    results.sort();
    Ok(results)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
}

/// Read files in parallel and build one Document per readable file.
fn read_documents(paths: &[PathBuf]) -> Vec<Document> {
    paths
        .par_iter()
        .filter_map(|path| {
            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable file");
                    return None;
                }
            };
            let title = extract_title(&text, path);
            let mtime = file_mtime(path);
            Some(
                Document::new(path.to_string_lossy(), text)
                    .with_metadata("title", title)
                    .with_metadata("mtime", mtime.to_string()),
            )
        })
        .collect()
}

/// Extract a title from file content.
///
/// Looks for the first markdown heading (line starting with `# `).
/// Falls back to the filename without extension.
fn extract_title(content: &str, file_path: &Path) -> String {
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("# ") {
            let title = heading.trim();
            if !title.is_empty() {
                return title.to_string();
            }
        }
    }

    file_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .to_string()
}

fn file_mtime(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
