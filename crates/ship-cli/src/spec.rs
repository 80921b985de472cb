//! Turns the CLI's positional `context` tokens into goal text, the way
//! `ship-core`'s planner and validator expect to receive it, plus the
//! SHA-256 hash used for change detection against a prior run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

const SPEC_CANDIDATES: &[&str] = &["SPEC.md", "spec.md"];

/// The resolved goal text for a run, plus a human-readable label for
/// logging (the file(s) it came from, or `<inline>`).
pub struct SpecSource {
    pub label: String,
    pub goal_text: String,
}

/// Resolves the spec source from positional CLI tokens.
///
/// A single token that names a file or directory is read as the spec;
/// anything else (zero tokens, or more than one) is either probed for
/// on disk or treated as inline context text.
pub fn discover_spec(context: &[String]) -> Result<SpecSource> {
    if context.len() == 1 {
        let path = Path::new(&context[0]);
        if path.is_file() {
            return read_files(&[path.to_path_buf()]);
        }
        if path.is_dir() {
            let files = markdown_files_in(path)?;
            if files.is_empty() {
                anyhow::bail!("no .md files found in {}", path.display());
            }
            return read_files(&files);
        }
    }

    if !context.is_empty() {
        return Ok(SpecSource { label: "<inline>".to_owned(), goal_text: context.join(" ") });
    }

    let mut found = Vec::new();
    for candidate in SPEC_CANDIDATES {
        let path = Path::new(candidate);
        if path.is_file() {
            found.push(path.to_path_buf());
        }
    }
    let specs_dir = Path::new("specs");
    if specs_dir.is_dir() {
        found.extend(markdown_files_in(specs_dir)?);
    }

    if found.is_empty() {
        anyhow::bail!("no spec found: pass a file/directory, or create SPEC.md / spec.md / specs/*.md");
    }
    read_files(&found)
}

fn markdown_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("cannot list {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    files.sort();
    Ok(files)
}

fn read_files(files: &[PathBuf]) -> Result<SpecSource> {
    let mut parts = Vec::with_capacity(files.len());
    for file in files {
        let text = std::fs::read_to_string(file).with_context(|| format!("cannot read {}", file.display()))?;
        parts.push(text);
    }
    let goal_text = parts.join("\n\n").trim().to_owned();
    if goal_text.is_empty() {
        anyhow::bail!("spec file(s) are empty: {}", files.iter().map(|f| f.display().to_string()).collect::<Vec<_>>().join(", "));
    }
    let label = files.iter().map(|f| f.display().to_string()).collect::<Vec<_>>().join(", ");
    Ok(SpecSource { label, goal_text })
}

/// SHA-256 of the goal text, hex-encoded, for change detection against
/// a stored `work.spec_hash`.
pub fn spec_hash(goal_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(goal_text.as_bytes());
    hex::encode(hasher.finalize())
}
