use std::{fs, path::Path};

use anyhow::{Context, Result, bail};
use walkdir::WalkDir;

/// Directories never copied into the web dir.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "android", "downloads"];

/// Copy a website from `source` into `web_dir`, overwriting files of the same name.
///
/// Files already in `web_dir` that `source` lacks are kept. Returns the number of files copied.
pub fn sync_web_dir(source: &Path, web_dir: &Path) -> Result<usize> {
    if !source.is_dir() {
        bail!("Website directory {} does not exist", source.display());
    }
    let source = source
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", source.display()))?;
    fs::create_dir_all(web_dir)?;
    let web_dir = web_dir.canonicalize()?;
    if web_dir == source {
        tracing::info!("{} is already the web directory", source.display());
        return Ok(0);
    }

    let walker = WalkDir::new(&source).min_depth(1).sort_by_file_name().into_iter();
    let mut copied = 0;
    for entry in walker.filter_entry(|e| {
        let skipped = e.file_type().is_dir()
            && e.file_name().to_str().is_some_and(|name| SKIPPED_DIRS.contains(&name));
        !skipped && e.path() != web_dir.as_path()
    }) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(&source)?;
        let target = web_dir.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
            tracing::debug!("Copied {}", relative.display());
            copied += 1;
        }
    }
    tracing::info!("Copied {} files from {} into {}", copied, source.display(), web_dir.display());
    Ok(copied)
}
