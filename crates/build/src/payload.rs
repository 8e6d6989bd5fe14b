//! Locating and staging the payload file within a downloaded artifact tree.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;
use web2apk_core::{
    models::{ArtifactBundle, ArtifactEntry, RunId},
    util::has_extension,
};

/// Providers wrap each artifact in a folder named after it, so one level of nesting is searched.
const MAX_DEPTH: usize = 2;

/// List the files under `root`, down to one level of subdirectories.
///
/// Entries are ordered by name, with the contents of a directory following it.
pub fn scan_bundle(run_id: RunId, root: &Path) -> io::Result<ArtifactBundle> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(MAX_DEPTH).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(path) = entry.path().strip_prefix(root) else {
            continue;
        };
        entries.push(ArtifactEntry { path: path.to_path_buf(), size: entry.metadata()?.len() });
    }
    Ok(ArtifactBundle { run_id, root: root.to_path_buf(), entries })
}

/// The first entry whose name ends in `.{extension}`.
pub fn locate_payload<'a>(
    bundle: &'a ArtifactBundle,
    extension: &str,
) -> Option<&'a ArtifactEntry> {
    bundle
        .entries
        .iter()
        .filter(|e| e.path.components().count() <= MAX_DEPTH)
        .find(|e| has_extension(&e.path, extension))
}

/// Copy `entry` to `target`, returning the number of bytes written.
///
/// The copy goes through a temporary sibling file, so `target` is either absent or complete.
pub fn stage_payload(
    bundle: &ArtifactBundle,
    entry: &ArtifactEntry,
    target: &Path,
) -> io::Result<u64> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let partial = partial_path(target);
    let written = match fs::copy(bundle.absolute(entry), &partial) {
        Ok(written) => written,
        Err(e) => {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
    };
    fs::rename(&partial, target)?;
    Ok(written)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, path: &str, contents: &[u8]) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_scan_is_ordered_and_shallow() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.txt", b"b");
        write(dir.path(), "a/inner.apk", b"apk");
        write(dir.path(), "a/deeper/too-deep.apk", b"apk");
        let bundle = scan_bundle(RunId(1), dir.path()).unwrap();
        let paths = bundle.entries.iter().map(|e| e.path.clone()).collect::<Vec<_>>();
        assert_eq!(paths, vec![PathBuf::from("a/inner.apk"), PathBuf::from("b.txt")]);
        assert_eq!(bundle.total_size(), 4);
    }

    #[test]
    fn test_locate_nested_payload() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README.md", b"readme");
        write(dir.path(), "app-debug/app-debug.apk", b"payload");
        let bundle = scan_bundle(RunId(1), dir.path()).unwrap();
        let entry = locate_payload(&bundle, "apk").unwrap();
        assert_eq!(entry.path, PathBuf::from("app-debug/app-debug.apk"));
        assert_eq!(entry.size, 7);
    }

    #[test]
    fn test_locate_first_match_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "z.apk", b"z");
        write(dir.path(), "m/m.apk", b"m");
        let bundle = scan_bundle(RunId(1), dir.path()).unwrap();
        assert_eq!(locate_payload(&bundle, "apk").unwrap().path, PathBuf::from("m/m.apk"));
        assert!(locate_payload(&bundle, "aab").is_none());
    }

    #[test]
    fn test_stage_payload() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("run-1");
        write(&staging, "artifact/app.apk", b"payload");
        let bundle = scan_bundle(RunId(1), &staging).unwrap();
        let entry = locate_payload(&bundle, "apk").unwrap();
        let target = dir.path().join("out/app-debug.apk");
        assert_eq!(stage_payload(&bundle, entry, &target).unwrap(), 7);
        assert_eq!(fs::read(&target).unwrap(), b"payload");
        assert!(!dir.path().join("out/app-debug.apk.part").exists());
    }
}
