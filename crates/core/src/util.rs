use std::path::{Path, PathBuf};

/// Join two paths, only including the normal components.
pub fn join_normalized(base: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    let mut out = base.as_ref().to_path_buf();
    out.extend(path.as_ref().components().filter(|v| matches!(v, std::path::Component::Normal(_))));
    out
}

/// Format a size in bytes to a human-readable string.
/// Uses SI (kilo = 1000) units, formatted to two decimal places.
pub fn size(value: u64) -> String {
    let units = ["B", "kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];
    let mut value = value as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < units.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.2} {}", value, units[unit])
}

/// Whether the file name of `path` ends in `.{extension}`, ignoring ASCII case.
pub fn has_extension(path: impl AsRef<Path>, extension: &str) -> bool {
    let extension = extension.trim_start_matches('.');
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size() {
        assert_eq!(size(512), "512.00 B");
        assert_eq!(size(4_250_000), "4.25 MB");
    }

    #[test]
    fn test_join_normalized() {
        assert_eq!(join_normalized("out", "../a/./b.apk"), PathBuf::from("out/a/b.apk"));
        assert_eq!(join_normalized("out", "/etc/passwd"), PathBuf::from("out/etc/passwd"));
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension("app-release.apk", "apk"));
        assert!(has_extension("APP.APK", ".apk"));
        assert!(!has_extension("app.apk.txt", "apk"));
        assert!(!has_extension("apk", "apk"));
    }
}
