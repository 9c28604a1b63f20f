//! Path and text utilities

use std::path::{Component, Path, PathBuf};

use crate::utils::config::{DIAG_LINE_JOIN, GLOB_METACHARS};

/// True if the specifier contains glob metacharacters.
pub fn is_glob_pattern(spec: &str) -> bool {
    spec.contains(GLOB_METACHARS)
}

/// Drop `.` components so `./a.txt` and `a.txt` name the same item.
pub fn normalize_item_path(path: &Path) -> PathBuf {
    let normalized: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}

/// Split a glob pattern into the literal directory prefix to walk and the pattern
/// remainder to match against paths relative to that prefix.
///
/// `photos/2024/*.jpg` → (`photos/2024`, `*.jpg`); `*.txt` → (`.`, `*.txt`).
pub fn split_glob_base(pattern: &str) -> (PathBuf, String) {
    let mut base = PathBuf::new();
    let mut rest: Vec<String> = Vec::new();
    for comp in Path::new(pattern).components() {
        let s = comp.as_os_str().to_string_lossy();
        if rest.is_empty() && !is_glob_pattern(&s) {
            base.push(comp.as_os_str());
        } else {
            rest.push(s.into_owned());
        }
    }
    if rest.is_empty() {
        // No metachar component; the last component is the pattern itself.
        if let Some(name) = base.file_name().map(|n| n.to_string_lossy().into_owned()) {
            base.pop();
            rest.push(name);
        }
    }
    if base.as_os_str().is_empty() {
        base = PathBuf::from(".");
    }
    (base, rest.join("/"))
}

/// Flatten text onto one line and keep at most `limit` characters.
///
/// The tail is kept, since tools print the actionable error last.
pub fn truncate_diagnostic(text: &str, limit: usize) -> String {
    let flat = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(DIAG_LINE_JOIN);
    let count = flat.chars().count();
    if count <= limit {
        return flat;
    }
    if limit == 0 {
        return String::new();
    }
    let keep = limit.saturating_sub(1);
    let tail: String = flat.chars().skip(count - keep).collect();
    format!("…{tail}")
}

/// Render a panic payload caught at the dispatcher boundary.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_relative_pattern() {
        assert_eq!(
            split_glob_base("photos/2024/*.jpg"),
            (PathBuf::from("photos/2024"), "*.jpg".to_string())
        );
        assert_eq!(
            split_glob_base("*.txt"),
            (PathBuf::from("."), "*.txt".to_string())
        );
    }

    #[test]
    fn split_keeps_components_after_first_glob() {
        assert_eq!(
            split_glob_base("a/*/b/*.srt"),
            (PathBuf::from("a"), "*/b/*.srt".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn split_absolute_pattern() {
        assert_eq!(
            split_glob_base("/data/in/**/*.mkv"),
            (PathBuf::from("/data/in"), "**/*.mkv".to_string())
        );
    }

    #[test]
    fn normalize_drops_curdir() {
        assert_eq!(
            normalize_item_path(Path::new("./a/./b.txt")),
            PathBuf::from("a/b.txt")
        );
        assert_eq!(normalize_item_path(Path::new(".")), PathBuf::from("."));
    }

    #[test]
    fn truncate_keeps_tail_and_flattens() {
        let text = "line one\n\nline two\nfatal: bad input\n";
        assert_eq!(
            truncate_diagnostic(text, 200),
            "line one | line two | fatal: bad input"
        );
        let t = truncate_diagnostic(text, 10);
        assert_eq!(t.chars().count(), 10);
        assert!(t.starts_with('…'));
        assert!(t.ends_with("bad input"));
    }

    #[test]
    fn truncate_is_char_boundary_safe() {
        let t = truncate_diagnostic("ééééééééé", 4);
        assert_eq!(t, "…ééé");
    }

    #[test]
    fn glob_detection() {
        assert!(is_glob_pattern("*.mkv"));
        assert!(is_glob_pattern("clip?.mp4"));
        assert!(is_glob_pattern("{a,b}.txt"));
        assert!(!is_glob_pattern("plain.txt"));
    }
}
