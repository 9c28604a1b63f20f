//! Discovery: expand input specifiers into an ordered, duplicate-free list of work items.
//!
//! A specifier is one of:
//! - an existing file: taken verbatim, even if its name contains glob metacharacters;
//! - `@FILE`: a list file, one path or URL per line (`#` comments and blanks ignored);
//! - a glob pattern: matched against files under its literal directory prefix;
//! - anything else: a literal path or URL that must exist to match (URLs always match).
//!
//! Specifiers expand independently; results concatenate in specifier order and then
//! de-duplicate keeping the first occurrence. Read-only: nothing is written.

use globset::GlobBuilder;
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::WorkItem;
use crate::engine::tools::{is_glob_pattern, normalize_item_path, split_glob_base};
use crate::error::BatchError;
use crate::utils::config::{LIST_DETECT_MAX_BYTES, LIST_FILE_SENTINEL};

#[derive(Clone, Debug)]
pub struct DiscoverOpts {
    /// Treat a lone specifier naming a list-like text file as `@FILE`.
    pub detect_list: bool,
    pub follow_links: bool,
}

impl Default for DiscoverOpts {
    fn default() -> Self {
        Self {
            detect_list: true,
            follow_links: false,
        }
    }
}

/// Expand `specifiers` into work items.
///
/// A specifier that matches nothing is logged as a warning. If every specifier matches
/// nothing (or none were given), the result is [`BatchError::NoInput`].
pub fn discover(
    specifiers: &[String],
    opts: &DiscoverOpts,
) -> Result<Vec<WorkItem>, BatchError> {
    if let [only] = specifiers
        && opts.detect_list
        && looks_like_list_file(Path::new(only))
    {
        debug!("{} looks like a list file; reading it as one", only);
        let ids = read_list_file(Path::new(only))?;
        return finish(vec![ids], specifiers);
    }

    let expanded: Vec<Vec<String>> = specifiers
        .par_iter()
        .map(|spec| expand_one(spec, opts))
        .collect::<Result<_, _>>()?;

    for (spec, ids) in specifiers.iter().zip(&expanded) {
        if ids.is_empty() {
            warn!("{}: matched nothing", spec);
        }
    }
    finish(expanded, specifiers)
}

fn finish(
    expanded: Vec<Vec<String>>,
    specifiers: &[String],
) -> Result<Vec<WorkItem>, BatchError> {
    let items = dedup_in_order(expanded.into_iter().flatten());
    if items.is_empty() {
        return Err(BatchError::NoInput {
            specifiers: specifiers.len(),
        });
    }
    debug!("discovered {} item(s)", items.len());
    Ok(items)
}

/// Concatenated ids → items, first occurrence wins. Indices follow the kept order.
pub fn dedup_in_order<I: IntoIterator<Item = String>>(ids: I) -> Vec<WorkItem> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(id.clone()))
        .enumerate()
        .map(|(i, id)| WorkItem::new(i, id))
        .collect()
}

fn expand_one(spec: &str, opts: &DiscoverOpts) -> Result<Vec<String>, BatchError> {
    let path = Path::new(spec);
    if path.is_file() {
        return Ok(vec![path_id(path)]);
    }
    if let Some(list) = spec.strip_prefix(LIST_FILE_SENTINEL) {
        let list = Path::new(list);
        if list.is_file() {
            return read_list_file(list);
        }
        warn!("list file {} not found", list.display());
        return Ok(Vec::new());
    }
    if is_url(spec) {
        return Ok(vec![spec.to_string()]);
    }
    if is_glob_pattern(spec) {
        return expand_glob(spec, opts);
    }
    if path.exists() {
        return Ok(vec![path_id(path)]);
    }
    Ok(Vec::new())
}

/// Files under the pattern's literal prefix whose relative path matches the remainder.
/// `*` and `?` stay within one path component; `**` crosses directories.
fn expand_glob(pattern: &str, opts: &DiscoverOpts) -> Result<Vec<String>, BatchError> {
    let (base, rest) = split_glob_base(pattern);
    let matcher = GlobBuilder::new(&rest)
        .literal_separator(true)
        .build()
        .map_err(|e| BatchError::config(format!("bad glob {pattern:?}: {e}")))?
        .compile_matcher();
    if !base.is_dir() {
        return Ok(Vec::new());
    }
    let mut walker = WalkDir::new(&base)
        .min_depth(1)
        .follow_links(opts.follow_links)
        .sort_by_file_name();
    // Brace alternatives may differ in depth, so only plain patterns get a cap.
    if !rest.contains("**") && !rest.contains('{') {
        walker = walker.max_depth(rest.split('/').count());
    }
    let mut out = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                debug!("walk {}: {}", base.display(), err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(&base) else {
            continue;
        };
        if matcher.is_match(rel) {
            out.push(path_id(entry.path()));
        }
    }
    Ok(out)
}

/// Read a list file: one id per line, trimmed; blank lines and `#` comments skipped.
pub fn read_list_file(path: &Path) -> Result<Vec<String>, BatchError> {
    let text = fs::read_to_string(path)
        .map_err(|e| BatchError::config(format!("read list file {}: {e}", path.display())))?;
    Ok(list_lines(&text)
        .map(|line| {
            if is_url(line) {
                line.to_string()
            } else {
                path_id(Path::new(line))
            }
        })
        .collect())
}

fn list_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

/// A small UTF-8 text file whose every non-comment line is a URL or an existing path.
fn looks_like_list_file(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() || meta.len() == 0 || meta.len() > LIST_DETECT_MAX_BYTES {
        return false;
    }
    let Ok(text) = fs::read_to_string(path) else {
        return false;
    };
    let mut lines = list_lines(&text).peekable();
    lines.peek().is_some() && lines.all(|l| is_url(l) || Path::new(l).exists())
}

fn is_url(s: &str) -> bool {
    s.split_once("://").is_some_and(|(scheme, rest)| {
        !scheme.is_empty() && !rest.is_empty() && !scheme.contains('/')
    })
}

fn path_id(path: &Path) -> String {
    normalize_item_path(path).to_string_lossy().into_owned()
}
