//! Load `.batchrun.toml` (CLI only). Lib callers build [`Opts`] themselves.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Opts;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct BatchToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsSection {
    parallel: Option<usize>,
    output_dir: Option<String>,
    overwrite: Option<bool>,
    timeout: Option<u64>,
    retries: Option<u32>,
    diag_limit: Option<usize>,
    detect_list: Option<bool>,
    color: Option<bool>,
    summary_json: Option<String>,
    require_companion: Option<String>,
    command: Option<Vec<String>>,
}

/// Parse a config file's contents.
pub(crate) fn parse_batch_toml(s: &str) -> Result<BatchToml> {
    toml::from_str(s).context("parse config")
}

/// Load the config file: `explicit` if given (must exist), else `.batchrun.toml` in `dir` if present.
pub(crate) fn load_batch_toml(dir: &Path, explicit: Option<&Path>) -> Result<Option<BatchToml>> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let p = dir.join(PackagePaths::get().config_filename());
            if !p.is_file() {
                return Ok(None);
            }
            p
        }
    };
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("read config {}", path.display()))?;
    let file = parse_batch_toml(&s).with_context(|| path.display().to_string())?;
    log::debug!("Loaded config from {}", path.display());
    Ok(Some(file))
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($idx:expr, $opts:expr, $idx_field:ident => $opts_field:ident) => {
        if let Some(v) = $idx.$idx_field.clone() {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before applying CLI.
pub(crate) fn apply_file_to_opts(file: &BatchToml, opts: &mut Opts) {
    let s = &file.settings;
    if let Some(n) = s.parallel {
        opts.parallel = Some(n);
    }
    if let Some(ref p) = s.output_dir {
        opts.output_dir = Some(PathBuf::from(p));
    }
    apply_file_opt!(s, opts, overwrite => overwrite);
    if let Some(secs) = s.timeout {
        opts.timeout = Some(Duration::from_secs(secs));
    }
    apply_file_opt!(s, opts, retries => retries);
    apply_file_opt!(s, opts, diag_limit => diag_limit);
    apply_file_opt!(s, opts, detect_list => detect_list);
    apply_file_opt!(s, opts, color => color);
    if let Some(ref p) = s.summary_json {
        opts.summary_json = Some(PathBuf::from(p));
    }
    if let Some(ref ext) = s.require_companion {
        opts.require_companion = Some(ext.clone());
    }
    apply_file_opt!(s, opts, command => command);
}
