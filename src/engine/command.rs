//! Command-template worker: runs one external program per item.
//!
//! Placeholders in the template are expanded per item:
//! `{}` / `{input}` item id, `{name}` file name, `{stem}` name without extension,
//! `{ext}` extension, `{dir}` parent directory, `{outdir}` output directory,
//! `{out}` output directory joined with `{name}`.
//! With no input placeholder, the item id is appended as the last argument.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::engine::process::{Termination, run_tracked};
use crate::engine::tools::truncate_diagnostic;
use crate::engine::worker::Worker;
use crate::error::BatchError;
use crate::pipeline::cancel::{CancellationFlag, ChildRegistry};
use crate::{Opts, WorkItem, WorkResult};

const INPUT_PLACEHOLDERS: &[&str] = &["{}", "{input}"];
const OUTPUT_PLACEHOLDERS: &[&str] = &["{out}", "{outdir}"];

/// Parsed command line with placeholders.
#[derive(Clone, Debug)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
    appends_input: bool,
    uses_output: bool,
    writes_out: bool,
}

impl CommandTemplate {
    pub fn parse(parts: &[String]) -> Result<Self, BatchError> {
        let (program, args) = parts
            .split_first()
            .ok_or_else(|| BatchError::config("no command given (pass it after `--`)"))?;
        if program.trim().is_empty() {
            return Err(BatchError::config("command program is empty"));
        }
        let mentions = |set: &[&str]| parts.iter().any(|p| set.iter().any(|ph| p.contains(ph)));
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            appends_input: !mentions(INPUT_PLACEHOLDERS),
            uses_output: mentions(OUTPUT_PLACEHOLDERS),
            writes_out: mentions(&["{out}"]),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// True if the template references `{out}` or `{outdir}`.
    pub fn uses_output(&self) -> bool {
        self.uses_output
    }

    /// True if the template references `{out}`, the per-item target checked for skips.
    pub fn writes_out(&self) -> bool {
        self.writes_out
    }

    /// Expand the template for one item. Deterministic in `item` and `output_dir`.
    pub fn render(&self, item: &WorkItem, output_dir: Option<&Path>) -> Vec<String> {
        let fields = Fields::new(item, output_dir);
        let mut argv: Vec<String> = std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| fields.expand(a))
            .collect();
        if self.appends_input {
            argv.push(item.id.clone());
        }
        argv
    }
}

/// Placeholder values for one item.
struct Fields {
    input: String,
    name: String,
    stem: String,
    ext: String,
    dir: String,
    outdir: String,
    out: String,
}

impl Fields {
    fn new(item: &WorkItem, output_dir: Option<&Path>) -> Self {
        let path = item.as_path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| item.id.clone());
        let stem = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        let ext = path
            .extension()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().into_owned(),
            _ => ".".to_string(),
        };
        let (outdir, out) = match output_dir {
            Some(d) => (
                d.to_string_lossy().into_owned(),
                d.join(&name).to_string_lossy().into_owned(),
            ),
            None => (String::new(), String::new()),
        };
        Self {
            input: item.id.clone(),
            name,
            stem,
            ext,
            dir,
            outdir,
            out,
        }
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        Some(match key {
            "" | "input" => &self.input,
            "name" => &self.name,
            "stem" => &self.stem,
            "ext" => &self.ext,
            "dir" => &self.dir,
            "outdir" => &self.outdir,
            "out" => &self.out,
            _ => return None,
        })
    }

    /// Single pass, so braces inside substituted values are never expanded again.
    /// Unknown `{...}` sequences are kept verbatim.
    fn expand(&self, arg: &str) -> String {
        let mut out = String::with_capacity(arg.len());
        let mut rest = arg;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}').and_then(|close| {
                self.lookup(&after[..close]).map(|v| (v, close))
            }) {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Runs the template once per item, tracked by the cancellation monitor.
pub struct CommandWorker {
    template: CommandTemplate,
    output_dir: Option<PathBuf>,
    overwrite: bool,
    require_companion: Option<String>,
    timeout: Option<Duration>,
    diag_limit: usize,
    registry: ChildRegistry,
    cancel: CancellationFlag,
}

impl CommandWorker {
    pub fn new(
        template: CommandTemplate,
        opts: &Opts,
        registry: ChildRegistry,
        cancel: CancellationFlag,
    ) -> Result<Self, BatchError> {
        if template.uses_output() && opts.output_dir.is_none() {
            return Err(BatchError::config(
                "command uses {out}/{outdir} but no --output-dir was given",
            ));
        }
        Ok(Self {
            template,
            output_dir: opts.output_dir.clone(),
            overwrite: opts.overwrite,
            require_companion: opts
                .require_companion
                .as_ref()
                .map(|e| e.trim_start_matches('.').to_string()),
            timeout: opts.timeout,
            diag_limit: opts.diag_limit,
            registry,
            cancel,
        })
    }

    /// Reason to skip this item, if a precondition is not met.
    fn skip_reason(&self, item: &WorkItem) -> Option<String> {
        if let Some(ext) = &self.require_companion
            && !item.is_url()
        {
            let companion = item.as_path().with_extension(ext);
            if !companion.exists() {
                return Some(format!("companion {} missing", companion.display()));
            }
        }
        if !self.overwrite
            && self.template.writes_out()
            && let Some(dir) = &self.output_dir
            && let Some(name) = item.as_path().file_name()
        {
            let target = dir.join(name);
            if target.exists() {
                return Some(format!("output {} exists", target.display()));
            }
        }
        None
    }
}

impl Worker for CommandWorker {
    fn execute(&self, item: &WorkItem) -> Result<WorkResult> {
        if let Some(reason) = self.skip_reason(item) {
            return Ok(WorkResult::skipped(item.clone(), reason));
        }
        let argv = self.template.render(item, self.output_dir.as_deref());
        log::debug!("{}: {}", item, argv.join(" "));
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);

        let output = run_tracked(cmd, &self.registry, &self.cancel, self.timeout)?;
        let diagnostic = output.diagnostic().to_string();
        if output.success() {
            return Ok(WorkResult::success(item.clone()).with_diagnostic(diagnostic));
        }
        let head = match output.termination {
            Termination::Cancelled => "killed (canceled)".to_string(),
            Termination::TimedOut => match self.timeout {
                Some(t) => format!("killed after {}s timeout", t.as_secs_f64()),
                None => "killed (timeout)".to_string(),
            },
            Termination::Exited => match output.status.code() {
                Some(code) => format!("exit {code}"),
                None => format!("terminated ({})", output.status),
            },
        };
        let reason = failure_reason(head, &diagnostic, self.diag_limit);
        Ok(WorkResult::failure(item.clone(), reason).with_diagnostic(diagnostic))
    }
}

/// `head: tail` within `limit` characters. The head (exit status, kill cause) is always
/// kept whole; the diagnostic tail gets what is left.
fn failure_reason(head: String, diagnostic: &str, limit: usize) -> String {
    let budget = limit.saturating_sub(head.chars().count() + 2);
    let tail = truncate_diagnostic(diagnostic, budget);
    if tail.is_empty() {
        head
    } else {
        format!("{head}: {tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Outcome;

    fn parts(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_template_is_config_error() {
        assert!(matches!(
            CommandTemplate::parse(&[]),
            Err(BatchError::Config(_))
        ));
    }

    #[test]
    fn input_appended_without_placeholder() {
        let t = CommandTemplate::parse(&parts(&["gzip", "-k"])).unwrap();
        let item = WorkItem::new(0, "dir/a.txt");
        assert_eq!(t.render(&item, None), ["gzip", "-k", "dir/a.txt"]);
    }

    #[test]
    fn placeholders_expand() {
        let t = CommandTemplate::parse(&parts(&[
            "ffmpeg", "-i", "{}", "-o", "{outdir}/{stem}.mkv", "{dir}|{name}|{ext}",
        ]))
        .unwrap();
        let item = WorkItem::new(0, "videos/clip.mp4");
        assert_eq!(
            t.render(&item, Some(Path::new("out"))),
            [
                "ffmpeg",
                "-i",
                "videos/clip.mp4",
                "-o",
                "out/clip.mkv",
                "videos|clip.mp4|mp4"
            ]
        );
    }

    #[test]
    fn braces_in_values_are_not_reexpanded() {
        let t = CommandTemplate::parse(&parts(&["echo", "{name}", "{unknown}"])).unwrap();
        let item = WorkItem::new(0, "odd{stem}.txt");
        assert_eq!(t.render(&item, None), ["echo", "odd{stem}.txt", "{unknown}"]);
    }

    #[test]
    fn out_requires_output_dir() {
        let t = CommandTemplate::parse(&parts(&["cp", "{}", "{out}"])).unwrap();
        let err = CommandWorker::new(
            t,
            &Opts::default(),
            ChildRegistry::new(),
            CancellationFlag::new(),
        );
        assert!(matches!(err, Err(BatchError::Config(_))));
    }

    #[test]
    fn existing_output_is_skipped_unless_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        std::fs::write(out.join("a.txt"), "old").unwrap();
        let input = dir.path().join("a.txt");
        std::fs::write(&input, "new").unwrap();

        let opts = Opts {
            output_dir: Some(out.clone()),
            ..Opts::default()
        };
        let t = CommandTemplate::parse(&parts(&["cp", "{}", "{out}"])).unwrap();
        let w = CommandWorker::new(t, &opts, ChildRegistry::new(), CancellationFlag::new())
            .unwrap();
        let item = WorkItem::new(0, input.to_string_lossy());
        let res = w.execute(&item).unwrap();
        assert!(matches!(res.outcome, Outcome::Skipped(_)));
    }

    #[test]
    fn missing_companion_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("movie.mkv");
        std::fs::write(&input, "").unwrap();
        let opts = Opts {
            require_companion: Some(".srt".into()),
            ..Opts::default()
        };
        let t = CommandTemplate::parse(&parts(&["true"])).unwrap();
        let w = CommandWorker::new(t, &opts, ChildRegistry::new(), CancellationFlag::new())
            .unwrap();
        let res = w.execute(&WorkItem::new(0, input.to_string_lossy())).unwrap();
        match res.outcome {
            Outcome::Skipped(reason) => assert!(reason.contains("movie.srt")),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_failure_with_stderr_tail() {
        let t = CommandTemplate::parse(&parts(&["sh", "-c", "echo nope >&2; exit 4", "{}"]))
            .unwrap();
        let w = CommandWorker::new(
            t,
            &Opts::default(),
            ChildRegistry::new(),
            CancellationFlag::new(),
        )
        .unwrap();
        let res = w.execute(&WorkItem::new(0, "x")).unwrap();
        assert_eq!(res.outcome, Outcome::Failure("exit 4: nope".into()));
        assert_eq!(res.diagnostic.trim(), "nope");
    }

    #[test]
    fn long_diagnostic_keeps_exit_status() {
        let noise = "0".repeat(400);
        let reason = failure_reason("exit 7".into(), &noise, 300);
        assert!(reason.starts_with("exit 7: …000"), "{reason}");
        assert_eq!(reason.chars().count(), 300);
        assert_eq!(failure_reason("exit 7".into(), &noise, 4), "exit 7");
    }

    #[cfg(unix)]
    #[test]
    fn long_stderr_report_line_shows_exit_code() {
        use crate::engine::{Reporter, ReporterOpts};
        use std::io::Write;
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Buf(Arc<Mutex<Vec<u8>>>);
        impl Write for Buf {
            fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(data);
                Ok(data.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let t = CommandTemplate::parse(&parts(&[
            "sh",
            "-c",
            "printf '%0400d' 0 >&2; exit 7",
            "{}",
        ]))
        .unwrap();
        let opts = Opts {
            diag_limit: 300,
            ..Opts::default()
        };
        let w = CommandWorker::new(t, &opts, ChildRegistry::new(), CancellationFlag::new())
            .unwrap();
        let buf = Buf::default();
        let reporter = Reporter::new(
            Box::new(buf.clone()),
            ReporterOpts {
                color: false,
                diag_limit: 300,
            },
        );
        reporter.report(w.execute(&WorkItem::new(0, "x")).unwrap());
        let line = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(line.starts_with("[FAIL] x: exit 7: …"), "{line}");
    }

    #[cfg(unix)]
    #[test]
    fn zero_exit_is_success() {
        let t = CommandTemplate::parse(&parts(&["true"])).unwrap();
        let w = CommandWorker::new(
            t,
            &Opts::default(),
            ChildRegistry::new(),
            CancellationFlag::new(),
        )
        .unwrap();
        let res = w.execute(&WorkItem::new(0, "anything")).unwrap();
        assert_eq!(res.outcome, Outcome::Success);
    }
}
