//! Cascade tiers backed by external binaries: Ghostscript, qpdf, pdftk.
//!
//! Every invocation runs under a hard timeout. A timed-out tool is killed
//! and reported as a plain strategy failure so the cascade moves on; it is
//! never allowed to wedge the calling unit of work.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::pipeline::strategy::{StrategyContext, UnlockOutcome, UnlockStrategy, verify_output};

/// Captured result of one tool invocation.
#[derive(Debug)]
struct ToolRun {
    success: bool,
    detail: String,
}

/// Run `binary args..` with a kill-on-expiry deadline.
///
/// stdout/stderr are drained on separate threads so a chatty tool cannot
/// deadlock against a full pipe while we poll `try_wait`.
fn run_tool(binary: &str, args: &[&str], timeout: Duration) -> ToolRun {
    let child = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(e) => {
            return ToolRun {
                success: false,
                detail: format!("failed to spawn {binary}: {e}"),
            };
        }
    };

    let stdout_reader = spawn_drain(child.stdout.take());
    let stderr_reader = spawn_drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    break Err(format!(
                        "{binary} timed out after {}s and was killed",
                        timeout.as_secs()
                    ));
                }
                thread::sleep(Duration::from_millis(25));
            }
            Err(e) => break Err(format!("wait failed for {binary}: {e}")),
        }
    };

    match status {
        Ok(status) => {
            let stderr = join_drain(stderr_reader);
            let stdout = join_drain(stdout_reader);
            if status.success() {
                ToolRun {
                    success: true,
                    detail: "exit 0".to_string(),
                }
            } else {
                let mut detail = format!("{binary} exited with {status}");
                let noise = if stderr.trim().is_empty() { stdout } else { stderr };
                if !noise.trim().is_empty() {
                    detail.push_str(": ");
                    detail.push_str(first_lines(&noise, 3).trim());
                }
                ToolRun {
                    success: false,
                    detail,
                }
            }
        }
        // Timed out or unwaitable: kill the child and reap the drain
        // threads either way.
        Err(detail) => {
            kill_and_reap(&mut child);
            let _ = join_drain(stdout_reader);
            let _ = join_drain(stderr_reader);
            ToolRun {
                success: false,
                detail,
            }
        }
    }
}

fn spawn_drain<R: Read + Send + 'static>(reader: Option<R>) -> Option<thread::JoinHandle<String>> {
    reader.map(|mut r| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_drain(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn first_lines(text: &str, n: usize) -> String {
    text.lines().take(n).collect::<Vec<_>>().join(" | ")
}

/// Shared attempt shape for the external tiers: availability gate, run,
/// self-verify.
fn attempt_external(
    name: &'static str,
    binary: &str,
    args: &[&str],
    output: &Path,
    cx: &StrategyContext<'_>,
) -> UnlockOutcome {
    if !cx.tools.is_available(binary) {
        return UnlockOutcome::failure(name, format!("{binary} not installed"));
    }

    let run = run_tool(binary, args, cx.config.tool_timeout());
    if !run.success {
        return UnlockOutcome::failure(name, run.detail);
    }
    if let Some(reason) = verify_output(output) {
        // Exit 0 with a bad file is still a failure.
        return UnlockOutcome::failure(name, reason);
    }
    UnlockOutcome::success(name, "ok")
}

/// Tier 1: Ghostscript rewrite with explicit allow-all permissions.
///
/// Re-serializes the whole document, asserting `-dPermissions=-44` and
/// disabling metadata encryption. Preferred because it normalizes output
/// broadly across encryption variants.
#[derive(Debug, Default)]
pub struct GhostscriptEnhanced;

impl UnlockStrategy for GhostscriptEnhanced {
    fn name(&self) -> &'static str {
        "gs-enhanced"
    }

    fn attempt(&self, input: &Path, output: &Path, cx: &StrategyContext<'_>) -> UnlockOutcome {
        let out_arg = format!("-sOutputFile={}", output.display());
        let in_arg = input.display().to_string();
        let args = [
            "-q",
            "-dNOPAUSE",
            "-dBATCH",
            "-sDEVICE=pdfwrite",
            "-dCompatibilityLevel=1.4",
            "-dPDFSETTINGS=/default",
            "-dCompressFonts=true",
            "-dSubsetFonts=true",
            "-dEmbedAllFonts=true",
            "-dPermissions=-44",
            out_arg.as_str(),
            in_arg.as_str(),
        ];
        attempt_external(self.name(), &cx.config.gs_binary, &args, output, cx)
    }
}

/// Tier 3: standard Ghostscript rewrite, without the enhanced permission
/// flags. A narrower fallback for documents the enhanced mode mis-handles.
#[derive(Debug, Default)]
pub struct GhostscriptStandard;

impl UnlockStrategy for GhostscriptStandard {
    fn name(&self) -> &'static str {
        "gs-standard"
    }

    fn attempt(&self, input: &Path, output: &Path, cx: &StrategyContext<'_>) -> UnlockOutcome {
        let out_arg = format!("-sOutputFile={}", output.display());
        let in_arg = input.display().to_string();
        let args = [
            "-q",
            "-dNOPAUSE",
            "-dBATCH",
            "-sDEVICE=pdfwrite",
            out_arg.as_str(),
            "-c",
            ".setpdfwrite",
            "-f",
            in_arg.as_str(),
        ];
        attempt_external(self.name(), &cx.config.gs_binary, &args, output, cx)
    }
}

/// Tier 4: `qpdf --decrypt`, stripping the standard security handler when
/// the owner/user passwords are empty. Fails on documents requiring a
/// non-empty password; the pipeline never prompts or brute-forces.
#[derive(Debug, Default)]
pub struct QpdfDecrypt;

impl UnlockStrategy for QpdfDecrypt {
    fn name(&self) -> &'static str {
        "qpdf-decrypt"
    }

    fn attempt(&self, input: &Path, output: &Path, cx: &StrategyContext<'_>) -> UnlockOutcome {
        let in_arg = input.display().to_string();
        let out_arg = output.display().to_string();
        let args = ["--decrypt", in_arg.as_str(), out_arg.as_str()];
        attempt_external(self.name(), &cx.config.qpdf_binary, &args, output, cx)
    }
}

/// Tier 5: `pdftk .. allow all`, rewriting the permission bitmask without
/// touching page content.
#[derive(Debug, Default)]
pub struct PdftkAllowAll;

impl UnlockStrategy for PdftkAllowAll {
    fn name(&self) -> &'static str {
        "pdftk-allow-all"
    }

    fn attempt(&self, input: &Path, output: &Path, cx: &StrategyContext<'_>) -> UnlockOutcome {
        let in_arg = input.display().to_string();
        let out_arg = output.display().to_string();
        let args = [in_arg.as_str(), "output", out_arg.as_str(), "allow", "all"];
        attempt_external(self.name(), &cx.config.pdftk_binary, &args, output, cx)
    }
}
