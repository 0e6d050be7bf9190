//! Probe Invoker (spec §4.1): builds argv from a whitelisted option set,
//! spawns `ffprobe`, enforces a deadline, and parses its JSON output.

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::domain::{ProbeOptions, SourceDescriptor, Warning};
use crate::error::{Error, Result};
use crate::probe::raw::RawProbeResult;
use crate::probe::validate::{validate_local_path, validate_url_scheme};

const RETRY_DELAYS: [Duration; 2] = [Duration::from_millis(50), Duration::from_millis(200)];

#[derive(Debug)]
pub struct ProbeOutcome {
    pub raw: RawProbeResult,
    pub raw_json: serde_json::Value,
    pub warnings: Vec<Warning>,
}

/// One argv slot per `-show_*` flag plus the source path/URL in its own
/// slot (never concatenated into a shared string — spec §4.1).
fn build_args(source_arg: &str, options: &ProbeOptions) -> Vec<String> {
    let mut args = vec!["-v".to_string(), "error".to_string(), "-of".to_string(), "json".to_string()];

    if options.show_format {
        args.push("-show_format".into());
    }
    if options.show_streams {
        args.push("-show_streams".into());
    }
    if options.show_frames {
        args.push("-show_frames".into());
    }
    if options.show_packets {
        args.push("-show_packets".into());
    }
    if options.show_chapters {
        args.push("-show_chapters".into());
    }
    if options.show_programs {
        args.push("-show_programs".into());
    }
    if options.show_error {
        args.push("-show_error".into());
    }
    if let Some(streams) = &options.select_streams {
        args.push("-select_streams".into());
        args.push(streams.clone());
    }
    if let Some(probesize) = options.probesize {
        args.push("-probesize".into());
        args.push(probesize.to_string());
    }
    if let Some(analyzeduration) = options.analyzeduration {
        args.push("-analyzeduration".into());
        args.push(analyzeduration.to_string());
    }
    if let Some(user_agent) = &options.user_agent {
        args.push("-user_agent".into());
        args.push(user_agent.clone());
    }

    // Source occupies its own argv slot, never interpolated into another
    // argument string.
    args.push(source_arg.to_string());
    args
}

fn source_arg(source: &SourceDescriptor, config: &Config) -> Result<(String, PathBuf)> {
    match source {
        SourceDescriptor::LocalPath { path } => {
            let validated = validate_local_path(path, &config.allowed_path_roots)?;
            Ok((validated.to_string_lossy().into_owned(), config.ffprobe_path.clone()))
        }
        SourceDescriptor::Url { url, .. } => {
            validate_url_scheme(url, &config.allowed_url_schemes)?;
            Ok((url.clone(), config.ffprobe_path.clone()))
        }
        other => Err(Error::InvalidInput(format!(
            "probe invoker cannot handle source variant: {other:?}"
        ))),
    }
}

/// Runs `ffprobe` against `source` with `options`, retrying transient spawn
/// errors up to twice with the spec's exponential backoff. `ToolMissing` is
/// never retried.
pub async fn probe(
    source: &SourceDescriptor,
    options: &ProbeOptions,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<ProbeOutcome> {
    let (arg, ffprobe_path) = source_arg(source, config)?;
    let args = build_args(&arg, options);
    let timeout = options
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(config.default_probe_timeout);

    let mut last_err: Option<Error> = None;
    for (attempt, delay) in std::iter::once(None)
        .chain(RETRY_DELAYS.into_iter().map(Some))
        .enumerate()
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(format!("probe of {arg} cancelled before attempt {attempt}")));
        }
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        let mut cmd = Command::new(&ffprobe_path);
        cmd.args(&args);

        let spawn_result = crate::process_ext::run_cancellable(
            cmd,
            timeout,
            64 * 1024 * 1024,
            crate::process_ext::DEFAULT_KILL_GRACE,
            cancel,
            &config.process_slots,
        )
        .await;

        match spawn_result {
            Ok(output) => return finish(output, arg),
            Err(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ToolMissing(format!(
                    "ffprobe not executable at {}",
                    ffprobe_path.display()
                )));
            }
            Err(io_err) => {
                tracing::warn!(attempt, error = %io_err, "ffprobe spawn failed, will retry");
                last_err = Some(Error::ToolFailure(io_err.to_string()));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::ToolFailure("ffprobe spawn failed".into())))
}

fn finish(output: crate::process_ext::CapturedOutput, source_label: String) -> Result<ProbeOutcome> {
    if output.cancelled {
        return Err(Error::Cancelled(format!("ffprobe cancelled probing {source_label}")));
    }
    if output.timed_out {
        return Err(Error::Timeout(format!("ffprobe timed out probing {source_label}")));
    }
    if output.stdout_truncated {
        return Err(Error::ParseFailure("oversized".to_string()));
    }

    let mut warnings = Vec::new();
    if !output.stderr.is_empty() {
        warnings.push(Warning {
            source: "ffprobe".to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let raw_json: serde_json::Value = match serde_json::from_slice(&output.stdout) {
        Ok(v) => v,
        Err(e) => {
            let success = output.status.map(|s| s.success()).unwrap_or(false);
            return if success {
                Err(Error::ParseFailure(e.to_string()))
            } else {
                Err(Error::ToolFailure(format!(
                    "ffprobe exited non-zero and produced unparseable output: {e}"
                )))
            };
        }
    };

    // A non-zero exit with a parseable `format` object is still a success
    // (spec §4.1).
    if raw_json.get("format").is_none() {
        let success = output.status.map(|s| s.success()).unwrap_or(false);
        if !success {
            return Err(Error::ToolFailure(
                "ffprobe exited non-zero with no format object in output".to_string(),
            ));
        }
    }

    let raw: RawProbeResult = serde_json::from_value(raw_json.clone())
        .map_err(|e| Error::ParseFailure(e.to_string()))?;

    Ok(ProbeOutcome { raw, raw_json, warnings })
}
