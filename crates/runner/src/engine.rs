//! Test engine subprocess driver
//!
//! Builds the engine command line from the configured template and runs it
//! as an isolated subprocess, relaying its stdout/stderr lines to the
//! broadcast channel as they arrive.

use crate::config::EngineConfig;
use crate::events::{EventChannel, ProgressEvent};
use std::path::Path;
use std::process::Stdio;
use testdeck_common::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// One fully substituted engine command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    pub program: String,
    pub args: Vec<String>,
}

/// Substitute the `{file}`, `{filter}` and `{output}` placeholders into
/// the configured argument template.
pub fn build_invocation(
    config: &EngineConfig,
    file: &str,
    filter: &str,
    output: &Path,
) -> EngineInvocation {
    let output = output.display().to_string();
    let args = config
        .args
        .iter()
        .map(|arg| {
            arg.replace("{file}", file)
                .replace("{filter}", filter)
                .replace("{output}", &output)
        })
        .collect();

    EngineInvocation {
        program: config.program.clone(),
        args,
    }
}

/// Run one engine invocation to completion.
///
/// Returns the exit code (None when the child was killed by a signal).
/// The await is bounded only by the subprocess's own lifecycle; there is
/// no internal timeout.
pub async fn run(invocation: &EngineInvocation, events: &EventChannel) -> Result<Option<i32>> {
    debug!(
        "engine command: {} {}",
        invocation.program,
        invocation.args.join(" ")
    );

    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Engine(format!("failed to spawn test engine: {}", e)))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_task = stdout.map(|out| tokio::spawn(relay_lines(out, events.clone())));
    let err_task = stderr.map(|err| tokio::spawn(relay_lines(err, events.clone())));

    let status = child
        .wait()
        .await
        .map_err(|e| Error::Engine(format!("failed to await test engine: {}", e)))?;

    if let Some(task) = out_task {
        let _ = task.await;
    }
    if let Some(task) = err_task {
        let _ = task.await;
    }

    if !status.success() {
        warn!("test engine exited with {}", status);
    }

    Ok(status.code())
}

/// Relay every line of one child stream to the broadcast channel
async fn relay_lines<R: AsyncRead + Unpin>(stream: R, events: EventChannel) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => events.publish(ProgressEvent::EngineLine { line }),
            Ok(None) => break,
            Err(e) => {
                warn!("engine output stream error: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh(script: &str) -> EngineInvocation {
        EngineInvocation {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[test]
    fn template_substitution_fills_all_placeholders() {
        let config = EngineConfig::default();
        let invocation = build_invocation(
            &config,
            "a.test.js",
            "t1|t2",
            Path::new("/store/results/root/a.test/results.json"),
        );

        assert_eq!(invocation.program, "npx");
        assert!(invocation.args.contains(&"a.test.js".to_string()));
        assert!(invocation.args.contains(&"t1|t2".to_string()));
        assert!(invocation
            .args
            .contains(&"/store/results/root/a.test/results.json".to_string()));
        assert!(!invocation.args.iter().any(|a| a.contains('{')));
    }

    #[test]
    fn template_without_placeholders_is_passed_through() {
        let config = EngineConfig {
            program: "true".to_string(),
            args: vec![],
        };
        let invocation = build_invocation(&config, "x", "y", &PathBuf::from("/z"));
        assert_eq!(invocation.args.len(), 0);
    }

    #[tokio::test]
    async fn exit_code_is_reported() {
        let events = EventChannel::new(16);
        let code = run(&sh("exit 7"), &events).await.unwrap();
        assert_eq!(code, Some(7));
    }

    #[tokio::test]
    async fn output_lines_are_relayed() {
        let events = EventChannel::new(16);
        let mut rx = events.subscribe();

        let code = run(&sh("echo one; echo two >&2"), &events).await.unwrap();
        assert_eq!(code, Some(0));

        let mut seen = Vec::new();
        while let Ok(line) = rx.try_recv() {
            seen.push(line);
        }
        assert!(seen.contains(&"one".to_string()));
        assert!(seen.contains(&"two".to_string()));
    }

    #[tokio::test]
    async fn missing_program_is_an_engine_error() {
        let events = EventChannel::new(16);
        let invocation = EngineInvocation {
            program: "/definitely/not/a/real/engine".to_string(),
            args: vec![],
        };
        let err = run(&invocation, &events).await.unwrap_err();
        assert!(matches!(err, Error::Engine(_)));
    }
}
