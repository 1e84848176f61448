//! External CLI providers.
//!
//! The configured `command` is split with shell quoting rules, followed by
//! the provider's `default_flags` and `--model <model>`. The prompt goes in
//! on stdin; stdout is the output, stderr the diagnostic, and the exit code
//! the status.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use coordination::{AdapterError, ProviderAdapter, ProviderResponse, ProviderSpec, TaskPayload};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit status reported when the adapter's own deadline fires.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Status for a process killed by a signal.
const SIGNAL_EXIT_CODE: i32 = -1;

/// Spawns one process per attempt.
#[derive(Debug, Clone, Default)]
pub struct ProcessAdapter;

impl ProcessAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Program and argument list for one invocation.
    pub fn command_line(
        &self,
        provider: &ProviderSpec,
        model: &str,
    ) -> Result<(String, Vec<String>), AdapterError> {
        let raw = provider.command.as_deref().unwrap_or_default();
        let mut parts = shlex::split(raw).ok_or_else(|| {
            AdapterError::Misconfigured(format!(
                "provider '{}' command has unbalanced quotes: {raw}",
                provider.id
            ))
        })?;
        if parts.is_empty() {
            return Err(AdapterError::Misconfigured(format!(
                "provider '{}' has no command",
                provider.id
            )));
        }
        let program = parts.remove(0);
        parts.extend(provider.default_flags.iter().cloned());
        if !model.is_empty() {
            parts.push("--model".to_string());
            parts.push(model.to_string());
        }
        Ok((program, parts))
    }
}

#[async_trait]
impl ProviderAdapter for ProcessAdapter {
    async fn invoke(
        &self,
        provider: &ProviderSpec,
        model: &str,
        payload: &TaskPayload,
        timeout: Duration,
    ) -> Result<ProviderResponse, AdapterError> {
        let (program, args) = self.command_line(provider, model)?;
        debug!(provider = %provider.id, %program, ?args, "Spawning provider process");

        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &payload.working_dir {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = command.spawn()?;

        let stdin = child.stdin.take();
        let prompt = payload.prompt.as_bytes();
        let provider_id = provider.id.as_str();
        // Feed stdin while draining stdout/stderr; a provider that writes
        // before reading would otherwise block on a full pipe.
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // A provider that ignores stdin may exit before reading it
                if let Err(e) = stdin.write_all(prompt).await {
                    debug!(provider = %provider_id, error = %e, "Provider did not read the prompt");
                }
            }
        };
        let run = async {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        let output = match tokio::time::timeout(timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(provider = %provider.id, ?timeout, "Provider process timed out; killed");
                return Ok(ProviderResponse::failure(
                    TIMEOUT_EXIT_CODE,
                    format!("process timed out after {}s", timeout.as_secs()),
                )
                .with_duration(started.elapsed()));
            }
        };

        let status = output.status.code().unwrap_or(SIGNAL_EXIT_CODE);
        Ok(ProviderResponse {
            status,
            output: String::from_utf8_lossy(&output.stdout).into_owned(),
            diagnostic: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quoting_and_flags() {
        let mut provider = ProviderSpec::process(
            "claude",
            r#"claude -p --append-system-prompt "be terse""#,
            &["claude-3-5-sonnet-20241022"],
        );
        provider.default_flags = vec!["--output-format".into(), "text".into()];

        let (program, args) = ProcessAdapter::new()
            .command_line(&provider, "claude-3-5-sonnet-20241022")
            .unwrap();
        assert_eq!(program, "claude");
        assert_eq!(
            args,
            vec![
                "-p",
                "--append-system-prompt",
                "be terse",
                "--output-format",
                "text",
                "--model",
                "claude-3-5-sonnet-20241022"
            ]
        );
    }

    #[test]
    fn test_command_line_rejects_bad_commands() {
        let adapter = ProcessAdapter::new();
        let unbalanced = ProviderSpec::process("x", r#"tool "oops"#, &["m"]);
        assert!(matches!(
            adapter.command_line(&unbalanced, "m"),
            Err(AdapterError::Misconfigured(_))
        ));
        let empty = ProviderSpec::process("x", "   ", &["m"]);
        assert!(matches!(
            adapter.command_line(&empty, "m"),
            Err(AdapterError::Misconfigured(_))
        ));
    }
}
