//! Process execution behind a trait so scenarios can run against a fake.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

/// A fully described program invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    /// Program to run
    pub program: String,
    /// Arguments, not shell-interpreted
    pub args: Vec<String>,
    /// Text written to the program's stdin
    pub stdin: Option<String>,
    /// Deadline after which the program is killed
    pub timeout: Duration,
}

impl Invocation {
    /// Whether any argument equals `arg`
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished program.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with exit code 1 and the given stderr
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the program exited with code 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs invocations. Only spawn/timeout problems are errors here; a non-zero
/// exit is reported through [`CommandOutput::code`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation to completion
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Real implementation backed by `tokio::process`.
#[derive(Clone, Debug, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!(command = %invocation, "Running command");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let stdin = child.stdin.take();
        // the deadline covers feeding stdin; dropping `child` on timeout kills it
        let finished = async {
            if let (Some(input), Some(mut stdin)) = (&invocation.stdin, stdin) {
                stdin.write_all(input.as_bytes()).await?;
                // close stdin so `kubectl apply -f -` sees EOF
                drop(stdin);
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(invocation.timeout, finished)
            .await
            .map_err(|_| Error::Timeout {
                program: invocation.program.clone(),
                seconds: invocation.timeout.as_secs(),
            })??;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, stdin: Option<&str>, timeout: Duration) -> Invocation {
        Invocation {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            stdin: stdin.map(str::to_string),
            timeout,
        }
    }

    #[test]
    fn invocation_display_is_the_command_line() {
        let inv = Invocation {
            program: "kubectl".to_string(),
            args: vec!["get".to_string(), "pods".to_string()],
            stdin: None,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(inv.to_string(), "kubectl get pods");
        assert!(inv.has_arg("pods"));
        assert!(!inv.has_arg("svc"));
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let out = ProcessRunner
            .run(&sh("echo hello; echo oops >&2; exit 3", None, Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert!(!out.success());
    }

    #[tokio::test]
    async fn feeds_stdin() {
        let out = ProcessRunner
            .run(&sh("cat", Some("kind: Gateway\n"), Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "kind: Gateway\n");
    }

    #[tokio::test]
    async fn kills_programs_past_their_deadline() {
        let err = ProcessRunner
            .run(&sh("sleep 5", None, Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn deadline_covers_a_stdin_the_program_never_reads() {
        let manifest = "x".repeat(1 << 20);
        let started = std::time::Instant::now();
        let err = ProcessRunner
            .run(&sh("sleep 5", Some(&manifest), Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let inv = Invocation {
            program: "definitely-not-a-real-binary-4242".to_string(),
            args: vec![],
            stdin: None,
            timeout: Duration::from_secs(1),
        };
        let err = ProcessRunner.run(&inv).await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
