//! External process execution.
//!
//! Everything Tidemark shells out to (the schema tool, backup commands and
//! manifest migrations) goes through [`ProcessRunner`], so tests can swap in
//! a fake without spawning real binaries.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;

/// A single process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Start from an empty environment instead of inheriting.
    pub clear_env: bool,
    /// Kill the process if it runs longer than this.
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Create an invocation of `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            clear_env: false,
            timeout: None,
        }
    }

    /// Run a command line through the platform shell.
    pub fn shell(command: &str) -> Self {
        if cfg!(windows) {
            Self::new("cmd").args(["/C", command])
        } else {
            Self::new("sh").args(["-c", command])
        }
    }

    /// Append arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Do not inherit the parent environment.
    pub fn clear_env(mut self) -> Self {
        self.clear_env = true;
        self
    }

    /// Bound the run time.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Command line for log output. Never includes environment values.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` if killed by a signal or timeout.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// The process was killed after exceeding its timeout.
    pub timed_out: bool,
}

impl ProcessOutput {
    /// A successful run with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// A failed run with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// Whether the process exited with status zero.
    pub fn success(&self) -> bool {
        self.code == Some(0) && !self.timed_out
    }

    /// Short description of a failure for error messages.
    pub fn failure_reason(&self) -> String {
        if self.timed_out {
            return "timed out".to_string();
        }
        let status = match self.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        match self.stderr.trim() {
            "" => status,
            stderr => format!("{}: {}", status, stderr),
        }
    }
}

/// Executes external processes.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run the invocation to completion.
    ///
    /// Returns `Err` only if the process could not be started.
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
        let mut command = tokio::process::Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if invocation.clear_env {
            command.env_clear();
        }
        command.envs(invocation.env.iter().map(|(k, v)| (k, v)));
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        let child = command.spawn()?;
        let output = match invocation.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    // Dropping the future drops the child, which kills it.
                    return Ok(ProcessOutput {
                        timed_out: true,
                        ..ProcessOutput::default()
                    });
                }
            },
            None => child.wait_with_output().await?,
        };

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_builder() {
        let inv = Invocation::new("appwrite")
            .args(["push", "tables"])
            .env("API_KEY", "secret")
            .timeout(Duration::from_secs(5));

        assert_eq!(inv.display(), "appwrite push tables");
        assert_eq!(inv.timeout, Some(Duration::from_secs(5)));
        assert!(!inv.display().contains("secret"));
    }

    #[test]
    fn test_output_failure_reason() {
        assert!(ProcessOutput::ok("").success());
        assert_eq!(ProcessOutput::failed(2, " denied\n").failure_reason(), "exit code 2: denied");

        let timed_out = ProcessOutput {
            timed_out: true,
            ..ProcessOutput::default()
        };
        assert!(!timed_out.success());
        assert_eq!(timed_out.failure_reason(), "timed out");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_captures_output() {
        let output = TokioProcessRunner
            .run(&Invocation::shell("echo hello; echo oops >&2; exit 3"))
            .await
            .unwrap();

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_clears_env() {
        let output = TokioProcessRunner
            .run(
                &Invocation::new("/bin/sh")
                    .args(["-c", "echo \"[$HOME][$ONLY]\""])
                    .env("ONLY", "this")
                    .clear_env(),
            )
            .await
            .unwrap();

        assert_eq!(output.stdout.trim(), "[][this]");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_timeout() {
        let output = TokioProcessRunner
            .run(&Invocation::shell("sleep 5").timeout(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(output.timed_out);
    }

    #[tokio::test]
    async fn test_tokio_runner_missing_program() {
        let err = TokioProcessRunner
            .run(&Invocation::new("tidemark-definitely-not-installed"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
