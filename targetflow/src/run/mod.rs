//! Running external programs.
//!
//! Stages launch programs through the [`CommandRunner`] carried by their
//! [`Context`]. Stderr always goes straight to the console; stdout is written
//! to a caller-supplied pipe so a stage can either show it or capture it.
//!
//! A program that exits non-zero has already printed its own diagnostics, so
//! the runner logs the exit code and returns [`BuildError::AlreadyReported`].

use crate::context::Context;
use crate::errors::BuildError;
use crate::logging;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// The program to run.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Working directory. `None` uses the process working directory.
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    /// Creates an invocation in the process working directory.
    #[must_use]
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(ToString::to_string).collect(),
            cwd: None,
        }
    }

    /// Sets the working directory.
    #[must_use]
    pub fn in_dir(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        if let Some(cwd) = &self.cwd {
            write!(f, " (in {})", cwd.display())?;
        }
        Ok(())
    }
}

/// Destination for a program's stdout.
pub type Pipe<'a> = dyn AsyncWrite + Unpin + Send + 'a;

/// Executes program invocations on behalf of stages.
#[async_trait]
pub trait CommandRunner: Send + Sync + fmt::Debug {
    /// Runs `invocation`, writing its stdout into `pipe`.
    ///
    /// Implementations must stop promptly once `ctx` is done.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::AlreadyReported`] on a non-zero exit,
    /// [`BuildError::Launch`] when the program cannot be started, or the
    /// context error when `ctx` ends first.
    async fn run(
        &self,
        ctx: &Context,
        invocation: &Invocation,
        pipe: &mut Pipe<'_>,
    ) -> Result<(), BuildError>;
}

/// Runs invocations as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        ctx: &Context,
        invocation: &Invocation,
        pipe: &mut Pipe<'_>,
    ) -> Result<(), BuildError> {
        logging::quiet_info(format!("Running: '{invocation}'"));

        let mut command = tokio::process::Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|source| BuildError::Launch {
            program: invocation.program.clone(),
            source,
        })?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| BuildError::msg("child stdout was not piped"))?;

        let finished = async {
            tokio::io::copy(&mut stdout, pipe).await?;
            pipe.flush().await?;
            child.wait().await
        };

        let status = tokio::select! {
            status = finished => status?,
            () = ctx.done() => {
                tracing::debug!(program = %invocation.program, "context ended, killing child");
                child.kill().await.ok();
                return Err(ctx.err().unwrap_or(BuildError::DeadlineExceeded));
            }
        };

        if status.success() {
            return Ok(());
        }
        match status.code() {
            Some(code) => logging::error(format!(
                "The process exited with a non-zero exit code: {code}"
            )),
            None => logging::error("The process was terminated by a signal"),
        }
        Err(BuildError::AlreadyReported)
    }
}

/// Runs a program in the process working directory, writing stdout to `pipe`.
///
/// # Errors
///
/// See [`CommandRunner::run`].
pub async fn run(
    ctx: &Context,
    pipe: &mut Pipe<'_>,
    program: &str,
    args: &[&str],
) -> Result<(), BuildError> {
    ctx.runner()
        .run(ctx, &Invocation::new(program, args), pipe)
        .await
}

/// Runs a program in `cwd`, writing stdout to `pipe`.
///
/// # Errors
///
/// See [`CommandRunner::run`].
pub async fn run_cwd(
    ctx: &Context,
    pipe: &mut Pipe<'_>,
    cwd: impl AsRef<Path>,
    program: &str,
    args: &[&str],
) -> Result<(), BuildError> {
    ctx.runner()
        .run(ctx, &Invocation::new(program, args).in_dir(cwd), pipe)
        .await
}

/// Runs a program in the process working directory with stdout on the console.
///
/// # Errors
///
/// See [`CommandRunner::run`].
pub async fn run_stdout(ctx: &Context, program: &str, args: &[&str]) -> Result<(), BuildError> {
    run(ctx, &mut tokio::io::stdout(), program, args).await
}

/// Runs a program in `cwd` with stdout on the console.
///
/// # Errors
///
/// See [`CommandRunner::run`].
pub async fn run_cwd_stdout(
    ctx: &Context,
    cwd: impl AsRef<Path>,
    program: &str,
    args: &[&str],
) -> Result<(), BuildError> {
    run_cwd(ctx, &mut tokio::io::stdout(), cwd, program, args).await
}

/// Returns the root of the git repository containing the working directory.
///
/// # Errors
///
/// Fails if `git rev-parse --show-toplevel` fails.
pub async fn git_rev_parse(ctx: &Context) -> Result<PathBuf, BuildError> {
    let mut buf: Vec<u8> = Vec::new();
    run(ctx, &mut buf, "git", &["rev-parse", "--show-toplevel"]).await?;
    Ok(PathBuf::from(String::from_utf8_lossy(&buf).trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{LogCapture, ScriptedRunner};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn test_invocation_display() {
        let inv = Invocation::new("cargo", &["fmt", "--all"]);
        assert_eq!(inv.to_string(), "cargo fmt --all");

        let inv = inv.in_dir("/tmp");
        assert_eq!(inv.to_string(), "cargo fmt --all (in /tmp)");
    }

    #[tokio::test]
    async fn test_process_runner_captures_stdout() {
        let ctx = Context::background();
        let mut buf: Vec<u8> = Vec::new();

        run(&ctx, &mut buf, "sh", &["-c", "echo hello"])
            .await
            .expect("echo should succeed");
        assert_eq!(String::from_utf8_lossy(&buf), "hello\n");
    }

    #[tokio::test]
    async fn test_process_runner_respects_cwd() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = Context::background();
        let mut buf: Vec<u8> = Vec::new();

        run_cwd(&ctx, &mut buf, dir.path(), "pwd", &[])
            .await
            .expect("pwd should succeed");
        let printed = PathBuf::from(String::from_utf8_lossy(&buf).trim());
        assert_eq!(
            printed.canonicalize().expect("canonical"),
            dir.path().canonicalize().expect("canonical")
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_non_zero_exit_is_reported() {
        let capture = LogCapture::new();
        let _guard = capture.install();
        let ctx = Context::background();
        let mut buf: Vec<u8> = Vec::new();

        let err = run(&ctx, &mut buf, "sh", &["-c", "exit 3"])
            .await
            .expect_err("exit 3 should fail");

        assert!(matches!(err, BuildError::AlreadyReported));
        assert!(capture.contains("Running: 'sh -c exit 3'"));
        assert!(capture.contains("The process exited with a non-zero exit code: 3"));
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let ctx = Context::background();
        let mut buf: Vec<u8> = Vec::new();

        let err = run(&ctx, &mut buf, "targetflow-definitely-not-a-program", &[])
            .await
            .expect_err("launch should fail");
        assert!(matches!(err, BuildError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_deadline_kills_child() {
        let ctx = Context::background().with_timeout(Duration::from_millis(100));
        let mut buf: Vec<u8> = Vec::new();
        let start = Instant::now();

        let err = run(&ctx, &mut buf, "sleep", &["10"])
            .await
            .expect_err("deadline should stop sleep");

        assert!(matches!(err, BuildError::DeadlineExceeded));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_git_rev_parse_trims_output() {
        let runner = Arc::new(ScriptedRunner::new().stdout("/work/repo\n"));
        let ctx = Context::background().with_runner(runner.clone());

        let root = git_rev_parse(&ctx).await.expect("rev-parse");
        assert_eq!(root, PathBuf::from("/work/repo"));
        assert_eq!(
            runner.invocations(),
            vec![Invocation::new("git", &["rev-parse", "--show-toplevel"])]
        );
    }
}
