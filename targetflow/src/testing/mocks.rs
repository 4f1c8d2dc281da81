//! Scripted collaborators for testing.

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use crate::context::Context;
use crate::errors::BuildError;
use crate::logging;
use crate::run::{CommandRunner, Invocation, Pipe};
use crate::stages::{stage, Stage};

/// How a scripted invocation ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// Exit code zero.
    Success,
    /// A non-zero exit code.
    Exit(i32),
    /// The program could not be started.
    LaunchFailure,
    /// The program never exits; only the context ends it.
    Hang,
}

#[derive(Debug, Clone)]
struct ScriptedResponse {
    stdout: Vec<u8>,
    outcome: ScriptedOutcome,
}

/// A command runner that replays queued responses instead of launching
/// processes, and records every invocation.
///
/// When the queue is empty each invocation succeeds with no output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    /// Creates a runner with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response with the given stdout and outcome.
    #[must_use]
    pub fn respond(self, stdout: impl Into<Vec<u8>>, outcome: ScriptedOutcome) -> Self {
        self.responses.lock().push_back(ScriptedResponse {
            stdout: stdout.into(),
            outcome,
        });
        self
    }

    /// Queues a successful response with the given stdout.
    #[must_use]
    pub fn stdout(self, stdout: impl Into<Vec<u8>>) -> Self {
        self.respond(stdout, ScriptedOutcome::Success)
    }

    /// Queues a response that exits with `code`.
    #[must_use]
    pub fn exit(self, code: i32) -> Self {
        self.respond(Vec::new(), ScriptedOutcome::Exit(code))
    }

    /// Queues a response whose program cannot be started.
    #[must_use]
    pub fn launch_failure(self) -> Self {
        self.respond(Vec::new(), ScriptedOutcome::LaunchFailure)
    }

    /// Queues a response that never finishes.
    #[must_use]
    pub fn hang(self) -> Self {
        self.respond(Vec::new(), ScriptedOutcome::Hang)
    }

    /// Returns every invocation seen so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    /// Returns every invocation as a command line.
    #[must_use]
    pub fn command_lines(&self) -> Vec<String> {
        self.invocations
            .lock()
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        ctx: &Context,
        invocation: &Invocation,
        pipe: &mut Pipe<'_>,
    ) -> Result<(), BuildError> {
        logging::quiet_info(format!("Running: '{invocation}'"));
        self.invocations.lock().push(invocation.clone());

        let response = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or(ScriptedResponse {
                stdout: Vec::new(),
                outcome: ScriptedOutcome::Success,
            });

        if response.outcome == ScriptedOutcome::LaunchFailure {
            return Err(BuildError::Launch {
                program: invocation.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted launch failure"),
            });
        }

        pipe.write_all(&response.stdout).await?;
        pipe.flush().await?;

        match response.outcome {
            ScriptedOutcome::Success | ScriptedOutcome::LaunchFailure => Ok(()),
            ScriptedOutcome::Exit(code) => {
                logging::error(format!(
                    "The process exited with a non-zero exit code: {code}"
                ));
                Err(BuildError::AlreadyReported)
            }
            ScriptedOutcome::Hang => {
                ctx.done().await;
                Err(ctx.err().unwrap_or(BuildError::DeadlineExceeded))
            }
        }
    }
}

/// Creates a stage that appends its name to `log` and succeeds.
#[must_use]
pub fn recording_stage(name: impl Into<String>, log: Arc<Mutex<Vec<String>>>) -> Stage {
    let name = name.into();
    let label = name.clone();
    stage(name, move |_ctx, _args| {
        let log = log.clone();
        let label = label.clone();
        async move {
            log.lock().push(label);
            Ok(())
        }
    })
}

/// Creates a stage that fails with `message`.
#[must_use]
pub fn failing_stage(name: impl Into<String>, message: impl Into<String>) -> Stage {
    let message = message.into();
    stage(name, move |_ctx, _args| {
        let message = message.clone();
        async move { Err(BuildError::msg(message)) }
    })
}

/// Creates a stage whose operation never returns.
#[must_use]
pub fn hanging_stage(name: impl Into<String>) -> Stage {
    stage(name, |_ctx, _args| async {
        std::future::pending::<()>().await;
        Ok(())
    })
}

static CWD_LOCK: Mutex<()> = Mutex::new(());

/// Serializes tests that change the process working directory.
pub fn cwd_lock() -> MutexGuard<'static, ()> {
    CWD_LOCK.lock()
}
