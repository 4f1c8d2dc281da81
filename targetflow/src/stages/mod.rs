//! Stages: the units of work a target is made of.
//!
//! A [`Stage`] pairs a name with an async operation. Running a stage logs
//! its start and outcome, times it, reports lifecycle events, and races the
//! operation against the context so that a cancelled or timed-out context
//! ends the stage even if the operation never returns.

pub mod builtin;

use crate::context::Context;
use crate::errors::BuildError;
use crate::events::{
    LifecyclePayload, STAGE_CANCELLED, STAGE_COMPLETED, STAGE_FAILED, STAGE_STARTED,
};
use crate::logging::{self, MULTI_LINE_INDENT};
use crate::utils::SpanTimer;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

/// The result of a stage operation.
pub type StageResult = Result<(), BuildError>;

/// The future returned by a stage operation.
pub type StageFuture = BoxFuture<'static, StageResult>;

/// A stage operation: receives the context and the trailing command-line
/// arguments of the invocation.
pub type StageOp = Arc<dyn Fn(Context, Vec<String>) -> StageFuture + Send + Sync>;

/// A named unit of work.
///
/// Cloning is cheap; clones share the operation.
#[derive(Clone)]
pub struct Stage {
    name: String,
    op: StageOp,
}

/// Creates a stage from a name and an async operation.
///
/// # Examples
///
/// ```
/// use targetflow::stages::stage;
///
/// let hello = stage("hello", |_ctx, args| async move {
///     targetflow::logging::info(format!("hello {}", args.join(" ")));
///     Ok(())
/// });
/// assert_eq!(hello.name(), "hello");
/// ```
pub fn stage<F, Fut>(name: impl Into<String>, op: F) -> Stage
where
    F: Fn(Context, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StageResult> + Send + 'static,
{
    Stage {
        name: name.into(),
        op: Arc::new(move |ctx, args| Box::pin(op(ctx, args))),
    }
}

impl Stage {
    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the stage.
    ///
    /// The operation is spawned as its own task. If `ctx` ends first the
    /// stage returns the context error and the task is left running
    /// detached; operations that hold resources should watch
    /// [`Context::done`] themselves.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or the context error if the context
    /// ended first.
    pub async fn run(&self, ctx: &Context, args: &[String]) -> StageResult {
        let span = tracing::info_span!("stage", name = %self.name);
        self.run_inner(ctx, args).instrument(span).await
    }

    async fn run_inner(&self, ctx: &Context, args: &[String]) -> StageResult {
        let timer = SpanTimer::start(&self.name);
        logging::info(format!("Starting '{}' stage...", self.name));
        ctx.try_emit_event(
            STAGE_STARTED,
            LifecyclePayload::started(&self.name, ctx.run_id()).into_value(),
        );

        let mut handle = tokio::spawn((self.op)(ctx.clone(), args.to_vec()));
        let finished = tokio::select! {
            biased;
            joined = &mut handle => Some(joined.unwrap_or_else(|err| Err(join_error(&err)))),
            () = ctx.done() => None,
        };

        let (event, result) = match finished {
            Some(Ok(())) => {
                logging::success(format!("Stage '{}': Completed Successfully", self.name));
                (STAGE_COMPLETED, Ok(()))
            }
            Some(Err(err)) => {
                self.report_failure(&err);
                (STAGE_FAILED, Err(err))
            }
            None => {
                let err = ctx.err().unwrap_or(BuildError::DeadlineExceeded);
                self.report_failure(&err);
                logging::warn(format!(
                    "Stage '{}': abandoned its operation, which may still be running in the background",
                    self.name
                ));
                drop(handle);
                (STAGE_CANCELLED, Err(err))
            }
        };

        let elapsed = timer.finish();
        logging::quiet_info(format!("{MULTI_LINE_INDENT}Time Delta: {elapsed:?}"));
        ctx.try_emit_event(
            event,
            LifecyclePayload::finished(
                &self.name,
                ctx.run_id(),
                elapsed,
                result.as_ref().err().map(ToString::to_string),
            )
            .into_value(),
        );
        result
    }

    fn report_failure(&self, err: &BuildError) {
        if err.is_reported() {
            logging::error(format!("Stage '{}': Failed, see above for details", self.name));
        } else {
            logging::error(format!("Stage '{}': Encountered an error: {err}", self.name));
        }
    }
}

fn join_error(err: &tokio::task::JoinError) -> BuildError {
    if err.is_panic() {
        BuildError::msg("stage operation panicked")
    } else {
        BuildError::msg("stage operation was aborted")
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage").field("name", &self.name).finish()
    }
}
