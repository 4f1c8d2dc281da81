//! Targets and their run state.

use crate::context::Context;
use crate::errors::BuildError;
use crate::events::{LifecyclePayload, TARGET_COMPLETED, TARGET_FAILED, TARGET_STARTED};
use crate::logging;
use crate::stages::Stage;
use crate::utils::SpanTimer;

/// Where a target run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not started.
    Pending,
    /// Running the stage at this index.
    Running(usize),
    /// Every stage succeeded.
    Success,
    /// The stage at this index failed. No later stage runs.
    Failed(usize),
}

impl RunState {
    /// Starts a run over `stage_count` stages.
    ///
    /// A target without stages succeeds immediately.
    #[must_use]
    pub const fn begin(self, stage_count: usize) -> Self {
        match self {
            Self::Pending if stage_count == 0 => Self::Success,
            Self::Pending => Self::Running(0),
            other => other,
        }
    }

    /// Records the outcome of the running stage.
    #[must_use]
    pub const fn advance(self, succeeded: bool, stage_count: usize) -> Self {
        match self {
            Self::Running(i) if !succeeded => Self::Failed(i),
            Self::Running(i) if i + 1 < stage_count => Self::Running(i + 1),
            Self::Running(_) => Self::Success,
            other => other,
        }
    }

    /// Returns true for `Success` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed(_))
    }
}

/// A named, ordered sequence of stages.
#[derive(Debug, Clone)]
pub struct Target {
    name: String,
    stages: Vec<Stage>,
    context: Context,
}

impl Target {
    pub(crate) fn new(name: String, stages: Vec<Stage>, context: Context) -> Self {
        Self {
            name,
            stages,
            context,
        }
    }

    /// Returns the target name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Returns the context captured at registration.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Runs every stage in order, stopping at the first failure.
    pub(crate) async fn run(&self, ctx: &Context, args: &[String]) -> Result<(), BuildError> {
        let timer = SpanTimer::start(&self.name);
        ctx.emit_event(
            TARGET_STARTED,
            LifecyclePayload::started(&self.name, ctx.run_id()).into_value(),
        )
        .await;

        let count = self.stages.len();
        let mut state = RunState::Pending.begin(count);
        while let RunState::Running(index) = state {
            let stage = &self.stages[index];
            match stage.run(ctx, args).await {
                Ok(()) => state = state.advance(true, count),
                Err(source) => {
                    logging::error(format!(
                        "Target '{}': stopped at stage '{}'",
                        self.name,
                        stage.name()
                    ));
                    ctx.emit_event(
                        TARGET_FAILED,
                        LifecyclePayload::finished(
                            &self.name,
                            ctx.run_id(),
                            timer.elapsed(),
                            Some(source.to_string()),
                        )
                        .into_value(),
                    )
                    .await;
                    return Err(BuildError::TargetFailed {
                        target: self.name.clone(),
                        stage: stage.name().to_string(),
                        source: Box::new(source),
                    });
                }
            }
        }

        ctx.emit_event(
            TARGET_COMPLETED,
            LifecyclePayload::finished(&self.name, ctx.run_id(), timer.finish(), None)
                .into_value(),
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_target_succeeds_immediately() {
        assert_eq!(RunState::Pending.begin(0), RunState::Success);
    }

    #[test]
    fn test_run_state_walks_stages() {
        let state = RunState::Pending.begin(3);
        assert_eq!(state, RunState::Running(0));

        let state = state.advance(true, 3);
        assert_eq!(state, RunState::Running(1));
        let state = state.advance(true, 3);
        assert_eq!(state, RunState::Running(2));
        let state = state.advance(true, 3);
        assert_eq!(state, RunState::Success);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_failure_is_terminal() {
        let state = RunState::Pending.begin(3).advance(true, 3).advance(false, 3);
        assert_eq!(state, RunState::Failed(1));
        assert!(state.is_terminal());
        assert_eq!(state.advance(true, 3), RunState::Failed(1));
    }

    #[test]
    fn test_begin_only_from_pending() {
        assert_eq!(RunState::Running(1).begin(3), RunState::Running(1));
        assert_eq!(RunState::Pending.advance(true, 3), RunState::Pending);
    }
}
