//! The target registry.
//!
//! A [`Registry`] maps target names to their stages. It is an ordinary value:
//! build it, register targets on it, then hand it to the dispatcher. Clones
//! share the same targets.

mod target;

pub use target::{RunState, Target};

use crate::context::Context;
use crate::errors::{BuildError, ConfigError};
use crate::stages::Stage;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// A set of named targets.
#[derive(Clone, Default)]
pub struct Registry {
    targets: Arc<RwLock<BTreeMap<String, Arc<Target>>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a target.
    ///
    /// The target keeps `ctx` and runs under it joined with the context it is
    /// invoked with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateTarget`] if the name is taken. The
    /// existing target is left in place.
    pub fn register_target(
        &self,
        ctx: &Context,
        name: impl Into<String>,
        stages: impl IntoIterator<Item = Stage>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        let mut targets = self.targets.write();
        if targets.contains_key(&name) {
            return Err(ConfigError::DuplicateTarget(name));
        }

        let target = Target::new(
            name.clone(),
            stages.into_iter().collect(),
            ctx.clone().without_registry(),
        );
        tracing::debug!(target_name = %name, stages = target.stages().len(), "registered target");
        targets.insert(name, Arc::new(target));
        Ok(())
    }

    /// Runs a target by name with the given trailing arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownTarget`] for an unknown name and
    /// [`BuildError::TargetFailed`] when a stage fails.
    pub async fn run_target(
        &self,
        ctx: &Context,
        name: &str,
        args: &[String],
    ) -> Result<(), BuildError> {
        let target = self
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTarget(name.to_string()))?;

        let ctx = target
            .context()
            .joined(ctx)
            .with_registry(self.clone())
            .with_run_id(Uuid::new_v4());
        target.run(&ctx, args).await
    }

    /// Returns true if a target with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.targets.read().contains_key(name)
    }

    /// Returns the target with this name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Target>> {
        self.targets.read().get(name).cloned()
    }

    /// Returns every target name, sorted.
    #[must_use]
    pub fn target_names(&self) -> Vec<String> {
        self.targets.read().keys().cloned().collect()
    }

    /// Returns the number of registered targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.read().len()
    }

    /// Returns true if no targets are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.read().is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("targets", &self.target_names())
            .finish()
    }
}
