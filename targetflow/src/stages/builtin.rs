//! Ready-made stages for composing targets.

use super::{stage, Stage};
use crate::errors::{BuildError, ConfigError};
use crate::logging;
use crate::run::{git_rev_parse, run};
use crate::utils::fs;
use std::path::PathBuf;

/// Runs another registered target as a single stage named `target:<name>`.
///
/// The nested target gets the same context and trailing arguments. Its
/// failure becomes this stage's failure.
#[must_use]
pub fn target_as_stage(name: impl Into<String>) -> Stage {
    let name = name.into();
    stage(format!("target:{name}"), move |ctx, args| {
        let name = name.clone();
        async move {
            let registry = ctx.registry().cloned().ok_or(ConfigError::NoRegistry)?;
            registry.run_target(&ctx, &name, &args).await
        }
    })
}

/// Changes the working directory to the root of the enclosing git repository.
#[must_use]
pub fn cd_to_repo_root() -> Stage {
    stage("cd to repo root", |ctx, _args| async move {
        let root = git_rev_parse(&ctx).await?;
        fs::cd(root)?;
        Ok(())
    })
}

/// Changes the working directory to `path`, relative to the repository root.
#[must_use]
pub fn cd_to_repo_path(path: impl Into<PathBuf>) -> Stage {
    let path = path.into();
    stage(format!("Cd to {}", path.display()), move |ctx, _args| {
        let path = path.clone();
        async move {
            let root = git_rev_parse(&ctx).await?;
            fs::cd(root.join(path))?;
            Ok(())
        }
    })
}

/// Fails if `git diff` reports uncommitted changes.
///
/// On a dirty tree logs `message`, the diff itself, and, when
/// `suggested_target` is not empty, which target would fix it.
#[must_use]
pub fn git_diff_stage(message: impl Into<String>, suggested_target: impl Into<String>) -> Stage {
    let message = message.into();
    let suggested_target = suggested_target.into();
    stage("Run Diff", move |ctx, _args| {
        let message = message.clone();
        let suggested_target = suggested_target.clone();
        async move {
            let mut diff: Vec<u8> = Vec::new();
            run(&ctx, &mut diff, "git", &["diff"]).await?;
            if diff.is_empty() {
                return Ok(());
            }

            logging::error(&message);
            logging::quiet_info(String::from_utf8_lossy(&diff));
            if !suggested_target.is_empty() {
                logging::error(format!(
                    "Run build system with {suggested_target} and push any changes"
                ));
            }
            Err(BuildError::AlreadyReported)
        }
    })
}
