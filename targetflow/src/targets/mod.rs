//! Standard targets for cargo repositories.
//!
//! Each `register_*` function adds one family of targets to a [`Registry`].
//! Target sets are configured with plain values: fill in a struct literal and
//! pass it in.

use crate::context::Context;
use crate::errors::ConfigError;
use crate::logging;
use crate::registry::Registry;
use crate::run::{run, run_stdout};
use crate::stages::builtin::{cd_to_repo_root, git_diff_stage, target_as_stage};
use crate::stages::{stage, Stage};
use crate::utils::tmp_env_var_set;

/// Name of the target that rebuilds the build system.
pub const BS_BUILD_TARGET: &str = "buildbs";
/// Name of the dependency update target.
pub const UPDATE_DEPS_TARGET: &str = "updateDeps";
/// Name of the target that installs the README generator.
pub const README_INSTALL_TARGET: &str = "rdmeInstall";
/// Name of the target that regenerates the README.
pub const README_TARGET: &str = "rdmeReadme";
/// Name of the pre-merge gate target.
pub const MERGEGATE_TARGET: &str = "mergegate";

/// Default name of the formatting target.
pub const DEFAULT_FMT_TARGET: &str = "fmt";
/// Default name of the lint target.
pub const DEFAULT_LINT_TARGET: &str = "lint";
/// Default name of the code generation target.
pub const DEFAULT_GENERATE_TARGET: &str = "generate";
/// Default name of the test target.
pub const DEFAULT_TEST_TARGET: &str = "test";
/// Default name of the benchmark target.
pub const DEFAULT_BENCH_TARGET: &str = "bench";

/// Creates a stage that runs `program args...` with stdout on the console.
fn command_stage(name: impl Into<String>, program: &'static str, args: Vec<String>) -> Stage {
    stage(name, move |ctx, _args| {
        let args = args.clone();
        async move {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            run_stdout(&ctx, program, &args).await
        }
    })
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

/// Registers `buildbs`, which rebuilds the build system binary.
///
/// # Errors
///
/// Returns [`ConfigError::DuplicateTarget`] if the name is taken.
pub fn register_bs_build_target(registry: &Registry, package: &str) -> Result<(), ConfigError> {
    registry.register_target(
        &Context::background(),
        BS_BUILD_TARGET,
        vec![
            cd_to_repo_root(),
            command_stage(
                "Run cargo build",
                "cargo",
                strings(&["build", "--package", package]),
            ),
        ],
    )
}

/// Configures the dependency update target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDeps {
    /// Dependencies whose name contains this marker are first party and are
    /// always moved to their newest version individually.
    pub first_party_marker: String,
    /// The build system crate. A warning is printed when it changes.
    pub bs_crate: String,
}

/// Returns the first-party crate names listed in `cargo tree --depth 1
/// --prefix none` output.
///
/// Only registry and git packages can be updated, so local packages are
/// skipped: every workspace member root line and every path dependency
/// carries a `(/path)` source. Section headers such as `[dev-dependencies]`
/// are skipped too.
#[must_use]
pub fn first_party_crates(tree: &str, marker: &str) -> Vec<String> {
    let mut names: Vec<String> = tree
        .lines()
        .filter(|line| !is_local_package(line))
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| !name.starts_with('[') && name.contains(marker))
        .map(ToString::to_string)
        .collect();
    names.sort();
    names.dedup();
    names
}

fn is_local_package(line: &str) -> bool {
    line.split(" (").skip(1).any(|source| {
        let source = source.split(')').next().unwrap_or_default();
        !source.contains("://")
            && (source.starts_with('/') || source.starts_with('\\') || source.contains(":\\"))
    })
}

/// Registers `updateDeps`, which updates every dependency in `Cargo.lock`.
///
/// # Errors
///
/// Returns [`ConfigError::DuplicateTarget`] if the name is taken.
pub fn register_update_deps_target(
    registry: &Registry,
    config: &UpdateDeps,
) -> Result<(), ConfigError> {
    let marker = config.first_party_marker.clone();
    let first_party = stage(
        format!("{marker} package updates"),
        move |ctx, _args| {
            let marker = marker.clone();
            async move {
                let mut tree: Vec<u8> = Vec::new();
                run(&ctx, &mut tree, "cargo", &["tree", "--depth", "1", "--prefix", "none"])
                    .await?;

                let _fetch = tmp_env_var_set("CARGO_NET_GIT_FETCH_WITH_CLI", "true");
                for name in first_party_crates(&String::from_utf8_lossy(&tree), &marker) {
                    run_stdout(&ctx, "cargo", &["update", "--package", &name]).await?;
                }
                Ok(())
            }
        },
    );

    let bs_crate = config.bs_crate.clone();
    let check_bs = stage("Check if bs updated", move |ctx, _args| {
        let bs_crate = bs_crate.clone();
        async move {
            let mut diff: Vec<u8> = Vec::new();
            run(&ctx, &mut diff, "git", &["diff", "--unified=0", "Cargo.lock"]).await?;
            if String::from_utf8_lossy(&diff).trim().contains(&bs_crate) {
                logging::warn("The build system package was upgraded!");
                logging::warn(
                    "It is recommended to rebuild your projects build system after this command completes.",
                );
            }
            Ok(())
        }
    });

    registry.register_target(
        &Context::background(),
        UPDATE_DEPS_TARGET,
        vec![
            cd_to_repo_root(),
            first_party,
            command_stage(
                format!("Non {} package updates", config.first_party_marker),
                "cargo",
                strings(&["update"]),
            ),
            check_bs,
        ],
    )
}

/// Registers `rdmeInstall` and `rdmeReadme`, which install `cargo-rdme` and
/// regenerate `README.md` from the crate docs.
///
/// # Errors
///
/// Returns [`ConfigError::DuplicateTarget`] if either name is taken.
pub fn register_readme_targets(registry: &Registry) -> Result<(), ConfigError> {
    registry.register_target(
        &Context::background(),
        README_INSTALL_TARGET,
        vec![
            cd_to_repo_root(),
            command_stage("Install cargo-rdme", "cargo", strings(&["install", "cargo-rdme"])),
        ],
    )?;

    registry.register_target(
        &Context::background(),
        README_TARGET,
        vec![
            cd_to_repo_root(),
            stage("Run cargo rdme", |ctx, _args| async move {
                let result = run_stdout(&ctx, "cargo", &["rdme", "--force"]).await;
                if result.is_err() {
                    logging::quiet_info(format!(
                        "Consider running build system with {README_INSTALL_TARGET} target if cargo-rdme is not installed"
                    ));
                }
                result
            }),
        ],
    )
}

/// A target that runs one cargo command from the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTarget {
    /// Target name.
    pub name: String,
    /// Arguments passed to `cargo`. The first one names the stage.
    pub args: Vec<String>,
}

impl CommandTarget {
    /// Creates a command target.
    #[must_use]
    pub fn new(name: impl Into<String>, args: &[&str]) -> Self {
        Self {
            name: name.into(),
            args: strings(args),
        }
    }
}

/// Which common cargo targets to register. `Default` registers none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CargoTargets {
    /// Formats the workspace.
    pub fmt: Option<CommandTarget>,
    /// Lints the workspace.
    pub lint: Option<CommandTarget>,
    /// Runs code generation (build scripts).
    pub generate: Option<CommandTarget>,
    /// Runs the tests.
    pub test: Option<CommandTarget>,
    /// Runs the benchmarks.
    pub bench: Option<CommandTarget>,
}

impl CargoTargets {
    /// Returns every target with its default name and arguments.
    #[must_use]
    pub fn all() -> Self {
        Self {
            fmt: Some(CommandTarget::new(DEFAULT_FMT_TARGET, &["fmt", "--all"])),
            lint: Some(CommandTarget::new(
                DEFAULT_LINT_TARGET,
                &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
            )),
            generate: Some(CommandTarget::new(
                DEFAULT_GENERATE_TARGET,
                &["build", "--workspace"],
            )),
            test: Some(CommandTarget::new(DEFAULT_TEST_TARGET, &["test", "--workspace"])),
            bench: Some(CommandTarget::new(DEFAULT_BENCH_TARGET, &["bench", "--workspace"])),
        }
    }

    fn entries(&self) -> impl Iterator<Item = &CommandTarget> {
        [&self.fmt, &self.lint, &self.generate, &self.test, &self.bench]
            .into_iter()
            .flatten()
    }
}

/// Registers each enabled cargo target as cd-to-root followed by the cargo
/// command. Entries with an empty name or no arguments are skipped.
///
/// # Errors
///
/// Returns [`ConfigError::DuplicateTarget`] if a name is taken.
pub fn register_cargo_targets(registry: &Registry, targets: &CargoTargets) -> Result<(), ConfigError> {
    for target in targets.entries() {
        let Some(subcommand) = target.args.first() else {
            continue;
        };
        if target.name.is_empty() {
            continue;
        }

        registry.register_target(
            &Context::background(),
            target.name.clone(),
            vec![
                cd_to_repo_root(),
                command_stage(format!("Run cargo {subcommand}"), "cargo", target.args.clone()),
            ],
        )?;
    }
    Ok(())
}

/// Configures the pre-merge gate.
///
/// Targets named here must be registered by the time the gate runs.
#[derive(Debug, Clone, Default)]
pub struct MergegateTargets {
    /// Run `updateDeps` and fail if it changed anything.
    pub check_deps_updated: bool,
    /// Regenerate the README and fail if it changed.
    pub check_readme: bool,
    /// Formatting target; fail if formatting changed anything.
    pub fmt_target: Option<String>,
    /// Lint target.
    pub lint_target: Option<String>,
    /// Code generation target; fail if generated code changed.
    pub generate_target: Option<String>,
    /// Test target.
    pub test_target: Option<String>,
    /// Stages run before every check.
    pub pre_stages: Vec<Stage>,
    /// Stages run after every check.
    pub post_stages: Vec<Stage>,
}

impl MergegateTargets {
    /// Returns the gate's stages in execution order.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = self.pre_stages.clone();

        if let Some(fmt) = &self.fmt_target {
            stages.push(target_as_stage(fmt.as_str()));
            stages.push(git_diff_stage("Fix formatting to get a passing run!", fmt.as_str()));
        }
        if self.check_readme {
            stages.push(target_as_stage(README_INSTALL_TARGET));
            stages.push(target_as_stage(README_TARGET));
            stages.push(git_diff_stage("Readme is out of date", README_TARGET));
        }
        if self.check_deps_updated {
            stages.push(target_as_stage(UPDATE_DEPS_TARGET));
            stages.push(git_diff_stage(
                "Out of date packages were detected",
                UPDATE_DEPS_TARGET,
            ));
        }
        if let Some(generate) = &self.generate_target {
            stages.push(target_as_stage(generate.as_str()));
            stages.push(git_diff_stage(
                "Out of sync generated code was detected",
                generate.as_str(),
            ));
        }
        if let Some(lint) = &self.lint_target {
            stages.push(target_as_stage(lint.as_str()));
        }
        if let Some(test) = &self.test_target {
            stages.push(target_as_stage(test.as_str()));
        }

        stages.extend(self.post_stages.iter().cloned());
        stages
    }
}

/// Registers `mergegate`.
///
/// # Errors
///
/// Returns [`ConfigError::DuplicateTarget`] if the name is taken.
pub fn register_mergegate_target(
    registry: &Registry,
    config: &MergegateTargets,
) -> Result<(), ConfigError> {
    registry.register_target(&Context::background(), MERGEGATE_TARGET, config.stages())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BuildError;
    use crate::testing::{cwd_lock, LogCapture, ScriptedRunner};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct RepoFixture {
        dir: tempfile::TempDir,
        original: PathBuf,
    }

    impl RepoFixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().expect("tempdir"),
                original: std::env::current_dir().expect("cwd"),
            }
        }

        fn root_line(&self) -> String {
            format!("{}\n", self.dir.path().display())
        }
    }

    impl Drop for RepoFixture {
        fn drop(&mut self) {
            std::env::set_current_dir(&self.original).ok();
        }
    }

    fn names(stages: &[Stage]) -> Vec<&str> {
        stages.iter().map(Stage::name).collect()
    }

    fn noop(name: &str) -> Stage {
        stage(name, |_ctx, _args| async { Ok(()) })
    }

    #[test]
    fn test_first_party_crates() {
        let tree = "\
targetflow-bs v0.1.0 (/work/bs)
targetflow v0.1.0 (/work/targetflow)
targetflow-macros v0.3.0 (https://github.com/acme/targetflow-macros#1a2b3c4d)
tokio v1.40.0
[dev-dependencies]
assert_cmd v2.0.16

targetflow v0.1.0 (/work/targetflow)
targetflow-core v0.4.1
targetflow-core v0.4.1 (*)
serde v1.0.210
";
        assert_eq!(
            first_party_crates(tree, "targetflow"),
            vec!["targetflow-core", "targetflow-macros"]
        );
        assert!(first_party_crates(tree, "nothing").is_empty());
    }

    #[test]
    fn test_default_cargo_targets_register_nothing() {
        let registry = Registry::new();
        register_cargo_targets(&registry, &CargoTargets::default()).expect("register");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_all_cargo_targets() {
        let registry = Registry::new();
        register_cargo_targets(&registry, &CargoTargets::all()).expect("register");
        assert_eq!(
            registry.target_names(),
            vec!["bench", "fmt", "generate", "lint", "test"]
        );

        let fmt = registry.get("fmt").expect("fmt");
        assert_eq!(names(fmt.stages()), vec!["cd to repo root", "Run cargo fmt"]);
    }

    #[test]
    fn test_cargo_targets_skip_empty_entries() {
        let registry = Registry::new();
        let targets = CargoTargets {
            test: Some(CommandTarget::new("unit", &["test", "--lib"])),
            bench: Some(CommandTarget::new("bench", &[])),
            ..CargoTargets::default()
        };
        register_cargo_targets(&registry, &targets).expect("register");
        assert_eq!(registry.target_names(), vec!["unit"]);
    }

    #[test]
    fn test_duplicate_cargo_target_is_reported() {
        let registry = Registry::new();
        let targets = CargoTargets {
            fmt: Some(CommandTarget::new("check", &["fmt", "--check"])),
            lint: Some(CommandTarget::new("check", &["clippy"])),
            ..CargoTargets::default()
        };
        let err = register_cargo_targets(&registry, &targets).expect_err("duplicate");
        assert_eq!(err, ConfigError::DuplicateTarget("check".to_string()));
    }

    #[test]
    fn test_mergegate_stage_order() {
        let config = MergegateTargets {
            check_deps_updated: true,
            check_readme: true,
            fmt_target: Some("fmt".to_string()),
            lint_target: Some("lint".to_string()),
            generate_target: Some("gen".to_string()),
            test_target: Some("test".to_string()),
            pre_stages: vec![noop("pre")],
            post_stages: vec![noop("post")],
        };

        assert_eq!(
            names(&config.stages()),
            vec![
                "pre",
                "target:fmt",
                "Run Diff",
                "target:rdmeInstall",
                "target:rdmeReadme",
                "Run Diff",
                "target:updateDeps",
                "Run Diff",
                "target:gen",
                "Run Diff",
                "target:lint",
                "target:test",
                "post",
            ]
        );
    }

    #[test]
    fn test_empty_mergegate_has_no_stages() {
        assert!(MergegateTargets::default().stages().is_empty());
    }

    async fn run_fmt_mergegate(diff: &str) -> (Result<(), BuildError>, Arc<ScriptedRunner>, LogCapture) {
        let repo = RepoFixture::new();
        let registry = Registry::new();
        register_cargo_targets(
            &registry,
            &CargoTargets {
                fmt: Some(CommandTarget::new(DEFAULT_FMT_TARGET, &["fmt", "--all"])),
                ..CargoTargets::default()
            },
        )
        .expect("register fmt");
        register_mergegate_target(
            &registry,
            &MergegateTargets {
                fmt_target: Some(DEFAULT_FMT_TARGET.to_string()),
                ..MergegateTargets::default()
            },
        )
        .expect("register mergegate");

        let runner = Arc::new(
            ScriptedRunner::new()
                .stdout(repo.root_line())
                .stdout("")
                .stdout(diff),
        );
        let ctx = Context::background().with_runner(runner.clone());
        let capture = LogCapture::new();
        let result = {
            let _guard = capture.install();
            registry.run_target(&ctx, MERGEGATE_TARGET, &[]).await
        };
        (result, runner, capture)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_mergegate_clean_tree_passes() {
        let _cwd = cwd_lock();
        let (result, runner, _capture) = run_fmt_mergegate("").await;

        result.expect("clean tree passes");
        assert_eq!(
            runner.command_lines(),
            vec!["git rev-parse --show-toplevel", "cargo fmt --all", "git diff"]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_mergegate_dirty_tree_fails_with_diff() {
        let _cwd = cwd_lock();
        let diff = "diff --git a/src/lib.rs b/src/lib.rs\n-fn  main() {}\n+fn main() {}\n";
        let (result, _runner, capture) = run_fmt_mergegate(diff).await;

        let err = result.expect_err("dirty tree fails");
        match &err {
            BuildError::TargetFailed { target, stage, .. } => {
                assert_eq!(target, MERGEGATE_TARGET);
                assert_eq!(stage, "Run Diff");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(capture.contains("Fix formatting to get a passing run!"));
        assert!(capture.contains("+fn main() {}"));
        assert!(capture.contains("Run build system with fmt and push any changes"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_update_deps_updates_first_party_and_warns() {
        let _cwd = cwd_lock();
        let repo = RepoFixture::new();
        let registry = Registry::new();
        register_update_deps_target(
            &registry,
            &UpdateDeps {
                first_party_marker: "targetflow".to_string(),
                bs_crate: "targetflow".to_string(),
            },
        )
        .expect("register");

        let tree = "targetflow-bs v0.1.0 (/work/bs)\ntargetflow-core v0.4.1\ntokio v1.40.0\n\ntargetflow v0.1.0 (/work/targetflow)\n";
        let lock_diff = " name = \"targetflow\"\n-version = \"0.1.0\"\n+version = \"0.2.0\"\n";
        let runner = Arc::new(
            ScriptedRunner::new()
                .stdout(repo.root_line())
                .stdout(tree)
                .stdout("")
                .stdout("")
                .stdout(lock_diff),
        );
        let ctx = Context::background().with_runner(runner.clone());
        let fetch_before = std::env::var_os("CARGO_NET_GIT_FETCH_WITH_CLI");
        let capture = LogCapture::new();
        {
            let _guard = capture.install();
            registry
                .run_target(&ctx, UPDATE_DEPS_TARGET, &[])
                .await
                .expect("update succeeds");
        }

        assert_eq!(
            runner.command_lines(),
            vec![
                "git rev-parse --show-toplevel",
                "cargo tree --depth 1 --prefix none",
                "cargo update --package targetflow-core",
                "cargo update",
                "git diff --unified=0 Cargo.lock",
            ]
        );
        assert!(capture.contains("The build system package was upgraded!"));
        assert_eq!(std::env::var_os("CARGO_NET_GIT_FETCH_WITH_CLI"), fetch_before);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_readme_failure_hints_at_install() {
        let _cwd = cwd_lock();
        let repo = RepoFixture::new();
        let registry = Registry::new();
        register_readme_targets(&registry).expect("register");

        let runner = Arc::new(ScriptedRunner::new().stdout(repo.root_line()).exit(101));
        let ctx = Context::background().with_runner(runner);
        let capture = LogCapture::new();
        let result = {
            let _guard = capture.install();
            registry.run_target(&ctx, README_TARGET, &[]).await
        };

        assert!(result.is_err());
        assert!(capture.contains("Consider running build system with rdmeInstall target"));
    }

    #[test]
    fn test_bs_build_target() {
        let registry = Registry::new();
        register_bs_build_target(&registry, "targetflow-bs").expect("register");
        let target = registry.get(BS_BUILD_TARGET).expect("buildbs");
        assert_eq!(names(target.stages()), vec!["cd to repo root", "Run cargo build"]);
        assert!(register_bs_build_target(&registry, "targetflow-bs").is_err());
    }
}
