//! The build system for this repository.
//!
//! ```text
//! cargo run -p targetflow-bs -- mergegate
//! ```

use std::process::ExitCode;
use targetflow::prelude::*;
use targetflow::targets::{DEFAULT_FMT_TARGET, DEFAULT_LINT_TARGET, DEFAULT_TEST_TARGET};

#[tokio::main]
async fn main() -> ExitCode {
    run_main("bs", |registry| {
        register_bs_build_target(registry, "targetflow-bs")?;
        register_update_deps_target(
            registry,
            &UpdateDeps {
                first_party_marker: "targetflow".to_string(),
                bs_crate: "targetflow".to_string(),
            },
        )?;
        register_readme_targets(registry)?;
        register_cargo_targets(registry, &CargoTargets::all())?;
        register_mergegate_target(
            registry,
            &MergegateTargets {
                fmt_target: Some(DEFAULT_FMT_TARGET.to_string()),
                lint_target: Some(DEFAULT_LINT_TARGET.to_string()),
                test_target: Some(DEFAULT_TEST_TARGET.to_string()),
                ..MergegateTargets::default()
            },
        )
    })
    .await
}
