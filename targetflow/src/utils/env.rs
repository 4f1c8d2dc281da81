//! Temporary environment variable overrides.

use crate::logging;
use std::ffi::OsString;

/// Restores an environment variable when reset or dropped.
///
/// Returned by [`tmp_env_var_set`]. If the variable did not exist before the
/// override it is removed again instead of restored.
#[derive(Debug)]
#[must_use = "dropping the guard immediately restores the variable"]
pub struct EnvVarGuard {
    name: String,
    previous: Option<OsString>,
    restored: bool,
}

impl EnvVarGuard {
    /// Restores the variable now instead of on drop.
    pub fn reset(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;

        match &self.previous {
            Some(value) => {
                logging::quiet_info(format!(
                    "Restoring '{}' env var to '{}'",
                    self.name,
                    value.to_string_lossy()
                ));
                std::env::set_var(&self.name, value);
            }
            None => {
                logging::quiet_info(format!(
                    "Deleting '{}' env var since it did not exist before",
                    self.name
                ));
                std::env::remove_var(&self.name);
            }
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Sets `name` to `value` until the returned guard is reset or dropped.
///
/// Environment variables are process-wide, so the override is visible to
/// every child process launched while the guard lives.
pub fn tmp_env_var_set(name: impl Into<String>, value: impl AsRef<str>) -> EnvVarGuard {
    let name = name.into();
    let value = value.as_ref();
    let previous = std::env::var_os(&name);

    logging::quiet_info(format!("Temporarily setting '{name}' env var to '{value}'"));
    std::env::set_var(&name, value);

    EnvVarGuard {
        name,
        previous,
        restored: false,
    }
}
