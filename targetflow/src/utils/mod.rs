//! Small helpers shared by stages: logged filesystem access, temporary
//! environment overrides, timestamps and timers.

pub mod env;
pub mod fs;
pub mod timestamps;
mod timer;

pub use env::{tmp_env_var_set, EnvVarGuard};
pub use timer::SpanTimer;
pub use timestamps::{iso_timestamp, now_utc, Timestamp};
