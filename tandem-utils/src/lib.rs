//! tandem-utils: shared plumbing for the tandem crates
//!
//! Provides the unified error type, tracing-based logging setup, and
//! XDG-compliant path helpers used by both the relay daemon and the client.

pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Result, TandemError};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogOutput};
pub use paths::{
    config_dir, config_file, ensure_all_dirs, ensure_dir, log_dir, pid_file, runtime_dir,
    socket_path, state_dir,
};
