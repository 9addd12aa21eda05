//! tandem-utils: Common utilities shared across tandem crates
//!
//! This crate provides:
//! - Unified error types ([`TandemError`], [`Result`])
//! - Logging infrastructure ([`init_logging`], [`LogConfig`])
//! - Process and file identity helpers ([`ident`] module)
//! - XDG-compliant path utilities ([`paths`] module)

pub mod error;
pub mod ident;
pub mod logging;
pub mod paths;

// Re-export main types at crate root for convenience
pub use error::{Result, TandemError};
pub use ident::{FileStat, ProcessIdentity, TtyIdentity};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogOutput};

// Re-export commonly used path functions
pub use paths::{config_dir, config_file, log_dir, state_dir};
