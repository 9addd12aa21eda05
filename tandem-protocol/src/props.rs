//! Well-known property names
//!
//! Each attached view publishes under these names on its own window (and
//! its server-assigned frame window). Embedders that must coexist with
//! another instance can override them through configuration.

/// Session-list property: holds exactly one encoded session record, or is
/// absent when no view is registered on the window.
pub const SESSION: &str = "TANDEM_SESSION";

/// Command-channel property: zero or more concatenated message frames,
/// consumed with read-with-delete.
pub const COMMAND: &str = "TANDEM_COMMAND";

/// Hand-off property: a NUL-terminated command line posted by a helper
/// tool during initial peer hand-off, consumed with read-with-delete.
pub const CC_REQUEST: &str = "TANDEM_CC_REQUEST";
