//! Standard exit codes for CLI operations
//!
//! Argument errors are reported by clap with its own exit code.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Invalid input - bad path, content, repository spec or unsupported operation
pub const INPUT_ERROR: i32 = 2;

/// Not found - unknown repository or absent artifact
pub const NOT_FOUND: i32 = 3;

/// Upstream error - a remote repository could not reach its upstream
pub const UPSTREAM_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;
