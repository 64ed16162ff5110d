//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

#![allow(dead_code)]

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - cluster configuration rejected before anything ran
pub const VALIDATION_ERROR: i32 = 2;

/// Not found - no provider knows the cluster
pub const NOT_FOUND: i32 = 3;

/// Provider error - the backend tool failed or is missing
pub const PROVIDER_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;

/// Interrupted by Ctrl-C (128 + SIGINT)
pub const CANCELLED: i32 = 130;
