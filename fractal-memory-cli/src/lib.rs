//! Operational CLI for the hierarchical memory core (§6.5): `migrate`,
//! `smoke-test`, `reset`, `inspect`, plus a `serve` entry point for the
//! chat HTTP surface.

pub mod commands;
pub mod config;
pub mod stores;

/// Exit codes (§6.5): success, validation failure, dependency unavailable,
/// internal error.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_VALIDATION: i32 = 1;
pub const EXIT_DEPENDENCY_UNAVAILABLE: i32 = 2;
pub const EXIT_INTERNAL: i32 = 3;

/// Maps a core error onto §6.5's three failure exit codes.
#[must_use]
pub fn exit_code_for(err: &fractal_memory_core::error::Error) -> i32 {
    use fractal_memory_core::error::Error;
    match err {
        Error::Validation(_) => EXIT_VALIDATION,
        Error::StoreUnavailable(_) | Error::RetrieverUnavailable(_) | Error::Io(_) => EXIT_DEPENDENCY_UNAVAILABLE,
        Error::IntegrityError(_) | Error::Cancelled | Error::NotFound(_) | Error::Serialization(_) => EXIT_INTERNAL,
    }
}
