//! Exit codes for the mfp CLI.
//!
//! Exit codes communicate operation outcome without requiring output parsing.

use mfp_common::Error;

/// Exit codes for mfp operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Clean = 0,

    /// Configuration error
    ConfigError = 10,

    /// Missing or malformed input data
    DataError = 11,

    /// Processing error (filtering, re-indexing)
    ProcessingError = 12,

    /// I/O error
    IoError = 13,

    /// Query error (unknown benchmark, config or fidelity)
    QueryError = 14,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean)
    }

    /// Check if this exit code indicates an error requiring attention.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Exit code for an error, chosen by its code group.
    pub fn for_error(err: &Error) -> Self {
        match err.code() {
            10..=19 => ExitCode::ConfigError,
            20..=29 => ExitCode::DataError,
            30..=39 => ExitCode::ProcessingError,
            40..=49 => ExitCode::QueryError,
            50..=59 | 60..=69 => ExitCode::IoError,
            _ => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        ExitCode::for_error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_groups_map_to_exit_codes() {
        assert_eq!(ExitCode::for_error(&Error::Config("x".into())), ExitCode::ConfigError);
        assert_eq!(
            ExitCode::for_error(&Error::ArchiveNotFound {
                path: PathBuf::from("x")
            }),
            ExitCode::DataError
        );
        assert_eq!(
            ExitCode::for_error(&Error::EmptyFilterResult {
                dataset: "d".into()
            }),
            ExitCode::ProcessingError
        );
        assert_eq!(
            ExitCode::for_error(&Error::ConfigNotFound("c".into())),
            ExitCode::QueryError
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(ExitCode::for_error(&Error::Io(io)), ExitCode::IoError);
    }

    #[test]
    fn test_success_and_error_classes() {
        assert!(ExitCode::Clean.is_success());
        assert!(!ExitCode::Clean.is_error());
        assert!(ExitCode::QueryError.is_error());
        assert_eq!(i32::from(ExitCode::InternalError), 99);
    }
}
