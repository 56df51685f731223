//! # Exit Code Mapping
//!
//! Maps `Result<(), E>` from a CLI handler to a Unix process exit code.
//! Every handler returns 0 on success and 1 on any recoverable error, per
//! the CLI surface's contract; the distinction between error kinds is
//! carried in the JSON body printed to stderr, not in the exit code.

use serde::Serialize;
use std::fmt::Display;
use std::process::ExitCode as StdExitCode;

/// Process exit codes produced by the orchestrator binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Command completed successfully
    Success,
    /// Command failed with a recoverable error (printed to stderr as JSON)
    Failure,
}

impl From<ExitCode> for StdExitCode {
    fn from(code: ExitCode) -> Self {
        match code {
            ExitCode::Success => StdExitCode::SUCCESS,
            ExitCode::Failure => StdExitCode::FAILURE,
        }
    }
}

/// JSON error envelope printed to stderr on failure
#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error_type: String,
    public_error_message: String,
}

/// Map a `Result` to an exit code, printing a JSON error envelope to
/// stderr when the result is `Err`.
///
/// `E` must expose an `error_type()` and a `Display` impl carrying the
/// public-safe message; `OrchestratorError` satisfies both.
pub fn result_to_exit_code<E>(result: Result<(), E>) -> StdExitCode
where
    E: Display + ErrorKind,
{
    map_error_to_exit_code(result).into()
}

/// Like `result_to_exit_code` but returns the bootstrap-level `ExitCode`
/// instead of `std::process::ExitCode`, for callers that want to inspect
/// the outcome before converting.
pub fn map_error_to_exit_code<E>(result: Result<(), E>) -> ExitCode
where
    E: Display + ErrorKind,
{
    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            let envelope = ErrorEnvelope {
                error_type: e.error_type().to_string(),
                public_error_message: e.to_string(),
            };
            match serde_json::to_string(&envelope) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("{{\"error_type\":\"INTERNAL_ERROR\",\"public_error_message\":\"{e}\"}}"),
            }
            ExitCode::Failure
        }
    }
}

/// Narrow trait so `exit_code` doesn't need a dependency on
/// `orchestrator-domain`'s concrete `OrchestratorError` type.
pub trait ErrorKind {
    fn error_type(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyError(&'static str);

    impl Display for DummyError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl ErrorKind for DummyError {
        fn error_type(&self) -> &'static str {
            "INTERNAL_ERROR"
        }
    }

    #[test]
    fn test_ok_maps_to_success() {
        let result: Result<(), DummyError> = Ok(());
        assert_eq!(map_error_to_exit_code(result), ExitCode::Success);
    }

    #[test]
    fn test_err_maps_to_failure() {
        let result: Result<(), DummyError> = Err(DummyError("boom"));
        assert_eq!(map_error_to_exit_code(result), ExitCode::Failure);
    }
}
