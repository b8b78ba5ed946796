// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! CLI-specific errors with contextual messages and suggestions.

use colored::Colorize;
use thiserror::Error;

use coord_fabric_core::distributed::types::FabricError;

/// CLI-specific errors, each carrying the operator-facing hint printed by
/// [`CliError::print_error`].
#[derive(Debug, Error)]
pub enum CliError {
    /// Worker registration was refused after the retry budget was spent.
    #[error("registration failed: {reason}")]
    RegistrationFailed { reason: String, suggestion: String },

    /// Local capability detection failed.
    #[error("capability detection failed: {reason}")]
    CapabilityDetectionFailed { reason: String, suggestion: String },

    /// Layered configuration failed to load or validate.
    #[error("configuration error: {message}")]
    ConfigurationError { message: String, suggestion: String },

    /// A coordinator query (workers/health/seeds) could not reach its target.
    #[error("coordinator unreachable: {message}")]
    CoordinatorUnreachable { message: String, suggestion: String },

    /// Invalid input to a subcommand.
    #[error("invalid input: {message}")]
    InvalidInput { message: String, suggestion: String },

    /// Any other fabric error surfaced from core, not otherwise classified.
    #[error("unexpected error: {0}")]
    Unexpected(#[from] FabricError),
}

impl CliError {
    #[must_use]
    pub fn registration_failed(reason: &str) -> Self {
        Self::RegistrationFailed {
            reason: reason.to_string(),
            suggestion: "check --coordinator-url and that the coordinator is reachable"
                .to_string(),
        }
    }

    #[must_use]
    pub fn capability_detection_failed(reason: &str) -> Self {
        Self::CapabilityDetectionFailed {
            reason: reason.to_string(),
            suggestion: "this host's CPU/RAM/disk probes failed; check OS permissions"
                .to_string(),
        }
    }

    #[must_use]
    pub fn configuration_error(message: &str) -> Self {
        Self::ConfigurationError {
            message: message.to_string(),
            suggestion: "check your config.toml or COORD_FABRIC_* environment variables"
                .to_string(),
        }
    }

    #[must_use]
    pub fn coordinator_unreachable(message: &str) -> Self {
        Self::CoordinatorUnreachable {
            message: message.to_string(),
            suggestion: "check --coordinator-url and network connectivity".to_string(),
        }
    }

    #[must_use]
    pub fn invalid_input(message: &str, suggestion: &str) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
            suggestion: suggestion.to_string(),
        }
    }

    /// Print the error to stderr, colored, with its suggestion on a second
    /// line.
    pub fn print_error(&self) {
        eprintln!("\n{} {}", "Error:".red().bold(), self);

        match self {
            Self::RegistrationFailed { suggestion, .. }
            | Self::CapabilityDetectionFailed { suggestion, .. }
            | Self::ConfigurationError { suggestion, .. }
            | Self::CoordinatorUnreachable { suggestion, .. }
            | Self::InvalidInput { suggestion, .. } => {
                eprintln!("\n{} {}", "Suggestion:".yellow().bold(), suggestion.yellow());
            }
            Self::Unexpected(_) => {}
        }
    }

    /// Exit code this error maps to, per the worker-agent exit taxonomy.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::RegistrationFailed { .. } => exit_codes::REGISTRATION_FATAL,
            Self::CapabilityDetectionFailed { .. } => exit_codes::CAPABILITY_FATAL,
            Self::Unexpected(_) => exit_codes::UNEXPECTED,
            Self::ConfigurationError { .. }
            | Self::CoordinatorUnreachable { .. }
            | Self::InvalidInput { .. } => exit_codes::ERROR,
        }
    }
}

/// Exit codes. `worker run` follows these exactly (§6); other subcommands
/// only ever return `SUCCESS` or `ERROR`.
pub mod exit_codes {
    /// Normal exit.
    pub const SUCCESS: i32 = 0;
    /// Generic / configuration / connectivity failure.
    pub const ERROR: i32 = 1;
    /// Fatal registration failure (worker agent).
    pub const REGISTRATION_FATAL: i32 = 1;
    /// Fatal capability detection failure (worker agent).
    pub const CAPABILITY_FATAL: i32 = 2;
    /// Unexpected error not covered by the above.
    pub const UNEXPECTED: i32 = 3;
}
