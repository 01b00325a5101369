//! Fatal error kinds that map to dedicated exit codes.
//!
//! Everything else travels as a plain `anyhow::Error`; these are attached so
//! `main` can classify a failure with `downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

use crate::exit_codes;

/// The test definition could not be read, parsed or validated.
#[derive(Debug, Error)]
#[error("invalid test definition {}: {message}", path.display())]
pub struct DefinitionError {
    pub path: PathBuf,
    pub message: String,
}

/// The runner configuration file could not be read, parsed or validated.
#[derive(Debug, Error)]
#[error("invalid configuration {}: {message}", path.display())]
pub struct ConfigError {
    pub path: PathBuf,
    pub message: String,
}

/// The node pool could not provide the nodes a repetition needs.
#[derive(Debug, Error)]
#[error("provisioning failed: {message}")]
pub struct ProvisioningError {
    pub message: String,
}

impl ProvisioningError {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self {
            message: format!("{err:#}"),
        }
    }
}

/// Map an error chain to a process exit code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<DefinitionError>().is_some()
        || err.downcast_ref::<ConfigError>().is_some()
    {
        exit_codes::INVALID
    } else if err.downcast_ref::<ProvisioningError>().is_some() {
        exit_codes::PROVISIONING
    } else {
        exit_codes::RUNTIME
    }
}
