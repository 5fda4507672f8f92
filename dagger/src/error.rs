//! Errors raised at the operator boundary, before any backend runs

use thiserror::Error;

/// A required field is missing or unusable; the action is not attempted
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Please enter {0}.")]
    Missing(&'static str),
    #[error("Please enter a valid numeric port (1-65535), got '{0}'.")]
    InvalidPort(String),
    #[error("Please enter a valid URL: {0}")]
    InvalidUrl(String),
    #[error("Unknown command '{0}'. Type 'help' for the list of commands.")]
    UnknownCommand(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
}
