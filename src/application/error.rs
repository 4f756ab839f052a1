use std::error::Error as StdError;

use thiserror::Error;

use crate::{config::LoadError, domain::error::CacheError, infra::error::InfraError};

/// Error chain flattened for reporting at the process boundary.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::NotFound(_) => 2,
            AppError::Config(_) | AppError::Cache(CacheError::InvalidItemKind(_)) => 64,
            AppError::Infra(InfraError::SeedRead { .. } | InfraError::Io(_)) => 66,
            AppError::Infra(InfraError::SeedParse { .. }) => 65,
            AppError::Cache(_) | AppError::Infra(InfraError::Telemetry(_)) => 70,
            AppError::Unexpected(_) => 1,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}
