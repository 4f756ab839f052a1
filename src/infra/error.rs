use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to read seed file `{path}`: {source}")]
    SeedRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse seed file `{path}`: {source}")]
    SeedParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn seed_read(path: &Path, source: std::io::Error) -> Self {
        Self::SeedRead {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn seed_parse(path: &Path, source: serde_json::Error) -> Self {
        Self::SeedParse {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
