//! Unified error handling for the sync core

use thiserror::Error;

use crate::infra::remote::RemoteError;

/// Main error type for sync core operations
///
/// Ordinary remote failures never surface here from the processor; it folds
/// them into the mutation's lifecycle state instead. `Storage` is the hard
/// failure class: if the local store is broken no queue progress is possible.
#[derive(Error, Debug)]
pub enum SyncError {
	#[error("Storage error: {0}")]
	Storage(#[from] sea_orm::DbErr),

	#[error("Remote error: {0}")]
	Remote(#[from] RemoteError),

	#[error("Payload error: {0}")]
	Payload(#[from] serde_json::Error),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Other error: {0}")]
	Other(#[from] anyhow::Error),
}

/// Result type alias for sync core operations
pub type Result<T> = std::result::Result<T, SyncError>;
