//! Retry budget resolution
//!
//! Budgets are consulted only for application-level failures; network
//! failures are retried indefinitely without counting (see the processor).
//! Budgets live in `sync_metadata` so the settings UI can change them without
//! restarting the engine.

use tracing::warn;

use crate::{
	common::errors::Result,
	infra::db::entities::mutation::MutationType,
	repo::metadata::{SyncMetadataStore, IMAGE_UPLOAD_MAX_RETRIES, JSON_UPLOAD_MAX_RETRIES},
};

const DEFAULT_MAX_RETRIES: u32 = 3;
const INFINITE: &str = "infinite";

#[derive(Clone)]
pub struct RetryPolicy {
	metadata: SyncMetadataStore,
}

impl RetryPolicy {
	pub fn new(metadata: SyncMetadataStore) -> Self {
		Self { metadata }
	}

	/// Maximum application-failure retries for a mutation class.
	///
	/// `None` means unlimited (stored sentinel `"infinite"`). Missing or
	/// malformed settings fall back to the default of 3.
	pub async fn max_retries(&self, mutation_type: MutationType) -> Result<Option<u32>> {
		let key = match mutation_type {
			MutationType::UploadImage => IMAGE_UPLOAD_MAX_RETRIES,
			// Every other class is a small JSON request
			_ => JSON_UPLOAD_MAX_RETRIES,
		};

		let Some(raw) = self.metadata.get(key).await? else {
			return Ok(Some(DEFAULT_MAX_RETRIES));
		};

		if raw == INFINITE {
			return Ok(None);
		}

		match raw.parse::<u32>() {
			Ok(n) => Ok(Some(n)),
			Err(_) => {
				warn!(key, value = %raw, "Malformed retry budget setting, using default");
				Ok(Some(DEFAULT_MAX_RETRIES))
			}
		}
	}
}
