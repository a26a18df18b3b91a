//! Sync metadata store: string KV pairs with upsert semantics
//!
//! Persists the `last_pulled_at` pull checkpoint (written only by the delta
//! puller) and the per-class retry budget settings (written by the settings
//! UI, read by the retry policy).

use chrono::{DateTime, Utc};
use sea_orm::{sea_query::OnConflict, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tracing::warn;

use crate::{common::errors::Result, infra::db::entities::sync_metadata};

pub const LAST_PULLED_AT: &str = "last_pulled_at";
pub const IMAGE_UPLOAD_MAX_RETRIES: &str = "image_upload_max_retries";
pub const JSON_UPLOAD_MAX_RETRIES: &str = "json_upload_max_retries";

#[derive(Clone)]
pub struct SyncMetadataStore {
	db: DatabaseConnection,
}

impl SyncMetadataStore {
	pub fn new(db: DatabaseConnection) -> Self {
		Self { db }
	}

	pub async fn get(&self, key: &str) -> Result<Option<String>> {
		Ok(sync_metadata::Entity::find()
			.filter(sync_metadata::Column::Key.eq(key))
			.one(&self.db)
			.await?
			.map(|row| row.value))
	}

	/// Insert or replace a key, refreshing its update timestamp
	pub async fn set(&self, key: &str, value: &str) -> Result<()> {
		let active = sync_metadata::ActiveModel {
			key: Set(key.to_string()),
			value: Set(value.to_string()),
			updated_at: Set(Utc::now()),
		};

		sync_metadata::Entity::insert(active)
			.on_conflict(
				OnConflict::column(sync_metadata::Column::Key)
					.update_columns([
						sync_metadata::Column::Value,
						sync_metadata::Column::UpdatedAt,
					])
					.to_owned(),
			)
			.exec(&self.db)
			.await?;

		Ok(())
	}

	/// The last successful pull checkpoint; `None` means "since the beginning
	/// of time" (also the fallback for an unparsable stored value)
	pub async fn last_pulled_at(&self) -> Result<Option<DateTime<Utc>>> {
		let Some(raw) = self.get(LAST_PULLED_AT).await? else {
			return Ok(None);
		};

		match DateTime::parse_from_rfc3339(&raw) {
			Ok(ts) => Ok(Some(ts.with_timezone(&Utc))),
			Err(e) => {
				warn!(value = %raw, error = %e, "Unparsable pull checkpoint, pulling full window");
				Ok(None)
			}
		}
	}

	pub async fn set_last_pulled_at(&self, timestamp: DateTime<Utc>) -> Result<()> {
		self.set(LAST_PULLED_AT, &timestamp.to_rfc3339()).await
	}
}
