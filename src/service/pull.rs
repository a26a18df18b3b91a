//! Delta sync puller: checkpointed pull of server-side package changes
//!
//! Packages merged from the server always win over local state; the
//! checkpoint advances to the server-returned cursor (never the local clock)
//! so clock skew cannot open gaps between pulls.

use std::sync::Arc;

use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, Set};
use tracing::{debug, warn};

use crate::{
	common::errors::Result,
	infra::{
		db::entities::pkg,
		remote::{RemoteApi, RemotePkg},
	},
	repo::SyncMetadataStore,
};

/// Result of one pull attempt
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PullSummary {
	pub success: bool,
	pub count: usize,
}

pub struct DeltaSync {
	db: DatabaseConnection,
	remote: Arc<dyn RemoteApi>,
	metadata: SyncMetadataStore,
}

impl DeltaSync {
	pub fn new(
		db: DatabaseConnection,
		remote: Arc<dyn RemoteApi>,
		metadata: SyncMetadataStore,
	) -> Self {
		Self {
			db,
			remote,
			metadata,
		}
	}

	/// Pull changes since the stored checkpoint and merge them.
	///
	/// Remote failures yield `success: false` with the checkpoint untouched,
	/// so the next pull retries the same window. Only storage failures are
	/// `Err`.
	pub async fn pull(&self) -> Result<PullSummary> {
		let since = self.metadata.last_pulled_at().await?;

		let changes = match self.remote.sync_pull(since).await {
			Ok(changes) => changes,
			Err(e) => {
				warn!(error = %e, "Delta pull failed, keeping checkpoint");
				return Ok(PullSummary {
					success: false,
					count: 0,
				});
			}
		};

		let count = changes.pkgs.len();
		for remote_pkg in changes.pkgs {
			self.merge_pkg(remote_pkg).await?;
		}

		self.metadata.set_last_pulled_at(changes.timestamp).await?;

		debug!(count, checkpoint = %changes.timestamp, "Delta pull merged");
		Ok(PullSummary {
			success: true,
			count,
		})
	}

	async fn merge_pkg(&self, remote_pkg: RemotePkg) -> Result<()> {
		match pkg::Entity::find_by_id(remote_pkg.id.clone())
			.one(&self.db)
			.await?
		{
			Some(existing) => {
				let mut active = existing.into_active_model();
				active.image_url = Set(remote_pkg.image_url);
				active.created_at = Set(remote_pkg.created_at);
				active.update(&self.db).await?;
			}
			None => {
				pkg::ActiveModel {
					id: Set(remote_pkg.id),
					image_url: Set(remote_pkg.image_url),
					created_at: Set(remote_pkg.created_at),
				}
				.insert(&self.db)
				.await?;
			}
		}

		Ok(())
	}
}
