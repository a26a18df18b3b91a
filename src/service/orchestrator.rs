//! Sync orchestrator
//!
//! Sequences pull-then-drain (pull first, so mutations are not pushed against
//! package state the pull is about to overwrite) and owns the write and read
//! entrypoints consumed by the UI layer. Cycles are triggered after every
//! local write, on offline-to-online transitions, and optionally on a fixed
//! interval.

use std::{
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	time::Duration,
};

use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::{
	common::errors::Result,
	infra::db::entities::{
		mutation::{self, MutationType},
		pkg,
	},
	repo::{MutationRepository, PkgRepository},
	service::{
		processor::{CreatePkgPayload, UploadImagePayload},
		pull::{DeltaSync, PullSummary},
		queue::{DrainSummary, MutationQueue},
	},
};

/// Aggregated counts for one sync cycle
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncCycleReport {
	pub pull: PullSummary,
	pub drain: DrainSummary,
}

/// Pending mutations partitioned by class, for UI badges
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PendingCounts {
	pub create_pkg: u64,
	pub upload_image: u64,
}

pub struct SyncOrchestrator {
	pkgs: PkgRepository,
	mutations: MutationRepository,
	queue: MutationQueue,
	delta: DeltaSync,
	network_reachable: AtomicBool,
}

impl SyncOrchestrator {
	pub fn new(
		pkgs: PkgRepository,
		mutations: MutationRepository,
		queue: MutationQueue,
		delta: DeltaSync,
	) -> Self {
		Self {
			pkgs,
			mutations,
			queue,
			delta,
			// Assume online until told otherwise
			network_reachable: AtomicBool::new(true),
		}
	}

	/// Pull server changes, then drain the mutation queue
	pub async fn execute_sync_cycle(&self) -> Result<SyncCycleReport> {
		let pull = self.delta.pull().await?;
		let drain = self.queue.drain(self.network_reachable()).await?;

		info!(
			pulled = pull.count,
			processed = drain.processed,
			failed = drain.failed,
			"Sync cycle complete"
		);
		Ok(SyncCycleReport { pull, drain })
	}

	/// Read-only projection over the queue for UI display
	pub async fn pending_counts(&self) -> Result<PendingCounts> {
		Ok(PendingCounts {
			create_pkg: self.mutations.pending_count(MutationType::CreatePkg).await?,
			upload_image: self
				.mutations
				.pending_count(MutationType::UploadImage)
				.await?,
		})
	}

	pub fn network_reachable(&self) -> bool {
		self.network_reachable.load(Ordering::SeqCst)
	}

	/// Record a connectivity transition; coming online kicks off a background
	/// sync cycle
	pub fn set_network_reachable(self: &Arc<Self>, reachable: bool) {
		let was = self.network_reachable.swap(reachable, Ordering::SeqCst);
		if reachable && !was {
			info!("Connectivity restored, triggering sync");
			self.trigger_sync();
		}
	}

	/// Create a package locally (optimistic write) and queue its server
	/// propagation
	pub async fn create_pkg(self: &Arc<Self>) -> Result<pkg::Model> {
		let created = self.pkgs.create().await?;

		let payload = serde_json::to_string(&CreatePkgPayload {
			pkg_id: created.id.clone(),
		})?;
		self.mutations
			.create(MutationType::CreatePkg, payload, Some(created.id.clone()))
			.await?;

		self.trigger_sync();
		Ok(created)
	}

	/// Attach a device-local image to a package (optimistic write) and queue
	/// its upload
	pub async fn attach_image(self: &Arc<Self>, pkg_id: &str, image_uri: &str) -> Result<pkg::Model> {
		let updated = self.pkgs.set_image_url(pkg_id, image_uri).await?;

		let payload = serde_json::to_string(&UploadImagePayload {
			pkg_id: pkg_id.to_string(),
			image_uri: image_uri.to_string(),
		})?;
		self.mutations
			.create(MutationType::UploadImage, payload, Some(pkg_id.to_string()))
			.await?;

		self.trigger_sync();
		Ok(updated)
	}

	/// Full mutation log, newest first (UI log view)
	pub async fn all_mutations(&self) -> Result<Vec<mutation::Model>> {
		let mut all = self.mutations.all().await?;
		all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		Ok(all)
	}

	/// All packages (UI gallery view)
	pub async fn all_pkgs(&self) -> Result<Vec<pkg::Model>> {
		self.pkgs.all().await
	}

	/// Re-run the sync cycle on a fixed interval while the device is reachable
	pub fn spawn_periodic(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
		let orchestrator = self.clone();
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				ticker.tick().await;
				if !orchestrator.network_reachable() {
					continue;
				}
				if let Err(e) = orchestrator.execute_sync_cycle().await {
					error!(error = %e, "Periodic sync cycle failed");
				}
			}
		})
	}

	/// Fire-and-forget sync cycle; the single-flight drain guard makes
	/// overlapping triggers harmless
	fn trigger_sync(self: &Arc<Self>) {
		let orchestrator = self.clone();
		tokio::spawn(async move {
			if let Err(e) = orchestrator.execute_sync_cycle().await {
				error!(error = %e, "Background sync cycle failed");
			}
		});
	}
}
