//! Offline-first sync core: durable mutation queue plus delta-pull engine
//!
//! Packages are created locally with optimistic writes; every state change
//! that must reach the server is recorded as a durable mutation, drained in
//! priority/FIFO order, retried under per-class budgets (network failures are
//! exempt and wait for connectivity), and reconciled against server-side
//! changes pulled since the last checkpoint.

pub mod common;
pub mod config;
pub mod infra;
pub mod repo;
pub mod service;

use std::{path::Path, sync::Arc};

use sea_orm::DatabaseConnection;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use common::errors::{Result, SyncError};
pub use config::CoreConfig;
pub use infra::remote::{
	CreatedPkg, HttpRemoteApi, PulledChanges, RemoteApi, RemoteError, RemotePkg, UploadedImage,
};
pub use service::{
	orchestrator::{PendingCounts, SyncCycleReport, SyncOrchestrator},
	processor::{CreatePkgPayload, UploadImagePayload},
	pull::PullSummary,
	queue::DrainSummary,
};

use repo::{MutationRepository, PkgRepository, SyncMetadataStore};
use service::{
	processor::MutationProcessor, pull::DeltaSync, queue::MutationQueue, retry::RetryPolicy,
};

/// Top-level context wiring the local store, remote API, and sync services
pub struct SyncCore {
	db: DatabaseConnection,
	orchestrator: Arc<SyncOrchestrator>,
}

impl SyncCore {
	/// Open (or create) the local store under `data_dir` and wire the engine
	/// against `remote`
	pub async fn new(
		data_dir: impl AsRef<Path>,
		config: CoreConfig,
		remote: Arc<dyn RemoteApi>,
	) -> Result<Self> {
		tokio::fs::create_dir_all(data_dir.as_ref()).await?;

		let db = infra::db::connect(data_dir.as_ref().join("pkgsync.db")).await?;

		let metadata = SyncMetadataStore::new(db.clone());
		let retry = RetryPolicy::new(metadata.clone());
		let processor = MutationProcessor::new(db.clone(), remote.clone(), retry);
		let queue = MutationQueue::new(
			MutationRepository::new(db.clone()),
			processor,
			config.inter_mutation_pause(),
		);
		let delta = DeltaSync::new(db.clone(), remote, metadata);

		let orchestrator = Arc::new(SyncOrchestrator::new(
			PkgRepository::new(db.clone()),
			MutationRepository::new(db.clone()),
			queue,
			delta,
		));

		Ok(Self { db, orchestrator })
	}

	/// Convenience constructor that talks to the remote API over HTTP per the
	/// configured base URL
	pub async fn new_with_http(data_dir: impl AsRef<Path>, config: CoreConfig) -> Result<Self> {
		let remote = Arc::new(HttpRemoteApi::new(&config)?);
		Self::new(data_dir, config, remote).await
	}

	pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
		&self.orchestrator
	}

	pub fn db(&self) -> &DatabaseConnection {
		&self.db
	}
}

/// Install the default tracing subscriber (env-filtered, stdout).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
	let _ = tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with(fmt::layer())
		.try_init();
}
