//! End-to-end tests for the mutation queue and delta-sync engine, driven by a
//! scripted remote API double.

use std::{
	sync::{Arc, Mutex},
	time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tempfile::TempDir;
use uuid::Uuid;

use pkgsync_core::{
	infra::db::entities::{
		mutation::{self, MutationStatus, MutationType},
		pkg,
	},
	repo::{MutationRepository, PkgRepository, SyncMetadataStore},
	service::{
		orchestrator::SyncOrchestrator,
		processor::MutationProcessor,
		pull::DeltaSync,
		queue::{DrainSummary, MutationQueue},
		retry::RetryPolicy,
	},
	CreatePkgPayload, CreatedPkg, PulledChanges, RemoteApi, RemoteError, RemotePkg,
	UploadImagePayload, UploadedImage,
};

#[derive(Clone, Copy, PartialEq)]
enum Mode {
	Succeed,
	NetworkFail,
	AppFail,
}

/// Scripted remote: each endpoint's behaviour is switchable mid-test, every
/// call is recorded in order.
struct ScriptedRemote {
	create_mode: Mutex<Mode>,
	upload_mode: Mutex<Mode>,
	pull_mode: Mutex<Mode>,
	pull_pkgs: Mutex<Vec<RemotePkg>>,
	pull_timestamp: Mutex<DateTime<Utc>>,
	latency: Duration,
	calls: Mutex<Vec<String>>,
}

impl ScriptedRemote {
	fn new() -> Self {
		Self {
			create_mode: Mutex::new(Mode::Succeed),
			upload_mode: Mutex::new(Mode::Succeed),
			pull_mode: Mutex::new(Mode::Succeed),
			pull_pkgs: Mutex::new(Vec::new()),
			pull_timestamp: Mutex::new(Utc::now()),
			latency: Duration::ZERO,
			calls: Mutex::new(Vec::new()),
		}
	}

	fn with_latency(latency: Duration) -> Self {
		Self {
			latency,
			..Self::new()
		}
	}

	fn set_create_mode(&self, mode: Mode) {
		*self.create_mode.lock().unwrap() = mode;
	}

	fn set_upload_mode(&self, mode: Mode) {
		*self.upload_mode.lock().unwrap() = mode;
	}

	fn set_pull_mode(&self, mode: Mode) {
		*self.pull_mode.lock().unwrap() = mode;
	}

	fn set_pull_window(&self, pkgs: Vec<RemotePkg>, timestamp: DateTime<Utc>) {
		*self.pull_pkgs.lock().unwrap() = pkgs;
		*self.pull_timestamp.lock().unwrap() = timestamp;
	}

	fn calls(&self) -> Vec<String> {
		self.calls.lock().unwrap().clone()
	}

	fn calls_matching(&self, prefix: &str) -> usize {
		self.calls()
			.iter()
			.filter(|c| c.starts_with(prefix))
			.count()
	}

	fn server_created_at() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap()
	}

	fn fail(mode: Mode) -> Option<RemoteError> {
		match mode {
			Mode::Succeed => None,
			Mode::NetworkFail => Some(RemoteError::Network("connection refused".to_string())),
			Mode::AppFail => Some(RemoteError::Application("rejected by server".to_string())),
		}
	}
}

#[async_trait::async_trait]
impl RemoteApi for ScriptedRemote {
	async fn create_pkg(&self, pkg_id: &str) -> Result<CreatedPkg, RemoteError> {
		tokio::time::sleep(self.latency).await;
		self.calls.lock().unwrap().push(format!("create:{pkg_id}"));

		if let Some(err) = Self::fail(*self.create_mode.lock().unwrap()) {
			return Err(err);
		}
		Ok(CreatedPkg {
			id: pkg_id.to_string(),
			created_at: Self::server_created_at(),
		})
	}

	async fn upload_image(
		&self,
		pkg_id: &str,
		_image_uri: &str,
	) -> Result<UploadedImage, RemoteError> {
		tokio::time::sleep(self.latency).await;
		self.calls.lock().unwrap().push(format!("upload:{pkg_id}"));

		if let Some(err) = Self::fail(*self.upload_mode.lock().unwrap()) {
			return Err(err);
		}
		Ok(UploadedImage {
			url: format!("https://cdn.example.com/u/{pkg_id}.jpg"),
			filename: format!("{pkg_id}.jpg"),
		})
	}

	async fn sync_pull(
		&self,
		_last_pulled_at: Option<DateTime<Utc>>,
	) -> Result<PulledChanges, RemoteError> {
		tokio::time::sleep(self.latency).await;
		self.calls.lock().unwrap().push("pull".to_string());

		if let Some(err) = Self::fail(*self.pull_mode.lock().unwrap()) {
			return Err(err);
		}
		Ok(PulledChanges {
			pkgs: self.pull_pkgs.lock().unwrap().clone(),
			timestamp: *self.pull_timestamp.lock().unwrap(),
		})
	}
}

struct TestEngine {
	_temp: TempDir,
	db: DatabaseConnection,
	remote: Arc<ScriptedRemote>,
	pkgs: PkgRepository,
	mutations: MutationRepository,
	metadata: SyncMetadataStore,
	queue: Arc<MutationQueue>,
}

impl TestEngine {
	async fn new() -> Self {
		Self::with_remote(Arc::new(ScriptedRemote::new())).await
	}

	async fn with_remote(remote: Arc<ScriptedRemote>) -> Self {
		let temp = TempDir::new().unwrap();
		let db = pkgsync_core::infra::db::connect(temp.path().join("engine.db"))
			.await
			.unwrap();

		let metadata = SyncMetadataStore::new(db.clone());
		let retry = RetryPolicy::new(metadata.clone());
		let processor = MutationProcessor::new(db.clone(), remote.clone(), retry);
		let queue = Arc::new(MutationQueue::new(
			MutationRepository::new(db.clone()),
			processor,
			Duration::ZERO,
		));

		Self {
			_temp: temp,
			pkgs: PkgRepository::new(db.clone()),
			mutations: MutationRepository::new(db.clone()),
			metadata,
			queue,
			db,
			remote,
		}
	}

	fn delta(&self) -> DeltaSync {
		DeltaSync::new(
			self.db.clone(),
			self.remote.clone(),
			self.metadata.clone(),
		)
	}

	fn orchestrator(&self) -> Arc<SyncOrchestrator> {
		let retry = RetryPolicy::new(self.metadata.clone());
		let processor = MutationProcessor::new(self.db.clone(), self.remote.clone(), retry);
		let queue = MutationQueue::new(
			MutationRepository::new(self.db.clone()),
			processor,
			Duration::ZERO,
		);
		Arc::new(SyncOrchestrator::new(
			self.pkgs.clone(),
			self.mutations.clone(),
			queue,
			self.delta(),
		))
	}

	async fn seed_pkg(&self, id: &str) -> pkg::Model {
		pkg::ActiveModel {
			id: Set(id.to_string()),
			image_url: Set(None),
			created_at: Set(Utc::now()),
		}
		.insert(&self.db)
		.await
		.unwrap()
	}

	async fn seed_mutation(
		&self,
		mutation_type: MutationType,
		pkg_id: &str,
		created_at: DateTime<Utc>,
	) -> mutation::Model {
		let payload = match mutation_type {
			MutationType::CreatePkg => serde_json::to_string(&CreatePkgPayload {
				pkg_id: pkg_id.to_string(),
			})
			.unwrap(),
			MutationType::UploadImage => serde_json::to_string(&UploadImagePayload {
				pkg_id: pkg_id.to_string(),
				image_uri: format!("file:///local/{pkg_id}.jpg"),
			})
			.unwrap(),
		};

		mutation::ActiveModel {
			id: Set(Uuid::new_v4().to_string()),
			mutation_type: Set(mutation_type),
			payload: Set(payload),
			pkg_id: Set(Some(pkg_id.to_string())),
			status: Set(MutationStatus::Pending),
			retry_count: Set(0),
			created_at: Set(created_at),
		}
		.insert(&self.db)
		.await
		.unwrap()
	}

	async fn mutation_by_id(&self, id: &str) -> mutation::Model {
		mutation::Entity::find_by_id(id.to_string())
			.one(&self.db)
			.await
			.unwrap()
			.unwrap()
	}

	async fn pkg_by_id(&self, id: &str) -> pkg::Model {
		pkg::Entity::find_by_id(id.to_string())
			.one(&self.db)
			.await
			.unwrap()
			.unwrap()
	}
}

#[tokio::test]
async fn drain_completes_mutations_and_applies_server_fields() {
	let engine = TestEngine::new().await;
	let now = Utc::now();

	engine.seed_pkg("p1").await;
	engine.seed_pkg("p2").await;
	let create = engine
		.seed_mutation(MutationType::CreatePkg, "p1", now)
		.await;
	let upload = engine
		.seed_mutation(MutationType::UploadImage, "p2", now)
		.await;

	let summary = engine.queue.drain(true).await.unwrap();
	assert_eq!(
		summary,
		DrainSummary {
			processed: 2,
			failed: 0
		}
	);

	let create = engine.mutation_by_id(&create.id).await;
	assert_eq!(create.status, MutationStatus::Completed);
	let upload = engine.mutation_by_id(&upload.id).await;
	assert_eq!(upload.status, MutationStatus::Completed);

	// Server is authoritative for creation time and the durable image URL
	let p1 = engine.pkg_by_id("p1").await;
	assert_eq!(p1.created_at, ScriptedRemote::server_created_at());
	let p2 = engine.pkg_by_id("p2").await;
	assert_eq!(
		p2.image_url.as_deref(),
		Some("https://cdn.example.com/u/p2.jpg")
	);
}

#[tokio::test]
async fn metadata_mutations_drain_before_image_uploads() {
	let engine = TestEngine::new().await;
	let base = Utc::now() - chrono::Duration::minutes(10);

	// Uploads are created first, so FIFO alone would put them in front;
	// class priority must still win
	for (i, id) in ["u1", "u2"].iter().enumerate() {
		engine.seed_pkg(id).await;
		engine
			.seed_mutation(
				MutationType::UploadImage,
				id,
				base + chrono::Duration::seconds(i as i64),
			)
			.await;
	}
	for (i, id) in ["c1", "c2"].iter().enumerate() {
		engine.seed_pkg(id).await;
		engine
			.seed_mutation(
				MutationType::CreatePkg,
				id,
				base + chrono::Duration::seconds(100 + i as i64),
			)
			.await;
	}

	let summary = engine.queue.drain(true).await.unwrap();
	assert_eq!(summary.processed, 4);

	let calls = engine.remote.calls();
	assert_eq!(calls, vec!["create:c1", "create:c2", "upload:u1", "upload:u2"]);
}

#[tokio::test]
async fn application_failures_exhaust_the_retry_budget() {
	let engine = TestEngine::new().await;
	engine
		.metadata
		.set("json_upload_max_retries", "2")
		.await
		.unwrap();
	engine.remote.set_create_mode(Mode::AppFail);

	engine.seed_pkg("p1").await;
	let seeded = engine
		.seed_mutation(MutationType::CreatePkg, "p1", Utc::now())
		.await;

	// Two failing drains: still pending, counting up
	for expected_count in [1, 2] {
		let summary = engine.queue.drain(true).await.unwrap();
		assert_eq!(summary.processed, 0);
		let m = engine.mutation_by_id(&seeded.id).await;
		assert_eq!(m.status, MutationStatus::Pending);
		assert_eq!(m.retry_count, expected_count);
	}

	// Third failure exceeds the budget of 2: terminal
	engine.queue.drain(true).await.unwrap();
	let m = engine.mutation_by_id(&seeded.id).await;
	assert_eq!(m.status, MutationStatus::Failed);
	assert_eq!(m.retry_count, 3);

	// Failed is terminal: further drains never pick it up again
	engine.queue.drain(true).await.unwrap();
	assert_eq!(engine.remote.calls_matching("create:"), 3);
}

#[tokio::test]
async fn network_failures_never_burn_budget() {
	let engine = TestEngine::new().await;
	engine.remote.set_create_mode(Mode::NetworkFail);

	engine.seed_pkg("p1").await;
	let seeded = engine
		.seed_mutation(MutationType::CreatePkg, "p1", Utc::now())
		.await;

	for _ in 0..5 {
		let summary = engine.queue.drain(true).await.unwrap();
		assert_eq!(summary.processed, 0);

		let m = engine.mutation_by_id(&seeded.id).await;
		assert_eq!(m.status, MutationStatus::Pending);
		assert_eq!(m.retry_count, 0);
	}
}

#[tokio::test]
async fn offline_flag_counts_as_network_failure() {
	let engine = TestEngine::new().await;
	// Even an application-level rejection does not burn budget while the
	// caller says the device is offline
	engine.remote.set_create_mode(Mode::AppFail);

	engine.seed_pkg("p1").await;
	let seeded = engine
		.seed_mutation(MutationType::CreatePkg, "p1", Utc::now())
		.await;

	engine.queue.drain(false).await.unwrap();

	let m = engine.mutation_by_id(&seeded.id).await;
	assert_eq!(m.status, MutationStatus::Pending);
	assert_eq!(m.retry_count, 0);
}

#[tokio::test]
async fn no_progress_pass_stops_draining() {
	let engine = TestEngine::new().await;
	engine
		.metadata
		.set("json_upload_max_retries", "infinite")
		.await
		.unwrap();
	engine.remote.set_create_mode(Mode::AppFail);

	engine.seed_pkg("p1").await;
	let seeded = engine
		.seed_mutation(MutationType::CreatePkg, "p1", Utc::now())
		.await;

	// One drain invocation must make exactly one attempt and stop, even
	// though the mutation is still pending afterwards
	let summary = engine.queue.drain(true).await.unwrap();
	assert_eq!(
		summary,
		DrainSummary {
			processed: 0,
			failed: 1
		}
	);
	assert_eq!(engine.remote.calls_matching("create:"), 1);

	let m = engine.mutation_by_id(&seeded.id).await;
	assert_eq!(m.status, MutationStatus::Pending);
}

#[tokio::test]
async fn concurrent_drains_are_single_flight() {
	let remote = Arc::new(ScriptedRemote::with_latency(Duration::from_millis(20)));
	let engine = TestEngine::with_remote(remote).await;

	engine.seed_pkg("p1").await;
	engine
		.seed_mutation(MutationType::CreatePkg, "p1", Utc::now())
		.await;

	let (a, b) = tokio::join!(engine.queue.drain(true), engine.queue.drain(true));
	let (a, b) = (a.unwrap(), b.unwrap());

	// Exactly one call got to do the work; the other bailed with zero counts
	assert_eq!(a.processed + b.processed, 1);
	assert!(a == DrainSummary::default() || b == DrainSummary::default());
	assert_eq!(engine.remote.calls_matching("create:"), 1);
}

#[tokio::test]
async fn pull_merges_server_wins_and_inserts_fresh() {
	let engine = TestEngine::new().await;

	// Local pkg still carries its optimistic device URI
	engine.seed_pkg("p1").await;
	engine
		.pkgs
		.set_image_url("p1", "file:///local/p1.jpg")
		.await
		.unwrap();

	let server_ts = ScriptedRemote::server_created_at();
	engine.remote.set_pull_window(
		vec![
			RemotePkg {
				id: "p1".to_string(),
				image_url: Some("https://cdn.example.com/u/p1.jpg".to_string()),
				created_at: server_ts,
			},
			RemotePkg {
				id: "p2".to_string(),
				image_url: None,
				created_at: server_ts,
			},
		],
		server_ts,
	);

	let summary = engine.delta().pull().await.unwrap();
	assert!(summary.success);
	assert_eq!(summary.count, 2);

	let p1 = engine.pkg_by_id("p1").await;
	assert_eq!(
		p1.image_url.as_deref(),
		Some("https://cdn.example.com/u/p1.jpg")
	);
	assert_eq!(p1.created_at, server_ts);

	let p2 = engine.pkg_by_id("p2").await;
	assert_eq!(p2.image_url, None);

	// Checkpoint advanced to the server cursor, not the local clock
	assert_eq!(engine.metadata.last_pulled_at().await.unwrap(), Some(server_ts));
}

#[tokio::test]
async fn pull_twice_is_idempotent_and_checkpoint_monotonic() {
	let engine = TestEngine::new().await;

	let ts1 = ScriptedRemote::server_created_at();
	let window = vec![RemotePkg {
		id: "p1".to_string(),
		image_url: Some("https://cdn.example.com/u/p1.jpg".to_string()),
		created_at: ts1,
	}];

	engine.remote.set_pull_window(window.clone(), ts1);
	engine.delta().pull().await.unwrap();
	let first_checkpoint = engine.metadata.last_pulled_at().await.unwrap().unwrap();
	let first_pkgs = engine.pkgs.all().await.unwrap();

	// Same server window, later cursor
	let ts2 = ts1 + chrono::Duration::seconds(30);
	engine.remote.set_pull_window(window, ts2);
	engine.delta().pull().await.unwrap();
	let second_checkpoint = engine.metadata.last_pulled_at().await.unwrap().unwrap();
	let second_pkgs = engine.pkgs.all().await.unwrap();

	assert_eq!(first_pkgs, second_pkgs);
	assert!(second_checkpoint >= first_checkpoint);
}

#[tokio::test]
async fn pull_failure_keeps_checkpoint() {
	let engine = TestEngine::new().await;

	let ts = ScriptedRemote::server_created_at();
	engine.remote.set_pull_window(Vec::new(), ts);
	engine.delta().pull().await.unwrap();
	assert_eq!(engine.metadata.last_pulled_at().await.unwrap(), Some(ts));

	engine.remote.set_pull_mode(Mode::NetworkFail);
	let summary = engine.delta().pull().await.unwrap();
	assert!(!summary.success);
	assert_eq!(summary.count, 0);

	// Next pull retries the same window
	assert_eq!(engine.metadata.last_pulled_at().await.unwrap(), Some(ts));
}

#[tokio::test]
async fn sync_cycle_runs_pull_then_drain_and_reports_counts() {
	let engine = TestEngine::new().await;
	let orchestrator = engine.orchestrator();

	engine.seed_pkg("p1").await;
	engine.seed_pkg("p2").await;
	engine
		.seed_mutation(MutationType::CreatePkg, "p1", Utc::now())
		.await;
	engine
		.seed_mutation(MutationType::UploadImage, "p2", Utc::now())
		.await;

	// Everything stuck behind a dead network: both stay pending
	engine.remote.set_create_mode(Mode::NetworkFail);
	engine.remote.set_upload_mode(Mode::NetworkFail);
	let report = orchestrator.execute_sync_cycle().await.unwrap();
	assert_eq!(report.drain.processed, 0);

	let counts = orchestrator.pending_counts().await.unwrap();
	assert_eq!(counts.create_pkg, 1);
	assert_eq!(counts.upload_image, 1);

	// Network back: the next cycle drains everything
	engine.remote.set_create_mode(Mode::Succeed);
	engine.remote.set_upload_mode(Mode::Succeed);
	let report = orchestrator.execute_sync_cycle().await.unwrap();
	assert_eq!(report.drain.processed, 2);
	assert_eq!(report.drain.failed, 0);

	let counts = orchestrator.pending_counts().await.unwrap();
	assert_eq!(counts.create_pkg, 0);
	assert_eq!(counts.upload_image, 0);

	// Pull ran before the drain within each cycle
	let calls = engine.remote.calls();
	assert_eq!(calls.first().map(String::as_str), Some("pull"));
}

#[tokio::test]
async fn write_entrypoints_queue_mutations_and_sync() {
	let engine = TestEngine::new().await;
	let orchestrator = engine.orchestrator();

	let created = orchestrator.create_pkg().await.unwrap();
	let attached = orchestrator
		.attach_image(&created.id, "file:///local/shot.jpg")
		.await
		.unwrap();

	// Optimistic write is immediately readable with the device URI
	assert_eq!(attached.image_url.as_deref(), Some("file:///local/shot.jpg"));

	// The entrypoints also fire background cycles; poll until the queue is
	// empty so we assert on the settled state whichever cycle won
	let mut counts = orchestrator.pending_counts().await.unwrap();
	for _ in 0..50 {
		if counts.create_pkg == 0 && counts.upload_image == 0 {
			break;
		}
		orchestrator.execute_sync_cycle().await.unwrap();
		tokio::time::sleep(Duration::from_millis(10)).await;
		counts = orchestrator.pending_counts().await.unwrap();
	}
	assert_eq!(counts.create_pkg, 0);
	assert_eq!(counts.upload_image, 0);

	let expected_url = format!("https://cdn.example.com/u/{}.jpg", created.id);
	let pkg = engine.pkg_by_id(&created.id).await;
	assert_eq!(pkg.image_url.as_deref(), Some(expected_url.as_str()));
	assert_eq!(pkg.created_at, ScriptedRemote::server_created_at());

	for m in orchestrator.all_mutations().await.unwrap() {
		assert_eq!(m.status, MutationStatus::Completed);
	}
}
