//! Mutation queue scheduler
//!
//! Drains pending mutations to a fixed point under a process-wide
//! single-flight guard. Metadata mutations go ahead of image uploads so a
//! slow or failure-prone upload cannot starve them; within each class the
//! order is FIFO by creation time.

use std::{
	sync::atomic::{AtomicBool, Ordering},
	time::Duration,
};

use tracing::{debug, info};

use crate::{
	common::errors::Result,
	infra::db::entities::mutation::{MutationStatus, MutationType},
	repo::MutationRepository,
	service::processor::MutationProcessor,
};

/// Counts for one `drain` invocation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainSummary {
	pub processed: usize,
	pub failed: usize,
}

pub struct MutationQueue {
	repo: MutationRepository,
	processor: MutationProcessor,
	pause: Duration,
	is_draining: AtomicBool,
}

impl MutationQueue {
	pub fn new(repo: MutationRepository, processor: MutationProcessor, pause: Duration) -> Self {
		Self {
			repo,
			processor,
			pause,
			is_draining: AtomicBool::new(false),
		}
	}

	/// Drain pending mutations to a fixed point.
	///
	/// A drain already in flight makes this call return zero counts
	/// immediately; the caller relies on the next trigger instead of queueing
	/// behind the active pass.
	pub async fn drain(&self, network_reachable: bool) -> Result<DrainSummary> {
		if self
			.is_draining
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			debug!("Drain already in flight, skipping");
			return Ok(DrainSummary::default());
		}

		let result = self.drain_inner(network_reachable).await;
		self.is_draining.store(false, Ordering::SeqCst);
		result
	}

	async fn drain_inner(&self, network_reachable: bool) -> Result<DrainSummary> {
		let mut summary = DrainSummary::default();

		loop {
			let mut batch = self.repo.pending().await?;
			if batch.is_empty() {
				break;
			}

			// Priority class first (non-uploads before uploads), FIFO within
			batch.sort_by_key(|m| (m.mutation_type == MutationType::UploadImage, m.created_at));

			let mut processed = 0usize;
			let mut failed = 0usize;

			for item in batch {
				let updated = self.processor.process(item, network_reachable).await?;

				if updated.status == MutationStatus::Completed {
					processed += 1;
				} else {
					failed += 1;
				}

				// Pace requests so a long queue does not hammer the server
				tokio::time::sleep(self.pause).await;
			}

			summary.processed += processed;
			summary.failed += failed;

			if processed == 0 {
				// Everything left is stuck (erroring or offline); stop instead
				// of spinning on the same batch until the next trigger
				break;
			}

			// A pass made progress: newly created or requeued mutations may be
			// pending now, so go around again
		}

		info!(
			processed = summary.processed,
			failed = summary.failed,
			"Drain pass complete"
		);
		Ok(summary)
	}
}
