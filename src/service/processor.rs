//! Mutation processor: executes one mutation against the remote API and
//! persists the resulting lifecycle transition.
//!
//! Failure rules: connectivity failures (or a caller-declared offline device)
//! put the mutation back to Pending without touching its retry count — it
//! must survive until connectivity returns. Application failures increment
//! the count and, once the class budget is exceeded, park the mutation in the
//! terminal Failed state. Only storage failures propagate as errors.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
	ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, Set, TransactionError,
	TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
	common::errors::{Result, SyncError},
	infra::{
		db::entities::{
			mutation::{self, MutationStatus, MutationType},
			pkg,
		},
		remote::{RemoteApi, RemoteError},
	},
	service::retry::RetryPolicy,
};

/// Typed payload of a `CreatePkg` mutation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreatePkgPayload {
	pub pkg_id: String,
}

/// Typed payload of an `UploadImage` mutation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadImagePayload {
	pub pkg_id: String,
	pub image_uri: String,
}

/// Package field to overwrite with the server-authoritative value on success
enum PkgUpdate {
	CreatedAt(DateTime<Utc>),
	ImageUrl(String),
}

enum Outcome {
	Accepted { pkg_id: String, update: PkgUpdate },
	Rejected(RemoteError),
}

pub struct MutationProcessor {
	db: DatabaseConnection,
	remote: Arc<dyn RemoteApi>,
	retry: RetryPolicy,
}

impl MutationProcessor {
	pub fn new(db: DatabaseConnection, remote: Arc<dyn RemoteApi>, retry: RetryPolicy) -> Self {
		Self { db, remote, retry }
	}

	/// Execute one mutation and persist its transition, returning the updated
	/// record.
	pub async fn process(
		&self,
		mutation: mutation::Model,
		network_reachable: bool,
	) -> Result<mutation::Model> {
		match self.execute_remote(&mutation).await {
			Outcome::Accepted { pkg_id, update } => self.commit_success(mutation, pkg_id, update).await,
			Outcome::Rejected(err) => self.commit_failure(mutation, err, network_reachable).await,
		}
	}

	/// Decode the payload for the mutation's type and dispatch the remote call.
	///
	/// An undecodable payload can never succeed, so it is folded into the
	/// application failure class rather than retried forever.
	async fn execute_remote(&self, mutation: &mutation::Model) -> Outcome {
		match mutation.mutation_type {
			MutationType::CreatePkg => {
				let payload: CreatePkgPayload = match serde_json::from_str(&mutation.payload) {
					Ok(payload) => payload,
					Err(e) => {
						return Outcome::Rejected(RemoteError::Application(format!(
							"undecodable create_pkg payload: {e}"
						)))
					}
				};

				match self.remote.create_pkg(&payload.pkg_id).await {
					Ok(created) => Outcome::Accepted {
						pkg_id: payload.pkg_id,
						// Server clock is authoritative for creation time
						update: PkgUpdate::CreatedAt(created.created_at),
					},
					Err(e) => Outcome::Rejected(e),
				}
			}
			MutationType::UploadImage => {
				let payload: UploadImagePayload = match serde_json::from_str(&mutation.payload) {
					Ok(payload) => payload,
					Err(e) => {
						return Outcome::Rejected(RemoteError::Application(format!(
							"undecodable upload_image payload: {e}"
						)))
					}
				};

				match self
					.remote
					.upload_image(&payload.pkg_id, &payload.image_uri)
					.await
				{
					Ok(uploaded) => Outcome::Accepted {
						pkg_id: payload.pkg_id,
						// The local device URI becomes a durable shareable URL
						update: PkgUpdate::ImageUrl(uploaded.url),
					},
					Err(e) => Outcome::Rejected(e),
				}
			}
		}
	}

	/// Persist Completed together with the dependent package write in one
	/// transaction, so a crash cannot record the status without the package
	/// field (or vice versa).
	async fn commit_success(
		&self,
		mutation: mutation::Model,
		pkg_id: String,
		update: PkgUpdate,
	) -> Result<mutation::Model> {
		let mut updated = mutation;
		updated.status = MutationStatus::Completed;

		let to_store = updated.clone();
		self.db
			.transaction::<_, (), sea_orm::DbErr>(move |txn| {
				Box::pin(async move {
					to_store.into_active_model().reset_all().update(txn).await?;

					match pkg::Entity::find_by_id(pkg_id.clone()).one(txn).await? {
						Some(model) => {
							let mut active = model.into_active_model();
							match update {
								PkgUpdate::CreatedAt(ts) => active.created_at = Set(ts),
								PkgUpdate::ImageUrl(url) => active.image_url = Set(Some(url)),
							}
							active.update(txn).await?;
						}
						None => {
							// Should not happen: a pending mutation's package
							// must exist locally
							warn!(pkg_id = %pkg_id, "Completed mutation references missing pkg");
						}
					}

					Ok(())
				})
			})
			.await
			.map_err(flatten_txn_err)?;

		debug!(
			mutation_id = %updated.id,
			mutation_type = %updated.mutation_type,
			"Mutation completed"
		);
		Ok(updated)
	}

	async fn commit_failure(
		&self,
		mutation: mutation::Model,
		err: RemoteError,
		network_reachable: bool,
	) -> Result<mutation::Model> {
		let mut updated = mutation;

		if err.is_network() || !network_reachable {
			// Connectivity failure: requeue without burning budget; the
			// mutation waits for the network, however long that takes
			debug!(
				mutation_id = %updated.id,
				error = %err,
				"Network failure, mutation stays queued"
			);
			updated.status = MutationStatus::Pending;
			return self.persist(updated).await;
		}

		updated.retry_count += 1;
		let budget = self.retry.max_retries(updated.mutation_type).await?;

		match budget {
			Some(max) if updated.retry_count as u32 > max => {
				warn!(
					mutation_id = %updated.id,
					retry_count = updated.retry_count,
					max_retries = max,
					error = %err,
					"Retry budget exhausted, mutation failed"
				);
				updated.status = MutationStatus::Failed;
			}
			_ => {
				debug!(
					mutation_id = %updated.id,
					retry_count = updated.retry_count,
					error = %err,
					"Application failure, queued for retry"
				);
				updated.status = MutationStatus::Pending;
			}
		}

		self.persist(updated).await
	}

	async fn persist(&self, model: mutation::Model) -> Result<mutation::Model> {
		model
			.clone()
			.into_active_model()
			.reset_all()
			.update(&self.db)
			.await?;
		Ok(model)
	}
}

fn flatten_txn_err(err: TransactionError<sea_orm::DbErr>) -> SyncError {
	match err {
		TransactionError::Connection(e) => SyncError::Storage(e),
		TransactionError::Transaction(e) => SyncError::Storage(e),
	}
}
