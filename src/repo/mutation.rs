//! Mutation repository: CRUD over the durable mutation queue

use chrono::Utc;
use sea_orm::{
	ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
	PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::{
	common::errors::Result,
	infra::db::entities::mutation::{self, MutationStatus, MutationType},
};

#[derive(Clone)]
pub struct MutationRepository {
	db: DatabaseConnection,
}

impl MutationRepository {
	pub fn new(db: DatabaseConnection) -> Self {
		Self { db }
	}

	/// Insert a new mutation: status Pending, retry count zero,
	/// client-generated id
	pub async fn create(
		&self,
		mutation_type: MutationType,
		payload: String,
		pkg_id: Option<String>,
	) -> Result<mutation::Model> {
		let model = mutation::ActiveModel {
			id: Set(Uuid::new_v4().to_string()),
			mutation_type: Set(mutation_type),
			payload: Set(payload),
			pkg_id: Set(pkg_id),
			status: Set(MutationStatus::Pending),
			retry_count: Set(0),
			created_at: Set(Utc::now()),
		};

		Ok(model.insert(&self.db).await?)
	}

	pub async fn all(&self) -> Result<Vec<mutation::Model>> {
		Ok(mutation::Entity::find().all(&self.db).await?)
	}

	/// Pending mutations in FIFO order (priority-class ordering is applied by
	/// the scheduler)
	pub async fn pending(&self) -> Result<Vec<mutation::Model>> {
		Ok(mutation::Entity::find()
			.filter(mutation::Column::Status.eq(MutationStatus::Pending))
			.order_by_asc(mutation::Column::CreatedAt)
			.all(&self.db)
			.await?)
	}

	pub async fn pending_count(&self, mutation_type: MutationType) -> Result<u64> {
		Ok(mutation::Entity::find()
			.filter(mutation::Column::Status.eq(MutationStatus::Pending))
			.filter(mutation::Column::MutationType.eq(mutation_type))
			.count(&self.db)
			.await?)
	}

	/// Full replace by id
	pub async fn update(&self, model: mutation::Model) -> Result<mutation::Model> {
		let active = model.into_active_model().reset_all();
		Ok(active.update(&self.db).await?)
	}
}
