//! Package repository: optimistic local writes and read views

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, Set};
use uuid::Uuid;

use crate::{
	common::errors::{Result, SyncError},
	infra::db::entities::pkg,
};

#[derive(Clone)]
pub struct PkgRepository {
	db: DatabaseConnection,
}

impl PkgRepository {
	pub fn new(db: DatabaseConnection) -> Self {
		Self { db }
	}

	/// Optimistic local create: immediately readable, no image, client-assigned
	/// id. `created_at` is overwritten with the server value once the CreatePkg
	/// mutation completes.
	pub async fn create(&self) -> Result<pkg::Model> {
		let model = pkg::ActiveModel {
			id: Set(Uuid::new_v4().to_string()),
			image_url: Set(None),
			created_at: Set(Utc::now()),
		};

		Ok(model.insert(&self.db).await?)
	}

	pub async fn all(&self) -> Result<Vec<pkg::Model>> {
		Ok(pkg::Entity::find().all(&self.db).await?)
	}

	pub async fn by_id(&self, id: &str) -> Result<Option<pkg::Model>> {
		Ok(pkg::Entity::find_by_id(id.to_owned()).one(&self.db).await?)
	}

	/// Optimistic image attach: stores the device URI until the upload
	/// mutation completes and replaces it with the server URL
	pub async fn set_image_url(&self, pkg_id: &str, image_url: &str) -> Result<pkg::Model> {
		let model = self
			.by_id(pkg_id)
			.await?
			.ok_or_else(|| SyncError::NotFound(format!("pkg {pkg_id}")))?;

		let mut active = model.into_active_model();
		active.image_url = Set(Some(image_url.to_string()));

		Ok(active.update(&self.db).await?)
	}
}
