//! Package entity
//!
//! Created locally with no image; the id is assigned client-side and never
//! remapped. `image_url` holds a device URI between the optimistic attach and
//! the completed upload, after which the server URL replaces it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pkgs")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub id: String,
	pub image_url: Option<String>,
	pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(has_many = "super::mutation::Entity")]
	Mutations,
}

impl Related<super::mutation::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::Mutations.def()
	}
}

impl ActiveModelBehavior for ActiveModel {}
