//! Mutation entity and lifecycle enums
//!
//! A mutation is the durable record of one state change awaiting propagation
//! to the server. `payload` is an opaque JSON string, immutable after insert,
//! decoded into a typed payload at the processor boundary.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "mutations")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub id: String,
	pub mutation_type: MutationType,
	pub payload: String,
	pub pkg_id: Option<String>,
	pub status: MutationStatus,
	pub retry_count: i32,
	pub created_at: DateTimeUtc,
}

/// Mutation classes, which double as priority classes in the queue:
/// everything that is not an image upload drains first.
#[derive(
	Clone,
	Copy,
	Debug,
	PartialEq,
	Eq,
	EnumIter,
	DeriveActiveEnum,
	Serialize,
	Deserialize,
	strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MutationType {
	#[sea_orm(string_value = "create_pkg")]
	CreatePkg,
	#[sea_orm(string_value = "upload_image")]
	UploadImage,
}

/// Mutation lifecycle
///
/// `Pending` rows are eligible for the next drain pass. `Failed` is terminal:
/// the scheduler never picks a failed mutation up again.
#[derive(
	Clone,
	Copy,
	Debug,
	PartialEq,
	Eq,
	EnumIter,
	DeriveActiveEnum,
	Serialize,
	Deserialize,
	strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MutationStatus {
	#[sea_orm(string_value = "pending")]
	Pending,
	#[sea_orm(string_value = "processing")]
	Processing,
	#[sea_orm(string_value = "completed")]
	Completed,
	#[sea_orm(string_value = "failed")]
	Failed,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "super::pkg::Entity",
		from = "Column::PkgId",
		to = "super::pkg::Column::Id"
	)]
	Pkg,
}

impl Related<super::pkg::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::Pkg.def()
	}
}

impl ActiveModelBehavior for ActiveModel {}
