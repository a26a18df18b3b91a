//! Sync metadata entity: generic string key/value pairs
//!
//! Holds the `last_pulled_at` pull checkpoint and the per-class retry budget
//! settings written by the settings UI.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_metadata")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub key: String,
	pub value: String,
	pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
