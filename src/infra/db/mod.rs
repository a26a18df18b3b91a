//! Local store: sqlite connection plus schema bootstrap

pub mod entities;
pub mod migration;

use std::path::Path;

use sea_orm::{Database, DatabaseConnection};
use tracing::debug;

/// Open (or create) the sync database at `db_path` and bootstrap the schema
pub async fn connect(db_path: impl AsRef<Path>) -> Result<DatabaseConnection, sea_orm::DbErr> {
	let database_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display());
	debug!(url = %database_url, "Opening sync database");

	let conn = Database::connect(&database_url).await?;
	migration::init_schema(&conn).await?;

	Ok(conn)
}
