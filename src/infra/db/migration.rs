//! Idempotent schema bootstrap for the local store
//!
//! Three tables, created with `IF NOT EXISTS` DDL so reopening an existing
//! store is a no-op.

use sea_orm::{ConnectionTrait, DbBackend, Statement};

pub async fn init_schema<C: ConnectionTrait>(conn: &C) -> Result<(), sea_orm::DbErr> {
	conn.execute(Statement::from_string(
		DbBackend::Sqlite,
		r#"
		CREATE TABLE IF NOT EXISTS pkgs (
			id TEXT NOT NULL PRIMARY KEY,
			image_url TEXT,
			created_at TEXT NOT NULL
		)
		"#
		.to_string(),
	))
	.await?;

	conn.execute(Statement::from_string(
		DbBackend::Sqlite,
		r#"
		CREATE TABLE IF NOT EXISTS mutations (
			id TEXT NOT NULL PRIMARY KEY,
			mutation_type TEXT NOT NULL,
			payload TEXT NOT NULL,
			pkg_id TEXT,
			status TEXT NOT NULL,
			retry_count INTEGER NOT NULL DEFAULT 0,
			created_at TEXT NOT NULL
		)
		"#
		.to_string(),
	))
	.await?;

	// The drain loop filters on status and orders on created_at every pass
	conn.execute(Statement::from_string(
		DbBackend::Sqlite,
		r#"
		CREATE INDEX IF NOT EXISTS idx_mutations_status_created
		ON mutations(status, created_at)
		"#
		.to_string(),
	))
	.await?;

	conn.execute(Statement::from_string(
		DbBackend::Sqlite,
		r#"
		CREATE TABLE IF NOT EXISTS sync_metadata (
			key TEXT NOT NULL PRIMARY KEY,
			value TEXT NOT NULL,
			updated_at TEXT NOT NULL
		)
		"#
		.to_string(),
	))
	.await?;

	Ok(())
}
