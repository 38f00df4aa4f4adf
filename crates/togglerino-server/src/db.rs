// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database pool construction and embedded schema migrations.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::Result;

const MIGRATIONS: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS projects (
		id TEXT PRIMARY KEY,
		key TEXT NOT NULL UNIQUE,
		name TEXT NOT NULL,
		created_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS environments (
		id TEXT PRIMARY KEY,
		project_id TEXT NOT NULL REFERENCES projects(id),
		key TEXT NOT NULL,
		name TEXT NOT NULL,
		created_at TEXT NOT NULL,
		UNIQUE (project_id, key)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS flags (
		id TEXT PRIMARY KEY,
		project_id TEXT NOT NULL REFERENCES projects(id),
		key TEXT NOT NULL,
		name TEXT NOT NULL,
		description TEXT,
		value_type TEXT NOT NULL,
		flag_type TEXT NOT NULL,
		default_value TEXT NOT NULL,
		tags TEXT NOT NULL DEFAULT '[]',
		lifecycle_status TEXT NOT NULL DEFAULT 'active',
		lifecycle_status_changed_at TEXT,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		UNIQUE (project_id, key)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS flag_environment_configs (
		flag_id TEXT NOT NULL REFERENCES flags(id),
		environment_id TEXT NOT NULL REFERENCES environments(id),
		enabled INTEGER NOT NULL DEFAULT 0,
		default_variant TEXT NOT NULL DEFAULT '',
		variants TEXT NOT NULL DEFAULT '[]',
		targeting_rules TEXT NOT NULL DEFAULT '[]',
		updated_at TEXT NOT NULL,
		PRIMARY KEY (flag_id, environment_id)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS sdk_keys (
		id TEXT PRIMARY KEY,
		project_id TEXT NOT NULL REFERENCES projects(id),
		environment_id TEXT NOT NULL REFERENCES environments(id),
		name TEXT NOT NULL,
		key_hash TEXT NOT NULL UNIQUE,
		revoked_at TEXT,
		created_at TEXT NOT NULL,
		last_used_at TEXT
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS project_settings (
		project_id TEXT PRIMARY KEY REFERENCES projects(id),
		flag_lifetimes TEXT NOT NULL DEFAULT '{}'
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS unknown_flags (
		id TEXT PRIMARY KEY,
		project_id TEXT NOT NULL,
		environment_id TEXT NOT NULL,
		flag_key TEXT NOT NULL,
		request_count INTEGER NOT NULL DEFAULT 0,
		first_seen_at TEXT NOT NULL,
		last_seen_at TEXT NOT NULL,
		UNIQUE (project_id, environment_id, flag_key)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS context_attributes (
		id TEXT PRIMARY KEY,
		project_id TEXT NOT NULL,
		name TEXT NOT NULL,
		first_seen_at TEXT NOT NULL,
		last_seen_at TEXT NOT NULL,
		UNIQUE (project_id, name)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS audit_log (
		id TEXT PRIMARY KEY,
		event_type TEXT NOT NULL,
		entity_type TEXT NOT NULL,
		entity_id TEXT,
		details TEXT NOT NULL DEFAULT '{}',
		created_at TEXT NOT NULL
	)
	"#,
];

/// Create the sqlite connection pool, creating the database file when it
/// does not exist yet.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url)?
		.create_if_missing(true)
		.foreign_keys(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(5)
		.connect_with(options)
		.await?;

	Ok(pool)
}

/// Apply the embedded schema. Statements are idempotent so this runs on
/// every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	for statement in MIGRATIONS {
		sqlx::query(statement).execute(pool).await?;
	}
	info!(statements = MIGRATIONS.len(), "database schema up to date");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_create_pool_creates_database_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("togglerino.db");
		let url = format!("sqlite://{}", path.display());

		let pool = create_pool(&url).await.unwrap();
		run_migrations(&pool).await.unwrap();
		assert!(path.exists());
	}

	#[tokio::test]
	async fn test_migrations_are_idempotent() {
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.connect("sqlite::memory:")
			.await
			.unwrap();

		run_migrations(&pool).await.unwrap();
		run_migrations(&pool).await.unwrap();

		let count: (i64,) =
			sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
				.fetch_one(&pool)
				.await
				.unwrap();
		assert!(count.0 >= 9);
	}
}
