// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable-store access for the core runtime.
//!
//! The [`FlagsRepository`] trait is the contract the runtime consumes; the
//! management API writes through the same trait and then invokes the cache
//! refresh and hub broadcast hooks. [`SqliteFlagsRepository`] is the sqlite
//! implementation used by the server binary and the test suite.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use togglerino_core::{
	Environment, EnvironmentId, Flag, FlagEnvironmentConfig, FlagId, FlagValue, LifecycleStatus,
	LifetimePolicy, Project, ProjectId, Scope, SdkKeyId, TargetingRule, ValueType, Variant,
};

use crate::error::{Result, ServerError};

/// An SDK key row as stored: the raw key never touches the database, only
/// its SHA-256 digest.
#[derive(Debug, Clone)]
pub struct SdkKeyRecord {
	pub id: SdkKeyId,
	pub project_id: ProjectId,
	pub environment_id: EnvironmentId,
	pub name: String,
	pub key_hash: String,
	pub revoked_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub last_used_at: Option<DateTime<Utc>>,
}

/// The single (project, environment) scope an SDK key resolves to.
#[derive(Debug, Clone)]
pub struct SdkKeyScope {
	pub sdk_key_id: SdkKeyId,
	pub project_id: ProjectId,
	pub project_key: String,
	pub environment_id: EnvironmentId,
	pub env_key: String,
	pub revoked: bool,
}

/// A request for a flag key that does not exist in the scope.
#[derive(Debug, Clone)]
pub struct UnknownFlag {
	pub project_id: ProjectId,
	pub environment_id: EnvironmentId,
	pub flag_key: String,
	pub request_count: i64,
	pub first_seen_at: DateTime<Utc>,
	pub last_seen_at: DateTime<Utc>,
}

/// Repository trait for flag storage operations.
#[async_trait]
pub trait FlagsRepository: Send + Sync {
	// Project and environment operations
	async fn create_project(&self, project: &Project) -> Result<()>;
	async fn get_project_by_key(&self, key: &str) -> Result<Option<Project>>;
	async fn create_environment(&self, environment: &Environment) -> Result<()>;

	// Flag operations
	async fn create_flag(&self, flag: &Flag) -> Result<()>;
	async fn update_flag(&self, flag: &Flag) -> Result<()>;
	async fn get_flag_by_key(&self, project_id: ProjectId, key: &str) -> Result<Option<Flag>>;
	async fn list_non_archived(&self) -> Result<Vec<Flag>>;

	/// Set a flag's lifecycle status and return the updated row with its
	/// refreshed `lifecycle_status_changed_at`.
	async fn set_lifecycle_status(&self, id: FlagId, status: LifecycleStatus) -> Result<Flag>;

	// Per-environment config operations
	async fn upsert_flag_config(&self, config: &FlagEnvironmentConfig) -> Result<()>;

	/// All (flag, config) pairs for one scope, for cache refresh.
	async fn list_by_project_environment(
		&self,
		project_key: &str,
		env_key: &str,
	) -> Result<Vec<(Flag, FlagEnvironmentConfig)>>;

	/// Every configured (scope, flag, config) triple, for startup cache load.
	async fn list_all(&self) -> Result<Vec<(Scope, Flag, FlagEnvironmentConfig)>>;

	// SDK key operations
	async fn create_sdk_key(&self, record: &SdkKeyRecord) -> Result<()>;
	async fn find_sdk_key(&self, key_hash: &str) -> Result<Option<SdkKeyScope>>;
	async fn revoke_sdk_key(&self, id: SdkKeyId) -> Result<bool>;
	async fn touch_sdk_key(&self, id: SdkKeyId) -> Result<()>;

	// Per-project lifetime policies
	async fn set_project_lifetimes(
		&self,
		project_id: ProjectId,
		policy: &LifetimePolicy,
	) -> Result<()>;
	async fn project_lifetimes(&self) -> Result<HashMap<ProjectId, LifetimePolicy>>;

	// Best-effort tracking
	async fn record_unknown_flag(
		&self,
		project_id: ProjectId,
		environment_id: EnvironmentId,
		flag_key: &str,
	) -> Result<()>;
	async fn get_unknown_flag(
		&self,
		project_id: ProjectId,
		environment_id: EnvironmentId,
		flag_key: &str,
	) -> Result<Option<UnknownFlag>>;
	async fn record_context_attributes(
		&self,
		project_id: ProjectId,
		names: &[String],
	) -> Result<()>;
	async fn list_context_attributes(&self, project_id: ProjectId) -> Result<Vec<String>>;
}

/// SQLite implementation of the flags repository.
#[derive(Clone)]
pub struct SqliteFlagsRepository {
	pool: SqlitePool,
}

impl SqliteFlagsRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|_| ServerError::Internal(format!("invalid timestamp in database: {value}")))
}

fn parse_opt_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
	value.as_deref().map(parse_timestamp).transpose()
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
	id: String,
	key: String,
	name: String,
	created_at: String,
}

impl TryFrom<ProjectRow> for Project {
	type Error = ServerError;

	fn try_from(row: ProjectRow) -> Result<Project> {
		Ok(Project {
			id: row
				.id
				.parse()
				.map_err(|_| ServerError::Internal("invalid project id in database".to_string()))?,
			key: row.key,
			name: row.name,
			created_at: parse_timestamp(&row.created_at)?,
		})
	}
}

#[derive(sqlx::FromRow)]
struct FlagRow {
	id: String,
	project_id: String,
	key: String,
	name: String,
	description: Option<String>,
	value_type: String,
	flag_type: String,
	default_value: String,
	tags: String,
	lifecycle_status: String,
	lifecycle_status_changed_at: Option<String>,
	created_at: String,
	updated_at: String,
}

impl TryFrom<FlagRow> for Flag {
	type Error = ServerError;

	fn try_from(row: FlagRow) -> Result<Flag> {
		Ok(Flag {
			id: row
				.id
				.parse()
				.map_err(|_| ServerError::Internal("invalid flag id in database".to_string()))?,
			project_id: row
				.project_id
				.parse()
				.map_err(|_| ServerError::Internal("invalid project id in database".to_string()))?,
			key: row.key,
			name: row.name,
			description: row.description,
			value_type: row.value_type.parse::<ValueType>()?,
			flag_type: row.flag_type.parse()?,
			default_value: serde_json::from_str::<FlagValue>(&row.default_value)?,
			tags: serde_json::from_str(&row.tags)?,
			lifecycle_status: row.lifecycle_status.parse()?,
			lifecycle_status_changed_at: parse_opt_timestamp(row.lifecycle_status_changed_at)?,
			created_at: parse_timestamp(&row.created_at)?,
			updated_at: parse_timestamp(&row.updated_at)?,
		})
	}
}

/// A flag joined with its environment config and the scope keys.
#[derive(sqlx::FromRow)]
struct EntryRow {
	project_key: String,
	env_key: String,
	id: String,
	project_id: String,
	key: String,
	name: String,
	description: Option<String>,
	value_type: String,
	flag_type: String,
	default_value: String,
	tags: String,
	lifecycle_status: String,
	lifecycle_status_changed_at: Option<String>,
	created_at: String,
	updated_at: String,
	environment_id: String,
	enabled: bool,
	default_variant: String,
	variants: String,
	targeting_rules: String,
}

impl EntryRow {
	fn into_parts(self) -> Result<(Scope, Flag, FlagEnvironmentConfig)> {
		let scope = Scope::new(self.project_key.clone(), self.env_key.clone());

		let environment_id: EnvironmentId = self.environment_id.parse().map_err(|_| {
			ServerError::Internal("invalid environment id in database".to_string())
		})?;
		let variants: Vec<Variant> = serde_json::from_str(&self.variants)?;
		let targeting_rules: Vec<TargetingRule> = serde_json::from_str(&self.targeting_rules)?;

		let flag: Flag = FlagRow {
			id: self.id,
			project_id: self.project_id,
			key: self.key,
			name: self.name,
			description: self.description,
			value_type: self.value_type,
			flag_type: self.flag_type,
			default_value: self.default_value,
			tags: self.tags,
			lifecycle_status: self.lifecycle_status,
			lifecycle_status_changed_at: self.lifecycle_status_changed_at,
			created_at: self.created_at,
			updated_at: self.updated_at,
		}
		.try_into()?;

		let config = FlagEnvironmentConfig {
			flag_id: flag.id,
			environment_id,
			enabled: self.enabled,
			default_variant: self.default_variant,
			variants,
			targeting_rules,
		};

		Ok((scope, flag, config))
	}
}

const ENTRY_SELECT: &str = r#"
	SELECT p.key AS project_key, e.key AS env_key,
		   f.id, f.project_id, f.key, f.name, f.description, f.value_type,
		   f.flag_type, f.default_value, f.tags, f.lifecycle_status,
		   f.lifecycle_status_changed_at, f.created_at, f.updated_at,
		   c.environment_id, c.enabled, c.default_variant, c.variants,
		   c.targeting_rules
	FROM flag_environment_configs c
	JOIN flags f ON f.id = c.flag_id
	JOIN environments e ON e.id = c.environment_id
	JOIN projects p ON p.id = f.project_id
"#;

#[async_trait]
impl FlagsRepository for SqliteFlagsRepository {
	// Project and environment operations

	#[instrument(skip(self, project), fields(project_key = %project.key))]
	async fn create_project(&self, project: &Project) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO projects (id, key, name, created_at)
			VALUES (?, ?, ?, ?)
			"#,
		)
		.bind(project.id.to_string())
		.bind(&project.key)
		.bind(&project.name)
		.bind(project.created_at.to_rfc3339())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip(self))]
	async fn get_project_by_key(&self, key: &str) -> Result<Option<Project>> {
		let row = sqlx::query_as::<_, ProjectRow>(
			r#"
			SELECT id, key, name, created_at
			FROM projects
			WHERE key = ?
			"#,
		)
		.bind(key)
		.fetch_optional(&self.pool)
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[instrument(skip(self, environment), fields(env_key = %environment.key))]
	async fn create_environment(&self, environment: &Environment) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO environments (id, project_id, key, name, created_at)
			VALUES (?, ?, ?, ?, ?)
			"#,
		)
		.bind(environment.id.to_string())
		.bind(environment.project_id.to_string())
		.bind(&environment.key)
		.bind(&environment.name)
		.bind(environment.created_at.to_rfc3339())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	// Flag operations

	#[instrument(skip(self, flag), fields(flag_key = %flag.key))]
	async fn create_flag(&self, flag: &Flag) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO flags (id, project_id, key, name, description, value_type,
							   flag_type, default_value, tags, lifecycle_status,
							   lifecycle_status_changed_at, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(flag.id.to_string())
		.bind(flag.project_id.to_string())
		.bind(&flag.key)
		.bind(&flag.name)
		.bind(&flag.description)
		.bind(flag.value_type.as_str())
		.bind(flag.flag_type.as_str())
		.bind(serde_json::to_string(&flag.default_value)?)
		.bind(serde_json::to_string(&flag.tags)?)
		.bind(flag.lifecycle_status.as_str())
		.bind(flag.lifecycle_status_changed_at.map(|dt| dt.to_rfc3339()))
		.bind(flag.created_at.to_rfc3339())
		.bind(flag.updated_at.to_rfc3339())
		.execute(&self.pool)
		.await?;

		// A flag creation resolves any pending unknown-flag records for the key.
		sqlx::query("DELETE FROM unknown_flags WHERE project_id = ? AND flag_key = ?")
			.bind(flag.project_id.to_string())
			.bind(&flag.key)
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	#[instrument(skip(self, flag), fields(flag_key = %flag.key))]
	async fn update_flag(&self, flag: &Flag) -> Result<()> {
		sqlx::query(
			r#"
			UPDATE flags
			SET name = ?, description = ?, value_type = ?, flag_type = ?,
				default_value = ?, tags = ?, lifecycle_status = ?,
				lifecycle_status_changed_at = ?, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(&flag.name)
		.bind(&flag.description)
		.bind(flag.value_type.as_str())
		.bind(flag.flag_type.as_str())
		.bind(serde_json::to_string(&flag.default_value)?)
		.bind(serde_json::to_string(&flag.tags)?)
		.bind(flag.lifecycle_status.as_str())
		.bind(flag.lifecycle_status_changed_at.map(|dt| dt.to_rfc3339()))
		.bind(Utc::now().to_rfc3339())
		.bind(flag.id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip(self), fields(flag_key = %key))]
	async fn get_flag_by_key(&self, project_id: ProjectId, key: &str) -> Result<Option<Flag>> {
		let row = sqlx::query_as::<_, FlagRow>(
			r#"
			SELECT id, project_id, key, name, description, value_type, flag_type,
				   default_value, tags, lifecycle_status, lifecycle_status_changed_at,
				   created_at, updated_at
			FROM flags
			WHERE project_id = ? AND key = ?
			"#,
		)
		.bind(project_id.to_string())
		.bind(key)
		.fetch_optional(&self.pool)
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[instrument(skip(self))]
	async fn list_non_archived(&self) -> Result<Vec<Flag>> {
		let rows = sqlx::query_as::<_, FlagRow>(
			r#"
			SELECT id, project_id, key, name, description, value_type, flag_type,
				   default_value, tags, lifecycle_status, lifecycle_status_changed_at,
				   created_at, updated_at
			FROM flags
			WHERE lifecycle_status != 'archived'
			ORDER BY key ASC
			"#,
		)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}

	#[instrument(skip(self), fields(flag_id = %id, status = %status))]
	async fn set_lifecycle_status(&self, id: FlagId, status: LifecycleStatus) -> Result<Flag> {
		let now = Utc::now();
		let result = sqlx::query(
			r#"
			UPDATE flags
			SET lifecycle_status = ?, lifecycle_status_changed_at = ?, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(status.as_str())
		.bind(now.to_rfc3339())
		.bind(now.to_rfc3339())
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(ServerError::NotFound(format!("flag {id}")));
		}

		let row = sqlx::query_as::<_, FlagRow>(
			r#"
			SELECT id, project_id, key, name, description, value_type, flag_type,
				   default_value, tags, lifecycle_status, lifecycle_status_changed_at,
				   created_at, updated_at
			FROM flags
			WHERE id = ?
			"#,
		)
		.bind(id.to_string())
		.fetch_one(&self.pool)
		.await?;

		row.try_into()
	}

	// Per-environment config operations

	#[instrument(skip(self, config), fields(flag_id = %config.flag_id))]
	async fn upsert_flag_config(&self, config: &FlagEnvironmentConfig) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO flag_environment_configs
				(flag_id, environment_id, enabled, default_variant, variants,
				 targeting_rules, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT (flag_id, environment_id)
			DO UPDATE SET enabled = excluded.enabled,
						  default_variant = excluded.default_variant,
						  variants = excluded.variants,
						  targeting_rules = excluded.targeting_rules,
						  updated_at = excluded.updated_at
			"#,
		)
		.bind(config.flag_id.to_string())
		.bind(config.environment_id.to_string())
		.bind(config.enabled)
		.bind(&config.default_variant)
		.bind(serde_json::to_string(&config.variants)?)
		.bind(serde_json::to_string(&config.targeting_rules)?)
		.bind(Utc::now().to_rfc3339())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip(self))]
	async fn list_by_project_environment(
		&self,
		project_key: &str,
		env_key: &str,
	) -> Result<Vec<(Flag, FlagEnvironmentConfig)>> {
		let query = format!("{ENTRY_SELECT} WHERE p.key = ? AND e.key = ? ORDER BY f.key ASC");
		let rows = sqlx::query_as::<_, EntryRow>(&query)
			.bind(project_key)
			.bind(env_key)
			.fetch_all(&self.pool)
			.await?;

		rows
			.into_iter()
			.map(|row| row.into_parts().map(|(_, flag, config)| (flag, config)))
			.collect()
	}

	#[instrument(skip(self))]
	async fn list_all(&self) -> Result<Vec<(Scope, Flag, FlagEnvironmentConfig)>> {
		let query = format!("{ENTRY_SELECT} ORDER BY p.key ASC, e.key ASC, f.key ASC");
		let rows = sqlx::query_as::<_, EntryRow>(&query)
			.fetch_all(&self.pool)
			.await?;

		rows.into_iter().map(EntryRow::into_parts).collect()
	}

	// SDK key operations

	#[instrument(skip(self, record), fields(sdk_key_id = %record.id))]
	async fn create_sdk_key(&self, record: &SdkKeyRecord) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO sdk_keys (id, project_id, environment_id, name, key_hash,
								  revoked_at, created_at, last_used_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(record.id.to_string())
		.bind(record.project_id.to_string())
		.bind(record.environment_id.to_string())
		.bind(&record.name)
		.bind(&record.key_hash)
		.bind(record.revoked_at.map(|dt| dt.to_rfc3339()))
		.bind(record.created_at.to_rfc3339())
		.bind(record.last_used_at.map(|dt| dt.to_rfc3339()))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip_all)]
	async fn find_sdk_key(&self, key_hash: &str) -> Result<Option<SdkKeyScope>> {
		#[derive(sqlx::FromRow)]
		struct KeyRow {
			id: String,
			project_id: String,
			project_key: String,
			environment_id: String,
			env_key: String,
			revoked_at: Option<String>,
		}

		let row = sqlx::query_as::<_, KeyRow>(
			r#"
			SELECT k.id, k.project_id, p.key AS project_key,
				   k.environment_id, e.key AS env_key, k.revoked_at
			FROM sdk_keys k
			JOIN projects p ON p.id = k.project_id
			JOIN environments e ON e.id = k.environment_id
			WHERE k.key_hash = ?
			"#,
		)
		.bind(key_hash)
		.fetch_optional(&self.pool)
		.await?;

		let Some(row) = row else {
			return Ok(None);
		};

		Ok(Some(SdkKeyScope {
			sdk_key_id: row
				.id
				.parse()
				.map_err(|_| ServerError::Internal("invalid sdk key id in database".to_string()))?,
			project_id: row
				.project_id
				.parse()
				.map_err(|_| ServerError::Internal("invalid project id in database".to_string()))?,
			project_key: row.project_key,
			environment_id: row.environment_id.parse().map_err(|_| {
				ServerError::Internal("invalid environment id in database".to_string())
			})?,
			env_key: row.env_key,
			revoked: row.revoked_at.is_some(),
		}))
	}

	#[instrument(skip(self), fields(sdk_key_id = %id))]
	async fn revoke_sdk_key(&self, id: SdkKeyId) -> Result<bool> {
		let result = sqlx::query(
			"UPDATE sdk_keys SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL",
		)
		.bind(Utc::now().to_rfc3339())
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[instrument(skip(self), fields(sdk_key_id = %id))]
	async fn touch_sdk_key(&self, id: SdkKeyId) -> Result<()> {
		sqlx::query("UPDATE sdk_keys SET last_used_at = ? WHERE id = ?")
			.bind(Utc::now().to_rfc3339())
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	// Per-project lifetime policies

	#[instrument(skip(self, policy), fields(project_id = %project_id))]
	async fn set_project_lifetimes(
		&self,
		project_id: ProjectId,
		policy: &LifetimePolicy,
	) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO project_settings (project_id, flag_lifetimes)
			VALUES (?, ?)
			ON CONFLICT (project_id)
			DO UPDATE SET flag_lifetimes = excluded.flag_lifetimes
			"#,
		)
		.bind(project_id.to_string())
		.bind(serde_json::to_string(policy)?)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip(self))]
	async fn project_lifetimes(&self) -> Result<HashMap<ProjectId, LifetimePolicy>> {
		let rows = sqlx::query_as::<_, (String, String)>(
			"SELECT project_id, flag_lifetimes FROM project_settings",
		)
		.fetch_all(&self.pool)
		.await?;

		let mut policies = HashMap::with_capacity(rows.len());
		for (project_id, lifetimes) in rows {
			let project_id: ProjectId = project_id
				.parse()
				.map_err(|_| ServerError::Internal("invalid project id in database".to_string()))?;
			policies.insert(project_id, serde_json::from_str(&lifetimes)?);
		}

		Ok(policies)
	}

	// Best-effort tracking

	#[instrument(skip(self), fields(flag_key = %flag_key))]
	async fn record_unknown_flag(
		&self,
		project_id: ProjectId,
		environment_id: EnvironmentId,
		flag_key: &str,
	) -> Result<()> {
		let now = Utc::now().to_rfc3339();
		sqlx::query(
			r#"
			INSERT INTO unknown_flags
				(id, project_id, environment_id, flag_key, request_count,
				 first_seen_at, last_seen_at)
			VALUES (?, ?, ?, ?, 1, ?, ?)
			ON CONFLICT (project_id, environment_id, flag_key)
			DO UPDATE SET request_count = request_count + 1,
						  last_seen_at = excluded.last_seen_at
			"#,
		)
		.bind(uuid::Uuid::new_v4().to_string())
		.bind(project_id.to_string())
		.bind(environment_id.to_string())
		.bind(flag_key)
		.bind(&now)
		.bind(&now)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip(self), fields(flag_key = %flag_key))]
	async fn get_unknown_flag(
		&self,
		project_id: ProjectId,
		environment_id: EnvironmentId,
		flag_key: &str,
	) -> Result<Option<UnknownFlag>> {
		let row = sqlx::query_as::<_, (i64, String, String)>(
			r#"
			SELECT request_count, first_seen_at, last_seen_at
			FROM unknown_flags
			WHERE project_id = ? AND environment_id = ? AND flag_key = ?
			"#,
		)
		.bind(project_id.to_string())
		.bind(environment_id.to_string())
		.bind(flag_key)
		.fetch_optional(&self.pool)
		.await?;

		let Some((request_count, first_seen_at, last_seen_at)) = row else {
			return Ok(None);
		};

		Ok(Some(UnknownFlag {
			project_id,
			environment_id,
			flag_key: flag_key.to_string(),
			request_count,
			first_seen_at: parse_timestamp(&first_seen_at)?,
			last_seen_at: parse_timestamp(&last_seen_at)?,
		}))
	}

	#[instrument(skip(self, names), fields(project_id = %project_id, count = names.len()))]
	async fn record_context_attributes(
		&self,
		project_id: ProjectId,
		names: &[String],
	) -> Result<()> {
		let now = Utc::now().to_rfc3339();
		for name in names {
			sqlx::query(
				r#"
				INSERT INTO context_attributes (id, project_id, name, first_seen_at, last_seen_at)
				VALUES (?, ?, ?, ?, ?)
				ON CONFLICT (project_id, name)
				DO UPDATE SET last_seen_at = excluded.last_seen_at
				"#,
			)
			.bind(uuid::Uuid::new_v4().to_string())
			.bind(project_id.to_string())
			.bind(name)
			.bind(&now)
			.bind(&now)
			.execute(&self.pool)
			.await?;
		}

		Ok(())
	}

	#[instrument(skip(self), fields(project_id = %project_id))]
	async fn list_context_attributes(&self, project_id: ProjectId) -> Result<Vec<String>> {
		let rows = sqlx::query_as::<_, (String,)>(
			"SELECT name FROM context_attributes WHERE project_id = ? ORDER BY name ASC",
		)
		.bind(project_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().map(|(name,)| name).collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::db::run_migrations;
	use sqlx::sqlite::SqlitePoolOptions;
	use togglerino_core::{FlagType, Operator};

	async fn setup() -> SqliteFlagsRepository {
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.connect("sqlite::memory:")
			.await
			.unwrap();
		run_migrations(&pool).await.unwrap();
		SqliteFlagsRepository::new(pool)
	}

	fn project(key: &str) -> Project {
		Project {
			id: ProjectId::new(),
			key: key.to_string(),
			name: key.to_string(),
			created_at: Utc::now(),
		}
	}

	fn environment(project_id: ProjectId, key: &str) -> Environment {
		Environment {
			id: EnvironmentId::new(),
			project_id,
			key: key.to_string(),
			name: key.to_string(),
			created_at: Utc::now(),
		}
	}

	fn flag(project_id: ProjectId, key: &str) -> Flag {
		let now = Utc::now();
		Flag {
			id: FlagId::new(),
			project_id,
			key: key.to_string(),
			name: key.to_string(),
			description: None,
			value_type: ValueType::Boolean,
			flag_type: FlagType::Release,
			default_value: FlagValue::Boolean(false),
			tags: vec!["checkout".to_string()],
			lifecycle_status: LifecycleStatus::Active,
			lifecycle_status_changed_at: None,
			created_at: now,
			updated_at: now,
		}
	}

	fn config(flag: &Flag, environment_id: EnvironmentId) -> FlagEnvironmentConfig {
		FlagEnvironmentConfig {
			flag_id: flag.id,
			environment_id,
			enabled: true,
			default_variant: "off".to_string(),
			variants: vec![
				Variant {
					key: "on".to_string(),
					value: FlagValue::Boolean(true),
				},
				Variant {
					key: "off".to_string(),
					value: FlagValue::Boolean(false),
				},
			],
			targeting_rules: vec![TargetingRule {
				conditions: vec![togglerino_core::Condition {
					attribute: "plan".to_string(),
					operator: Operator::Equals,
					value: serde_json::json!("pro"),
				}],
				variant: "on".to_string(),
				percentage_rollout: Some(50),
			}],
		}
	}

	#[tokio::test]
	async fn test_flag_round_trip_through_scope_listing() {
		let repo = setup().await;
		let p = project("web-app");
		let e = environment(p.id, "production");
		let f = flag(p.id, "dark-mode");
		let c = config(&f, e.id);

		repo.create_project(&p).await.unwrap();
		repo.create_environment(&e).await.unwrap();
		repo.create_flag(&f).await.unwrap();
		repo.upsert_flag_config(&c).await.unwrap();

		let entries = repo
			.list_by_project_environment("web-app", "production")
			.await
			.unwrap();
		assert_eq!(entries.len(), 1);
		let (listed_flag, listed_config) = &entries[0];
		assert_eq!(listed_flag.key, "dark-mode");
		assert_eq!(listed_flag.tags, vec!["checkout".to_string()]);
		assert_eq!(listed_config.variants.len(), 2);
		assert_eq!(listed_config.targeting_rules[0].percentage_rollout, Some(50));

		let all = repo.list_all().await.unwrap();
		assert_eq!(all.len(), 1);
		assert_eq!(all[0].0, Scope::new("web-app", "production"));
	}

	#[tokio::test]
	async fn test_list_by_unknown_scope_is_empty() {
		let repo = setup().await;
		let entries = repo
			.list_by_project_environment("nope", "nada")
			.await
			.unwrap();
		assert!(entries.is_empty());
	}

	#[tokio::test]
	async fn test_set_lifecycle_status_refreshes_changed_at() {
		let repo = setup().await;
		let p = project("web-app");
		let f = flag(p.id, "dark-mode");
		repo.create_project(&p).await.unwrap();
		repo.create_flag(&f).await.unwrap();

		let updated = repo
			.set_lifecycle_status(f.id, LifecycleStatus::PotentiallyStale)
			.await
			.unwrap();
		assert_eq!(updated.lifecycle_status, LifecycleStatus::PotentiallyStale);
		assert!(updated.lifecycle_status_changed_at.is_some());
	}

	#[tokio::test]
	async fn test_set_lifecycle_status_unknown_flag_is_not_found() {
		let repo = setup().await;
		let result = repo
			.set_lifecycle_status(FlagId::new(), LifecycleStatus::Stale)
			.await;
		assert!(matches!(result, Err(ServerError::NotFound(_))));
	}

	#[tokio::test]
	async fn test_sdk_key_lookup_and_revocation() {
		let repo = setup().await;
		let p = project("web-app");
		let e = environment(p.id, "production");
		repo.create_project(&p).await.unwrap();
		repo.create_environment(&e).await.unwrap();

		let record = SdkKeyRecord {
			id: SdkKeyId::new(),
			project_id: p.id,
			environment_id: e.id,
			name: "prod sdk".to_string(),
			key_hash: "abc123".to_string(),
			revoked_at: None,
			created_at: Utc::now(),
			last_used_at: None,
		};
		repo.create_sdk_key(&record).await.unwrap();

		let scope = repo.find_sdk_key("abc123").await.unwrap().unwrap();
		assert_eq!(scope.project_key, "web-app");
		assert_eq!(scope.env_key, "production");
		assert!(!scope.revoked);

		assert!(repo.find_sdk_key("missing").await.unwrap().is_none());

		assert!(repo.revoke_sdk_key(record.id).await.unwrap());
		let scope = repo.find_sdk_key("abc123").await.unwrap().unwrap();
		assert!(scope.revoked);

		// Revoking twice is a no-op.
		assert!(!repo.revoke_sdk_key(record.id).await.unwrap());
	}

	#[tokio::test]
	async fn test_unknown_flag_counter_increments() {
		let repo = setup().await;
		let project_id = ProjectId::new();
		let environment_id = EnvironmentId::new();

		repo
			.record_unknown_flag(project_id, environment_id, "no-such")
			.await
			.unwrap();
		repo
			.record_unknown_flag(project_id, environment_id, "no-such")
			.await
			.unwrap();

		let record = repo
			.get_unknown_flag(project_id, environment_id, "no-such")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(record.request_count, 2);
	}

	#[tokio::test]
	async fn test_create_flag_clears_unknown_record() {
		let repo = setup().await;
		let p = project("web-app");
		let e = environment(p.id, "production");
		repo.create_project(&p).await.unwrap();
		repo.create_environment(&e).await.unwrap();

		repo
			.record_unknown_flag(p.id, e.id, "dark-mode")
			.await
			.unwrap();
		repo.create_flag(&flag(p.id, "dark-mode")).await.unwrap();

		assert!(repo
			.get_unknown_flag(p.id, e.id, "dark-mode")
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn test_project_lifetimes_round_trip() {
		let repo = setup().await;
		let p = project("web-app");
		repo.create_project(&p).await.unwrap();

		let mut overrides = HashMap::new();
		overrides.insert(FlagType::Release, Some(90u32));
		overrides.insert(FlagType::Operational, None);
		let policy = LifetimePolicy::new(overrides);
		repo.set_project_lifetimes(p.id, &policy).await.unwrap();

		let policies = repo.project_lifetimes().await.unwrap();
		assert_eq!(policies.get(&p.id), Some(&policy));
	}

	#[tokio::test]
	async fn test_context_attribute_names_are_deduplicated() {
		let repo = setup().await;
		let project_id = ProjectId::new();

		repo
			.record_context_attributes(project_id, &["plan".to_string(), "country".to_string()])
			.await
			.unwrap();
		repo
			.record_context_attributes(project_id, &["plan".to_string()])
			.await
			.unwrap();

		let names = repo.list_context_attributes(project_id).await.unwrap();
		assert_eq!(names, vec!["country".to_string(), "plan".to_string()]);
	}
}
