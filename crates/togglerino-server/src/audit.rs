// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Best-effort audit logging.
//!
//! Entries are queued onto a bounded channel and written by a background
//! task. `log` never blocks the caller; a full queue drops the entry with
//! a warning. Audit failures are logged and never surfaced to requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Types of events recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
	StalenessChange,
	FlagCreated,
	FlagUpdated,
	FlagArchived,
	FlagDeleted,
}

impl AuditEventType {
	pub fn as_str(&self) -> &'static str {
		match self {
			AuditEventType::StalenessChange => "staleness_change",
			AuditEventType::FlagCreated => "flag_created",
			AuditEventType::FlagUpdated => "flag_updated",
			AuditEventType::FlagArchived => "flag_archived",
			AuditEventType::FlagDeleted => "flag_deleted",
		}
	}
}

/// A single audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
	pub id: Uuid,
	pub event_type: AuditEventType,
	pub entity_type: String,
	pub entity_id: Option<String>,
	pub details: Value,
	pub created_at: DateTime<Utc>,
}

/// Fluent builder for audit records.
pub struct AuditLogBuilder {
	event_type: AuditEventType,
	entity_type: String,
	entity_id: Option<String>,
	details: Value,
}

impl AuditLogBuilder {
	pub fn new(event_type: AuditEventType) -> Self {
		Self {
			event_type,
			entity_type: String::new(),
			entity_id: None,
			details: Value::Null,
		}
	}

	pub fn entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
		self.entity_type = entity_type.into();
		self.entity_id = Some(entity_id.into());
		self
	}

	pub fn details(mut self, details: Value) -> Self {
		self.details = details;
		self
	}

	pub fn build(self) -> AuditLogEntry {
		AuditLogEntry {
			id: Uuid::new_v4(),
			event_type: self.event_type,
			entity_type: self.entity_type,
			entity_id: self.entity_id,
			details: self.details,
			created_at: Utc::now(),
		}
	}
}

/// Queued audit writer.
pub struct AuditService {
	tx: mpsc::Sender<AuditLogEntry>,
}

impl AuditService {
	pub fn new(pool: SqlitePool) -> Self {
		Self::with_capacity(pool, DEFAULT_QUEUE_CAPACITY)
	}

	pub fn with_capacity(pool: SqlitePool, queue_capacity: usize) -> Self {
		let (tx, rx) = mpsc::channel(queue_capacity);
		tokio::spawn(Self::background_task(rx, pool));
		Self { tx }
	}

	async fn background_task(mut rx: mpsc::Receiver<AuditLogEntry>, pool: SqlitePool) {
		while let Some(entry) = rx.recv().await {
			if let Err(e) = write_entry(&pool, &entry).await {
				warn!(
					event_type = entry.event_type.as_str(),
					error = %e,
					"audit write failed"
				);
			}
		}
		debug!("audit writer stopped");
	}

	/// Queue an entry for writing. Returns `false` when the queue is full
	/// and the entry was dropped.
	pub fn log(&self, entry: AuditLogEntry) -> bool {
		match self.tx.try_send(entry) {
			Ok(()) => true,
			Err(e) => {
				warn!(error = %e, "audit queue full, dropping entry");
				false
			}
		}
	}
}

async fn write_entry(pool: &SqlitePool, entry: &AuditLogEntry) -> sqlx::Result<()> {
	sqlx::query(
		r#"
		INSERT INTO audit_log (id, event_type, entity_type, entity_id, details, created_at)
		VALUES (?, ?, ?, ?, ?, ?)
		"#,
	)
	.bind(entry.id.to_string())
	.bind(entry.event_type.as_str())
	.bind(&entry.entity_type)
	.bind(&entry.entity_id)
	.bind(entry.details.to_string())
	.bind(entry.created_at.to_rfc3339())
	.execute(pool)
	.await?;

	Ok(())
}
