// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic lifecycle checker.
//!
//! Scans non-archived flags and advances their staleness status according
//! to each project's lifetime policy. Runs once at process start and then
//! on a fixed interval. Informational only: evaluation reads
//! `lifecycle_status` solely to detect `archived`.
//!
//! Failure semantics: a tick that cannot load settings or flags is skipped
//! with a warning; a failure to update one flag logs and continues with
//! the rest. The checker never aborts the process.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use togglerino_core::{next_lifecycle_status, LifetimePolicy};

use crate::audit::{AuditEventType, AuditLogBuilder, AuditService};
use crate::repository::FlagsRepository;

/// Interval between scans.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub struct LifecycleChecker {
	repo: Arc<dyn FlagsRepository>,
	audit: Arc<AuditService>,
	interval: Duration,
	shutdown_tx: broadcast::Sender<()>,
}

impl LifecycleChecker {
	pub fn new(repo: Arc<dyn FlagsRepository>, audit: Arc<AuditService>) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			repo,
			audit,
			interval: CHECK_INTERVAL,
			shutdown_tx,
		}
	}

	/// Override the scan interval.
	pub fn with_interval(mut self, interval: Duration) -> Self {
		self.interval = interval;
		self
	}

	/// Spawn the checker loop. The first tick fires immediately.
	pub fn start(&self) -> JoinHandle<()> {
		let repo = Arc::clone(&self.repo);
		let audit = Arc::clone(&self.audit);
		let interval = self.interval;
		let mut shutdown_rx = self.shutdown_tx.subscribe();

		tokio::spawn(async move {
			run_tick(repo.as_ref(), &audit).await;

			loop {
				tokio::select! {
					_ = tokio::time::sleep(interval) => {
						run_tick(repo.as_ref(), &audit).await;
					}
					_ = shutdown_rx.recv() => {
						info!("lifecycle checker shutting down");
						break;
					}
				}
			}
		})
	}

	/// Stop the loop before its next tick.
	pub fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());
	}
}

/// One scan over all non-archived flags. Returns the number of
/// transitions applied.
pub async fn run_tick(repo: &dyn FlagsRepository, audit: &AuditService) -> usize {
	let lifetimes = match repo.project_lifetimes().await {
		Ok(lifetimes) => lifetimes,
		Err(e) => {
			warn!(error = %e, "skipping lifecycle tick: failed to load project settings");
			return 0;
		}
	};

	let flags = match repo.list_non_archived().await {
		Ok(flags) => flags,
		Err(e) => {
			warn!(error = %e, "skipping lifecycle tick: failed to list flags");
			return 0;
		}
	};

	let now = Utc::now();
	let default_policy = LifetimePolicy::default();
	let mut transitions = 0;

	for flag in flags {
		let policy = lifetimes.get(&flag.project_id).unwrap_or(&default_policy);
		let lifetime = policy.lifetime_days(flag.flag_type);

		let Some(next) = next_lifecycle_status(&flag, lifetime, now) else {
			continue;
		};

		match repo.set_lifecycle_status(flag.id, next).await {
			Ok(updated) => {
				info!(
					flag_key = %updated.key,
					old = %flag.lifecycle_status,
					new = %next,
					"flag lifecycle status advanced"
				);
				audit.log(
					AuditLogBuilder::new(AuditEventType::StalenessChange)
						.entity("flag", flag.id.to_string())
						.details(json!({
							"old": flag.lifecycle_status,
							"new": next,
						}))
						.build(),
				);
				transitions += 1;
			}
			Err(e) => {
				warn!(flag_key = %flag.key, error = %e, "failed to update lifecycle status");
			}
		}
	}

	if transitions > 0 {
		info!(transitions, "lifecycle tick complete");
	}
	transitions
}
