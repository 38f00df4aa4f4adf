// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flag staleness state machine and per-project lifetime policies.
//!
//! Transitions are monotonic: `active -> potentially_stale -> stale`.
//! `stale` is terminal for the checker; only the management surface can
//! archive a flag or move it back to `active`.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::flag::{Flag, FlagType, LifecycleStatus};

/// Days a flag stays `potentially_stale` before promotion to `stale`.
pub const STALE_GRACE_DAYS: i64 = 14;

/// Per-project lifetime overrides by flag type. An entry whose value is
/// `None` marks that type permanent for the project; absent entries fall
/// back to the type's built-in default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LifetimePolicy {
	overrides: HashMap<FlagType, Option<u32>>,
}

impl LifetimePolicy {
	pub fn new(overrides: HashMap<FlagType, Option<u32>>) -> Self {
		Self { overrides }
	}

	/// The effective lifetime in days for a flag type, `None` meaning the
	/// checker never promotes flags of that type.
	pub fn lifetime_days(&self, flag_type: FlagType) -> Option<u32> {
		self
			.overrides
			.get(&flag_type)
			.copied()
			.unwrap_or_else(|| flag_type.default_lifetime_days())
	}
}

/// Compute the next lifecycle status for a flag, if any transition is due.
pub fn next_lifecycle_status(
	flag: &Flag,
	lifetime_days: Option<u32>,
	now: DateTime<Utc>,
) -> Option<LifecycleStatus> {
	match flag.lifecycle_status {
		LifecycleStatus::Active => {
			let days = lifetime_days?;
			if now > flag.created_at + Duration::days(i64::from(days)) {
				Some(LifecycleStatus::PotentiallyStale)
			} else {
				None
			}
		}
		LifecycleStatus::PotentiallyStale => {
			let changed_at = flag.lifecycle_status_changed_at.unwrap_or(flag.created_at);
			if now > changed_at + Duration::days(STALE_GRACE_DAYS) {
				Some(LifecycleStatus::Stale)
			} else {
				None
			}
		}
		LifecycleStatus::Stale | LifecycleStatus::Archived => None,
	}
}
