// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Project and environment types.
//!
//! A project is the top-level tenant grouping of flags; environments are
//! deployment targets within a project. Both carry a human-readable key
//! (`web-app`, `production`) used for cache and hub scoping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flag::{is_valid_key, EnvironmentId, ProjectId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
	pub id: ProjectId,
	pub key: String,
	pub name: String,
	pub created_at: DateTime<Utc>,
}

impl Project {
	pub fn validate_key(key: &str) -> bool {
		is_valid_key(key)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
	pub id: EnvironmentId,
	pub project_id: ProjectId,
	pub key: String,
	pub name: String,
	pub created_at: DateTime<Utc>,
}

impl Environment {
	pub fn validate_key(key: &str) -> bool {
		is_valid_key(key)
	}
}
